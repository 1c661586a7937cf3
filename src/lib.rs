/*!
# dskarchive

A Rust library for archiving and inspecting CPC DSK/EDSK floppy-disk
images, with FAT12 payload extraction and Greaseweazle-based acquisition
of physical media.

## Features

- Parse Standard and Extended DSK containers into a sector index with
  per-sector FDC status and truncation flags
- Flatten the physical CHS layout into the logical LBA stream filesystems
  expect, tolerating missing tracks
- Detect and traverse FAT12 volumes: directory listing, VFAT long
  filenames, deleted-file scoring and recovery
- Cache parsed images keyed by filename, invalidated on modification time
- Drive the external `gw` tool to capture fresh images, with streamed
  progress and cancellation

## Quick Start

```rust,no_run
use dskarchive::{detect_filesystem, Fat12FileSystem, ImageIndex};

let data = std::fs::read("disk.dsk")?;
let index = ImageIndex::parse(&data)?;

// Inspect a sector
if let Some(payload) = index.sector_data(&data, 0, 0, 0xC1) {
    println!("{} bytes", payload.len());
}

// List files on a FAT12 volume
let descriptor = detect_filesystem(&index, &data);
let fs = Fat12FileSystem::open(&descriptor, &index, &data)?;
for entry in fs.list_files() {
    println!("{}: {} bytes", entry.path, entry.size);
}
# Ok::<(), dskarchive::ArchiveError>(())
```

## Modules

- `format`: container signatures and layout constants
- `image`: the container parser (ImageIndex, TrackEntry, SectorEntry)
- `flat`: flat-image reconstruction for LBA addressing
- `boot`: boot sector inspection and filesystem identification
- `filesystem`: FAT12 traversal, deleted-entry scoring and recovery
- `cache`: mtime-validated cache of parsed images
- `acquisition`: the Greaseweazle `gw` coordinator
- `fdc`: FDC (Floppy Disk Controller) status registers
- `map`: sector health visualization
- `error`: error types and Result alias
*/

#![warn(missing_docs)]

/// Greaseweazle acquisition coordinator
pub mod acquisition;
/// Boot sector inspection and filesystem identification
pub mod boot;
/// Parsed-image cache keyed by filename
pub mod cache;
/// Error types and Result alias
pub mod error;
/// FDC (Floppy Disk Controller) status registers
pub mod fdc;
/// Filesystem traversal (FAT12)
pub mod filesystem;
/// Flat-image reconstruction
pub mod flat;
/// Container format identification
pub mod format;
/// Container parsing and the sector index
pub mod image;
/// Sector health map visualization
pub mod map;

// Re-export common types
pub use acquisition::{CancellationHandle, GwController, ReadOptions, ReadOutcome};
pub use boot::{detect_filesystem, BiosParameterBlock, FilesystemDescriptor};
pub use cache::{CacheEntry, DiskCache, InvalidImage, ParsedImage};
pub use error::{ArchiveError, Result};
pub use fdc::{FdcStatus1, FdcStatus2};
pub use filesystem::{DeletedEntry, DirEntry, Fat12FileSystem};
pub use flat::FlatImage;
pub use format::ImageFormat;
pub use image::{DataRate, ImageIndex, RecordingMode, SectorEntry, SectorId, TrackEntry};
