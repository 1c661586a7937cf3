/// Parsed-image cache
///
/// Maps image filenames to parsed handles, validated against the file's
/// modification time on every access. Parse failures are cached too, so a
/// listing can report per-image status without reparsing a broken file on
/// every request.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use log::{debug, warn};

use crate::error::{ArchiveError, Result};
use crate::image::ImageIndex;

/// A parsed image held by the cache
#[derive(Debug)]
pub struct ParsedImage {
    /// Image filename (no directory)
    pub name: String,
    /// Raw image bytes; sector payloads are slices into this buffer
    pub data: Vec<u8>,
    /// Parsed container index
    pub index: ImageIndex,
    /// Modification time the entry was parsed at
    pub mtime: SystemTime,
    /// File size in bytes
    pub size: u64,
}

/// A cached parse failure
#[derive(Debug, Clone)]
pub struct InvalidImage {
    /// Image filename (no directory)
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Rendered parse error
    pub error: String,
}

/// Outcome of a cache lookup
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// The image parsed; callers borrow the shared handle
    Parsed(Arc<ParsedImage>),
    /// The image failed to parse; the failure is remembered until the file
    /// changes
    Invalid(Arc<InvalidImage>),
}

enum Slot {
    Parsed(Arc<ParsedImage>),
    Invalid(Arc<InvalidImage>, SystemTime),
}

/// Process-wide cache of parsed images keyed by filename
#[derive(Default)]
pub struct DiskCache {
    entries: Mutex<HashMap<String, Slot>>,
}

impl DiskCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an image, reparsing when its modification time changed
    ///
    /// Zero-length files are not loadable and never cached.
    pub fn lookup(&self, path: &Path) -> Result<CacheEntry> {
        let name = file_name(path);
        let metadata = fs::metadata(path)?;
        if metadata.len() == 0 {
            return Err(ArchiveError::EmptyImage);
        }
        let mtime = metadata.modified()?;

        {
            let entries = self.entries.lock().unwrap();
            match entries.get(&name) {
                Some(Slot::Parsed(image)) if image.mtime == mtime => {
                    debug!("cache hit for {}", name);
                    return Ok(CacheEntry::Parsed(Arc::clone(image)));
                }
                Some(Slot::Invalid(invalid, cached_mtime)) if *cached_mtime == mtime => {
                    debug!("cached failure for {}", name);
                    return Ok(CacheEntry::Invalid(Arc::clone(invalid)));
                }
                _ => {}
            }
        }

        debug!("parsing {}", name);
        let data = fs::read(path)?;
        let size = data.len() as u64;
        let entry = match ImageIndex::parse(&data) {
            Ok(index) => {
                let image = Arc::new(ParsedImage {
                    name: name.clone(),
                    data,
                    index,
                    mtime,
                    size,
                });
                self.entries
                    .lock()
                    .unwrap()
                    .insert(name, Slot::Parsed(Arc::clone(&image)));
                CacheEntry::Parsed(image)
            }
            Err(err) => {
                warn!("failed to parse {}: {}", name, err);
                let invalid = Arc::new(InvalidImage {
                    name: name.clone(),
                    size,
                    error: err.to_string(),
                });
                self.entries
                    .lock()
                    .unwrap()
                    .insert(name, Slot::Invalid(Arc::clone(&invalid), mtime));
                CacheEntry::Invalid(invalid)
            }
        };
        Ok(entry)
    }

    /// Look up an image, turning a cached failure into its parse error
    pub fn image(&self, path: &Path) -> Result<Arc<ParsedImage>> {
        match self.lookup(path)? {
            CacheEntry::Parsed(image) => Ok(image),
            CacheEntry::Invalid(_) => {
                // Reparse to reproduce the structured error. If the file
                // somehow became valid under the same mtime, take the win.
                let data = fs::read(path)?;
                let index = ImageIndex::parse(&data)?;
                let metadata = fs::metadata(path)?;
                let image = Arc::new(ParsedImage {
                    name: file_name(path),
                    size: data.len() as u64,
                    index,
                    mtime: metadata.modified()?,
                    data,
                });
                self.entries
                    .lock()
                    .unwrap()
                    .insert(image.name.clone(), Slot::Parsed(Arc::clone(&image)));
                Ok(image)
            }
        }
    }

    /// Drop one cached entry, forcing a reparse on next access
    pub fn invalidate(&self, name: &str) {
        if self.entries.lock().unwrap().remove(name).is_some() {
            debug!("invalidated {}", name);
        }
    }

    /// Drop every cached entry (e.g. when the storage directory changes)
    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        if !entries.is_empty() {
            debug!("cleared {} cached image(s)", entries.len());
            entries.clear();
        }
    }

    /// Number of cached entries, parsed and failed alike
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Check whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::constants::*;
    use std::io::Write;

    fn minimal_dsk() -> Vec<u8> {
        let mut data = vec![0u8; DISK_HEADER_SIZE];
        data[..STANDARD_DSK_SIGNATURE.len()].copy_from_slice(STANDARD_DSK_SIGNATURE);
        data[DISK_TRACK_COUNT_OFFSET] = 1;
        data[DISK_SIDE_COUNT_OFFSET] = 1;
        data[DISK_TRACK_SIZE_OFFSET] = 0;
        data[DISK_TRACK_SIZE_OFFSET + 1] = 1; // 256-byte track
        data.extend_from_slice(&[0u8; TRACK_HEADER_SIZE]);
        data
    }

    #[test]
    fn test_lookup_parses_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.dsk");
        fs::write(&path, minimal_dsk()).unwrap();

        let cache = DiskCache::new();
        let first = cache.image(&path).unwrap();
        assert_eq!(first.name, "disk.dsk");
        assert_eq!(cache.len(), 1);

        // Second lookup returns the same shared handle
        let second = cache.image(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_lookup_reparses_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.dsk");
        fs::write(&path, minimal_dsk()).unwrap();

        let cache = DiskCache::new();
        let first = cache.image(&path).unwrap();

        // Rewrite with a different mtime
        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.write_all(&minimal_dsk()).unwrap();
        file.set_modified(SystemTime::now()).unwrap();
        drop(file);

        let second = cache.image(&path).unwrap();
        if first.mtime != second.mtime {
            assert!(!Arc::ptr_eq(&first, &second));
        }
    }

    #[test]
    fn test_zero_length_not_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.dsk");
        fs::write(&path, b"").unwrap();

        let cache = DiskCache::new();
        assert!(matches!(
            cache.lookup(&path),
            Err(ArchiveError::EmptyImage)
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_parse_failure_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.dsk");
        fs::write(&path, vec![0x55u8; 1024]).unwrap();

        let cache = DiskCache::new();
        match cache.lookup(&path).unwrap() {
            CacheEntry::Invalid(invalid) => {
                assert_eq!(invalid.name, "junk.dsk");
                assert_eq!(invalid.size, 1024);
                assert!(invalid.error.contains("Unknown signature"));
            }
            CacheEntry::Parsed(_) => panic!("junk parsed as an image"),
        }
        assert_eq!(cache.len(), 1);

        assert!(matches!(
            cache.image(&path),
            Err(ArchiveError::UnknownSignature)
        ));
    }

    #[test]
    fn test_invalidate_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.dsk");
        fs::write(&path, minimal_dsk()).unwrap();

        let cache = DiskCache::new();
        cache.image(&path).unwrap();
        assert_eq!(cache.len(), 1);

        cache.invalidate("disk.dsk");
        assert!(cache.is_empty());

        cache.image(&path).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
