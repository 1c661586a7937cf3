/// Flat-image reconstruction
///
/// Projects the physical CHS layout of a parsed image into the contiguous
/// logical byte stream a FAT volume expects, with
/// `LBA = (track * sides + side) * sectors_per_track + (R - Rmin)`.

use crate::image::{ImageIndex, SectorEntry};

/// A disk image flattened into a dense LBA byte stream
///
/// Geometry is taken from the first non-missing track with sectors; missing
/// tracks and unplaced sectors are zero-filled so all later LBA-derived
/// offsets stay aligned.
#[derive(Debug, Clone)]
pub struct FlatImage {
    data: Vec<u8>,
    sector_bytes: usize,
    sectors_per_track: usize,
    homogeneous: bool,
}

impl FlatImage {
    /// Build a flat image from a parsed index and its source buffer
    pub fn build(index: &ImageIndex, data: &[u8]) -> Self {
        let probe = index
            .entries()
            .iter()
            .find(|t| !t.is_missing() && !t.sectors().is_empty());

        let (sector_bytes, sectors_per_track) = match probe {
            Some(track) => (track.sectors()[0].size, track.sectors().len()),
            None => return Self::empty(),
        };

        let track_bytes = sectors_per_track * sector_bytes;
        let mut out = Vec::with_capacity(index.entry_count() * track_bytes);
        let mut homogeneous = true;

        for entry in index.entries() {
            if entry.is_missing() {
                out.resize(out.len() + track_bytes, 0);
                continue;
            }

            if entry.sectors().len() != sectors_per_track
                || entry.sectors().iter().any(|s| s.size != sector_bytes)
            {
                homogeneous = false;
            }

            let mut sectors: Vec<&SectorEntry> = entry.sectors().iter().collect();
            sectors.sort_by_key(|s| s.id.sector);

            for sector in sectors {
                match sector.data_offset {
                    Some(offset) if offset + sector.size <= data.len() => {
                        out.extend_from_slice(&data[offset..offset + sector.size]);
                    }
                    _ => out.resize(out.len() + sector.size, 0),
                }
            }
        }

        Self {
            data: out,
            sector_bytes,
            sectors_per_track,
            homogeneous,
        }
    }

    /// Wrap an already-linear sector stream (e.g. for testing or raw images)
    pub fn from_raw(data: Vec<u8>, sector_bytes: usize, sectors_per_track: usize) -> Self {
        Self {
            data,
            sector_bytes,
            sectors_per_track,
            homogeneous: true,
        }
    }

    fn empty() -> Self {
        Self {
            data: Vec::new(),
            sector_bytes: 0,
            sectors_per_track: 0,
            homogeneous: true,
        }
    }

    /// The flattened byte stream
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the flattened stream in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check whether the stream is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sector size the geometry was derived from
    pub fn sector_bytes(&self) -> usize {
        self.sector_bytes
    }

    /// Sectors per track the geometry was derived from
    pub fn sectors_per_track(&self) -> usize {
        self.sectors_per_track
    }

    /// Whether every populated track matched the derived geometry
    ///
    /// Heterogeneous images are still flattened best-effort, but callers
    /// trusting BPB-derived offsets should check this first.
    pub fn is_homogeneous(&self) -> bool {
        self.homogeneous
    }
}
