/// Container parsing and the sector index

/// Sector descriptor and CHRN id
pub mod sector;
/// Track entry and track header enums
pub mod track;

pub use sector::{SectorEntry, SectorId};
pub use track::{DataRate, RecordingMode, TrackEntry};

use crate::error::{ArchiveError, Result};
use crate::fdc::{FdcStatus1, FdcStatus2};
use crate::format::constants::*;
use crate::format::{detect_format, ImageFormat};

/// Parsed index of a DSK or EDSK container
///
/// The index holds metadata only; sector payloads stay in the byte buffer
/// the index was parsed from and are handed out as borrowed slices by
/// [`ImageIndex::sector_data`]. Entries are ordered `(track, side)`
/// row-major with the side varying fastest.
#[derive(Debug, Clone)]
pub struct ImageIndex {
    /// Container format
    pub format: ImageFormat,
    /// Creator string from the disk header, NUL-stripped and trimmed
    pub creator: String,
    /// Track count per side
    pub tracks: u8,
    /// Side count (1 or 2)
    pub sides: u8,
    entries: Vec<TrackEntry>,
}

impl ImageIndex {
    /// Parse a DSK/EDSK container from a byte buffer
    ///
    /// Header errors fail the parse; per-sector anomalies (FDC flags,
    /// truncation) are recorded on the sector entries instead.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(ArchiveError::EmptyImage);
        }
        let format = detect_format(data).ok_or(ArchiveError::UnknownSignature)?;
        if data.len() < DISK_HEADER_SIZE {
            return Err(ArchiveError::OutOfBounds {
                track: 0,
                side: 0,
                end: DISK_HEADER_SIZE,
                len: data.len(),
            });
        }

        let creator = ascii_field(&data[DISK_CREATOR_OFFSET..DISK_CREATOR_OFFSET + DISK_CREATOR_LEN]);
        let tracks = data[DISK_TRACK_COUNT_OFFSET];
        let sides = data[DISK_SIDE_COUNT_OFFSET];
        if tracks == 0 || sides == 0 {
            return Err(ArchiveError::InvalidGeometry { tracks, sides });
        }

        let count = tracks as usize * sides as usize;
        let slot_sizes: Vec<usize> = match format {
            ImageFormat::Extended => (0..count)
                .map(|i| {
                    let offset = DISK_EXT_TRACK_SIZE_OFFSET + i;
                    if offset < DISK_HEADER_SIZE {
                        data[offset] as usize * 256
                    } else {
                        // Size table overran the header: treat the slot as missing
                        0
                    }
                })
                .collect(),
            ImageFormat::Standard => {
                let size = u16::from_le_bytes([
                    data[DISK_TRACK_SIZE_OFFSET],
                    data[DISK_TRACK_SIZE_OFFSET + 1],
                ]) as usize;
                vec![size; count]
            }
        };

        let mut entries = Vec::with_capacity(count);
        let mut cursor = DISK_HEADER_SIZE;
        let mut slot = 0;

        for track in 0..tracks {
            for side in 0..sides {
                let slot_size = slot_sizes[slot];
                slot += 1;

                if slot_size == 0 {
                    // Missing track: no bytes in the file, cursor does not move
                    entries.push(TrackEntry::missing(track, side));
                    continue;
                }
                if slot_size < TRACK_HEADER_SIZE {
                    return Err(ArchiveError::TrackHeaderTooSmall {
                        track,
                        side,
                        size: slot_size,
                    });
                }
                let end = cursor + slot_size;
                if end > data.len() {
                    return Err(ArchiveError::OutOfBounds {
                        track,
                        side,
                        end,
                        len: data.len(),
                    });
                }

                entries.push(parse_track(data, cursor, slot_size, track, side));
                cursor = end;
            }
        }

        Ok(Self {
            format,
            creator,
            tracks,
            sides,
            entries,
        })
    }

    /// Get all track entries in `(track, side)` row-major order
    pub fn entries(&self) -> &[TrackEntry] {
        &self.entries
    }

    /// Number of track entries (`tracks * sides`)
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Get the entry for an exact physical track and side
    pub fn track(&self, track: u8, side: u8) -> Option<&TrackEntry> {
        if track >= self.tracks || side >= self.sides {
            return None;
        }
        self.entries
            .get(track as usize * self.sides as usize + side as usize)
    }

    /// Read one sector's payload as a slice of the image buffer
    ///
    /// Finds the `(track, side)` entry and the first sector whose R id
    /// matches. Returns `None` if the track is missing, the sector is
    /// absent, or it has no placement. C/H mismatches within the sector
    /// descriptor are not filtered here.
    pub fn sector_data<'a>(
        &self,
        data: &'a [u8],
        track: u8,
        side: u8,
        sector_id: u8,
    ) -> Option<&'a [u8]> {
        let entry = self.track(track, side)?;
        let sector = entry.sector_by_id(sector_id)?;
        let offset = sector.data_offset?;
        if offset + sector.size > data.len() {
            return None;
        }
        Some(&data[offset..offset + sector.size])
    }

    /// Count tracks absent from the image
    pub fn missing_track_count(&self) -> usize {
        self.entries.iter().filter(|t| t.is_missing()).count()
    }

    /// Count sectors that recorded an FDC flag
    pub fn error_sector_count(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|t| t.sectors())
            .filter(|s| s.has_error())
            .count()
    }

    /// Count sectors whose payload crossed the track boundary
    pub fn truncated_sector_count(&self) -> usize {
        self.entries
            .iter()
            .flat_map(|t| t.sectors())
            .filter(|s| s.truncated)
            .count()
    }
}

/// Decode an ASCII header field, dropping NULs and trailing whitespace
fn ascii_field(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    text.trim().to_string()
}

/// Parse one track's header and sector descriptors
///
/// Sector payloads are laid out in declaration order directly after the
/// 256-byte track header. A sector whose payload would cross the track
/// boundary is flagged truncated and left unplaced, as are all sectors
/// after it.
fn parse_track(data: &[u8], offset: usize, size: usize, track: u8, side: u8) -> TrackEntry {
    let header = &data[offset..offset + TRACK_HEADER_SIZE];

    let data_rate = DataRate::from(header[TRACK_DATA_RATE_OFFSET]);
    let recording_mode = RecordingMode::from(header[TRACK_RECORDING_MODE_OFFSET]);
    let sector_size_code = header[TRACK_SECTOR_SIZE_OFFSET];
    let sector_count = header[TRACK_SECTOR_COUNT_OFFSET];
    let gap3_length = header[TRACK_GAP3_OFFSET];
    let filler_byte = header[TRACK_FILLER_OFFSET];

    let track_end = offset + size;
    let mut sectors = Vec::with_capacity(sector_count as usize);
    let mut cursor = Some(offset + TRACK_HEADER_SIZE);

    for i in 0..sector_count as usize {
        let sib_offset = SECTOR_TABLE_OFFSET + i * SECTOR_INFO_SIZE;
        if sib_offset + SECTOR_INFO_SIZE > TRACK_HEADER_SIZE {
            break;
        }
        let sib = &header[sib_offset..sib_offset + SECTOR_INFO_SIZE];

        let id = SectorId::new(sib[0], sib[1], sib[2], sib[3]);
        let status1 = FdcStatus1::new(sib[4]);
        let status2 = FdcStatus2::new(sib[5]);
        let stored_size = u16::from_le_bytes([sib[6], sib[7]]) as usize;

        // A non-zero stored size overrides the advertised size; EDSK uses it
        // for variable-length and weak sectors
        let sector_size = if stored_size != 0 {
            stored_size
        } else {
            id.size_bytes()
        };

        let (data_offset, truncated) = match cursor {
            Some(pos) if pos + sector_size <= track_end => {
                cursor = Some(pos + sector_size);
                (Some(pos), false)
            }
            Some(_) => {
                cursor = None;
                (None, true)
            }
            None => (None, false),
        };

        sectors.push(SectorEntry {
            index: i,
            id,
            status1,
            status2,
            size: sector_size,
            data_offset,
            truncated,
        });
    }

    TrackEntry::new(
        track,
        side,
        offset,
        size,
        data_rate,
        recording_mode,
        sector_size_code,
        sector_count,
        gap3_length,
        filler_byte,
        sectors,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write a 256-byte track block (header + declared sectors) into `out`
    fn push_track(out: &mut Vec<u8>, track: u8, side: u8, sector_ids: &[u8], sector_size: usize) {
        let mut header = vec![0u8; TRACK_HEADER_SIZE];
        header[..12].copy_from_slice(TRACK_INFO_MARKER);
        header[TRACK_NUMBER_OFFSET] = track;
        header[TRACK_SIDE_OFFSET] = side;
        header[TRACK_DATA_RATE_OFFSET] = 1;
        header[TRACK_RECORDING_MODE_OFFSET] = 2;
        header[TRACK_SECTOR_SIZE_OFFSET] = 2;
        header[TRACK_SECTOR_COUNT_OFFSET] = sector_ids.len() as u8;
        header[TRACK_GAP3_OFFSET] = 0x4E;
        header[TRACK_FILLER_OFFSET] = 0xE5;
        for (i, &r) in sector_ids.iter().enumerate() {
            let sib = SECTOR_TABLE_OFFSET + i * SECTOR_INFO_SIZE;
            header[sib] = track;
            header[sib + 1] = side;
            header[sib + 2] = r;
            header[sib + 3] = 2;
            let size16 = sector_size as u16;
            header[sib + 6] = size16 as u8;
            header[sib + 7] = (size16 >> 8) as u8;
        }
        out.extend_from_slice(&header);
        for &r in sector_ids {
            out.extend(std::iter::repeat(r).take(sector_size));
        }
    }

    /// Build a standard DSK with 9x512 sectors per track
    fn build_standard_dsk(tracks: u8) -> Vec<u8> {
        let track_size = TRACK_HEADER_SIZE + 9 * 512;
        let mut data = vec![0u8; DISK_HEADER_SIZE];
        data[..STANDARD_DSK_FULL_SIGNATURE.len()].copy_from_slice(STANDARD_DSK_FULL_SIGNATURE);
        data[DISK_CREATOR_OFFSET..DISK_CREATOR_OFFSET + 4].copy_from_slice(b"test");
        data[DISK_TRACK_COUNT_OFFSET] = tracks;
        data[DISK_SIDE_COUNT_OFFSET] = 1;
        data[DISK_TRACK_SIZE_OFFSET] = (track_size & 0xFF) as u8;
        data[DISK_TRACK_SIZE_OFFSET + 1] = (track_size >> 8) as u8;
        for t in 0..tracks {
            let ids: Vec<u8> = (0xC1..=0xC9).collect();
            push_track(&mut data, t, 0, &ids, 512);
        }
        data
    }

    /// Build an extended DSK from per-slot sector id lists; `None` slots are
    /// missing tracks
    fn build_edsk(slots: &[Option<Vec<u8>>], sides: u8, sector_size: usize) -> Vec<u8> {
        let tracks = (slots.len() / sides as usize) as u8;
        let mut data = vec![0u8; DISK_HEADER_SIZE];
        data[..EXTENDED_DSK_SIGNATURE.len()].copy_from_slice(EXTENDED_DSK_SIGNATURE);
        data[DISK_TRACK_COUNT_OFFSET] = tracks;
        data[DISK_SIDE_COUNT_OFFSET] = sides;
        for (i, slot) in slots.iter().enumerate() {
            if let Some(ids) = slot {
                let size = TRACK_HEADER_SIZE + ids.len() * sector_size;
                data[DISK_EXT_TRACK_SIZE_OFFSET + i] = (size / 256) as u8;
            }
        }
        let mut slot_iter = slots.iter();
        for t in 0..tracks {
            for s in 0..sides {
                if let Some(Some(ids)) = slot_iter.next() {
                    push_track(&mut data, t, s, ids, sector_size);
                }
            }
        }
        data
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(
            ImageIndex::parse(&[]),
            Err(ArchiveError::EmptyImage)
        ));
    }

    #[test]
    fn test_parse_unknown_signature() {
        let data = vec![0x55u8; 512];
        assert!(matches!(
            ImageIndex::parse(&data),
            Err(ArchiveError::UnknownSignature)
        ));
    }

    #[test]
    fn test_parse_zero_sides() {
        let mut data = build_standard_dsk(2);
        data[DISK_SIDE_COUNT_OFFSET] = 0;
        assert!(matches!(
            ImageIndex::parse(&data),
            Err(ArchiveError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn test_parse_standard_dsk() {
        let data = build_standard_dsk(40);
        let index = ImageIndex::parse(&data).unwrap();

        assert_eq!(index.format, ImageFormat::Standard);
        assert_eq!(index.creator, "test");
        assert_eq!(index.tracks, 40);
        assert_eq!(index.sides, 1);
        assert_eq!(index.entry_count(), 40);
        assert_eq!(index.missing_track_count(), 0);

        // Track offsets advance by a uniform 256 + 9*512 = 4864 bytes
        let first = index.track(0, 0).unwrap();
        assert_eq!(first.offset, Some(256));
        let second = index.track(1, 0).unwrap();
        assert_eq!(second.offset, Some(256 + 4864));
        assert_eq!(second.sectors().len(), 9);
    }

    #[test]
    fn test_parse_truncated_file() {
        let mut data = build_standard_dsk(40);
        data.truncate(data.len() - 100);
        assert!(matches!(
            ImageIndex::parse(&data),
            Err(ArchiveError::OutOfBounds { track: 39, .. })
        ));
    }

    #[test]
    fn test_parse_edsk_missing_track() {
        let ids: Vec<u8> = (1..=4).collect();
        let slots = vec![
            Some(ids.clone()),
            None,
            Some(ids.clone()),
        ];
        let data = build_edsk(&slots, 1, 512);
        let index = ImageIndex::parse(&data).unwrap();

        assert_eq!(index.format, ImageFormat::Extended);
        assert_eq!(index.missing_track_count(), 1);

        let missing = index.track(1, 0).unwrap();
        assert!(missing.is_missing());
        assert_eq!(missing.size, 0);
        assert!(missing.sectors().is_empty());

        // The byte cursor does not advance over missing slots
        let track_size = TRACK_HEADER_SIZE + 4 * 512;
        assert_eq!(index.track(0, 0).unwrap().offset, Some(256));
        assert_eq!(index.track(2, 0).unwrap().offset, Some(256 + track_size));
    }

    #[test]
    fn test_sector_placement_in_declaration_order() {
        // Declaration order deliberately differs from id order
        let slots = vec![Some(vec![3u8, 1, 2])];
        let data = build_edsk(&slots, 1, 512);
        let index = ImageIndex::parse(&data).unwrap();

        let track = index.track(0, 0).unwrap();
        let base = 256 + TRACK_HEADER_SIZE;
        assert_eq!(track.sector_by_id(3).unwrap().data_offset, Some(base));
        assert_eq!(track.sector_by_id(1).unwrap().data_offset, Some(base + 512));
        assert_eq!(track.sector_by_id(2).unwrap().data_offset, Some(base + 1024));
    }

    #[test]
    fn test_sector_data_matches_fill() {
        let slots = vec![Some(vec![1u8, 2, 3])];
        let data = build_edsk(&slots, 1, 512);
        let index = ImageIndex::parse(&data).unwrap();

        let payload = index.sector_data(&data, 0, 0, 2).unwrap();
        assert_eq!(payload.len(), 512);
        assert!(payload.iter().all(|&b| b == 2));

        assert!(index.sector_data(&data, 0, 0, 9).is_none());
        assert!(index.sector_data(&data, 5, 0, 1).is_none());
    }

    #[test]
    fn test_truncated_sector_detection() {
        // Track slot declares 4 sectors of 512 but only reserves room for 2
        let ids = vec![1u8, 2, 3, 4];
        let mut data = vec![0u8; DISK_HEADER_SIZE];
        data[..EXTENDED_DSK_SIGNATURE.len()].copy_from_slice(EXTENDED_DSK_SIGNATURE);
        data[DISK_TRACK_COUNT_OFFSET] = 1;
        data[DISK_SIDE_COUNT_OFFSET] = 1;
        let slot_size = TRACK_HEADER_SIZE + 2 * 512;
        data[DISK_EXT_TRACK_SIZE_OFFSET] = (slot_size / 256) as u8;
        let mut track_block = Vec::new();
        push_track(&mut track_block, 0, 0, &ids, 512);
        track_block.truncate(slot_size);
        data.extend_from_slice(&track_block);

        let index = ImageIndex::parse(&data).unwrap();
        let track = index.track(0, 0).unwrap();

        assert!(!track.sectors()[0].truncated);
        assert!(!track.sectors()[1].truncated);
        assert!(track.sectors()[2].truncated);
        assert!(track.sectors()[2].data_offset.is_none());
        assert!(!track.sectors()[3].truncated);
        assert!(track.sectors()[3].data_offset.is_none());
        assert_eq!(index.truncated_sector_count(), 1);
    }

    #[test]
    fn test_round_trip_clean_dsk() {
        // Concatenating all payloads in declaration order reproduces the
        // byte range after the disk header
        let data = build_standard_dsk(5);
        let index = ImageIndex::parse(&data).unwrap();

        let mut rebuilt = Vec::new();
        for entry in index.entries() {
            let offset = entry.offset.unwrap();
            rebuilt.extend_from_slice(&data[offset..offset + TRACK_HEADER_SIZE]);
            for sector in entry.sectors() {
                let data_offset = sector.data_offset.unwrap();
                rebuilt.extend_from_slice(&data[data_offset..data_offset + sector.size]);
            }
        }
        assert_eq!(rebuilt, data[DISK_HEADER_SIZE..]);
    }

    #[test]
    fn test_double_sided_row_major_order() {
        let ids: Vec<u8> = (1..=2).collect();
        let slots = vec![
            Some(ids.clone()),
            Some(ids.clone()),
            Some(ids.clone()),
            Some(ids.clone()),
        ];
        let data = build_edsk(&slots, 2, 256);
        let index = ImageIndex::parse(&data).unwrap();

        assert_eq!(index.entry_count(), 4);
        let order: Vec<(u8, u8)> = index.entries().iter().map(|t| (t.track, t.side)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
    }
}
