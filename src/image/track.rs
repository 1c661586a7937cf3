/// Track entry structures

use crate::image::sector::SectorEntry;

/// Recording mode for the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingMode {
    /// Unknown recording mode
    #[default]
    Unknown,
    /// FM (Frequency Modulation) - single density
    FM,
    /// MFM (Modified Frequency Modulation) - double density
    MFM,
}

impl From<u8> for RecordingMode {
    fn from(value: u8) -> Self {
        match value {
            1 => RecordingMode::FM,
            2 => RecordingMode::MFM,
            _ => RecordingMode::Unknown,
        }
    }
}

/// Data rate for the track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    /// Unknown data rate
    #[default]
    Unknown,
    /// Single/Double Density
    SingleDouble,
    /// High Density
    High,
    /// Extended Density
    Extended,
}

impl From<u8> for DataRate {
    fn from(value: u8) -> Self {
        match value {
            1 => DataRate::SingleDouble,
            2 => DataRate::High,
            3 => DataRate::Extended,
            _ => DataRate::Unknown,
        }
    }
}

/// One physical track on one side of the imaged disk
///
/// A missing track (a zero slot in the EDSK size table) has `offset = None`,
/// `size = 0` and no sectors.
#[derive(Debug, Clone)]
pub struct TrackEntry {
    /// Physical track number
    pub track: u8,
    /// Physical side number (0 or 1)
    pub side: u8,
    /// Absolute byte offset of the track (header included) in the image
    pub offset: Option<usize>,
    /// Raw track size in bytes, header included
    pub size: usize,
    /// Data rate from the track header
    pub data_rate: DataRate,
    /// Recording mode from the track header
    pub recording_mode: RecordingMode,
    /// Sector size code from the track header
    pub sector_size_code: u8,
    /// Declared sector count from the track header
    pub sector_count: u8,
    /// GAP#3 length
    pub gap3_length: u8,
    /// Filler byte used when the track was formatted
    pub filler_byte: u8,
    /// Sector descriptors in declaration order
    sectors: Vec<SectorEntry>,
}

impl TrackEntry {
    /// Create an entry for a track absent from the image
    pub fn missing(track: u8, side: u8) -> Self {
        Self {
            track,
            side,
            offset: None,
            size: 0,
            data_rate: DataRate::Unknown,
            recording_mode: RecordingMode::Unknown,
            sector_size_code: 0,
            sector_count: 0,
            gap3_length: 0,
            filler_byte: 0,
            sectors: Vec::new(),
        }
    }

    /// Create a populated entry from parsed header fields
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        track: u8,
        side: u8,
        offset: usize,
        size: usize,
        data_rate: DataRate,
        recording_mode: RecordingMode,
        sector_size_code: u8,
        sector_count: u8,
        gap3_length: u8,
        filler_byte: u8,
        sectors: Vec<SectorEntry>,
    ) -> Self {
        Self {
            track,
            side,
            offset: Some(offset),
            size,
            data_rate,
            recording_mode,
            sector_size_code,
            sector_count,
            gap3_length,
            filler_byte,
            sectors,
        }
    }

    /// Check whether the track is absent from the image
    pub fn is_missing(&self) -> bool {
        self.offset.is_none()
    }

    /// Get all sector descriptors in declaration order
    pub fn sectors(&self) -> &[SectorEntry] {
        &self.sectors
    }

    /// Get a sector by its position in declaration order
    pub fn sector_by_index(&self, index: usize) -> Option<&SectorEntry> {
        self.sectors.get(index)
    }

    /// Get the first sector whose R id matches
    pub fn sector_by_id(&self, sector_id: u8) -> Option<&SectorEntry> {
        self.sectors.iter().find(|s| s.id.sector == sector_id)
    }

    /// Check whether any sector in the track recorded an FDC flag
    pub fn has_errors(&self) -> bool {
        self.sectors.iter().any(|s| s.has_error())
    }

    /// Check whether any sector in the track is truncated
    pub fn has_truncation(&self) -> bool {
        self.sectors.iter().any(|s| s.truncated)
    }

    /// Check if all sectors share one stored size
    pub fn has_uniform_sector_size(&self) -> bool {
        if self.sectors.is_empty() {
            return true;
        }

        let first_size = self.sectors[0].size;
        self.sectors.iter().all(|s| s.size == first_size)
    }
}
