/// Sector descriptor structures

use crate::fdc::{FdcStatus1, FdcStatus2};
use crate::format::constants::fdc_size_to_bytes;

/// Sector ID (CHRN) - addressing information for a sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorId {
    /// C - Cylinder/Track number
    pub track: u8,
    /// H - Head/Side number
    pub side: u8,
    /// R - Sector ID/Record number
    pub sector: u8,
    /// N - Size code (0=128, 1=256, 2=512, 3=1024, ...)
    pub size_code: u8,
}

impl SectorId {
    /// Create a new sector ID
    pub fn new(track: u8, side: u8, sector: u8, size_code: u8) -> Self {
        Self {
            track,
            side,
            sector,
            size_code,
        }
    }

    /// Get the advertised sector size in bytes based on the size code
    pub fn size_bytes(&self) -> usize {
        fdc_size_to_bytes(self.size_code)
    }
}

/// One sector descriptor within a parsed track
///
/// The descriptor indexes into the image buffer it was parsed from rather
/// than holding a copy of the payload; `data_offset` is absolute within that
/// buffer, or `None` when the sector could not be placed.
#[derive(Debug, Clone)]
pub struct SectorEntry {
    /// 0-based position within the track's declaration order
    pub index: usize,
    /// Sector addressing information (CHRN)
    pub id: SectorId,
    /// FDC Status Register 1 recorded for this sector
    pub status1: FdcStatus1,
    /// FDC Status Register 2 recorded for this sector
    pub status2: FdcStatus2,
    /// Effective stored size in bytes (the descriptor's actual-size word
    /// when non-zero, otherwise `128 << N`)
    pub size: usize,
    /// Absolute byte offset of the payload in the image buffer
    pub data_offset: Option<usize>,
    /// Set when the payload would cross the track boundary
    pub truncated: bool,
}

impl SectorEntry {
    /// The size the CHRN size code advertises (`128 << N`)
    pub fn expected_size(&self) -> usize {
        self.id.size_bytes()
    }

    /// Check if the stored size differs from the advertised size
    pub fn has_size_mismatch(&self) -> bool {
        self.size != self.expected_size()
    }

    /// Check if either FDC status register recorded a flag
    pub fn has_error(&self) -> bool {
        self.status1.has_error() || self.status2.has_error()
    }

    /// Names of all FDC flags recorded for this sector
    pub fn error_flags(&self) -> Vec<&'static str> {
        let mut flags = self.status1.flags();
        flags.extend(self.status2.flags());
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(size_code: u8, size: usize) -> SectorEntry {
        SectorEntry {
            index: 0,
            id: SectorId::new(0, 0, 1, size_code),
            status1: FdcStatus1::new(0),
            status2: FdcStatus2::new(0),
            size,
            data_offset: Some(512),
            truncated: false,
        }
    }

    #[test]
    fn test_sector_id_size() {
        let id = SectorId::new(0, 0, 0xC1, 2);
        assert_eq!(id.size_bytes(), 512);

        let id2 = SectorId::new(0, 0, 1, 3);
        assert_eq!(id2.size_bytes(), 1024);
    }

    #[test]
    fn test_expected_size() {
        let sector = entry(2, 512);
        assert_eq!(sector.expected_size(), 512);
        assert!(!sector.has_size_mismatch());
    }

    #[test]
    fn test_size_mismatch() {
        // Weak sector stored at twice the advertised size
        let sector = entry(2, 1024);
        assert!(sector.has_size_mismatch());
    }

    #[test]
    fn test_error_flags() {
        let mut sector = entry(2, 512);
        assert!(!sector.has_error());
        assert!(sector.error_flags().is_empty());

        sector.status1 = FdcStatus1::new(FdcStatus1::DE);
        sector.status2 = FdcStatus2::new(FdcStatus2::MD);
        assert!(sector.has_error());
        assert_eq!(
            sector.error_flags(),
            vec!["data-error-in-id", "missing-data-mark"]
        );
    }
}
