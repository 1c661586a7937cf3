/// DSK container magic bytes and layout constants

/// Standard DSK format signature prefix
pub const STANDARD_DSK_SIGNATURE: &[u8] = b"MV - CPC";

/// Standard DSK signature as written by CPCEMU
pub const STANDARD_DSK_FULL_SIGNATURE: &[u8] = b"MV - CPCEMU Disk-File\r\nDisk-Info\r\n";

/// Extended DSK format signature prefix
pub const EXTENDED_DSK_SIGNATURE: &[u8] = b"EXTENDED CPC DSK File";

/// Track-Info block marker
pub const TRACK_INFO_MARKER: &[u8] = b"Track-Info\r\n";

/// Size of the disk info block
pub const DISK_HEADER_SIZE: usize = 256;

/// Size of the track info block at the start of each track
pub const TRACK_HEADER_SIZE: usize = 256;

/// Size of one sector descriptor in the track header
pub const SECTOR_INFO_SIZE: usize = 8;

/// Offset of the sector descriptor table within a track header
pub const SECTOR_TABLE_OFFSET: usize = 0x18;

/// Offset of the creator string in the disk header
pub const DISK_CREATOR_OFFSET: usize = 34;

/// Length of the creator string
pub const DISK_CREATOR_LEN: usize = 14;

/// Offset of the track count in the disk header
pub const DISK_TRACK_COUNT_OFFSET: usize = 0x30;

/// Offset of the side count in the disk header
pub const DISK_SIDE_COUNT_OFFSET: usize = 0x31;

/// Offset of the uniform track size word (standard format)
pub const DISK_TRACK_SIZE_OFFSET: usize = 0x32;

/// Offset of the per-slot track size table (extended format)
pub const DISK_EXT_TRACK_SIZE_OFFSET: usize = 0x34;

/// Offset of the track number within a track header
pub const TRACK_NUMBER_OFFSET: usize = 0x10;

/// Offset of the side number within a track header
pub const TRACK_SIDE_OFFSET: usize = 0x11;

/// Offset of the data rate byte within a track header
pub const TRACK_DATA_RATE_OFFSET: usize = 0x12;

/// Offset of the recording mode byte within a track header
pub const TRACK_RECORDING_MODE_OFFSET: usize = 0x13;

/// Offset of the sector size code within a track header
pub const TRACK_SECTOR_SIZE_OFFSET: usize = 0x14;

/// Offset of the sector count within a track header
pub const TRACK_SECTOR_COUNT_OFFSET: usize = 0x15;

/// Offset of the GAP#3 length within a track header
pub const TRACK_GAP3_OFFSET: usize = 0x16;

/// Offset of the filler byte within a track header
pub const TRACK_FILLER_OFFSET: usize = 0x17;

/// FDC sector size code to byte size mapping
/// Index: size_code (0-8), Value: size in bytes
pub const FDC_SECTOR_SIZES: [usize; 9] = [
    128,    // 0
    256,    // 1
    512,    // 2
    1024,   // 3
    2048,   // 4
    4096,   // 5
    8192,   // 6
    16384,  // 7
    32768,  // 8
];

/// Convert an FDC size code to a byte size (`128 << N`, capped at code 8)
#[inline]
pub fn fdc_size_to_bytes(size_code: u8) -> usize {
    if size_code as usize >= FDC_SECTOR_SIZES.len() {
        // Invalid size code, return default
        512
    } else {
        FDC_SECTOR_SIZES[size_code as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fdc_size_to_bytes() {
        assert_eq!(fdc_size_to_bytes(0), 128);
        assert_eq!(fdc_size_to_bytes(1), 256);
        assert_eq!(fdc_size_to_bytes(2), 512);
        assert_eq!(fdc_size_to_bytes(3), 1024);
        assert_eq!(fdc_size_to_bytes(8), 32768);
    }

    #[test]
    fn test_fdc_size_to_bytes_invalid() {
        // Invalid size codes fall back to 512
        assert_eq!(fdc_size_to_bytes(9), 512);
        assert_eq!(fdc_size_to_bytes(255), 512);
    }
}
