use thiserror::Error;

/// Result type alias for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors that can occur when working with disk image archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// I/O error occurred while reading an image or spawning the reader tool
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File of zero length
    #[error("Empty image: file has zero length")]
    EmptyImage,

    /// Header does not match either the DSK or EDSK signature
    #[error("Unknown signature: not a DSK or EDSK image")]
    UnknownSignature,

    /// Tracks or sides byte in the disk header is zero
    #[error("Invalid geometry: {tracks} track(s), {sides} side(s)")]
    InvalidGeometry {
        /// Track count from the disk header
        tracks: u8,
        /// Side count from the disk header
        sides: u8,
    },

    /// Track data extends past the end of the image
    #[error("Track {track} side {side} extends to offset {end} past end of image ({len} bytes)")]
    OutOfBounds {
        /// Track number
        track: u8,
        /// Side number
        side: u8,
        /// End offset the track would need
        end: usize,
        /// Actual image length
        len: usize,
    },

    /// A track's declared size cannot hold its 256-byte header
    #[error("Track {track} side {side} declares {size} bytes, too small for a track header")]
    TrackHeaderTooSmall {
        /// Track number
        track: u8,
        /// Side number
        side: u8,
        /// Declared track size
        size: usize,
    },

    /// Filesystem operation requested on an image that holds no FAT volume
    #[error("Not a FAT filesystem")]
    NotFatFilesystem,

    /// Recover/read request with a cluster below 2 or past the data area
    #[error("Invalid cluster {0}")]
    InvalidCluster(u16),

    /// File not found in the filesystem
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Acquisition requested while another read is in flight
    #[error("Device busy: another acquisition is in progress")]
    DeviceBusy,

    /// The external reader tool exited with a failure
    #[error("External read failed: {stderr}")]
    ExternalReadFailed {
        /// Captured standard-error text from the tool
        stderr: String,
    },

    /// The acquisition read was aborted by a cancellation request
    #[error("Read cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ArchiveError::InvalidGeometry { tracks: 0, sides: 2 };
        assert_eq!(err.to_string(), "Invalid geometry: 0 track(s), 2 side(s)");
    }

    #[test]
    fn test_out_of_bounds_display() {
        let err = ArchiveError::OutOfBounds {
            track: 12,
            side: 1,
            end: 40000,
            len: 32768,
        };
        assert_eq!(
            err.to_string(),
            "Track 12 side 1 extends to offset 40000 past end of image (32768 bytes)"
        );
    }

    #[test]
    fn test_external_read_failed_display() {
        let err = ArchiveError::ExternalReadFailed {
            stderr: "no device found".to_string(),
        };
        assert_eq!(err.to_string(), "External read failed: no device found");
    }
}
