/// Container format identification and constants

/// Format constants
pub mod constants;

pub use constants::*;

/// Disk image container format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// Standard DSK format with a uniform track size
    Standard,
    /// Extended DSK format with per-track sizes
    Extended,
}

impl ImageFormat {
    /// Get a human-readable name for this format
    pub fn name(&self) -> &'static str {
        match self {
            ImageFormat::Standard => "Standard DSK",
            ImageFormat::Extended => "Extended DSK",
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect the container format from the disk header signature
pub fn detect_format(header: &[u8]) -> Option<ImageFormat> {
    if header.len() < 8 {
        return None;
    }

    if header.starts_with(EXTENDED_DSK_SIGNATURE) {
        Some(ImageFormat::Extended)
    } else if header.starts_with(STANDARD_DSK_SIGNATURE) {
        Some(ImageFormat::Standard)
    } else {
        None
    }
}
