/// Boot sector inspection and filesystem identification
///
/// Examines the first sector of track 0 side 0 to decide what filesystem,
/// if any, is layered inside the image.

use crate::image::ImageIndex;

/// Decoded BIOS Parameter Block from a FAT boot sector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// OEM name string
    pub oem: String,
    /// Bytes per logical sector
    pub bytes_per_sector: u16,
    /// Sectors per allocation cluster
    pub sectors_per_cluster: u8,
    /// Reserved sectors before the first FAT
    pub reserved_sectors: u16,
    /// Number of FAT copies
    pub fat_count: u8,
    /// Root directory entry capacity
    pub root_entries: u16,
    /// Total sectors on the volume
    pub total_sectors: u32,
    /// Media descriptor byte
    pub media_descriptor: u8,
    /// Sectors per FAT copy
    pub sectors_per_fat: u16,
    /// Sectors per track from the BPB geometry fields
    pub sectors_per_track: u16,
    /// Head count from the BPB geometry fields
    pub heads: u16,
    /// Volume label string
    pub volume_label: String,
    /// Filesystem type string (e.g. "FAT12")
    pub fs_type: String,
}

impl BiosParameterBlock {
    /// Decode a BPB from boot-sector bytes; `None` if too short
    pub fn parse(boot: &[u8]) -> Option<Self> {
        if boot.len() < 62 {
            return None;
        }

        let total_sectors_16 = u16::from_le_bytes([boot[19], boot[20]]) as u32;
        let total_sectors = if total_sectors_16 != 0 {
            total_sectors_16
        } else {
            u32::from_le_bytes([boot[32], boot[33], boot[34], boot[35]])
        };

        Some(Self {
            oem: ascii_trimmed(&boot[3..11]),
            bytes_per_sector: u16::from_le_bytes([boot[11], boot[12]]),
            sectors_per_cluster: boot[13],
            reserved_sectors: u16::from_le_bytes([boot[14], boot[15]]),
            fat_count: boot[16],
            root_entries: u16::from_le_bytes([boot[17], boot[18]]),
            total_sectors,
            media_descriptor: boot[21],
            sectors_per_fat: u16::from_le_bytes([boot[22], boot[23]]),
            sectors_per_track: u16::from_le_bytes([boot[24], boot[25]]),
            heads: u16::from_le_bytes([boot[26], boot[27]]),
            volume_label: ascii_trimmed(&boot[43..54]),
            fs_type: ascii_trimmed(&boot[54..62]),
        })
    }

    /// Bytes per allocation cluster
    pub fn cluster_bytes(&self) -> usize {
        self.bytes_per_sector as usize * self.sectors_per_cluster as usize
    }
}

/// Identified filesystem layered inside an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilesystemDescriptor {
    /// A FAT volume with its decoded BPB
    Fat(BiosParameterBlock),
    /// CPC/CP-M sector numbering; identified but not parsed further
    Cpc {
        /// Short description of what was identified
        note: String,
    },
    /// Nothing recognizable
    Unknown,
}

impl FilesystemDescriptor {
    /// Short display name of the identified filesystem
    pub fn name(&self) -> &'static str {
        match self {
            FilesystemDescriptor::Fat(_) => "FAT",
            FilesystemDescriptor::Cpc { .. } => "CPC",
            FilesystemDescriptor::Unknown => "Unknown",
        }
    }
}

/// Identify the filesystem inside a parsed image
///
/// Reads up to 512 bytes from the first declared sector of track 0 side 0.
/// An x86 jump opcode (0xEB/0xE9) marks a FAT boot sector; otherwise CPC
/// data-format sector ids (0xC1-0xC9) on track 0 identify a CPC disk.
pub fn detect_filesystem(index: &ImageIndex, data: &[u8]) -> FilesystemDescriptor {
    let Some(track) = index.track(0, 0) else {
        return FilesystemDescriptor::Unknown;
    };

    let boot = track
        .sectors()
        .first()
        .and_then(|s| {
            let offset = s.data_offset?;
            let end = (offset + s.size.min(512)).min(data.len());
            (offset < end).then(|| &data[offset..end])
        })
        .unwrap_or(&[]);

    if !boot.is_empty() && (boot[0] == 0xEB || boot[0] == 0xE9) {
        if let Some(bpb) = BiosParameterBlock::parse(boot) {
            return FilesystemDescriptor::Fat(bpb);
        }
    }

    if track
        .sectors()
        .iter()
        .any(|s| (0xC1..=0xC9).contains(&s.id.sector))
    {
        return FilesystemDescriptor::Cpc {
            note: "CPC sector numbering (0xC1-0xC9) on track 0".to_string(),
        };
    }

    FilesystemDescriptor::Unknown
}

fn ascii_trimmed(bytes: &[u8]) -> String {
    let text: String = bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect();
    text.trim().to_string()
}
