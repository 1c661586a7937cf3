/// FAT12 traversal engine
///
/// Decodes the 12-bit packed allocation table out of a flat image, walks
/// cluster chains with bounded termination, parses directories with VFAT
/// long-filename reassembly, and judges whether tombstoned entries can
/// still be recovered from contiguous free clusters.
///
/// Operations degrade to empty or partial results on bounds violations or
/// table inconsistencies; the caller receives whatever prefix is readable.

use std::collections::HashSet;

use crate::boot::{BiosParameterBlock, FilesystemDescriptor};
use crate::error::{ArchiveError, Result};
use crate::filesystem::{
    format_dos_date, format_dos_time, short_name, DeletedEntry, DirEntry, ATTR_DIRECTORY,
    ATTR_HIDDEN, ATTR_LONG_NAME, ATTR_READ_ONLY, ATTR_SYSTEM, ATTR_VOLUME_ID, DELETED_MARKER,
    DIR_ENTRY_SIZE,
};
use crate::flat::FlatImage;
use crate::image::ImageIndex;

/// Start of the reserved/bad range (0xFF0..=0xFF7); these and the
/// end-of-chain sentinels (0xFF8..=0xFFF) both stop traversal
const CHAIN_RESERVED: u16 = 0xFF0;

/// A mounted read-only FAT12 volume
pub struct Fat12FileSystem {
    flat: FlatImage,
    bpb: BiosParameterBlock,
    fat: Vec<u16>,
}

impl Fat12FileSystem {
    /// Mount the FAT volume identified inside a parsed image
    ///
    /// Builds a flat LBA view of the image and decodes the first FAT copy.
    /// Fails with [`ArchiveError::NotFatFilesystem`] when the descriptor is
    /// not FAT.
    pub fn open(
        descriptor: &FilesystemDescriptor,
        index: &ImageIndex,
        data: &[u8],
    ) -> Result<Self> {
        let FilesystemDescriptor::Fat(bpb) = descriptor else {
            return Err(ArchiveError::NotFatFilesystem);
        };
        Ok(Self::from_flat(FlatImage::build(index, data), bpb.clone()))
    }

    /// Mount a FAT volume over an already-flattened sector stream
    pub fn from_flat(flat: FlatImage, bpb: BiosParameterBlock) -> Self {
        let fat = decode_fat(&flat, &bpb);
        Self { flat, bpb, fat }
    }

    /// The volume's BIOS parameter block
    pub fn bpb(&self) -> &BiosParameterBlock {
        &self.bpb
    }

    /// The flat image backing the volume
    pub fn flat(&self) -> &FlatImage {
        &self.flat
    }

    /// The decoded 12-bit FAT entry for a cluster, if in range
    pub fn fat_entry(&self, cluster: u16) -> Option<u16> {
        self.fat.get(cluster as usize).copied()
    }

    /// Number of decoded FAT entries (cluster indices 0 and 1 included)
    pub fn fat_len(&self) -> usize {
        self.fat.len()
    }

    fn fat_start(&self) -> usize {
        self.bpb.reserved_sectors as usize * self.bpb.bytes_per_sector as usize
    }

    fn root_start(&self) -> usize {
        self.fat_start()
            + self.bpb.fat_count as usize
                * self.bpb.sectors_per_fat as usize
                * self.bpb.bytes_per_sector as usize
    }

    fn data_start(&self) -> usize {
        let bps = self.bpb.bytes_per_sector as usize;
        if bps == 0 {
            return 0;
        }
        let root_bytes = self.bpb.root_entries as usize * DIR_ENTRY_SIZE;
        self.root_start() + root_bytes.div_ceil(bps) * bps
    }

    /// Raw bytes of the fixed root directory region, clamped to the image
    fn root_directory_bytes(&self) -> &[u8] {
        let start = self.root_start();
        let end = (start + self.bpb.root_entries as usize * DIR_ENTRY_SIZE)
            .min(self.flat.len());
        if start >= end {
            &[]
        } else {
            &self.flat.data()[start..end]
        }
    }

    /// Follow a cluster chain, appending up to `max_bytes` of payload
    ///
    /// Terminates on the end-of-chain sentinel, a free or reserved entry, an
    /// out-of-bounds offset, or after visiting every FAT entry once, so a
    /// cyclic table cannot loop.
    fn read_chain(&self, start: u16, max_bytes: usize) -> Vec<u8> {
        let cluster_bytes = self.bpb.cluster_bytes();
        if cluster_bytes == 0 {
            return Vec::new();
        }
        let data_start = self.data_start();
        let flat = self.flat.data();

        let mut out = Vec::new();
        let mut remaining = max_bytes;
        let mut cluster = start;
        let mut visited = 0usize;

        while remaining > 0 && (2..CHAIN_RESERVED).contains(&cluster) && visited < self.fat.len()
        {
            let offset = data_start + (cluster as usize - 2) * cluster_bytes;
            if offset >= flat.len() {
                break;
            }
            let take = cluster_bytes.min(remaining).min(flat.len() - offset);
            out.extend_from_slice(&flat[offset..offset + take]);
            remaining -= take;
            visited += 1;

            cluster = match self.fat.get(cluster as usize) {
                Some(&next) => next,
                None => break,
            };
        }

        out
    }

    /// Read a file's payload by its directory entry
    pub fn read_file(&self, entry: &DirEntry) -> Vec<u8> {
        self.read_file_at(entry.cluster, entry.size)
    }

    /// Read `size` bytes of a live file starting at `cluster`
    pub fn read_file_at(&self, cluster: u16, size: u32) -> Vec<u8> {
        self.read_chain(cluster, size as usize)
    }

    /// Parse one directory buffer into raw entries
    ///
    /// Synthetic `.` / `..` records are included; `path` is set to the bare
    /// name. Deleted records are skipped (see [`Self::deleted_entries`]).
    pub fn parse_directory(&self, dir: &[u8]) -> Vec<DirEntry> {
        let mut entries = Vec::new();
        let mut lfn_parts: Vec<(u8, String)> = Vec::new();

        for record in dir.chunks_exact(DIR_ENTRY_SIZE) {
            if record[0] == 0x00 {
                break;
            }
            if record[0] == DELETED_MARKER {
                lfn_parts.clear();
                continue;
            }

            let attr = record[11];
            if attr == ATTR_LONG_NAME {
                let sequence = record[0] & 0x3F;
                if record[0] & 0x40 != 0 {
                    // Last logical fragment arrives first physically
                    lfn_parts.clear();
                }
                lfn_parts.push((sequence, lfn_fragment(record)));
                continue;
            }

            let short = short_name(&record[0..8], &record[8..11]);
            let long = if lfn_parts.is_empty() {
                None
            } else {
                lfn_parts.sort_by_key(|&(seq, _)| seq);
                let name: String = lfn_parts.iter().map(|(_, s)| s.as_str()).collect();
                lfn_parts.clear();
                Some(name)
            };

            let cluster = u16::from_le_bytes([record[26], record[27]]);
            let size = u32::from_le_bytes([record[28], record[29], record[30], record[31]]);
            let time = u16::from_le_bytes([record[22], record[23]]);
            let date = u16::from_le_bytes([record[24], record[25]]);

            let name = long.clone().unwrap_or_else(|| short.clone());
            entries.push(DirEntry {
                path: name.clone(),
                name,
                short_name: short,
                long_name: long,
                attr,
                is_dir: attr & ATTR_DIRECTORY != 0,
                is_hidden: attr & ATTR_HIDDEN != 0,
                is_system: attr & ATTR_SYSTEM != 0,
                is_read_only: attr & ATTR_READ_ONLY != 0,
                is_volume_label: attr & ATTR_VOLUME_ID != 0,
                size,
                cluster,
                date: format_dos_date(date),
                time: format_dos_time(time),
            });
        }

        entries
    }

    /// Raw entries of the root directory
    pub fn root_entries(&self) -> Vec<DirEntry> {
        self.parse_directory(self.root_directory_bytes())
    }

    /// Walk the whole directory tree, producing a flat slash-joined listing
    ///
    /// Root entries carry no leading slash. `.` / `..` records are skipped
    /// and each subdirectory cluster is descended into at most once.
    pub fn list_files(&self) -> Vec<DirEntry> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.walk_into(self.root_directory_bytes().to_vec(), "", &mut visited, &mut out);
        out
    }

    fn walk_into(
        &self,
        dir: Vec<u8>,
        prefix: &str,
        visited: &mut HashSet<u16>,
        out: &mut Vec<DirEntry>,
    ) {
        for mut entry in self.parse_directory(&dir) {
            if entry.is_dot() {
                continue;
            }
            entry.path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };

            let descend = entry.is_dir && entry.cluster >= 2 && visited.insert(entry.cluster);
            let path = entry.path.clone();
            let cluster = entry.cluster;
            out.push(entry);

            if descend {
                // Directories have no declared size: read to end of chain
                let sub = self.read_chain(cluster, usize::MAX);
                self.walk_into(sub, &path, visited, out);
            }
        }
    }

    /// Scan the directory tree for tombstoned entries and score each one
    ///
    /// Deleted LFN fragments are not reconstructed; the deletion marker
    /// overwrites their sequence byte, so only the 8.3 record survives with
    /// `?` in place of the lost first character.
    pub fn deleted_entries(&self) -> Vec<DeletedEntry> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.scan_deleted_into(self.root_directory_bytes().to_vec(), "", &mut visited, &mut out);
        out
    }

    fn scan_deleted_into(
        &self,
        dir: Vec<u8>,
        prefix: &str,
        visited: &mut HashSet<u16>,
        out: &mut Vec<DeletedEntry>,
    ) {
        for record in dir.chunks_exact(DIR_ENTRY_SIZE) {
            if record[0] == 0x00 {
                break;
            }
            if record[0] != DELETED_MARKER {
                continue;
            }

            let attr = record[11];
            if attr == ATTR_LONG_NAME
                || attr & ATTR_DIRECTORY != 0
                || attr & ATTR_VOLUME_ID != 0
            {
                continue;
            }

            let cluster = u16::from_le_bytes([record[26], record[27]]);
            let size = u32::from_le_bytes([record[28], record[29], record[30], record[31]]);
            if cluster < 2 || size == 0 {
                continue;
            }

            let mut name_bytes = [0u8; 8];
            name_bytes.copy_from_slice(&record[0..8]);
            name_bytes[0] = b'?';
            let short = short_name(&name_bytes, &record[8..11]);

            let time = u16::from_le_bytes([record[22], record[23]]);
            let date = u16::from_le_bytes([record[24], record[25]]);
            let (recoverable, reason) = self.recoverability(cluster, size);

            let path = if prefix.is_empty() {
                short.clone()
            } else {
                format!("{}/{}", prefix, short)
            };
            out.push(DeletedEntry {
                entry: DirEntry {
                    name: short.clone(),
                    short_name: short,
                    long_name: None,
                    attr,
                    is_dir: false,
                    is_hidden: attr & ATTR_HIDDEN != 0,
                    is_system: attr & ATTR_SYSTEM != 0,
                    is_read_only: attr & ATTR_READ_ONLY != 0,
                    is_volume_label: false,
                    size,
                    cluster,
                    date: format_dos_date(date),
                    time: format_dos_time(time),
                    path,
                },
                recoverable,
                reason,
            });
        }

        // Descend through the live tree to reach tombstones in subdirectories
        for entry in self.parse_directory(&dir) {
            if entry.is_dot() || !entry.is_dir || entry.cluster < 2 {
                continue;
            }
            if !visited.insert(entry.cluster) {
                continue;
            }
            let sub_prefix = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{}/{}", prefix, entry.name)
            };
            let sub = self.read_chain(entry.cluster, usize::MAX);
            self.scan_deleted_into(sub, &sub_prefix, visited, out);
        }
    }

    /// Judge whether a deleted file is recoverable from contiguous clusters
    ///
    /// Assumes the file was stored contiguously and its chain was zeroed on
    /// deletion: the run of free FAT entries from the start cluster must
    /// cover the file. Any non-zero entry (a reallocation or a bad-cluster
    /// mark) breaks the run.
    fn recoverability(&self, cluster: u16, size: u32) -> (bool, String) {
        let cluster_bytes = self.bpb.cluster_bytes().max(1) as u32;
        let needed = size.div_ceil(cluster_bytes).max(1) as usize;
        let start = cluster as usize;

        if start < 2 || start >= self.fat.len() || self.fat[start] != 0 {
            return (false, "Start cluster reallocated".to_string());
        }

        let mut free = 0usize;
        for i in start..(start + needed).min(self.fat.len()) {
            if self.fat[i] == 0 {
                free += 1;
            } else {
                break;
            }
        }

        if free >= needed {
            let reason = if needed == 1 {
                "1 cluster free".to_string()
            } else {
                format!("{} clusters free", needed)
            };
            (true, reason)
        } else {
            (false, format!("Only {}/{} clusters free", free, needed))
        }
    }

    /// Read back a deleted file from consecutive clusters
    ///
    /// The FAT chain was zeroed on deletion, so the read ignores the table
    /// and takes `ceil(size / cluster_bytes)` clusters straight from the
    /// start cluster, truncated to `size` or to the end of the image.
    pub fn recover_deleted(&self, cluster: u16, size: u32) -> Result<Vec<u8>> {
        let cluster_bytes = self.bpb.cluster_bytes();
        if cluster_bytes == 0 || cluster < 2 {
            return Err(ArchiveError::InvalidCluster(cluster));
        }
        let first = self.data_start() + (cluster as usize - 2) * cluster_bytes;
        let flat = self.flat.data();
        if first >= flat.len() {
            return Err(ArchiveError::InvalidCluster(cluster));
        }

        let needed = (size as usize).div_ceil(cluster_bytes).max(1);
        let mut out = Vec::with_capacity(size as usize);
        let mut remaining = size as usize;

        for i in 0..needed {
            let offset = first + i * cluster_bytes;
            if offset >= flat.len() || remaining == 0 {
                break;
            }
            let take = cluster_bytes.min(remaining).min(flat.len() - offset);
            out.extend_from_slice(&flat[offset..offset + take]);
            remaining -= take;
        }

        Ok(out)
    }
}

/// Decode the first FAT copy into 12-bit entries
///
/// The table covers `total_sectors / sectors_per_cluster + 2` entries; for
/// entry `i` the 16-bit word at `fat_start + i*3/2` holds the low 12 bits
/// when `i` is even and the high 12 bits when odd. Words past the end of
/// the image decode as free.
fn decode_fat(flat: &FlatImage, bpb: &BiosParameterBlock) -> Vec<u16> {
    if bpb.bytes_per_sector == 0 || bpb.sectors_per_cluster == 0 {
        return Vec::new();
    }
    let entry_count = bpb.total_sectors as usize / bpb.sectors_per_cluster as usize + 2;
    let fat_start = bpb.reserved_sectors as usize * bpb.bytes_per_sector as usize;
    let data = flat.data();

    (0..entry_count)
        .map(|i| {
            let offset = fat_start + i * 3 / 2;
            if offset + 1 >= data.len() {
                return 0;
            }
            let word = u16::from_le_bytes([data[offset], data[offset + 1]]);
            if i % 2 == 0 {
                word & 0x0FFF
            } else {
                word >> 4
            }
        })
        .collect()
}

/// Extract one LFN fragment's characters
///
/// UTF-16LE code units live in three disjoint ranges of the record; a unit
/// of 0x0000 or 0xFFFF ends the fragment.
fn lfn_fragment(record: &[u8]) -> String {
    let mut units = Vec::with_capacity(13);
    for pair in record[1..11]
        .chunks_exact(2)
        .chain(record[14..26].chunks_exact(2))
        .chain(record[28..32].chunks_exact(2))
    {
        units.push(u16::from_le_bytes([pair[0], pair[1]]));
    }

    units
        .into_iter()
        .take_while(|&u| u != 0x0000 && u != 0xFFFF)
        .flat_map(|u| char::from_u32(u as u32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BPS: usize = 512;

    fn test_bpb() -> BiosParameterBlock {
        BiosParameterBlock {
            oem: "TEST".to_string(),
            bytes_per_sector: BPS as u16,
            sectors_per_cluster: 1,
            reserved_sectors: 1,
            fat_count: 1,
            root_entries: 16,
            total_sectors: 64,
            media_descriptor: 0xF0,
            sectors_per_fat: 1,
            sectors_per_track: 9,
            heads: 1,
            volume_label: "TEST".to_string(),
            fs_type: "FAT12".to_string(),
        }
    }

    fn set_fat12(fat: &mut [u8], index: usize, value: u16) {
        let off = index * 3 / 2;
        let word = u16::from_le_bytes([fat[off], fat[off + 1]]);
        let new = if index % 2 == 0 {
            (word & 0xF000) | (value & 0x0FFF)
        } else {
            (word & 0x000F) | (value << 4)
        };
        fat[off..off + 2].copy_from_slice(&new.to_le_bytes());
    }

    fn dir_record(name: &[u8; 11], attr: u8, cluster: u16, size: u32) -> [u8; 32] {
        let mut record = [0u8; 32];
        record[0..11].copy_from_slice(name);
        record[11] = attr;
        // 1994-06-12 17:42
        let time: u16 = (17 << 11) | (42 << 5);
        let date: u16 = (14 << 9) | (6 << 5) | 12;
        record[22..24].copy_from_slice(&time.to_le_bytes());
        record[24..26].copy_from_slice(&date.to_le_bytes());
        record[26..28].copy_from_slice(&cluster.to_le_bytes());
        record[28..32].copy_from_slice(&size.to_le_bytes());
        record
    }

    fn lfn_record(sequence: u8, last: bool, chars: &[u16]) -> [u8; 32] {
        let mut units = [0xFFFFu16; 13];
        for (i, &c) in chars.iter().enumerate() {
            units[i] = c;
        }
        if chars.len() < 13 {
            units[chars.len()] = 0x0000;
        }

        let mut record = [0u8; 32];
        record[0] = sequence | if last { 0x40 } else { 0 };
        record[11] = ATTR_LONG_NAME;
        let ranges: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];
        let mut unit = 0;
        for (start, count) in ranges {
            for i in 0..count {
                let bytes = units[unit].to_le_bytes();
                record[start + i * 2] = bytes[0];
                record[start + i * 2 + 1] = bytes[1];
                unit += 1;
            }
        }
        record
    }

    /// Build a small volume:
    ///   HELLO.TXT   cluster 2, 700 bytes, chain 2 -> 3
    ///   SUB/        cluster 4, containing NOTE.TXT (cluster 5, 100 bytes)
    ///   ?OST.TXT    deleted, cluster 6, 1000 bytes (clusters 6,7 free)
    ///   LFN file    "Très_Long_Name.TXT" as TRES_L~1.TXT, cluster 8
    fn build_volume() -> Fat12FileSystem {
        let bpb = test_bpb();
        let mut data = vec![0u8; 64 * BPS];

        // FAT at sector 1
        {
            let fat = &mut data[BPS..2 * BPS];
            set_fat12(fat, 0, 0xFF0);
            set_fat12(fat, 1, 0xFFF);
            set_fat12(fat, 2, 3);
            set_fat12(fat, 3, 0xFFF);
            set_fat12(fat, 4, 0xFFF);
            set_fat12(fat, 5, 0xFFF);
            // 6 and 7 stay free for the deleted file
            set_fat12(fat, 8, 0xFFF);
        }

        // Root directory at sector 2
        {
            let long: Vec<u16> = "Très_Long_Name.TXT".encode_utf16().collect();
            let records: Vec<[u8; 32]> = vec![
                dir_record(b"HELLO   TXT", 0x20, 2, 700),
                dir_record(b"SUB        ", ATTR_DIRECTORY, 4, 0),
                {
                    let mut r = dir_record(b"LOST    TXT", 0x20, 6, 1000);
                    r[0] = DELETED_MARKER;
                    r
                },
                lfn_record(2, true, &long[13..]),
                lfn_record(1, false, &long[..13]),
                dir_record(b"TRES_L~1TXT", 0x20, 8, 10),
            ];
            let root = &mut data[2 * BPS..3 * BPS];
            for (i, record) in records.iter().enumerate() {
                root[i * 32..(i + 1) * 32].copy_from_slice(record);
            }
        }

        // Data area starts at sector 3 (cluster 2)
        let data_start = 3 * BPS;
        data[data_start..data_start + BPS].fill(b'A');
        data[data_start + BPS..data_start + 2 * BPS].fill(b'B');
        // Cluster 4: SUB directory
        {
            let dot = dir_record(b".          ", ATTR_DIRECTORY, 4, 0);
            let dotdot = dir_record(b"..         ", ATTR_DIRECTORY, 0, 0);
            let note = dir_record(b"NOTE    TXT", 0x20, 5, 100);
            let sub = &mut data[data_start + 2 * BPS..data_start + 3 * BPS];
            sub[0..32].copy_from_slice(&dot);
            sub[32..64].copy_from_slice(&dotdot);
            sub[64..96].copy_from_slice(&note);
        }
        data[data_start + 3 * BPS..data_start + 4 * BPS].fill(b'C');
        data[data_start + 4 * BPS..data_start + 5 * BPS].fill(b'D');
        data[data_start + 5 * BPS..data_start + 6 * BPS].fill(b'E');
        data[data_start + 6 * BPS..data_start + 7 * BPS].fill(b'F');

        Fat12FileSystem::from_flat(FlatImage::from_raw(data, BPS, 9), bpb)
    }

    #[test]
    fn test_fat_decode_packing() {
        let fs = build_volume();
        assert_eq!(fs.fat_entry(0), Some(0xFF0));
        assert_eq!(fs.fat_entry(1), Some(0xFFF));
        assert_eq!(fs.fat_entry(2), Some(3));
        assert_eq!(fs.fat_entry(3), Some(0xFFF));
        assert_eq!(fs.fat_entry(6), Some(0));
        assert_eq!(fs.fat_len(), 66);
    }

    #[test]
    fn test_read_file_follows_chain() {
        let fs = build_volume();
        let data = fs.read_file_at(2, 700);
        assert_eq!(data.len(), 700);
        assert!(data[..512].iter().all(|&b| b == b'A'));
        assert!(data[512..].iter().all(|&b| b == b'B'));
    }

    #[test]
    fn test_read_stops_on_free_cluster() {
        // Cluster 6 is free: a chain starting there yields nothing
        let fs = build_volume();
        assert!(fs.read_file_at(6, 100).is_empty());
    }

    #[test]
    fn test_chain_cycle_terminates() {
        let bpb = test_bpb();
        let mut data = vec![0u8; 64 * BPS];
        {
            let fat = &mut data[BPS..2 * BPS];
            set_fat12(fat, 2, 3);
            set_fat12(fat, 3, 2);
        }
        let fs = Fat12FileSystem::from_flat(FlatImage::from_raw(data, BPS, 9), bpb);

        let out = fs.read_file_at(2, u32::MAX);
        // One visit per FAT entry at most
        assert!(out.len() <= fs.fat_len() * BPS);
    }

    #[test]
    fn test_list_files_recursive_paths() {
        let fs = build_volume();
        let paths: Vec<String> = fs.list_files().into_iter().map(|e| e.path).collect();
        assert_eq!(
            paths,
            vec![
                "HELLO.TXT",
                "SUB",
                "SUB/NOTE.TXT",
                "Très_Long_Name.TXT",
            ]
        );
    }

    #[test]
    fn test_walk_idempotent() {
        let fs = build_volume();
        let first = fs.list_files();
        let second = fs.list_files();
        assert_eq!(first, second);
    }

    #[test]
    fn test_lfn_reassembly() {
        let fs = build_volume();
        let files = fs.list_files();
        let entry = files.iter().find(|e| e.short_name == "TRES_L~1.TXT").unwrap();
        assert_eq!(entry.long_name.as_deref(), Some("Très_Long_Name.TXT"));
        assert_eq!(entry.name, "Très_Long_Name.TXT");
    }

    #[test]
    fn test_entry_metadata() {
        let fs = build_volume();
        let files = fs.list_files();
        let hello = files.iter().find(|e| e.name == "HELLO.TXT").unwrap();
        assert_eq!(hello.cluster, 2);
        assert_eq!(hello.size, 700);
        assert_eq!(hello.date, "1994-06-12");
        assert_eq!(hello.time, "17:42");
        assert!(!hello.is_dir);

        let sub = files.iter().find(|e| e.name == "SUB").unwrap();
        assert!(sub.is_dir);
    }

    #[test]
    fn test_raw_parse_keeps_dot_entries() {
        let fs = build_volume();
        let sub = fs.read_chain(4, usize::MAX);
        let entries = fs.parse_directory(&sub);
        assert_eq!(entries[0].short_name, ".");
        assert_eq!(entries[1].short_name, "..");
        assert_eq!(entries[2].short_name, "NOTE.TXT");
    }

    #[test]
    fn test_deleted_scan() {
        let fs = build_volume();
        let deleted = fs.deleted_entries();
        assert_eq!(deleted.len(), 1);

        let lost = &deleted[0];
        assert_eq!(lost.entry.short_name, "?OST.TXT");
        assert_eq!(lost.entry.cluster, 6);
        assert_eq!(lost.entry.size, 1000);
        assert!(lost.recoverable);
        assert_eq!(lost.reason, "2 clusters free");
    }

    #[test]
    fn test_deleted_not_recoverable_when_reallocated() {
        let mut fs = build_volume();
        // Reallocate cluster 7: only 1 of 2 needed clusters stays free
        fs.fat[7] = 0xFFF;
        let deleted = fs.deleted_entries();
        assert!(!deleted[0].recoverable);
        assert_eq!(deleted[0].reason, "Only 1/2 clusters free");

        // Reallocate the start cluster itself
        fs.fat[6] = 0x123;
        let deleted = fs.deleted_entries();
        assert!(!deleted[0].recoverable);
        assert_eq!(deleted[0].reason, "Start cluster reallocated");
    }

    #[test]
    fn test_recover_deleted_reads_contiguous() {
        let fs = build_volume();
        let data = fs.recover_deleted(6, 1000).unwrap();
        assert_eq!(data.len(), 1000);
        assert!(data[..512].iter().all(|&b| b == b'E'));
        assert!(data[512..].iter().all(|&b| b == b'F'));
    }

    #[test]
    fn test_recover_invalid_cluster() {
        let fs = build_volume();
        assert!(matches!(
            fs.recover_deleted(1, 100),
            Err(ArchiveError::InvalidCluster(1))
        ));
        assert!(matches!(
            fs.recover_deleted(4000, 100),
            Err(ArchiveError::InvalidCluster(4000))
        ));
    }

    #[test]
    fn test_bpb_derived_offsets() {
        // 720K geometry: rootStart = (1+6)*512, dataStart = (1+6+7)*512
        let bpb = BiosParameterBlock {
            oem: String::new(),
            bytes_per_sector: 512,
            sectors_per_cluster: 2,
            reserved_sectors: 1,
            fat_count: 2,
            root_entries: 112,
            total_sectors: 1440,
            media_descriptor: 0xF9,
            sectors_per_fat: 3,
            sectors_per_track: 9,
            heads: 2,
            volume_label: String::new(),
            fs_type: "FAT12".to_string(),
        };
        let mut data = vec![0u8; 1440 * 512];
        data[7168..8192].fill(0x42);
        let fs = Fat12FileSystem::from_flat(FlatImage::from_raw(data, 512, 9), bpb);

        assert_eq!(fs.root_start(), 3584);
        assert_eq!(fs.data_start(), 7168);

        // Cluster 2 starts exactly at the data area
        let recovered = fs.recover_deleted(2, 1024).unwrap();
        assert_eq!(recovered.len(), 1024);
        assert!(recovered.iter().all(|&b| b == 0x42));
    }

    #[test]
    fn test_open_rejects_non_fat() {
        let data = vec![0u8; 4096];
        let descriptor = FilesystemDescriptor::Unknown;
        let index_data = {
            // Tiny standard DSK so the index parses
            use crate::format::constants::*;
            let mut d = vec![0u8; DISK_HEADER_SIZE];
            d[..STANDARD_DSK_SIGNATURE.len()].copy_from_slice(STANDARD_DSK_SIGNATURE);
            d[DISK_TRACK_COUNT_OFFSET] = 1;
            d[DISK_SIDE_COUNT_OFFSET] = 1;
            let size = TRACK_HEADER_SIZE;
            d[DISK_TRACK_SIZE_OFFSET] = (size & 0xFF) as u8;
            d[DISK_TRACK_SIZE_OFFSET + 1] = (size >> 8) as u8;
            d.extend_from_slice(&[0u8; TRACK_HEADER_SIZE]);
            d
        };
        let index = ImageIndex::parse(&index_data).unwrap();
        assert!(matches!(
            Fat12FileSystem::open(&descriptor, &index, &data),
            Err(ArchiveError::NotFatFilesystem)
        ));
    }
}
