/// Interactive archive console

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dskarchive::*;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{Context, Editor, Helper};

/// Image file extensions the console offers for listing
const IMAGE_EXTENSIONS: &[&str] = &["edsk", "dsk", "img", "ima"];

/// Command completer for the REPL
struct CommandCompleter {
    commands: Vec<&'static str>,
}

impl CommandCompleter {
    fn new() -> Self {
        Self {
            commands: vec![
                "acquire",
                "deleted",
                "dir",
                "exit",
                "fs-export",
                "fs-info",
                "fs-read",
                "gw-info",
                "help",
                "hex",
                "images",
                "info",
                "load",
                "ls",
                "map",
                "open",
                "quit",
                "read-sector",
                "recover",
                "rpm",
                "sectors",
                "storage",
                "tracks",
            ],
        }
    }
}

impl Completer for CommandCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        // Only complete the first word (command name)
        let line_to_cursor = &line[..pos];
        if line_to_cursor.contains(' ') {
            return Ok((pos, vec![]));
        }

        let prefix = line_to_cursor.to_lowercase();
        let matches: Vec<Pair> = self
            .commands
            .iter()
            .filter(|cmd| cmd.starts_with(&prefix))
            .map(|cmd| Pair {
                display: cmd.to_string(),
                replacement: cmd.to_string(),
            })
            .collect();

        Ok((0, matches))
    }
}

impl Hinter for CommandCompleter {
    type Hint = String;
}

impl Highlighter for CommandCompleter {}
impl Validator for CommandCompleter {}
impl Helper for CommandCompleter {}

/// Get the path to the history file
fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|mut p| {
        p.push(".dskarc_history");
        p
    })
}

/// Resolve a filename against the storage directory
fn resolve(storage: &Path, name: &str) -> PathBuf {
    let path = PathBuf::from(name);
    if path.is_absolute() {
        path
    } else {
        storage.join(name)
    }
}

fn main() {
    env_logger::init();

    println!("=== dskarchive ===");
    println!("Interactive console for floppy image archives.");
    println!("Type 'help' for available commands\n");

    let mut rl: Editor<CommandCompleter, FileHistory> =
        Editor::new().expect("Failed to create editor");
    rl.set_helper(Some(CommandCompleter::new()));

    if let Some(history_path) = history_path() {
        let _ = rl.load_history(&history_path);
    }

    let cache = DiskCache::new();
    let gw = GwController::new();
    let mut storage = PathBuf::from(".");
    let mut image: Option<Arc<ParsedImage>> = None;

    loop {
        let readline = rl.readline("> ");
        let input = match readline {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        };

        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let parts = parse_command_line(input);
        if parts.is_empty() {
            continue;
        }
        let command = parts[0].to_lowercase();

        match command.as_str() {
            "help" => {
                print_help();
            }
            "quit" | "exit" => {
                if let Some(history_path) = history_path() {
                    let _ = rl.save_history(&history_path);
                }
                println!("Goodbye!");
                break;
            }
            "storage" => {
                if parts.len() < 2 {
                    println!("Storage directory: {}", storage.display());
                } else {
                    storage = PathBuf::from(&parts[1]);
                    // A different directory invalidates every cached parse
                    cache.clear();
                    image = None;
                    println!("Storage directory set to: {}", storage.display());
                }
            }
            "images" => {
                list_images(&cache, &storage);
            }
            "open" | "load" => {
                if parts.len() < 2 {
                    println!("Usage: open <path>");
                    continue;
                }
                match cache.image(&resolve(&storage, &parts[1])) {
                    Ok(parsed) => {
                        println!(
                            "Opened: {} ({}, {} bytes)",
                            parsed.name,
                            parsed.index.format.name(),
                            parsed.size
                        );
                        image = Some(parsed);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            "info" => {
                if let Some(ref img) = image {
                    print_info(img);
                } else {
                    println!("No image loaded. Use 'open <path>' first.");
                }
            }
            "tracks" => {
                if let Some(ref img) = image {
                    list_tracks(&img.index);
                } else {
                    println!("No image loaded.");
                }
            }
            "sectors" => {
                if let Some(ref img) = image {
                    if parts.len() >= 2 {
                        let track: u8 = parts[1].parse().unwrap_or(0);
                        let side: u8 = if parts.len() >= 3 {
                            parts[2].parse().unwrap_or(0)
                        } else {
                            0
                        };
                        list_sectors_on_track(&img.index, track, side);
                    } else {
                        for entry in img.index.entries() {
                            if !entry.is_missing() {
                                list_sectors_on_track(&img.index, entry.track, entry.side);
                            }
                        }
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "read-sector" | "hex" => {
                if let Some(ref img) = image {
                    if parts.len() < 4 {
                        println!("Usage: read-sector <track> <side> <sector_id>");
                        continue;
                    }
                    let track: u8 = parts[1].parse().unwrap_or(0);
                    let side: u8 = parts[2].parse().unwrap_or(0);
                    let sector_id = parse_hex_or_dec(&parts[3]).unwrap_or(0xC1);

                    match img.index.sector_data(&img.data, track, side, sector_id) {
                        Some(data) => {
                            println!(
                                "Sector {}:{}:{} ({} bytes):",
                                track,
                                side,
                                sector_id,
                                data.len()
                            );
                            print_hex_dump(data, 256);
                        }
                        None => println!(
                            "Sector {} not found on track {} side {}.",
                            sector_id, track, side
                        ),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "map" => {
                if let Some(ref img) = image {
                    let side: u8 = if parts.len() >= 2 {
                        parts[1].parse().unwrap_or(0)
                    } else {
                        0
                    };
                    map::draw_sector_map(&img.index, &img.data, side);
                } else {
                    println!("No image loaded.");
                }
            }
            "fs-info" => {
                if let Some(ref img) = image {
                    print_filesystem_info(img);
                } else {
                    println!("No image loaded.");
                }
            }
            "dir" | "ls" => {
                if let Some(ref img) = image {
                    match mount_fat(img) {
                        Ok(fs) => {
                            let entries = fs.list_files();
                            if entries.is_empty() {
                                println!("No files found.");
                            } else {
                                println!(
                                    "{:<36} {:>8} {:>6} {:<10} {:<5} {}",
                                    "Path", "Size", "Clst", "Date", "Time", "Attr"
                                );
                                println!("{}", "-".repeat(78));
                                for entry in entries {
                                    println!(
                                        "{:<36} {:>8} {:>6} {:<10} {:<5} {}",
                                        entry.path,
                                        if entry.is_dir {
                                            "<DIR>".to_string()
                                        } else {
                                            entry.size.to_string()
                                        },
                                        entry.cluster,
                                        entry.date,
                                        entry.time,
                                        attr_string(&entry)
                                    );
                                }
                            }
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "deleted" => {
                if let Some(ref img) = image {
                    match mount_fat(img) {
                        Ok(fs) => {
                            let entries = fs.deleted_entries();
                            if entries.is_empty() {
                                println!("No deleted files found.");
                            } else {
                                println!(
                                    "{:<36} {:>8} {:>6} {:<12} {}",
                                    "Path", "Size", "Clst", "Recoverable", "Reason"
                                );
                                println!("{}", "-".repeat(78));
                                for deleted in entries {
                                    println!(
                                        "{:<36} {:>8} {:>6} {:<12} {}",
                                        deleted.entry.path,
                                        deleted.entry.size,
                                        deleted.entry.cluster,
                                        if deleted.recoverable { "Yes" } else { "No" },
                                        deleted.reason
                                    );
                                }
                            }
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "fs-read" => {
                if let Some(ref img) = image {
                    if parts.len() < 2 {
                        println!("Usage: fs-read <path>");
                        continue;
                    }
                    match read_fat_file(img, &parts[1]) {
                        Ok(data) => {
                            println!("File: {} ({} bytes)", parts[1], data.len());
                            print_hex_dump(&data, 256);
                        }
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "fs-export" => {
                if let Some(ref img) = image {
                    if parts.len() < 2 {
                        println!("Usage: fs-export <path> [output_path]");
                        continue;
                    }
                    let output = parts
                        .get(2)
                        .cloned()
                        .unwrap_or_else(|| flatten_name(&parts[1]));
                    match read_fat_file(img, &parts[1]) {
                        Ok(data) => match std::fs::write(&output, &data) {
                            Ok(_) => {
                                println!("Exported {} ({} bytes) to {}", parts[1], data.len(), output)
                            }
                            Err(e) => println!("Error writing file: {}", e),
                        },
                        Err(e) => println!("Error reading file: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "recover" => {
                if let Some(ref img) = image {
                    if parts.len() < 2 {
                        println!("Usage: recover <deleted-path> [output_path]");
                        continue;
                    }
                    let output = parts
                        .get(2)
                        .cloned()
                        .unwrap_or_else(|| flatten_name(&parts[1]).replace('?', "_"));
                    match recover_deleted_file(img, &parts[1]) {
                        Ok(data) => match std::fs::write(&output, &data) {
                            Ok(_) => println!(
                                "Recovered {} ({} bytes) to {}",
                                parts[1],
                                data.len(),
                                output
                            ),
                            Err(e) => println!("Error writing file: {}", e),
                        },
                        Err(e) => println!("Error: {}", e),
                    }
                } else {
                    println!("No image loaded.");
                }
            }
            "gw-info" => match gw.info() {
                Ok(pairs) => {
                    for (key, value) in pairs {
                        println!("{}: {}", key, value);
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            "rpm" => match gw.rpm() {
                Ok(rpm) => println!("{:.1} RPM", rpm),
                Err(e) => println!("Error: {}", e),
            },
            "acquire" => {
                if parts.len() < 2 {
                    println!("Usage: acquire <output.img> [format] [tracks]");
                    continue;
                }
                let output = resolve(&storage, &parts[1]);
                let options = ReadOptions {
                    format: parts.get(2).cloned(),
                    tracks: parts.get(3).cloned(),
                    ..ReadOptions::default()
                };
                let cancel = CancellationHandle::new();
                match gw.read(&output, &options, |line| println!("{}", line), &cancel) {
                    Ok(outcome) => {
                        // The fresh file must be reparsed on next open
                        if let Some(name) = output.file_name() {
                            cache.invalidate(&name.to_string_lossy());
                        }
                        println!("Acquisition complete: {}", outcome.last_line);
                    }
                    Err(e) => println!("Error: {}", e),
                }
            }
            _ => {
                println!(
                    "Unknown command: {}. Type 'help' for available commands.",
                    command
                );
            }
        }
    }
}

/// Parse command line input, respecting quoted strings
fn parse_command_line(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(current.clone());
                    current.clear();
                }
            }
            _ => {
                current.push(ch);
            }
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

fn print_help() {
    println!("Available commands:");
    println!("  storage [path]                - Show or set the image storage directory");
    println!("  images                        - List images in the storage directory with status");
    println!("  open <path>                   - Open a disk image (use quotes for paths with spaces)");
    println!("  info                          - Show container information");
    println!("  tracks                        - List all tracks");
    println!("  sectors [track] [side]        - List sector descriptors");
    println!("  read-sector <t> <s> <id>      - Hex dump one sector (hex)");
    println!("  map [side]                    - Visual sector health map");
    println!("  fs-info                       - Identify the filesystem and show its parameters");
    println!("  dir, ls                       - List files on a FAT volume, recursively");
    println!("  deleted                       - List deleted files with recoverability");
    println!("  fs-read <path>                - Read and hex dump a file");
    println!("  fs-export <path> [output]     - Export a file to the host filesystem");
    println!("  recover <path> [output]       - Recover a deleted file to the host filesystem");
    println!("  gw-info                       - Query the Greaseweazle device");
    println!("  rpm                           - Measure drive rotation speed");
    println!("  acquire <out> [fmt] [tracks]  - Capture a disk with the Greaseweazle");
    println!("  help                          - Show this help");
    println!("  quit, exit                    - Exit");
}

fn list_images(cache: &DiskCache, storage: &Path) {
    let entries = match std::fs::read_dir(storage) {
        Ok(entries) => entries,
        Err(e) => {
            println!("Error reading {}: {}", storage.display(), e);
            return;
        }
    };

    let mut names: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    names.sort();

    if names.is_empty() {
        println!("No images in {}.", storage.display());
        return;
    }

    println!("{:<32} {:>10} {}", "Name", "Size", "Status");
    println!("{}", "-".repeat(64));
    for path in names {
        match cache.lookup(&path) {
            Ok(CacheEntry::Parsed(img)) => {
                println!(
                    "{:<32} {:>10} {} ({} tracks, {} side(s))",
                    img.name,
                    img.size,
                    img.index.format.name(),
                    img.index.tracks,
                    img.index.sides
                );
            }
            Ok(CacheEntry::Invalid(invalid)) => {
                println!("{:<32} {:>10} invalid: {}", invalid.name, invalid.size, invalid.error);
            }
            Err(e) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                println!("{:<32} {:>10} {}", name, "-", e);
            }
        }
    }
}

fn print_info(image: &ParsedImage) {
    let index = &image.index;
    println!("Filename: {}", image.name);
    println!("Format: {}", index.format.name());
    println!("Creator: {}", index.creator);
    println!("Tracks per side: {}", index.tracks);
    println!("Sides: {}", index.sides);
    println!("Missing tracks: {}", index.missing_track_count());
    println!("Sectors with FDC errors: {}", index.error_sector_count());
    println!("Truncated sectors: {}", index.truncated_sector_count());
}

fn list_tracks(index: &ImageIndex) {
    println!(
        "{:<6} {:<5} {:<10} {:<8} {:<8} {:<6} {:<10}",
        "Track", "Side", "Offset", "Size", "Sectors", "Gap", "Status"
    );
    println!("{}", "-".repeat(60));

    for track in index.entries() {
        if track.is_missing() {
            println!(
                "{:<6} {:<5} {:<10} {:<8} {:<8} {:<6} {:<10}",
                track.track, track.side, "-", 0, 0, "-", "Missing"
            );
            continue;
        }
        let status = if track.has_errors() {
            "Errors"
        } else if track.has_truncation() {
            "Truncated"
        } else {
            "OK"
        };
        println!(
            "{:<6} {:<5} {:<10} {:<8} {:<8} {:<6} {:<10}",
            track.track,
            track.side,
            track.offset.unwrap_or(0),
            track.size,
            track.sectors().len(),
            track.gap3_length,
            status
        );
    }
}

fn list_sectors_on_track(index: &ImageIndex, track: u8, side: u8) {
    let Some(entry) = index.track(track, side) else {
        println!("Track {} side {} not found.", track, side);
        return;
    };
    if entry.is_missing() {
        println!("Track {} side {} is missing.", track, side);
        return;
    }

    println!("Track {} side {}:", track, side);
    println!(
        "{:<4} {:<16} {:<8} {:<8} {:<10} {}",
        "Idx", "CHRN", "Size", "Offset", "Truncated", "FDC Flags"
    );
    println!("{}", "-".repeat(70));

    for sector in entry.sectors() {
        let chrn = format!(
            "{}/{}/{}/{}",
            sector.id.track, sector.id.side, sector.id.sector, sector.id.size_code
        );
        let flags = if sector.has_error() {
            sector.error_flags().join("|")
        } else {
            "OK".to_string()
        };
        println!(
            "{:<4} {:<16} {:<8} {:<8} {:<10} {}",
            sector.index,
            chrn,
            sector.size,
            sector
                .data_offset
                .map(|o| o.to_string())
                .unwrap_or_else(|| "-".to_string()),
            if sector.truncated { "Yes" } else { "" },
            flags
        );
    }
}

fn print_filesystem_info(image: &ParsedImage) {
    match detect_filesystem(&image.index, &image.data) {
        FilesystemDescriptor::Fat(bpb) => {
            println!("FAT filesystem");
            println!("OEM: {}", bpb.oem);
            println!("Bytes per sector: {}", bpb.bytes_per_sector);
            println!("Sectors per cluster: {}", bpb.sectors_per_cluster);
            println!("Reserved sectors: {}", bpb.reserved_sectors);
            println!("FAT copies: {}", bpb.fat_count);
            println!("Root entries: {}", bpb.root_entries);
            println!("Total sectors: {}", bpb.total_sectors);
            println!("Media descriptor: 0x{:02X}", bpb.media_descriptor);
            println!("Sectors per FAT: {}", bpb.sectors_per_fat);
            println!("Geometry: {} sectors/track, {} head(s)", bpb.sectors_per_track, bpb.heads);
            println!("Volume label: {}", bpb.volume_label);
            println!("FS type: {}", bpb.fs_type);
        }
        FilesystemDescriptor::Cpc { note } => {
            println!("CPC disk ({})", note);
        }
        FilesystemDescriptor::Unknown => {
            println!("No recognizable filesystem.");
        }
    }
}

fn mount_fat(image: &ParsedImage) -> Result<Fat12FileSystem> {
    let descriptor = detect_filesystem(&image.index, &image.data);
    Fat12FileSystem::open(&descriptor, &image.index, &image.data)
}

fn read_fat_file(image: &ParsedImage, path: &str) -> Result<Vec<u8>> {
    let fs = mount_fat(image)?;
    let entry = fs
        .list_files()
        .into_iter()
        .find(|e| !e.is_dir && (e.path == path || e.name == path || e.short_name == path))
        .ok_or_else(|| ArchiveError::FileNotFound(path.to_string()))?;
    Ok(fs.read_file(&entry))
}

fn recover_deleted_file(image: &ParsedImage, path: &str) -> Result<Vec<u8>> {
    let fs = mount_fat(image)?;
    let deleted = fs
        .deleted_entries()
        .into_iter()
        .find(|d| d.entry.path == path || d.entry.short_name == path)
        .ok_or_else(|| ArchiveError::FileNotFound(path.to_string()))?;
    if !deleted.recoverable {
        println!("Warning: {} ({})", deleted.entry.path, deleted.reason);
    }
    fs.recover_deleted(deleted.entry.cluster, deleted.entry.size)
}

/// Attribute flags column: read-only, hidden, system, volume label
fn attr_string(entry: &DirEntry) -> String {
    format!(
        "{}{}{}{}",
        if entry.is_read_only { "R" } else { "-" },
        if entry.is_hidden { "H" } else { "-" },
        if entry.is_system { "S" } else { "-" },
        if entry.is_volume_label { "V" } else { "-" }
    )
}

/// Turn a disk path into a plain host filename
fn flatten_name(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

fn print_hex_dump(data: &[u8], max_bytes: usize) {
    let len = data.len().min(max_bytes);

    for (i, chunk) in data[..len].chunks(16).enumerate() {
        print!("{:04X}: ", i * 16);

        for (j, byte) in chunk.iter().enumerate() {
            print!("{:02X} ", byte);
            if j == 7 {
                print!(" ");
            }
        }

        for j in chunk.len()..16 {
            print!("   ");
            if j == 7 {
                print!(" ");
            }
        }

        print!(" |");

        for byte in chunk {
            let c = if *byte >= 32 && *byte < 127 {
                *byte as char
            } else {
                '.'
            };
            print!("{}", c);
        }

        println!("|");
    }

    if data.len() > max_bytes {
        println!("... ({} more bytes)", data.len() - max_bytes);
    }
}

fn parse_hex_or_dec(s: &str) -> Option<u8> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}
