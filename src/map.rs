/// Sector health map visualization

use crate::image::ImageIndex;

/// ANSI color codes for the sector map
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_WHITE: &str = "\x1b[97m";
    pub const DARK_WHITE: &str = "\x1b[37m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const DARK_BLUE: &str = "\x1b[2;34m";
}

/// Draw a visual health map for one disk side
///
/// Columns are tracks, rows are physical sector positions. Red marks an
/// FDC error, yellow a truncated sector, dark blue a missing track, dim a
/// sector holding only the filler byte.
pub fn draw_sector_map(index: &ImageIndex, data: &[u8], side: u8) {
    if side >= index.sides {
        println!("Side {} not found.", side);
        return;
    }

    let tracks: Vec<_> = (0..index.tracks)
        .filter_map(|t| index.track(t, side))
        .collect();

    let max_sectors = tracks
        .iter()
        .map(|t| t.sectors().len())
        .max()
        .unwrap_or(0);
    if max_sectors == 0 {
        println!("No sectors found on side {}.", side);
        return;
    }

    const BLOCK_EMPTY: &str = "\u{2591}"; // ░
    const BLOCK_FULL: &str = "\u{2593}"; // ▓

    println!("=== Sector Map (Side {}) ===", side);
    println!(
        "Legend: {}In Use{} {}Filler{} {}Error{} {}Truncated{} {}Missing{}",
        colors::BRIGHT_WHITE,
        colors::RESET,
        colors::DARK_WHITE,
        colors::RESET,
        colors::BRIGHT_RED,
        colors::RESET,
        colors::BRIGHT_YELLOW,
        colors::RESET,
        colors::DARK_BLUE,
        colors::RESET
    );
    println!();

    // Rows bottom to top, sector position 0 at the bottom
    for sector_pos in (0..max_sectors).rev() {
        print!("{:>2} ", sector_pos);

        for track in &tracks {
            if track.is_missing() {
                print!("{}{}{}", colors::DARK_BLUE, BLOCK_EMPTY, colors::RESET);
                continue;
            }
            match track.sector_by_index(sector_pos) {
                Some(sector) => {
                    let (color, block) = if sector.has_error() {
                        (colors::BRIGHT_RED, BLOCK_FULL)
                    } else if sector.truncated {
                        (colors::BRIGHT_YELLOW, BLOCK_FULL)
                    } else if is_filler_only(data, sector.data_offset, sector.size, track.filler_byte)
                    {
                        (colors::DARK_WHITE, BLOCK_EMPTY)
                    } else {
                        (colors::BRIGHT_WHITE, BLOCK_FULL)
                    };
                    print!("{}{}{}", color, block, colors::RESET);
                }
                None => print!(" "),
            }
        }
        println!();
    }

    // Track number ruler, tens then units
    print!("   ");
    for track in &tracks {
        print!("{}", track.track / 10);
    }
    println!();
    print!("   ");
    for track in &tracks {
        print!("{}", track.track % 10);
    }
    println!();
}

/// Check whether a sector's payload is nothing but the format filler byte
fn is_filler_only(data: &[u8], offset: Option<usize>, size: usize, filler: u8) -> bool {
    match offset {
        Some(start) if start + size <= data.len() => {
            data[start..start + size].iter().all(|&b| b == filler)
        }
        _ => false,
    }
}
