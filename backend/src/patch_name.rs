//! File naming contract shared by the tiler and the grid partitioner.
//!
//! A patch file is named `{prefix}.{row}_{col}.{y}_{x}.{ext}` where `row` and
//! `col` are zero-padded to the digit count of the grid's row and column
//! counts, and `y`/`x` are the level 0 pixel offsets of the patch.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::tile_grid::Tile;

const PATCH_NAME_PATTERN: &str = r"(?i)(?P<prefix>\S+)\.(?P<row>\d+)_(?P<col>\d+)\.(?P<y>\d+)_(?P<x>\d+)$";

fn patch_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(PATCH_NAME_PATTERN).expect("patch name pattern is valid"))
}

/// Row and column indices stop one short of `u32::MAX` so that index + 1 is a grid size.
fn parse_index(digits: &str) -> Option<u32> {
    digits.parse().ok().filter(|&index| index < u32::MAX)
}

fn digit_count(n: u32) -> usize {
    n.to_string().len()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWidth {
    pub row: usize,
    pub col: usize,
}

impl IndexWidth {
    pub fn for_grid(num_rows: u32, num_cols: u32) -> Self {
        Self {
            row: digit_count(num_rows),
            col: digit_count(num_cols),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchName {
    pub prefix: String,
    pub row: u32,
    pub col: u32,
    pub y_offset: u32,
    pub x_offset: u32,
}

impl PatchName {
    pub fn for_tile(prefix: &str, tile: &Tile) -> Self {
        Self {
            prefix: prefix.to_owned(),
            row: tile.row,
            col: tile.col,
            y_offset: tile.origin.y,
            x_offset: tile.origin.x,
        }
    }

    /// The file name without extension.
    pub fn stem(&self, width: IndexWidth) -> String {
        format!(
            "{}.{:0rw$}_{:0cw$}.{}_{}",
            self.prefix,
            self.row,
            self.col,
            self.y_offset,
            self.x_offset,
            rw = width.row,
            cw = width.col,
        )
    }

    pub fn file_name(&self, width: IndexWidth, extension: &str) -> String {
        format!("{}.{}", self.stem(width), extension)
    }

    /// Recovers the patch coordinates from a file stem.
    ///
    /// Returns `None` for anything that does not follow the naming scheme,
    /// including indices too large to represent.
    pub fn parse_stem(stem: &str) -> Option<Self> {
        let captures = patch_name_regex().captures(stem)?;
        Some(Self {
            prefix: captures["prefix"].to_owned(),
            row: parse_index(&captures["row"])?,
            col: parse_index(&captures["col"])?,
            y_offset: captures["y"].parse().ok()?,
            x_offset: captures["x"].parse().ok()?,
        })
    }

    /// Like [`PatchName::parse_stem`], but takes a file name or path and strips
    /// directory and extension first.
    pub fn parse_path(path: &Path) -> Option<Self> {
        Self::parse_stem(path.file_stem()?.to_str()?)
    }
}
