use std::{cmp::min, fmt, marker::PhantomData};

use thiserror::Error;

use crate::extent::{Coords, Extent};
use crate::patch_name::IndexWidth;

pub struct Finalized;

/// Side length used when no patch size is configured.
pub const DEFAULT_PATCH_SIZE: u32 = 1024;

/// Rectangular area of the slide in level 0 pixel coordinates.
/// The bottom-right corner is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub origin: Coords,
    pub extent: Extent,
}

impl Region {
    pub fn new(origin: Coords, extent: Extent) -> Self {
        Self { origin, extent }
    }

    pub fn whole(dimensions: Extent) -> Self {
        Self::new(Coords::default(), dimensions)
    }

    pub fn from_corners(top_left: Coords, bottom_right: Coords) -> Result<Self, GridError> {
        if bottom_right.x <= top_left.x || bottom_right.y <= top_left.y {
            return Err(GridError::InvertedCorners(top_left, bottom_right));
        }
        Ok(Self::new(
            top_left,
            Extent::new(bottom_right.x - top_left.x, bottom_right.y - top_left.y),
        ))
    }

    pub fn bottom_right(&self) -> Coords {
        Coords {
            x: self.origin.x + self.extent.width,
            y: self.origin.y + self.extent.height,
        }
    }

    pub fn fits_within(&self, dimensions: Extent) -> bool {
        let end = self.bottom_right();
        end.x <= dimensions.width && end.y <= dimensions.height
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.origin, self.bottom_right())
    }
}

#[derive(Debug, Clone, Error)]
pub enum GridError {
    #[error("Patch size must be a positive number of pixels")]
    ZeroPatchSize,
    #[error("Region {0} has no area")]
    EmptyRegion(Region),
    #[error("Region corner {1} does not lie below and right of {0}")]
    InvertedCorners(Coords, Coords),
}

/// One cell of the tile grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    /// Top-left pixel in level 0 coordinates
    pub origin: Coords,
    /// Pixel area actually covered by the cell, clipped at the region boundary
    pub extent: Extent,
}

pub struct TileGridGenerator<M> {
    region: Region,
    patch_size: u32,
    num_rows: u32,
    num_cols: u32,
    _marker: PhantomData<M>,
}

pub type TileGridBuilder = TileGridGenerator<()>;
pub type TileGrid = TileGridGenerator<Finalized>;

pub struct TileGridIterator<'a> {
    grid: &'a TileGrid,
    current_cell: (u32, u32),
}

impl<'a> Iterator for TileGridIterator<'a> {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        let (row, col) = self.current_cell;
        if row >= self.grid.num_rows {
            return None;
        }

        self.current_cell.1 += 1;
        if self.current_cell.1 >= self.grid.num_cols {
            self.current_cell = (row + 1, 0);
        }

        self.grid.tile_at(row, col)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (row, col) = self.current_cell;
        let consumed = row as u64 * self.grid.num_cols as u64 + col as u64;
        let remaining = self.grid.cell_count().saturating_sub(consumed) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TileGridIterator<'_> {}

impl TileGridBuilder {
    pub fn new(region: Region) -> Self {
        Self {
            region,
            patch_size: DEFAULT_PATCH_SIZE,
            num_rows: 0, // Derived when finalizing
            num_cols: 0,
            _marker: PhantomData,
        }
    }

    pub fn set_patch_size(&mut self, patch_size: u32) {
        self.patch_size = patch_size;
    }

    pub fn with_patch_size(mut self, patch_size: u32) -> Self {
        self.set_patch_size(patch_size);
        self
    }

    pub fn finalize(self) -> Result<TileGrid, GridError> {
        if self.patch_size == 0 {
            return Err(GridError::ZeroPatchSize);
        }
        if self.region.extent.is_empty() {
            return Err(GridError::EmptyRegion(self.region));
        }

        Ok(TileGrid {
            region: self.region,
            patch_size: self.patch_size,
            num_rows: self.region.extent.height.div_ceil(self.patch_size),
            num_cols: self.region.extent.width.div_ceil(self.patch_size),
            _marker: PhantomData,
        })
    }
}

impl TileGrid {
    pub fn region(&self) -> Region {
        self.region
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn nominal_extent(&self) -> Extent {
        Extent::square(self.patch_size)
    }

    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    pub fn num_cols(&self) -> u32 {
        self.num_cols
    }

    pub fn cell_count(&self) -> u64 {
        self.num_rows as u64 * self.num_cols as u64
    }

    /// Digit counts used to zero-pad row and column indices in patch names.
    pub fn index_width(&self) -> IndexWidth {
        IndexWidth::for_grid(self.num_rows, self.num_cols)
    }

    pub fn tile_at(&self, row: u32, col: u32) -> Option<Tile> {
        if row >= self.num_rows || col >= self.num_cols {
            return None;
        }

        let end = self.region.bottom_right();
        let x = self.region.origin.x + col * self.patch_size;
        let y = self.region.origin.y + row * self.patch_size;
        Some(Tile {
            row,
            col,
            origin: Coords { x, y },
            extent: Extent {
                width: min(self.patch_size, end.x - x),
                height: min(self.patch_size, end.y - y),
            },
        })
    }

    /// Cells in row-major order, ascending.
    pub fn iter(&self) -> TileGridIterator {
        TileGridIterator {
            grid: self,
            current_cell: (0, 0),
        }
    }
}
