use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use image::{imageops, ColorType, DynamicImage, RgbaImage};
use thiserror::Error;

use crate::emptiness::is_blank;
use crate::extent::Extent;
use crate::output_format::OutputFormat;
use crate::patch_name::PatchName;
use crate::pyramid::{downsample_factor, PyramidError, PyramidSource, MAX_LEVEL_COUNT};
use crate::tile_grid::{GridError, Region, Tile, TileGrid, TileGridBuilder, DEFAULT_PATCH_SIZE};

/// Pyramid level used for the emptiness screen when none is configured.
pub const DEFAULT_EMPTY_CHECK_LEVEL: u32 = 4;

const BASE_LEVEL: u32 = 0;

#[derive(Debug, Error)]
pub enum TilingError {
    #[error("Invalid tile grid")]
    Grid(#[from] GridError),
    #[error("Region {region} lies outside the slide {dimensions}")]
    RegionOutOfBounds { region: Region, dimensions: Extent },
    #[error("Empty-check level {level} is not available (the slide has {level_count} levels)")]
    EmptyCheckLevelUnavailable { level: u32, level_count: u32 },
    #[error("Empty-check level {0} is deeper than any supported pyramid (at most {max} levels)", max = MAX_LEVEL_COUNT)]
    EmptyCheckLevelTooDeep(u32),
    #[error("Output prefix {0:?} cannot be used in patch file names")]
    InvalidPrefix(String),
    #[error("Output directory {0} already exists")]
    OutputDirExists(PathBuf),
    #[error("Parent directory of {0} does not exist")]
    OutputParentMissing(PathBuf),
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Reading tile ({row}, {col}) at level {level} failed")]
    Read {
        row: u32,
        col: u32,
        level: u32,
        #[source]
        source: PyramidError,
    },
    #[error("Tile ({row}, {col}) was decoded as {color:?}, expected 8 bit RGBA")]
    UnexpectedChannelLayout { row: u32, col: u32, color: ColorType },
    #[error("Tile ({row}, {col}) was decoded as {actual}, expected {expected}")]
    UnexpectedRegionSize {
        row: u32,
        col: u32,
        expected: Extent,
        actual: Extent,
    },
    #[error("Could not encode patch {path}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Clone)]
pub struct TilerConfig {
    /// Prefix of every patch file name, also the name of the output directory
    pub prefix: String,
    pub patch_size: u32,
    pub empty_check_level: u32,
    pub output_format: OutputFormat,
    /// Area to tile, `None` tiles the whole slide
    pub region: Option<Region>,
}

impl TilerConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            patch_size: DEFAULT_PATCH_SIZE,
            empty_check_level: DEFAULT_EMPTY_CHECK_LEVEL,
            output_format: OutputFormat::default(),
            region: None,
        }
    }

    pub fn with_patch_size(mut self, patch_size: u32) -> Self {
        self.patch_size = patch_size;
        self
    }

    pub fn with_empty_check_level(mut self, level: u32) -> Self {
        self.empty_check_level = level;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileOutcome {
    pub tile: Tile,
    /// Name of the written patch, `None` when the tile was screened out as empty
    pub file_name: Option<String>,
}

impl TileOutcome {
    pub fn is_empty(&self) -> bool {
        self.file_name.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct TilingReport {
    pub output_dir: PathBuf,
    pub patch_size: u32,
    pub output_format: OutputFormat,
    pub num_rows: u32,
    pub num_cols: u32,
    pub level_dimensions: Vec<Extent>,
    /// One entry per grid cell in row-major order
    pub outcomes: Vec<TileOutcome>,
}

impl TilingReport {
    pub fn patch_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn empty_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_empty()).count()
    }

    pub fn non_empty_count(&self) -> usize {
        self.patch_count() - self.empty_count()
    }

    pub fn written_paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.outcomes
            .iter()
            .filter_map(|o| o.file_name.as_ref())
            .map(|name| self.output_dir.join(name))
    }
}

/// Fails unless `path` can be created as a fresh directory.
pub fn check_output_dir(path: &Path) -> Result<(), TilingError> {
    if path.exists() {
        return Err(TilingError::OutputDirExists(path.to_owned()));
    }
    let parent_exists = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
        _ => true,
    };
    if !parent_exists {
        return Err(TilingError::OutputParentMissing(path.to_owned()));
    }
    Ok(())
}

fn create_output_dir(path: &Path) -> Result<(), TilingError> {
    check_output_dir(path)?;
    fs::create_dir(path).map_err(|source| TilingError::Io {
        path: path.to_owned(),
        source,
    })
}

/// Places `region` in the top-left corner of a transparent canvas of the nominal patch size.
fn pad_to_patch(region: RgbaImage, nominal: Extent) -> RgbaImage {
    if !Extent::new(region.width(), region.height()).falls_short_of(nominal) {
        return region;
    }
    let mut canvas = RgbaImage::new(nominal.width, nominal.height);
    imageops::replace(&mut canvas, &region, 0, 0);
    canvas
}

pub struct Tiler {
    config: TilerConfig,
}

impl Tiler {
    pub fn new(config: TilerConfig) -> Result<Tiler, TilingError> {
        let prefix = &config.prefix;
        if prefix.is_empty()
            || prefix.chars().any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(TilingError::InvalidPrefix(prefix.clone()));
        }
        if config.patch_size == 0 {
            return Err(GridError::ZeroPatchSize.into());
        }
        if config.empty_check_level >= MAX_LEVEL_COUNT {
            return Err(TilingError::EmptyCheckLevelTooDeep(config.empty_check_level));
        }

        Ok(Tiler { config })
    }

    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    /// Directory the patches are written to, inside `outdir`.
    pub fn output_dir(&self, outdir: &Path) -> PathBuf {
        outdir.join(&self.config.prefix)
    }

    /// Validates the configuration against `source` and lays out the grid.
    pub fn plan<S>(&self, source: &S) -> Result<TileGrid, TilingError>
    where
        S: PyramidSource + ?Sized,
    {
        let dimensions = source.dimensions();
        let region = self.config.region.unwrap_or_else(|| Region::whole(dimensions));
        if !region.fits_within(dimensions) {
            return Err(TilingError::RegionOutOfBounds { region, dimensions });
        }

        let level_count = source.level_count();
        if self.config.empty_check_level >= level_count {
            return Err(TilingError::EmptyCheckLevelUnavailable {
                level: self.config.empty_check_level,
                level_count,
            });
        }

        Ok(TileGridBuilder::new(region)
            .with_patch_size(self.config.patch_size)
            .finalize()?)
    }

    /// Tiles the slide into `outdir/<prefix>`, writing one file per non-empty tile.
    ///
    /// All configuration and output directory checks run before the first tile
    /// is read. Any read or write failure aborts the run.
    pub fn run<S>(&self, source: &mut S, outdir: &Path) -> Result<TilingReport, TilingError>
    where
        S: PyramidSource + ?Sized,
    {
        let grid = self.plan(source)?;
        let output_dir = self.output_dir(outdir);
        create_output_dir(&output_dir)?;

        log::info!(
            "Tiling {} into {} rows x {} columns of {}px ({} cells)",
            grid.region(),
            grid.num_rows(),
            grid.num_cols(),
            grid.patch_size(),
            grid.cell_count()
        );

        let mut outcomes = Vec::with_capacity(grid.cell_count() as usize);
        for tile in grid.iter() {
            if tile.col == 0 {
                log::info!("Processing row {} of {}", tile.row + 1, grid.num_rows());
            }

            if self.is_empty_tile(source, &tile)? {
                log::debug!("Tile ({}, {}) is empty", tile.row, tile.col);
                outcomes.push(TileOutcome {
                    tile,
                    file_name: None,
                });
                continue;
            }

            let patch = pad_to_patch(self.extract(source, &tile)?, grid.nominal_extent());
            let file_name = PatchName::for_tile(&self.config.prefix, &tile)
                .file_name(grid.index_width(), self.config.output_format.extension());
            self.write_patch(&patch, &output_dir.join(&file_name))?;
            log::debug!("Tile ({}, {}) written to {}", tile.row, tile.col, file_name);

            outcomes.push(TileOutcome {
                tile,
                file_name: Some(file_name),
            });
        }

        let report = TilingReport {
            output_dir,
            patch_size: grid.patch_size(),
            output_format: self.config.output_format,
            num_rows: grid.num_rows(),
            num_cols: grid.num_cols(),
            level_dimensions: (0..source.level_count())
                .filter_map(|level| source.level_dimensions(level))
                .collect(),
            outcomes,
        };
        log::info!(
            "Wrote {} patches, skipped {} empty tiles",
            report.non_empty_count(),
            report.empty_count()
        );
        Ok(report)
    }

    fn read<S>(
        &self,
        source: &mut S,
        tile: &Tile,
        level: u32,
        size: Extent,
    ) -> Result<DynamicImage, TilingError>
    where
        S: PyramidSource + ?Sized,
    {
        source
            .read_region(tile.origin, level, size)
            .map_err(|source| TilingError::Read {
                row: tile.row,
                col: tile.col,
                level,
                source,
            })
    }

    fn is_empty_tile<S>(&self, source: &mut S, tile: &Tile) -> Result<bool, TilingError>
    where
        S: PyramidSource + ?Sized,
    {
        let level = self.config.empty_check_level;
        let factor = downsample_factor(level).ok_or(TilingError::EmptyCheckLevelTooDeep(level))?;
        let coarse_size = tile.extent.reduced_by(factor);
        let coarse = self.read(source, tile, level, coarse_size)?;
        Ok(is_blank(&coarse))
    }

    fn extract<S>(&self, source: &mut S, tile: &Tile) -> Result<RgbaImage, TilingError>
    where
        S: PyramidSource + ?Sized,
    {
        let region = match self.read(source, tile, BASE_LEVEL, tile.extent)? {
            DynamicImage::ImageRgba8(region) => region,
            other => {
                return Err(TilingError::UnexpectedChannelLayout {
                    row: tile.row,
                    col: tile.col,
                    color: other.color(),
                })
            }
        };

        let actual = Extent::new(region.width(), region.height());
        if actual != tile.extent {
            return Err(TilingError::UnexpectedRegionSize {
                row: tile.row,
                col: tile.col,
                expected: tile.extent,
                actual,
            });
        }
        Ok(region)
    }

    fn write_patch(&self, patch: &RgbaImage, path: &Path) -> Result<(), TilingError> {
        let io_error = |source| TilingError::Io {
            path: path.to_owned(),
            source,
        };

        let mut writer = BufWriter::new(File::create(path).map_err(io_error)?);
        self.config
            .output_format
            .encode(patch, &mut writer)
            .map_err(|source| TilingError::Encode {
                path: path.to_owned(),
                source,
            })?;
        writer.flush().map_err(io_error)
    }
}
