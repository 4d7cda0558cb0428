use std::path::{Path, PathBuf};

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use thiserror::Error;

use crate::extent::{Coords, Extent};

#[derive(Debug, Error)]
pub enum PyramidError {
    #[error("Slide {0} does not exist")]
    SourceMissing(PathBuf),
    #[error("Slide {path} could not be decoded")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("Pyramid level {level} is not available (the slide has {level_count} levels)")]
    LevelOutOfRange { level: u32, level_count: u32 },
    #[error("A pyramid needs at least one level")]
    NoLevels,
    #[error("A pyramid cannot have {0} levels, at most {max} are supported", max = MAX_LEVEL_COUNT)]
    TooManyLevels(u32),
}

/// Level 31 is the deepest level whose downsample factor still fits in a `u32`.
pub const MAX_LEVEL_COUNT: u32 = 32;

/// A multi-resolution image that can be read region by region.
///
/// Level 0 is the full resolution, level `n` is downsampled by `2^n`.
pub trait PyramidSource {
    fn level_count(&self) -> u32;

    fn level_dimensions(&self, level: u32) -> Option<Extent>;

    fn dimensions(&self) -> Extent {
        self.level_dimensions(0).unwrap_or_default()
    }

    /// Reads `size` pixels at `level`, starting at `location` given in level 0
    /// coordinates. Pixels outside the slide come back as transparent black.
    fn read_region(
        &mut self,
        location: Coords,
        level: u32,
        size: Extent,
    ) -> Result<DynamicImage, PyramidError>;
}

/// `2^level`, or `None` for levels beyond [`MAX_LEVEL_COUNT`].
pub fn downsample_factor(level: u32) -> Option<u32> {
    1u32.checked_shl(level)
}

/// Pyramid built in memory from an ordinary raster image.
#[derive(Debug)]
pub struct RasterPyramid {
    levels: Vec<RgbaImage>,
    source: Option<PathBuf>,
}

impl RasterPyramid {
    /// Builds `level_count` levels from `base`, halving each dimension per level.
    pub fn from_image(base: RgbaImage, level_count: u32) -> Result<Self, PyramidError> {
        if level_count == 0 {
            return Err(PyramidError::NoLevels);
        }
        if level_count > MAX_LEVEL_COUNT {
            return Err(PyramidError::TooManyLevels(level_count));
        }

        let mut levels = Vec::with_capacity(level_count as usize);
        levels.push(base);
        while levels.len() < level_count as usize {
            let next = halve(&levels[levels.len() - 1]);
            levels.push(next);
        }

        Ok(Self {
            levels,
            source: None,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, level_count: u32) -> Result<Self, PyramidError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PyramidError::SourceMissing(path.to_owned()));
        }

        let base = image::open(path)
            .map_err(|source| PyramidError::Decode {
                path: path.to_owned(),
                source,
            })?
            .to_rgba8();
        log::info!(
            "Opened {} ({}x{}), building {} pyramid levels",
            path.display(),
            base.width(),
            base.height(),
            level_count
        );

        let mut pyramid = Self::from_image(base, level_count)?;
        pyramid.source = Some(path.to_owned());
        Ok(pyramid)
    }
}

impl PyramidSource for RasterPyramid {
    fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    fn level_dimensions(&self, level: u32) -> Option<Extent> {
        self.levels
            .get(level as usize)
            .map(|l| Extent::new(l.width(), l.height()))
    }

    fn read_region(
        &mut self,
        location: Coords,
        level: u32,
        size: Extent,
    ) -> Result<DynamicImage, PyramidError> {
        let out_of_range = PyramidError::LevelOutOfRange {
            level,
            level_count: self.level_count(),
        };
        let Some(factor) = downsample_factor(level) else {
            return Err(out_of_range);
        };
        let level_image = self.levels.get(level as usize).ok_or(out_of_range)?;

        let mut region = RgbaImage::new(size.width, size.height);
        // crop_imm clamps to the level bounds, the rest stays transparent
        let visible = imageops::crop_imm(
            level_image,
            location.x / factor,
            location.y / factor,
            size.width,
            size.height,
        );
        imageops::replace(&mut region, &*visible, 0, 0);
        Ok(DynamicImage::ImageRgba8(region))
    }
}

impl Drop for RasterPyramid {
    fn drop(&mut self) {
        if let Some(path) = &self.source {
            log::debug!("Closing slide {}", path.display());
        }
    }
}

/// 2x2 box filter. Odd trailing rows/columns are dropped, dimensions never go below 1.
fn halve(image: &RgbaImage) -> RgbaImage {
    let width = (image.width() / 2).max(1);
    let height = (image.height() / 2).max(1);

    RgbaImage::from_fn(width, height, |x, y| {
        let mut sum = [0u32; 4];
        let mut count = 0;
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let (sx, sy) = (2 * x + dx, 2 * y + dy);
            if sx < image.width() && sy < image.height() {
                let pixel = image.get_pixel(sx, sy);
                for (acc, &channel) in sum.iter_mut().zip(pixel.0.iter()) {
                    *acc += channel as u32;
                }
                count += 1;
            }
        }
        Rgba(sum.map(|s| (s / count) as u8))
    })
}
