use std::{
    fmt,
    io::{Seek, Write},
    str::FromStr,
};

use image::{
    buffer::ConvertBuffer,
    codecs::{jpeg::JpegEncoder, png::PngEncoder, tiff::TiffEncoder},
    ColorType, ImageEncoder, RgbImage, RgbaImage,
};
use thiserror::Error;

const JPEG_MAX_QUALITY: u8 = 100;
const JPEG_DEFAULT_QUALITY: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegPreset {
    /// Quality 100 without chroma subsampling
    Maximum,
    /// The encoder's default lossy settings
    Standard,
}

impl JpegPreset {
    fn quality(&self) -> u8 {
        match self {
            JpegPreset::Maximum => JPEG_MAX_QUALITY,
            JpegPreset::Standard => JPEG_DEFAULT_QUALITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Opaque, alpha is dropped before encoding
    Jpeg(JpegPreset),
    Tiff,
    Png,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Output format {0} not supported, must be one of (JPEG, JPEG-low, TIFF, PNG)")]
pub struct UnsupportedFormat(pub String);

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Jpeg(JpegPreset::Maximum)
    }
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg(_) => "jpg",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Png => "png",
        }
    }

    pub fn encode<W>(&self, patch: &RgbaImage, writer: &mut W) -> image::ImageResult<()>
    where
        W: Write + Seek,
    {
        match self {
            OutputFormat::Jpeg(preset) => {
                let opaque: RgbImage = patch.convert();
                JpegEncoder::new_with_quality(writer, preset.quality()).write_image(
                    opaque.as_raw(),
                    opaque.width(),
                    opaque.height(),
                    ColorType::Rgb8,
                )
            }
            OutputFormat::Tiff => TiffEncoder::new(writer).write_image(
                patch.as_raw(),
                patch.width(),
                patch.height(),
                ColorType::Rgba8,
            ),
            OutputFormat::Png => PngEncoder::new(writer).write_image(
                patch.as_raw(),
                patch.width(),
                patch.height(),
                ColorType::Rgba8,
            ),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg(JpegPreset::Maximum) => "JPEG",
            OutputFormat::Jpeg(JpegPreset::Standard) => "JPEG-low",
            OutputFormat::Tiff => "TIFF",
            OutputFormat::Png => "PNG",
        };
        f.write_str(name)
    }
}

impl FromStr for OutputFormat {
    type Err = UnsupportedFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uppercase = s.to_uppercase();
        Ok(match uppercase.as_ref() {
            "JPEG" => OutputFormat::Jpeg(JpegPreset::Maximum),
            "JPEG-LOW" => OutputFormat::Jpeg(JpegPreset::Standard),
            "TIFF" => OutputFormat::Tiff,
            "PNG" => OutputFormat::Png,
            _ => return Err(UnsupportedFormat(s.to_owned())),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use image::Rgba;
    use std::io::Cursor;

    fn half_transparent() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, _| {
            if x < 8 {
                Rgba([10, 200, 30, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        })
    }

    #[test]
    fn test_parse_formats() {
        assert_eq!(OutputFormat::from_str("JPEG"), Ok(OutputFormat::Jpeg(JpegPreset::Maximum)));
        assert_eq!(OutputFormat::from_str("jpeg-low"), Ok(OutputFormat::Jpeg(JpegPreset::Standard)));
        assert_eq!(OutputFormat::from_str("Tiff"), Ok(OutputFormat::Tiff));
        assert_eq!(OutputFormat::from_str("PNG"), Ok(OutputFormat::Png));
        assert_eq!(OutputFormat::from_str("webp"), Err(UnsupportedFormat("webp".to_owned())));
    }

    #[test]
    fn test_display_parses_back() {
        for format in [
            OutputFormat::Jpeg(JpegPreset::Maximum),
            OutputFormat::Jpeg(JpegPreset::Standard),
            OutputFormat::Tiff,
            OutputFormat::Png,
        ] {
            assert_eq!(OutputFormat::from_str(&format.to_string()), Ok(format));
        }
    }

    #[test]
    fn test_png_keeps_alpha() {
        let mut buffer = Cursor::new(Vec::new());
        OutputFormat::Png.encode(&half_transparent(), &mut buffer).unwrap();

        let decoded = image::load_from_memory(buffer.get_ref()).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
        assert_eq!(decoded.to_rgba8(), half_transparent());
    }

    #[test]
    fn test_jpeg_drops_alpha() {
        let mut buffer = Cursor::new(Vec::new());
        OutputFormat::Jpeg(JpegPreset::Standard)
            .encode(&half_transparent(), &mut buffer)
            .unwrap();

        let decoded = image::load_from_memory(buffer.get_ref()).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!(decoded.width(), 16);
    }

    #[test]
    fn test_maximum_jpeg_stays_close_to_source() {
        let patch = RgbaImage::from_pixel(16, 16, Rgba([180, 90, 40, 255]));
        let mut maximum = Cursor::new(Vec::new());
        OutputFormat::Jpeg(JpegPreset::Maximum).encode(&patch, &mut maximum).unwrap();

        let decoded = image::load_from_memory(maximum.get_ref()).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgb8);
        for pixel in decoded.to_rgb8().pixels() {
            for (channel, expected) in pixel.0.iter().zip([180u8, 90, 40]) {
                assert!(channel.abs_diff(expected) <= 3, "{:?}", pixel);
            }
        }
    }
}
