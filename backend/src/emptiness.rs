use image::{DynamicImage, Rgb};

/// ITU-R 601-2 luma with the same fixed-point rounding PIL uses for `convert("L")`.
fn luma_601(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    ((r as u32 * 19595 + g as u32 * 38470 + b as u32 * 7471 + 0x8000) >> 16) as u8
}

fn alpha_all_zero(image: &DynamicImage) -> bool {
    match image.as_rgba8() {
        Some(rgba) => rgba.pixels().all(|p| p[3] == 0),
        None => image.to_rgba8().pixels().all(|p| p[3] == 0),
    }
}

fn luminance_all_zero(image: &DynamicImage) -> bool {
    image.to_rgb8().pixels().all(|p| luma_601(p) == 0)
}

/// Decides whether a coarse-level view of a tile holds nothing but background.
///
/// A region is blank when its alpha channel is zero everywhere, or when its
/// luminance is zero everywhere. Uniform non-black backgrounds are not blank.
/// A region without pixels carries no evidence and is never blank.
pub fn is_blank(image: &DynamicImage) -> bool {
    if image.width() == 0 || image.height() == 0 {
        return false;
    }

    if image.color().has_alpha() && alpha_all_zero(image) {
        return true;
    }
    luminance_all_zero(image)
}

#[cfg(test)]
mod test {
    use super::*;
    use image::{Rgba, RgbImage, RgbaImage};

    fn uniform_rgba(pixel: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba(pixel)))
    }

    #[test]
    fn test_transparent_is_blank() {
        assert!(is_blank(&uniform_rgba([0, 0, 0, 0])));
        // Colour under zero alpha does not matter
        assert!(is_blank(&uniform_rgba([255, 255, 255, 0])));
    }

    #[test]
    fn test_opaque_black_is_blank() {
        assert!(is_blank(&uniform_rgba([0, 0, 0, 255])));
        let rgb = DynamicImage::ImageRgb8(RgbImage::new(4, 4));
        assert!(is_blank(&rgb));
    }

    #[test]
    fn test_luma_rounding_matches_601() {
        // 19595 / 65536 rounds down to zero
        assert!(is_blank(&uniform_rgba([1, 0, 0, 255])));
        assert!(!is_blank(&uniform_rgba([0, 1, 0, 255])));
        assert!(!is_blank(&uniform_rgba([2, 0, 0, 255])));
    }

    #[test]
    fn test_uniform_gray_is_not_blank() {
        assert!(!is_blank(&uniform_rgba([128, 128, 128, 255])));
    }

    #[test]
    fn test_single_visible_pixel_keeps_tile() {
        let mut image = RgbaImage::new(16, 16);
        image.put_pixel(15, 15, Rgba([90, 10, 120, 255]));
        let image = DynamicImage::ImageRgba8(image);
        assert!(!is_blank(&image));
        // Pure function of the pixels
        assert_eq!(is_blank(&image), is_blank(&image.clone()));
    }

    #[test]
    fn test_zero_area_is_not_blank() {
        let empty = DynamicImage::ImageRgba8(RgbaImage::new(0, 5));
        assert!(!is_blank(&empty));
    }
}
