use image::{GrayImage, ImageBuffer, Luma, RgbaImage};

use crate::session::ElementRect;

/// Converts a crop to grayscale, optionally binarizing it.
///
/// With a threshold, pixels darker than it become black (text) and the
/// rest white (background). Without one the grayscale crop is returned
/// unchanged, which is what tesseract handles best on a clean captcha.
pub fn prepare_for_ocr(img: &RgbaImage, binarize_threshold: Option<u8>) -> GrayImage {
    let gray = image::imageops::grayscale(img);
    match binarize_threshold {
        Some(threshold) => binarize_dark_pixels(&gray, threshold),
        None => gray,
    }
}

/// Pixels with luma below `threshold` become black, all others white.
pub fn binarize_dark_pixels(img: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = img.dimensions();
    let mut output = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if pixel[0] < threshold { 0u8 } else { 255u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Crops an element's on-page rectangle out of a page screenshot.
///
/// Fractional edges are widened to whole pixels and the rectangle is
/// clamped to the screenshot bounds. A rectangle entirely off-screen
/// yields an empty image.
pub fn crop_region(img: &RgbaImage, rect: &ElementRect) -> RgbaImage {
    let (w, h) = img.dimensions();

    let clamp = |v: f64, max: u32| -> u32 {
        if v.is_nan() || v <= 0.0 {
            0
        } else {
            (v as u64).min(max as u64) as u32
        }
    };

    let x0 = clamp(rect.x.floor(), w);
    let y0 = clamp(rect.y.floor(), h);
    let x1 = clamp((rect.x + rect.width).ceil(), w).max(x0);
    let y1 = clamp((rect.y + rect.height).ceil(), h).max(y0);

    image::imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image()
}
