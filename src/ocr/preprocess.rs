use image::{DynamicImage, GrayImage, Luma};

const MAX_SCALED_WIDTH: u32 = 6000;
const BINARIZE_THRESHOLD: u8 = (0.65 * 255.0) as u8;

/// Flattens alpha onto white, converts to grayscale, upscales small images
/// and stretches contrast before recognition.
pub(super) fn prepare_for_ocr(image: &DynamicImage, scale: u32, binarize: bool) -> DynamicImage {
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut luma = GrayImage::new(width, height);

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let alpha = a as f32 / 255.0;
        let r = (r as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let g = (g as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let b = (b as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        let value = (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8;
        luma.put_pixel(x, y, Luma([value]));
    }

    let resized = if scale > 1 {
        image::imageops::resize(
            &luma,
            width.saturating_mul(scale),
            height.saturating_mul(scale),
            image::imageops::FilterType::Lanczos3,
        )
    } else {
        luma
    };

    let stretched = contrast_stretch(&resized);
    if binarize {
        DynamicImage::ImageLuma8(threshold(&stretched, BINARIZE_THRESHOLD))
    } else {
        DynamicImage::ImageLuma8(stretched)
    }
}

pub(super) fn ocr_scale(width: u32) -> u32 {
    let mut scale = 3u32;
    while width.saturating_mul(scale) > MAX_SCALED_WIDTH && scale > 1 {
        scale -= 1;
    }
    scale.max(1)
}

fn contrast_stretch(image: &GrayImage) -> GrayImage {
    let (min, max) = image
        .pixels()
        .fold((u8::MAX, u8::MIN), |(min, max), pixel| {
            (min.min(pixel[0]), max.max(pixel[0]))
        });

    if max <= min {
        return image.clone();
    }

    let scale = 255.0 / (max as f32 - min as f32);
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = ((pixel[0].saturating_sub(min)) as f32 * scale).round() as u8;
    }
    output
}

fn threshold(image: &GrayImage, cutoff: u8) -> GrayImage {
    let mut output = image.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = if pixel[0] > cutoff { 255 } else { 0 };
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn scale_shrinks_for_wide_images() {
        assert_eq!(ocr_scale(800), 3);
        assert_eq!(ocr_scale(2500), 2);
        assert_eq!(ocr_scale(5000), 1);
        assert_eq!(ocr_scale(9000), 1);
    }

    #[test]
    fn transparent_pixels_become_white_and_contrast_is_stretched() {
        let mut source = RgbaImage::new(2, 1);
        source.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        source.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let prepared = prepare_for_ocr(&DynamicImage::ImageRgba8(source), 1, false).to_luma8();
        assert_eq!(prepared.get_pixel(0, 0).0, [0]);
        assert_eq!(prepared.get_pixel(1, 0).0, [255]);
    }

    #[test]
    fn upscaling_multiplies_dimensions() {
        let source = DynamicImage::ImageLuma8(GrayImage::new(4, 3));
        let prepared = prepare_for_ocr(&source, 3, true);
        assert_eq!((prepared.width(), prepared.height()), (12, 9));
    }
}
