//! Image transformation
//!
//! Originals are decoded, flattened onto a white background, downscaled to
//! the target width when wider (never upscaled), optionally blurred, and
//! re-encoded. The transform is a pure bytes-to-bytes function so the same
//! input always produces the same artifact hash.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage, Rgba};
use rowforge_common::{Result, RowforgeError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Encoding applied to transformed artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Webp,
    Png,
    Jpeg,
}

impl OutputFormat {
    /// File extension used in published names and URLs
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

/// Transform settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageTransform {
    /// Target width in pixels; narrower images pass through unscaled
    pub target_width: u32,
    pub format: OutputFormat,
    /// JPEG quality, ignored for other formats
    pub jpeg_quality: u8,
    /// Gaussian blur sigma; 0 disables
    pub blur_sigma: f32,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            target_width: 1000,
            format: OutputFormat::Webp,
            jpeg_quality: 85,
            blur_sigma: 0.0,
        }
    }
}

impl ImageTransform {
    /// Transform one original into encoded artifact bytes
    pub fn apply(&self, original: &[u8]) -> Result<Vec<u8>> {
        let decoded = image::load_from_memory(original)
            .map_err(|e| RowforgeError::ImageDecode(e.to_string()))?;

        let flattened = flatten_onto_white(&decoded);
        let (width, height) = (flattened.width(), flattened.height());

        let mut result = if width > self.target_width {
            let target_height =
                ((height as u64 * self.target_width as u64) / width as u64).max(1) as u32;
            DynamicImage::ImageRgb8(flattened).resize_exact(
                self.target_width,
                target_height,
                FilterType::Lanczos3,
            )
        } else {
            DynamicImage::ImageRgb8(flattened)
        };

        if self.blur_sigma > 0.0 {
            result = result.blur(self.blur_sigma);
        }

        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        match self.format {
            OutputFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut cursor, self.jpeg_quality);
                result
                    .write_with_encoder(encoder)
                    .map_err(|e| RowforgeError::ImageDecode(e.to_string()))?;
            },
            OutputFormat::Png => {
                result
                    .write_to(&mut cursor, ImageFormat::Png)
                    .map_err(|e| RowforgeError::ImageDecode(e.to_string()))?;
            },
            OutputFormat::Webp => {
                result
                    .write_to(&mut cursor, ImageFormat::WebP)
                    .map_err(|e| RowforgeError::ImageDecode(e.to_string()))?;
            },
        }

        debug!(
            input_size = original.len(),
            output_size = buffer.len(),
            width = result.width(),
            height = result.height(),
            "Transformed image"
        );
        Ok(buffer)
    }
}

/// Composite any alpha channel onto a white background. Catalog photos
/// with transparency otherwise come out black in JPEG output.
fn flatten_onto_white(source: &DynamicImage) -> RgbImage {
    let rgba = source.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());

    for (x, y, pixel) in rgba.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let alpha = a as u32;
        let blend = |channel: u8| -> u8 {
            ((channel as u32 * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        out.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
    }

    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn solid_rgba(width: u32, height: u32, pixel: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, Rgba(pixel));
        encode_png(&DynamicImage::ImageRgba8(img))
    }

    #[test]
    fn test_wide_image_downscaled_keeping_aspect() {
        let input = solid_rgba(2000, 1000, [10, 20, 30, 255]);
        let transform = ImageTransform {
            target_width: 500,
            format: OutputFormat::Png,
            ..ImageTransform::default()
        };

        let output = transform.apply(&input).unwrap();
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.width(), 500);
        assert_eq!(decoded.height(), 250);
    }

    #[test]
    fn test_narrow_image_not_upscaled() {
        let input = solid_rgba(300, 200, [10, 20, 30, 255]);
        let transform = ImageTransform {
            target_width: 1000,
            format: OutputFormat::Png,
            ..ImageTransform::default()
        };

        let output = transform.apply(&input).unwrap();
        let decoded = image::load_from_memory(&output).unwrap();
        assert_eq!(decoded.width(), 300);
        assert_eq!(decoded.height(), 200);
    }

    #[test]
    fn test_transparency_flattened_to_white() {
        let input = solid_rgba(4, 4, [0, 0, 0, 0]);
        let transform = ImageTransform {
            target_width: 1000,
            format: OutputFormat::Png,
            ..ImageTransform::default()
        };

        let output = transform.apply(&input).unwrap();
        let decoded = image::load_from_memory(&output).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
    }

    #[test]
    fn test_deterministic_output() {
        let input = solid_rgba(100, 100, [120, 40, 200, 255]);
        let transform = ImageTransform::default();
        assert_eq!(transform.apply(&input).unwrap(), transform.apply(&input).unwrap());
    }

    #[test]
    fn test_garbage_input_rejected() {
        let transform = ImageTransform::default();
        let result = transform.apply(b"not an image at all");
        assert!(matches!(result, Err(RowforgeError::ImageDecode(_))));
    }

    #[test]
    fn test_extensions() {
        assert_eq!(OutputFormat::Webp.extension(), "webp");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert_eq!(OutputFormat::Png.extension(), "png");
    }
}
