// src/services/image_processor.rs
use std::borrow::Cow;

use base64::{Engine as _, engine::general_purpose};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView};
use log::debug;

use crate::config::PipelineConfig;
use crate::errors::EcoScanError;
use crate::models::{AnalysisRequest, ImageSource, PreparedImage};

pub const CANONICAL_MEDIA_TYPE: &str = "image/jpeg";

pub struct ImageProcessor {
    max_bytes: usize,
    max_width: u32,
    min_dimension: u32,
    jpeg_quality: u8,
}

impl ImageProcessor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            max_bytes: config.max_image_bytes,
            max_width: config.max_image_width,
            min_dimension: config.min_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }

    /// Decode, validate, downscale and re-encode the inbound image as JPEG.
    /// The request itself is left untouched.
    pub fn prepare(&self, request: &AnalysisRequest) -> Result<PreparedImage, EcoScanError> {
        let raw = decode_source(&request.source)?;

        if raw.is_empty() {
            return Err(EcoScanError::InvalidImage("image is empty".to_string()));
        }
        if raw.len() > self.max_bytes {
            return Err(EcoScanError::InvalidImage(format!(
                "image is {} bytes, limit is {}",
                raw.len(),
                self.max_bytes
            )));
        }

        let img = image::load_from_memory(&raw)
            .map_err(|e| EcoScanError::InvalidImage(format!("Invalid image format: {}", e)))?;
        let (width, height) = img.dimensions();
        self.validate_dimensions(width, height)?;

        let resized = self.resize_if_needed(img);
        let bytes = encode_jpeg(&resized, self.jpeg_quality)?;
        let (width, height) = resized.dimensions();
        debug!(
            "Prepared image {}x{} ({} -> {} bytes)",
            width,
            height,
            raw.len(),
            bytes.len()
        );

        Ok(PreparedImage {
            base64: general_purpose::STANDARD.encode(&bytes),
            bytes,
            width,
            height,
            media_type: CANONICAL_MEDIA_TYPE,
        })
    }

    fn validate_dimensions(&self, width: u32, height: u32) -> Result<(), EcoScanError> {
        if width == 0 || height == 0 {
            return Err(EcoScanError::InvalidImage(format!(
                "image has zero dimension ({}x{})",
                width, height
            )));
        }
        if width.min(height) < self.min_dimension {
            return Err(EcoScanError::InvalidImage(format!(
                "image too small ({}x{}), minimum side is {}px",
                width, height, self.min_dimension
            )));
        }
        Ok(())
    }

    fn resize_if_needed(&self, img: DynamicImage) -> DynamicImage {
        let (width, height) = img.dimensions();
        if width <= self.max_width {
            return img;
        }

        let ratio = self.max_width as f64 / width as f64;
        let new_height = ((height as f64 * ratio).round() as u32).max(1);

        img.resize_exact(
            self.max_width,
            new_height,
            image::imageops::FilterType::Lanczos3,
        )
    }
}

fn decode_source(source: &ImageSource) -> Result<Cow<'_, [u8]>, EcoScanError> {
    match source {
        ImageSource::Bytes(data) => Ok(Cow::Borrowed(data.as_slice())),
        ImageSource::Base64(encoded) => {
            let payload = strip_data_url(encoded);
            let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
            general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map(Cow::Owned)
                .map_err(|e| EcoScanError::InvalidImage(format!("Invalid base64 payload: {}", e)))
        }
    }
}

/// Drop a `data:<mime>;base64,` prefix if present.
fn strip_data_url(encoded: &str) -> &str {
    let trimmed = encoded.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, payload)) = trimmed.split_once(',') {
            return payload;
        }
    }
    trimmed
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EcoScanError> {
    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
        .map_err(|e| EcoScanError::InvalidImage(format!("Failed to encode image: {}", e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::new_rgb8(width, height);
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(&PipelineConfig::default())
    }

    #[test]
    fn rejects_empty_input() {
        let err = processor()
            .prepare(&AnalysisRequest::from_bytes(Vec::new(), None))
            .unwrap_err();
        assert!(matches!(err, EcoScanError::InvalidImage(_)));
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn rejects_corrupt_header() {
        let err = processor()
            .prepare(&AnalysisRequest::from_bytes(b"\x89PNG garbage".to_vec(), None))
            .unwrap_err();
        assert!(matches!(err, EcoScanError::InvalidImage(_)));
    }

    #[test]
    fn rejects_oversized_payload() {
        let mut config = PipelineConfig::default();
        config.max_image_bytes = 16;
        let err = ImageProcessor::new(&config)
            .prepare(&AnalysisRequest::from_bytes(png_bytes(200, 200), None))
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn rejects_tiny_images() {
        let err = processor()
            .prepare(&AnalysisRequest::from_bytes(png_bytes(50, 400), None))
            .unwrap_err();
        assert!(err.to_string().contains("too small"));
    }

    #[test]
    fn keeps_small_images_at_original_size() {
        let prepared = processor()
            .prepare(&AnalysisRequest::from_bytes(png_bytes(640, 480), None))
            .unwrap();
        assert_eq!((prepared.width, prepared.height), (640, 480));
        assert_eq!(prepared.media_type, "image/jpeg");
        // JPEG SOI marker
        assert_eq!(&prepared.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn downscales_wide_images_preserving_aspect_ratio() {
        let prepared = processor()
            .prepare(&AnalysisRequest::from_bytes(png_bytes(2560, 1440), None))
            .unwrap();
        assert_eq!((prepared.width, prepared.height), (1280, 720));
    }

    #[test]
    fn accepts_data_url_base64() {
        let encoded = general_purpose::STANDARD.encode(png_bytes(200, 150));
        let request = AnalysisRequest::from_base64(format!("data:image/png;base64,{}", encoded));
        let prepared = processor().prepare(&request).unwrap();
        assert_eq!((prepared.width, prepared.height), (200, 150));
        assert_eq!(
            general_purpose::STANDARD.decode(&prepared.base64).unwrap(),
            prepared.bytes
        );
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = processor()
            .prepare(&AnalysisRequest::from_base64("data:image/png;base64,@@not-base64@@"))
            .unwrap_err();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn strip_data_url_leaves_plain_payload() {
        assert_eq!(strip_data_url("  QUJD "), "QUJD");
        assert_eq!(strip_data_url("data:image/jpeg;base64,QUJD"), "QUJD");
    }
}
