// src/services/image_processor.rs
use crate::errors::PlantVisionError;
use base64::{Engine as _, engine::general_purpose};
use image::{GenericImageView, ImageFormat};

const MAX_DIMENSION: u32 = 4096;

pub struct ImageProcessor {
    max_bytes: usize,
}

impl ImageProcessor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Cheap checks that need no decoding: size and a recognised header.
    pub fn check_payload(&self, data: &[u8]) -> Result<ImageFormat, PlantVisionError> {
        if data.is_empty() {
            return Err(PlantVisionError::Validation("No image provided".to_string()));
        }
        if data.len() > self.max_bytes {
            return Err(PlantVisionError::Validation(format!(
                "File size must be less than {}MB",
                self.max_bytes / (1024 * 1024)
            )));
        }
        image::guess_format(data)
            .map_err(|e| PlantVisionError::ImageProcessing(format!("Invalid image format: {}", e)))
    }

    /// Full decode, used on the upload route where bytes come straight off the wire.
    /// Returns the detected format with the decoded dimensions.
    pub fn validate_image(&self, data: &[u8]) -> Result<(ImageFormat, u32, u32), PlantVisionError> {
        let format = self.check_payload(data).map_err(|e| match e {
            PlantVisionError::Validation(msg) => PlantVisionError::ImageProcessing(msg),
            other => other,
        })?;

        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| PlantVisionError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(PlantVisionError::ImageProcessing(format!(
                "Image dimensions exceed {}x{}",
                MAX_DIMENSION, MAX_DIMENSION
            )));
        }

        Ok((format, width, height))
    }

    pub fn mime_type(format: ImageFormat) -> &'static str {
        format.to_mime_type()
    }

    pub fn extension(format: ImageFormat) -> &'static str {
        format.extensions_str().first().copied().unwrap_or("img")
    }

    pub fn to_data_url(format: ImageFormat, data: &[u8]) -> String {
        format!(
            "data:{};base64,{}",
            Self::mime_type(format),
            general_purpose::STANDARD.encode(data)
        )
    }
}
