// src/errors.rs
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::models::ErrorResult;

#[derive(Error, Debug)]
pub enum PlantVisionError {
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Validation(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    Upstream(String),

    #[error("Invalid analysis format from AI: {0}")]
    InvalidAnalysis(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),
}

impl ResponseError for PlantVisionError {
    fn status_code(&self) -> StatusCode {
        match self {
            PlantVisionError::ImageProcessing(_) => StatusCode::BAD_REQUEST,
            PlantVisionError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    // Every failure on the analysis path carries the same body shape so the
    // browser can render it like a result.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResult::new(self.to_string()))
    }
}
