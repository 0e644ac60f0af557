// src/handlers.rs
use crate::{AppState, errors::PlantVisionError, models::*, services::ImageProcessor};
use actix_multipart::{Multipart, MultipartError};
use actix_web::{Error, HttpResponse, http::StatusCode, web};
use futures_util::TryStreamExt;
use log::{debug, warn};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

/// JSON entry point: `{ "imageBase64": "..." }`.
///
/// A body that is not valid JSON is treated the same as one without an image.
pub async fn detect_disease(
    body: Result<web::Bytes, Error>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlantVisionError> {
    let body = body.map_err(|e| body_error(e, data.max_body_bytes))?;
    let request: AnalysisRequest = serde_json::from_slice(&body).unwrap_or_else(|e| {
        warn!("Unreadable analysis request body: {}", e);
        AnalysisRequest::default()
    });

    let analysis = data
        .normalizer
        .normalize(request.image_base64.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(&analysis))
}

/// Multipart entry point: the first file field is validated and analyzed.
pub async fn upload_and_detect(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, PlantVisionError> {
    let limit = data.image_processor.max_bytes();

    while let Some(mut field) = payload.try_next().await.map_err(upload_error)? {
        if field.content_disposition().get_filename().is_none() {
            while field.try_next().await.map_err(upload_error)?.is_some() {}
            continue;
        }

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(upload_error)? {
            if image_data.len() + chunk.len() > limit {
                return Err(PlantVisionError::ImageProcessing(format!(
                    "File size must be less than {}MB",
                    limit / (1024 * 1024)
                )));
            }
            image_data.extend_from_slice(&chunk);
        }

        let (format, width, height) = data.image_processor.validate_image(&image_data)?;
        debug!("Accepted {:?} upload of {}x{}", format, width, height);
        let data_url = ImageProcessor::to_data_url(format, &image_data);

        let analysis = data.normalizer.normalize(Some(&data_url)).await?;
        return Ok(HttpResponse::Ok().json(&analysis));
    }

    Err(PlantVisionError::ImageProcessing("No image provided".to_string()))
}

fn body_error(err: Error, limit: usize) -> PlantVisionError {
    if err.as_response_error().status_code() == StatusCode::PAYLOAD_TOO_LARGE {
        PlantVisionError::PayloadTooLarge(limit)
    } else {
        PlantVisionError::Validation(format!("Unreadable request body: {}", err))
    }
}

fn upload_error(err: MultipartError) -> PlantVisionError {
    warn!("Rejected multipart upload: {}", err);
    PlantVisionError::ImageProcessing(format!("Invalid upload: {}", err))
}

/// CORS preflight: empty 200, headers come from the default-headers middleware.
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "plant-vision",
        "version": env!("CARGO_PKG_VERSION"),
        "provider": data.provider.to_string(),
        "vision_configured": data.normalizer.is_configured()
    }))
}
