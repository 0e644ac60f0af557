// src/lib.rs
use actix_web::{middleware, web};
use std::sync::Arc;

pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;

use crate::config::{AppConfig, VisionProvider};
use crate::handlers::{
    ALLOW_HEADERS, ALLOW_ORIGIN, detect_disease, health_check, preflight, upload_and_detect,
};
use crate::services::{ImageProcessor, Normalizer, build_analyzer};

#[derive(Clone)]
pub struct AppState {
    pub normalizer: Arc<Normalizer>,
    pub image_processor: Arc<ImageProcessor>,
    pub provider: VisionProvider,
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        let analyzer = build_analyzer(&config.vision);
        Self {
            normalizer: Arc::new(Normalizer::new(config.vision.provider, analyzer)),
            image_processor: Arc::new(ImageProcessor::new(config.server.max_image_bytes)),
            provider: config.vision.provider,
            max_body_bytes: config.server.max_body_bytes,
        }
    }
}

pub fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", ALLOW_ORIGIN))
        .add(("Access-Control-Allow-Headers", ALLOW_HEADERS))
}

/// Routes shared by the server binary and the integration tests.
pub fn configure(state: AppState) -> impl FnOnce(&mut web::ServiceConfig) {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::PayloadConfig::new(state.max_body_bytes))
            .app_data(web::Data::new(state))
            .service(
                web::resource("/functions/v1/plant-disease-detection")
                    .route(web::post().to(detect_disease))
                    .route(web::method(actix_web::http::Method::OPTIONS).to(preflight)),
            )
            .service(
                web::scope("/api/v1")
                    .service(
                        web::resource("/analyze")
                            .route(web::post().to(detect_disease))
                            .route(web::method(actix_web::http::Method::OPTIONS).to(preflight)),
                    )
                    .service(
                        web::resource("/analyze/upload")
                            .route(web::post().to(upload_and_detect))
                            .route(web::method(actix_web::http::Method::OPTIONS).to(preflight)),
                    ),
            )
            .route("/health", web::get().to(health_check));
    }
}
