// src/services/mod.rs
pub mod history_store;
pub mod image_processor;
pub mod normalizer;
pub mod vision_service;

pub use history_store::{HistoryStore, SupabaseStore};
pub use image_processor::ImageProcessor;
pub use normalizer::Normalizer;
pub use vision_service::{InlineImage, VisionAnalyzer, build_analyzer};
