// src/services/normalizer.rs
//! Turns an untrusted vision-model reply into a well-formed `AnalysisResult`.

use crate::config::VisionProvider;
use crate::errors::PlantVisionError;
use crate::models::{AnalysisResult, Severity};
use crate::services::vision_service::{InlineImage, VisionAnalyzer};
use log::{debug, error, info, warn};
use serde_json::Value;
use std::sync::Arc;

pub const FALLBACK_SYMPTOMS: &str = "No visible symptoms were reported";
pub const FALLBACK_CAUSES: &str = "The cause could not be determined from the image";
pub const FALLBACK_TREATMENT: &str = "Consult a local plant specialist for treatment advice";

pub struct Normalizer {
    provider: VisionProvider,
    analyzer: Option<Arc<dyn VisionAnalyzer>>,
}

impl Normalizer {
    pub fn new(provider: VisionProvider, analyzer: Option<Arc<dyn VisionAnalyzer>>) -> Self {
        Self { provider, analyzer }
    }

    pub fn is_configured(&self) -> bool {
        self.analyzer.is_some()
    }

    /// One pass per call: check inputs, ask the model once, extract, validate.
    pub async fn normalize(&self, image_base64: Option<&str>) -> Result<AnalysisResult, PlantVisionError> {
        let analyzer = self.analyzer.as_ref().ok_or_else(|| {
            PlantVisionError::Config(format!("{} API key not configured", provider_label(self.provider)))
        })?;

        let image = image_base64
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(InlineImage::parse)
            .filter(|img| !img.data.is_empty())
            .ok_or_else(|| PlantVisionError::Validation("No image provided".to_string()))?;

        info!(
            "Analyzing plant image with {} ({})",
            provider_label(analyzer.provider()),
            analyzer.model_name()
        );

        let reply = analyzer.analyze(&image).await.map_err(|e| {
            error!("Vision request failed: {}", e);
            e
        })?;
        debug!("Raw AI response: {}", reply);

        let analysis = match parse_reply(&reply) {
            Ok(value) => validate_analysis(&value)?,
            Err(reason) => {
                warn!("Failed to parse AI response: {}", reason);
                AnalysisResult::parse_fallback()
            }
        };

        info!(
            "Processed analysis: disease={} confidence={} severity={} degraded={}",
            analysis.disease, analysis.confidence, analysis.severity, analysis.degraded
        );
        Ok(analysis)
    }
}

fn provider_label(provider: VisionProvider) -> &'static str {
    match provider {
        VisionProvider::Gemini => "Gemini",
        VisionProvider::OpenAi => "OpenAI",
    }
}

/// Greedy match from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_reply(reply: &str) -> Result<Value, String> {
    let candidate = extract_json_object(reply).ok_or_else(|| "No JSON found in response".to_string())?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err("Response JSON is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Enforces the result contract on a parsed JSON object.
///
/// A missing disease label or a non-numeric confidence is a hard failure.
/// Everything else is coerced, and any coercion marks the result degraded.
pub fn validate_analysis(value: &Value) -> Result<AnalysisResult, PlantVisionError> {
    let disease = value
        .get("disease")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| PlantVisionError::InvalidAnalysis("missing disease label".to_string()))?;

    let raw_confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| PlantVisionError::InvalidAnalysis("confidence is not a number".to_string()))?;
    let (confidence, confidence_coerced) = clamp_confidence(raw_confidence);

    let (severity, severity_coerced) = match value.get("severity").and_then(Value::as_str) {
        Some(label) => match Severity::parse_exact(label) {
            Some(severity) => (severity, false),
            None => (Severity::Medium, true),
        },
        None => (Severity::Medium, true),
    };

    let mut degraded = confidence_coerced || severity_coerced;
    let mut text_field = |key: &str, fallback: &str| match value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(text) => text.to_string(),
        None => {
            degraded = true;
            fallback.to_string()
        }
    };

    let symptoms = text_field("symptoms", FALLBACK_SYMPTOMS);
    let causes = text_field("causes", FALLBACK_CAUSES);
    let treatment = text_field("treatment", FALLBACK_TREATMENT);

    Ok(AnalysisResult {
        disease: disease.to_string(),
        confidence,
        severity,
        symptoms,
        causes,
        treatment,
        degraded: degraded || value.get("degraded").and_then(Value::as_bool).unwrap_or(false),
    })
}

/// Clamps into [0, 100] and rounds; the flag reports whether the value changed.
pub fn clamp_confidence(raw: f64) -> (u8, bool) {
    if !raw.is_finite() {
        return (0, true);
    }
    let clamped = raw.clamp(0.0, 100.0).round();
    (clamped as u8, clamped != raw)
}
