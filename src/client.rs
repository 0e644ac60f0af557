// src/client.rs
//! Caller-side adapter for the analysis endpoint.
//!
//! `AnalysisClient::analyze` never fails: oversized input is rejected before
//! any request, and every transport or shape problem turns into the fixed
//! "Analysis Failed" sentinel. A well-formed reply that still could not
//! diagnose the plant is reported as `Inconclusive` and never saved.

use crate::config::ClientConfig;
use crate::models::{AnalysisRequest, AnalysisResult, HistoryRecord, NewHistoryRecord};
use crate::services::history_store::{self, HistoryStore};
use crate::services::normalizer::validate_analysis;
use crate::services::ImageProcessor;
use bytes::Bytes;
use log::{error, info, warn};
use regex::Regex;
use reqwest::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

static HEADING_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]*").expect("heading pattern is valid"));
static EMPHASIS_MARKERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*|__|\*").expect("emphasis pattern is valid"));

/// Removes stray markdown emphasis and heading markers.
/// Cosmetic only: if nothing would be left, the input comes back unchanged.
pub fn clean_markup(text: &str) -> String {
    let without_headings = HEADING_MARKERS.replace_all(text, "");
    let cleaned = EMPHASIS_MARKERS.replace_all(&without_headings, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned.to_string()
    }
}

fn clean_result(mut result: AnalysisResult) -> AnalysisResult {
    result.disease = clean_markup(&result.disease);
    result.symptoms = clean_markup(&result.symptoms);
    result.causes = clean_markup(&result.causes);
    result.treatment = clean_markup(&result.treatment);
    result
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientOutcome {
    Analyzed(AnalysisResult),
    /// The endpoint answered, but with its parse fallback or an
    /// "Unable to analyze" diagnosis.
    Inconclusive(AnalysisResult),
    /// The endpoint could not produce a usable result; carries the sentinel.
    Failed(AnalysisResult),
    /// Input rejected before any request was made.
    Rejected { message: String },
    /// Another analysis from this client is still outstanding.
    InProgress,
}

impl ClientOutcome {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            Self::Analyzed(result) | Self::Inconclusive(result) | Self::Failed(result) => {
                Some(result)
            }
            _ => None,
        }
    }

    /// Text for the transient notification shown to the user.
    pub fn notice(&self) -> &str {
        match self {
            Self::Analyzed(result) if result.degraded => {
                "Analysis completed, but some details could not be read clearly."
            }
            Self::Analyzed(_) => "Analysis completed successfully!",
            Self::Inconclusive(_) => "Could not analyze this image. Try a clearer photo of the plant.",
            Self::Failed(_) => "Failed to analyze image. Please try again.",
            Self::Rejected { message } => message,
            Self::InProgress => "An analysis is already in progress",
        }
    }
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AnalysisClient {
    config: ClientConfig,
    http: Client,
    images: ImageProcessor,
    store: Option<Arc<dyn HistoryStore>>,
    session_id: Uuid,
    in_flight: AtomicBool,
}

impl AnalysisClient {
    pub fn new(config: ClientConfig, store: Option<Arc<dyn HistoryStore>>) -> Self {
        let images = ImageProcessor::new(config.max_image_bytes);
        Self {
            config,
            http: Client::new(),
            images,
            store,
            session_id: Uuid::new_v4(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn analyze(&self, image: &[u8]) -> ClientOutcome {
        let format = match self.images.check_payload(image) {
            Ok(format) => format,
            Err(e) => {
                warn!("Rejected image before upload: {}", e);
                return ClientOutcome::Rejected {
                    message: e.to_string(),
                };
            }
        };

        let Some(_guard) = self.begin() else {
            return ClientOutcome::InProgress;
        };

        let data_url = ImageProcessor::to_data_url(format, image);
        match self.request(data_url).await {
            Ok(result) if result.is_conclusive() => ClientOutcome::Analyzed(clean_result(result)),
            Ok(result) => {
                warn!("Analysis was inconclusive: {}", result.disease);
                ClientOutcome::Inconclusive(clean_result(result))
            }
            Err(reason) => {
                error!("Detection failed: {}", reason);
                ClientOutcome::Failed(AnalysisResult::client_sentinel())
            }
        }
    }

    /// Analyzes and, for conclusive results only, records the detection in history.
    /// Storage problems are logged and never change the outcome.
    pub async fn analyze_and_save(&self, image: &[u8]) -> ClientOutcome {
        let outcome = self.analyze(image).await;
        if let (ClientOutcome::Analyzed(result), Some(store)) = (&outcome, &self.store) {
            self.save(store.as_ref(), image, result).await;
        }
        outcome
    }

    pub async fn history(&self) -> Vec<HistoryRecord> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.list(self.config.history_limit).await {
            Ok(records) => records,
            Err(e) => {
                error!("Error fetching detection history: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn delete(&self, id: &Uuid) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match store.delete(id).await {
            Ok(()) => true,
            Err(e) => {
                error!("Error deleting detection {}: {}", id, e);
                false
            }
        }
    }

    fn begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.in_flight))
    }

    async fn request(&self, data_url: String) -> Result<AnalysisResult, String> {
        let mut builder = self
            .http
            .post(&self.config.endpoint_url)
            .json(&AnalysisRequest::new(data_url));
        if let Some(key) = &self.config.api_key {
            builder = builder
                .header("apikey", key)
                .header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| format!("request failed: {}", e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("endpoint returned {}: {}", status, body));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("invalid response body: {}", e))?;
        validate_analysis(&value).map_err(|e| e.to_string())
    }

    async fn save(&self, store: &dyn HistoryStore, image: &[u8], result: &AnalysisResult) {
        let format = match self.images.check_payload(image) {
            Ok(format) => format,
            Err(e) => {
                warn!("Skipping history save: {}", e);
                return;
            }
        };
        let path = history_store::image_path(ImageProcessor::extension(format));
        let image_url = match store
            .upload_image(&path, Bytes::copy_from_slice(image), ImageProcessor::mime_type(format))
            .await
        {
            Ok(url) => url,
            Err(e) => {
                error!("Error uploading image: {}", e);
                return;
            }
        };

        let record = NewHistoryRecord::from_result(result, image_url, Some(self.session_id));
        match store.insert(&record).await {
            Ok(saved) => info!("Saved detection {} to history", saved.id),
            Err(e) => error!("Error saving detection result: {}", e),
        }
    }
}
