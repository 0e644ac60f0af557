// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

pub const HEALTHY_LABEL: &str = "Healthy";
pub const UNABLE_TO_ANALYZE_LABEL: &str = "Unable to analyze";
pub const ANALYSIS_ERROR_LABEL: &str = "Analysis Error";
pub const ERROR_LABEL: &str = "Error";

/// Body of a request to the analysis endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisRequest {
    #[serde(rename = "imageBase64", default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl AnalysisRequest {
    pub fn new(image_base64: impl Into<String>) -> Self {
        Self {
            image_base64: Some(image_base64.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Exact, case-sensitive match against the three allowed labels.
    pub fn parse_exact(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The normalized diagnosis handed to every caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub disease: String,
    pub confidence: u8,
    pub severity: Severity,
    pub symptoms: String,
    pub causes: String,
    pub treatment: String,
    /// Set when any field had to be coerced or a fallback was substituted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

impl AnalysisResult {
    /// Substituted when the model reply holds no parseable JSON object.
    pub fn parse_fallback() -> Self {
        Self {
            disease: ANALYSIS_ERROR_LABEL.to_string(),
            confidence: 0,
            severity: Severity::Medium,
            symptoms: "Could not analyze the provided image".to_string(),
            causes: "Image analysis failed".to_string(),
            treatment: "Please try uploading a clearer image of the plant".to_string(),
            degraded: true,
        }
    }

    /// Client-side sentinel for transport failures and malformed responses.
    pub fn client_sentinel() -> Self {
        Self {
            disease: "Analysis Failed".to_string(),
            confidence: 0,
            severity: Severity::Medium,
            symptoms: "The image could not be analyzed at this time".to_string(),
            causes: "The analysis service was unreachable or returned an invalid response"
                .to_string(),
            treatment: "Check your connection and try again with a clear photo of the plant"
                .to_string(),
            degraded: true,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.disease.eq_ignore_ascii_case(HEALTHY_LABEL)
    }

    pub fn is_unable_to_analyze(&self) -> bool {
        self.disease.eq_ignore_ascii_case(UNABLE_TO_ANALYZE_LABEL)
    }

    /// False for the parse fallback, the error body and the model's own
    /// "Unable to analyze" answer. Only conclusive results go to history.
    pub fn is_conclusive(&self) -> bool {
        let label = self.disease.as_str();
        !(label == ANALYSIS_ERROR_LABEL || label == ERROR_LABEL || self.is_unable_to_analyze())
    }

    /// Plain text report suitable for sharing or saving to a file.
    pub fn report(&self) -> String {
        let mut out = String::new();
        out.push_str("Plant Disease Analysis Report\n");
        out.push_str("=============================\n\n");
        out.push_str(&format!("Diagnosis:  {}\n", self.disease));
        out.push_str(&format!("Confidence: {}%\n", self.confidence));
        out.push_str(&format!("Severity:   {}\n\n", self.severity));
        out.push_str(&format!("Symptoms:\n{}\n\n", self.symptoms));
        out.push_str(&format!("Causes:\n{}\n\n", self.causes));
        out.push_str(&format!("Treatment:\n{}\n", self.treatment));
        if self.degraded {
            out.push_str("\nNote: part of this result was reconstructed from incomplete model output.\n");
        }
        out
    }
}

/// Fixed-shape body returned on every hard failure of the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
    pub disease: String,
    pub confidence: u8,
    pub severity: Severity,
    pub symptoms: String,
    pub causes: String,
    pub treatment: String,
}

impl ErrorResult {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            disease: ERROR_LABEL.to_string(),
            confidence: 0,
            severity: Severity::Medium,
            symptoms: "Analysis failed".to_string(),
            causes: "Technical error occurred".to_string(),
            treatment: "Please try again or contact support".to_string(),
        }
    }
}

/// Row written to the history table after a successful analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    pub image_url: String,
    pub disease: String,
    pub confidence: u8,
    pub severity: Severity,
    pub symptoms: String,
    pub causes: String,
    pub treatment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
}

impl NewHistoryRecord {
    pub fn from_result(result: &AnalysisResult, image_url: String, session_id: Option<Uuid>) -> Self {
        Self {
            image_url,
            disease: result.disease.clone(),
            confidence: result.confidence,
            severity: result.severity,
            symptoms: result.symptoms.clone(),
            causes: result.causes.clone(),
            treatment: result.treatment.clone(),
            session_id,
        }
    }
}

// The hosted table returns every column, so older rows carry `null` where
// newer ones have text.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_url: String,
    pub disease: String,
    pub confidence: u8,
    pub severity: Severity,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub symptoms: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub causes: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub treatment: String,
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

/// Counts shown next to the history list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistorySummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub most_recent: Option<DateTime<Utc>>,
}

impl HistorySummary {
    pub fn from_records(records: &[HistoryRecord]) -> Self {
        let mut summary = Self {
            total: records.len(),
            ..Self::default()
        };
        for record in records {
            match record.severity {
                Severity::Low => summary.low += 1,
                Severity::Medium => summary.medium += 1,
                Severity::High => summary.high += 1,
            }
            if summary.most_recent.is_none_or(|t| record.created_at > t) {
                summary.most_recent = Some(record.created_at);
            }
        }
        summary
    }
}
