// src/services/vision_service.rs
use crate::config::{VisionConfig, VisionProvider};
use crate::errors::PlantVisionError;
use async_trait::async_trait;
use log::{debug, error};
use regex::Regex;
use reqwest::Client;
use serde_json::json;
use std::sync::{Arc, LazyLock};

pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

pub const DIAGNOSIS_PROMPT: &str = r#"You are an expert plant pathologist. Analyze the uploaded plant image and provide a detailed diagnosis.

IMPORTANT: Your response must be ONLY a valid JSON object with these exact fields:
{
  "disease": "string - disease name or 'Healthy' if no disease detected",
  "confidence": number - confidence score between 0-100,
  "severity": "string - 'Low', 'Medium', or 'High'",
  "symptoms": "string - visible symptoms observed",
  "causes": "string - what causes this condition",
  "treatment": "string - detailed treatment recommendations"
}

Be accurate and professional. If the image is unclear or not a plant, set disease to "Unable to analyze" and confidence to 0."#;

const USER_INSTRUCTION: &str = "Please analyze this plant image for diseases or health issues.";

static DATA_URL_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^data:(image/[A-Za-z0-9.+-]+);base64,").expect("data URL pattern is valid")
});

/// Base64 image payload with its mime type, as sent inline to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Accepts a `data:image/...;base64,` URL or bare base64.
    pub fn parse(image: &str) -> Self {
        let image = image.trim();
        match DATA_URL_PREFIX.captures(image) {
            Some(caps) => {
                let prefix_len = caps.get(0).map_or(0, |m| m.end());
                Self {
                    mime_type: caps[1].to_lowercase(),
                    data: image[prefix_len..].to_string(),
                }
            }
            None => Self {
                mime_type: DEFAULT_MIME_TYPE.to_string(),
                data: image.to_string(),
            },
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// A vision-capable model that turns an image into a raw text reply.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    async fn analyze(&self, image: &InlineImage) -> Result<String, PlantVisionError>;

    fn provider(&self) -> VisionProvider;

    fn model_name(&self) -> &str;
}

/// Picks the configured provider. `None` means no credential is configured.
pub fn build_analyzer(config: &VisionConfig) -> Option<Arc<dyn VisionAnalyzer>> {
    let api_key = config.active_api_key()?.to_string();
    let analyzer: Arc<dyn VisionAnalyzer> = match config.provider {
        VisionProvider::Gemini => Arc::new(GeminiAnalyzer::new(
            api_key,
            config.gemini_model.clone(),
            config.gemini_base_url.clone(),
            config.max_output_tokens,
            config.temperature,
        )),
        VisionProvider::OpenAi => Arc::new(OpenAiAnalyzer::new(
            api_key,
            config.openai_model.clone(),
            config.openai_base_url.clone(),
            config.max_output_tokens,
            config.temperature,
        )),
    };
    Some(analyzer)
}

pub struct GeminiAnalyzer {
    api_key: String,
    model: String,
    base_url: String,
    max_output_tokens: u32,
    temperature: f32,
    client: Client,
}

impl GeminiAnalyzer {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_output_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_output_tokens,
            temperature,
            client: Client::new(),
        }
    }

    fn request_body(&self, image: &InlineImage) -> serde_json::Value {
        json!({
            "contents": [{
                "parts": [
                    { "text": format!("{}\n\n{}", DIAGNOSIS_PROMPT, USER_INSTRUCTION) },
                    {
                        "inline_data": {
                            "mime_type": image.mime_type,
                            "data": image.data
                        }
                    }
                ]
            }],
            "generationConfig": {
                "maxOutputTokens": self.max_output_tokens,
                "temperature": self.temperature
            }
        })
    }
}

#[async_trait]
impl VisionAnalyzer for GeminiAnalyzer {
    async fn analyze(&self, image: &InlineImage) -> Result<String, PlantVisionError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| PlantVisionError::Upstream(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error: {}", error_text);
            return Err(PlantVisionError::Upstream(format!(
                "Gemini API error: {}",
                status.as_u16()
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlantVisionError::Upstream(format!("Failed to parse Gemini response: {}", e)))?;

        let text = result["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| PlantVisionError::Upstream("No content in Gemini response".to_string()))?;

        debug!("Gemini replied with {} characters", text.len());
        Ok(text.to_string())
    }

    fn provider(&self) -> VisionProvider {
        VisionProvider::Gemini
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

pub struct OpenAiAnalyzer {
    api_key: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

impl OpenAiAnalyzer {
    pub fn new(
        api_key: String,
        model: String,
        base_url: String,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens,
            temperature,
            client: Client::new(),
        }
    }

    fn request_body(&self, image: &InlineImage) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": DIAGNOSIS_PROMPT
                },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": USER_INSTRUCTION },
                        {
                            "type": "image_url",
                            "image_url": { "url": image.data_url() }
                        }
                    ]
                }
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature
        })
    }
}

#[async_trait]
impl VisionAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, image: &InlineImage) -> Result<String, PlantVisionError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(image))
            .send()
            .await
            .map_err(|e| PlantVisionError::Upstream(format!("OpenAI request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("OpenAI API error: {}", error_text);
            return Err(PlantVisionError::Upstream(format!(
                "OpenAI API error: {}",
                status.as_u16()
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PlantVisionError::Upstream(format!("Failed to parse OpenAI response: {}", e)))?;

        let content = result["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| PlantVisionError::Upstream("No content in OpenAI response".to_string()))?;

        debug!("OpenAI replied with {} characters", content.len());
        Ok(content.to_string())
    }

    fn provider(&self) -> VisionProvider {
        VisionProvider::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_url_prefix() {
        let image = InlineImage::parse("data:image/png;base64,iVBORw0KGgo=");
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.data, "iVBORw0KGgo=");
        assert_eq!(image.data_url(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn bare_base64_defaults_to_jpeg() {
        let image = InlineImage::parse("  /9j/4AAQSkZJRg==\n");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.data, "/9j/4AAQSkZJRg==");
    }

    #[test]
    fn no_credential_means_no_analyzer() {
        let config = VisionConfig::default();
        assert!(build_analyzer(&config).is_none());

        let config = VisionConfig {
            provider: VisionProvider::OpenAi,
            gemini_api_key: Some("g".to_string()),
            ..VisionConfig::default()
        };
        assert!(build_analyzer(&config).is_none());
    }

    #[test]
    fn builds_selected_provider() {
        let config = VisionConfig {
            provider: VisionProvider::OpenAi,
            openai_api_key: Some("o".to_string()),
            ..VisionConfig::default()
        };
        let analyzer = build_analyzer(&config).unwrap();
        assert_eq!(analyzer.provider(), VisionProvider::OpenAi);
        assert_eq!(analyzer.model_name(), "gpt-4o");
    }

    #[test]
    fn gemini_body_inlines_image_and_generation_config() {
        let analyzer = GeminiAnalyzer::new(
            "k".into(),
            "gemini-1.5-flash".into(),
            "http://localhost/".into(),
            1000,
            0.2,
        );
        let body = analyzer.request_body(&InlineImage::parse("data:image/webp;base64,AAAA"));
        let parts = &body["contents"][0]["parts"];
        assert!(parts[0]["text"].as_str().unwrap().contains("ONLY a valid JSON object"));
        assert_eq!(parts[1]["inline_data"]["mime_type"], "image/webp");
        assert_eq!(parts[1]["inline_data"]["data"], "AAAA");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(analyzer.base_url, "http://localhost");
    }

    #[test]
    fn openai_body_uses_system_instruction() {
        let analyzer =
            OpenAiAnalyzer::new("k".into(), "gpt-4o".into(), "http://localhost".into(), 1000, 0.2);
        let body = analyzer.request_body(&InlineImage::parse("AAAA"));
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], DIAGNOSIS_PROMPT);
        assert_eq!(
            body["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }
}
