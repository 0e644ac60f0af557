// src/config.rs
//! Configuration for the server, the vision provider, the hosted store and
//! the client adapter. Built once from the environment and passed down; no
//! component reads environment variables on its own.

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::errors::PlantVisionError;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
// Base64 inflates by 4/3, plus the JSON envelope.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_HISTORY_TABLE: &str = "detection_history";
pub const DEFAULT_IMAGE_BUCKET: &str = "plant-images";
pub const DEFAULT_ENDPOINT_PATH: &str = "/functions/v1/plant-disease-detection";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisionProvider {
    #[default]
    Gemini,
    OpenAi,
}

impl FromStr for VisionProvider {
    type Err = PlantVisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai" | "gpt-4o" => Ok(Self::OpenAi),
            _ => Err(PlantVisionError::InvalidProvider(s.to_string())),
        }
    }
}

impl fmt::Display for VisionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_body_bytes: usize,
    pub max_image_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub provider: VisionProvider,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_model: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            provider: VisionProvider::default(),
            gemini_api_key: None,
            openai_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            openai_model: DEFAULT_OPENAI_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            max_output_tokens: 1000,
            temperature: 0.2,
        }
    }
}

impl VisionConfig {
    /// Credential for the selected provider, if one is configured.
    pub fn active_api_key(&self) -> Option<&str> {
        match self.provider {
            VisionProvider::Gemini => self.gemini_api_key.as_deref(),
            VisionProvider::OpenAi => self.openai_api_key.as_deref(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub api_key: String,
    pub table: String,
    pub bucket: String,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint_url: String,
    pub api_key: Option<String>,
    pub max_image_bytes: usize,
    pub history_limit: usize,
}

impl ClientConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            api_key: None,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub vision: VisionConfig,
    pub store: Option<StoreConfig>,
    pub client: ClientConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PlantVisionError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PlantVisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server = ServerConfig {
            bind_addr: get("PLANT_VISION_BIND").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_body_bytes: parse_or(get("PLANT_VISION_MAX_BODY_BYTES"), DEFAULT_MAX_BODY_BYTES)?,
            max_image_bytes: parse_or(get("PLANT_VISION_MAX_IMAGE_BYTES"), DEFAULT_MAX_IMAGE_BYTES)?,
        };

        let provider = match get("VISION_PROVIDER") {
            Some(name) => name.parse::<VisionProvider>()?,
            None => VisionProvider::default(),
        };
        let defaults = VisionConfig::default();
        let vision = VisionConfig {
            provider,
            gemini_api_key: get("GEMINI_API_KEY"),
            openai_api_key: get("OPENAI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            openai_model: get("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            gemini_base_url: get("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            openai_base_url: get("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
            max_output_tokens: parse_or(get("VISION_MAX_OUTPUT_TOKENS"), defaults.max_output_tokens)?,
            temperature: parse_or(get("VISION_TEMPERATURE"), defaults.temperature)?,
        };

        let store_url = get("SUPABASE_URL");
        let store = match (store_url.clone(), get("SUPABASE_ANON_KEY")) {
            (Some(url), Some(api_key)) => Some(StoreConfig {
                url: url.trim_end_matches('/').to_string(),
                api_key,
                table: get("HISTORY_TABLE").unwrap_or_else(|| DEFAULT_HISTORY_TABLE.to_string()),
                bucket: get("IMAGE_BUCKET").unwrap_or_else(|| DEFAULT_IMAGE_BUCKET.to_string()),
            }),
            _ => None,
        };

        // Without an explicit endpoint the client talks to the hosted
        // function next to the store, or to a locally running server.
        let endpoint_url = get("PLANT_VISION_ENDPOINT")
            .or_else(|| {
                store_url.map(|url| format!("{}{}", url.trim_end_matches('/'), DEFAULT_ENDPOINT_PATH))
            })
            .unwrap_or_else(|| format!("http://127.0.0.1:8080{}", DEFAULT_ENDPOINT_PATH));
        let client = ClientConfig {
            endpoint_url,
            api_key: get("PLANT_VISION_API_KEY").or_else(|| get("SUPABASE_ANON_KEY")),
            max_image_bytes: server.max_image_bytes,
            history_limit: parse_or(get("HISTORY_LIMIT"), DEFAULT_HISTORY_LIMIT)?,
        };

        Ok(Self {
            server,
            vision,
            store,
            client,
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> Result<T, PlantVisionError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| PlantVisionError::Config(format!("Invalid configuration value: {}", raw))),
        None => Ok(default),
    }
}
