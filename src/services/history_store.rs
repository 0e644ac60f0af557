// src/services/history_store.rs
use crate::config::StoreConfig;
use crate::errors::PlantVisionError;
use crate::models::*;
use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::{Client, RequestBuilder};
use uuid::Uuid;

/// Durable history of past detections and their images.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Stores the image under `path` and returns its public URL.
    async fn upload_image(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, PlantVisionError>;

    async fn insert(&self, record: &NewHistoryRecord) -> Result<HistoryRecord, PlantVisionError>;

    /// Newest first.
    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, PlantVisionError>;

    async fn delete(&self, id: &Uuid) -> Result<(), PlantVisionError>;
}

/// Object path for a newly uploaded detection image.
pub fn image_path(extension: &str) -> String {
    format!(
        "detections/{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        Uuid::new_v4().simple(),
        extension
    )
}

/// Hosted Postgres table plus object bucket, reached over their REST surface.
pub struct SupabaseStore {
    config: StoreConfig,
    client: Client,
}

impl SupabaseStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("apikey", &self.config.api_key)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.url, self.config.table)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.config.url, self.config.bucket, path
        )
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response, PlantVisionError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PlantVisionError::Storage(format!(
            "{} failed with {}: {}",
            action, status, body
        )))
    }
}

#[async_trait]
impl HistoryStore for SupabaseStore {
    async fn upload_image(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, PlantVisionError> {
        let url = format!(
            "{}/storage/v1/object/{}/{}",
            self.config.url, self.config.bucket, path
        );
        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", content_type)
            .body(data)
            .send()
            .await
            .map_err(|e| PlantVisionError::Storage(format!("Image upload request failed: {}", e)))?;
        Self::check(response, "Image upload").await?;

        debug!("Uploaded image to {}", path);
        Ok(self.public_url(path))
    }

    async fn insert(&self, record: &NewHistoryRecord) -> Result<HistoryRecord, PlantVisionError> {
        let response = self
            .authorized(self.client.post(self.table_url()))
            .header("Prefer", "return=representation")
            .json(&[record])
            .send()
            .await
            .map_err(|e| PlantVisionError::Storage(format!("Insert request failed: {}", e)))?;
        let response = Self::check(response, "Insert").await?;

        let mut rows: Vec<HistoryRecord> = response
            .json()
            .await
            .map_err(|e| PlantVisionError::Serialization(e.to_string()))?;
        rows.pop()
            .ok_or_else(|| PlantVisionError::Storage("Insert returned no rows".to_string()))
    }

    async fn list(&self, limit: usize) -> Result<Vec<HistoryRecord>, PlantVisionError> {
        let limit = limit.to_string();
        let response = self
            .authorized(self.client.get(self.table_url()))
            .query(&[
                ("select", "*"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PlantVisionError::Storage(format!("History request failed: {}", e)))?;
        let response = Self::check(response, "History fetch").await?;

        response
            .json()
            .await
            .map_err(|e| PlantVisionError::Serialization(e.to_string()))
    }

    async fn delete(&self, id: &Uuid) -> Result<(), PlantVisionError> {
        let filter = format!("eq.{}", id);
        let response = self
            .authorized(self.client.delete(self.table_url()))
            .query(&[("id", filter.as_str())])
            .send()
            .await
            .map_err(|e| PlantVisionError::Storage(format!("Delete request failed: {}", e)))?;
        Self::check(response, "Delete").await?;
        Ok(())
    }
}
