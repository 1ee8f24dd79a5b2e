use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client};
use crate::config::StorageConfig;
use crate::errors::{AppError, AppResult};

/// Object read back from storage. `status` is the upstream HTTP status.
#[derive(Debug, Clone)]
pub struct FetchedObject {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchedObject {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Bucket of publicly readable images. Keys are bucket-relative,
/// e.g. `storage/{owner}/generated_images/{id}.jpeg`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn public_url(&self, key: &str) -> String;
    /// Stores `body` under `key` and returns its public URL.
    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> AppResult<String>;
    async fn delete(&self, key: &str) -> bool;
    /// Writes an empty `{key}/.placeholder` object so the folder shows up in listings.
    async fn create_folder(&self, key: &str) -> bool;
    async fn fetch(&self, key: &str) -> AppResult<FetchedObject>;
}

/// Google Cloud Storage through the XML API, authorised with a bearer token.
#[derive(Clone)]
pub struct GcsStorage {
    client: Client,
    config: StorageConfig,
}

impl GcsStorage {
    pub fn new(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bucket,
            key.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    fn public_url(&self, key: &str) -> String {
        self.object_url(key)
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> AppResult<String> {
        let url = self.object_url(key);
        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.config.access_token)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-goog-acl", "public-read")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            tracing::error!("Failed to upload {} to storage: {} {}", key, status, text);
            return Err(AppError::Upstream(format!("upload failed ({}): {}", status, text)));
        }

        tracing::info!("Uploaded {} to {}", key, url);
        Ok(url)
    }

    async fn delete(&self, key: &str) -> bool {
        let result = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.config.access_token)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!("Deleted {} from storage", key);
                true
            }
            Ok(response) => {
                tracing::error!("Failed to delete {} from storage: {}", key, response.status());
                false
            }
            Err(e) => {
                tracing::error!("Failed to delete {} from storage: {}", key, e);
                false
            }
        }
    }

    async fn create_folder(&self, key: &str) -> bool {
        let placeholder = format!("{}/.placeholder", key.trim_matches('/'));
        match self.upload(&placeholder, Bytes::new(), "application/octet-stream").await {
            Ok(_) => {
                tracing::info!("Created folder placeholder at {}", key);
                true
            }
            Err(e) => {
                tracing::error!("Failed to create folder {}: {}", key, e);
                false
            }
        }
    }

    async fn fetch(&self, key: &str) -> AppResult<FetchedObject> {
        let response = self.client.get(self.object_url(key)).send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(FetchedObject {
            status,
            content_type,
            body,
        })
    }
}
