use std::sync::Arc;

use async_trait::async_trait;
use gcp_auth::TokenProvider;
use thiserror::Error;
use tracing::info;

const GCS_SCOPES: &[&str] = &["https://www.googleapis.com/auth/devstorage.read_write"];

#[derive(Error, Debug)]
pub enum ObjectStoreError {
    #[error("failed to obtain a GCP access token: {0}")]
    Auth(#[from] gcp_auth::Error),
    #[error("transport error calling object storage: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("object storage responded with status {0}")]
    Status(reqwest::StatusCode),
}

/// Write target for snapshot files. Putting the same object name twice
/// overwrites, which is what makes same-day reruns idempotent.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, object: &str, body: String) -> Result<(), ObjectStoreError>;
}

/// GCS bucket writes over the JSON API media upload endpoint.
pub struct GcsStore {
    client: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
    upload_url: String,
}

impl GcsStore {
    pub async fn new(bucket: &str) -> Result<Self, ObjectStoreError> {
        let token_provider = gcp_auth::provider().await?;
        // Resolve a token now so missing credentials fail at startup
        token_provider.token(GCS_SCOPES).await?;

        Ok(Self {
            client: reqwest::Client::new(),
            token_provider,
            upload_url: format!(
                "https://storage.googleapis.com/upload/storage/v1/b/{}/o",
                bucket
            ),
        })
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, object: &str, body: String) -> Result<(), ObjectStoreError> {
        let token = self.token_provider.token(GCS_SCOPES).await?;

        let response = self
            .client
            .post(&self.upload_url)
            .query(&[("uploadType", "media"), ("name", object)])
            .bearer_auth(token.as_str())
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ObjectStoreError::Status(response.status()));
        }

        info!(object, "uploaded snapshot object");
        Ok(())
    }
}
