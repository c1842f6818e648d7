use std::sync::Arc;

use async_trait::async_trait;
use envconfig::Envconfig;
use gcp_auth::TokenProvider;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::event::CartEvent;

const BIGQUERY_SCOPES: &[&str] = &["https://www.googleapis.com/auth/bigquery.insertdata"];

#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("failed to obtain a GCP access token: {0}")]
    Auth(#[from] gcp_auth::Error),
    #[error("transport error calling the warehouse: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("warehouse responded with status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Envconfig, Clone)]
pub struct WarehouseConfig {
    #[envconfig(from = "GCP_PROJECT_ID")]
    pub project_id: String,
    #[envconfig(from = "BQ_RAW_DATASET")]
    pub dataset: String,
    #[envconfig(from = "BQ_CARTS_TABLE", default = "carts_events")]
    pub table: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RowErrorDetail {
    pub reason: Option<String>,
    pub message: Option<String>,
}

/// One rejected row from a streaming insert. An empty error list on the
/// response means the whole insert was accepted.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RowError {
    pub index: u32,
    pub errors: Vec<RowErrorDetail>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<RowError>,
}

#[derive(Serialize)]
struct InsertAllRequest {
    rows: Vec<InsertRow>,
}

#[derive(Serialize)]
struct InsertRow {
    #[serde(rename = "insertId")]
    insert_id: String,
    json: CartEvent,
}

/// The consumer's view of the warehouse table. A returned empty error list
/// is the only outcome that counts as a successful write.
#[async_trait]
pub trait WarehouseSink: Send + Sync {
    async fn insert_row(&self, row: &CartEvent) -> Result<Vec<RowError>, WarehouseError>;
}

/// Logs rows instead of inserting them, for local runs.
pub struct PrintSink;

#[async_trait]
impl WarehouseSink for PrintSink {
    async fn insert_row(&self, row: &CartEvent) -> Result<Vec<RowError>, WarehouseError> {
        info!(cart_id = row.cart_id, "warehouse row: {:?}", row);
        Ok(vec![])
    }
}

/// Streaming inserts into a BigQuery table over the tabledata.insertAll
/// REST endpoint.
pub struct BigQuerySink {
    client: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
    insert_url: String,
}

impl BigQuerySink {
    pub async fn new(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let token_provider = gcp_auth::provider().await?;
        // Resolve a token now so missing credentials fail at startup
        token_provider.token(BIGQUERY_SCOPES).await?;

        let insert_url = format!(
            "https://bigquery.googleapis.com/bigquery/v2/projects/{}/datasets/{}/tables/{}/insertAll",
            config.project_id, config.dataset, config.table
        );
        info!("warehouse table: {}.{}.{}", config.project_id, config.dataset, config.table);

        Ok(Self {
            client: reqwest::Client::new(),
            token_provider,
            insert_url,
        })
    }
}

#[async_trait]
impl WarehouseSink for BigQuerySink {
    async fn insert_row(&self, row: &CartEvent) -> Result<Vec<RowError>, WarehouseError> {
        let token = self.token_provider.token(BIGQUERY_SCOPES).await?;

        let body = InsertAllRequest {
            rows: vec![InsertRow {
                // The event id doubles as the best-effort dedup key
                insert_id: row.event_id.to_string(),
                json: row.clone(),
            }],
        };

        let response = self
            .client
            .post(&self.insert_url)
            .bearer_auth(token.as_str())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(WarehouseError::Status(response.status()));
        }

        let decoded: InsertAllResponse = response.json().await?;
        Ok(decoded.insert_errors)
    }
}
