//! One-shot batch snapshot of products and users to object storage.
use std::time::Duration;

use chrono::Utc;
use envconfig::Envconfig;
use tracing_subscriber::EnvFilter;

use batch_snapshot::config::Config;
use batch_snapshot::snapshot::{run_snapshot, SnapshotSource};
use batch_snapshot::store::GcsStore;
use store_common::api::StoreApiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::init_from_env().expect("invalid configuration:");

    let client = StoreApiClient::new(
        &config.api_base_url,
        Duration::from_secs(config.api_request_timeout_secs),
    )?;
    let store = GcsStore::new(&config.raw_bucket).await?;

    let today = Utc::now().date_naive();
    for source in SnapshotSource::all() {
        run_snapshot(source, &client, &store, today).await?;
    }

    tracing::info!("batch snapshot completed");
    Ok(())
}
