use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use store_common::api::{ApiError, StoreApiClient};

use crate::store::{ObjectStore, ObjectStoreError};

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to fetch entities from the store API: {0}")]
    Api(#[from] ApiError),
    #[error("failed to encode snapshot rows: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to upload snapshot: {0}")]
    Store(#[from] ObjectStoreError),
}

/// The entity kinds the batch path snapshots. Each variant supplies its
/// fetch and its object naming rule; everything else is shared pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Products,
    Users,
}

impl SnapshotSource {
    pub fn all() -> [SnapshotSource; 2] {
        [SnapshotSource::Products, SnapshotSource::Users]
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            SnapshotSource::Products => "products",
            SnapshotSource::Users => "users",
        }
    }

    /// Output location for a run on `date`. Keyed by calendar date only, so
    /// every run on the same date writes the same object regardless of
    /// time-of-day.
    pub fn object_name(&self, date: NaiveDate) -> String {
        let prefix = self.prefix();
        format!("{}/{}_{}.jsonl", prefix, prefix, date.format("%Y%m%d"))
    }

    /// Fetch the current entity list as JSONL (one object per line, the
    /// shape warehouse load jobs expect).
    pub async fn fetch_jsonl(&self, client: &StoreApiClient) -> Result<String, SnapshotError> {
        match self {
            SnapshotSource::Products => jsonl(&client.get_products().await?),
            SnapshotSource::Users => jsonl(&client.get_users().await?),
        }
    }
}

fn jsonl<T: Serialize>(rows: &[T]) -> Result<String, SnapshotError> {
    let lines = rows
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Extract one source and upload it to its date-keyed location.
pub async fn run_snapshot(
    source: SnapshotSource,
    client: &StoreApiClient,
    store: &dyn ObjectStore,
    date: NaiveDate,
) -> Result<(), SnapshotError> {
    info!(source = source.prefix(), "starting snapshot");

    let rows = source.fetch_jsonl(client).await?;
    let object = source.object_name(date);
    store.put(&object, rows).await?;

    info!(source = source.prefix(), object, "snapshot complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use httpmock::MockServer;

    use super::*;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn put(&self, object: &str, body: String) -> Result<(), ObjectStoreError> {
            self.objects
                .lock()
                .unwrap()
                .insert(object.to_owned(), body);
            Ok(())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn object_name_depends_only_on_the_date() {
        let name = SnapshotSource::Products.object_name(date(2026, 8, 28));
        assert_eq!(name, "products/products_20260828.jsonl");

        // Two runs on the same date compute the same location
        assert_eq!(
            SnapshotSource::Users.object_name(date(2026, 8, 28)),
            SnapshotSource::Users.object_name(date(2026, 8, 28))
        );
        assert_ne!(
            SnapshotSource::Users.object_name(date(2026, 8, 28)),
            SnapshotSource::Users.object_name(date(2026, 8, 29))
        );
    }

    #[test]
    fn jsonl_is_one_object_per_line() {
        let rows = vec![
            serde_json::json!({"id": 1}),
            serde_json::json!({"id": 2}),
        ];
        assert_eq!(jsonl(&rows).unwrap(), "{\"id\":1}\n{\"id\":2}");
    }

    #[tokio::test]
    async fn same_day_rerun_overwrites_the_same_object() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/products");
            then.status(200).json_body(serde_json::json!([{
                "id": 1,
                "title": "a",
                "price": 1.5,
                "description": "d",
                "category": "c",
                "image": "i"
            }]));
        });

        let client = StoreApiClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let store = MemoryStore::default();
        let day = date(2026, 8, 28);

        run_snapshot(SnapshotSource::Products, &client, &store, day)
            .await
            .unwrap();
        run_snapshot(SnapshotSource::Products, &client, &store, day)
            .await
            .unwrap();

        let objects = store.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert!(objects.contains_key("products/products_20260828.jsonl"));
    }

    #[tokio::test]
    async fn fetch_failure_aborts_the_snapshot() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/users");
            then.status(500);
        });

        let client = StoreApiClient::new(&server.base_url(), Duration::from_secs(5)).unwrap();
        let store = MemoryStore::default();

        let result = run_snapshot(
            SnapshotSource::Users,
            &client,
            &store,
            date(2026, 8, 28),
        )
        .await;

        assert!(matches!(result, Err(SnapshotError::Api(_))));
        assert!(store.objects.lock().unwrap().is_empty());
    }
}
