use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::models::{Cart, Product, User};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("transport error calling the store API: {0}")]
    Transport(reqwest::Error),
    #[error("store API responded with status {0}")]
    Status(StatusCode),
    #[error("failed to decode store API response: {0}")]
    Decode(reqwest::Error),
}

/// The poller's view of the source system. `StoreApiClient` is the real
/// implementation; tests substitute fakes.
#[async_trait]
pub trait CartsSource: Send + Sync {
    async fn get_carts(&self) -> Result<Vec<Cart>, ApiError>;
}

/// Typed client for the FakeStore-style source API.
#[derive(Clone)]
pub struct StoreApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl StoreApiClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ApiError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, path))
            .send()
            .await
            .map_err(ApiError::Transport)?;

        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }

        response.json().await.map_err(ApiError::Decode)
    }

    pub async fn get_products(&self) -> Result<Vec<Product>, ApiError> {
        self.get_json("products").await
    }

    pub async fn get_users(&self) -> Result<Vec<User>, ApiError> {
        self.get_json("users").await
    }

    pub async fn get_carts(&self) -> Result<Vec<Cart>, ApiError> {
        self.get_json("carts").await
    }
}

#[async_trait]
impl CartsSource for StoreApiClient {
    async fn get_carts(&self) -> Result<Vec<Cart>, ApiError> {
        StoreApiClient::get_carts(self).await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;

    fn client(server: &MockServer) -> StoreApiClient {
        StoreApiClient::new(&server.base_url(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn fetches_and_decodes_carts() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/carts");
            then.status(200).json_body(serde_json::json!([
                {
                    "id": 1,
                    "userId": 2,
                    "date": "2020-03-02T00:00:00.000Z",
                    "products": [{"productId": 3, "quantity": 4}]
                }
            ]));
        });

        let carts = client(&server).get_carts().await.unwrap();
        mock.assert();
        assert_eq!(carts.len(), 1);
        assert_eq!(carts[0].id, 1);
        assert_eq!(carts[0].products[0].quantity, 4);
    }

    #[tokio::test]
    async fn surfaces_http_error_status() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/carts");
            then.status(503);
        });

        let err = client(&server).get_carts().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status(StatusCode::SERVICE_UNAVAILABLE)
        ));
    }

    #[tokio::test]
    async fn surfaces_decode_failure() {
        let server = MockServer::start();
        let _mock = server.mock(|when, then| {
            when.method(httpmock::Method::GET).path("/products");
            then.status(200).body("not json");
        });

        let err = client(&server).get_products().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
