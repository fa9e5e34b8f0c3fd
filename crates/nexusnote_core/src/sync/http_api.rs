//! HTTP client for the remote snapshot API.

use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};

use super::BoxFuture;
use super::snapshot_sync::{SnapshotApi, SnapshotDto};
use crate::config::SnapshotApiConfig;
use crate::error::{NexusError, Result};

#[derive(Serialize)]
struct PushRequest<'a> {
    snapshots: &'a [SnapshotDto],
}

#[derive(Deserialize)]
struct LatestTimestampResponse {
    timestamp: Option<i64>,
}

/// [`SnapshotApi`] over HTTP.
///
/// # Example
///
/// ```ignore
/// use nexusnote_core::config::SnapshotApiConfig;
/// use nexusnote_core::sync::HttpSnapshotApi;
///
/// let api = HttpSnapshotApi::new(SnapshotApiConfig::new("https://api.nexusnote.app"))?;
/// let latest = api.latest_timestamp("note-1").await?;
/// ```
pub struct HttpSnapshotApi {
    base_url: String,
    client: Client,
}

impl HttpSnapshotApi {
    /// Build a client with bearer auth and the configured timeout.
    pub fn new(config: SnapshotApiConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = &config.auth_token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| NexusError::Network(format!("Invalid auth token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/snapshots/{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(NexusError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

impl SnapshotApi for HttpSnapshotApi {
    fn push_snapshots(&self, snapshots: Vec<SnapshotDto>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let body = PushRequest {
                snapshots: &snapshots,
            };
            let response = self.client.post(self.url("sync")).json(&body).send().await?;
            Self::check(response).await?;
            Ok(())
        })
    }

    fn fetch_snapshots<'a>(
        &'a self,
        document_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<SnapshotDto>>> {
        Box::pin(async move {
            let url = self.url(&urlencoding::encode(document_id));
            let response = self.client.get(url).send().await?;
            let snapshots = Self::check(response).await?.json().await?;
            Ok(snapshots)
        })
    }

    fn latest_timestamp<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<Option<i64>>> {
        Box::pin(async move {
            let url = self.url(&format!(
                "{}/latest-timestamp",
                urlencoding::encode(document_id)
            ));
            let response = self.client.get(url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let body: LatestTimestampResponse = Self::check(response).await?.json().await?;
            Ok(body.timestamp)
        })
    }

    fn delete_snapshot<'a>(&'a self, snapshot_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = self.url(&urlencoding::encode(snapshot_id));
            let response = self.client.delete(url).send().await?;
            if response.status() == StatusCode::NOT_FOUND {
                log::debug!("Snapshot {} was already gone on the server", snapshot_id);
                return Ok(());
            }
            Self::check(response).await?;
            Ok(())
        })
    }
}

impl std::fmt::Debug for HttpSnapshotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSnapshotApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}
