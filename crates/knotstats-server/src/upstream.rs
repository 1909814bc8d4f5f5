//! Client for the resolver's statistics endpoint.

use bytes::Bytes;
use knotstats_common::StatsSnapshot;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::errors::RelayError;

/// One upstream response that decoded to a JSON object.
///
/// `body` holds the bytes exactly as the resolver sent them; the relay forwards
/// those rather than re-serializing `snapshot`.
#[derive(Debug, Clone)]
pub struct FetchedStats {
    pub body: Bytes,
    pub snapshot: StatsSnapshot,
}

/// Fetches statistics from a fixed URL with a fixed timeout.
///
/// Cloning is cheap and clones share one connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    url: Url,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        // Resolvers live on the local network; never route them through HTTP_PROXY.
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout(timeout))
            .no_proxy()
            .user_agent(concat!("knotstats/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, url, timeout })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Perform exactly one GET against the upstream. No retries.
    pub async fn fetch(&self) -> Result<FetchedStats, RelayError> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::UpstreamStatus {
                url: self.url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        let value: Value = serde_json::from_slice(&body).map_err(RelayError::MalformedBody)?;
        let snapshot = StatsSnapshot::from_value(value)?;

        debug!(
            url = %self.url,
            shape = ?snapshot.shape(),
            entries = snapshot.len(),
            bytes = body.len(),
            "Fetched upstream stats"
        );
        Ok(FetchedStats { body, snapshot })
    }

    /// Connect-phase failures, stalled handshakes included, mean the resolver
    /// is unreachable. Timeouts after the connection is up are timeouts.
    fn classify(&self, err: reqwest::Error) -> RelayError {
        if err.is_connect() {
            RelayError::Unreachable {
                url: self.url.to_string(),
                source: err,
            }
        } else if err.is_timeout() {
            RelayError::Timeout {
                url: self.url.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            RelayError::Internal(format!("request to {} failed: {:?}", self.url, err))
        }
    }
}

/// Handshake budget. It must expire before the total request timeout, or a
/// stalled connect is reported as a plain timeout instead of a connect error.
fn connect_timeout(total: Duration) -> Duration {
    total * 4 / 5
}
