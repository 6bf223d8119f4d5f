//! Byte-transport seam (spec.md §4.1): the thing that actually talks to a
//! registry's CDN. Grounded on the teacher's `core/http.rs` shared-client
//! pattern (one pooled `reqwest::Client`, separate timeout for downloads),
//! generalised behind a trait so tests can inject a scripted transport
//! instead of touching the network.

use crate::config::LoaderConfig;
use crate::error::{LoaderError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::LazyLock;
use std::time::Duration;
use url::Url;

/// Raw outcome of one HTTP attempt. Non-2xx statuses are *not* mapped to
/// `Err` here — the retry loop in `Fetcher` needs to see the status code
/// to decide whether it's retryable (429/5xx) or terminal (404).
pub struct TransportResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<TransportResponse>;
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

static DOWNLOAD_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_max_idle_per_host(32)
        .tcp_nodelay(true)
        .build()
        .expect("failed to build the shared download HTTP client")
});

pub struct HttpTransport {
    client: Client,
    per_request_timeout: Duration,
}

impl HttpTransport {
    #[must_use]
    pub fn new(per_request_timeout: Duration) -> Self {
        Self {
            client: DOWNLOAD_CLIENT.clone(),
            per_request_timeout,
        }
    }

    /// Builds the download transport from the loader's own config (spec.md
    /// §4.1/§5: per-request fetch timeout), rather than leaving
    /// `LoaderConfig::fetch_timeout_secs` unread.
    #[must_use]
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.fetch_timeout())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, url: &Url) -> Result<TransportResponse> {
        let response = self
            .client
            .get(url.as_str())
            .timeout(self.per_request_timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(TransportResponse { status, body })
    }
}

/// A scripted response, used by tests and by `ScriptedTransport`.
pub enum Scripted {
    Ok(Vec<u8>),
    Status(u16),
    Err(LoaderError),
}

/// Deterministic test double: replays a fixed sequence of responses per
/// URL, one per call, so retry-loop tests don't need a real server.
/// Grounded on the teacher's daemon-protocol mock pattern (`core/client.rs`
/// tests), generalised from a request/response protocol mock to a byte
/// transport mock.
pub struct ScriptedTransport {
    scripts: parking_lot::Mutex<std::collections::HashMap<String, std::collections::VecDeque<Scripted>>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: parking_lot::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn push(&self, url: &str, response: Scripted) {
        self.scripts
            .lock()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &Url) -> Result<TransportResponse> {
        let mut scripts = self.scripts.lock();
        let queue = scripts
            .get_mut(url.as_str())
            .ok_or_else(|| LoaderError::AdapterError(format!("no script for {url}")))?;
        match queue
            .pop_front()
            .ok_or_else(|| LoaderError::AdapterError(format!("script exhausted for {url}")))?
        {
            Scripted::Ok(body) => Ok(TransportResponse { status: 200, body }),
            Scripted::Status(status) => Ok(TransportResponse {
                status,
                body: Vec::new(),
            }),
            Scripted::Err(e) => Err(e),
        }
    }
}
