use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use url::Url;

// =============================================================================
// Fetcher Contract
// =============================================================================

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Transport { url: Url, message: String },

    #[error("request to {url} returned status {status}")]
    Status { url: Url, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: Url,
        #[source]
        source: sonic_rs::Error,
    },
}

pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send + 'a>>;

/// Performs a single request for a resource and hands back the raw body.
///
/// Implementations do not retry and must release the underlying connection
/// on every path, including non-success statuses.
pub trait Fetcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn get<'a>(&'a self, url: &'a Url) -> FetchFuture<'a>;
}

/// A decoded response together with the time spent waiting on the network.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    pub elapsed: Duration,
}

/// Fetches `url` and decodes the body as `T`.
///
/// `elapsed` covers the request and the body transfer, never the decode.
pub async fn fetch<T: DeserializeOwned>(
    fetcher: &dyn Fetcher,
    url: &Url,
) -> Result<Fetched<T>, FetchError> {
    let start = Instant::now();
    let body = fetcher.get(url).await?;
    let elapsed = start.elapsed();

    let value = sonic_rs::from_slice(&body).map_err(|source| FetchError::Decode {
        url: url.clone(),
        source,
    })?;

    Ok(Fetched { value, elapsed })
}

// =============================================================================
// HTTP Fetcher
// =============================================================================

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

impl Fetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    fn get<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            let transport = |e: reqwest::Error| FetchError::Transport {
                url: url.clone(),
                message: e.to_string(),
            };

            let response = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(transport)?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.clone(),
                    status: status.as_u16(),
                });
            }

            let body = response.bytes().await.map_err(transport)?;
            Ok(body.to_vec())
        })
    }
}

// =============================================================================
// Fixture Fetcher
// =============================================================================

#[derive(Debug, Clone)]
pub enum Fixture {
    Json(String),
    Status(u16),
    Unreachable(String),
}

/// Serves canned responses keyed by URL. Unknown URLs answer 404.
pub struct FixtureFetcher {
    fixtures: HashMap<String, Fixture>,
    latency: Duration,
    requests: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self {
            fixtures: HashMap::new(),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_json(self, url: &str, body: impl Into<String>) -> Self {
        self.with_fixture(url, Fixture::Json(body.into()))
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_fixture(url, Fixture::Status(status))
    }

    pub fn with_unreachable(self, url: &str, message: impl Into<String>) -> Self {
        self.with_fixture(url, Fixture::Unreachable(message.into()))
    }

    fn with_fixture(mut self, url: &str, fixture: Fixture) -> Self {
        // Key by the normalized form so "https://host" matches "https://host/".
        let key = Url::parse(url)
            .map(String::from)
            .unwrap_or_else(|_| url.to_string());
        self.fixtures.insert(key, fixture);
        self
    }

    /// URLs requested so far, in order.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }
}

impl Default for FixtureFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher for FixtureFetcher {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn get<'a>(&'a self, url: &'a Url) -> FetchFuture<'a> {
        Box::pin(async move {
            self.requests.lock().await.push(url.to_string());

            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }

            match self.fixtures.get(url.as_str()) {
                Some(Fixture::Json(body)) => Ok(body.clone().into_bytes()),
                Some(Fixture::Status(status)) => Err(FetchError::Status {
                    url: url.clone(),
                    status: *status,
                }),
                Some(Fixture::Unreachable(message)) => Err(FetchError::Transport {
                    url: url.clone(),
                    message: message.clone(),
                }),
                None => Err(FetchError::Status {
                    url: url.clone(),
                    status: 404,
                }),
            }
        })
    }
}
