// src/checker/http.rs
// =============================================================================
// This module checks whether a single URL is reachable.
//
// Key functionality:
// - Makes an HTTP HEAD request (lightweight, no body download)
// - Follows redirects itself so every Location header can be recorded
// - Sends a real browser User-Agent (some sites block obvious bots)
// - Bounds the whole probe, redirects included, by one timeout
// - Never returns an error: failures end up inside ProbeResult
//
// Each probe builds its own reqwest Client. Nothing is pooled or shared
// between probes, so one misbehaving host cannot poison another's
// connections.
//
// Rust concepts:
// - Traits: Prober is the seam the scheduler talks to
// - async-trait: async methods on a trait object (Arc<dyn Prober>)
// - Enums: ProbeError is the tagged outcome
// =============================================================================

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::{redirect, Client, StatusCode};
use serde::{Serialize, Serializer};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};
use url::Url;

use super::classify::{classify, Failure, ProbeError};

/// Chrome 58 on Windows 10.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/58.0.3029.110 Safari/537.36";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// Settings for every probe.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Deadline for the whole probe, every redirect hop included
    pub timeout: Duration,
    /// Redirect hops followed before giving up with RESPONSE_ERROR
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

// The outcome of probing one URL
//
// Serializes to the shape API clients see:
//   {"timestamp": 1700000000, "history": ["/moved"], "errors": {"http": "404"}}
//
// The url itself is not serialized; it is the key of the results map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    #[serde(skip)]
    pub url: String,
    /// Seconds since the Unix epoch when the probe started
    pub timestamp: u64,
    /// Raw Location header values, in the order the redirects were followed
    #[serde(rename = "history")]
    pub redirect_chain: Vec<String>,
    #[serde(rename = "errors", serialize_with = "serialize_errors")]
    pub error: Option<ProbeError>,
}

impl ProbeResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

// {"http": "..."} when there is an error, {} otherwise
fn serialize_errors<S: Serializer>(
    error: &Option<ProbeError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    use serde::ser::SerializeMap;

    let mut map = serializer.serialize_map(Some(usize::from(error.is_some())))?;
    if let Some(error) = error {
        map.serialize_entry("http", error)?;
    }
    map.end()
}

/// Something that can check one URL.
///
/// Implementations must not fail: every problem is reported through
/// `ProbeResult::error`.
#[async_trait]
pub trait Prober: Send + Sync + 'static {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// The real prober: HEAD over reqwest, one client per probe.
#[derive(Debug, Clone, Default)]
pub struct HttpProber {
    config: ProbeConfig,
}

impl HttpProber {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    // A fresh client for one probe
    //
    // Automatic redirects are off: follow() walks them by hand so it can see
    // each raw Location header.
    fn build_client(&self) -> Result<Client, Failure> {
        let client = Client::builder()
            .user_agent(self.config.user_agent.as_str())
            .redirect(redirect::Policy::none())
            .timeout(self.config.timeout)
            .build()?;
        Ok(client)
    }

    // Sends HEAD requests until a non-redirect response comes back
    //
    // Every Location value that gets followed is pushed into `chain`, so the
    // caller still has the partial chain if the deadline cuts us off.
    async fn follow(&self, url: &str, chain: &mut Vec<String>) -> Result<StatusCode, Failure> {
        let client = self.build_client()?;
        let mut current = Url::parse(url).map_err(|e| Failure::InvalidUrl(e.to_string()))?;

        loop {
            let response = client.head(current.clone()).send().await?;
            let status = response.status();

            if !status.is_redirection() {
                return Ok(status);
            }

            // A 3xx without a usable Location cannot be followed; it is the
            // final response and leaves no entry in the chain.
            let location = match response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
            {
                Some(location) => location.to_string(),
                None => return Ok(status),
            };

            if chain.len() >= self.config.max_redirects {
                return Err(Failure::TooManyRedirects(self.config.max_redirects));
            }

            let next = current
                .join(&location)
                .map_err(|_| Failure::BadLocation(location.clone()))?;

            chain.push(location);
            current = next;
        }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeResult {
        let timestamp = unix_now();
        let mut redirect_chain = Vec::new();

        let outcome =
            match tokio::time::timeout(self.config.timeout, self.follow(url, &mut redirect_chain))
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(Failure::TimedOut),
            };

        let error = match outcome {
            Ok(status) if status == StatusCode::NOT_FOUND => Some(ProbeError::NotFound),
            Ok(_) => None,
            Err(failure) => {
                let class = classify(&failure);
                if class == ProbeError::Timeout {
                    debug!(url = %url, "timeout");
                } else {
                    error!(url = %url, class = %class, cause = %failure, "probe failed");
                }
                Some(class)
            }
        };

        ProbeResult {
            url: url.to_string(),
            timestamp,
            redirect_chain,
            error,
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
