//! # Kudo SDK
//!
//! Rust client library for the Kudo engagement service.
//!
//! Provides async and sync APIs for toggling likes, reading status, and
//! querying counts, plus the [`Reconciler`] optimistic state machine that
//! keeps a UI consistent with an asynchronous, possibly out-of-order server.
//!
//! ## Quick Start (Async)
//!
//! ```rust,ignore
//! use kudo_sdk::KudoClient;
//!
//! let client = KudoClient::with_token("http://localhost:8620", "tok-alice");
//! let result = client.toggle("goal-42").await?;
//! println!("liked={} count={}", result.liked, result.count);
//! ```
//!
//! ## Optimistic UI
//!
//! ```rust,ignore
//! use kudo_sdk::{KudoClient, Reconciler};
//!
//! let client = KudoClient::with_token("http://localhost:8620", "tok-alice");
//! let status = client.status("goal-42").await?;
//! let mut button = Reconciler::from_status(status.liked, status.count);
//!
//! // Render button.liked() / button.count() immediately on every press;
//! // the client coalesces rapid presses into at most one in-flight request.
//! client.toggle_reconciled(&mut button, "goal-42").await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub mod reconciler;

pub use reconciler::{Action, Followup, Reconciler};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when using the Kudo SDK.
#[derive(Debug, thiserror::Error)]
pub enum KudoError {
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned a non-success status code.
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// All retry attempts exhausted.
    #[error("All {attempts} retry attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

pub type Result<T> = std::result::Result<T, KudoError>;

// ---------------------------------------------------------------------------
// API types (mirror server response types)
// ---------------------------------------------------------------------------

/// Result of a toggle: the pair's new state plus a fresh count.
#[derive(Debug, Clone, Deserialize)]
pub struct ToggleResult {
    pub subject_id: String,
    pub liked: bool,
    pub count: u64,
}

/// Combined per-actor status and total count.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResult {
    pub subject_id: String,
    /// Always `false` when the client carries no actor token.
    pub liked: bool,
    pub count: u64,
}

/// Count of a single subject.
#[derive(Debug, Clone, Deserialize)]
pub struct CountResult {
    pub subject_id: String,
    pub count: u64,
}

/// Counts for a batch of subjects. Every requested id is present as a key.
#[derive(Debug, Clone, Deserialize)]
pub struct CountsResult {
    pub counts: HashMap<String, u64>,
}

/// Server health status.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub version: String,
    pub storage_backend: String,
    pub auth_enabled: bool,
}

/// API error response from the server.
#[derive(Debug, Clone, Deserialize)]
struct ApiErrorResponse {
    #[allow(dead_code)]
    code: String,
    message: String,
}

#[derive(Serialize)]
struct CountsBody<'a> {
    subject_ids: &'a [String],
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// Configuration for retry behavior.
///
/// Retries apply only to the idempotent reads (status, counts, health). A
/// toggle is never replayed by the SDK: the flip is not idempotent, so a
/// blind retry after a timeout could double-flip. Use
/// [`Reconciler::on_timeout`] plus a fresh status read instead.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Configuration for the Kudo client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Retry configuration for idempotent reads.
    pub retry: RetryConfig,
    /// Bearer token presented on every request. Actor tokens enable toggle
    /// and personal status; without a token only the public reads work.
    pub token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// KudoClient
// ---------------------------------------------------------------------------

/// Client for connecting to a Kudo server.
///
/// Uses reqwest with connection pooling internally. Supports both async and
/// sync APIs, with exponential-backoff retries for read operations.
pub struct KudoClient {
    base_url: String,
    http: reqwest::Client,
    config: ClientConfig,
}

impl KudoClient {
    /// Create a new anonymous client with default configuration.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self::with_config(server_url, ClientConfig::default())
    }

    /// Create a client presenting the given bearer token.
    pub fn with_token(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_config(
            server_url,
            ClientConfig {
                token: Some(token.into()),
                ..Default::default()
            },
        )
    }

    /// Create a new client with custom configuration.
    pub fn with_config(server_url: impl Into<String>, config: ClientConfig) -> Self {
        let url = server_url.into();
        let base_url = url.trim_end_matches('/').to_string();

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            base_url,
            http,
            config,
        }
    }

    /// Get the base URL of the server.
    pub fn server_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Async API
    // -----------------------------------------------------------------------

    /// Toggle the like on a subject. Requires an actor token.
    ///
    /// Issued exactly once — see [`RetryConfig`] for why toggles are never
    /// replayed by the SDK.
    pub async fn toggle(&self, subject_id: &str) -> Result<ToggleResult> {
        let url = format!("{}/api/v1/likes/{}", self.base_url, subject_id);
        self.request_json::<(), ToggleResult>(reqwest::Method::POST, &url, None, false)
            .await
    }

    /// Combined liked-status and count for one subject.
    pub async fn status(&self, subject_id: &str) -> Result<StatusResult> {
        let url = format!("{}/api/v1/likes/{}", self.base_url, subject_id);
        self.request_json::<(), StatusResult>(reqwest::Method::GET, &url, None, true)
            .await
    }

    /// Like count for one subject. Public.
    pub async fn count(&self, subject_id: &str) -> Result<CountResult> {
        let url = format!("{}/api/v1/likes/count/{}", self.base_url, subject_id);
        self.request_json::<(), CountResult>(reqwest::Method::GET, &url, None, true)
            .await
    }

    /// Like counts for a batch of subjects. Public.
    ///
    /// The server answers every requested id (0 when unliked) or rejects the
    /// whole batch if it is empty, oversized, or contains a malformed id.
    pub async fn counts(&self, subject_ids: &[String]) -> Result<CountsResult> {
        let url = format!("{}/api/v1/likes/counts", self.base_url);
        let body = CountsBody { subject_ids };
        self.request_json(reqwest::Method::POST, &url, Some(&body), true)
            .await
    }

    /// Check server health.
    pub async fn health(&self) -> Result<HealthInfo> {
        let url = format!("{}/api/v1/health", self.base_url);
        self.request_json::<(), HealthInfo>(reqwest::Method::GET, &url, None, true)
            .await
    }

    /// Drive a [`Reconciler`] through one user press.
    ///
    /// Flips the machine optimistically, then issues the toggle plus any
    /// coalesced follow-up, feeding authoritative responses back in. Returns
    /// immediately when the press was coalesced onto an in-flight request
    /// driven by an earlier call. On error the machine is already reverted;
    /// on a transport timeout it is marked inconclusive for a later
    /// [`refresh_status`](Self::refresh_status).
    pub async fn toggle_reconciled(
        &self,
        rec: &mut Reconciler,
        subject_id: &str,
    ) -> Result<()> {
        if rec.press() == Action::Coalesced {
            return Ok(());
        }
        loop {
            match self.toggle(subject_id).await {
                Ok(result) => match rec.on_response(result.liked, result.count) {
                    Followup::Settled => return Ok(()),
                    Followup::Send => continue,
                },
                Err(err) => {
                    if matches!(&err, KudoError::Http(e) if e.is_timeout()) {
                        rec.on_timeout();
                    } else {
                        rec.on_failure();
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Reconcile a [`Reconciler`] with a fresh status read.
    pub async fn refresh_status(&self, rec: &mut Reconciler, subject_id: &str) -> Result<()> {
        let status = self.status(subject_id).await?;
        rec.on_status(status.liked, status.count);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sync API wrappers
    // -----------------------------------------------------------------------

    /// Synchronous version of [`toggle`](Self::toggle).
    pub fn toggle_sync(&self, subject_id: &str) -> Result<ToggleResult> {
        block_on(self.toggle(subject_id))
    }

    /// Synchronous version of [`status`](Self::status).
    pub fn status_sync(&self, subject_id: &str) -> Result<StatusResult> {
        block_on(self.status(subject_id))
    }

    /// Synchronous version of [`count`](Self::count).
    pub fn count_sync(&self, subject_id: &str) -> Result<CountResult> {
        block_on(self.count(subject_id))
    }

    /// Synchronous version of [`counts`](Self::counts).
    pub fn counts_sync(&self, subject_ids: &[String]) -> Result<CountsResult> {
        block_on(self.counts(subject_ids))
    }

    /// Synchronous version of [`health`](Self::health).
    pub fn health_sync(&self) -> Result<HealthInfo> {
        block_on(self.health())
    }

    // -----------------------------------------------------------------------
    // Internal HTTP helpers
    // -----------------------------------------------------------------------

    /// Core request method. `retryable` enables the exponential-backoff loop
    /// for idempotent reads; mutations run exactly one attempt.
    async fn request_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&B>,
        retryable: bool,
    ) -> Result<R> {
        let max_attempts = if retryable {
            self.config.retry.max_retries + 1
        } else {
            1
        };
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delay(attempt)).await;
            }

            let mut req = self.http.request(method.clone(), url);
            if let Some(token) = &self.config.token {
                req = req.bearer_auth(token);
            }
            if let Some(b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let text = resp.text().await?;
                        let parsed: R = serde_json::from_str(&text)?;
                        return Ok(parsed);
                    }

                    // Client errors (4xx) are not retryable.
                    if status.is_client_error() {
                        let msg = match resp.json::<ApiErrorResponse>().await {
                            Ok(e) => e.message,
                            Err(_) => format!("HTTP {}", status.as_u16()),
                        };
                        return Err(KudoError::Server {
                            status: status.as_u16(),
                            message: msg,
                        });
                    }

                    // Server errors (5xx) — retryable.
                    last_error = format!("HTTP {}", status.as_u16());
                    if !retryable {
                        return Err(KudoError::Server {
                            status: status.as_u16(),
                            message: last_error,
                        });
                    }
                }
                Err(e) => {
                    if !retryable {
                        return Err(KudoError::Http(e));
                    }
                    last_error = e.to_string();
                }
            }
        }

        Err(KudoError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Exponential backoff delay for the given attempt, capped at `max_delay`.
    fn retry_delay(&self, attempt: u32) -> Duration {
        let exp = self.config.retry.base_delay.as_millis() as u64
            * 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(exp).min(self.config.retry.max_delay)
    }
}

/// Run an async future to completion from sync code.
fn block_on<F: std::future::Future<Output = Result<T>>, T>(future: F) -> Result<T> {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            // Already inside a tokio runtime — use block_in_place to avoid nesting
            tokio::task::block_in_place(|| handle.block_on(future))
        }
        Err(_) => {
            // No runtime — create a new one
            let rt = tokio::runtime::Runtime::new().map_err(|e| KudoError::Server {
                status: 0,
                message: format!("Failed to create tokio runtime: {}", e),
            })?;
            rt.block_on(future)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = KudoClient::new("http://localhost:8620");
        assert_eq!(client.server_url(), "http://localhost:8620");
        assert!(client.config.token.is_none());
    }

    #[test]
    fn test_client_creation_trailing_slash() {
        let client = KudoClient::new("http://localhost:8620/");
        assert_eq!(client.server_url(), "http://localhost:8620");
    }

    #[test]
    fn test_client_with_token() {
        let client = KudoClient::with_token("http://localhost:8620", "tok-alice");
        assert_eq!(client.config.token.as_deref(), Some("tok-alice"));
    }

    #[test]
    fn test_client_with_config() {
        let config = ClientConfig {
            timeout: Duration::from_secs(60),
            retry: RetryConfig {
                max_retries: 5,
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(10),
            },
            token: None,
        };
        let client = KudoClient::with_config("http://localhost:8620", config);
        assert_eq!(client.config.retry.max_retries, 5);
    }

    #[test]
    fn test_retry_delay_exponential_backoff() {
        let client = KudoClient::new("http://localhost:8620");
        // base = 100ms
        assert_eq!(client.retry_delay(1), Duration::from_millis(100));
        assert_eq!(client.retry_delay(2), Duration::from_millis(200));
        assert_eq!(client.retry_delay(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_delay_capped_at_max() {
        let config = ClientConfig {
            retry: RetryConfig {
                max_retries: 10,
                base_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(1),
            },
            ..Default::default()
        };
        let client = KudoClient::with_config("http://localhost:8620", config);
        assert_eq!(client.retry_delay(10), Duration::from_secs(1));
    }
}
