// src/fetch.rs
//! Resilient fetcher: bounded retries with exponential backoff, `Retry-After` support
//! for 429, and uniform classification of upstream bodies.
//!
//! Retry policy per attempt:
//! - transport failure or 5xx: wait `backoff_base * 2^attempt`, retry
//! - 429: wait `Retry-After` seconds (capped) or the same backoff, retry
//! - any other non-success status: fail immediately
//!
//! No wait happens after the final attempt. Every request and every wait races a
//! [`CancelSignal`].

use std::time::Duration;

use metrics::counter;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::request::OutboundRequest;
use crate::sources::HttpMethod;

pub const NON_JSON_ERROR: &str = "non-JSON response";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub max_attempts: u32,
    /// Per-attempt timeout.
    pub timeout: Duration,
    pub backoff_base: Duration,
    pub max_retry_after: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_secs(1),
            max_retry_after: Duration::from_secs(60),
        }
    }
}

/// A successful fetch. `payload` is the parsed JSON body, the non-JSON envelope
/// `{"error": "non-JSON response", "content": ...}`, or `null` for an empty body.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub payload: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport { attempts: u32, message: String },
    #[error("upstream returned HTTP {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },
    #[error("upstream declared JSON but the body did not parse: {0}")]
    InvalidJson(String),
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("fetch cancelled")]
    Cancelled,
}

/* ----------------------------
Cancellation
---------------------------- */

/// Owner side of a cancellation pair. Dropping it without calling `cancel` never cancels.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observer side, passed into long-running work.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancelled; pends forever otherwise.
    pub async fn cancelled(&self) {
        if let Some(rx) = &self.rx {
            let mut rx = rx.clone();
            let fired = rx.wait_for(|c| *c).await.is_ok();
            if fired {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

/* ----------------------------
Fetcher
---------------------------- */

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("source-search/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub async fn fetch(&self, req: &OutboundRequest) -> Result<RawResponse, FetchError> {
        self.fetch_with_cancel(req, &CancelSignal::never()).await
    }

    pub async fn fetch_with_cancel(
        &self,
        req: &OutboundRequest,
        cancel: &CancelSignal,
    ) -> Result<RawResponse, FetchError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last: Option<FetchError> = None;

        for attempt in 0..attempts {
            let tried = attempt + 1;
            counter!("upstream_fetch_attempts_total").increment(1);

            let sent = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                r = self.send_once(req) => r,
            };

            let wait = match sent {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let content_type = resp
                            .headers()
                            .get(CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        match resp.text().await {
                            Ok(text) => {
                                return classify(status.as_u16(), content_type.as_deref(), text)
                            }
                            Err(e) => {
                                last = Some(FetchError::Transport {
                                    attempts: tried,
                                    message: e.to_string(),
                                });
                                self.backoff(attempt)
                            }
                        }
                    } else {
                        let code = status.as_u16();
                        let err = FetchError::Status {
                            status: code,
                            attempts: tried,
                        };
                        if code == 429 {
                            last = Some(err);
                            retry_after(resp.headers())
                                .map(|d| d.min(self.config.max_retry_after))
                                .unwrap_or_else(|| self.backoff(attempt))
                        } else if status.is_server_error() {
                            last = Some(err);
                            self.backoff(attempt)
                        } else {
                            warn!(url = %req.url, status = code, "upstream rejected request, not retrying");
                            counter!("upstream_fetch_failures_total").increment(1);
                            return Err(err);
                        }
                    }
                }
                Err(e) if e.is_builder() => {
                    counter!("upstream_fetch_failures_total").increment(1);
                    return Err(FetchError::InvalidRequest(e.to_string()));
                }
                Err(e) => {
                    last = Some(FetchError::Transport {
                        attempts: tried,
                        message: e.to_string(),
                    });
                    self.backoff(attempt)
                }
            };

            if tried >= attempts {
                break;
            }

            counter!("upstream_fetch_retries_total").increment(1);
            warn!(
                url = %req.url,
                attempt = tried,
                max_attempts = attempts,
                wait_ms = wait.as_millis() as u64,
                error = %last.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "upstream fetch failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }

        counter!("upstream_fetch_failures_total").increment(1);
        Err(last.unwrap_or(FetchError::Transport {
            attempts,
            message: "no attempt completed".to_string(),
        }))
    }

    async fn send_once(&self, req: &OutboundRequest) -> Result<reqwest::Response, reqwest::Error> {
        let method = match req.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
        };
        let mut rb = self
            .client
            .request(method, req.url.as_str())
            .timeout(self.config.timeout)
            .query(&req.query);
        for (name, value) in &req.headers {
            rb = rb.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &req.body {
            rb = rb.json(body);
        }
        debug!(method = req.method.as_str(), url = %req.url, "sending upstream request");
        rb.send().await
    }

    /// `backoff_base * 2^attempt`, attempt counted from 0.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Delta-seconds form only; HTTP-date values fall back to exponential backoff.
/// Values too large for a `Duration` saturate to `Duration::MAX` and are capped by the caller.
fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| !secs.is_nan() && *secs >= 0.0)?;
    Some(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
}

pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Turn a successful body into a [`RawResponse`].
pub(crate) fn classify(
    status: u16,
    content_type: Option<&str>,
    text: String,
) -> Result<RawResponse, FetchError> {
    let json_declared = content_type.map_or(true, is_json_content_type);
    if json_declared && text.trim().is_empty() {
        return Ok(RawResponse {
            status,
            payload: Value::Null,
        });
    }
    if content_type.is_some_and(is_json_content_type) {
        return serde_json::from_str(&text)
            .map(|payload| RawResponse { status, payload })
            .map_err(|e| FetchError::InvalidJson(e.to_string()));
    }
    warn!(status, content_type = content_type.unwrap_or(""), "upstream returned a non-JSON response");
    Ok(RawResponse {
        status,
        payload: json!({ "error": NON_JSON_ERROR, "content": text }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_content_types() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("Application/JSON; charset=utf-8"));
        assert!(is_json_content_type("application/vnd.api+json"));
        assert!(!is_json_content_type("text/html"));
        assert!(!is_json_content_type("text/plain; charset=utf-8"));
    }

    #[test]
    fn classify_json_non_json_and_empty() {
        let ok = classify(200, Some("application/json"), r#"{"data":[1]}"#.into()).unwrap();
        assert_eq!(ok.payload, json!({"data": [1]}));

        let html = classify(200, Some("text/html"), "<p>hi</p>".into()).unwrap();
        assert_eq!(
            html.payload,
            json!({"error": "non-JSON response", "content": "<p>hi</p>"})
        );

        let none = classify(200, None, "plain".into()).unwrap();
        assert_eq!(none.payload["error"], json!(NON_JSON_ERROR));

        let empty = classify(204, Some("application/json"), "  ".into()).unwrap();
        assert_eq!(empty.payload, Value::Null);
        let untyped_empty = classify(204, None, "".into()).unwrap();
        assert_eq!(untyped_empty.payload, Value::Null);

        let empty_html = classify(200, Some("text/html"), "".into()).unwrap();
        assert_eq!(
            empty_html.payload,
            json!({"error": "non-JSON response", "content": ""})
        );

        assert!(matches!(
            classify(200, Some("application/json"), "{oops".into()),
            Err(FetchError::InvalidJson(_))
        ));
    }

    #[test]
    fn backoff_doubles_from_base() {
        let f = Fetcher::new(FetchConfig {
            backoff_base: Duration::from_millis(100),
            ..FetchConfig::default()
        })
        .unwrap();
        assert_eq!(f.backoff(0), Duration::from_millis(100));
        assert_eq!(f.backoff(1), Duration::from_millis(200));
        assert_eq!(f.backoff(2), Duration::from_millis(400));
    }

    #[test]
    fn retry_after_parses_delta_seconds_only() {
        let mut h = reqwest::header::HeaderMap::new();
        h.insert(RETRY_AFTER, "2".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::from_secs(2)));
        h.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "-1".parse().unwrap());
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, "1e30".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::MAX));
        h.insert(RETRY_AFTER, "inf".parse().unwrap());
        assert_eq!(retry_after(&h), Some(Duration::MAX));
        h.insert(RETRY_AFTER, "NaN".parse().unwrap());
        assert_eq!(retry_after(&h), None);
    }

    #[tokio::test]
    async fn cancel_signal_fires_and_never_stays_pending() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("cancelled() should resolve after cancel()");

        let never = CancelSignal::never();
        assert!(tokio::time::timeout(Duration::from_millis(20), never.cancelled())
            .await
            .is_err());
    }
}
