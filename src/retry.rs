//! Bounded exponential-backoff retry wrapper around a single HTTP round-trip.
//!
//! Retries transient failures only: HTTP 429/5xx, network errors, and a
//! provider-specific "rate limit" payload carried in an otherwise-200
//! response body. Everything else is handed back to the caller unchanged for
//! it to classify.

use rand::Rng;
use reqwest::{header::HeaderMap, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables for [`with_retry`]. Defaults: 6 attempts, 800ms base delay,
/// 8s ceiling.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts (not additional retries).
    pub retries: u32,
    /// Base delay for exponential backoff, before jitter.
    pub base_delay: Duration,
    /// Ceiling every computed delay is clamped to.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 6,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(8000),
        }
    }
}

/// A buffered HTTP response: status, headers, and the full body read eagerly
/// so the retry loop can inspect a 200 body for a disguised rate-limit
/// payload without consuming what the caller ultimately receives.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The full response body, decoded as UTF-8 (explorer and market-data
    /// APIs in scope always return JSON text).
    pub body: String,
}

impl HttpResponse {
    /// `true` if the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Parse the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON.
    pub fn json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// A provider-specific rate-limit payload carried in an HTTP 200 body:
/// `status != "1"` AND `message == "NOTOK"` AND `result` contains
/// "max calls per sec" (case-insensitive).
fn is_rate_limited_payload(body: &serde_json::Value) -> bool {
    let status_field = body.get("status").and_then(serde_json::Value::as_str);
    let message_field = body.get("message").and_then(serde_json::Value::as_str);
    let result_field = body.get("result").and_then(serde_json::Value::as_str);

    let status_not_one = status_field.is_some_and(|s| s != "1");
    let message_is_notok = message_field.is_some_and(|m| m == "NOTOK");
    let result_mentions_rate_limit =
        result_field.is_some_and(|r| r.to_lowercase().contains("max calls per sec"));

    status_not_one && message_is_notok && result_mentions_rate_limit
}

/// Parse a `Retry-After` header value as either delay-seconds or an
/// HTTP-date, returning the wait duration clamped to `[base_delay, max_delay]`.
fn parse_retry_after(
    value: &reqwest::header::HeaderValue,
    base_delay: Duration,
    max_delay: Duration,
) -> Option<Duration> {
    let text = value.to_str().ok()?.trim();
    let computed = if let Ok(secs) = text.parse::<u64>() {
        Duration::from_secs(secs)
    } else {
        let target = chrono::DateTime::parse_from_rfc2822(text).ok()?;
        let now = chrono::Utc::now();
        let delta = target.with_timezone(&chrono::Utc) - now;
        Duration::from_millis(delta.num_milliseconds().max(0).unsigned_abs())
    };
    Some(computed.clamp(base_delay, max_delay))
}

fn jitter() -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=200))
}

fn backoff_delay(config: &RetryConfig, attempt: u32, retry_after: Option<Duration>) -> Duration {
    let base = retry_after.unwrap_or_else(|| {
        let exp = config.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        exp.min(config.max_delay)
    });
    base + jitter()
}

/// Run `call` in a bounded retry loop, returning the final [`HttpResponse`]
/// or the last transport error once the retry budget is exhausted.
///
/// `call` is invoked fresh on every attempt since a `reqwest::Request` is not
/// cheaply re-sendable once dispatched.
///
/// # Errors
///
/// Returns the last `reqwest::Error` if every attempt failed at the
/// transport layer (connection refused, timeout, DNS failure, etc).
pub async fn with_retry<F, Fut>(
    config: &RetryConfig,
    mut call: F,
) -> Result<HttpResponse, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let mut last_err = None;
    let mut last_response = None;

    for attempt in 0..config.retries.max(1) {
        match call().await {
            Ok(response) => {
                let status = response.status();
                let headers = response.headers().clone();

                if is_retryable_status(status) {
                    debug!(%status, attempt, "retryable HTTP status");
                    let retry_after = headers
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|h| parse_retry_after(h, config.base_delay, config.max_delay));
                    let body = response.text().await.unwrap_or_default();
                    last_response = Some(HttpResponse { status, headers, body });
                    if attempt + 1 < config.retries {
                        tokio::time::sleep(backoff_delay(config, attempt, retry_after)).await;
                    }
                    continue;
                }

                if status.is_success() {
                    let body = match response.text().await {
                        Ok(b) => b,
                        Err(e) => {
                            last_err = Some(e);
                            if attempt + 1 < config.retries {
                                tokio::time::sleep(backoff_delay(config, attempt, None)).await;
                            }
                            continue;
                        }
                    };

                    let looks_rate_limited = serde_json::from_str::<serde_json::Value>(&body)
                        .ok()
                        .is_some_and(|v| is_rate_limited_payload(&v));

                    if looks_rate_limited {
                        warn!(attempt, "provider reported rate-limit in 200 body");
                        last_response = Some(HttpResponse { status, headers, body });
                        if attempt + 1 < config.retries {
                            tokio::time::sleep(backoff_delay(config, attempt, None)).await;
                        }
                        continue;
                    }

                    return Ok(HttpResponse { status, headers, body });
                }

                // Non-retryable HTTP status; hand back to the caller to classify.
                let body = response.text().await.unwrap_or_default();
                return Ok(HttpResponse { status, headers, body });
            }
            Err(e) => {
                debug!(error = %e, attempt, "transport error, treating as transient");
                let retryable = e.is_timeout() || e.is_connect() || e.is_request();
                if !retryable {
                    return Err(e);
                }
                last_err = Some(e);
                if attempt + 1 < config.retries {
                    tokio::time::sleep(backoff_delay(config, attempt, None)).await;
                }
            }
        }
    }

    if let Some(response) = last_response {
        return Ok(response);
    }
    Err(last_err.expect("loop runs at least once and every branch sets last_err or returns"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_covers_429_and_5xx() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::OK));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let config = RetryConfig {
            retries: 6,
            base_delay: Duration::from_millis(800),
            max_delay: Duration::from_millis(8000),
        };
        let d0 = backoff_delay(&config, 0, None);
        let d1 = backoff_delay(&config, 1, None);
        let d5 = backoff_delay(&config, 5, None);
        assert!(d0 >= Duration::from_millis(800) && d0 <= Duration::from_millis(1000));
        assert!(d1 >= Duration::from_millis(1600) && d1 <= Duration::from_millis(1800));
        assert!(d5 >= Duration::from_millis(8000) && d5 <= Duration::from_millis(8200));
    }

    #[test]
    fn retry_after_seconds_is_clamped() {
        let config = RetryConfig::default();
        let value = reqwest::header::HeaderValue::from_static("3");
        let parsed = parse_retry_after(&value, config.base_delay, config.max_delay).unwrap();
        assert_eq!(parsed, Duration::from_millis(3000));

        let too_small = reqwest::header::HeaderValue::from_static("0");
        let parsed_small = parse_retry_after(&too_small, config.base_delay, config.max_delay).unwrap();
        assert_eq!(parsed_small, config.base_delay);

        let too_large = reqwest::header::HeaderValue::from_static("99999");
        let parsed_large = parse_retry_after(&too_large, config.base_delay, config.max_delay).unwrap();
        assert_eq!(parsed_large, config.max_delay);
    }

    #[test]
    fn rate_limited_200_body_is_detected() {
        let body = serde_json::json!({
            "status": "0",
            "message": "NOTOK",
            "result": "Max calls per sec rate limit reached"
        });
        assert!(is_rate_limited_payload(&body));
    }

    #[test]
    fn ok_status_field_is_not_rate_limited() {
        let body = serde_json::json!({
            "status": "1",
            "message": "OK",
            "result": []
        });
        assert!(!is_rate_limited_payload(&body));
    }

    fn fake_response(status: u16, body: &str) -> reqwest::Response {
        let raw = http::Response::builder()
            .status(status)
            .body(reqwest::Body::from(body.to_string()))
            .unwrap();
        reqwest::Response::from(raw)
    }

    #[tokio::test]
    async fn succeeds_on_first_try_without_retry() {
        let config = RetryConfig::default();
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(&config, || {
            attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Ok(fake_response(200, r#"{"status":"1","message":"OK","result":[]}"#)) }
        })
        .await
        .unwrap();

        assert!(result.is_success());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_retry_recovers_after_rate_limited_200_bodies() {
        let config = RetryConfig {
            retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                let body = if n < 2 {
                    r#"{"status":"0","message":"NOTOK","result":"Max calls per sec rate limit reached"}"#
                } else {
                    r#"{"status":"1","message":"OK","result":[]}"#
                };
                Ok(fake_response(200, body))
            }
        })
        .await
        .unwrap();

        assert!(result.is_success());
        assert_eq!(result.json().unwrap()["status"], "1");
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn with_retry_exhausts_budget_and_returns_last_rate_limited_response() {
        let config = RetryConfig {
            retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result = with_retry(&config, || async {
            Ok(fake_response(
                200,
                r#"{"status":"0","message":"NOTOK","result":"Max calls per sec rate limit reached"}"#,
            ))
        })
        .await
        .unwrap();

        assert!(result.is_success());
        assert!(result.body.contains("rate limit"));
    }

    #[tokio::test]
    async fn with_retry_recovers_from_429_then_succeeds() {
        let config = RetryConfig {
            retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                if n == 0 {
                    Ok(fake_response(429, ""))
                } else {
                    Ok(fake_response(200, r#"{"status":"1","message":"OK","result":[]}"#))
                }
            }
        })
        .await
        .unwrap();

        assert!(result.is_success());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }
}
