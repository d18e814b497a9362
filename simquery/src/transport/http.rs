//! reqwest-backed transport.

use super::envelope::{error_from_status, parse_envelope};
use super::types::{BackendResponse, Transport};
use crate::config::BackendSettings;
use crate::error::FetchError;
use crate::request::BackendRequest;
use reqwest::header::{HeaderMap, CACHE_CONTROL, CONTENT_LENGTH};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default User-Agent string for backend requests.
pub const DEFAULT_USER_AGENT: &str = concat!("simquery/", env!("CARGO_PKG_VERSION"));

/// Header carrying backend processing time in (fractional) seconds.
const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Header carrying backend cache status (`HIT` / `MISS`).
const CACHE_STATUS_HEADER: &str = "x-cache";

/// Cache-control value sent when cached responses are acceptable.
const CACHEABLE: &str = "max-age=300";

/// Cache-control value sent when a fresh response is required.
const NO_CACHE: &str = "no-cache";

/// Returns the `Cache-Control` header value for a request.
pub fn cache_control_value(use_cache: bool) -> &'static str {
    if use_cache {
        CACHEABLE
    } else {
        NO_CACHE
    }
}

/// Async HTTP transport using reqwest.
///
/// Sends GET requests to `{base_url}{api_prefix}/{endpoint}` with a fixed
/// per-request timeout. Dropping in-flight requests on cancellation closes the
/// underlying connection, so cancelled operations release their socket.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    root: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Creates a transport from backend settings.
    pub fn new(settings: &BackendSettings) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(settings.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            root: join_root(&settings.base_url, &settings.api_prefix),
            timeout,
        })
    }

    /// Returns the absolute URL for an endpoint.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.root, endpoint.trim_start_matches('/'))
    }

    /// Returns the configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        warn!(
            url = url,
            error = %e,
            is_connect = e.is_connect(),
            is_timeout = e.is_timeout(),
            "HTTP request failed"
        );
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Network(format!("Request failed: {}", e))
        }
    }
}

impl Transport for ReqwestTransport {
    async fn get(
        &self,
        request: &BackendRequest,
        cancel: &CancellationToken,
    ) -> Result<BackendResponse, FetchError> {
        let url = self.url_for(&request.endpoint);
        trace!(url = %url, "HTTP GET request starting");

        let send = self
            .client
            .get(&url)
            .query(&request.query)
            .header(CACHE_CONTROL, cache_control_value(request.use_cache))
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = send => result.map_err(|e| self.classify(&url, e))?,
        };

        let status = response.status();
        let headers = response.headers().clone();
        debug!(url = %url, status = status.as_u16(), "HTTP response received");

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = response.bytes() => result.map_err(|e| self.classify(&url, e))?,
        };

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "HTTP error status");
            return Err(error_from_status(status.as_u16(), &body));
        }

        let payload = parse_envelope(&body)?;
        trace!(url = %url, bytes = body.len(), "HTTP response body read");

        Ok(BackendResponse {
            payload,
            server_elapsed: process_time(&headers),
            payload_bytes: content_length(&headers).or(Some(body.len() as u64)),
            server_cache_hit: cache_status(&headers),
        })
    }
}

fn join_root(base_url: &str, api_prefix: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let prefix = api_prefix.trim_matches('/');
    if prefix.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, prefix)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn process_time(headers: &HeaderMap) -> Option<Duration> {
    let secs: f64 = header_str(headers, PROCESS_TIME_HEADER)?.parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

fn cache_status(headers: &HeaderMap) -> Option<bool> {
    let value = header_str(headers, CACHE_STATUS_HEADER)?;
    if value.eq_ignore_ascii_case("hit") {
        Some(true)
    } else if value.eq_ignore_ascii_case("miss") {
        Some(false)
    } else {
        None
    }
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, CONTENT_LENGTH.as_str())?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn settings(base_url: &str, api_prefix: &str) -> BackendSettings {
        BackendSettings {
            base_url: base_url.to_string(),
            api_prefix: api_prefix.to_string(),
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_url_for_joins_segments() {
        let transport = ReqwestTransport::new(&settings("http://localhost:8000/", "/api/")).unwrap();
        assert_eq!(
            transport.url_for("/capacity"),
            "http://localhost:8000/api/capacity"
        );
    }

    #[test]
    fn test_url_for_without_prefix() {
        let transport = ReqwestTransport::new(&settings("http://host", "")).unwrap();
        assert_eq!(transport.url_for("costs"), "http://host/costs");
    }

    #[test]
    fn test_timeout_from_settings() {
        let transport = ReqwestTransport::new(&settings("http://host", "/api")).unwrap();
        assert_eq!(transport.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_cache_control_value() {
        assert_eq!(cache_control_value(true), "max-age=300");
        assert_eq!(cache_control_value(false), "no-cache");
    }

    #[test]
    fn test_timing_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-process-time", HeaderValue::from_static("0.25"));
        headers.insert("x-cache", HeaderValue::from_static("HIT"));
        headers.insert("content-length", HeaderValue::from_static("512"));

        assert_eq!(process_time(&headers), Some(Duration::from_millis(250)));
        assert_eq!(cache_status(&headers), Some(true));
        assert_eq!(content_length(&headers), Some(512));
    }

    #[test]
    fn test_missing_or_garbage_headers() {
        let mut headers = HeaderMap::new();
        assert_eq!(process_time(&headers), None);
        assert_eq!(cache_status(&headers), None);

        headers.insert("x-process-time", HeaderValue::from_static("-1"));
        headers.insert("x-cache", HeaderValue::from_static("STALE"));
        assert_eq!(process_time(&headers), None);
        assert_eq!(cache_status(&headers), None);
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        // Port 9 (discard) on localhost is not expected to answer; the
        // pre-cancelled token wins the biased select either way.
        let transport = ReqwestTransport::new(&settings("http://127.0.0.1:9", "/api")).unwrap();
        let request = BackendRequest::build(
            "capacity",
            &crate::request::RequestParams::new("p", "s"),
            &crate::request::FetchOptions::default(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = transport.get(&request, &cancel).await;
        assert_eq!(result, Err(FetchError::Cancelled));
    }
}
