//! Transport seam between adapters and bidder endpoints.
//!
//! Adapters talk to a [`Transport`] trait object so tests can substitute an
//! in-memory double; production wiring uses [`HttpTransport`] over reqwest.

use async_trait::async_trait;
use bidexpress_core::config::TransportConfig;
use bidexpress_core::error::{BidError, BidResult};
use bidexpress_core::types::HttpMethod;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

/// Options for a single transport call, mirroring the ajax contract the
/// adapter lifecycle was built around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    pub method: HttpMethod,
    pub content_type: Option<&'static str>,
    pub with_credentials: bool,
}

/// One request, one response, no retries. Success yields the raw response
/// body; every other outcome is a [`BidError::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        url: &str,
        body: Option<String>,
        options: &TransportOptions,
    ) -> BidResult<String>;
}

/// reqwest-backed transport. Credentialed calls share the client's cookie
/// store, the server-side analogue of `withCredentials`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> BidResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .cookie_store(true)
            .build()
            .map_err(|e| BidError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        url: &str,
        body: Option<String>,
        options: &TransportOptions,
    ) -> BidResult<String> {
        let mut request = match options.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Post => self.client.post(url),
        };
        if let Some(content_type) = options.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BidError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(BidError::Transport(format!(
                "unexpected status {status} from {url}"
            )));
        }
        response
            .text()
            .await
            .map_err(|e| BidError::Transport(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_transport_builds_from_config() {
        let transport = HttpTransport::new(&TransportConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_options_compare_by_value() {
        let a = TransportOptions {
            method: HttpMethod::Post,
            content_type: Some("text/plain"),
            with_credentials: true,
        };
        assert_eq!(a, a.clone());
    }
}
