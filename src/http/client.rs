//! HTTP dispatch of raw request messages

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::{Duration, Instant};

use super::message::HttpMessage;
use super::response::{truncate_body, Response};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, JwtFuzzError, MessageError};

/// Headers that describe the original connection rather than the request
const SKIPPED_HEADERS: &[&str] = &[
    "host",
    "content-length",
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
    "te",
    "trailer",
];

/// Sends a message and returns the response
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, message: &HttpMessage) -> Result<Response, JwtFuzzError>;
}

/// reqwest-backed dispatcher
pub struct HttpClient {
    /// Inner reqwest client
    client: reqwest::Client,

    /// Scheme for relative request targets
    scheme: String,

    /// Maximum captured body size
    max_response_size: usize,

    /// Default timeout
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &DispatchConfig) -> Result<Self, JwtFuzzError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(config.max_redirects)
            } else {
                reqwest::redirect::Policy::none()
            })
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| DispatchError::RequestFailed(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            scheme: config.scheme.clone(),
            max_response_size: config.max_response_size,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Absolute URL a message is sent to
    pub fn target_url(&self, message: &HttpMessage) -> Result<url::Url, JwtFuzzError> {
        resolve_url(message, &self.scheme)
    }
}

#[async_trait]
impl Dispatcher for HttpClient {
    async fn dispatch(&self, message: &HttpMessage) -> Result<Response, JwtFuzzError> {
        let start = Instant::now();

        let line = message.request_line()?;
        let method = reqwest::Method::from_str(line.method)
            .map_err(|_| DispatchError::InvalidMethod(line.method.to_string()))?;
        let url = self.target_url(message)?;

        let mut headers = HeaderMap::new();
        for (key, value) in message.headers() {
            if SKIPPED_HEADERS.iter().any(|h| key.eq_ignore_ascii_case(h)) {
                continue;
            }
            match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
                (Ok(name), Ok(val)) => {
                    headers.append(name, val);
                }
                _ => tracing::debug!(header = key, "Dropping header that reqwest rejects"),
            }
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if !message.body_text().is_empty() {
            builder = builder.body(message.body_text().to_string());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DispatchError::Timeout(self.timeout.as_millis() as u64)
            } else {
                DispatchError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let mut response_headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                response_headers.insert(key.as_str().to_string(), v.to_string());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| DispatchError::RequestFailed(format!("Failed to read body: {}", e)))?;
        let size = body.len();

        Ok(Response {
            status,
            headers: response_headers,
            body: truncate_body(body, self.max_response_size),
            size,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Absolute URL from the request target, or `scheme://Host` + target
fn resolve_url(message: &HttpMessage, scheme: &str) -> Result<url::Url, JwtFuzzError> {
    let target = message.request_line()?.target;

    if target.starts_with("http://") || target.starts_with("https://") {
        return url::Url::parse(target).map_err(|_| DispatchError::InvalidUrl(target.to_string()).into());
    }

    let host = message
        .header("host")
        .ok_or_else(|| MessageError::MissingHost(target.to_string()))?;
    let full = format!("{}://{}{}", scheme, host, target);
    url::Url::parse(&full).map_err(|_| DispatchError::InvalidUrl(full).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpClient::new(&DispatchConfig::default()).is_ok());
    }

    #[test]
    fn test_resolve_relative_target() {
        let msg = HttpMessage::parse("GET /api/me?x=1 HTTP/1.1\r\nHost: example.com:8443\r\n\r\n");
        let url = resolve_url(&msg, "https").unwrap();
        assert_eq!(url.as_str(), "https://example.com:8443/api/me?x=1");
    }

    #[test]
    fn test_resolve_absolute_target() {
        let msg = HttpMessage::parse("GET http://internal/api HTTP/1.1\r\nHost: other\r\n\r\n");
        let url = resolve_url(&msg, "https").unwrap();
        assert_eq!(url.as_str(), "http://internal/api");
    }

    #[test]
    fn test_resolve_without_host() {
        let msg = HttpMessage::parse("GET /api HTTP/1.1\r\n\r\n");
        assert!(matches!(
            resolve_url(&msg, "https"),
            Err(JwtFuzzError::Message(MessageError::MissingHost(_)))
        ));
    }
}
