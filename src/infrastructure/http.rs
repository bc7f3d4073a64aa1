//! Thin HTTP client over reqwest.
//!
//! Single-attempt JSON requests with a per-request timeout; retry loops live
//! in the components so each boundary can classify errors its own way.

use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Error from one HTTP attempt.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("network error for {url}: {message}")]
    Network { url: String, message: String },
    #[error("invalid response body from {url}: {message}")]
    InvalidBody { url: String, message: String },
}

impl HttpError {
    /// Overload signals feed the circuit breaker: request timeouts and the
    /// dependency's explicit 408.
    pub fn is_overload(&self) -> bool {
        matches!(
            self,
            HttpError::Timeout { .. }
                | HttpError::Status { status: 408, .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// JSON-speaking HTTP client with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = ClientBuilder::new()
            .gzip(true)
            .user_agent(concat!("parts-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HttpError::Network {
                url: String::new(),
                message: format!("failed to build client: {e}"),
            })?;
        Ok(Self { client, timeout })
    }

    /// One GET attempt returning the parsed JSON body.
    pub async fn get_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Value, HttpError> {
        debug!(url, "HTTP GET");
        let mut request = self.client.get(url).timeout(self.timeout);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(|e| Self::classify(url, &e))?;
        Self::json_body(url, response).await
    }

    /// One POST attempt with a JSON body and optional Basic authentication.
    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        basic_auth: Option<(&str, &str)>,
    ) -> Result<Value, HttpError> {
        debug!(url, "HTTP POST");
        let mut request = self.client.post(url).timeout(self.timeout).json(body);
        if let Some((username, password)) = basic_auth {
            request = request.basic_auth(username, Some(password));
        }
        let response = request.send().await.map_err(|e| Self::classify(url, &e))?;
        Self::json_body(url, response).await
    }

    async fn json_body(url: &str, response: reqwest::Response) -> Result<Value, HttpError> {
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        response.json::<Value>().await.map_err(|e| HttpError::InvalidBody {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    fn classify(url: &str, error: &reqwest::Error) -> HttpError {
        if error.is_timeout() {
            return HttpError::Timeout { url: url.to_string() };
        }
        if let Some(status) = error.status() {
            return HttpError::Status { status: status.as_u16(), url: url.to_string() };
        }
        HttpError::Network { url: url.to_string(), message: error.to_string() }
    }
}

/// Statuses worth retrying at any boundary, next to hard timeouts and
/// network errors.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(
        StatusCode::from_u16(status).ok(),
        Some(
            StatusCode::REQUEST_TIMEOUT
                | StatusCode::TOO_MANY_REQUESTS
                | StatusCode::INTERNAL_SERVER_ERROR
                | StatusCode::BAD_GATEWAY
                | StatusCode::SERVICE_UNAVAILABLE
                | StatusCode::GATEWAY_TIMEOUT
        )
    )
}
