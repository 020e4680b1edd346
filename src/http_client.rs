use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::ValidationError;

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            user_agent: format!("validate-bag/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Async HTTP client shared by schema downloads and catalog lookups
#[derive(Clone)]
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
    default_headers: HeaderMap,
}

impl AsyncHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, ValidationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(ValidationError::from)?;

        Ok(Self {
            client,
            config,
            default_headers: HeaderMap::new(),
        })
    }

    /// Attach a header sent with every request, e.g. an API key
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ValidationError> {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ValidationError::Config(format!("Invalid header name {}: {}", name, e))
        })?;
        let value = HeaderValue::from_str(value).map_err(|e| {
            ValidationError::Config(format!("Invalid value for header {}: {}", name, e))
        })?;
        self.default_headers.insert(header, value);
        Ok(self)
    }

    /// Download a document body (schema files)
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ValidationError> {
        let response = self.get_with_retry(url).await?;
        let bytes = response.bytes().await.map_err(ValidationError::from)?;
        Ok(bytes.to_vec())
    }

    /// GET a JSON document and deserialize it
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ValidationError> {
        let response = self.get_with_retry(url).await?;
        response.json::<T>().await.map_err(ValidationError::from)
    }

    async fn get_with_retry(&self, url: &str) -> Result<Response, ValidationError> {
        let mut attempt = 0;

        loop {
            debug!(url, attempt, "HTTP GET");
            match self.make_request(url).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let error = ValidationError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                        message: format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ),
                    };

                    // Retry on server errors (5xx) but not client errors (4xx)
                    if status.is_server_error() && attempt < self.config.retry_attempts {
                        warn!(url, status = status.as_u16(), "server error, retrying");
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }

                    return Err(error);
                }
                Err(error) => {
                    if attempt < self.config.retry_attempts && Self::is_retryable_error(&error) {
                        warn!(url, %error, "request failed, retrying");
                        self.wait_before_retry(attempt).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn make_request(&self, url: &str) -> Result<Response, ValidationError> {
        let request_future = self
            .client
            .get(url)
            .headers(self.default_headers.clone())
            .send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| ValidationError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(ValidationError::from)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.retry_delay(attempt)).await;
    }

    fn is_retryable_error(error: &ValidationError) -> bool {
        match error {
            ValidationError::Http(reqwest_error) => {
                reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
            }
            ValidationError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_creation() {
        let client = AsyncHttpClient::new(HttpClientConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let client = AsyncHttpClient::new(HttpClientConfig {
            retry_delay_ms: 1000,
            max_retry_delay_ms: 10000,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(client.retry_delay(0), Duration::from_millis(1000));
        assert_eq!(client.retry_delay(1), Duration::from_millis(2000));
        assert_eq!(client.retry_delay(2), Duration::from_millis(4000));
        assert_eq!(client.retry_delay(5), Duration::from_millis(10000));
        assert_eq!(client.retry_delay(64), Duration::from_millis(10000));
    }

    #[test]
    fn test_retryable_error_detection() {
        let timeout_error = ValidationError::Timeout {
            url: "http://localhost:8080".to_string(),
            timeout_seconds: 30,
        };
        assert!(AsyncHttpClient::is_retryable_error(&timeout_error));

        let status_error = ValidationError::HttpStatus {
            url: "http://localhost:8080".to_string(),
            status: 404,
            message: "Not Found".to_string(),
        };
        assert!(!AsyncHttpClient::is_retryable_error(&status_error));
    }

    #[test]
    fn test_with_header_rejects_invalid_value() {
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();
        assert!(client.clone().with_header("x-dataverse-key", "abc-123").is_ok());
        assert!(client.with_header("x-dataverse-key", "bad\nvalue").is_err());
    }

    #[test]
    fn test_with_header_name_is_checked_not_assumed() {
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();

        let client = client.with_header("X-Dataverse-Key", "abc-123").unwrap();
        assert_eq!(
            client.default_headers.get("x-dataverse-key").unwrap(),
            "abc-123"
        );

        match client.with_header("bad header", "abc") {
            Err(ValidationError::Config(message)) => {
                assert!(message.starts_with("Invalid header name bad header"))
            }
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_unreachable_host_is_an_error() {
        let client = AsyncHttpClient::new(HttpClientConfig {
            timeout_seconds: 2,
            retry_attempts: 0,
            ..Default::default()
        })
        .unwrap();

        let result = client.download("http://127.0.0.1:1/schema.xsd").await;
        assert!(result.is_err());
    }
}
