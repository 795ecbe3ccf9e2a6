use crate::response::{ApiResponse, RequestTarget};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Rate limit of {limit} requests exhausted, resets at unix time {reset_at}")]
    QuotaExceeded { limit: u64, reset_at: i64 },

    #[error("Request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unknown error: {message}")]
    Unknown { message: String },
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Issues GET requests against the hosting service.
///
/// Implementations apply the rate-limit policy before handing the response back, but never turn
/// a non-2xx status into an error: callers decide how to retry or fall back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, target: &RequestTarget) -> RemoteResult<ApiResponse>;

    /// Base that relative API paths are joined onto.
    fn base_url(&self) -> &str;

    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct MockTransport;

    #[async_trait]
    impl Transport for MockTransport {
        async fn execute(&self, target: &RequestTarget) -> RemoteResult<ApiResponse> {
            Ok(ApiResponse {
                url: target.resolve(self.base_url()),
                status: 200,
                headers: BTreeMap::new(),
                body: "[]".to_string(),
            })
        }

        fn base_url(&self) -> &str {
            "https://api.github.com/"
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_transport() {
        let transport = MockTransport;

        let response = transport
            .execute(&RequestTarget::api("repos/dracor-org/gerdracor/commits"))
            .await
            .unwrap();
        assert_eq!(
            response.url,
            "https://api.github.com/repos/dracor-org/gerdracor/commits"
        );
        assert!(response.is_success());

        let parsed: Vec<serde_json::Value> = response.json().unwrap();
        assert!(parsed.is_empty());
        assert_eq!(transport.provider_name(), "mock");
    }

    #[test]
    fn test_error_display() {
        let err = RemoteError::QuotaExceeded {
            limit: 60,
            reset_at: 1_700_000_000,
        };
        assert_eq!(
            err.to_string(),
            "Rate limit of 60 requests exhausted, resets at unix time 1700000000"
        );

        let err = RemoteError::Status {
            url: "https://api.github.com/x".to_string(),
            status: 404,
            body: "Not Found".to_string(),
        };
        assert!(err.to_string().contains("404"));
    }
}
