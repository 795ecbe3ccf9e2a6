use crate::pagination::{parse_link_header, LinkRelations};
use crate::provider::{RemoteError, RemoteResult};
use crate::rate_limit::RateLimitStatus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What to GET: a path relative to the API base, or a URL handed out by the API itself
/// (tree URLs, `next` links).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Api(String),
    Url(String),
}

impl RequestTarget {
    pub fn api(path: impl Into<String>) -> Self {
        Self::Api(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    pub fn resolve(&self, base_url: &str) -> String {
        match self {
            Self::Api(path) => {
                let base = base_url.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{}/{}", base, path)
            }
            Self::Url(url) => url.clone(),
        }
    }
}

impl fmt::Display for RequestTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(path) => write!(f, "api:{}", path),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Full response: status, headers (names lowercased) and the raw body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parsed body. Non-2xx responses become `RemoteError::Status`.
    pub fn json<T: DeserializeOwned>(&self) -> RemoteResult<T> {
        self.ensure_success()?;
        Ok(serde_json::from_str(&self.body)?)
    }

    pub fn ensure_success(&self) -> RemoteResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(RemoteError::Status {
                url: self.url.clone(),
                status: self.status,
                body: self.body.clone(),
            })
        }
    }

    /// Pagination relations from the `Link` header, `None` when the header is absent.
    pub fn links(&self) -> Option<LinkRelations> {
        self.header("link").map(parse_link_header)
    }

    pub fn rate_limit(&self) -> Option<RateLimitStatus> {
        RateLimitStatus::from_headers(&self.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_resolution() {
        let base = "https://api.github.com/";
        assert_eq!(
            RequestTarget::api("repos/a/b/commits").resolve(base),
            "https://api.github.com/repos/a/b/commits"
        );
        assert_eq!(
            RequestTarget::api("/repos/a/b/commits").resolve("https://api.github.com"),
            "https://api.github.com/repos/a/b/commits"
        );
        assert_eq!(
            RequestTarget::url("https://api.github.com/repos/a/b/git/trees/abc").resolve(base),
            "https://api.github.com/repos/a/b/git/trees/abc"
        );
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = ApiResponse::new("u", 200, "{}").with_header("X-RateLimit-Remaining", "42");
        assert_eq!(response.header("x-ratelimit-remaining"), Some("42"));
        assert_eq!(response.header("X-RATELIMIT-REMAINING"), Some("42"));
        assert_eq!(response.header("link"), None);
        assert!(response.links().is_none());
    }

    #[test]
    fn test_json_on_error_status() {
        let response =
            ApiResponse::new("https://api.github.com/x", 404, "{\"message\":\"Not Found\"}");
        assert!(!response.is_success());

        let err = response.json::<serde_json::Value>().unwrap_err();
        match err {
            RemoteError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("Not Found"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_links_from_header() {
        let response = ApiResponse::new("u", 200, "[]").with_header(
            "Link",
            "<https://api.github.com/r?page=2>; rel=\"next\", <https://api.github.com/r?page=5>; rel=\"last\"",
        );
        let links = response.links().unwrap();
        assert_eq!(links.next(), Some("https://api.github.com/r?page=2"));
        assert_eq!(links.get("last"), Some("https://api.github.com/r?page=5"));
    }
}
