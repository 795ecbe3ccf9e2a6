use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    pub api_base_url: String,
    /// Personal access token. Requests are anonymous (and get a much lower quota) without it.
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
    /// Sleep until the quota resets instead of failing with `QuotaExceeded`.
    pub wait_for_rate_limit_reset: bool,
    /// Added on top of the advertised reset time before retrying.
    pub rate_limit_safety_margin: Duration,
    /// Remaining quota below which every response logs a warning.
    pub low_quota_threshold: u64,
    pub per_page: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
            user_agent: concat!("corpus-timeline/", env!("CARGO_PKG_VERSION")).to_string(),
            wait_for_rate_limit_reset: true,
            rate_limit_safety_margin: Duration::from_secs(60),
            low_quota_threshold: 5,
            per_page: 100,
        }
    }
}

impl GitHubConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        let mut url = api_base_url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.api_base_url = url;
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.access_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_wait_for_rate_limit_reset(mut self, wait: bool) -> Self {
        self.wait_for_rate_limit_reset = wait;
        self
    }

    pub fn with_safety_margin(mut self, margin: Duration) -> Self {
        self.rate_limit_safety_margin = margin;
        self
    }

    pub fn with_low_quota_threshold(mut self, threshold: u64) -> Self {
        self.low_quota_threshold = threshold;
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.is_empty() {
            return Err("API base URL cannot be empty".to_string());
        }

        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err("API base URL must start with http:// or https://".to_string());
        }

        if self.user_agent.trim().is_empty() {
            return Err("User agent cannot be empty".to_string());
        }

        if self.timeout.is_zero() {
            return Err("Timeout must be greater than 0".to_string());
        }

        // GitHub caps page sizes at 100
        if self.per_page == 0 || self.per_page > 100 {
            return Err("Page size must be between 1 and 100".to_string());
        }

        Ok(())
    }
}
