use crate::config::GitHubConfig;
use crate::provider::{RemoteError, RemoteResult, Transport};
use crate::rate_limit::{QuotaDecision, QuotaPolicy};
use crate::response::{ApiResponse, RequestTarget};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::collections::BTreeMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const GITHUB_JSON: &str = "application/vnd.github+json";
const TOKEN_DOCS: &str = "https://docs.github.com/en/authentication/keeping-your-account-and-data-secure/managing-your-personal-access-tokens";

pub struct GitHubClient {
    client: reqwest::Client,
    config: GitHubConfig,
    policy: QuotaPolicy,
    // Held for the duration of every request: the quota is one global budget.
    gate: Mutex<()>,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> RemoteResult<Self> {
        config
            .validate()
            .map_err(|msg| RemoteError::InvalidConfig { message: msg })?;

        if !config.is_authenticated() {
            warn!("No GitHub access token configured, anonymous requests get a low rate limit");
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(GITHUB_JSON));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .build()
            .map_err(|e| RemoteError::Unknown {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            policy: QuotaPolicy::from_config(&config),
            config,
            gate: Mutex::new(()),
        })
    }

    pub fn with_default_config() -> RemoteResult<Self> {
        Self::new(GitHubConfig::default())
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    async fn send(&self, url: &str) -> RemoteResult<ApiResponse> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Self::handle_http_error)?;
        let status = response.status().as_u16();
        let headers = Self::collect_headers(response.headers());
        let body = response.text().await.map_err(Self::handle_http_error)?;

        Ok(ApiResponse {
            url: url.to_string(),
            status,
            headers,
            body,
        })
    }

    fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
        let mut collected: BTreeMap<String, String> = BTreeMap::new();
        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            collected
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        collected
    }

    fn handle_http_error(err: reqwest::Error) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Unknown {
                message: format!("Request timeout: {}", err),
            }
        } else if err.is_connect() {
            RemoteError::Unknown {
                message: format!("Cannot connect to GitHub: {}", err),
            }
        } else {
            RemoteError::Network(err)
        }
    }
}

#[async_trait]
impl Transport for GitHubClient {
    async fn execute(&self, target: &RequestTarget) -> RemoteResult<ApiResponse> {
        let url = target.resolve(&self.config.api_base_url);
        let _gate = self.gate.lock().await;

        debug!("Send GET request to GitHub: {}", url);
        let response = self.send(&url).await?;

        let status = response.rate_limit();
        let now = chrono::Utc::now().timestamp();
        let response = match self.policy.evaluate(status.as_ref(), now)? {
            QuotaDecision::Proceed => response,
            QuotaDecision::Low { remaining } => {
                warn!(
                    "Approaching the GitHub rate limit, {} requests remaining",
                    remaining
                );
                if !self.config.is_authenticated() {
                    warn!(
                        "Requests are probably unauthorized. A personal access token raises the limit, see {}",
                        TOKEN_DOCS
                    );
                }
                response
            }
            QuotaDecision::WaitAndRetry(wait) => {
                warn!(
                    "Used up rate limit of {}. Waiting {}s until it resets",
                    status.and_then(|s| s.limit).unwrap_or_default(),
                    wait.as_secs()
                );
                tokio::time::sleep(wait).await;
                info!("Resuming operation, fetching {} again", url);
                self.send(&url).await?
            }
        };

        if !response.is_success() {
            debug!(
                "GET request was not successful. Server returned status code {}: {}",
                response.status, response.body
            );
        }

        Ok(response)
    }

    fn base_url(&self) -> &str {
        &self.config.api_base_url
    }

    fn provider_name(&self) -> &'static str {
        "github"
    }
}
