use crate::error::{TimelineError, TimelineResult};
use remote::{GitHubConfig, RepositoryRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PREFERRED_FOLDER: &str = "tei";
pub const DEFAULT_CATALOG_API_BASE: &str = "https://dracor.org/api/v1/";

/// Settings of a timeline build, readable from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub owner: String,
    pub repository: String,
    /// Folder name tried before the `data` fallback.
    pub preferred_folder: String,
    pub api_base_url: String,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub per_page: u32,
    pub timeout_secs: u64,
    pub wait_for_rate_limit_reset: bool,
    pub rate_limit_safety_margin_secs: u64,
    pub low_quota_threshold: u64,
    /// Download detailed commits and classify changes.
    pub fetch_details: bool,
    pub checkpoint_dir: Option<PathBuf>,
    /// File name prefix of checkpoint artifacts, the repository name when unset.
    pub checkpoint_prefix: Option<String>,
    /// Local corpus listing used as provenance catalog.
    pub catalog_path: Option<PathBuf>,
    /// Base URL of the corpus API serving the listing when no local file is given.
    pub catalog_api_base: Option<String>,
    /// Corpus name in the listing endpoint, guessed from the repository name when unset.
    pub corpus_name: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let github = GitHubConfig::default();
        Self {
            owner: "dracor-org".to_string(),
            repository: String::new(),
            preferred_folder: DEFAULT_PREFERRED_FOLDER.to_string(),
            api_base_url: github.api_base_url,
            access_token: None,
            per_page: github.per_page,
            timeout_secs: github.timeout.as_secs(),
            wait_for_rate_limit_reset: github.wait_for_rate_limit_reset,
            rate_limit_safety_margin_secs: github.rate_limit_safety_margin.as_secs(),
            low_quota_threshold: github.low_quota_threshold,
            fetch_details: true,
            checkpoint_dir: None,
            checkpoint_prefix: None,
            catalog_path: None,
            catalog_api_base: None,
            corpus_name: None,
        }
    }
}

impl EngineConfig {
    pub fn new(owner: impl Into<String>, repository: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repository: repository.into(),
            ..Self::default()
        }
    }

    pub fn from_toml_str(content: &str) -> TimelineResult<Self> {
        toml::from_str(content).map_err(|e| TimelineError::InvalidConfig {
            message: e.to_string(),
        })
    }

    pub fn from_toml_file(path: &Path) -> TimelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn with_preferred_folder(mut self, folder: impl Into<String>) -> Self {
        self.preferred_folder = folder.into();
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

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_wait_for_rate_limit_reset(mut self, wait: bool) -> Self {
        self.wait_for_rate_limit_reset = wait;
        self
    }

    pub fn with_fetch_details(mut self, fetch_details: bool) -> Self {
        self.fetch_details = fetch_details;
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = Some(dir.into());
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn repository_ref(&self) -> RepositoryRef {
        RepositoryRef::new(&self.owner, &self.repository)
    }

    pub fn checkpoint_prefix(&self) -> &str {
        self.checkpoint_prefix.as_deref().unwrap_or(&self.repository)
    }

    /// `gerdracor` is listed as corpus `ger`.
    pub fn corpus_name(&self) -> String {
        match &self.corpus_name {
            Some(name) => name.clone(),
            None => self.repository.to_lowercase().replace("dracor", ""),
        }
    }

    /// Listing endpoint `{base}corpora/{corpus}`, if a catalog API is configured.
    pub fn catalog_url(&self) -> Option<String> {
        let base = self.catalog_api_base.as_deref()?;
        let separator = if base.ends_with('/') { "" } else { "/" };
        Some(format!("{}{}corpora/{}", base, separator, self.corpus_name()))
    }

    pub fn github_config(&self) -> GitHubConfig {
        let mut config = GitHubConfig::new()
            .with_api_base_url(&self.api_base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_wait_for_rate_limit_reset(self.wait_for_rate_limit_reset)
            .with_safety_margin(Duration::from_secs(self.rate_limit_safety_margin_secs))
            .with_low_quota_threshold(self.low_quota_threshold)
            .with_per_page(self.per_page);
        if let Some(token) = &self.access_token {
            config = config.with_access_token(token);
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.owner.trim().is_empty() {
            return Err("Repository owner cannot be empty".to_string());
        }

        if self.repository.trim().is_empty() {
            return Err("Repository name cannot be empty".to_string());
        }

        if self.preferred_folder.trim().is_empty() || self.preferred_folder.contains('/') {
            return Err("Preferred folder must be a single, non-empty path segment".to_string());
        }

        self.github_config().validate()
    }
}
