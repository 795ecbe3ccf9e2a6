//! Wire types of the GitHub REST endpoints the timeline engine consumes.
//!
//! Only the fields the engine reads are modelled; everything else in the payloads is ignored on
//! deserialization. These types double as the persisted checkpoint shapes.

use serde::{Deserialize, Serialize};

/// Owner/name pair plus the endpoint paths built from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub owner: String,
    pub name: String,
}

impl RepositoryRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn commits_path(&self, per_page: u32) -> String {
        format!(
            "repos/{}/{}/commits?per_page={}",
            self.owner, self.name, per_page
        )
    }

    pub fn commit_path(&self, sha: &str) -> String {
        format!("repos/{}/{}/commits/{}", self.owner, self.name, sha)
    }

    /// Contents endpoint for `{folder}/{document}.xml` as of `sha`.
    pub fn document_contents_path(&self, folder: &str, document: &str, sha: &str) -> String {
        format!(
            "repos/{}/{}/contents/{}%2F{}.xml?ref={}",
            self.owner, self.name, folder, document, sha
        )
    }

    /// Link to the commit in the web UI, where the diff can be inspected.
    pub fn commit_html_url(&self, sha: &str) -> String {
        format!(
            "https://github.com/{}/{}/commit/{}",
            self.owner, self.name, sha
        )
    }
}

impl std::fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One item of the commit listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitListEntry {
    pub sha: String,
    pub commit: CommitDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetails {
    pub committer: Signature,
    pub tree: TreeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// ISO 8601 timestamp as sent by the API.
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    pub url: String,
}

/// A git tree object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

impl TreeObject {
    pub fn find(&self, path: &str) -> Option<&TreeEntry> {
        self.tree.iter().find(|entry| entry.path == path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub entry_type: Option<String>,
    pub sha: String,
    /// Blobs only; subtrees carry no size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A commit with its per-file change list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedCommit {
    pub sha: String,
    #[serde(default)]
    pub files: Vec<FileChange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub filename: String,
    /// Kept verbatim; the enrichment stage decides which values it understands.
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additions: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletions: Option<u64>,
}

/// Metadata of a single file from the contents endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub name: String,
    pub path: String,
    pub sha: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    /// Base64 encoded file body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

impl ContentMetadata {
    pub fn without_content(mut self) -> Self {
        self.content = None;
        self.encoding = None;
        self
    }
}
