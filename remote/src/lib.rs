pub mod config;
pub mod github;
pub mod pagination;
pub mod provider;
pub mod rate_limit;
pub mod response;
pub mod types;

pub use config::GitHubConfig;
pub use github::GitHubClient;
pub use pagination::{parse_link_header, LinkRelations};
pub use provider::{RemoteError, RemoteResult, Transport};
pub use rate_limit::{QuotaDecision, QuotaPolicy, RateLimitStatus};
pub use response::{ApiResponse, RequestTarget};
pub use types::{
    CommitDetails, CommitListEntry, ContentMetadata, DetailedCommit, FileChange, RepositoryRef,
    Signature, TreeEntry, TreeObject, TreeRef,
};

pub mod prelude {
    pub use crate::config::*;
    pub use crate::github::*;
    pub use crate::pagination::*;
    pub use crate::provider::*;
    pub use crate::response::*;
    pub use crate::types::*;
}
