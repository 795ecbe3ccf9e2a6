use remote::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimelineError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Commit history is empty, there is nothing to build a timeline from")]
    InsufficientData,

    #[error("Tree listing of folder '{folder}' in version {version} is truncated, document counts would be wrong")]
    IncompleteData { version: String, folder: String },

    #[error("Unexpected change status '{status}' for {path} in version {version}")]
    UnexpectedStatus {
        version: String,
        path: String,
        status: String,
    },

    #[error("Invalid commit date '{date}' on {commit}: {source}")]
    InvalidDate {
        commit: String,
        date: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Commit {0} appears more than once in the history")]
    DuplicateVersion(String),

    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Version {0} has no resolved document folder")]
    NoDocumentFolder(String),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type TimelineResult<T> = Result<T, TimelineError>;
