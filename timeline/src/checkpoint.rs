//! Intermediate build artifacts on disk, so an interrupted build can resume without refetching.

use crate::error::TimelineResult;
use crate::history::{commits_from_entries, Commit};
use crate::resolver::TreeStore;
use crate::timeline::Timeline;
use remote::{CommitListEntry, DetailedCommit};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const COMMITS_FILE: &str = "commits.json";
pub const DETAILED_COMMITS_FILE: &str = "commits_detailed.json";
pub const FOLDER_TREES_FILE: &str = "data_folder_objects.json";
pub const VERSIONS_FILE: &str = "corpus_versions.json";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Raw commit listing, most recent first.
    pub commits: Vec<CommitListEntry>,
    pub detailed_commits: BTreeMap<String, DetailedCommit>,
    pub folder_trees: TreeStore,
    pub versions: Option<Timeline>,
}

fn artifact_path(dir: &Path, prefix: &str, file: &str) -> PathBuf {
    if prefix.is_empty() {
        dir.join(file)
    } else {
        dir.join(format!("{}_{}", prefix, file))
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> TimelineResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    debug!("Stored {}", path.display());
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> TimelineResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    debug!("Imported {}", path.display());
    Ok(Some(serde_json::from_str(&content)?))
}

impl Checkpoint {
    pub fn is_empty(&self) -> bool {
        self.commits.is_empty()
            && self.detailed_commits.is_empty()
            && self.folder_trees.is_empty()
            && self.versions.is_none()
    }

    /// The checkpointed commits in timeline form.
    pub fn commit_list(&self) -> TimelineResult<Vec<Commit>> {
        commits_from_entries(&self.commits)
    }

    /// Writes every artifact into `dir`, creating it if needed. An absent timeline is not written.
    pub fn save(&self, dir: &Path, prefix: &str) -> TimelineResult<()> {
        fs::create_dir_all(dir)?;
        write_json(&artifact_path(dir, prefix, COMMITS_FILE), &self.commits)?;
        write_json(
            &artifact_path(dir, prefix, DETAILED_COMMITS_FILE),
            &self.detailed_commits,
        )?;
        write_json(
            &artifact_path(dir, prefix, FOLDER_TREES_FILE),
            &self.folder_trees,
        )?;
        if let Some(versions) = &self.versions {
            write_json(&artifact_path(dir, prefix, VERSIONS_FILE), versions)?;
        }
        info!(
            "Stored checkpoint with {} commits in {}",
            self.commits.len(),
            dir.display()
        );
        Ok(())
    }

    /// Reads whichever artifacts exist in `dir`. A missing directory yields an empty checkpoint.
    pub fn load(dir: &Path, prefix: &str) -> TimelineResult<Self> {
        let checkpoint = Self {
            commits: read_json(&artifact_path(dir, prefix, COMMITS_FILE))?.unwrap_or_default(),
            detailed_commits: read_json(&artifact_path(dir, prefix, DETAILED_COMMITS_FILE))?
                .unwrap_or_default(),
            folder_trees: read_json(&artifact_path(dir, prefix, FOLDER_TREES_FILE))?
                .unwrap_or_default(),
            versions: read_json(&artifact_path(dir, prefix, VERSIONS_FILE))?,
        };
        if !checkpoint.is_empty() {
            info!(
                "Resuming from checkpoint: {} commits, {} detailed commits, {} folder trees",
                checkpoint.commits.len(),
                checkpoint.detailed_commits.len(),
                checkpoint.folder_trees.len()
            );
        }
        Ok(checkpoint)
    }
}
