//! Document-tree resolution
//!
//! Locates the folder holding a version's documents and enumerates it. Early corpus versions
//! may keep their documents under `data/` instead of the preferred folder name, so that name is
//! tried second.

use crate::error::{TimelineError, TimelineResult};
use crate::timeline::{CorpusVersion, FolderInfo, Timeline, VersionIssue};
use chrono::{DateTime, Utc};
use remote::{ContentMetadata, RepositoryRef, RequestTarget, TreeObject, Transport};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const FALLBACK_FOLDER: &str = "data";
pub const DOCUMENT_EXTENSION: &str = ".xml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTreeEntry {
    pub path: String,
    pub size_bytes: u64,
}

/// Document name for a folder entry, `None` for anything that is not an `.xml` file.
pub fn document_name(path: &str) -> Option<&str> {
    path.strip_suffix(DOCUMENT_EXTENSION)
        .filter(|name| !name.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFolder {
    pub folder: FolderInfo,
    pub tree: TreeObject,
}

impl ResolvedFolder {
    pub fn entries(&self) -> Vec<DocumentTreeEntry> {
        folder_entries(&self.tree)
    }

    pub fn document_names(&self) -> BTreeSet<String> {
        self.tree
            .tree
            .iter()
            .filter_map(|entry| document_name(&entry.path))
            .map(str::to_string)
            .collect()
    }

    /// Sum over every entry of the folder, documents or not.
    pub fn size_total(&self) -> u64 {
        self.entries().iter().map(|entry| entry.size_bytes).sum()
    }
}

fn folder_entries(tree: &TreeObject) -> Vec<DocumentTreeEntry> {
    tree.tree
        .iter()
        .map(|entry| DocumentTreeEntry {
            path: entry.path.clone(),
            size_bytes: entry.size.unwrap_or(0),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderResolution {
    Found(ResolvedFolder),
    /// Neither the preferred nor the fallback folder exists in this version.
    NotFound { searched: Vec<String> },
    /// A tree object answered with a non-2xx status.
    Unavailable { url: String, status: u16 },
}

pub struct TreeResolver<'a> {
    transport: &'a dyn Transport,
    preferred_folder: String,
}

impl<'a> TreeResolver<'a> {
    pub fn new(transport: &'a dyn Transport, preferred_folder: impl Into<String>) -> Self {
        Self {
            transport,
            preferred_folder: preferred_folder.into(),
        }
    }

    pub fn preferred_folder(&self) -> &str {
        &self.preferred_folder
    }

    /// Resolves the document folder of `version_id`, starting from its root tree.
    ///
    /// Only a truncated folder listing is an error; a missing folder or an unavailable tree is
    /// reported through [`FolderResolution`] so the caller can carry on with other versions.
    pub async fn resolve(
        &self,
        version_id: &str,
        root_tree_url: &str,
    ) -> TimelineResult<FolderResolution> {
        let response = self
            .transport
            .execute(&RequestTarget::url(root_tree_url))
            .await?;
        if !response.is_success() {
            warn!(
                "GET request for the root tree of {} failed with status {}",
                version_id, response.status
            );
            return Ok(FolderResolution::Unavailable {
                url: root_tree_url.to_string(),
                status: response.status,
            });
        }

        let root: TreeObject = response.json()?;
        if root.truncated {
            warn!(
                "Not all items in the root folder of {} are included in the response",
                version_id
            );
        }

        let (entry, used_fallback) = match root.find(&self.preferred_folder) {
            Some(entry) => (entry, false),
            None => {
                debug!(
                    "Could not find folder '{}' in {}, trying '{}'",
                    self.preferred_folder, version_id, FALLBACK_FOLDER
                );
                match root.find(FALLBACK_FOLDER) {
                    Some(entry) => (entry, true),
                    None => {
                        return Ok(FolderResolution::NotFound {
                            searched: self.searched_names(),
                        })
                    }
                }
            }
        };

        let Some(folder_url) = entry.url.clone() else {
            return Ok(FolderResolution::NotFound {
                searched: self.searched_names(),
            });
        };
        let folder_name = entry.path.clone();
        debug!(
            "Found data folder '{}' of {}, sha: {}",
            folder_name, version_id, entry.sha
        );

        let response = self
            .transport
            .execute(&RequestTarget::url(folder_url.clone()))
            .await?;
        if !response.is_success() {
            warn!(
                "GET request for folder '{}' of {} failed with status {}",
                folder_name, version_id, response.status
            );
            return Ok(FolderResolution::Unavailable {
                url: folder_url,
                status: response.status,
            });
        }

        let tree: TreeObject = response.json()?;
        if tree.truncated {
            return Err(TimelineError::IncompleteData {
                version: version_id.to_string(),
                folder: folder_name,
            });
        }
        debug!(
            "Found {} files in folder '{}' of {}",
            tree.tree.len(),
            folder_name,
            version_id
        );

        Ok(FolderResolution::Found(ResolvedFolder {
            folder: FolderInfo {
                name: folder_name,
                url: folder_url,
                used_fallback,
            },
            tree,
        }))
    }

    fn searched_names(&self) -> Vec<String> {
        vec![self.preferred_folder.clone(), FALLBACK_FOLDER.to_string()]
    }
}

/// Records a resolution outcome on its version.
pub fn apply_resolution(version: &mut CorpusVersion, resolution: &FolderResolution) {
    match resolution {
        FolderResolution::Found(resolved) => {
            version.record_documents(
                resolved.folder.clone(),
                resolved.document_names(),
                resolved.size_total(),
            );
        }
        FolderResolution::NotFound { searched } => {
            warn!(
                "No document folder found in version {} ({})",
                version.sequence_number, version.id
            );
            version.flag(VersionIssue::FolderNotFound {
                searched: searched.clone(),
            });
        }
        FolderResolution::Unavailable { url, status } => {
            version.flag(VersionIssue::TreeUnavailable {
                url: url.clone(),
                status: *status,
            });
        }
    }
}

/// Folder tree objects by version id, as downloaded during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TreeStore(BTreeMap<String, TreeObject>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizePoint {
    pub version: String,
    pub date_from: DateTime<Utc>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeChange {
    pub version: String,
    pub size: u64,
    pub commit_url: String,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, version_id: impl Into<String>, tree: TreeObject) {
        self.0.insert(version_id.into(), tree);
    }

    pub fn get(&self, version_id: &str) -> Option<&TreeObject> {
        self.0.get(version_id)
    }

    pub fn contains(&self, version_id: &str) -> bool {
        self.0.contains_key(version_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tree entry of document `name` in `version_id`.
    pub fn document_entry(&self, version_id: &str, name: &str) -> Option<DocumentTreeEntry> {
        let path = format!("{}{}", name, DOCUMENT_EXTENSION);
        self.get(version_id)?
            .find(&path)
            .map(|entry| DocumentTreeEntry {
                path: entry.path.clone(),
                size_bytes: entry.size.unwrap_or(0),
            })
    }

    pub fn entries(&self, version_id: &str) -> Option<Vec<DocumentTreeEntry>> {
        self.get(version_id).map(folder_entries)
    }

    /// Size of document `name` in every version, `None` where it does not exist.
    pub fn document_size_history(&self, timeline: &Timeline, name: &str) -> Vec<SizePoint> {
        timeline
            .iter()
            .map(|version| SizePoint {
                version: version.id.clone(),
                date_from: version.date_from,
                size: self
                    .document_entry(&version.id, name)
                    .map(|entry| entry.size_bytes),
            })
            .collect()
    }

    /// Versions in which the size of document `name` differs from the last size seen.
    ///
    /// A changed size usually means the document was edited in that version.
    pub fn document_size_changes(
        &self,
        timeline: &Timeline,
        repository: &RepositoryRef,
        name: &str,
    ) -> Vec<SizeChange> {
        let mut changes = Vec::new();
        let mut last_size = 0;
        for version in timeline {
            let Some(entry) = self.document_entry(&version.id, name) else {
                continue;
            };
            if entry.size_bytes != last_size {
                changes.push(SizeChange {
                    version: version.id.clone(),
                    size: entry.size_bytes,
                    commit_url: repository.commit_html_url(&version.id),
                });
                last_size = entry.size_bytes;
            }
        }
        changes
    }
}

/// Contents-endpoint metadata of one document as of `version`.
pub async fn fetch_document_metadata(
    transport: &dyn Transport,
    repository: &RepositoryRef,
    version: &CorpusVersion,
    name: &str,
    include_content: bool,
) -> TimelineResult<ContentMetadata> {
    let folder = version
        .folder_name()
        .ok_or_else(|| TimelineError::NoDocumentFolder(version.id.clone()))?;
    let path = repository.document_contents_path(folder, name, &version.id);

    let metadata: ContentMetadata = transport.execute(&RequestTarget::api(path)).await?.json()?;
    Ok(if include_content {
        metadata
    } else {
        metadata.without_content()
    })
}
