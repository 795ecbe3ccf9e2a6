//! Change classification and cross-version derivations
//!
//! Detailed commits list every touched file. Files inside the version's document folder whose
//! name belongs to the corpus are document changes; everything else (schemas, READMEs, CI files)
//! is tallied separately.

use crate::error::{TimelineError, TimelineResult};
use crate::resolver::DOCUMENT_EXTENSION;
use crate::timeline::{CorpusVersion, Timeline, VersionIssue};
use chrono::{DateTime, Utc};
use remote::{DetailedCommit, RepositoryRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// The closed set of file statuses a detailed commit may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
}

impl FromStr for ChangeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Self::Added),
            "modified" => Ok(Self::Modified),
            "removed" => Ok(Self::Removed),
            "renamed" => Ok(Self::Renamed),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ChangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        };
        f.write_str(s)
    }
}

/// One file of a detailed commit after status parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub path: String,
    pub status: ChangeStatus,
    pub previous_path: Option<String>,
}

impl ChangeRecord {
    pub fn from_commit(commit: &DetailedCommit) -> TimelineResult<Vec<Self>> {
        commit
            .files
            .iter()
            .map(|file| {
                let status = file.status.parse::<ChangeStatus>().map_err(|status| {
                    TimelineError::UnexpectedStatus {
                        version: commit.sha.clone(),
                        path: file.filename.clone(),
                        status,
                    }
                })?;
                Ok(Self {
                    path: file.filename.clone(),
                    status,
                    previous_path: file.previous_filename.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub documents_affected_count: usize,
    pub documents_added_count: usize,
    pub documents_modified_count: usize,
    pub documents_removed_count: usize,
    pub documents_renamed_count: usize,
    pub added_names: Vec<String>,
    pub modified_names: Vec<String>,
    pub removed_names: Vec<String>,
    pub non_document_count: usize,
    pub non_document_paths: Vec<String>,
}

impl ChangeSummary {
    fn record_document(&mut self, name: &str, status: ChangeStatus) {
        self.documents_affected_count += 1;
        match status {
            ChangeStatus::Added => {
                self.documents_added_count += 1;
                self.added_names.push(name.to_string());
            }
            ChangeStatus::Modified => {
                self.documents_modified_count += 1;
                self.modified_names.push(name.to_string());
            }
            ChangeStatus::Removed => {
                self.documents_removed_count += 1;
                self.removed_names.push(name.to_string());
            }
            ChangeStatus::Renamed => self.documents_renamed_count += 1,
        }
    }

    fn record_other(&mut self, path: &str) {
        self.non_document_count += 1;
        self.non_document_paths.push(path.to_string());
    }
}

/// The document name behind `path` if it lies directly in `folder` and has the document
/// extension.
fn document_in_folder<'p>(path: &'p str, folder: &str) -> Option<&'p str> {
    path.strip_prefix(folder)?
        .strip_prefix('/')?
        .strip_suffix(DOCUMENT_EXTENSION)
}

/// Classifies the files of `detailed` against `version` and stores the summary on it.
pub fn enrich(version: &mut CorpusVersion, detailed: &DetailedCommit) -> TimelineResult<()> {
    enrich_against(version, None, detailed)
}

/// Like [`enrich`], but a removed file also counts as a document when `previous_names` (the
/// documents of the preceding version) contains it. Removed documents are never part of the
/// version that removes them.
pub fn enrich_against(
    version: &mut CorpusVersion,
    previous_names: Option<&BTreeSet<String>>,
    detailed: &DetailedCommit,
) -> TimelineResult<()> {
    let records = ChangeRecord::from_commit(detailed)?;
    let mut summary = ChangeSummary::default();

    for record in &records {
        let name = version
            .folder_name()
            .and_then(|folder| document_in_folder(&record.path, folder));
        let is_document = name.is_some_and(|name| {
            version.contains_document(name)
                || (record.status == ChangeStatus::Removed
                    && previous_names.is_some_and(|names| names.contains(name)))
        });

        match name {
            Some(name) if is_document => summary.record_document(name, record.status),
            _ => summary.record_other(&record.path),
        }
    }

    debug!(
        "Version {}: {} document changes, {} other files",
        version.id, summary.documents_affected_count, summary.non_document_count
    );
    version.changes = Some(summary);
    Ok(())
}

/// `names(next) \ names(previous)` when the document count grew, otherwise empty.
pub fn new_documents(previous: &CorpusVersion, next: &CorpusVersion) -> BTreeSet<String> {
    if next.document_count <= previous.document_count {
        return BTreeSet::new();
    }
    next.document_names
        .difference(&previous.document_names)
        .cloned()
        .collect()
}

/// Attaches `new_documents` to every version whose document count grew over its predecessor.
///
/// Returns how many versions introduced documents.
pub fn derive_new_documents(timeline: &mut Timeline) -> usize {
    let versions = timeline.versions_mut();
    let mut introducing = 0;

    for position in 1..versions.len() {
        let (before, after) = versions.split_at_mut(position);
        let previous = &before[position - 1];
        let next = &mut after[0];

        if previous.sequence_number + 1 != next.sequence_number {
            warn!(
                "Versions {} and {} are not consecutive",
                previous.sequence_number, next.sequence_number
            );
        }

        if next.document_count > previous.document_count {
            let added = new_documents(previous, next);
            debug!("Version {} adds {} documents", next.sequence_number, added.len());
            next.new_documents = Some(added);
            introducing += 1;
        }
    }

    introducing
}

/// Where a document entered the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "version", rename_all = "snake_case")]
pub enum Introduction {
    /// Explicitly introduced by this version.
    Version(String),
    /// Present in some version but never introduced by one, i.e. part of the first snapshot.
    ExistedFromStart,
    NotFound,
}

pub fn version_introducing(timeline: &Timeline, name: &str) -> Introduction {
    let introduced = timeline.iter().find(|version| {
        version
            .new_documents
            .as_ref()
            .is_some_and(|names| names.contains(name))
    });
    if let Some(version) = introduced {
        return Introduction::Version(version.id.clone());
    }

    if timeline.iter().any(|version| version.contains_document(name)) {
        debug!("{} was not added explicitly, it is part of the corpus from the start", name);
        Introduction::ExistedFromStart
    } else {
        debug!("Could not find {} in any version", name);
        Introduction::NotFound
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionLink {
    pub version: String,
    pub date_from: DateTime<Utc>,
    pub commit_url: String,
}

/// Versions whose detailed commit modified document `name`.
pub fn versions_modifying_document(
    timeline: &Timeline,
    repository: &RepositoryRef,
    name: &str,
) -> Vec<VersionLink> {
    timeline
        .iter()
        .filter(|version| {
            version
                .changes
                .as_ref()
                .is_some_and(|changes| changes.modified_names.iter().any(|n| n == name))
        })
        .map(|version| VersionLink {
            version: version.id.clone(),
            date_from: version.date_from,
            commit_url: repository.commit_html_url(&version.id),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamedFile {
    pub version: String,
    pub previous_filename: Option<String>,
    pub new_filename: String,
}

/// Every rename across the timeline, in chronological order. Versions in `exclude` are skipped,
/// which is handy for hiding bulk renames.
pub fn renamed_files(
    timeline: &Timeline,
    detailed_commits: &BTreeMap<String, DetailedCommit>,
    exclude: &[String],
) -> Vec<RenamedFile> {
    timeline
        .iter()
        .filter(|version| !exclude.contains(&version.id))
        .filter_map(|version| detailed_commits.get(&version.id))
        .flat_map(|commit| {
            commit
                .files
                .iter()
                .filter(|file| file.status == "renamed")
                .map(|file| RenamedFile {
                    version: commit.sha.clone(),
                    previous_filename: file.previous_filename.clone(),
                    new_filename: file.filename.clone(),
                })
        })
        .collect()
}

pub fn versions_renaming_documents(timeline: &Timeline) -> Vec<&str> {
    timeline
        .iter()
        .filter(|version| {
            version
                .changes
                .as_ref()
                .is_some_and(|changes| changes.documents_renamed_count > 0)
        })
        .map(|version| version.id.as_str())
        .collect()
}

/// Versions that touched every one of their documents, typically bulk encoding updates.
pub fn versions_modifying_all_documents(timeline: &Timeline) -> Vec<&str> {
    timeline
        .iter()
        .filter(|version| {
            version.changes.as_ref().is_some_and(|changes| {
                changes.documents_modified_count > 0
                    && changes.documents_modified_count == version.document_count
            })
        })
        .map(|version| version.id.as_str())
        .collect()
}

/// Enriches every version that has a detailed commit; versions without one are flagged.
pub fn enrich_timeline(
    timeline: &mut Timeline,
    detailed_commits: &BTreeMap<String, DetailedCommit>,
) -> TimelineResult<usize> {
    let mut enriched = 0;
    let mut previous_names: Option<BTreeSet<String>> = None;

    for version in timeline.versions_mut() {
        match detailed_commits.get(&version.id) {
            Some(detailed) => {
                enrich_against(version, previous_names.as_ref(), detailed)?;
                enriched += 1;
            }
            None => version.flag(VersionIssue::DetailsUnavailable),
        }
        previous_names = Some(version.document_names.clone());
    }

    Ok(enriched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Commit;
    use crate::timeline::{build_timeline, FolderInfo};
    use chrono::TimeZone;
    use remote::FileChange;

    fn change(filename: &str, status: &str) -> FileChange {
        FileChange {
            filename: filename.to_string(),
            status: status.to_string(),
            previous_filename: None,
            additions: None,
            deletions: None,
        }
    }

    fn detailed(sha: &str, files: Vec<FileChange>) -> DetailedCommit {
        DetailedCommit {
            sha: sha.to_string(),
            files,
        }
    }

    fn names(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn tei() -> FolderInfo {
        FolderInfo {
            name: "tei".to_string(),
            url: "https://api.github.com/repos/o/r/git/trees/t".to_string(),
            used_fallback: false,
        }
    }

    fn timeline_with(documents: &[&[&str]]) -> Timeline {
        let commits: Vec<Commit> = (1..=documents.len() as u32)
            .rev()
            .map(|n| Commit {
                id: format!("c{}", n),
                committed_at: Utc.with_ymd_and_hms(2021, n, 1, 0, 0, 0).unwrap(),
                tree_url: String::new(),
            })
            .collect();
        let mut timeline = build_timeline(&commits).unwrap();
        for (i, docs) in documents.iter().enumerate() {
            timeline
                .get_mut(&format!("c{}", i + 1))
                .unwrap()
                .record_documents(tei(), names(docs), 0);
        }
        timeline
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("renamed".parse::<ChangeStatus>(), Ok(ChangeStatus::Renamed));
        assert_eq!("copied".parse::<ChangeStatus>(), Err("copied".to_string()));
        assert_eq!(ChangeStatus::Removed.to_string(), "removed");
    }

    #[test]
    fn test_document_and_non_document_changes() {
        let mut timeline = timeline_with(&[&["hamlet", "lear"]]);
        let version = timeline.get_mut("c1").unwrap();

        let commit = detailed(
            "c1",
            vec![change("tei/hamlet.xml", "modified"), change("README.md", "modified")],
        );
        enrich(version, &commit).unwrap();

        let changes = version.changes.as_ref().unwrap();
        assert_eq!(changes.documents_modified_count, 1);
        assert_eq!(changes.modified_names, vec!["hamlet"]);
        assert_eq!(changes.non_document_count, 1);
        assert_eq!(changes.non_document_paths, vec!["README.md"]);
        assert_eq!(changes.documents_affected_count, 1);
    }

    #[test]
    fn test_files_outside_the_corpus_are_not_documents() {
        let mut timeline = timeline_with(&[&["hamlet"]]);
        let version = timeline.get_mut("c1").unwrap();

        let commit = detailed(
            "c1",
            vec![
                change("tei/hamlet.xml", "added"),
                change("tei/unknown.xml", "added"),
                change("schema/tei.xml", "modified"),
                change("tei/nested/hamlet.xml", "modified"),
            ],
        );
        enrich(version, &commit).unwrap();

        let changes = version.changes.as_ref().unwrap();
        assert_eq!(changes.documents_added_count, 1);
        assert_eq!(changes.added_names, vec!["hamlet"]);
        assert_eq!(changes.non_document_count, 3);
    }

    #[test]
    fn test_without_folder_everything_is_non_document() {
        let commits = vec![Commit {
            id: "c1".to_string(),
            committed_at: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
            tree_url: String::new(),
        }];
        let mut timeline = build_timeline(&commits).unwrap();
        let version = timeline.get_mut("c1").unwrap();

        enrich(version, &detailed("c1", vec![change("tei/hamlet.xml", "added")])).unwrap();
        let changes = version.changes.as_ref().unwrap();
        assert_eq!(changes.documents_affected_count, 0);
        assert_eq!(changes.non_document_count, 1);
    }

    #[test]
    fn test_unknown_status_is_fatal() {
        let mut timeline = timeline_with(&[&["hamlet"]]);
        let version = timeline.get_mut("c1").unwrap();

        let err =
            enrich(version, &detailed("c1", vec![change("README.md", "copied")])).unwrap_err();
        assert!(matches!(
            err,
            TimelineError::UnexpectedStatus { ref path, ref status, .. } if path == "README.md" && status == "copied"
        ));
        assert!(version.changes.is_none());
    }

    #[test]
    fn test_removed_documents_use_previous_names() {
        let mut timeline = timeline_with(&[&["hamlet", "lear"], &["hamlet"]]);
        let mut details = BTreeMap::new();
        details.insert("c1".to_string(), detailed("c1", vec![change("tei/lear.xml", "added")]));
        details.insert("c2".to_string(), detailed("c2", vec![change("tei/lear.xml", "removed")]));

        assert_eq!(enrich_timeline(&mut timeline, &details).unwrap(), 2);

        let changes = timeline.get("c2").unwrap().changes.as_ref().unwrap();
        assert_eq!(changes.documents_removed_count, 1);
        assert_eq!(changes.removed_names, vec!["lear"]);
        assert_eq!(changes.non_document_count, 0);
    }

    #[test]
    fn test_missing_details_are_flagged() {
        let mut timeline = timeline_with(&[&["hamlet"]]);
        assert_eq!(enrich_timeline(&mut timeline, &BTreeMap::new()).unwrap(), 0);
        assert_eq!(
            timeline.get("c1").unwrap().issues,
            vec![VersionIssue::DetailsUnavailable]
        );
    }

    #[test]
    fn test_new_documents_scenario() {
        let mut timeline = timeline_with(&[&["hamlet", "lear"], &["hamlet", "lear", "macbeth"]]);
        assert_eq!(derive_new_documents(&mut timeline), 1);

        assert_eq!(
            timeline.get("c2").unwrap().new_documents,
            Some(names(&["macbeth"]))
        );
        assert!(timeline.get("c1").unwrap().new_documents.is_none());
    }

    #[test]
    fn test_new_documents_empty_when_count_does_not_grow() {
        let timeline = timeline_with(&[&["hamlet", "lear"], &["hamlet", "macbeth"]]);
        let versions = timeline.versions();
        assert!(new_documents(&versions[0], &versions[1]).is_empty());
    }

    #[test]
    fn test_version_introducing() {
        let mut timeline = timeline_with(&[&["hamlet"], &["hamlet", "lear"]]);
        derive_new_documents(&mut timeline);

        assert_eq!(
            version_introducing(&timeline, "lear"),
            Introduction::Version("c2".to_string())
        );
        assert_eq!(
            version_introducing(&timeline, "hamlet"),
            Introduction::ExistedFromStart
        );
        assert_eq!(version_introducing(&timeline, "faust"), Introduction::NotFound);
    }

    #[test]
    fn test_rename_and_bulk_queries() {
        let mut timeline = timeline_with(&[&["hamlet", "lear"], &["hamlet", "king-lear"]]);
        let mut renamed = change("tei/king-lear.xml", "renamed");
        renamed.previous_filename = Some("tei/lear.xml".to_string());

        let mut details = BTreeMap::new();
        details.insert(
            "c1".to_string(),
            detailed(
                "c1",
                vec![
                    change("tei/hamlet.xml", "modified"),
                    change("tei/lear.xml", "modified"),
                ],
            ),
        );
        details.insert(
            "c2".to_string(),
            detailed("c2", vec![renamed, change("tei/hamlet.xml", "modified")]),
        );
        enrich_timeline(&mut timeline, &details).unwrap();

        assert_eq!(versions_renaming_documents(&timeline), vec!["c2"]);
        assert_eq!(versions_modifying_all_documents(&timeline), vec!["c1"]);

        let renames = renamed_files(&timeline, &details, &[]);
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].previous_filename.as_deref(), Some("tei/lear.xml"));
        assert_eq!(renames[0].new_filename, "tei/king-lear.xml");
        assert!(renamed_files(&timeline, &details, &["c2".to_string()]).is_empty());

        let repo = RepositoryRef::new("dracor-org", "gerdracor");
        let modifying = versions_modifying_document(&timeline, &repo, "hamlet");
        let ids: Vec<&str> = modifying.iter().map(|v| v.version.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(
            modifying[1].commit_url,
            "https://github.com/dracor-org/gerdracor/commit/c2"
        );
    }
}
