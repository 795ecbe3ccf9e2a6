//! Corpus versions and the timeline that owns them
//!
//! The timeline is built once from the commit history and never reordered afterwards. Later
//! stages look versions up by commit id and fill in fields.

use crate::enrichment::ChangeSummary;
use crate::error::{TimelineError, TimelineResult};
use crate::history::Commit;
use crate::provenance::SourceDistribution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// The folder a version's documents were read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    pub name: String,
    /// API URL of the folder's tree object.
    pub url: String,
    /// Whether the fallback name was used instead of the preferred one.
    pub used_fallback: bool,
}

/// Recoverable problems recorded on a single version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VersionIssue {
    /// None of the searched folder names exists in the root tree.
    FolderNotFound { searched: Vec<String> },
    /// A tree object could not be fetched.
    TreeUnavailable { url: String, status: u16 },
    /// No detailed commit was available to classify changes.
    DetailsUnavailable,
}

impl std::fmt::Display for VersionIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FolderNotFound { searched } => {
                write!(f, "no document folder found (searched {})", searched.join(", "))
            }
            Self::TreeUnavailable { url, status } => {
                write!(f, "tree {} unavailable (status {})", url, status)
            }
            Self::DetailsUnavailable => f.write_str("detailed commit unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusVersion {
    pub id: String,
    pub sequence_number: u32,
    pub date_from: DateTime<Utc>,
    pub date_until: Option<DateTime<Utc>>,
    pub folder: Option<FolderInfo>,
    pub document_names: BTreeSet<String>,
    pub document_count: usize,
    /// Bytes, summed over every entry of the resolved folder.
    pub document_size_total: u64,
    pub changes: Option<ChangeSummary>,
    /// Documents first present in this version, compared with the previous one.
    pub new_documents: Option<BTreeSet<String>>,
    pub source_distribution: Option<SourceDistribution>,
    #[serde(default)]
    pub issues: Vec<VersionIssue>,
}

impl CorpusVersion {
    pub fn new(commit: &Commit, sequence_number: u32) -> Self {
        Self {
            id: commit.id.clone(),
            sequence_number,
            date_from: commit.committed_at,
            date_until: None,
            folder: None,
            document_names: BTreeSet::new(),
            document_count: 0,
            document_size_total: 0,
            changes: None,
            new_documents: None,
            source_distribution: None,
            issues: Vec::new(),
        }
    }

    /// Sets the folder and its documents in one step so count and names never disagree.
    pub fn record_documents(
        &mut self,
        folder: FolderInfo,
        document_names: BTreeSet<String>,
        document_size_total: u64,
    ) {
        self.document_count = document_names.len();
        self.document_names = document_names;
        self.document_size_total = document_size_total;
        self.folder = Some(folder);
    }

    pub fn folder_name(&self) -> Option<&str> {
        self.folder.as_ref().map(|f| f.name.as_str())
    }

    pub fn has_documents(&self) -> bool {
        self.folder.is_some()
    }

    pub fn contains_document(&self, name: &str) -> bool {
        self.document_names.contains(name)
    }

    pub fn flag(&mut self, issue: VersionIssue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    pub fn new_documents_count(&self) -> usize {
        self.new_documents.as_ref().map_or(0, BTreeSet::len)
    }
}

/// Chronologically ordered versions plus an id index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<CorpusVersion>", try_from = "Vec<CorpusVersion>")]
pub struct Timeline {
    versions: Vec<CorpusVersion>,
    index: HashMap<String, usize>,
}

impl Timeline {
    /// Wraps already ordered versions. Fails on duplicate ids.
    pub fn from_versions(versions: Vec<CorpusVersion>) -> TimelineResult<Self> {
        let mut index = HashMap::with_capacity(versions.len());
        for (position, version) in versions.iter().enumerate() {
            if index.insert(version.id.clone(), position).is_some() {
                return Err(TimelineError::DuplicateVersion(version.id.clone()));
            }
        }
        Ok(Self { versions, index })
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CorpusVersion> {
        self.versions.iter()
    }

    pub fn versions(&self) -> &[CorpusVersion] {
        &self.versions
    }

    pub fn get(&self, id: &str) -> Option<&CorpusVersion> {
        self.index.get(id).map(|&position| &self.versions[position])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CorpusVersion> {
        self.index
            .get(id)
            .copied()
            .map(move |position| &mut self.versions[position])
    }

    pub fn require(&self, id: &str) -> TimelineResult<&CorpusVersion> {
        self.get(id)
            .ok_or_else(|| TimelineError::VersionNotFound(id.to_string()))
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn first(&self) -> Option<&CorpusVersion> {
        self.versions.first()
    }

    pub fn latest(&self) -> Option<&CorpusVersion> {
        self.versions.last()
    }

    pub(crate) fn versions_mut(&mut self) -> &mut [CorpusVersion] {
        &mut self.versions
    }

    /// Versions whose `date_from` lies within `[start, end]`.
    pub fn versions_in_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<&CorpusVersion> {
        self.versions
            .iter()
            .filter(|v| start <= v.date_from && v.date_from <= end)
            .collect()
    }

    /// Distinct document names across the versions in `[start, end]`, in first-seen order.
    pub fn documents_in_date_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();
        for version in self.versions_in_date_range(start, end) {
            for name in &version.document_names {
                if seen.insert(name.as_str()) {
                    names.push(name.clone());
                }
            }
        }
        names
    }

    /// Versions carrying at least one recorded issue.
    pub fn flagged(&self) -> impl Iterator<Item = &CorpusVersion> {
        self.versions.iter().filter(|v| !v.issues.is_empty())
    }
}

impl From<Timeline> for Vec<CorpusVersion> {
    fn from(timeline: Timeline) -> Self {
        timeline.versions
    }
}

impl TryFrom<Vec<CorpusVersion>> for Timeline {
    type Error = TimelineError;

    fn try_from(versions: Vec<CorpusVersion>) -> Result<Self, Self::Error> {
        Self::from_versions(versions)
    }
}

impl<'a> IntoIterator for &'a Timeline {
    type Item = &'a CorpusVersion;
    type IntoIter = std::slice::Iter<'a, CorpusVersion>;

    fn into_iter(self) -> Self::IntoIter {
        self.versions.iter()
    }
}

/// Turns a reverse-chronological commit list into a chronological timeline.
///
/// Sequence numbers run from 1 without gaps and every version is valid until the next one
/// starts; the most recent version stays open-ended.
pub fn build_timeline(commits: &[Commit]) -> TimelineResult<Timeline> {
    if commits.is_empty() {
        return Err(TimelineError::InsufficientData);
    }

    let chronological: Vec<&Commit> = commits.iter().rev().collect();
    let mut versions = Vec::with_capacity(chronological.len());

    for (position, commit) in chronological.iter().enumerate() {
        let mut version = CorpusVersion::new(commit, position as u32 + 1);
        version.date_until = chronological.get(position + 1).map(|next| next.committed_at);
        versions.push(version);
    }

    debug!("Added basic information of {} versions.", versions.len());
    Timeline::from_versions(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn commit(id: &str, year: i32, month: u32, day: u32) -> Commit {
        Commit {
            id: id.to_string(),
            committed_at: Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap(),
            tree_url: format!("https://api.github.com/repos/o/r/git/trees/{}", id),
        }
    }

    #[test]
    fn test_two_commit_scenario() {
        let commits = vec![commit("c2", 2021, 2, 1), commit("c1", 2021, 1, 1)];
        let timeline = build_timeline(&commits).unwrap();

        assert_eq!(timeline.len(), 2);
        let first = &timeline.versions()[0];
        assert_eq!(first.id, "c1");
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.date_from, Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(
            first.date_until,
            Some(Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap())
        );

        let second = &timeline.versions()[1];
        assert_eq!(second.id, "c2");
        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.date_until, None);
        assert_eq!(timeline.latest().unwrap().id, "c2");
    }

    #[test]
    fn test_sequence_numbers_and_dates_are_contiguous() {
        let commits: Vec<Commit> = (1..=12u32)
            .rev()
            .map(|month| commit(&format!("c{}", month), 2020, month, 15))
            .collect();
        let timeline = build_timeline(&commits).unwrap();

        let numbers: Vec<u32> = timeline.iter().map(|v| v.sequence_number).collect();
        assert_eq!(numbers, (1..=12).collect::<Vec<_>>());

        for pair in timeline.versions().windows(2) {
            assert_eq!(pair[0].date_until, Some(pair[1].date_from));
            assert_eq!(pair[0].sequence_number + 1, pair[1].sequence_number);
        }
        assert!(timeline.latest().unwrap().date_until.is_none());
    }

    #[test]
    fn test_empty_history_is_insufficient() {
        assert!(matches!(
            build_timeline(&[]),
            Err(TimelineError::InsufficientData)
        ));
    }

    #[test]
    fn test_duplicate_commits_are_rejected() {
        let commits = vec![commit("c1", 2021, 2, 1), commit("c1", 2021, 1, 1)];
        assert!(matches!(
            build_timeline(&commits),
            Err(TimelineError::DuplicateVersion(id)) if id == "c1"
        ));
    }

    #[test]
    fn test_lookup_by_id() {
        let commits = vec![
            commit("c3", 2021, 3, 1),
            commit("c2", 2021, 2, 1),
            commit("c1", 2021, 1, 1),
        ];
        let mut timeline = build_timeline(&commits).unwrap();

        assert_eq!(timeline.position("c2"), Some(1));
        assert_eq!(timeline.get("c3").unwrap().sequence_number, 3);
        assert!(timeline.get("missing").is_none());
        assert!(matches!(
            timeline.require("missing"),
            Err(TimelineError::VersionNotFound(_))
        ));

        timeline.get_mut("c2").unwrap().record_documents(
            FolderInfo {
                name: "tei".to_string(),
                url: "u".to_string(),
                used_fallback: false,
            },
            ["hamlet".to_string(), "lear".to_string()].into_iter().collect(),
            300,
        );
        let version = timeline.get("c2").unwrap();
        assert_eq!(version.document_count, 2);
        assert_eq!(version.document_count, version.document_names.len());
        assert_eq!(version.folder_name(), Some("tei"));
    }

    #[test]
    fn test_date_range_queries() {
        let commits = vec![
            commit("c3", 2021, 3, 1),
            commit("c2", 2021, 2, 1),
            commit("c1", 2021, 1, 1),
        ];
        let mut timeline = build_timeline(&commits).unwrap();
        let folder = FolderInfo {
            name: "tei".to_string(),
            url: "u".to_string(),
            used_fallback: false,
        };
        for (id, names) in [("c1", vec!["b", "a"]), ("c2", vec!["a", "c"]), ("c3", vec!["d"])] {
            timeline.get_mut(id).unwrap().record_documents(
                folder.clone(),
                names.into_iter().map(str::to_string).collect(),
                0,
            );
        }

        let start = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 2, 1, 0, 0, 0).unwrap();

        let ids: Vec<&str> = timeline
            .versions_in_date_range(start, end)
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert_eq!(timeline.documents_in_date_range(start, end), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_flagging_is_idempotent() {
        let mut version = CorpusVersion::new(&commit("c1", 2021, 1, 1), 1);
        let issue = VersionIssue::FolderNotFound {
            searched: vec!["tei".to_string(), "data".to_string()],
        };
        version.flag(issue.clone());
        version.flag(issue);
        assert_eq!(version.issues.len(), 1);
        assert_eq!(
            version.issues[0].to_string(),
            "no document folder found (searched tei, data)"
        );
    }

    #[test]
    fn test_serializes_as_ordered_list() {
        let commits = vec![commit("c2", 2021, 2, 1), commit("c1", 2021, 1, 1)];
        let timeline = build_timeline(&commits).unwrap();

        let json = serde_json::to_value(&timeline).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["id"], "c1");

        let restored: Timeline = serde_json::from_value(json).unwrap();
        assert_eq!(restored, timeline);
        assert_eq!(restored.position("c2"), Some(1));
    }
}
