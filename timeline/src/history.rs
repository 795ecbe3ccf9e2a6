//! Commit history loading
//!
//! Drives the transport across the paginated commit listing and the paginated detailed-commit
//! endpoint. Pages are fetched strictly one after another: `next` links are only known once the
//! previous page has arrived, and the quota is shared by every request.

use crate::error::{TimelineError, TimelineResult};
use chrono::{DateTime, Utc};
use remote::{
    ApiResponse, CommitListEntry, DetailedCommit, RepositoryRef, RequestTarget, Transport,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// A point in the remote revision history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub committed_at: DateTime<Utc>,
    pub tree_url: String,
}

impl Commit {
    pub fn from_entry(entry: &CommitListEntry) -> TimelineResult<Self> {
        let date = &entry.commit.committer.date;
        let committed_at = DateTime::parse_from_rfc3339(date)
            .map_err(|source| TimelineError::InvalidDate {
                commit: entry.sha.clone(),
                date: date.clone(),
                source,
            })?
            .with_timezone(&Utc);

        Ok(Self {
            id: entry.sha.clone(),
            committed_at,
            tree_url: entry.commit.tree.url.clone(),
        })
    }
}

/// Converts the raw listing, keeping its (reverse-chronological) order.
pub fn commits_from_entries(entries: &[CommitListEntry]) -> TimelineResult<Vec<Commit>> {
    entries.iter().map(Commit::from_entry).collect()
}

/// One fetched page together with whether it announced pagination at all.
struct Page<T> {
    content: T,
    had_link_header: bool,
}

pub struct CommitHistoryLoader<'a> {
    transport: &'a dyn Transport,
    repository: RepositoryRef,
    per_page: u32,
}

impl<'a> CommitHistoryLoader<'a> {
    pub fn new(transport: &'a dyn Transport, repository: RepositoryRef, per_page: u32) -> Self {
        Self {
            transport,
            repository,
            per_page,
        }
    }

    /// The complete commit list, most recent first. Always fetched from scratch.
    pub async fn load_commits(&self) -> TimelineResult<Vec<CommitListEntry>> {
        debug!("Fetching commits of {} from {}", self.repository, self.transport.provider_name());

        let start = RequestTarget::api(self.repository.commits_path(self.per_page));
        let pages: Vec<Page<Vec<CommitListEntry>>> = fetch_pages(self.transport, start).await?;

        let page_count = pages.len();
        let mut commits = Vec::new();
        for page in pages {
            if !page.had_link_header && page.content.len() == self.per_page as usize {
                warn!(
                    "Full page of {} commits but no pagination links, listing may be incomplete",
                    self.per_page
                );
            }
            commits.extend(page.content);
        }

        info!(
            "Fetched {} commits of {} in {} page(s)",
            commits.len(),
            self.repository,
            page_count
        );
        Ok(commits)
    }

    /// A single commit with its complete file list; multi-page responses are merged in page order.
    pub async fn load_detailed_commit(&self, sha: &str) -> TimelineResult<DetailedCommit> {
        let start = RequestTarget::api(self.repository.commit_path(sha));
        let pages: Vec<Page<DetailedCommit>> = fetch_pages(self.transport, start).await?;

        let mut pages = pages.into_iter().map(|page| page.content);
        let mut detailed = pages
            .next()
            .ok_or_else(|| TimelineError::VersionNotFound(sha.to_string()))?;
        for page in pages {
            detailed.files.extend(page.files);
        }

        debug!("Downloaded {} ({} files).", sha, detailed.files.len());
        Ok(detailed)
    }

    /// Fetches the detailed variant of every commit not already present in `known`.
    ///
    /// Returns how many commits were downloaded.
    pub async fn load_detailed_commits(
        &self,
        commits: &[Commit],
        known: &mut BTreeMap<String, DetailedCommit>,
    ) -> TimelineResult<usize> {
        let mut fetched = 0;
        for commit in commits {
            if known.contains_key(&commit.id) {
                continue;
            }
            let detailed = self.load_detailed_commit(&commit.id).await?;
            known.insert(commit.id.clone(), detailed);
            fetched += 1;
        }
        if fetched > 0 {
            info!("Downloaded {} detailed commits", fetched);
        }
        Ok(fetched)
    }
}

/// Follows `next` relations from `start` until a page has none.
///
/// A missing or malformed `Link` header ends the loop, as does a `next` URL that was already
/// visited.
async fn fetch_pages<T: DeserializeOwned>(
    transport: &dyn Transport,
    start: RequestTarget,
) -> TimelineResult<Vec<Page<T>>> {
    let mut pages = Vec::new();
    let mut visited = HashSet::new();
    let mut target = start;

    loop {
        visited.insert(target.resolve(transport.base_url()));
        debug!("Will get results from {}", target);

        let response: ApiResponse = transport.execute(&target).await?;
        let content: T = response.json()?;
        let links = response.links();
        let next = links
            .as_ref()
            .and_then(|links| links.next())
            .map(str::to_string);

        pages.push(Page {
            content,
            had_link_header: links.is_some(),
        });

        match next {
            Some(url) if visited.contains(&url) => {
                warn!("Pagination link points back to {}, stopping", url);
                break;
            }
            Some(url) => target = RequestTarget::url(url),
            None => {
                debug!("Nothing more to get");
                break;
            }
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{commit_json, MockTransport};
    use serde_json::json;

    fn repo() -> RepositoryRef {
        RepositoryRef::new("dracor-org", "gerdracor")
    }

    const LISTING: &str = "https://api.github.com/repos/dracor-org/gerdracor/commits?per_page=2";

    #[tokio::test]
    async fn test_single_page_without_link_header() {
        let transport = MockTransport::new();
        transport.route_json(
            LISTING,
            json!([
                commit_json("c2", "2021-02-01T00:00:00Z"),
                commit_json("c1", "2021-01-01T00:00:00Z")
            ]),
            None,
        );

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let commits = loader.load_commits().await.unwrap();

        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].sha, "c2");
        assert_eq!(commits[1].sha, "c1");
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        let transport = MockTransport::new();
        let page2 = "https://api.github.com/repositories/1/commits?per_page=2&page=2";
        let page3 = "https://api.github.com/repositories/1/commits?per_page=2&page=3";
        transport.route_json(
            LISTING,
            json!([
                commit_json("c5", "2021-05-01T00:00:00Z"),
                commit_json("c4", "2021-04-01T00:00:00Z")
            ]),
            Some(&format!("<{}>; rel=\"next\", <{}>; rel=\"last\"", page2, page3)),
        );
        transport.route_json(
            page2,
            json!([
                commit_json("c3", "2021-03-01T00:00:00Z"),
                commit_json("c2", "2021-02-01T00:00:00Z")
            ]),
            Some(&format!("<{}>; rel=\"next\", <{}>; rel=\"last\"", page3, page3)),
        );
        transport.route_json(
            page3,
            json!([commit_json("c1", "2021-01-01T00:00:00Z")]),
            Some(&format!("<{}>; rel=\"first\", <{}>; rel=\"prev\"", LISTING, page2)),
        );

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let commits = loader.load_commits().await.unwrap();

        let ids: Vec<&str> = commits.iter().map(|c| c.sha.as_str()).collect();
        assert_eq!(ids, vec!["c5", "c4", "c3", "c2", "c1"]);
        // ceil(5 / 2) pages
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_empty_repository() {
        let transport = MockTransport::new();
        transport.route_json(LISTING, json!([]), None);

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        assert!(loader.load_commits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_referencing_next_link_terminates() {
        let transport = MockTransport::new();
        transport.route_json(
            LISTING,
            json!([commit_json("c1", "2021-01-01T00:00:00Z")]),
            Some(&format!("<{}>; rel=\"next\"", LISTING)),
        );

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let commits = loader.load_commits().await.unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_error_status_propagates() {
        let transport = MockTransport::new();
        transport.route(LISTING, ApiResponse::new(LISTING, 404, "{\"message\":\"Not Found\"}"));

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let err = loader.load_commits().await.unwrap_err();
        assert!(matches!(
            err,
            TimelineError::Remote(remote::RemoteError::Status { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn test_detailed_commit_pages_are_merged() {
        let transport = MockTransport::new();
        let first = "https://api.github.com/repos/dracor-org/gerdracor/commits/c1";
        let second = "https://api.github.com/repositories/1/commits/c1?page=2";
        transport.route_json(
            first,
            json!({"sha": "c1", "files": [
                {"filename": "tei/a.xml", "status": "added"},
                {"filename": "tei/b.xml", "status": "added"}
            ]}),
            Some(&format!("<{}>; rel=\"next\", <{}>; rel=\"last\"", second, second)),
        );
        transport.route_json(
            second,
            json!({"sha": "c1", "files": [{"filename": "README.md", "status": "modified"}]}),
            Some(&format!("<{}>; rel=\"prev\", <{}>; rel=\"first\"", first, first)),
        );

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let detailed = loader.load_detailed_commit("c1").await.unwrap();

        let files: Vec<&str> = detailed.files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(files, vec!["tei/a.xml", "tei/b.xml", "README.md"]);
    }

    #[tokio::test]
    async fn test_detailed_commits_skip_known() {
        let transport = MockTransport::new();
        transport.route_json(
            "https://api.github.com/repos/dracor-org/gerdracor/commits/c2",
            json!({"sha": "c2", "files": []}),
            None,
        );

        let commits = commits_from_entries(&[
            serde_json::from_value(commit_json("c2", "2021-02-01T00:00:00Z")).unwrap(),
            serde_json::from_value(commit_json("c1", "2021-01-01T00:00:00Z")).unwrap(),
        ])
        .unwrap();

        let mut known = BTreeMap::new();
        known.insert(
            "c1".to_string(),
            DetailedCommit {
                sha: "c1".to_string(),
                files: vec![],
            },
        );

        let loader = CommitHistoryLoader::new(&transport, repo(), 2);
        let fetched = loader.load_detailed_commits(&commits, &mut known).await.unwrap();
        assert_eq!(fetched, 1);
        assert_eq!(known.len(), 2);
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_commit_from_entry_rejects_bad_dates() {
        let entry: CommitListEntry =
            serde_json::from_value(commit_json("c1", "first of january")).unwrap();
        assert!(matches!(
            Commit::from_entry(&entry),
            Err(TimelineError::InvalidDate { .. })
        ));
    }
}
