//! End-to-end timeline build
//!
//! Runs the stages in order against a transport, reusing whatever an earlier run left in the
//! checkpoint. The checkpoint is updated in place as stages complete, so a failed build still
//! leaves behind everything fetched so far.

use crate::checkpoint::Checkpoint;
use crate::config::EngineConfig;
use crate::enrichment::{derive_new_documents, enrich_timeline};
use crate::error::{TimelineError, TimelineResult};
use crate::history::{Commit, CommitHistoryLoader};
use crate::provenance::{attach_distributions, ProvenanceCatalog};
use crate::resolver::{apply_resolution, FolderResolution, TreeResolver};
use crate::timeline::{build_timeline, Timeline, VersionIssue};
use remote::Transport;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedVersion {
    pub id: String,
    pub sequence_number: u32,
    pub issues: Vec<VersionIssue>,
}

/// What a build did and which versions need a closer look.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub versions: usize,
    pub commits_downloaded: bool,
    pub trees_resolved: usize,
    pub trees_reused: usize,
    pub detailed_commits_downloaded: usize,
    pub versions_enriched: usize,
    pub flagged: Vec<FlaggedVersion>,
}

impl BuildReport {
    pub fn is_clean(&self) -> bool {
        self.flagged.is_empty()
    }

    fn collect_flagged(&mut self, timeline: &Timeline) {
        self.flagged = timeline
            .flagged()
            .map(|version| FlaggedVersion {
                id: version.id.clone(),
                sequence_number: version.sequence_number,
                issues: version.issues.clone(),
            })
            .collect();
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} versions ({} trees resolved, {} reused, {} detailed commits fetched, {} enriched)",
            self.versions,
            self.trees_resolved,
            self.trees_reused,
            self.detailed_commits_downloaded,
            self.versions_enriched
        )?;
        for version in &self.flagged {
            let issues: Vec<String> = version.issues.iter().map(ToString::to_string).collect();
            writeln!(
                f,
                "  version {} ({}): {}",
                version.sequence_number,
                version.id,
                issues.join("; ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub timeline: Timeline,
    pub report: BuildReport,
}

pub struct CorpusHistory<'a> {
    transport: &'a dyn Transport,
    config: EngineConfig,
    catalog: Option<&'a dyn ProvenanceCatalog>,
}

impl<'a> CorpusHistory<'a> {
    pub fn new(transport: &'a dyn Transport, config: EngineConfig) -> Self {
        Self {
            transport,
            config,
            catalog: None,
        }
    }

    pub fn with_catalog(mut self, catalog: &'a dyn ProvenanceCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds the enriched timeline, updating `checkpoint` as stages complete.
    pub async fn build(&self, checkpoint: &mut Checkpoint) -> TimelineResult<BuildOutcome> {
        self.config
            .validate()
            .map_err(|message| TimelineError::InvalidConfig { message })?;

        let repository = self.config.repository_ref();
        let loader =
            CommitHistoryLoader::new(self.transport, repository.clone(), self.config.per_page);
        let mut report = BuildReport::default();

        info!(
            "Building corpus timeline of {}. This takes long for repositories with many commits.",
            repository
        );

        if checkpoint.commits.is_empty() {
            checkpoint.commits = loader.load_commits().await?;
            report.commits_downloaded = true;
            info!("Step 1: Downloaded {} commits.", checkpoint.commits.len());
        } else {
            info!("Step 1: Reusing {} checkpointed commits.", checkpoint.commits.len());
        }
        let commits = checkpoint.commit_list()?;

        let reusable = checkpoint
            .versions
            .as_ref()
            .is_some_and(|timeline| matches_commits(timeline, &commits));
        if !reusable {
            checkpoint.versions = Some(build_timeline(&commits)?);
        }
        let Some(timeline) = checkpoint.versions.as_mut() else {
            return Err(TimelineError::InsufficientData);
        };
        report.versions = timeline.len();
        info!("Step 2: Generated {} versions based on commits.", timeline.len());

        let tree_urls: HashMap<&str, &str> = commits
            .iter()
            .map(|commit| (commit.id.as_str(), commit.tree_url.as_str()))
            .collect();
        let resolver = TreeResolver::new(self.transport, &self.config.preferred_folder);
        for version in timeline.versions_mut() {
            if version.folder.is_some() && checkpoint.folder_trees.contains(&version.id) {
                report.trees_reused += 1;
                continue;
            }
            version.issues.retain(|issue| {
                !matches!(
                    issue,
                    VersionIssue::FolderNotFound { .. } | VersionIssue::TreeUnavailable { .. }
                )
            });

            let Some(tree_url) = tree_urls.get(version.id.as_str()) else {
                return Err(TimelineError::VersionNotFound(version.id.clone()));
            };
            debug!("Resolving documents of version {}", version.sequence_number);
            let resolution = resolver.resolve(&version.id, tree_url).await?;
            if let FolderResolution::Found(resolved) = &resolution {
                checkpoint
                    .folder_trees
                    .insert(version.id.clone(), resolved.tree.clone());
            }
            apply_resolution(version, &resolution);
            report.trees_resolved += 1;
        }
        info!(
            "Step 3: Added documents to versions ({} resolved, {} reused).",
            report.trees_resolved, report.trees_reused
        );

        for version in timeline.versions_mut() {
            version.new_documents = None;
        }
        let introducing = derive_new_documents(timeline);
        info!("Step 4: {} versions introduce new documents.", introducing);

        if self.config.fetch_details {
            report.detailed_commits_downloaded = loader
                .load_detailed_commits(&commits, &mut checkpoint.detailed_commits)
                .await?;
            for version in timeline.versions_mut() {
                version
                    .issues
                    .retain(|issue| *issue != VersionIssue::DetailsUnavailable);
            }
            report.versions_enriched = enrich_timeline(timeline, &checkpoint.detailed_commits)?;
            info!(
                "Step 5: Enriched {} versions with detailed commits.",
                report.versions_enriched
            );
        } else {
            info!("Step 5: Skipped detailed commits.");
        }

        match self.catalog {
            Some(catalog) => {
                attach_distributions(timeline, catalog);
                info!("Step 6: Added source distributions.");
            }
            None => debug!("Step 6: No provenance catalog, skipping source distributions."),
        }

        report.collect_flagged(timeline);
        if !report.is_clean() {
            warn!(
                "{} of {} versions are flagged",
                report.flagged.len(),
                report.versions
            );
        }

        Ok(BuildOutcome {
            timeline: timeline.clone(),
            report,
        })
    }
}

/// Whether a checkpointed timeline was built from exactly these commits.
fn matches_commits(timeline: &Timeline, commits: &[Commit]) -> bool {
    timeline.len() == commits.len()
        && timeline
            .iter()
            .zip(commits.iter().rev())
            .all(|(version, commit)| version.id == commit.id)
}
