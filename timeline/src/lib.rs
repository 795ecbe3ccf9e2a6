pub mod checkpoint;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod history;
pub mod pipeline;
pub mod provenance;
pub mod resolver;
pub mod timeline;

#[cfg(test)]
mod testing;

pub use checkpoint::Checkpoint;
pub use config::EngineConfig;
pub use enrichment::{
    derive_new_documents, enrich, enrich_against, enrich_timeline, new_documents,
    renamed_files, version_introducing, versions_modifying_all_documents,
    versions_modifying_document, versions_renaming_documents, ChangeRecord, ChangeStatus,
    ChangeSummary, Introduction, RenamedFile, VersionLink,
};
pub use error::{TimelineError, TimelineResult};
pub use history::{commits_from_entries, Commit, CommitHistoryLoader};
pub use pipeline::{BuildOutcome, BuildReport, CorpusHistory, FlaggedVersion};
pub use provenance::{
    attach_distributions, distribution, rank_sources, source_key, year_range, year_ranges,
    CatalogSource, CorpusListing, ListedPlay, ListingFile, ProvenanceCatalog, RankingBasis,
    RemoteListing, SourceCount, SourceDistribution, SourceEntry, YearSpan, YearType,
};
pub use resolver::{
    apply_resolution, document_name, fetch_document_metadata, FolderResolution, ResolvedFolder,
    SizeChange, SizePoint, TreeResolver, TreeStore,
};
pub use timeline::{build_timeline, CorpusVersion, FolderInfo, Timeline, VersionIssue};
