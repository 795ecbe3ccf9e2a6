use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use remote::GitHubClient;
use std::path::PathBuf;
use timeline::{
    fetch_document_metadata, rank_sources, renamed_files, version_introducing,
    versions_modifying_all_documents, versions_modifying_document, versions_renaming_documents,
    year_ranges, CatalogSource, Checkpoint, CorpusHistory, CorpusListing, EngineConfig,
    Introduction, ListingFile, RankingBasis, RemoteListing, Timeline, YearType,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "corpus-timeline")]
#[command(about = "Reconstructs the version history of a corpus from its GitHub repository")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TargetArgs {
    /// TOML file with engine settings; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Repository owner
    #[arg(long)]
    owner: Option<String>,
    /// Repository name, e.g. gerdracor
    #[arg(short, long)]
    repo: Option<String>,
    /// Directory holding checkpoint files
    #[arg(long, default_value = "tmp")]
    checkpoint_dir: PathBuf,
}

impl TargetArgs {
    fn engine_config(&self) -> Result<EngineConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_toml_file(path)?,
            None => EngineConfig::default(),
        };
        if let Some(owner) = &self.owner {
            config.owner = owner.clone();
        }
        if let Some(repo) = &self.repo {
            config.repository = repo.clone();
        }
        if config.checkpoint_dir.is_none() {
            config.checkpoint_dir = Some(self.checkpoint_dir.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Basis {
    Distributions,
    Catalog,
}

impl From<Basis> for RankingBasis {
    fn from(basis: Basis) -> Self {
        match basis {
            Basis::Distributions => RankingBasis::Distributions,
            Basis::Catalog => RankingBasis::Catalog,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Year {
    Normalized,
    Printed,
    Written,
    Premiered,
}

impl From<Year> for YearType {
    fn from(year: Year) -> Self {
        match year {
            Year::Normalized => YearType::Normalized,
            Year::Printed => YearType::Printed,
            Year::Written => YearType::Written,
            Year::Premiered => YearType::Premiered,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Download the history and build the enriched timeline
    Build {
        #[command(flatten)]
        target: TargetArgs,
        /// Folder holding the documents
        #[arg(short, long)]
        folder: Option<String>,
        /// GitHub personal access token
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Fail instead of waiting when the rate limit is exhausted
        #[arg(long)]
        no_wait: bool,
        /// Do not download detailed commits
        #[arg(long)]
        skip_details: bool,
        /// Corpus listing JSON used as provenance catalog
        #[arg(long)]
        catalog: Option<PathBuf>,
        /// Corpus API base URL to fetch the listing from, e.g. https://dracor.org/api/v1/
        #[arg(long)]
        catalog_api: Option<String>,
    },
    /// Print one line per version of a checkpointed timeline
    Summary {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the history of a single document
    Document {
        #[command(flatten)]
        target: TargetArgs,
        /// Document name without extension
        name: String,
        /// Also fetch the file metadata of the latest version
        #[arg(long)]
        metadata: bool,
        #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Rank the sources of the corpus documents
    Sources {
        #[command(flatten)]
        target: TargetArgs,
        /// Corpus listing JSON used as provenance catalog
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, value_enum, default_value = "distributions")]
        basis: Basis,
    },
    /// List renamed files and bulk modifications
    Renames {
        #[command(flatten)]
        target: TargetArgs,
        /// Versions to leave out
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Earliest and latest play year of every version
    Years {
        #[command(flatten)]
        target: TargetArgs,
        /// Corpus listing JSON holding the play years
        #[arg(long)]
        catalog: PathBuf,
        #[arg(long, value_enum, default_value = "normalized")]
        year: Year,
    },
    /// Versions and documents within a date range
    Range {
        #[command(flatten)]
        target: TargetArgs,
        /// Start of the range, RFC 3339
        #[arg(long)]
        from: DateTime<Utc>,
        /// End of the range, RFC 3339
        #[arg(long)]
        to: DateTime<Utc>,
    },
    /// Document files and sizes of one version
    Files {
        #[command(flatten)]
        target: TargetArgs,
        /// Version id (commit sha)
        version: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            target,
            folder,
            token,
            no_wait,
            skip_details,
            catalog,
            catalog_api,
        } => {
            let mut config = target.engine_config()?.with_fetch_details(!skip_details);
            if let Some(folder) = folder {
                config = config.with_preferred_folder(folder);
            }
            if let Some(token) = token {
                config = config.with_access_token(token);
            }
            if no_wait {
                config = config.with_wait_for_rate_limit_reset(false);
            }
            if let Some(path) = catalog {
                config = config.with_catalog_path(path);
            }
            if catalog_api.is_some() {
                config.catalog_api_base = catalog_api;
            }
            build(config).await?;
        }
        Commands::Summary { target } => {
            let config = target.engine_config()?;
            summary(&load_timeline(&config)?);
        }
        Commands::Document {
            target,
            name,
            metadata,
            token,
        } => {
            let mut config = target.engine_config()?;
            if let Some(token) = token {
                config = config.with_access_token(token);
            }
            document(&config, &name, metadata).await?;
        }
        Commands::Sources {
            target,
            catalog,
            basis,
        } => {
            let config = target.engine_config()?;
            let timeline = load_timeline(&config)?;
            let listing = CorpusListing::from_file(&catalog)?;
            for source in rank_sources(&timeline, &listing, basis.into()) {
                let rank = source
                    .rank
                    .map_or_else(|| "-".to_string(), |rank| rank.to_string());
                let latest = timeline
                    .latest()
                    .and_then(|v| source.play_counts_by_version.get(&v.sequence_number))
                    .copied()
                    .unwrap_or(0);
                println!("{:>3}  {:<40} {}", rank, source.display_name, latest);
            }
        }
        Commands::Renames { target, exclude } => {
            let config = target.engine_config()?;
            let checkpoint = load_checkpoint(&config)?;
            let timeline = checkpoint
                .versions
                .as_ref()
                .ok_or("checkpoint holds no timeline, run `build` first")?;
            for rename in renamed_files(timeline, &checkpoint.detailed_commits, &exclude) {
                println!(
                    "{}  {} -> {}",
                    rename.version,
                    rename.previous_filename.as_deref().unwrap_or("?"),
                    rename.new_filename
                );
            }
            println!(
                "Versions renaming documents: {}",
                versions_renaming_documents(timeline).join(", ")
            );
            println!(
                "Versions modifying all documents: {}",
                versions_modifying_all_documents(timeline).join(", ")
            );
        }
        Commands::Years {
            target,
            catalog,
            year,
        } => {
            let config = target.engine_config()?;
            let timeline = load_timeline(&config)?;
            let listing = ListingFile(catalog).load().await?;
            for span in year_ranges(&timeline, &listing, year.into()) {
                let show = |y: Option<i32>| y.map_or_else(|| "-".to_string(), |y| y.to_string());
                println!(
                    "{:<40}  {}  {:>5}  {:>5}",
                    span.version,
                    span.date_from.to_rfc3339(),
                    show(span.year_min),
                    show(span.year_max)
                );
            }
        }
        Commands::Range { target, from, to } => {
            let config = target.engine_config()?;
            let timeline = load_timeline(&config)?;
            for version in timeline.versions_in_date_range(from, to) {
                println!(
                    "{:>4}  {}  {}",
                    version.sequence_number,
                    version.id,
                    version.date_from.to_rfc3339()
                );
            }
            let documents = timeline.documents_in_date_range(from, to);
            println!("{} documents:", documents.len());
            for name in documents {
                println!("  {}", name);
            }
        }
        Commands::Files { target, version } => {
            let config = target.engine_config()?;
            let checkpoint = load_checkpoint(&config)?;
            let entries = checkpoint
                .folder_trees
                .entries(&version)
                .ok_or("no checkpointed folder tree for this version")?;
            for entry in &entries {
                println!("{:>10}  {}", entry.size_bytes, entry.path);
            }
            println!(
                "{} documents, {} bytes",
                entries.len(),
                entries.iter().map(|e| e.size_bytes).sum::<u64>()
            );
        }
    }

    Ok(())
}

async fn build(config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let client = GitHubClient::new(config.github_config())?;

    let source: Option<Box<dyn CatalogSource + '_>> =
        match (&config.catalog_path, config.catalog_url()) {
            (Some(path), _) => Some(Box::new(ListingFile(path.clone()))),
            (None, Some(url)) => Some(Box::new(RemoteListing::new(&client, url))),
            (None, None) => None,
        };
    let listing = match source {
        Some(source) => Some(source.load().await?),
        None => None,
    };

    let mut checkpoint = load_checkpoint(&config)?;
    let mut history = CorpusHistory::new(&client, config.clone());
    if let Some(listing) = &listing {
        history = history.with_catalog(listing);
    }

    let result = history.build(&mut checkpoint).await;
    save_checkpoint(&config, &checkpoint)?;

    match result {
        Ok(outcome) => {
            println!("{}", outcome.report);
            if let Some(latest) = outcome.timeline.latest() {
                info!(
                    "Latest version {} holds {} documents",
                    latest.id, latest.document_count
                );
            }
            Ok(())
        }
        Err(e) => {
            error!("Build failed, progress so far is checkpointed: {}", e);
            Err(e.into())
        }
    }
}

fn summary(timeline: &Timeline) {
    println!(
        "{:>4}  {:<40}  {:<25}  {:<6}  {:>5}  {:>5}  {:>10}",
        "seq", "version", "date", "folder", "docs", "new", "bytes"
    );
    for version in timeline {
        println!(
            "{:>4}  {:<40}  {:<25}  {:<6}  {:>5}  {:>5}  {:>10}{}",
            version.sequence_number,
            version.id,
            version.date_from.to_rfc3339(),
            version.folder_name().unwrap_or("-"),
            version.document_count,
            version.new_documents_count(),
            version.document_size_total,
            if version.issues.is_empty() { "" } else { "  !" }
        );
    }
}

async fn document(
    config: &EngineConfig,
    name: &str,
    metadata: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let checkpoint = load_checkpoint(config)?;
    let timeline = checkpoint
        .versions
        .as_ref()
        .ok_or("checkpoint holds no timeline, run `build` first")?;
    let repository = config.repository_ref();

    match version_introducing(timeline, name) {
        Introduction::Version(id) => println!(
            "{} was added in {}",
            name,
            repository.commit_html_url(&id)
        ),
        Introduction::ExistedFromStart => println!("{} is part of the corpus from the start", name),
        Introduction::NotFound => {
            println!("{} is not part of any version", name);
            return Ok(());
        }
    }

    println!("Size changes:");
    for change in checkpoint
        .folder_trees
        .document_size_changes(timeline, &repository, name)
    {
        println!("  {:>10}  {}", change.size, change.commit_url);
    }

    println!("Modified in:");
    for version in versions_modifying_document(timeline, &repository, name) {
        println!("  {}  {}", version.date_from.to_rfc3339(), version.commit_url);
    }

    if metadata {
        let latest = timeline
            .iter()
            .rev()
            .find(|v| v.contains_document(name))
            .ok_or("document missing from every version")?;
        let client = GitHubClient::new(config.github_config())?;
        let metadata = fetch_document_metadata(&client, &repository, latest, name, false).await?;
        println!("{}", serde_json::to_string_pretty(&metadata)?);
    }

    Ok(())
}

fn checkpoint_dir(config: &EngineConfig) -> PathBuf {
    config
        .checkpoint_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("tmp"))
}

fn load_checkpoint(config: &EngineConfig) -> Result<Checkpoint, Box<dyn std::error::Error>> {
    Ok(Checkpoint::load(
        &checkpoint_dir(config),
        config.checkpoint_prefix(),
    )?)
}

fn save_checkpoint(
    config: &EngineConfig,
    checkpoint: &Checkpoint,
) -> Result<(), Box<dyn std::error::Error>> {
    Ok(checkpoint.save(&checkpoint_dir(config), config.checkpoint_prefix())?)
}

fn load_timeline(config: &EngineConfig) -> Result<Timeline, Box<dyn std::error::Error>> {
    load_checkpoint(config)?
        .versions
        .ok_or_else(|| "checkpoint holds no timeline, run `build` first".into())
}
