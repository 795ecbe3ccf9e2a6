//! Source provenance of corpus documents
//!
//! A catalog maps document names to the name of the digital source a document was taken from.
//! Catalogs describe the current corpus, so documents that were renamed or dropped over time are
//! simply not found and are left out of the counts.
//!
//! The listing also carries the dates of each play, which give every version a span of years.

use crate::error::TimelineResult;
use crate::timeline::{CorpusVersion, Timeline};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use remote::{RequestTarget, Transport};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Read-only lookup of a document's source.
pub trait ProvenanceCatalog: Send + Sync {
    /// Display name of the source of document `name`.
    fn lookup(&self, name: &str) -> Option<&str>;

    /// Every source display name in catalog order, duplicates included.
    fn source_names(&self) -> Vec<&str>;

    /// Year of kind `year_type` recorded for document `name`.
    fn year(&self, _name: &str, _year_type: YearType) -> Option<i32> {
        None
    }
}

/// Anything that can hand out a catalog, e.g. a live corpus API.
#[async_trait]
pub trait CatalogSource {
    async fn load(&self) -> TimelineResult<CorpusListing>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaySource {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedPlay {
    pub name: String,
    #[serde(default)]
    pub source: Option<PlaySource>,
    #[serde(default, deserialize_with = "lenient_year", skip_serializing_if = "Option::is_none")]
    pub year_normalized: Option<i32>,
    #[serde(default, deserialize_with = "lenient_year", skip_serializing_if = "Option::is_none")]
    pub year_printed: Option<i32>,
    #[serde(default, deserialize_with = "lenient_year", skip_serializing_if = "Option::is_none")]
    pub year_written: Option<i32>,
    #[serde(default, deserialize_with = "lenient_year", skip_serializing_if = "Option::is_none")]
    pub year_premiered: Option<i32>,
}

impl ListedPlay {
    pub fn year(&self, year_type: YearType) -> Option<i32> {
        match year_type {
            YearType::Normalized => self.year_normalized,
            YearType::Printed => self.year_printed,
            YearType::Written => self.year_written,
            YearType::Premiered => self.year_premiered,
        }
    }
}

/// Years arrive as numbers, numeric strings, free text like `"1800/1801"` or null. Anything that
/// is not a whole number becomes `None`.
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let year = match value {
        Some(Value::Number(number)) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Some(Value::String(text)) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    Ok(year.and_then(|year| i32::try_from(year).ok()))
}

/// Which of a play's dates to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YearType {
    #[default]
    Normalized,
    Printed,
    Written,
    Premiered,
}

impl YearType {
    /// Field name in the corpus listing.
    pub fn listing_key(self) -> &'static str {
        match self {
            Self::Normalized => "yearNormalized",
            Self::Printed => "yearPrinted",
            Self::Written => "yearWritten",
            Self::Premiered => "yearPremiered",
        }
    }
}

/// The corpus listing shape `{ "plays": [ { "name", "source": { "name" } } ] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ListingWire", into = "ListingWire")]
pub struct CorpusListing {
    plays: Vec<ListedPlay>,
    index: HashMap<String, usize>,
}

#[derive(Serialize, Deserialize)]
struct ListingWire {
    #[serde(default)]
    plays: Vec<ListedPlay>,
}

impl From<ListingWire> for CorpusListing {
    fn from(wire: ListingWire) -> Self {
        Self::new(wire.plays)
    }
}

impl From<CorpusListing> for ListingWire {
    fn from(listing: CorpusListing) -> Self {
        Self {
            plays: listing.plays,
        }
    }
}

impl CorpusListing {
    pub fn new(plays: Vec<ListedPlay>) -> Self {
        let mut index = HashMap::with_capacity(plays.len());
        for (position, play) in plays.iter().enumerate() {
            index.entry(play.name.clone()).or_insert(position);
        }
        Self { plays, index }
    }

    pub fn from_json(json: &str) -> TimelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> TimelineResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let listing = Self::from_json(&content)?;
        debug!("Loaded {} plays from {}", listing.len(), path.display());
        Ok(listing)
    }

    /// Downloads the listing from a corpus API endpoint. Non-2xx responses fail with
    /// [`remote::RemoteError::Status`].
    pub async fn fetch(transport: &dyn Transport, url: &str) -> TimelineResult<Self> {
        let response = transport.execute(&RequestTarget::url(url)).await?;
        if !response.is_success() {
            warn!(
                "Fetching the corpus listing via {} failed with status {}",
                url, response.status
            );
        }
        let listing: Self = response.json()?;
        info!("Fetched {} plays from {}", listing.len(), url);
        Ok(listing)
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn plays(&self) -> &[ListedPlay] {
        &self.plays
    }

    pub fn play(&self, name: &str) -> Option<&ListedPlay> {
        self.index.get(name).map(|&position| &self.plays[position])
    }
}

impl ProvenanceCatalog for CorpusListing {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.play(name)?
            .source
            .as_ref()
            .and_then(|source| source.name.as_deref())
    }

    fn source_names(&self) -> Vec<&str> {
        self.plays
            .iter()
            .filter_map(|play| play.source.as_ref().and_then(|s| s.name.as_deref()))
            .collect()
    }

    fn year(&self, name: &str, year_type: YearType) -> Option<i32> {
        self.play(name)?.year(year_type)
    }
}

/// Loads a listing from a remote corpus API.
pub struct RemoteListing<'a> {
    pub transport: &'a dyn Transport,
    pub url: String,
}

impl<'a> RemoteListing<'a> {
    pub fn new(transport: &'a dyn Transport, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into(),
        }
    }
}

/// Reads a listing saved as JSON.
pub struct ListingFile(pub PathBuf);

#[async_trait]
impl CatalogSource for ListingFile {
    async fn load(&self) -> TimelineResult<CorpusListing> {
        CorpusListing::from_file(&self.0)
    }
}

#[async_trait]
impl CatalogSource for RemoteListing<'_> {
    async fn load(&self) -> TimelineResult<CorpusListing> {
        CorpusListing::fetch(self.transport, &self.url).await
    }
}

/// `"Wikisource: de"` becomes `"wikisource__de"`.
pub fn source_key(label: &str) -> String {
    label.to_lowercase().replace([' ', ':'], "_")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCount {
    pub key: String,
    pub display_name: String,
    pub play_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDistribution {
    pub version: String,
    pub date_from: DateTime<Utc>,
    pub document_count: usize,
    pub distinct_sources_count: usize,
    /// In the order each source was first met among the version's documents.
    pub sources: Vec<SourceCount>,
}

impl SourceDistribution {
    pub fn play_count(&self, key: &str) -> usize {
        self.sources
            .iter()
            .find(|source| source.key == key)
            .map_or(0, |source| source.play_count)
    }
}

pub fn distribution(
    version: &CorpusVersion,
    catalog: &dyn ProvenanceCatalog,
) -> SourceDistribution {
    let mut sources: Vec<SourceCount> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for name in &version.document_names {
        let Some(label) = catalog.lookup(name) else {
            continue;
        };
        let key = source_key(label);
        match positions.get(&key) {
            Some(&position) => sources[position].play_count += 1,
            None => {
                positions.insert(key.clone(), sources.len());
                sources.push(SourceCount {
                    key,
                    display_name: label.to_string(),
                    play_count: 1,
                });
            }
        }
    }

    SourceDistribution {
        version: version.id.clone(),
        date_from: version.date_from,
        document_count: version.document_count,
        distinct_sources_count: sources.len(),
        sources,
    }
}

pub fn attach_distributions(timeline: &mut Timeline, catalog: &dyn ProvenanceCatalog) {
    for version in timeline.versions_mut() {
        debug!("Generating source distribution of {}", version.id);
        version.source_distribution = Some(distribution(version, catalog));
    }
}

/// Earliest and latest year of kind `year_type` among the documents of `version`.
///
/// Documents the catalog does not know, or whose year is missing, are skipped. `None` when no
/// document has a year.
pub fn year_range(
    version: &CorpusVersion,
    catalog: &dyn ProvenanceCatalog,
    year_type: YearType,
) -> Option<(i32, i32)> {
    version
        .document_names
        .iter()
        .filter_map(|name| catalog.year(name, year_type))
        .fold(None, |range, year| match range {
            None => Some((year, year)),
            Some((min, max)) => Some((min.min(year), max.max(year))),
        })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSpan {
    pub version: String,
    pub date_from: DateTime<Utc>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
}

/// The year range of every version, oldest version first.
pub fn year_ranges(
    timeline: &Timeline,
    catalog: &dyn ProvenanceCatalog,
    year_type: YearType,
) -> Vec<YearSpan> {
    timeline
        .iter()
        .map(|version| {
            let range = year_range(version, catalog, year_type);
            YearSpan {
                version: version.id.clone(),
                date_from: version.date_from,
                year_min: range.map(|(min, _)| min),
                year_max: range.map(|(_, max)| max),
            }
        })
        .collect()
}

/// Where the set of distinct sources is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingBasis {
    /// Every source seen in any version's distribution.
    #[default]
    Distributions,
    /// Every source the catalog names, whether or not a version contains it.
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEntry {
    pub key: String,
    pub display_name: String,
    /// `None` for sources without documents in the latest version.
    pub rank: Option<u32>,
    pub play_counts_by_version: BTreeMap<u32, usize>,
}

/// Distinct sources ranked by their play count in the latest version.
///
/// Ties keep first-seen order. Sources absent from the latest version come last, unranked.
pub fn rank_sources(
    timeline: &Timeline,
    catalog: &dyn ProvenanceCatalog,
    basis: RankingBasis,
) -> Vec<SourceEntry> {
    let distributions: Vec<SourceDistribution> = timeline
        .iter()
        .map(|version| {
            version
                .source_distribution
                .clone()
                .unwrap_or_else(|| distribution(version, catalog))
        })
        .collect();

    let mut entries: Vec<SourceEntry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut add = |key: String, display_name: &str| {
        if !positions.contains_key(&key) {
            positions.insert(key.clone(), entries.len());
            entries.push(SourceEntry {
                key,
                display_name: display_name.to_string(),
                rank: None,
                play_counts_by_version: BTreeMap::new(),
            });
        }
    };

    match basis {
        RankingBasis::Distributions => {
            for dist in &distributions {
                for source in &dist.sources {
                    add(source.key.clone(), &source.display_name);
                }
            }
        }
        RankingBasis::Catalog => {
            for name in catalog.source_names() {
                add(source_key(name), name);
            }
        }
    }

    for (version, dist) in timeline.iter().zip(&distributions) {
        for source in &dist.sources {
            if let Some(&position) = positions.get(&source.key) {
                entries[position]
                    .play_counts_by_version
                    .insert(version.sequence_number, source.play_count);
            }
        }
    }

    let latest_counts = distributions.last();
    let latest = |entry: &SourceEntry| latest_counts.map_or(0, |dist| dist.play_count(&entry.key));
    entries.sort_by(|a, b| latest(b).cmp(&latest(a)));

    let mut rank = 0;
    for entry in &mut entries {
        if latest(&*entry) > 0 {
            rank += 1;
            entry.rank = Some(rank);
        }
    }

    debug!("Ranked {} distinct sources", entries.len());
    entries
}
