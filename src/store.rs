//! Posting sources
//!
//! A source delivers every posting with its embedding. [`JsonPostingsSource`]
//! reads listing records from a JSON file and embeds the ones that do not carry
//! a precomputed vector. With an [`EmbeddingCache`] file attached, postings whose
//! text is unchanged since the last load reuse their stored vector.

use chrono::{DateTime, NaiveDate, Utc};
use placerank_core::{
    parse_deadline, Embedder, Error, Item, ItemAttributes, ItemId, Result, StipendRange, Vector,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Anything that can hand the engine its full set of postings
pub trait ItemSource {
    fn load(&self) -> Result<Vec<Item>>;
}

/// A listing field that may arrive as text or as a bare number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrNumber {
    Number(i64),
    Text(String),
}

/// Skills as a list or as one comma-separated string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SkillList {
    List(Vec<String>),
    Text(String),
}

impl Default for SkillList {
    fn default() -> Self {
        SkillList::List(Vec::new())
    }
}

impl SkillList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            SkillList::List(skills) => skills
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            SkillList::Text(text) => text
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// One posting as it appears in a listings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostingRecord {
    #[serde(alias = "id")]
    pub internship_id: ItemId,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "company")]
    pub organization: String,
    #[serde(default)]
    pub location: Option<String>,
    /// e.g. `"3 Months"`, `"6 Weeks"` or a number of months
    #[serde(default)]
    pub duration: Option<TextOrNumber>,
    /// e.g. `"Unpaid"`, `"5000-8000 /month"` or a number
    #[serde(default)]
    pub stipend: Option<TextOrNumber>,
    /// e.g. `"15-Oct-2025"`
    #[serde(default)]
    pub apply_by: Option<String>,
    #[serde(default)]
    pub posted_on: Option<String>,
    #[serde(default)]
    pub skills: SkillList,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub embedding: Option<Vector>,
}

impl PostingRecord {
    /// Text the embedder sees: title, organization, description and skills
    pub fn text(&self) -> String {
        let skills = self.skills.to_vec().join(", ");
        [
            self.title.as_str(),
            self.organization.as_str(),
            self.description.as_str(),
            skills.as_str(),
        ]
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Structured attributes. Postings without a parsable `posted_on` date are
    /// stamped with `loaded_at`.
    pub fn attributes(&self, loaded_at: DateTime<Utc>) -> ItemAttributes {
        let posted_at = match self.posted_on.as_deref() {
            Some(text) => parse_posted(text).unwrap_or_else(|| {
                warn!(id = %self.internship_id, posted_on = text, "unparsable posting date");
                loaded_at
            }),
            None => loaded_at,
        };

        let mut attributes = ItemAttributes::new(self.internship_id.clone(), posted_at)
            .with_title(self.title.trim(), self.organization.trim())
            .with_skills(self.skills.to_vec());
        attributes.location = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);
        attributes.stipend = self.stipend.as_ref().and_then(parse_stipend);
        attributes.duration_months = self.duration.as_ref().and_then(parse_duration_months);
        attributes.apply_by = self.apply_by.as_deref().and_then(|text| {
            let deadline = parse_deadline(text);
            if deadline.is_none() {
                warn!(id = %self.internship_id, apply_by = text, "unparsable deadline, treating as open");
            }
            deadline
        });
        attributes
    }

    /// Posting with its stored embedding, or one computed from [`PostingRecord::text`]
    pub fn into_item(self, embedder: &dyn Embedder, loaded_at: DateTime<Utc>) -> Result<Item> {
        let attributes = self.attributes(loaded_at);
        let embedding = match self.embedding {
            Some(embedding) => embedding,
            None => embedder.embed(&self.text())?,
        };
        Ok(Item::new(attributes, embedding))
    }
}

pub fn parse_stipend(value: &TextOrNumber) -> Option<StipendRange> {
    match value {
        TextOrNumber::Number(amount) if *amount >= 0 => Some(StipendRange::fixed(*amount)),
        TextOrNumber::Number(_) => None,
        TextOrNumber::Text(text) => StipendRange::parse(text),
    }
}

/// Months from `"3 Months"`, `"1 Month"` or `"6 Weeks"`; weeks round up to whole months
pub fn parse_duration_months(value: &TextOrNumber) -> Option<u32> {
    match value {
        TextOrNumber::Number(months) => u32::try_from(*months).ok().filter(|m| *m > 0),
        TextOrNumber::Text(text) => {
            let lowered = text.trim().to_lowercase();
            let mut parts = lowered.split_whitespace();
            let amount: u32 = parts.next()?.parse().ok()?;
            if amount == 0 {
                return None;
            }
            match parts.next() {
                Some(unit) if unit.starts_with("week") => Some(amount.div_ceil(4)),
                Some(unit) if unit.starts_with("month") => Some(amount),
                None => Some(amount),
                Some(_) => None,
            }
        }
    }
}

/// Posting dates start at midnight UTC
fn parse_posted(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%d-%b-%Y", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEmbedding {
    id: ItemId,
    text: String,
    embedding: Vector,
}

/// Embeddings from earlier loads, keyed by posting id.
///
/// An entry is reused only while the posting text and the embedding dimension
/// match, so edited postings are embedded again.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: BTreeMap<ItemId, CachedEmbedding>,
    dirty: bool,
}

impl EmbeddingCache {
    /// Read a cache file. A missing or unreadable file yields an empty cache.
    pub fn open(path: &Path) -> Self {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str::<Vec<CachedEmbedding>>(&raw) {
            Ok(entries) => Self {
                entries: entries.into_iter().map(|e| (e.id.clone(), e)).collect(),
                dirty: false,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupted embeddings cache, recreating");
                Self::default()
            }
        }
    }

    /// Write the cache back if anything changed since it was opened
    pub fn save(&mut self, path: &Path) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let entries: Vec<&CachedEmbedding> = self.entries.values().collect();
        fs::write(path, serde_json::to_vec(&entries)?)?;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &ItemId, text: &str, dim: usize) -> Option<&Vector> {
        self.entries
            .get(id)
            .filter(|entry| entry.text == text && entry.embedding.dim() == dim)
            .map(|entry| &entry.embedding)
    }

    pub fn insert(&mut self, id: ItemId, text: String, embedding: Vector) {
        self.entries.insert(
            id.clone(),
            CachedEmbedding {
                id,
                text,
                embedding,
            },
        );
        self.dirty = true;
    }

    /// Embedding for `text`, computed only on a cache miss. Returns the vector
    /// and whether the embedder ran.
    pub fn get_or_embed(
        &mut self,
        id: &ItemId,
        text: String,
        embedder: &dyn Embedder,
    ) -> Result<(Vector, bool)> {
        if let Some(embedding) = self.get(id, &text, embedder.dim()) {
            return Ok((embedding.clone(), false));
        }
        let embedding = embedder.embed(&text)?;
        self.insert(id.clone(), text, embedding.clone());
        Ok((embedding, true))
    }
}

/// Listings stored as a JSON array of [`PostingRecord`]s
pub struct JsonPostingsSource {
    path: PathBuf,
    embedder: Arc<dyn Embedder>,
    cache_path: Option<PathBuf>,
}

impl JsonPostingsSource {
    pub fn new<P: AsRef<Path>>(path: P, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            embedder,
            cache_path: None,
        }
    }

    /// Persist computed embeddings to `path` and reuse them on later loads
    pub fn with_cache<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> Result<Vec<PostingRecord>> {
        let raw = fs::read_to_string(&self.path)?;
        let records: Vec<PostingRecord> = serde_json::from_str(&raw)?;
        Ok(records)
    }
}

impl ItemSource for JsonPostingsSource {
    fn load(&self) -> Result<Vec<Item>> {
        let records = self.records()?;
        let loaded_at = Utc::now();
        let dim = self.embedder.dim();
        let mut cache = self.cache_path.as_deref().map(EmbeddingCache::open);

        let mut embedded = 0usize;
        let mut reused = 0usize;
        let mut items = Vec::with_capacity(records.len());
        for mut record in records {
            if record.embedding.is_none() {
                if let Some(cache) = cache.as_mut() {
                    let text = record.text();
                    let (embedding, computed) =
                        cache.get_or_embed(&record.internship_id, text, self.embedder.as_ref())?;
                    if computed {
                        embedded += 1;
                    } else {
                        reused += 1;
                    }
                    record.embedding = Some(embedding);
                } else {
                    embedded += 1;
                }
            }
            let item = record.into_item(self.embedder.as_ref(), loaded_at)?;
            if item.embedding.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: item.embedding.dim(),
                });
            }
            items.push(item);
        }

        if let (Some(cache), Some(path)) = (cache.as_mut(), self.cache_path.as_deref()) {
            if embedded > 0 {
                info!(path = %path.display(), embedded, reused, "updating embeddings cache");
            }
            cache.save(path)?;
        }
        debug!(
            path = %self.path.display(),
            items = items.len(),
            embedded,
            reused,
            "loaded postings"
        );
        Ok(items)
    }
}
