//! Versioned vector index
//!
//! [`VectorIndex`] owns the currently installed [`IndexSnapshot`]. Readers clone
//! the snapshot pointer and search without holding any lock; writers are
//! serialized, build the next version from a copy of the current one and swap
//! it in. A search that overlaps a write sees either the old or the new
//! version, never a partially applied one.

use crate::embedder::DEFAULT_HASHING_DIM;
use crate::item::ItemId;
use crate::{Error, FlatIndex, HnswIndex, Result, Vector};
use ahash::AHashSet;
use ordered_float::OrderedFloat;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Score is cosine similarity in [-1, 1]. Stored vectors are unit length.
    Cosine,
    /// Score is `1 / (1 + l2)`, in (0, 1]
    Euclidean,
}

impl Metric {
    /// Distance used for graph traversal; smaller is closer
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::Cosine => 1.0 - crate::vector::dot(a, b),
            Metric::Euclidean => crate::vector::l2_distance(a, b),
        }
    }

    /// Raw similarity reported to callers; larger is better
    #[inline]
    pub fn score(self, distance: f32) -> f32 {
        match self {
            Metric::Cosine => (1.0 - distance).clamp(-1.0, 1.0),
            Metric::Euclidean => 1.0 / (1.0 + distance),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// Exact scan
    Flat,
    /// Approximate graph search
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Links per node on upper levels; level 0 keeps twice as many
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub max_level: usize,
    /// Seed for level assignment
    pub seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            max_level: 16,
            seed: 42,
        }
    }
}

/// Configuration for a vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub dim: usize,
    pub metric: Metric,
    pub backend: IndexBackend,
    pub hnsw: HnswConfig,
    /// Share of tombstoned slots that triggers a rebuild from live entries
    pub compaction_ratio: f32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dim: DEFAULT_HASHING_DIM,
            metric: Metric::Cosine,
            backend: IndexBackend::Hnsw,
            hnsw: HnswConfig::default(),
            compaction_ratio: 0.25,
        }
    }
}

impl IndexConfig {
    pub fn with_dim(dim: usize) -> Self {
        Self {
            dim,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::InvalidConfig("index dimension must be positive".to_string()));
        }
        if self.hnsw.m < 2 {
            return Err(Error::InvalidConfig("hnsw.m must be at least 2".to_string()));
        }
        if self.hnsw.ef_construction == 0 || self.hnsw.ef_search == 0 {
            return Err(Error::InvalidConfig(
                "hnsw ef values must be positive".to_string(),
            ));
        }
        if !(self.compaction_ratio > 0.0 && self.compaction_ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "compaction_ratio must be in (0, 1], got {}",
                self.compaction_ratio
            )));
        }
        Ok(())
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: ItemId,
    /// Raw similarity under the index metric
    pub score: f32,
}

/// Order best-first, ties by ascending id
pub(crate) fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_unstable_by(|a, b| {
        OrderedFloat(b.score)
            .cmp(&OrderedFloat(a.score))
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Nearest-neighbor structure behind a snapshot.
///
/// Vectors handed to implementations are already validated and, for cosine,
/// normalized. Implementations must return hits best-first with ties broken by
/// ascending id, never return removed ids, and only return fewer than `k` hits
/// when fewer than `k` live entries exist.
pub trait AnnIndex: Send + Sync + std::fmt::Debug {
    fn insert(&mut self, id: ItemId, vector: &[f32]);

    /// Logical delete. Returns false if the id was not live.
    fn remove(&mut self, id: &ItemId) -> bool;

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit>;

    fn contains(&self, id: &ItemId) -> bool;

    /// Stored (prepared) vector of a live entry
    fn vector(&self, id: &ItemId) -> Option<&[f32]>;

    /// Live entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tombstones(&self) -> usize;

    /// Live ids in insertion order
    fn ids(&self) -> Vec<ItemId>;

    /// A fresh structure holding only the live entries
    fn compact(&self) -> Box<dyn AnnIndex>;

    fn clone_box(&self) -> Box<dyn AnnIndex>;
}

/// Immutable view of the index at one version
#[derive(Debug)]
pub struct IndexSnapshot {
    version: u64,
    dim: usize,
    metric: Metric,
    inner: Box<dyn AnnIndex>,
}

impl IndexSnapshot {
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.inner.contains(id)
    }

    /// True when `id` is live and stores exactly `vector`
    pub fn holds(&self, id: &ItemId, vector: &Vector) -> bool {
        if vector.dim() != self.dim {
            return false;
        }
        match self.inner.vector(id) {
            Some(stored) => prepare(self.metric, vector.clone()).as_slice() == stored,
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.inner.ids()
    }

    /// Top-k live items for `query`, best-first
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>> {
        query.validate(self.dim)?;
        if k == 0 || self.inner.is_empty() {
            return Ok(Vec::new());
        }
        let query = prepare(self.metric, query.clone());
        Ok(self.inner.search(query.as_slice(), k))
    }
}

#[inline]
fn prepare(metric: Metric, vector: Vector) -> Vector {
    match metric {
        Metric::Cosine => vector.normalized(),
        Metric::Euclidean => vector,
    }
}

/// Searchable index of item embeddings with copy-on-write updates.
///
/// Readers take an `Arc` to the current [`IndexSnapshot`] and never block writers.
/// Each single-item write (`insert`, `replace`, `remove`) copies the whole backend,
/// HNSW graph included, before installing the next version, so it costs O(n) in
/// the number of slots. Load bulk changes with [`VectorIndex::build`], which
/// constructs one fresh backend for the entire set.
#[derive(Debug)]
pub struct VectorIndex {
    config: IndexConfig,
    current: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl VectorIndex {
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        let empty = IndexSnapshot {
            version: 0,
            dim: config.dim,
            metric: config.metric,
            inner: new_backend(&config),
        };
        Ok(Self {
            config,
            current: RwLock::new(Arc::new(empty)),
            writer: Mutex::new(()),
        })
    }

    #[inline]
    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.config.dim
    }

    /// The currently installed version
    #[inline]
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.snapshot().contains(id)
    }

    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<SearchHit>> {
        self.snapshot().search(query, k)
    }

    /// Replace the whole index. On error the previous version stays installed.
    pub fn build(&self, items: Vec<(ItemId, Vector)>) -> Result<()> {
        let dim = self.config.dim;
        let metric = self.config.metric;
        let _guard = self.writer.lock();

        let mut seen = AHashSet::with_capacity(items.len());
        for (id, _) in &items {
            if !seen.insert(id) {
                return Err(Error::DuplicateId(id.clone()));
            }
        }

        let prepared: Vec<(ItemId, Vector)> = items
            .into_par_iter()
            .map(|(id, vector)| {
                vector.validate(dim)?;
                Ok((id, prepare(metric, vector)))
            })
            .collect::<Result<_>>()?;

        let mut inner = new_backend(&self.config);
        for (id, vector) in prepared {
            inner.insert(id, vector.as_slice());
        }

        let version = self.current.read().version + 1;
        self.install(inner, version);
        Ok(())
    }

    /// Add one item. Fails if the id is already live.
    pub fn insert(&self, id: ItemId, vector: Vector) -> Result<()> {
        vector.validate(self.config.dim)?;
        let vector = prepare(self.config.metric, vector);

        let _guard = self.writer.lock();
        let current = self.snapshot();
        if current.contains(&id) {
            return Err(Error::DuplicateId(id));
        }
        let mut next = current.inner.clone_box();
        next.insert(id, vector.as_slice());
        self.install(next, current.version + 1);
        Ok(())
    }

    /// Update path for an existing item: tombstone the old vector and insert the new one
    /// in a single version. An identical vector installs nothing and returns false.
    pub fn replace(&self, id: ItemId, vector: Vector) -> Result<bool> {
        vector.validate(self.config.dim)?;
        let vector = prepare(self.config.metric, vector);

        let _guard = self.writer.lock();
        let current = self.snapshot();
        match current.inner.vector(&id) {
            None => return Err(Error::ItemNotFound(id)),
            Some(stored) if stored == vector.as_slice() => return Ok(false),
            Some(_) => {}
        }
        let mut next = current.inner.clone_box();
        next.remove(&id);
        next.insert(id, vector.as_slice());
        let next = self.maybe_compact(next);
        self.install(next, current.version + 1);
        Ok(true)
    }

    /// Logical delete. Returns false if the id was not live.
    pub fn remove(&self, id: &ItemId) -> bool {
        let _guard = self.writer.lock();
        let current = self.snapshot();
        if !current.contains(id) {
            return false;
        }
        let mut next = current.inner.clone_box();
        next.remove(id);
        let next = self.maybe_compact(next);
        self.install(next, current.version + 1);
        true
    }

    fn maybe_compact(&self, inner: Box<dyn AnnIndex>) -> Box<dyn AnnIndex> {
        let slots = inner.len() + inner.tombstones();
        if slots == 0 {
            return inner;
        }
        let ratio = inner.tombstones() as f32 / slots as f32;
        if ratio > self.config.compaction_ratio {
            debug!(
                tombstones = inner.tombstones(),
                live = inner.len(),
                "compacting vector index"
            );
            inner.compact()
        } else {
            inner
        }
    }

    /// Caller holds the writer lock
    fn install(&self, inner: Box<dyn AnnIndex>, version: u64) {
        let next = Arc::new(IndexSnapshot {
            version,
            dim: self.config.dim,
            metric: self.config.metric,
            inner,
        });
        debug!(version, live = next.len(), "installed index snapshot");
        *self.current.write() = next;
    }
}

fn new_backend(config: &IndexConfig) -> Box<dyn AnnIndex> {
    match config.backend {
        IndexBackend::Flat => Box::new(FlatIndex::new(config.dim, config.metric)),
        IndexBackend::Hnsw => Box::new(HnswIndex::new(
            config.dim,
            config.metric,
            config.hnsw.clone(),
        )),
    }
}
