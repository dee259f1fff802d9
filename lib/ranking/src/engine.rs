use crate::adjuster::{BoosterWeights, ScoreAdjuster};
use crate::config::EngineConfig;
use crate::explain::{MatchQuality, RankStats, RankedItem, Ranking};
use crate::query::Query;
use ahash::AHashSet;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use placerank_core::{
    Error, Item, ItemAttributes, ItemCatalog, ItemId, Result, SearchHit, Vector, VectorIndex,
};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Disagreements between the index and the catalog
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Indexed ids with no catalog entry
    pub dangling: Vec<ItemId>,
    /// Catalog ids with no embedding; these can never be retrieved
    pub unindexed: Vec<ItemId>,
}

impl IntegrityReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty()
    }

    /// Error for the first dangling embedding, if any
    pub fn ensure_consistent(&self) -> Result<()> {
        match self.dangling.first() {
            Some(id) => Err(Error::DanglingEmbedding(id.clone())),
            None => Ok(()),
        }
    }
}

/// Retrieval, join, filtering and scoring over one vector index and one catalog.
///
/// `rank` is read-only and runs concurrently with other calls. Mutations are
/// serialized; an upsert writes the catalog before the index and a removal
/// clears the index before the catalog. A ranking works from one index snapshot,
/// so it can still see an id whose catalog entry a later write has dropped. Such
/// ids are excluded from the results, and counted as integrity faults only if the
/// current index still holds them once writes have settled.
#[derive(Debug)]
pub struct RankingEngine {
    config: EngineConfig,
    index: VectorIndex,
    catalog: ItemCatalog,
    adjuster: ScoreAdjuster,
    writer: Mutex<()>,
}

impl RankingEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let adjuster = ScoreAdjuster::new(&config.scoring)?;
        Self::with_adjuster(config, adjuster)
    }

    /// Engine with a caller-supplied booster set
    pub fn with_adjuster(config: EngineConfig, adjuster: ScoreAdjuster) -> Result<Self> {
        config.validate()?;
        let index = VectorIndex::new(config.index.clone())?;
        Ok(Self {
            config,
            index,
            catalog: ItemCatalog::new(),
            adjuster,
            writer: Mutex::new(()),
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    #[inline]
    pub fn catalog(&self) -> &ItemCatalog {
        &self.catalog
    }

    #[inline]
    pub fn adjuster(&self) -> &ScoreAdjuster {
        &self.adjuster
    }

    /// Number of indexed items
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn get(&self, id: &ItemId) -> Option<Arc<ItemAttributes>> {
        self.catalog.get(id)
    }

    /// Rank against the current time
    pub fn rank(&self, query: &Query, top_n: usize, over_fetch_k: Option<usize>) -> Result<Ranking> {
        self.rank_at(query, top_n, over_fetch_k, Utc::now())
    }

    /// Top `top_n` postings for `query`, with expiry judged against `now`.
    ///
    /// Fewer than `top_n` results is not an error. When filtering leaves too few
    /// survivors and the index holds more items than were fetched, the fetch size
    /// doubles for up to `retrieval.max_attempts` rounds.
    pub fn rank_at(
        &self,
        query: &Query,
        top_n: usize,
        over_fetch_k: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Ranking> {
        query.validate(self.index.dim())?;
        let weights = self.adjuster.resolve_weights(&query.weight_overrides)?;
        let mut k = match over_fetch_k {
            Some(k) if k < top_n => {
                return Err(Error::InvalidQuery(format!(
                    "over_fetch_k ({}) must be at least top_n ({})",
                    k, top_n
                )));
            }
            Some(k) => k,
            None => self.config.retrieval.default_over_fetch(top_n),
        };

        let snapshot = self.index.snapshot();
        let mut stats = RankStats {
            snapshot_version: snapshot.version(),
            ..RankStats::default()
        };
        if top_n == 0 || snapshot.is_empty() {
            return Ok(self.finish(Vec::new(), weights, stats));
        }

        let max_attempts = self.config.retrieval.max_attempts;
        let mut faults = BTreeSet::new();
        let mut scored;
        loop {
            stats.rounds += 1;
            let hits = snapshot.search(&query.embedding, k)?;
            let fetched = hits.len();

            let lookup = self.catalog.batch_get(hits.iter().map(|hit| &hit.id));
            faults.extend(lookup.missing.iter().cloned());
            let joined: Vec<(SearchHit, Arc<ItemAttributes>)> = hits
                .into_iter()
                .filter_map(|hit| {
                    let item = lookup.found.get(&hit.id)?.clone();
                    Some((hit, item))
                })
                .collect();

            let (expired, fresh): (Vec<_>, Vec<_>) =
                joined.into_iter().partition(|(_, item)| item.is_expired(now));
            stats.candidates_fetched = fetched;
            stats.expired_filtered = expired.len();

            scored = self.score(fresh, query, &weights, now);

            let exhausted = fetched < k || k >= snapshot.len();
            if scored.len() >= top_n || exhausted || stats.rounds >= max_attempts {
                break;
            }
            debug!(
                round = stats.rounds,
                fetched,
                survivors = scored.len(),
                top_n,
                "too few survivors, widening retrieval"
            );
            k = k.saturating_mul(2);
        }

        if !faults.is_empty() {
            stats.integrity_faults = self.confirm_faults(faults);
        }

        sort_ranked(&mut scored);
        scored.truncate(top_n);
        Ok(self.finish(scored, weights, stats))
    }

    /// Keep the suspects that the current index still holds without a catalog entry.
    /// The rest were removed after the ranking took its snapshot.
    fn confirm_faults(&self, suspects: BTreeSet<ItemId>) -> Vec<ItemId> {
        let _guard = self.writer.lock();
        suspects
            .into_iter()
            .filter(|id| {
                if self.index.contains(id) && !self.catalog.contains(id) {
                    warn!(id = %id, "indexed item has no catalog entry, excluded from ranking");
                    true
                } else {
                    debug!(id = %id, "item removed during ranking, excluded");
                    false
                }
            })
            .collect()
    }

    fn score(
        &self,
        candidates: Vec<(SearchHit, Arc<ItemAttributes>)>,
        query: &Query,
        weights: &BoosterWeights,
        now: DateTime<Utc>,
    ) -> Vec<RankedItem> {
        candidates
            .into_par_iter()
            .map(|(hit, item)| {
                let adjustment = self.adjuster.compute(hit.score, &item, query, weights, now);
                RankedItem {
                    id: hit.id,
                    final_score: adjustment.final_score,
                    raw_similarity: hit.score,
                    contributions: adjustment.contributions,
                    item,
                }
            })
            .collect()
    }

    fn finish(
        &self,
        results: Vec<RankedItem>,
        weights: BoosterWeights,
        mut stats: RankStats,
    ) -> Ranking {
        stats.best_score = results.first().map(|r| r.final_score);
        if !results.is_empty() {
            let total: f32 = results.iter().map(|r| r.final_score).sum();
            stats.avg_score = Some(total / results.len() as f32);
        }
        let quality = MatchQuality::classify(stats.best_score, &self.config.quality);
        Ranking {
            results,
            quality,
            weights,
            stats,
        }
    }

    /// Insert or update one posting. Returns the catalog version now stored.
    ///
    /// Re-upserting an unchanged posting writes nothing. A changed embedding alone
    /// still bumps the version.
    pub fn upsert(&self, item: Item) -> Result<u64> {
        item.validate(self.index.dim())?;
        let (id, vector, attributes) = item.into_parts();

        let _guard = self.writer.lock();
        if self.index.contains(&id) {
            let embedding_changed = self.index.replace(id, vector)?;
            return Ok(self.catalog.upsert_revision(attributes, embedding_changed));
        }
        let version = self.catalog.upsert(attributes);
        self.index.insert(id, vector)?;
        Ok(version)
    }

    /// Remove a posting from both the index and the catalog.
    /// Returns false if neither held it.
    pub fn remove(&self, id: &ItemId) -> bool {
        let _guard = self.writer.lock();
        let indexed = self.index.remove(id);
        let cataloged = self.catalog.remove(id).is_some();
        indexed || cataloged
    }

    /// Replace every posting. Input is validated up front; on error nothing changes.
    pub fn rebuild(&self, items: Vec<Item>) -> Result<()> {
        let dim = self.index.dim();
        let mut keep = AHashSet::with_capacity(items.len());
        for item in &items {
            if !keep.insert(item.id().clone()) {
                return Err(Error::DuplicateId(item.id().clone()));
            }
        }
        items.par_iter().try_for_each(|item| item.validate(dim))?;

        let _guard = self.writer.lock();
        let previous = self.index.snapshot();
        let mut vectors: Vec<(ItemId, Vector)> = Vec::with_capacity(items.len());
        for item in items {
            let (id, vector, attributes) = item.into_parts();
            let embedding_changed = previous.contains(&id) && !previous.holds(&id, &vector);
            self.catalog.upsert_revision(attributes, embedding_changed);
            vectors.push((id, vector));
        }
        let count = vectors.len();
        self.index.build(vectors)?;
        let pruned = self.catalog.retain(|id| keep.contains(id));
        info!(items = count, pruned, version = self.index.version(), "rebuilt ranking engine");
        Ok(())
    }

    /// Compare the current index snapshot with the catalog
    pub fn check_integrity(&self) -> IntegrityReport {
        let snapshot = self.index.snapshot();
        let indexed = snapshot.ids();
        let lookup = self.catalog.batch_get(&indexed);

        let indexed: AHashSet<ItemId> = indexed.into_iter().collect();
        let mut dangling = lookup.missing;
        dangling.sort();
        let unindexed: Vec<ItemId> = self
            .catalog
            .ids()
            .into_iter()
            .filter(|id| !indexed.contains(id))
            .collect();

        if !dangling.is_empty() {
            warn!(count = dangling.len(), "index holds embeddings without catalog entries");
        }
        IntegrityReport {
            dangling,
            unindexed,
        }
    }
}

/// Best-first by final score, ties by ascending id
fn sort_ranked(results: &mut [RankedItem]) {
    results.sort_unstable_by(|a, b| {
        OrderedFloat(b.final_score)
            .cmp(&OrderedFloat(a.final_score))
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boosters::{LOCATION, SKILLS};
    use chrono::{Duration, TimeZone};
    use placerank_core::{ErrorKind, IndexBackend};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 1, 0, 0, 0).unwrap()
    }

    fn engine(dim: usize) -> RankingEngine {
        RankingEngine::new(EngineConfig::with_dim(dim)).unwrap()
    }

    fn flat_engine(dim: usize) -> RankingEngine {
        let mut config = EngineConfig::with_dim(dim);
        config.index.backend = IndexBackend::Flat;
        RankingEngine::new(config).unwrap()
    }

    fn posting(id: u64, embedding: Vec<f32>) -> Item {
        Item::new(ItemAttributes::new(id, now() - Duration::days(1)), Vector::new(embedding))
    }

    #[test]
    fn test_boosters_separate_equal_similarity() {
        let engine = engine(3);
        let a = ItemAttributes::new(1u64, now() - Duration::days(5))
            .with_location("NYC")
            .with_stipend(500, 1000)
            .with_skills(["python", "sql"]);
        let b = ItemAttributes::new(2u64, now() - Duration::days(40))
            .with_location("Remote")
            .with_stipend(0, 200)
            .with_skills(["java"]);
        engine.upsert(Item::new(a, Vector::new(vec![1.0, 0.0, 0.0]))).unwrap();
        engine.upsert(Item::new(b, Vector::new(vec![1.0, 0.0, 0.0]))).unwrap();

        let query = Query::new(Vector::new(vec![1.0, 0.0, 0.0]))
            .with_location("NYC")
            .with_skills(["python"])
            .with_stipend(400, 900);
        let ranking = engine.rank_at(&query, 2, None, now()).unwrap();

        assert_eq!(ranking.ids(), vec![ItemId::from(1), ItemId::from(2)]);
        let (first, second) = (&ranking.results[0], &ranking.results[1]);
        assert!(first.final_score > second.final_score);
        assert!(first.contributions[LOCATION] > second.contributions[LOCATION]);
        assert!(first.contributions[SKILLS] > second.contributions[SKILLS]);
        assert_eq!(ranking.quality, MatchQuality::Results);
        assert!(ranking.stats.integrity_faults.is_empty());
    }

    #[test]
    fn test_rank_is_deterministic() {
        let engine = engine(4);
        for i in 0..40u64 {
            let x = (i % 7) as f32;
            let item = posting(i, vec![1.0, x, 0.5, (i % 3) as f32]);
            engine.upsert(item).unwrap();
        }
        let query = Query::new(Vector::new(vec![1.0, 2.0, 0.5, 1.0])).with_skills(["rust"]);
        let first = engine.rank_at(&query, 10, None, now()).unwrap();
        let second = engine.rank_at(&query, 10, None, now()).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.len(), 10);

        // Equal embeddings tie on every score, so ids decide
        let scores: Vec<f32> = first.results.iter().map(|r| r.final_score).collect();
        for pair in first.results.windows(2) {
            if pair[0].final_score == pair[1].final_score {
                assert!(pair[0].id < pair[1].id);
            }
        }
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_expired_items_never_returned() {
        let engine = engine(2);
        let expired = ItemAttributes::new(1u64, now() - Duration::days(3))
            .with_apply_by(now() - Duration::seconds(1));
        let due_now = ItemAttributes::new(2u64, now() - Duration::days(3)).with_apply_by(now());
        engine.upsert(Item::new(expired, Vector::new(vec![1.0, 0.0]))).unwrap();
        engine.upsert(Item::new(due_now, Vector::new(vec![0.9, 0.1]))).unwrap();
        engine.upsert(posting(3, vec![0.0, 1.0])).unwrap();

        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![1.0, 0.0])), 3, None, now())
            .unwrap();
        assert_eq!(ranking.ids(), vec![ItemId::from(2), ItemId::from(3)]);
        assert_eq!(ranking.stats.expired_filtered, 1);
    }

    #[test]
    fn test_dangling_embedding_is_excluded_and_reported() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![0.8, 0.2])).unwrap();
        engine
            .index()
            .insert(ItemId::from(99), Vector::new(vec![1.0, 0.0]))
            .unwrap();

        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![1.0, 0.0])), 5, None, now())
            .unwrap();
        assert_eq!(ranking.ids(), vec![ItemId::from(1)]);
        assert_eq!(ranking.stats.integrity_faults, vec![ItemId::from(99)]);

        let report = engine.check_integrity();
        assert_eq!(report.dangling, vec![ItemId::from(99)]);
        assert!(!report.is_consistent());
        let err = report.ensure_consistent().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataIntegrity);
    }

    #[test]
    fn test_unindexed_catalog_entries_reported() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![1.0, 0.0])).unwrap();
        engine
            .catalog()
            .upsert(ItemAttributes::new(5u64, now()));
        let report = engine.check_integrity();
        assert!(report.is_consistent());
        assert_eq!(report.unindexed, vec![ItemId::from(5)]);
    }

    #[test]
    fn test_widens_retrieval_when_filter_leaves_too_few() {
        let engine = flat_engine(2);
        for i in 0..12u64 {
            let attributes = ItemAttributes::new(i, now() - Duration::days(2))
                .with_apply_by(now() - Duration::days(1));
            let embedding = vec![1.0, 0.001 * i as f32];
            engine.upsert(Item::new(attributes, Vector::new(embedding))).unwrap();
        }
        for i in 100..110u64 {
            engine.upsert(posting(i, vec![0.5, 1.0])).unwrap();
        }

        let query = Query::new(Vector::new(vec![1.0, 0.0]));
        let ranking = engine.rank_at(&query, 5, Some(5), now()).unwrap();
        assert_eq!(ranking.len(), 5);
        assert_eq!(ranking.stats.rounds, 3);
        assert_eq!(
            ranking.ids(),
            (100..105u64).map(ItemId::from).collect::<Vec<_>>()
        );

        // One round is not enough and a short result is still a success
        let mut config = EngineConfig::with_dim(2);
        config.index.backend = IndexBackend::Flat;
        config.retrieval.max_attempts = 1;
        let single = RankingEngine::new(config).unwrap();
        for i in 0..12u64 {
            let attributes = ItemAttributes::new(i, now() - Duration::days(2))
                .with_apply_by(now() - Duration::days(1));
            single
                .upsert(Item::new(attributes, Vector::new(vec![1.0, 0.001 * i as f32])))
                .unwrap();
        }
        let short = single.rank_at(&query, 5, Some(5), now()).unwrap();
        assert!(short.is_empty());
        assert_eq!(short.stats.rounds, 1);
    }

    #[test]
    fn test_short_index_returns_everything() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![1.0, 0.0])).unwrap();
        engine.upsert(posting(2, vec![0.0, 1.0])).unwrap();
        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![1.0, 0.0])), 10, None, now())
            .unwrap();
        assert_eq!(ranking.len(), 2);
        assert_eq!(ranking.stats.rounds, 1);
    }

    #[test]
    fn test_empty_index_is_not_an_error() {
        let engine = engine(3);
        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![0.0, 1.0, 0.0])), 5, None, now())
            .unwrap();
        assert!(ranking.is_empty());
        assert_eq!(ranking.quality, MatchQuality::NoResults);
        assert_eq!(ranking.stats.rounds, 0);
    }

    #[test]
    fn test_invalid_queries_rejected() {
        let engine = engine(3);
        engine.upsert(posting(1, vec![1.0, 0.0, 0.0])).unwrap();

        let wrong_dim = Query::new(Vector::new(vec![1.0, 0.0]));
        assert!(matches!(
            engine.rank_at(&wrong_dim, 5, None, now()),
            Err(Error::InvalidDimension { expected: 3, actual: 2 })
        ));

        let query = Query::new(Vector::new(vec![1.0, 0.0, 0.0]));
        let err = engine.rank_at(&query, 5, Some(3), now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let unknown = query.clone().with_weight("popularity", 0.3);
        let err = engine.rank_at(&unknown, 5, None, now()).unwrap_err();
        assert!(matches!(err, Error::UnknownBooster(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let negative = query.with_weight(LOCATION, -0.5);
        assert!(engine.rank_at(&negative, 5, None, now()).is_err());
    }

    #[test]
    fn test_weight_override_changes_order() {
        let engine = engine(2);
        let near = ItemAttributes::new(1u64, now()).with_location("Remote");
        let far = ItemAttributes::new(2u64, now()).with_location("Pune");
        engine.upsert(Item::new(near, Vector::new(vec![1.0, 0.0]))).unwrap();
        engine.upsert(Item::new(far, Vector::new(vec![0.8, 0.6]))).unwrap();

        let query = Query::new(Vector::new(vec![1.0, 0.0])).with_location("Pune");
        let default = engine.rank_at(&query, 2, None, now()).unwrap();
        assert_eq!(default.results[0].id, ItemId::from(1));

        let boosted = query.with_weight(LOCATION, 1.0);
        let ranking = engine.rank_at(&boosted, 2, None, now()).unwrap();
        assert_eq!(ranking.results[0].id, ItemId::from(2));
        assert_eq!(ranking.weights.get(LOCATION), 1.0);
    }

    #[test]
    fn test_upsert_updates_in_place() {
        let engine = engine(2);
        let first = ItemAttributes::new(1u64, now()).with_location("NYC");
        assert_eq!(engine.upsert(Item::new(first.clone(), Vector::new(vec![1.0, 0.0]))).unwrap(), 0);
        assert_eq!(engine.upsert(Item::new(first, Vector::new(vec![1.0, 0.0]))).unwrap(), 0);

        let moved = ItemAttributes::new(1u64, now()).with_location("Remote");
        assert_eq!(engine.upsert(Item::new(moved, Vector::new(vec![0.0, 1.0]))).unwrap(), 1);
        assert_eq!(engine.len(), 1);
        assert_eq!(
            engine.get(&ItemId::from(1)).unwrap().location.as_deref(),
            Some("Remote")
        );

        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![0.0, 1.0])), 1, None, now())
            .unwrap();
        assert!((ranking.results[0].raw_similarity - 1.0).abs() < 1e-5);

        let bad = Item::new(ItemAttributes::new(2u64, now()), Vector::new(vec![1.0]));
        assert!(engine.upsert(bad).is_err());
        assert!(engine.get(&ItemId::from(2)).is_none());
    }

    #[test]
    fn test_remove() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![1.0, 0.0])).unwrap();
        engine.upsert(posting(2, vec![0.0, 1.0])).unwrap();
        assert!(engine.remove(&ItemId::from(1)));
        assert!(!engine.remove(&ItemId::from(1)));
        assert!(engine.get(&ItemId::from(1)).is_none());

        let ranking = engine
            .rank_at(&Query::new(Vector::new(vec![1.0, 0.0])), 5, None, now())
            .unwrap();
        assert_eq!(ranking.ids(), vec![ItemId::from(2)]);
    }

    #[test]
    fn test_rebuild_replaces_everything() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![1.0, 0.0])).unwrap();
        engine.upsert(posting(2, vec![0.0, 1.0])).unwrap();

        engine
            .rebuild(vec![posting(2, vec![0.5, 0.5]), posting(3, vec![1.0, 0.0])])
            .unwrap();
        assert_eq!(engine.len(), 2);
        assert!(engine.get(&ItemId::from(1)).is_none());
        assert_eq!(engine.catalog().ids(), vec![ItemId::from(2), ItemId::from(3)]);
        assert!(engine.check_integrity().is_consistent());
        assert!(engine.check_integrity().unindexed.is_empty());
    }

    #[test]
    fn test_rebuild_rejects_bad_input_without_changes() {
        let engine = engine(2);
        engine.upsert(posting(1, vec![1.0, 0.0])).unwrap();
        let version = engine.index().version();

        let duplicate = engine.rebuild(vec![posting(2, vec![1.0, 0.0]), posting(2, vec![0.0, 1.0])]);
        assert!(matches!(duplicate, Err(Error::DuplicateId(_))));

        let wrong_dim = engine.rebuild(vec![posting(3, vec![1.0, 0.0, 0.0])]);
        assert!(matches!(wrong_dim, Err(Error::InvalidDimension { .. })));

        assert_eq!(engine.index().version(), version);
        assert_eq!(engine.catalog().ids(), vec![ItemId::from(1)]);
    }

    #[test]
    fn test_concurrent_rank_during_upserts() {
        let engine = engine(4);
        for i in 0..50u64 {
            engine
                .upsert(posting(i, vec![1.0, (i % 5) as f32, 0.3, (i % 2) as f32]))
                .unwrap();
        }
        let query = Query::new(Vector::new(vec![1.0, 1.0, 0.3, 0.0]));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 50..150u64 {
                    engine
                        .upsert(posting(i, vec![0.5, (i % 5) as f32, 1.0, 0.0]))
                        .unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        let ranking = engine.rank_at(&query, 10, None, now()).unwrap();
                        assert_eq!(ranking.len(), 10);
                        assert!(ranking.stats.integrity_faults.is_empty());
                    }
                });
            }
        });

        assert_eq!(engine.len(), 150);
        assert!(engine.check_integrity().is_consistent());
    }

    #[test]
    fn test_invalid_item_rejected() {
        let engine = engine(2);
        let overflow = ItemAttributes::new(1u64, now()).with_stipend(i64::MIN, i64::MIN);
        let err = engine
            .upsert(Item::new(overflow, Vector::new(vec![1.0, 0.0])))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidItem { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(engine.is_empty());
        assert!(engine.get(&ItemId::from(1)).is_none());

        let inverted = ItemAttributes::new(2u64, now()).with_stipend(900, 100);
        let rebuilt = engine.rebuild(vec![
            posting(3, vec![1.0, 0.0]),
            Item::new(inverted, Vector::new(vec![0.0, 1.0])),
        ]);
        assert!(matches!(rebuilt, Err(Error::InvalidItem { .. })));
        assert!(engine.catalog().is_empty());

        engine.upsert(posting(4, vec![1.0, 0.0])).unwrap();
        let query = Query::new(Vector::new(vec![1.0, 0.0])).with_stipend(0, 10);
        assert_eq!(engine.rank_at(&query, 1, None, now()).unwrap().len(), 1);
    }

    #[test]
    fn test_unchanged_upsert_writes_nothing() {
        let engine = engine(2);
        let attributes = ItemAttributes::new(1u64, now()).with_location("NYC");
        engine
            .upsert(Item::new(attributes.clone(), Vector::new(vec![1.0, 0.0])))
            .unwrap();
        let version = engine.index().version();

        for _ in 0..5 {
            let again = Item::new(attributes.clone(), Vector::new(vec![1.0, 0.0]));
            assert_eq!(engine.upsert(again).unwrap(), 0);
        }
        assert_eq!(engine.index().version(), version);
    }

    #[test]
    fn test_embedding_only_change_bumps_version() {
        let engine = engine(2);
        let attributes = ItemAttributes::new(1u64, now()).with_location("NYC");
        engine
            .upsert(Item::new(attributes.clone(), Vector::new(vec![1.0, 0.0])))
            .unwrap();
        let index_version = engine.index().version();

        let moved = Item::new(attributes.clone(), Vector::new(vec![0.0, 1.0]));
        assert_eq!(engine.upsert(moved).unwrap(), 1);
        assert_eq!(engine.get(&ItemId::from(1)).unwrap().version, 1);
        assert_eq!(engine.index().version(), index_version + 1);

        engine
            .rebuild(vec![Item::new(attributes.clone(), Vector::new(vec![0.0, 1.0]))])
            .unwrap();
        assert_eq!(engine.get(&ItemId::from(1)).unwrap().version, 1);
        engine
            .rebuild(vec![Item::new(attributes, Vector::new(vec![0.6, 0.8]))])
            .unwrap();
        assert_eq!(engine.get(&ItemId::from(1)).unwrap().version, 2);
    }

    #[test]
    fn test_concurrent_rank_during_removals() {
        let engine = flat_engine(4);
        let items: Vec<Item> = (0..2_000u64)
            .map(|i| posting(i, vec![1.0, (i % 11) as f32, 0.5, (i % 3) as f32]))
            .collect();
        engine.rebuild(items).unwrap();
        let query = Query::new(Vector::new(vec![1.0, 4.0, 0.5, 1.0]));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..2_000u64 {
                    assert!(engine.remove(&ItemId::from(i)));
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..40 {
                        let ranking = engine.rank_at(&query, 200, Some(2_000), now()).unwrap();
                        assert!(ranking.stats.integrity_faults.is_empty());
                    }
                });
            }
        });

        assert!(engine.is_empty());
        assert!(engine.check_integrity().is_consistent());
    }

    #[test]
    fn test_concurrent_rank_during_rebuilds() {
        let engine = flat_engine(4);
        let batch = |start: u64| -> Vec<Item> {
            (start..start + 500)
                .map(|i| posting(i, vec![1.0, (i % 7) as f32, 0.2, (i % 5) as f32]))
                .collect()
        };
        engine.rebuild(batch(0)).unwrap();
        let query = Query::new(Vector::new(vec![1.0, 3.0, 0.2, 2.0]));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for round in 0..20u64 {
                    engine.rebuild(batch((round % 4) * 250)).unwrap();
                }
            });
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..40 {
                        let ranking = engine.rank_at(&query, 100, Some(500), now()).unwrap();
                        assert!(ranking.stats.integrity_faults.is_empty());
                        assert!(!ranking.is_empty());
                    }
                });
            }
        });

        assert_eq!(engine.len(), 500);
        assert!(engine.check_integrity().is_consistent());
        assert!(engine.check_integrity().unindexed.is_empty());
    }
}
