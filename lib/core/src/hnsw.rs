use crate::index::{sort_hits, AnnIndex, HnswConfig, Metric, SearchHit};
use crate::item::ItemId;
use crate::slots::SlotStore;
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

type Neighbors = SmallVec<[usize; 16]>;

/// (distance, slot); the slot makes equal distances order deterministically
type Scored = (OrderedFloat<f32>, usize);

/// Bit vector for visited node tracking.
/// Much faster than HashSet for dense integer sets.
struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    #[inline]
    fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity.div_ceil(64)],
        }
    }

    /// Returns true if `idx` was not visited before
    #[inline]
    fn insert(&mut self, idx: usize) -> bool {
        let word_idx = idx / 64;
        let mask = 1u64 << (idx % 64);
        if word_idx >= self.bits.len() {
            self.bits.resize(word_idx + 1, 0);
        }
        let was_set = (self.bits[word_idx] & mask) != 0;
        self.bits[word_idx] |= mask;
        !was_set
    }

    #[inline]
    fn contains(&self, idx: usize) -> bool {
        self.bits
            .get(idx / 64)
            .is_some_and(|word| word & (1u64 << (idx % 64)) != 0)
    }
}

#[derive(Debug, Clone)]
struct HnswNode {
    /// Neighbor lists for levels 0..=level
    layers: Vec<Neighbors>,
}

impl HnswNode {
    fn new(level: usize) -> Self {
        Self {
            layers: vec![Neighbors::new(); level + 1],
        }
    }

    #[inline]
    fn level(&self) -> usize {
        self.layers.len() - 1
    }
}

/// HNSW index for approximate nearest neighbor search.
///
/// Levels are drawn from a seeded generator, so the same insertion sequence
/// always produces the same graph and therefore the same search results.
/// Removed items are tombstoned: they keep routing searches but are never
/// returned.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    slots: SlotStore,
    nodes: Vec<HnswNode>,
    entry_point: Option<usize>,
    top_level: usize,
    config: HnswConfig,
    level_norm: f64,
    rng: StdRng,
}

impl HnswIndex {
    pub fn new(dim: usize, metric: Metric, config: HnswConfig) -> Self {
        let level_norm = 1.0 / (config.m.max(2) as f64).ln();
        Self {
            slots: SlotStore::new(dim, metric),
            nodes: Vec::new(),
            entry_point: None,
            top_level: 0,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            level_norm,
        }
    }

    /// Select layer using exponential decay
    #[inline]
    fn random_level(&mut self) -> usize {
        // 1 - [0, 1) keeps ln away from zero
        let uniform = 1.0 - self.rng.random::<f64>();
        let level = (-uniform.ln() * self.level_norm).floor() as usize;
        level.min(self.config.max_level)
    }

    #[inline]
    fn max_connections(&self, level: usize) -> usize {
        if level == 0 {
            self.config.m * 2
        } else {
            self.config.m
        }
    }

    /// Greedy walk towards the query on a single level
    fn greedy_closest(&self, query: &[f32], mut current: usize, level: usize) -> usize {
        let mut current_dist = OrderedFloat(self.slots.distance(query, current));
        loop {
            let mut changed = false;
            for &neighbor in &self.nodes[current].layers[level] {
                let dist = OrderedFloat(self.slots.distance(query, neighbor));
                if (dist, neighbor) < (current_dist, current) {
                    current = neighbor;
                    current_dist = dist;
                    changed = true;
                }
            }
            if !changed {
                return current;
            }
        }
    }

    /// Best-first search on one level, returning up to `ef` nodes sorted closest first
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: &[usize],
        ef: usize,
        level: usize,
    ) -> Vec<Scored> {
        let mut visited = VisitedSet::new(self.nodes.len());
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<Scored> = BinaryHeap::with_capacity(ef + 1);

        for &entry in entry_points {
            if visited.insert(entry) {
                let scored = (OrderedFloat(self.slots.distance(query, entry)), entry);
                candidates.push(Reverse(scored));
                results.push(scored);
                if results.len() > ef {
                    results.pop();
                }
            }
        }

        while let Some(Reverse(current)) = candidates.pop() {
            if let Some(&worst) = results.peek() {
                if results.len() >= ef && current > worst {
                    break;
                }
            }

            let node = &self.nodes[current.1];
            if level > node.level() {
                continue;
            }
            for &neighbor in &node.layers[level] {
                if !visited.insert(neighbor) {
                    continue;
                }
                let scored = (OrderedFloat(self.slots.distance(query, neighbor)), neighbor);
                let admit = results.len() < ef || results.peek().is_some_and(|&w| scored < w);
                if admit {
                    candidates.push(Reverse(scored));
                    results.push(scored);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        debug_assert!(entry_points.iter().all(|&e| visited.contains(e)));
        let mut found = results.into_vec();
        found.sort_unstable();
        found
    }

    /// Neighbor selection heuristic: keep a candidate only if it is closer to the
    /// base than to every neighbor already kept, then top up with the pruned ones.
    /// `candidates` must be sorted closest first.
    fn select_neighbors(&self, candidates: &[Scored], max: usize) -> Neighbors {
        let mut selected = Neighbors::new();
        let mut pruned: Vec<usize> = Vec::new();

        for &(dist, candidate) in candidates {
            if selected.len() >= max {
                break;
            }
            let diverse = selected.iter().all(|&kept| {
                OrderedFloat(self.slots.distance_between(candidate, kept)) > dist
            });
            if diverse {
                selected.push(candidate);
            } else {
                pruned.push(candidate);
            }
        }

        for candidate in pruned {
            if selected.len() >= max {
                break;
            }
            selected.push(candidate);
        }
        selected
    }

    /// Add a back-link from `neighbor` to `slot`, shrinking the list if it overflows
    fn link(&mut self, neighbor: usize, slot: usize, level: usize) {
        self.nodes[neighbor].layers[level].push(slot);
        let max = self.max_connections(level);
        if self.nodes[neighbor].layers[level].len() <= max {
            return;
        }

        let mut scored: Vec<Scored> = self.nodes[neighbor].layers[level]
            .iter()
            .map(|&other| {
                (
                    OrderedFloat(self.slots.distance_between(neighbor, other)),
                    other,
                )
            })
            .collect();
        scored.sort_unstable();
        let kept = self.select_neighbors(&scored, max);
        self.nodes[neighbor].layers[level] = kept;
    }
}

impl AnnIndex for HnswIndex {
    /// Insert a new point into the HNSW graph
    fn insert(&mut self, id: ItemId, vector: &[f32]) {
        let slot = self.slots.push(id, vector);
        let level = self.random_level();
        self.nodes.push(HnswNode::new(level));

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot);
            self.top_level = level;
            return;
        };

        let query = vector;
        let mut current = entry;
        for lc in (level + 1..=self.top_level).rev() {
            current = self.greedy_closest(query, current, lc);
        }

        let mut entry_points = vec![current];
        for lc in (0..=level.min(self.top_level)).rev() {
            let candidates =
                self.search_layer(query, &entry_points, self.config.ef_construction, lc);
            let neighbors = self.select_neighbors(&candidates, self.config.m);

            for &neighbor in &neighbors {
                self.link(neighbor, slot, lc);
            }
            self.nodes[slot].layers[lc] = neighbors;
            entry_points = candidates.into_iter().map(|(_, idx)| idx).collect();
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(slot);
        }
    }

    fn remove(&mut self, id: &ItemId) -> bool {
        self.slots.tombstone(id)
    }

    /// Search for k nearest live neighbors
    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let wanted = k.min(self.slots.live_len());
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if wanted == 0 {
            return Vec::new();
        }

        let mut current = entry;
        for lc in (1..=self.top_level).rev() {
            current = self.greedy_closest(query, current, lc);
        }

        let ef = self.config.ef_search.max(k);
        let mut hits: Vec<SearchHit> = self
            .search_layer(query, &[current], ef, 0)
            .into_iter()
            .filter(|&(_, slot)| self.slots.is_live(slot))
            .map(|(_, slot)| self.slots.hit(query, slot))
            .collect();

        // Tombstones or a disconnected region can starve the walk; fall back to a scan
        // so callers only ever get a short list when the index itself is short.
        if hits.len() < wanted {
            return self.slots.exact_search(query, k);
        }

        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }

    fn contains(&self, id: &ItemId) -> bool {
        self.slots.contains(id)
    }

    fn vector(&self, id: &ItemId) -> Option<&[f32]> {
        self.slots.get(id)
    }

    fn len(&self) -> usize {
        self.slots.live_len()
    }

    fn tombstones(&self) -> usize {
        self.slots.tombstones()
    }

    fn ids(&self) -> Vec<ItemId> {
        self.slots.live_ids()
    }

    fn compact(&self) -> Box<dyn AnnIndex> {
        let mut next = HnswIndex::new(self.slots.dim(), self.slots.metric(), self.config.clone());
        for (id, vector) in self.slots.live_entries() {
            next.insert(id.clone(), vector);
        }
        Box::new(next)
    }

    fn clone_box(&self) -> Box<dyn AnnIndex> {
        Box::new(self.clone())
    }
}

impl HnswIndex {
    /// Number of slots including tombstones
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.slot_count()
    }
}
