use crate::index::{sort_hits, Metric, SearchHit};
use crate::item::ItemId;
use ahash::AHashMap;
use rayon::prelude::*;

/// Contiguous vector storage shared by the index backends.
///
/// Slots are append-only. Removing an item tombstones its slot; the slot keeps
/// its vector so graph backends can still route through it until compaction.
#[derive(Debug, Clone)]
pub(crate) struct SlotStore {
    dim: usize,
    metric: Metric,
    ids: Vec<ItemId>,
    /// dim * ids.len() components
    vectors: Vec<f32>,
    live: Vec<bool>,
    positions: AHashMap<ItemId, usize>,
}

impl SlotStore {
    pub(crate) fn new(dim: usize, metric: Metric) -> Self {
        Self {
            dim,
            metric,
            ids: Vec::new(),
            vectors: Vec::new(),
            live: Vec::new(),
            positions: AHashMap::new(),
        }
    }

    #[inline]
    pub(crate) fn metric(&self) -> Metric {
        self.metric
    }

    #[inline]
    pub(crate) fn dim(&self) -> usize {
        self.dim
    }

    /// Append a vector, returning its slot. The caller guarantees the id is not live.
    pub(crate) fn push(&mut self, id: ItemId, vector: &[f32]) -> usize {
        debug_assert_eq!(vector.len(), self.dim);
        debug_assert!(!self.positions.contains_key(&id));
        let slot = self.ids.len();
        self.vectors.extend_from_slice(vector);
        self.positions.insert(id.clone(), slot);
        self.ids.push(id);
        self.live.push(true);
        slot
    }

    pub(crate) fn tombstone(&mut self, id: &ItemId) -> bool {
        match self.positions.remove(id) {
            Some(slot) => {
                self.live[slot] = false;
                true
            }
            None => false,
        }
    }

    #[inline]
    pub(crate) fn contains(&self, id: &ItemId) -> bool {
        self.positions.contains_key(id)
    }

    /// Stored vector of a live id
    #[inline]
    pub(crate) fn get(&self, id: &ItemId) -> Option<&[f32]> {
        self.positions.get(id).map(|&slot| self.vector(slot))
    }

    #[inline]
    pub(crate) fn is_live(&self, slot: usize) -> bool {
        self.live[slot]
    }

    #[inline]
    pub(crate) fn slot_count(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub(crate) fn live_len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub(crate) fn tombstones(&self) -> usize {
        self.ids.len() - self.positions.len()
    }

    #[inline]
    pub(crate) fn vector(&self, slot: usize) -> &[f32] {
        let start = slot * self.dim;
        &self.vectors[start..start + self.dim]
    }

    #[inline]
    pub(crate) fn distance(&self, query: &[f32], slot: usize) -> f32 {
        self.metric.distance(query, self.vector(slot))
    }

    #[inline]
    pub(crate) fn distance_between(&self, a: usize, b: usize) -> f32 {
        self.metric.distance(self.vector(a), self.vector(b))
    }

    #[inline]
    pub(crate) fn hit(&self, query: &[f32], slot: usize) -> SearchHit {
        SearchHit {
            id: self.ids[slot].clone(),
            score: self.metric.score(self.distance(query, slot)),
        }
    }

    /// Live entries in slot order
    pub(crate) fn live_entries(&self) -> impl Iterator<Item = (&ItemId, &[f32])> + '_ {
        (0..self.ids.len())
            .filter(move |&slot| self.live[slot])
            .map(move |slot| (&self.ids[slot], self.vector(slot)))
    }

    pub(crate) fn live_ids(&self) -> Vec<ItemId> {
        self.live_entries().map(|(id, _)| id.clone()).collect()
    }

    /// Exact scan over all live slots
    pub(crate) fn exact_search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        if k == 0 {
            return Vec::new();
        }
        let mut hits: Vec<SearchHit> = (0..self.ids.len())
            .into_par_iter()
            .filter(|&slot| self.live[slot])
            .map(|slot| self.hit(query, slot))
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_tombstone() {
        let mut store = SlotStore::new(2, Metric::Euclidean);
        let a = store.push(ItemId::from(1), &[0.0, 0.0]);
        let b = store.push(ItemId::from(2), &[1.0, 0.0]);
        assert_eq!((a, b), (0, 1));
        assert_eq!(store.live_len(), 2);

        assert!(store.tombstone(&ItemId::from(1)));
        assert!(!store.tombstone(&ItemId::from(1)));
        assert!(!store.is_live(a));
        assert_eq!(store.tombstones(), 1);
        assert_eq!(store.live_ids(), vec![ItemId::from(2)]);
    }

    #[test]
    fn test_exact_search_skips_tombstones() {
        let mut store = SlotStore::new(2, Metric::Euclidean);
        store.push(ItemId::from(1), &[0.0, 0.0]);
        store.push(ItemId::from(2), &[3.0, 4.0]);
        store.push(ItemId::from(3), &[0.1, 0.0]);
        store.tombstone(&ItemId::from(1));

        let hits = store.exact_search(&[0.0, 0.0], 5);
        let ids: Vec<_> = hits.iter().map(|h| h.id.clone()).collect();
        assert_eq!(ids, vec![ItemId::from(3), ItemId::from(2)]);
        assert!((hits[1].score - 1.0 / 6.0).abs() < 1e-6);
    }
}
