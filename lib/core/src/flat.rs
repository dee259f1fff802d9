use crate::index::{AnnIndex, Metric, SearchHit};
use crate::item::ItemId;
use crate::slots::SlotStore;

/// Exact brute-force index. Suitable for small catalogs and as a recall oracle.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    slots: SlotStore,
}

impl FlatIndex {
    pub fn new(dim: usize, metric: Metric) -> Self {
        Self {
            slots: SlotStore::new(dim, metric),
        }
    }
}

impl AnnIndex for FlatIndex {
    fn insert(&mut self, id: ItemId, vector: &[f32]) {
        self.slots.push(id, vector);
    }

    fn remove(&mut self, id: &ItemId) -> bool {
        self.slots.tombstone(id)
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        self.slots.exact_search(query, k)
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
        let mut next = FlatIndex::new(self.slots.dim(), self.slots.metric());
        for (id, vector) in self.slots.live_entries() {
            next.insert(id.clone(), vector);
        }
        Box::new(next)
    }

    fn clone_box(&self) -> Box<dyn AnnIndex> {
        Box::new(self.clone())
    }
}
