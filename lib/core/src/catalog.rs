use crate::item::{ItemAttributes, ItemId};
use ahash::AHashMap;
use parking_lot::RwLock;
use std::sync::Arc;

/// Result of a batch lookup
#[derive(Debug, Clone, Default)]
pub struct BatchLookup {
    pub found: AHashMap<ItemId, Arc<ItemAttributes>>,
    /// Requested ids with no entry, in request order
    pub missing: Vec<ItemId>,
}

impl BatchLookup {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Item attributes keyed by id, joined with the vector index at ranking time
#[derive(Debug, Default)]
pub struct ItemCatalog {
    items: RwLock<AHashMap<ItemId, Arc<ItemAttributes>>>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace attributes for an id.
    ///
    /// Re-upserting identical content is a no-op; changed content gets the stored
    /// version plus one. Returns the version now stored.
    pub fn upsert(&self, attributes: ItemAttributes) -> u64 {
        self.upsert_revision(attributes, false)
    }

    /// As [`upsert`](Self::upsert), but `embedding_changed` forces a version bump
    /// for an existing entry even when the attributes are identical.
    pub fn upsert_revision(&self, mut attributes: ItemAttributes, embedding_changed: bool) -> u64 {
        let mut items = self.items.write();
        if let Some(existing) = items.get(&attributes.id) {
            if !embedding_changed && existing.same_content(&attributes) {
                return existing.version;
            }
            attributes.version = existing.version + 1;
        }
        let version = attributes.version;
        items.insert(attributes.id.clone(), Arc::new(attributes));
        version
    }

    pub fn get(&self, id: &ItemId) -> Option<Arc<ItemAttributes>> {
        self.items.read().get(id).cloned()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.read().contains_key(id)
    }

    /// Look up many ids under one read lock, reporting the ones that are missing
    pub fn batch_get<'a, I>(&self, ids: I) -> BatchLookup
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let items = self.items.read();
        let mut lookup = BatchLookup::default();
        for id in ids {
            match items.get(id) {
                Some(attributes) => {
                    lookup.found.insert(id.clone(), attributes.clone());
                }
                None => lookup.missing.push(id.clone()),
            }
        }
        lookup
    }

    pub fn remove(&self, id: &ItemId) -> Option<Arc<ItemAttributes>> {
        self.items.write().remove(id)
    }

    /// Drop every entry whose id fails `keep`. Returns the number removed.
    pub fn retain<F>(&self, keep: F) -> usize
    where
        F: Fn(&ItemId) -> bool,
    {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|id, _| keep(id));
        before - items.len()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// All ids, sorted
    pub fn ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.items.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
