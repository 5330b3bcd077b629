// src/tag_store.rs
//
// Dense-id, refcounted tag registry. The table owns `Arc<Mutex<TagEntry>>`
// handles, so a caller holding one can outlive a concurrent `release`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{Iso14443AParams, TagStatus, TechClass};

/// A single connected or recently-disconnected tag.
#[derive(Debug, Clone)]
pub struct TagEntry {
    pub id: u32,
    pub tech: TechClass,
    pub connected: bool,
    pub status: TagStatus,
    pub ndef: Vec<u8>,
    pub max_ndef_len: usize,
    pub iso14443a: Option<Iso14443AParams>,
}

impl TagEntry {
    fn new(id: u32, tech: TechClass) -> Self {
        TagEntry {
            id,
            tech,
            connected: true,
            status: TagStatus::Invalid,
            ndef: Vec::new(),
            max_ndef_len: 0,
            iso14443a: None,
        }
    }
}

pub type TagHandle = Arc<Mutex<TagEntry>>;

/// Table of live tags, keyed by the smallest unused non-negative id.
#[derive(Default)]
pub struct TagStore {
    entries: Mutex<HashMap<u32, TagHandle>>,
}

impl TagStore {
    pub fn new() -> Self {
        TagStore::default()
    }

    /// Inserts a newly-detected tag, assigning it the smallest unused id.
    pub fn insert(&self, tech: TechClass) -> TagHandle {
        let mut entries = self.entries.lock();
        let id = smallest_unused_id(&entries);
        let handle = Arc::new(Mutex::new(TagEntry::new(id, tech)));
        entries.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: u32) -> Option<TagHandle> {
        self.entries.lock().get(&id).cloned()
    }

    /// Removes the tag from the table. Any handle already held by a caller
    /// remains valid.
    pub fn release(&self, id: u32) -> Option<TagHandle> {
        self.entries.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn smallest_unused_id(entries: &HashMap<u32, TagHandle>) -> u32 {
    let mut id = 0u32;
    while entries.contains_key(&id) {
        id += 1;
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_smallest_unused_id() {
        let store = TagStore::new();
        let a = store.insert(TechClass::Tag1);
        let b = store.insert(TechClass::Tag2);
        assert_eq!(a.lock().id, 0);
        assert_eq!(b.lock().id, 1);

        store.release(0);
        let c = store.insert(TechClass::Tag3);
        assert_eq!(c.lock().id, 0, "id 0 must be reused once freed");
    }

    #[test]
    fn released_handle_stays_valid_for_existing_holders() {
        let store = TagStore::new();
        let handle = store.insert(TechClass::Tag2);
        store.release(0);
        handle.lock().connected = false; // must not panic/deadlock
        assert!(store.get(0).is_none());
    }

    #[test]
    fn get_returns_none_for_unknown_id() {
        let store = TagStore::new();
        assert!(store.get(7).is_none());
    }
}
