// src/device_store.rs
//
// Dense-id, refcounted peer-device registry. Structurally identical to
// TagStore; kept separate since tags and devices carry disjoint field sets
// and are indexed from independent id spaces.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{FelicaParams, Role, TechClass};

/// A single connected or recently-lost NFC-DEP peer.
#[derive(Debug, Clone)]
pub struct DeviceEntry {
    pub id: u32,
    pub tech: TechClass,
    pub role: Role,
    pub connected: bool,
    pub ndef: Vec<u8>,
    pub felica: Option<FelicaParams>,
}

impl DeviceEntry {
    fn new(id: u32, tech: TechClass, role: Role) -> Self {
        DeviceEntry {
            id,
            tech,
            role,
            connected: true,
            ndef: Vec::new(),
            felica: None,
        }
    }
}

pub type DeviceHandle = Arc<Mutex<DeviceEntry>>;

#[derive(Default)]
pub struct DeviceStore {
    entries: Mutex<HashMap<u32, DeviceHandle>>,
}

impl DeviceStore {
    pub fn new() -> Self {
        DeviceStore::default()
    }

    pub fn insert(&self, tech: TechClass, role: Role) -> DeviceHandle {
        let mut entries = self.entries.lock();
        let id = smallest_unused_id(&entries);
        let handle = Arc::new(Mutex::new(DeviceEntry::new(id, tech, role)));
        entries.insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: u32) -> Option<DeviceHandle> {
        self.entries.lock().get(&id).cloned()
    }

    pub fn release(&self, id: u32) -> Option<DeviceHandle> {
        self.entries.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn smallest_unused_id(entries: &HashMap<u32, DeviceHandle>) -> u32 {
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
        let store = DeviceStore::new();
        let a = store.insert(TechClass::DevNfcDepA(Role::Initiator), Role::Initiator);
        let b = store.insert(TechClass::DevNfcDepF(Role::Target), Role::Target);
        assert_eq!(a.lock().id, 0);
        assert_eq!(b.lock().id, 1);
    }

    #[test]
    fn release_then_get_is_none() {
        let store = DeviceStore::new();
        store.insert(TechClass::DevNfcDepA(Role::Initiator), Role::Initiator);
        store.release(0);
        assert!(store.get(0).is_none());
    }
}
