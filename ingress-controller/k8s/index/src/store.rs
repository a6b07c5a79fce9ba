use ahash::AHashMap as HashMap;
use ingress_controller_core::{CertRecord, SecretId};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedStore = Arc<RwLock<CertStore>>;

/// Maps secret identifiers to the certificate records derived from them.
///
/// The store is not synchronized itself; it is shared as a [`SharedStore`] so that each mutation
/// happens under a single write lock.
#[derive(Debug, Default)]
pub struct CertStore {
    records: HashMap<SecretId, CertRecord>,
}

// === impl CertStore ===

impl CertStore {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn get(&self, id: &SecretId) -> Option<&CertRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &SecretId) -> bool {
        self.records.contains_key(id)
    }

    /// Inserts a record for an identifier that is not yet tracked.
    ///
    /// Returns false (leaving the store unchanged) if the identifier is already present.
    pub fn add(&mut self, record: CertRecord) -> bool {
        if self.records.contains_key(record.id()) {
            return false;
        }
        self.records.insert(record.id().clone(), record);
        true
    }

    /// Replaces the record for an identifier wholesale, returning the previous record.
    pub fn update(&mut self, record: CertRecord) -> Option<CertRecord> {
        self.records.insert(record.id().clone(), record)
    }

    pub fn remove(&mut self, id: &SecretId) -> Option<CertRecord> {
        self.records.remove(id)
    }

    pub fn list_keys(&self) -> Vec<SecretId> {
        self.records.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CertRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
