use crate::SharedStore;
use ahash::AHashMap as HashMap;
use anyhow::{anyhow, Result};
use ingress_controller_core::{SecretId, SecretMaterial, SecretProvider};
use ingress_controller_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

pub type SharedSecretIndex = Arc<RwLock<SecretIndex>>;

/// Work forwarded from secret watch events to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncRequest {
    Sync(SecretId),
    Remove(SecretId),
}

/// Caches secret material by identifier as secrets are watched.
///
/// Only secrets that already back a certificate record trigger synchronization; secrets that are
/// referenced but not yet tracked are picked up by the reconciler.
#[derive(Debug)]
pub struct SecretIndex {
    secrets: HashMap<SecretId, SecretMaterial>,
    store: SharedStore,
    requests: UnboundedSender<SyncRequest>,
}

/// Reads secrets from a [`SecretIndex`].
#[derive(Clone, Debug)]
pub struct SecretCache(SharedSecretIndex);

// === impl SecretIndex ===

impl SecretIndex {
    pub fn shared(store: SharedStore, requests: UnboundedSender<SyncRequest>) -> SharedSecretIndex {
        Arc::new(RwLock::new(Self {
            secrets: HashMap::default(),
            store,
            requests,
        }))
    }

    fn request(&self, req: SyncRequest) {
        if let Err(error) = self.requests.send(req) {
            warn!(%error, "failed to request secret synchronization");
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Secret> for SecretIndex {
    fn apply(&mut self, secret: k8s::Secret) {
        let Some(namespace) = secret.namespace() else {
            warn!(name = %secret.name_unchecked(), "ignoring secret without a namespace");
            return;
        };
        let id = SecretId::new(namespace, secret.name_unchecked());
        let material = k8s::secret_material(&secret);

        if self.secrets.get(&id) == Some(&material) {
            return;
        }
        self.secrets.insert(id.clone(), material);

        if self.store.read().contains(&id) {
            debug!(%id, "tracked secret changed");
            self.request(SyncRequest::Sync(id));
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = SecretId::new(namespace, name);
        if self.secrets.remove(&id).is_some() && self.store.read().contains(&id) {
            debug!(%id, "tracked secret deleted");
            self.request(SyncRequest::Remove(id));
        }
    }
}

// === impl SecretCache ===

impl SecretCache {
    pub fn new(index: SharedSecretIndex) -> Self {
        Self(index)
    }
}

impl SecretProvider for SecretCache {
    fn get_by_identifier(&self, id: &SecretId) -> Result<SecretMaterial> {
        self.0
            .read()
            .secrets
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("secret {id} not found"))
    }
}
