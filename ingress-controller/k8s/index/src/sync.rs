use crate::{
    pem::{self, CertError},
    SharedStore,
};
use ingress_controller_core::{Reconfigure, SecretId, SecretProvider};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, instrument, warn};

/// Keeps the certificate store in sync with the secrets it was derived from.
#[derive(Debug)]
pub struct Synchronizer<S> {
    secrets: S,
    store: SharedStore,
    ssl_dir: PathBuf,
    reconfigure: UnboundedSender<Reconfigure>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("error retrieving secret: {0}")]
    Lookup(#[source] anyhow::Error),

    #[error(transparent)]
    Cert(#[from] CertError),
}

// === impl Synchronizer ===

impl<S: SecretProvider> Synchronizer<S> {
    pub fn new(
        secrets: S,
        store: SharedStore,
        ssl_dir: impl Into<PathBuf>,
        reconfigure: UnboundedSender<Reconfigure>,
    ) -> Self {
        Self {
            secrets,
            store,
            ssl_dir: ssl_dir.into(),
            reconfigure,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn ssl_dir(&self) -> &Path {
        &self.ssl_dir
    }

    /// Synchronizes a secret into the store. Failures are logged and leave the store unchanged.
    #[instrument(skip(self, id), fields(%id))]
    pub fn sync(&self, id: &SecretId) {
        if let Err(error) = self.try_sync(id) {
            warn!(%error, "failed to synchronize secret");
        }
    }

    /// Synchronizes a secret into the store, returning true if the store changed.
    ///
    /// A record whose material is identical to the stored one is left in place (preserving any
    /// completed chain) and no reconfiguration is signaled.
    pub fn try_sync(&self, id: &SecretId) -> Result<bool, SyncError> {
        debug!("syncing secret");
        let material = self
            .secrets
            .get_by_identifier(id)
            .map_err(SyncError::Lookup)?;
        let record = pem::derive(id, &material, &self.ssl_dir)?;

        if let Some(current) = self.store.read().get(id) {
            if current.same_material(&record) {
                debug!("secret unchanged");
                return Ok(false);
            }
        }

        pem::write_pem(&record)?;

        if self.store.write().update(record).is_some() {
            info!("updating secret in the local store");
        } else {
            info!("adding secret to the local store");
        }
        self.signal();
        Ok(true)
    }

    /// Drops a deleted secret's record from the store.
    #[instrument(skip(self, id), fields(%id))]
    pub fn remove(&self, id: &SecretId) -> bool {
        if self.store.write().remove(id).is_none() {
            return false;
        }
        info!("removed secret from the local store");
        self.signal();
        true
    }

    fn signal(&self) {
        if self.reconfigure.send(Reconfigure).is_err() {
            debug!("reconfiguration receiver dropped");
        }
    }
}
