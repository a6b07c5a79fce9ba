//! Completes stored certificates with their intermediate CA chain.

use crate::{
    pem::{self, CertError},
    CertStore, SharedStore,
};
use ingress_controller_core::{CertRecord, Reconfigure};
use std::path::PathBuf;
use tokio::{sync::mpsc::UnboundedSender, time};
use tracing::{debug, error, info, instrument, trace};
use x509_parser::{
    certificate::X509Certificate,
    extensions::{GeneralName, ParsedExtension},
    oid_registry::OID_PKIX_ACCESS_DESCRIPTOR_CA_ISSUERS,
};

/// Resolves the intermediate chain for a PEM-encoded leaf certificate.
#[async_trait::async_trait]
pub trait ResolveChain {
    /// Returns the leaf followed by its intermediates, PEM-encoded.
    async fn resolve(&self, leaf_pem: &[u8]) -> Result<Vec<u8>, ChainError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error(transparent)]
    Cert(#[from] CertError),

    #[error("failed to parse certificate: {0}")]
    Parse(String),

    #[error("failed to fetch issuer certificate from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("issuer chain exceeds {0} certificates")]
    TooDeep(usize),

    #[error("chain resolution timed out after {0:?}")]
    Timeout(time::Duration),
}

/// Follows each certificate's Authority Information Access CA-Issuers URL until reaching a
/// self-signed certificate or one without an issuer URL.
#[derive(Clone, Debug)]
pub struct AiaChainResolver {
    client: reqwest::Client,
    max_depth: usize,
}

/// Periodically upgrades stored records with a full-chain PEM artifact.
#[derive(Debug)]
pub struct ChainCompletion<R> {
    store: SharedStore,
    resolver: R,
    ssl_dir: PathBuf,
    timeout: time::Duration,
    reconfigure: UnboundedSender<Reconfigure>,
}

// === impl AiaChainResolver ===

impl AiaChainResolver {
    const MAX_DEPTH: usize = 8;

    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            max_depth: Self::MAX_DEPTH,
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ChainError> {
        let fetch = |source| ChainError::Fetch {
            url: url.to_string(),
            source,
        };
        let body = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|rsp| rsp.error_for_status())
            .map_err(fetch)?
            .bytes()
            .await
            .map_err(fetch)?;

        // Issuers are usually served as DER, but some CAs serve PEM.
        if body.starts_with(b"-----BEGIN") {
            let mut certs = pem::parse_certs(&body)?;
            return Ok(certs.remove(0));
        }
        Ok(body.to_vec())
    }
}

#[async_trait::async_trait]
impl ResolveChain for AiaChainResolver {
    async fn resolve(&self, leaf_pem: &[u8]) -> Result<Vec<u8>, ChainError> {
        let mut chain = vec![pem::parse_certs(leaf_pem)?.remove(0)];

        loop {
            let (self_signed, issuer_url) = {
                let der = chain.last().map(Vec::as_slice).unwrap_or_default();
                let (_, cert) = x509_parser::parse_x509_certificate(der)
                    .map_err(|e| ChainError::Parse(e.to_string()))?;
                (is_self_signed(&cert), issuer_url(&cert))
            };

            if self_signed {
                // Roots are never served as part of the chain.
                if chain.len() > 1 {
                    chain.pop();
                }
                break;
            }

            let Some(url) = issuer_url else {
                break;
            };
            if chain.len() >= self.max_depth {
                return Err(ChainError::TooDeep(self.max_depth));
            }
            trace!(%url, "fetching issuer certificate");
            chain.push(self.fetch(&url).await?);
        }

        Ok(chain.iter().flat_map(|der| pem::encode_cert(der)).collect())
    }
}

/// True if the stored record still has `record`'s material and no completed chain.
fn is_pending(store: &CertStore, record: &CertRecord) -> bool {
    matches!(
        store.get(record.id()),
        Some(current) if current.same_material(record) && current.full_chain_pem_path().is_none()
    )
}

fn is_self_signed(cert: &X509Certificate<'_>) -> bool {
    cert.subject().as_raw() == cert.issuer().as_raw()
}

fn issuer_url(cert: &X509Certificate<'_>) -> Option<String> {
    cert.extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::AuthorityInfoAccess(aia) => {
                aia.accessdescs.iter().find_map(|desc| {
                    match (&desc.access_method, &desc.access_location) {
                        (method, GeneralName::URI(uri))
                            if *method == OID_PKIX_ACCESS_DESCRIPTOR_CA_ISSUERS =>
                        {
                            Some(uri.to_string())
                        }
                        _ => None,
                    }
                })
            }
            _ => None,
        })
}

// === impl ChainCompletion ===

impl<R: ResolveChain> ChainCompletion<R> {
    pub fn new(
        store: SharedStore,
        resolver: R,
        ssl_dir: impl Into<PathBuf>,
        timeout: time::Duration,
        reconfigure: UnboundedSender<Reconfigure>,
    ) -> Self {
        Self {
            store,
            resolver,
            ssl_dir: ssl_dir.into(),
            timeout,
            reconfigure,
        }
    }

    /// Completes the chain of every stored record that lacks one, returning the number of
    /// records completed.
    ///
    /// Failures are logged and leave the record incomplete so that a later sweep retries it.
    #[instrument(skip_all)]
    pub async fn complete_chains(&self) -> usize {
        let mut completed = 0;
        let keys = self.store.read().list_keys();
        for id in keys {
            // The record may have been removed since the keys were listed.
            let Some(record) = self.store.read().get(&id).cloned() else {
                continue;
            };
            if record.full_chain_pem_path().is_some() {
                continue;
            }
            let Some(leaf) = record.certificate() else {
                trace!(%id, "no leaf certificate to complete");
                continue;
            };

            let chain = match time::timeout(self.timeout, self.resolver.resolve(leaf)).await {
                Ok(Ok(chain)) => chain,
                Ok(Err(error)) => {
                    error!(%id, %error, "unexpected error generating SSL certificate with full intermediate chain CA certs");
                    continue;
                }
                Err(_) => {
                    let error = ChainError::Timeout(self.timeout);
                    error!(%id, %error, "unexpected error generating SSL certificate with full intermediate chain CA certs");
                    continue;
                }
            };

            // Skip stale chains rather than writing them under the live path.
            if !is_pending(&self.store.read(), &record) {
                debug!(%id, "record changed while resolving its chain");
                continue;
            }

            let path = pem::full_chain_path(&self.ssl_dir, &record);
            if let Err(error) = pem::write_artifact(&path, &chain) {
                error!(%id, %error, "unexpected error creating SSL certificate");
                continue;
            }

            {
                let mut store = self.store.write();
                if !is_pending(&store, &record) {
                    drop(store);
                    debug!(%id, "record changed while writing its chain");
                    if let Err(error) = std::fs::remove_file(&path) {
                        debug!(%id, %error, "failed to remove stale chain");
                    }
                    continue;
                }
                store.update(record.with_full_chain(path));
            }

            info!(%id, "updated local copy of SSL certificate with missing intermediate CA certs");
            completed += 1;
            if self.reconfigure.send(Reconfigure).is_err() {
                debug!("reconfiguration receiver dropped");
            }
        }
        completed
    }
}
