use crate::Synchronizer;
use ingress_controller_core::{IngressRuleProvider, SecretId, SecretProvider};
use tracing::{debug, instrument, warn};

/// Finds secrets referenced by ingress rules that are missing from the certificate store.
///
/// This never removes records; it only detects absence.
#[derive(Debug)]
pub struct Reconciler<I> {
    ingresses: I,
}

impl<I: IngressRuleProvider> Reconciler<I> {
    pub fn new(ingresses: I) -> Self {
        Self { ingresses }
    }

    /// Synchronizes every referenced secret that is not yet in the store, returning the number of
    /// synchronizations attempted.
    #[instrument(skip_all)]
    pub fn reconcile<S: SecretProvider>(&self, sync: &Synchronizer<S>) -> usize {
        let mut attempts = 0;
        let mut check = |id: SecretId| {
            if !sync.store().read().contains(&id) {
                debug!(%id, "secret referenced but not in the local store");
                sync.sync(&id);
                attempts += 1;
            }
        };

        for rule in self.ingresses.list_rules() {
            if !rule.class_matches {
                continue;
            }

            for secret_name in rule.tls_secret_names.iter().filter(|n| !n.is_empty()) {
                check(SecretId::new(&rule.namespace, secret_name));
            }

            if let Some(value) = rule.auth_tls_secret.as_deref() {
                match SecretId::qualified(value, &rule.namespace) {
                    Ok(id) => check(id),
                    Err(error) => warn!(
                        ns = %rule.namespace,
                        ingress = %rule.name,
                        %error,
                        "invalid client-auth secret annotation"
                    ),
                }
            }
        }

        attempts
    }
}
