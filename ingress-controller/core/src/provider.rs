use crate::{SecretId, SecretMaterial};
use anyhow::Result;

/// Resolves secret material by identifier.
///
/// Implementations are expected to be backed by a local cache (i.e. a watch-fed index) so that
/// lookups never block on the network.
pub trait SecretProvider {
    fn get_by_identifier(&self, id: &SecretId) -> Result<SecretMaterial>;
}

/// The parts of an ingress resource that reference certificate material.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngressRule {
    pub namespace: String,
    pub name: String,

    /// Whether the rule belongs to the ingress class served by this controller.
    pub class_matches: bool,

    /// Secret names referenced by the rule's TLS blocks, in the rule's namespace. May include
    /// empty names, which are ignored.
    pub tls_secret_names: Vec<String>,

    /// The raw value of the client-auth secret annotation, if set.
    pub auth_tls_secret: Option<String>,
}

/// Enumerates all externally-visible routing rules.
pub trait IngressRuleProvider {
    fn list_rules(&self) -> Vec<IngressRule>;
}
