use ahash::AHashMap as HashMap;
use ingress_controller_core::{IngressRule, IngressRuleProvider};
use ingress_controller_k8s_api::{self as k8s, IngressClass, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

pub type SharedIngressIndex = Arc<RwLock<IngressIndex>>;

/// Indexes the certificate references of watched ingresses.
#[derive(Debug)]
pub struct IngressIndex {
    class: IngressClass,
    annotations_prefix: String,
    rules: HashMap<(String, String), IngressRule>,
}

/// Lists rules from an [`IngressIndex`].
#[derive(Clone, Debug)]
pub struct IngressCache(SharedIngressIndex);

// === impl IngressIndex ===

impl IngressIndex {
    pub fn shared(class: IngressClass, annotations_prefix: impl ToString) -> SharedIngressIndex {
        Arc::new(RwLock::new(Self {
            class,
            annotations_prefix: annotations_prefix.to_string(),
            rules: HashMap::default(),
        }))
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Ingress> for IngressIndex {
    fn apply(&mut self, ingress: k8s::Ingress) {
        let namespace = ingress.namespace().unwrap_or_default();
        let name = ingress.name_unchecked();
        let rule = k8s::ingress_rule(&ingress, &self.class, &self.annotations_prefix);
        trace!(%namespace, %name, ?rule, "indexed ingress");
        self.rules.insert((namespace, name), rule);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.rules.remove(&(namespace, name));
    }
}

// === impl IngressCache ===

impl IngressCache {
    pub fn new(index: SharedIngressIndex) -> Self {
        Self(index)
    }
}

impl IngressRuleProvider for IngressCache {
    fn list_rules(&self) -> Vec<IngressRule> {
        self.0.read().rules.values().cloned().collect()
    }
}
