#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod annotations;
pub mod class;

pub use self::class::IngressClass;
pub use k8s_openapi::{
    api::{
        self,
        core::v1::Secret,
        networking::v1::{Ingress, IngressSpec, IngressTLS},
    },
    ByteString,
};
pub use kube::{
    api::{Api, ObjectMeta},
    runtime::watcher,
    Client, Resource, ResourceExt,
};

use ingress_controller_core::{
    IngressRule, SecretMaterial, CA_CERT_KEY, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY,
};

/// Extracts the fields of a secret that may carry TLS material.
pub fn secret_material(secret: &Secret) -> SecretMaterial {
    let field = |key: &str| {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(key))
            .map(|ByteString(bytes)| bytes.clone())
    };
    SecretMaterial {
        certificate: field(TLS_CERT_KEY),
        key: field(TLS_PRIVATE_KEY_KEY),
        ca: field(CA_CERT_KEY),
    }
}

/// Projects an ingress onto the fields the certificate reconciler cares about.
pub fn ingress_rule(ingress: &Ingress, class: &IngressClass, prefix: &str) -> IngressRule {
    let tls_secret_names = ingress
        .spec
        .iter()
        .flat_map(|spec| spec.tls.iter().flatten())
        .map(|tls| tls.secret_name.clone().unwrap_or_default())
        .collect();

    IngressRule {
        namespace: ingress.namespace().unwrap_or_default(),
        name: ingress.name_unchecked(),
        class_matches: class.is_valid(ingress),
        tls_secret_names,
        auth_tls_secret: annotations::string(
            ingress.annotations(),
            prefix,
            annotations::AUTH_TLS_SECRET,
        )
        .map(ToString::to_string),
    }
}
