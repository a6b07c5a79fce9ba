#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cert;
mod id;
mod provider;

pub use self::{
    cert::{CertKind, CertRecord, SecretMaterial},
    id::{InvalidSecretId, SecretId},
    provider::{IngressRule, IngressRuleProvider, SecretProvider},
};

/// An opaque trigger asking the configuration writer to regenerate its output.
///
/// Sent whenever the certificate store changes. The receiver only cares that _something_ changed,
/// so the signal carries no payload.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconfigure;

pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
pub const CA_CERT_KEY: &str = "ca.crt";
