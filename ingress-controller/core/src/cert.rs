use crate::SecretId;
use std::path::{Path, PathBuf};

/// The raw fields of a secret that may carry TLS material. Any field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SecretMaterial {
    pub certificate: Option<Vec<u8>>,
    pub key: Option<Vec<u8>>,
    pub ca: Option<Vec<u8>>,
}

/// Distinguishes how a record may be used by the proxy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CertKind {
    /// Has a certificate and key and may terminate TLS. An attached CA does not change the kind.
    Tls,

    /// Has only CA material and may only be used to validate client certificates.
    AuthOnly,
}

/// TLS material derived from a single secret.
///
/// Records are never mutated in place: every change produces a new record that replaces the old
/// one wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertRecord {
    id: SecretId,
    certificate: Option<Vec<u8>>,
    key: Option<Vec<u8>>,
    ca: Option<Vec<u8>>,
    common_name: String,
    pem_path: PathBuf,
    full_chain_pem_path: Option<PathBuf>,
}

// === impl SecretMaterial ===

impl SecretMaterial {
    pub fn certificate(&self) -> Option<&[u8]> {
        non_empty(&self.certificate)
    }

    pub fn key(&self) -> Option<&[u8]> {
        non_empty(&self.key)
    }

    pub fn ca(&self) -> Option<&[u8]> {
        non_empty(&self.ca)
    }
}

fn non_empty(field: &Option<Vec<u8>>) -> Option<&[u8]> {
    field.as_deref().filter(|b| !b.is_empty())
}

// === impl CertRecord ===

impl CertRecord {
    /// Builds a TLS record from a certificate and key, optionally carrying a CA as an auxiliary
    /// trust anchor.
    pub fn tls(
        id: SecretId,
        certificate: Vec<u8>,
        key: Vec<u8>,
        ca: Option<Vec<u8>>,
        common_name: String,
        pem_path: PathBuf,
    ) -> Self {
        Self {
            id,
            certificate: Some(certificate),
            key: Some(key),
            ca,
            common_name,
            pem_path,
            full_chain_pem_path: None,
        }
    }

    /// Builds a record that may only be used for client certificate authentication.
    pub fn auth_only(id: SecretId, ca: Vec<u8>, common_name: String, pem_path: PathBuf) -> Self {
        Self {
            id,
            certificate: None,
            key: None,
            ca: Some(ca),
            common_name,
            pem_path,
            full_chain_pem_path: None,
        }
    }

    /// Returns a new record identical to this one except for its full-chain artifact path.
    pub fn with_full_chain(&self, path: PathBuf) -> Self {
        let Self {
            id,
            certificate,
            key,
            ca,
            common_name,
            pem_path,
            full_chain_pem_path: _,
        } = self.clone();
        Self {
            id,
            certificate,
            key,
            ca,
            common_name,
            pem_path,
            full_chain_pem_path: Some(path),
        }
    }

    pub fn kind(&self) -> CertKind {
        if self.certificate.is_some() && self.key.is_some() {
            CertKind::Tls
        } else {
            CertKind::AuthOnly
        }
    }

    /// Compares only the raw secret material, ignoring derived artifacts.
    pub fn same_material(&self, other: &Self) -> bool {
        self.certificate == other.certificate && self.key == other.key && self.ca == other.ca
    }

    pub fn id(&self) -> &SecretId {
        &self.id
    }

    pub fn namespace(&self) -> &str {
        &self.id.namespace
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn certificate(&self) -> Option<&[u8]> {
        self.certificate.as_deref()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn ca(&self) -> Option<&[u8]> {
        self.ca.as_deref()
    }

    pub fn common_name(&self) -> &str {
        &self.common_name
    }

    pub fn pem_path(&self) -> &Path {
        &self.pem_path
    }

    /// Unset until the chain completion job has written the full-chain artifact.
    pub fn full_chain_pem_path(&self) -> Option<&Path> {
        self.full_chain_pem_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls_record() -> CertRecord {
        CertRecord::tls(
            SecretId::new("ns", "web-tls"),
            b"cert".to_vec(),
            b"key".to_vec(),
            Some(b"ca".to_vec()),
            "web.example.com".to_string(),
            PathBuf::from("/ssl/ns-web-tls.pem"),
        )
    }

    #[test]
    fn kind_follows_material() {
        assert_eq!(tls_record().kind(), CertKind::Tls);

        let auth = CertRecord::auth_only(
            SecretId::new("ns", "ca"),
            b"ca".to_vec(),
            "Example CA".to_string(),
            PathBuf::from("/ssl/ns-ca.pem"),
        );
        assert_eq!(auth.kind(), CertKind::AuthOnly);
    }

    #[test]
    fn with_full_chain_only_changes_chain_path() {
        let record = tls_record();
        let completed = record.with_full_chain(PathBuf::from("/ssl/ns-web-tls-full-chain.pem"));

        assert_eq!(record.full_chain_pem_path(), None);
        assert_eq!(
            completed.full_chain_pem_path(),
            Some(Path::new("/ssl/ns-web-tls-full-chain.pem"))
        );
        assert!(completed.same_material(&record));
        assert_eq!(completed.pem_path(), record.pem_path());
        assert_eq!(completed.common_name(), record.common_name());
        assert_eq!(completed.id(), record.id());
    }

    #[test]
    fn empty_fields_are_absent() {
        let material = SecretMaterial {
            certificate: Some(vec![]),
            key: None,
            ca: Some(b"ca".to_vec()),
        };
        assert_eq!(material.certificate(), None);
        assert_eq!(material.key(), None);
        assert_eq!(material.ca(), Some(&b"ca"[..]));
    }
}
