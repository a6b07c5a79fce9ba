//! Derives certificate records from secret material and writes their on-disk artifacts.

use ingress_controller_core::{
    CertRecord, SecretId, SecretMaterial, TLS_CERT_KEY, TLS_PRIVATE_KEY_KEY,
};
use std::{
    io::Write,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("no keypair or CA certificate could be found")]
    NoMaterial,

    #[error("malformed keypair: missing '{0}'")]
    MalformedKeypair(&'static str),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Classifies secret material and builds the corresponding record.
///
/// A certificate and key make a TLS record (with any CA attached); otherwise CA material makes an
/// auth-only record. Nothing is written to disk.
pub fn derive(
    id: &SecretId,
    material: &SecretMaterial,
    ssl_dir: &Path,
) -> Result<CertRecord, CertError> {
    let pem_path = pem_path(ssl_dir, id);
    match (material.certificate(), material.key(), material.ca()) {
        (Some(cert), Some(key), ca) => {
            let certs = parse_certs(cert)?;
            check_key(key)?;
            if let Some(ca) = ca {
                parse_certs(ca)?;
                debug!(%id, "secret may also be used for client certificate authentication");
            }
            let cn = common_name(&certs[0])?;
            debug!(%id, %cn, "configuring TLS secret");
            Ok(CertRecord::tls(
                id.clone(),
                cert.to_vec(),
                key.to_vec(),
                ca.map(<[u8]>::to_vec),
                cn,
                pem_path,
            ))
        }

        (_, _, Some(ca)) => {
            let certs = parse_certs(ca)?;
            let cn = common_name(&certs[0])?;
            debug!(%id, %cn, "configuring certificate authentication secret");
            Ok(CertRecord::auth_only(id.clone(), ca.to_vec(), cn, pem_path))
        }

        (Some(_), None, None) => Err(CertError::MalformedKeypair(TLS_PRIVATE_KEY_KEY)),
        (None, Some(_), None) => Err(CertError::MalformedKeypair(TLS_CERT_KEY)),
        (None, None, None) => Err(CertError::NoMaterial),
    }
}

/// `<ssl-dir>/<namespace>-<name>.pem`
pub fn pem_path(ssl_dir: &Path, id: &SecretId) -> PathBuf {
    ssl_dir.join(format!("{}.pem", id.artifact_name()))
}

/// `<ssl-dir>/<namespace>-<name>-full-chain.pem`
pub fn full_chain_path(ssl_dir: &Path, record: &CertRecord) -> PathBuf {
    ssl_dir.join(format!(
        "{}-{}-full-chain.pem",
        record.namespace(),
        record.name()
    ))
}

/// Writes a record's base PEM: certificate, key, and CA for TLS records; the CA for auth-only ones.
pub fn write_pem(record: &CertRecord) -> Result<(), CertError> {
    let mut contents = Vec::new();
    for part in [record.certificate(), record.key(), record.ca()]
        .into_iter()
        .flatten()
    {
        contents.extend_from_slice(part);
        if !part.ends_with(b"\n") {
            contents.push(b'\n');
        }
    }
    write_artifact(record.pem_path(), &contents)
}

/// Atomically replaces `path` with a file readable and writable only by its owner.
///
/// The contents are written to a temporary file in the same directory and renamed over `path`,
/// so readers never observe a partially written artifact.
pub fn write_artifact(path: &Path, contents: &[u8]) -> Result<(), CertError> {
    let write = || -> std::io::Result<()> {
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    };
    write().map_err(|source| CertError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses every certificate in a PEM bundle, requiring at least one.
pub(crate) fn parse_certs(pem: &[u8]) -> Result<Vec<Vec<u8>>, CertError> {
    let certs = rustls_pemfile::certs(&mut &*pem)
        .map(|res| res.map(|der| der.as_ref().to_vec()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;
    if certs.is_empty() {
        return Err(CertError::InvalidCertificate(
            "no PEM-encoded certificate found".to_string(),
        ));
    }
    Ok(certs)
}

fn check_key(pem: &[u8]) -> Result<(), CertError> {
    match rustls_pemfile::private_key(&mut &*pem) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(CertError::InvalidKey(
            "no PEM-encoded private key found".to_string(),
        )),
        Err(e) => Err(CertError::InvalidKey(e.to_string())),
    }
}

fn common_name(der: &[u8]) -> Result<String, CertError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| CertError::InvalidCertificate(e.to_string()))?;
    let cn = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default();
    Ok(cn.to_string())
}

/// Encodes a DER certificate as PEM.
pub(crate) fn encode_cert(der: &[u8]) -> Vec<u8> {
    use base64::Engine;

    let b64 = base64::engine::general_purpose::STANDARD.encode(der);
    let mut pem = b"-----BEGIN CERTIFICATE-----\n".to_vec();
    for line in b64.as_bytes().chunks(64) {
        pem.extend_from_slice(line);
        pem.push(b'\n');
    }
    pem.extend_from_slice(b"-----END CERTIFICATE-----\n");
    pem
}
