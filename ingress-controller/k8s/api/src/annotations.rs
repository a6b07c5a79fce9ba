use std::collections::BTreeMap;

/// Names a secret holding the CA used to validate client certificates.
pub const AUTH_TLS_SECRET: &str = "auth-tls-secret";

/// Looks up `<prefix>/<name>`, treating an empty value as unset.
pub fn string<'a>(
    annotations: &'a BTreeMap<String, String>,
    prefix: &str,
    name: &str,
) -> Option<&'a str> {
    annotations
        .get(&format!("{prefix}/{name}"))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}
