use std::{fmt, str::FromStr};

/// Identifies a secret (and the certificate derived from it) by `namespace/name`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SecretId {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid secret identifier {0:?}: expected namespace/name")]
pub struct InvalidSecretId(String);

// === impl SecretId ===

impl SecretId {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Parses `namespace/name`, or qualifies a bare `name` with `default_ns`.
    pub fn qualified(s: &str, default_ns: &str) -> Result<Self, InvalidSecretId> {
        if s.contains('/') {
            s.parse()
        } else if s.is_empty() {
            Err(InvalidSecretId(s.to_string()))
        } else {
            Ok(Self::new(default_ns, s))
        }
    }

    /// A filesystem-safe form of the identifier: every `/` becomes `-`.
    pub fn artifact_name(&self) -> String {
        self.to_string().replace('/', "-")
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for SecretId {
    type Err = InvalidSecretId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(InvalidSecretId(s.to_string())),
        }
    }
}
