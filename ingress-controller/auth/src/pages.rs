use bytes::Bytes;
use std::path::Path;

/// Static response bodies for denied and unknown requests.
///
/// Each page is loaded once, independently; a page that cannot be read is served empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorPages {
    pub unauthorized: Bytes,
    pub forbidden: Bytes,
    pub not_found: Bytes,
}

impl ErrorPages {
    pub fn load(dir: Option<&Path>) -> Self {
        let Some(dir) = dir else {
            return Self::default();
        };
        Self {
            unauthorized: load_page(dir, "401.html"),
            forbidden: load_page(dir, "403.html"),
            not_found: load_page(dir, "404.html"),
        }
    }
}

fn load_page(dir: &Path, name: &str) -> Bytes {
    let path = dir.join(name);
    match std::fs::read(&path) {
        Ok(body) => Bytes::from(body),
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to load error page");
            Bytes::new()
        }
    }
}
