use http::{header::AUTHORIZATION, HeaderMap, HeaderValue};

const BEARER: &str = "Bearer ";

/// Extracts a bearer token from a request's `Authorization` header or, failing that, from a
/// named session cookie.
#[derive(Clone, Debug)]
pub struct TokenExtractor {
    cookie: String,
}

impl TokenExtractor {
    pub fn new(cookie: impl ToString) -> Self {
        Self {
            cookie: cookie.to_string(),
        }
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Returns the request's bearer token, if any.
    ///
    /// An `Authorization` header always takes precedence over the cookie. When the token is read
    /// from the cookie, an equivalent `Authorization` header is added to `headers`.
    pub fn extract(&self, headers: &mut HeaderMap) -> Option<String> {
        if let Some(value) = headers.get(AUTHORIZATION) {
            return bearer(value);
        }

        let token = self.from_cookie(headers)?;
        match HeaderValue::try_from(format!("{BEARER}{token}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
                Some(token)
            }
            Err(_) => {
                tracing::debug!(cookie = %self.cookie, "cookie is not a valid header value");
                None
            }
        }
    }

    fn from_cookie(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(http::header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(cookie::Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|c| c.name() == self.cookie)
            .map(|c| c.value().trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

fn bearer(value: &HeaderValue) -> Option<String> {
    let value = value.to_str().ok()?.trim();
    let (scheme, token) = value.split_at_checked(BEARER.len())?;
    if !scheme.eq_ignore_ascii_case(BEARER) {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::COOKIE;

    fn headers(pairs: &[(http::HeaderName, &str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|(k, v)| (k.clone(), HeaderValue::from_str(v).unwrap()))
            .collect()
    }

    #[test]
    fn header_takes_precedence() {
        let mut h = headers(&[
            (AUTHORIZATION, "Bearer from-header"),
            (COOKIE, "session=from-cookie"),
        ]);
        let token = TokenExtractor::new("session").extract(&mut h);
        assert_eq!(token.as_deref(), Some("from-header"));
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer from-header");
    }

    #[test]
    fn cookie_synthesizes_header() {
        let mut h = headers(&[(COOKIE, "other=x; session=abc123")]);
        let token = TokenExtractor::new("session").extract(&mut h);
        assert_eq!(token.as_deref(), Some("abc123"));
        assert_eq!(h.get(AUTHORIZATION).unwrap(), "Bearer abc123");
    }

    #[test]
    fn cookie_names_are_independent() {
        let mut h = headers(&[(COOKIE, "identity=abc123")]);
        assert_eq!(TokenExtractor::new("access").extract(&mut h), None);
        assert!(h.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn non_bearer_header_yields_nothing() {
        let mut h = headers(&[(AUTHORIZATION, "Basic dXNlcjpwYXNz"), (COOKIE, "session=abc")]);
        assert_eq!(TokenExtractor::new("session").extract(&mut h), None);

        let mut h = headers(&[(AUTHORIZATION, "Bearer   ")]);
        assert_eq!(TokenExtractor::new("session").extract(&mut h), None);
    }

    #[test]
    fn no_credentials() {
        let mut h = HeaderMap::new();
        assert_eq!(TokenExtractor::new("session").extract(&mut h), None);

        let mut h = headers(&[(COOKIE, "session=")]);
        assert_eq!(TokenExtractor::new("session").extract(&mut h), None);
    }
}
