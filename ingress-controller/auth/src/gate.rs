use crate::{
    AuthError, ErrorPages, IdentityClient, PolicyClient, PolicyQuery, PolicyResource,
    TokenExtractor, SUBJECT_HEADER,
};
use bytes::Bytes;
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode, Uri,
};
use http_body_util::Full;
use std::{path::PathBuf, time::Duration};
use tracing::{debug, info};

const ORIGINAL_METHOD: &str = "x-original-method";
const ORIGINAL_URI: &str = "x-original-uri";

/// Configures a [`Gate`].
#[derive(Clone, Debug)]
pub struct GateConfig {
    pub identity_endpoint: String,
    pub pdp_endpoint: String,
    /// Bounds each outbound call.
    pub timeout: Duration,
    pub identity_cookie: String,
    pub access_cookie: String,
    pub policy_cookie: String,
    /// Directory holding `401.html`, `403.html` and `404.html`.
    pub error_page_dir: Option<PathBuf>,
    pub resource: PolicyResource,
}

/// The check performed for an auth subrequest.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Check {
    Identity,
    Access,
    Policy,
}

/// Turns requests into allow or deny responses.
#[derive(Clone, Debug)]
pub struct Gate {
    identity_token: TokenExtractor,
    access_token: TokenExtractor,
    policy_token: TokenExtractor,
    identity: IdentityClient,
    policy: PolicyClient,
    pages: ErrorPages,
}

// === impl Check ===

impl Check {
    pub fn from_path(path: &str) -> Option<Self> {
        match path.trim_end_matches('/') {
            "/auth/identity" => Some(Self::Identity),
            "/auth/access" => Some(Self::Access),
            "/auth/policy" => Some(Self::Policy),
            _ => None,
        }
    }
}

// === impl Gate ===

impl Gate {
    pub fn new(config: GateConfig) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: GateConfig, client: reqwest::Client) -> Self {
        Self {
            identity_token: TokenExtractor::new(config.identity_cookie),
            access_token: TokenExtractor::new(config.access_cookie),
            policy_token: TokenExtractor::new(config.policy_cookie),
            identity: IdentityClient::new(client.clone(), &config.identity_endpoint),
            policy: PolicyClient::new(client, &config.pdp_endpoint, config.resource),
            pages: ErrorPages::load(config.error_page_dir.as_deref()),
        }
    }

    /// Routes an auth subrequest to its check; unknown paths are answered with 404.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let (parts, _) = req.into_parts();
        match Check::from_path(parts.uri.path()) {
            Some(check) => {
                self.check(check, &parts.method, &parts.uri, parts.headers)
                    .await
            }
            None => {
                debug!(path = %parts.uri.path(), "unknown auth route");
                page(StatusCode::NOT_FOUND, &self.pages.not_found)
            }
        }
    }

    pub async fn check(
        &self,
        check: Check,
        method: &Method,
        uri: &Uri,
        mut headers: HeaderMap,
    ) -> Response<Full<Bytes>> {
        let extractor = match check {
            Check::Identity => &self.identity_token,
            Check::Access => &self.access_token,
            Check::Policy => &self.policy_token,
        };
        let Some(token) = extractor.extract(&mut headers) else {
            debug!(?check, cookie = %extractor.cookie(), "no credential");
            return self.unauthorized();
        };

        if check != Check::Policy {
            return match self.identity.resolve_identity(&token).await {
                Ok(subject) => allow(&headers, Some(&subject)),
                Err(error) => {
                    info!(?check, %error, "identity check failed");
                    self.unauthorized()
                }
            };
        }

        let subject = match self.identity.resolve_identity(&token).await {
            Ok(subject) => Some(subject),
            Err(error) => {
                debug!(%error, "policy subject unknown");
                None
            }
        };
        let (method, path) = original_request(method, uri, &headers);
        let query = PolicyQuery::new(&method, &path, subject.as_deref().unwrap_or_default());
        match self.policy.authorize(Some(&token), &query).await {
            Ok(true) => allow(&headers, subject.as_deref()),
            Ok(false) => {
                info!(action = %query.action, "policy denied request");
                page(StatusCode::FORBIDDEN, &self.pages.forbidden)
            }
            Err(error) => {
                info!(action = %query.action, %error, "policy check failed");
                page(StatusCode::FORBIDDEN, &self.pages.forbidden)
            }
        }
    }

    fn unauthorized(&self) -> Response<Full<Bytes>> {
        let mut rsp = page(StatusCode::UNAUTHORIZED, &self.pages.unauthorized);
        rsp.headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        rsp
    }
}

/// The method and path of the request being authorized, preferring the values forwarded by the
/// proxy.
fn original_request(method: &Method, uri: &Uri, headers: &HeaderMap) -> (String, String) {
    let forwarded = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let method = forwarded(ORIGINAL_METHOD).unwrap_or(method.as_str());
    let path = forwarded(ORIGINAL_URI)
        .and_then(|u| u.split('?').next())
        .unwrap_or(uri.path());
    (method.to_string(), path.to_string())
}

fn allow(headers: &HeaderMap, subject: Option<&str>) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::default());
    if let Some(auth) = headers.get(AUTHORIZATION) {
        rsp.headers_mut().insert(AUTHORIZATION, auth.clone());
    }
    if let Some(subject) = subject.and_then(|s| HeaderValue::from_str(s).ok()) {
        rsp.headers_mut().insert(SUBJECT_HEADER, subject);
    }
    rsp
}

fn page(status: StatusCode, body: &Bytes) -> Response<Full<Bytes>> {
    let mut rsp = Response::new(Full::new(body.clone()));
    *rsp.status_mut() = status;
    rsp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
    rsp
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use wiremock::{
        matchers::{body_partial_json, body_string, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    struct Fixture {
        server: MockServer,
        gate: Gate,
        _pages: tempfile::TempDir,
    }

    fn mk_config(server: &MockServer) -> GateConfig {
        GateConfig {
            identity_endpoint: server.uri(),
            pdp_endpoint: server.uri(),
            timeout: Duration::from_secs(5),
            identity_cookie: "id_session".to_string(),
            access_cookie: "access_session".to_string(),
            policy_cookie: "policy_session".to_string(),
            error_page_dir: None,
            resource: PolicyResource::default(),
        }
    }

    async fn mk_fixture() -> Fixture {
        let server = MockServer::start().await;
        let pages = tempfile::tempdir().unwrap();
        std::fs::write(pages.path().join("401.html"), "who are you").unwrap();
        std::fs::write(pages.path().join("403.html"), "go away").unwrap();
        std::fs::write(pages.path().join("404.html"), "nothing here").unwrap();
        let gate = Gate::new(GateConfig {
            error_page_dir: Some(pages.path().to_path_buf()),
            ..mk_config(&server)
        })
        .unwrap();
        Fixture {
            server,
            gate,
            _pages: pages,
        }
    }

    async fn mock_identity(server: &MockServer, token: &str, sub: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/auth/userInfo"))
            .and(body_string(format!("access_token={token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"sub": sub})))
            .mount(server)
            .await;
    }

    async fn mock_decision(server: &MockServer, decision: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/authz"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "decision": decision })),
            )
            .mount(server)
            .await;
    }

    fn mk_request(uri: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut req = Request::get(uri);
        for (k, v) in headers {
            req = req.header(*k, *v);
        }
        req.body(()).unwrap()
    }

    async fn body(rsp: Response<Full<Bytes>>) -> Bytes {
        rsp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn missing_credentials_are_unauthorized() {
        let fx = mk_fixture().await;
        let rsp = fx
            .gate
            .handle(mk_request("/auth/identity", &[("cookie", "other=abc")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(rsp.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
        assert_eq!(body(rsp).await, "who are you");
        assert!(fx.server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unconfigured_pages_are_empty() {
        let fx = mk_fixture().await;
        let gate = Gate::new(mk_config(&fx.server)).unwrap();
        let rsp = gate.handle(mk_request("/auth/identity", &[])).await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
        assert!(body(rsp).await.is_empty());
    }

    #[tokio::test]
    async fn identity_allows_known_subjects() {
        let fx = mk_fixture().await;
        mock_identity(&fx.server, "abc123", "alice").await;

        let rsp = fx
            .gate
            .handle(mk_request("/auth/identity", &[("cookie", "id_session=abc123")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers().get(AUTHORIZATION).unwrap(), "Bearer abc123");
        assert_eq!(rsp.headers().get(SUBJECT_HEADER).unwrap(), "alice");
    }

    #[tokio::test]
    async fn access_uses_its_own_cookie() {
        let fx = mk_fixture().await;
        mock_identity(&fx.server, "abc123", "alice").await;

        let rsp = fx
            .gate
            .handle(mk_request("/auth/access", &[("cookie", "id_session=abc123")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);

        let rsp = fx
            .gate
            .handle(mk_request("/auth/access", &[("cookie", "access_session=abc123")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn identity_failures_are_unauthorized() {
        let fx = mk_fixture().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/userInfo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&fx.server)
            .await;

        let rsp = fx
            .gate
            .handle(mk_request("/auth/identity", &[("authorization", "Bearer abc")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(rsp).await, "who are you");
    }

    #[tokio::test]
    async fn policy_denial_is_forbidden() {
        let fx = mk_fixture().await;
        mock_decision(&fx.server, "Deny").await;

        let rsp = fx
            .gate
            .handle(mk_request("/auth/policy", &[("authorization", "Bearer abc123")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body(rsp).await, "go away");
    }

    #[tokio::test]
    async fn policy_permits_the_original_request() {
        let fx = mk_fixture().await;
        mock_identity(&fx.server, "abc123", "alice").await;
        Mock::given(method("POST"))
            .and(path("/v1/authz"))
            .and(body_partial_json(serde_json::json!({
                "action": "DELETE /api/items/7",
                "subject": {"id": "alice", "type": "user"},
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"decision": "Permit"})),
            )
            .expect(1)
            .mount(&fx.server)
            .await;

        let rsp = fx
            .gate
            .handle(mk_request(
                "/auth/policy",
                &[
                    ("cookie", "policy_session=abc123"),
                    ("x-original-method", "DELETE"),
                    ("x-original-uri", "/api/items/7?force=true"),
                ],
            ))
            .await;
        assert_eq!(rsp.status(), StatusCode::OK);
        assert_eq!(rsp.headers().get(AUTHORIZATION).unwrap(), "Bearer abc123");
    }

    #[tokio::test]
    async fn policy_fails_closed() {
        let fx = mk_fixture().await;
        Mock::given(method("POST"))
            .and(path("/v1/authz"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&fx.server)
            .await;

        let rsp = fx
            .gate
            .handle(mk_request("/auth/policy", &[("authorization", "Bearer abc123")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::FORBIDDEN);

        let rsp = fx.gate.handle(mk_request("/auth/policy", &[])).await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn slow_upstreams_deny() {
        let server = MockServer::start().await;
        let slow = Duration::from_secs(2);
        Mock::given(method("POST"))
            .and(path("/v1/auth/userInfo"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"sub": "alice"}))
                    .set_delay(slow),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/authz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"decision": "Permit"}))
                    .set_delay(slow),
            )
            .mount(&server)
            .await;
        let gate = Gate::new(GateConfig {
            timeout: Duration::from_millis(200),
            ..mk_config(&server)
        })
        .unwrap();

        let rsp = gate
            .handle(mk_request("/auth/identity", &[("authorization", "Bearer abc")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::UNAUTHORIZED);

        let rsp = gate
            .handle(mk_request("/auth/policy", &[("authorization", "Bearer abc")]))
            .await;
        assert_eq!(rsp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let fx = mk_fixture().await;
        let rsp = fx.gate.handle(mk_request("/auth/other", &[])).await;
        assert_eq!(rsp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(rsp).await, "nothing here");
    }

    #[test]
    fn routes() {
        assert_eq!(Check::from_path("/auth/identity"), Some(Check::Identity));
        assert_eq!(Check::from_path("/auth/access/"), Some(Check::Access));
        assert_eq!(Check::from_path("/auth/policy"), Some(Check::Policy));
        assert_eq!(Check::from_path("/"), None);
    }

    #[test]
    fn forwarded_request_overrides() {
        let headers = [(
            http::HeaderName::from_static(ORIGINAL_URI),
            HeaderValue::from_static("/a/b?c=d"),
        )]
        .into_iter()
        .collect::<HeaderMap>();
        let uri = "/auth/policy".parse().unwrap();
        assert_eq!(
            original_request(&Method::POST, &uri, &headers),
            ("POST".to_string(), "/a/b".to_string())
        );
        assert_eq!(
            original_request(&Method::GET, &uri, &HeaderMap::new()),
            ("GET".to_string(), "/auth/policy".to_string())
        );
    }
}
