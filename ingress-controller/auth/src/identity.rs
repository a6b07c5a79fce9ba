use crate::AuthError;
use serde::Deserialize;
use tracing::debug;

const USER_INFO_PATH: &str = "/v1/auth/userInfo";

/// Exchanges an access token for the subject it was issued to.
#[derive(Clone, Debug)]
pub struct IdentityClient {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    sub: Option<String>,
}

impl IdentityClient {
    pub fn new(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            url: format!("{}{USER_INFO_PATH}", endpoint.trim_end_matches('/')),
        }
    }

    /// Resolves the subject identifier for `token`.
    ///
    /// Any failure, including a missing token, must be treated as unauthenticated.
    pub async fn resolve_identity(&self, token: &str) -> Result<String, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let rsp = self
            .client
            .post(&self.url)
            .form(&[("access_token", token)])
            .send()
            .await?;
        let status = rsp.status();
        if !status.is_success() {
            return Err(AuthError::Status(status));
        }

        let body = rsp.bytes().await?;
        if body.is_empty() {
            return Err(AuthError::EmptyBody);
        }
        let info = serde_json::from_slice::<UserInfo>(&body)?;
        let sub = info
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;
        debug!(%sub, "resolved identity");
        Ok(sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        matchers::{body_string, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn mk_client(server: &MockServer) -> IdentityClient {
        IdentityClient::new(reqwest::Client::new(), &server.uri())
    }

    #[tokio::test]
    async fn resolves_subject() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(USER_INFO_PATH))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("access_token=abc123"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"sub": "alice"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sub = mk_client(&server).resolve_identity("abc123").await;
        assert_eq!(sub.unwrap(), "alice");
    }

    #[tokio::test]
    async fn missing_token_skips_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = mk_client(&server).resolve_identity("").await;
        assert!(matches!(err, Err(AuthError::MissingToken)));
    }

    #[tokio::test]
    async fn fails_without_subject() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(USER_INFO_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;
        let err = mk_client(&server).resolve_identity("abc").await;
        assert!(matches!(err, Err(AuthError::MissingSubject)));
    }

    #[tokio::test]
    async fn fails_on_empty_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(USER_INFO_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        let err = mk_client(&server).resolve_identity("abc").await;
        assert!(matches!(err, Err(AuthError::EmptyBody)));
    }

    #[tokio::test]
    async fn fails_on_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(USER_INFO_PATH))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(serde_json::json!({"sub": "alice"})),
            )
            .mount(&server)
            .await;
        let err = mk_client(&server).resolve_identity("abc").await;
        assert!(matches!(err, Err(AuthError::Status(s)) if s == 401));
    }

    #[tokio::test]
    async fn fails_when_unreachable() {
        let client = IdentityClient::new(reqwest::Client::new(), "http://127.0.0.1:1");
        let err = client.resolve_identity("abc").await;
        assert!(matches!(err, Err(AuthError::Transport(_))));
    }
}
