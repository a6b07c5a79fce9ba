use crate::AuthError;
use serde::{Deserialize, Serialize};
use tracing::debug;

const AUTHZ_PATH: &str = "/v1/authz";
const PERMIT: &str = "Permit";
const SUBJECT_TYPE: &str = "user";

/// Describes the protected resource in every policy query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyResource {
    pub crn: String,
    pub service_name: String,
    pub account_id: String,
}

/// The per-request part of a policy query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyQuery {
    /// `"<METHOD> <path>"`.
    pub action: String,
    /// Best effort; empty when the subject is unknown.
    pub subject_id: String,
}

/// Asks a policy decision point whether a request may proceed.
#[derive(Clone, Debug)]
pub struct PolicyClient {
    client: reqwest::Client,
    url: String,
    resource: PolicyResource,
}

#[derive(Debug, Serialize)]
struct AuthzRequest<'a> {
    action: &'a str,
    subject: Subject<'a>,
    resource: Resource<'a>,
}

#[derive(Debug, Serialize)]
struct Subject<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

#[derive(Debug, Serialize)]
struct Resource<'a> {
    crn: &'a str,
    attributes: Attributes<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Attributes<'a> {
    service_name: &'a str,
    account_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthzResponse {
    #[serde(default)]
    decision: Option<String>,
}

// === impl PolicyQuery ===

impl PolicyQuery {
    pub fn new(method: &str, path: &str, subject_id: impl ToString) -> Self {
        Self {
            action: format!("{} {}", method.to_ascii_uppercase(), path),
            subject_id: subject_id.to_string(),
        }
    }
}

// === impl PolicyClient ===

impl PolicyClient {
    pub fn new(client: reqwest::Client, endpoint: &str, resource: PolicyResource) -> Self {
        Self {
            client,
            url: format!("{}{AUTHZ_PATH}", endpoint.trim_end_matches('/')),
            resource,
        }
    }

    /// Returns true only if the decision point explicitly permits the query.
    ///
    /// Without a bearer token the query is denied without contacting the decision point. Errors
    /// must be treated as denials.
    pub async fn authorize(
        &self,
        token: Option<&str>,
        query: &PolicyQuery,
    ) -> Result<bool, AuthError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let req = AuthzRequest {
            action: &query.action,
            subject: Subject {
                id: &query.subject_id,
                kind: SUBJECT_TYPE,
            },
            resource: Resource {
                crn: &self.resource.crn,
                attributes: Attributes {
                    service_name: &self.resource.service_name,
                    account_id: &self.resource.account_id,
                },
            },
        };
        let rsp = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(&req)
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
        let AuthzResponse { decision } = serde_json::from_slice(&body)?;
        debug!(action = %query.action, ?decision, "policy decision");
        Ok(decision.as_deref() == Some(PERMIT))
    }
}
