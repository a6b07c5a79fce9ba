//! Request-time authentication and authorization for ingress traffic.
//!
//! Every check is fail-closed: a missing credential, an unreachable identity provider or policy
//! decision point, or a malformed response all resolve to a denial.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod gate;
mod identity;
mod pages;
mod policy;
mod token;

pub use self::{
    gate::{Check, Gate, GateConfig},
    identity::IdentityClient,
    pages::ErrorPages,
    policy::{PolicyClient, PolicyQuery, PolicyResource},
    token::TokenExtractor,
};

/// Header carrying the subject resolved by the identity provider on allowed requests.
pub const SUBJECT_HEADER: &str = "x-auth-subject";

/// Why a request was not authenticated or authorized.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no bearer credential")]
    MissingToken,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("empty response body")]
    EmptyBody,

    #[error("response lacks a subject")]
    MissingSubject,

    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}
