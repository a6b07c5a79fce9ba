//! Ingress certificate index
//!
//! Keeps an in-memory store of TLS material synchronized with Kubernetes secrets:
//!
//! - `Secret` and `Ingress` resources are indexed by watches (see [`SecretIndex`] and
//!   [`IngressIndex`]), which expose them through the narrow provider traits from the core crate.
//! - The [`Synchronizer`] derives a [`CertRecord`] from a secret, writes its PEM artifact, and
//!   reconciles it into the [`CertStore`], signaling [`Reconfigure`] when anything changed.
//! - The [`Reconciler`] periodically finds secrets referenced by ingresses that are not yet in the
//!   store and synchronizes them.
//! - The [`ChainCompletion`] job periodically upgrades stored records with a full intermediate
//!   chain artifact.
//!
//! ```text
//! [ Ingress ] -> [ Reconciler ] -> [ Synchronizer ] <- [ Secret ]
//!                                        |
//!                                        v
//!                  [ ChainCompletion ] -> [ CertStore ] -> Reconfigure
//! ```
//!
//! The [`Controller`] drives all of these from a single task.
//!
//! [`CertRecord`]: ingress_controller_core::CertRecord
//! [`Reconfigure`]: ingress_controller_core::Reconfigure

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod chain;
mod controller;
pub mod ingresses;
pub mod metrics;
pub mod pem;
mod reconcile;
pub mod secrets;
mod store;
mod sync;


pub use self::{
    chain::{AiaChainResolver, ChainCompletion, ResolveChain},
    controller::Controller,
    ingresses::{IngressCache, IngressIndex},
    reconcile::Reconciler,
    secrets::{SecretCache, SecretIndex, SyncRequest},
    store::{CertStore, SharedStore},
    sync::{SyncError, Synchronizer},
};
