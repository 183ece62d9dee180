#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # logset-operator
//!
//! Kubernetes operator for log-service clusters.
//!
//! This library exposes the binary's configuration and controller wiring and
//! re-exports the workspace crates for convenience.

pub use logset_api;
pub use logset_core;
pub use logset_reconciler;

pub mod cli;
pub mod config;
pub mod controller;
