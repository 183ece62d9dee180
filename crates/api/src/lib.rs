//! The `LogSet` custom resource.
//!
//! A `LogSet` declares the shape of a log-service cluster: how many stores,
//! which image, how much storage and the bootstrap parameters. The status
//! sub-document is owned by the reconciler and fully recomputed every pass.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod condition;
pub mod logset;

pub use condition::{Condition, ConditionStatus};
pub use logset::{
    InitialConfig, LogSet, LogSetDiscovery, LogSetSpec, LogSetStatus, LogStore,
    ResolvedInitialConfig, StorePhase, StoreResources, VolumeSpec,
};

/// API group of the `LogSet` resource.
pub const GROUP: &str = "logservice.dev";

/// Condition type summarising cluster health.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Reason carried by `Ready=False` when too few stores are available.
pub const REASON_NO_ENOUGH_READY_STORES: &str = "NoEnoughReadyStores";
