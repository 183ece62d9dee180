//! Reconciliation engine for `LogSet` clusters.
//!
//! Each pass re-derives the cluster's state from what is live in the object
//! store and takes at most one corrective step:
//!
//! - **Create**: base resources are missing
//! - **Repair**: some stores have failed
//! - **Scale**: the declared replica count differs from the desired one
//! - **Update**: the pod template or config drifted
//!
//! The first matching step wins. Status is recomputed from live pods on
//! every pass and persisted before the step runs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use logset_reconciler::{KubeAccessor, Reconciler, ReconcilerConfig};
//!
//! let accessor = Arc::new(KubeAccessor::new(client));
//! let reconciler = Reconciler::new(accessor, ReconcilerConfig::default());
//! let report = reconciler.reconcile(&logset).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod accessor;
pub mod actor;
pub mod builders;
pub mod config;
pub mod reconciler;
pub mod status;
pub mod types;

pub use accessor::{
    Fault, InMemoryAccessor, KubeAccessor, KubeObject, Operation, ResourceAccessor, Write,
    create_owned,
};
pub use actor::LogSetActor;
pub use config::{IdRange, ReconcilerConfig};
pub use logset_core::{Error, Result};
pub use reconciler::{FINALIZER, Reconciler};
pub use status::{StoreStatus, collect_store_status};
pub use types::{Action, ActionKind, PassOutcome, PassReport};
