//! Core types for the reconciler.

use std::fmt;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use logset_api::LogStore;

/// The single corrective step chosen by observation.
///
/// Variants are listed in priority order: at most one is produced per pass,
/// and a higher-priority one suppresses everything below it.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Base resources are missing; build the whole cluster.
    Create,
    /// Repair failed stores.
    Repair { failed_stores: Vec<LogStore> },
    /// Declared replicas differ from desired. Carries the current
    /// StatefulSet so only the replica count is written.
    Scale { stateful_set: Box<StatefulSet> },
    /// The pod template drifted. Carries the desired StatefulSet and the
    /// config map it references.
    Update {
        stateful_set: Box<StatefulSet>,
        config_map: Box<ConfigMap>,
    },
}

impl Action {
    /// Get the kind of the action.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Create => ActionKind::Create,
            Self::Repair { .. } => ActionKind::Repair,
            Self::Scale { .. } => ActionKind::Scale,
            Self::Update { .. } => ActionKind::Update,
        }
    }

    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::Create => "create base resources".to_string(),
            Self::Repair { failed_stores } => {
                format!("repair {} failed stores", failed_stores.len())
            }
            Self::Scale { stateful_set } => format!(
                "scale statefulset {} (currently {} replicas)",
                stateful_set.name_any(),
                stateful_set
                    .spec
                    .as_ref()
                    .and_then(|s| s.replicas)
                    .unwrap_or(1)
            ),
            Self::Update { stateful_set, .. } => {
                format!("update statefulset {}", stateful_set.name_any())
            }
        }
    }
}

/// Discriminant of [`Action`], for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Create,
    Repair,
    Scale,
    Update,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Repair => "repair",
            Self::Scale => "scale",
            Self::Update => "update",
        };
        f.write_str(name)
    }
}

/// What a reconcile pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// An action was executed successfully.
    Acted(ActionKind),
    /// Observation found nothing to do.
    Converged,
    /// The resource is being deleted and sub-resources still exist.
    AwaitingCascade,
    /// Finalization completed and the finalizer was released.
    Finalized,
}

/// Result of a successful pass, with a requeue hint for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// What the pass did.
    pub outcome: PassOutcome,
    /// When to run the next pass, if at all.
    pub requeue_after: Option<Duration>,
}

impl PassReport {
    /// Create a new pass report.
    pub const fn new(outcome: PassOutcome, requeue_after: Option<Duration>) -> Self {
        Self {
            outcome,
            requeue_after,
        }
    }

    /// Check whether the pass changed anything.
    pub const fn acted(&self) -> bool {
        matches!(self.outcome, PassOutcome::Acted(_))
    }
}
