//! Pass driver.
//!
//! One call to [`Reconciler::reconcile`] is one reconciliation pass for one
//! `LogSet`. The caller must never run two passes for the same object at
//! once; errors are returned unmodified so the caller can retry the whole
//! pass.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use kube::ResourceExt;
use logset_api::LogSet;
use logset_core::Result;
use tracing::{debug, info};

use crate::accessor::ResourceAccessor;
use crate::actor::{LogSetActor, namespace_of};
use crate::config::ReconcilerConfig;
use crate::types::{PassOutcome, PassReport};

/// Holds deletion of a `LogSet` until its owned resources are gone.
pub const FINALIZER: &str = "logset.logservice.dev/finalizer";

fn has_finalizer(ls: &LogSet) -> bool {
    ls.finalizers().iter().any(|f| f == FINALIZER)
}

/// Runs reconciliation passes against an object store.
pub struct Reconciler<A> {
    actor: LogSetActor<A>,
}

impl<A: ResourceAccessor> Reconciler<A> {
    /// Create a new reconciler.
    pub fn new(accessor: Arc<A>, config: ReconcilerConfig) -> Self {
        Self {
            actor: LogSetActor::new(accessor, config),
        }
    }

    pub fn actor(&self) -> &LogSetActor<A> {
        &self.actor
    }

    pub fn config(&self) -> &ReconcilerConfig {
        self.actor.config()
    }

    /// Run one pass for `ls`.
    ///
    /// # Errors
    ///
    /// Any accessor error, `InvalidSpec` for an unrealisable spec, or the
    /// combined error of a partially failed create or finalize.
    pub async fn reconcile(&self, ls: &LogSet) -> Result<PassReport> {
        self.reconcile_at(ls, Utc::now()).await
    }

    /// [`reconcile`](Self::reconcile) with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`reconcile`](Self::reconcile).
    pub async fn reconcile_at(&self, ls: &LogSet, now: DateTime<Utc>) -> Result<PassReport> {
        if ls.metadata.deletion_timestamp.is_some() {
            return self.finalize(ls).await;
        }

        let accessor = self.actor.accessor();
        let namespace = namespace_of(ls)?;
        let mut ls = if has_finalizer(ls) {
            ls.clone()
        } else {
            debug!(logset = %ls.name_any(), "Adding finalizer");
            accessor
                .patch::<LogSet, _>(&namespace, &ls.name_any(), |latest| {
                    latest.finalizers_mut().push(FINALIZER.to_string());
                })
                .await?
        };

        ls.spec.validate()?;

        let previous = ls.status.clone();
        let action = self.actor.observe(&mut ls, now).await?;
        if ls.status != previous {
            ls = accessor.update_status(&ls).await?;
        }

        let config = self.actor.config();
        let Some(action) = action else {
            debug!(logset = %ls.name_any(), "Converged");
            return Ok(PassReport::new(
                PassOutcome::Converged,
                Some(config.resync_interval),
            ));
        };

        let kind = action.kind();
        info!(logset = %ls.name_any(), action = %action.description(), "Chose action");
        self.actor.execute(&ls, action).await?;
        Ok(PassReport::new(
            PassOutcome::Acted(kind),
            Some(config.action_requeue),
        ))
    }

    async fn finalize(&self, ls: &LogSet) -> Result<PassReport> {
        if !has_finalizer(ls) {
            return Ok(PassReport::new(PassOutcome::Finalized, None));
        }

        let (complete, error) = self.actor.finalize(ls).await;
        if let Some(err) = error {
            return Err(err);
        }
        if !complete {
            debug!(logset = %ls.name_any(), "Waiting for owned resources to be removed");
            return Ok(PassReport::new(
                PassOutcome::AwaitingCascade,
                Some(self.actor.config().action_requeue),
            ));
        }

        let namespace = namespace_of(ls)?;
        self.actor
            .accessor()
            .patch::<LogSet, _>(&namespace, &ls.name_any(), |latest| {
                latest.finalizers_mut().retain(|f| f != FINALIZER);
            })
            .await?;
        info!(logset = %ls.name_any(), "Finalized");
        Ok(PassReport::new(PassOutcome::Finalized, None))
    }
}
