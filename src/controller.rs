//! Controller wiring.
//!
//! `kube::runtime::Controller` provides the scheduling the reconciler relies
//! on: passes for different objects run concurrently, two passes for the same
//! object never overlap, owned StatefulSets and Services re-trigger their
//! owner, and failed passes are retried after a backoff.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use logset_api::LogSet;
use logset_core::Error;
use logset_reconciler::{KubeAccessor, PassReport, Reconciler};
use tracing::{debug, info, warn};

use crate::config::Config;

/// State shared by every pass.
pub struct Context {
    reconciler: Reconciler<KubeAccessor>,
    error_backoff: Duration,
}

impl Context {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            reconciler: Reconciler::new(
                Arc::new(KubeAccessor::new(client)),
                config.reconciler.clone(),
            ),
            error_backoff: config.error_backoff(),
        }
    }
}

/// Map a pass report onto the controller's requeue instruction.
pub fn requeue(report: &PassReport) -> Action {
    report
        .requeue_after
        .map_or_else(Action::await_change, Action::requeue)
}

async fn reconcile(ls: Arc<LogSet>, ctx: Arc<Context>) -> Result<Action, Error> {
    let report = ctx.reconciler.reconcile(&ls).await?;
    debug!(logset = %ls.name_any(), outcome = ?report.outcome, "Pass complete");
    Ok(requeue(&report))
}

fn error_policy(ls: Arc<LogSet>, err: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        logset = %ls.name_any(),
        namespace = ?ls.namespace(),
        error = %err,
        "Pass failed, retrying"
    );
    Action::requeue(ctx.error_backoff)
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<DynamicType = (), Scope = k8s_openapi::NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Run the controller until a termination signal arrives.
pub async fn run(client: Client, config: &Config) {
    let namespace = config.namespace.as_deref();
    let logsets = api::<LogSet>(&client, namespace);
    let stateful_sets = api::<StatefulSet>(&client, namespace);
    let services = api::<Service>(&client, namespace);
    let ctx = Arc::new(Context::new(client, config));

    info!(
        namespace = namespace.unwrap_or("<all>"),
        concurrency = config.concurrency,
        "Starting LogSet controller"
    );

    Controller::new(logsets, watcher::Config::default())
        .owns(stateful_sets, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(config.concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(object = %object, "Reconciled"),
                Err(err) => warn!(error = %err, "Controller error"),
            }
        })
        .await;

    info!("LogSet controller stopped");
}

#[cfg(test)]
mod tests {
    use logset_reconciler::{ActionKind, PassOutcome};

    use super::*;

    #[test]
    fn test_requeue_follows_report() {
        let acted = PassReport::new(
            PassOutcome::Acted(ActionKind::Scale),
            Some(Duration::from_secs(5)),
        );
        assert_eq!(requeue(&acted), Action::requeue(Duration::from_secs(5)));

        let finalized = PassReport::new(PassOutcome::Finalized, None);
        assert_eq!(requeue(&finalized), Action::await_change());
    }
}
