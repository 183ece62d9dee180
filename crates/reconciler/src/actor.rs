//! The reconciliation actor.
//!
//! `observe` re-derives the cluster's state from scratch and picks at most
//! one corrective [`Action`]; `execute` is the single dispatch point that
//! runs it. Nothing is persisted between passes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Service};
use kube::ResourceExt;
use logset_api::{LogSet, LogStore};
use logset_core::{Error, ErrorSet, Result, ResultExt, ignore};
use tracing::{debug, info, warn};

use crate::accessor::{ResourceAccessor, create_owned};
use crate::builders::{
    bootstrap_name, build_bootstrap_config, build_config_map, build_discovery_service, build_headless_service,
    build_stateful_set, declared_replicas, discovery_svc_name, headless_svc_name,
    selector_labels, set_replicas, sts_name, sync_pods, sync_replicas,
    sync_volume_claim_template,
};
use crate::config::ReconcilerConfig;
use crate::status;
use crate::types::Action;

pub(crate) fn namespace_of(ls: &LogSet) -> Result<String> {
    ls.namespace().ok_or_else(|| {
        Error::invariant_violation(format!("LogSet '{}' has no namespace", ls.name_any()))
    })
}

/// Observes one `LogSet` and drives it one step toward its spec.
pub struct LogSetActor<A> {
    accessor: Arc<A>,
    config: ReconcilerConfig,
}

impl<A: ResourceAccessor> LogSetActor<A> {
    /// Create a new actor.
    pub fn new(accessor: Arc<A>, config: ReconcilerConfig) -> Self {
        Self { accessor, config }
    }

    pub fn accessor(&self) -> &Arc<A> {
        &self.accessor
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Decide the next action for `ls`.
    ///
    /// Once the base resources exist, the status of `ls` is recomputed from
    /// its live pods and written onto `ls` before the decision is made;
    /// persisting it is the caller's job. Performs no writes.
    ///
    /// # Errors
    ///
    /// Propagates accessor failures other than `NotFound`, and `InvalidSpec`
    /// when the desired configuration cannot be rendered.
    pub async fn observe(&self, ls: &mut LogSet, now: DateTime<Utc>) -> Result<Option<Action>> {
        let namespace = namespace_of(ls)?;
        let discovery = self
            .accessor
            .get::<Service>(&namespace, &discovery_svc_name(ls))
            .await
            .found()?;
        let live = self
            .accessor
            .get::<StatefulSet>(&namespace, &sts_name(ls))
            .await
            .found()?;
        let (Some(_), Some(live)) = (discovery, live) else {
            return Ok(Some(Action::Create));
        };

        let pods: Vec<Pod> = self
            .accessor
            .list(&namespace, &selector_labels(ls))
            .await?;
        let recomputed = status::recompute(ls, &pods, now, self.config.store_failure_timeout);
        let failed_stores = recomputed.failed_stores.clone();
        ls.status = Some(recomputed);

        if !failed_stores.is_empty() {
            return Ok(Some(Action::Repair { failed_stores }));
        }

        if declared_replicas(&live) != ls.spec.replicas {
            return Ok(Some(Action::Scale {
                stateful_set: Box::new(live),
            }));
        }

        let config_map = build_config_map(ls)?;
        let mut desired = live.clone();
        sync_pods(ls, &mut desired, &config_map);
        if desired != live {
            return Ok(Some(Action::Update {
                stateful_set: Box::new(desired),
                config_map: Box::new(config_map),
            }));
        }

        Ok(None)
    }

    /// Run `action` against `ls`.
    ///
    /// # Errors
    ///
    /// Whatever the chosen handler returns.
    pub async fn execute(&self, ls: &LogSet, action: Action) -> Result<()> {
        debug!(logset = %ls.name_any(), action = %action.description(), "Executing action");
        match action {
            Action::Create => self.create(ls).await,
            Action::Repair { failed_stores } => self.repair(ls, &failed_stores),
            Action::Scale { stateful_set } => self.scale(ls, &stateful_set).await,
            Action::Update {
                stateful_set,
                config_map,
            } => self.update(ls, &stateful_set, *config_map).await,
        }
    }

    /// Create every base resource.
    ///
    /// All creations are attempted. `AlreadyExists` counts as success; any
    /// other failure is collected, and all of them are returned together.
    /// An existing bootstrap marker is kept as is, and the StatefulSet is only
    /// created once both maps its pods mount are in place.
    ///
    /// # Errors
    ///
    /// `Combined` (or the single error) of every failed creation.
    pub async fn create(&self, ls: &LogSet) -> Result<()> {
        let accessor = self.accessor.as_ref();
        let mut errors = ErrorSet::new();

        let namespace = namespace_of(ls)?;
        let bootstrapped = match accessor
            .exists::<ConfigMap>(&namespace, &bootstrap_name(ls))
            .await
        {
            Ok(true) => true,
            Ok(false) => match build_bootstrap_config(ls, &self.config.id_range) {
                Ok(bootstrap) => errors
                    .record(ignore(
                        Error::is_already_exists,
                        create_owned(accessor, ls, bootstrap).await,
                    ))
                    .is_some(),
                Err(err) => {
                    errors.push(err);
                    false
                }
            },
            Err(err) => {
                errors.push(err);
                false
            }
        };

        let headless = build_headless_service(ls);
        errors.record(ignore(
            Error::is_already_exists,
            create_owned(accessor, ls, headless.clone()).await,
        ));

        match build_config_map(ls) {
            Ok(config_map) => {
                let written = errors.record(ignore(
                    Error::is_already_exists,
                    create_owned(accessor, ls, config_map.clone()).await,
                ));
                // Pods mount both maps; neither may be missing.
                if bootstrapped && written.is_some() {
                    let mut sts = build_stateful_set(ls, &headless);
                    sync_replicas(ls, &mut sts);
                    sync_pods(ls, &mut sts, &config_map);
                    sync_volume_claim_template(ls, &mut sts);
                    errors.record(ignore(
                        Error::is_already_exists,
                        create_owned(accessor, ls, sts).await,
                    ));
                }
            }
            Err(err) => errors.push(err),
        }

        errors.record(ignore(
            Error::is_already_exists,
            create_owned(accessor, ls, build_discovery_service(ls)).await,
        ));

        if errors.is_empty() {
            info!(logset = %ls.name_any(), replicas = ls.spec.replicas, "Created base resources");
        }
        errors.into_result()
    }

    /// Set the StatefulSet's replica count to the desired one.
    ///
    /// Only `spec.replicas` changes. Scale-in terminates the highest
    /// ordinals without draining them.
    ///
    /// # Errors
    ///
    /// `Conflict` when the StatefulSet changed between read and write.
    pub async fn scale(&self, ls: &LogSet, stateful_set: &StatefulSet) -> Result<()> {
        let namespace = namespace_of(ls)?;
        let replicas = ls.spec.replicas;
        let from = declared_replicas(stateful_set);
        self.accessor
            .patch::<StatefulSet, _>(&namespace, &stateful_set.name_any(), move |latest| {
                set_replicas(latest, replicas);
            })
            .await?;
        info!(logset = %ls.name_any(), from, to = replicas, "Scaled stores");
        Ok(())
    }

    /// Failed stores are reported but not acted on yet.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn repair(&self, ls: &LogSet, failed_stores: &[LogStore]) -> Result<()> {
        for store in failed_stores {
            warn!(
                logset = %ls.name_any(),
                pod = %store.pod_name,
                since = ?store.last_transition,
                "Store failed"
            );
        }
        Ok(())
    }

    /// Roll the pod template forward.
    ///
    /// The config map is written only if absent; its name changes with its
    /// content, so an unchanged configuration never writes. `stateful_set`
    /// is the live object with pod fields re-synced; replicas and claim
    /// templates are exactly as read.
    ///
    /// # Errors
    ///
    /// `Conflict` when the StatefulSet changed since it was observed.
    pub async fn update(
        &self,
        ls: &LogSet,
        stateful_set: &StatefulSet,
        config_map: ConfigMap,
    ) -> Result<()> {
        let config_name = config_map.name_any();
        ignore(
            Error::is_already_exists,
            create_owned(self.accessor.as_ref(), ls, config_map).await,
        )?;
        self.accessor.update(stateful_set).await?;
        info!(logset = %ls.name_any(), config = %config_name, "Updated stores");
        Ok(())
    }

    /// Check whether every owned resource is gone.
    ///
    /// Deletes nothing; removal cascades through owner references. Returns
    /// `true` only when all three resources are confirmed absent. Check
    /// failures are collected rather than short-circuiting, and a resource
    /// whose check failed is not counted as absent.
    pub async fn finalize(&self, ls: &LogSet) -> (bool, Option<Error>) {
        let namespace = match namespace_of(ls) {
            Ok(namespace) => namespace,
            Err(err) => return (false, Some(err)),
        };
        let mut errors = ErrorSet::new();
        let checks = [
            errors.record(
                self.accessor
                    .exists::<Service>(&namespace, &headless_svc_name(ls))
                    .await,
            ),
            errors.record(
                self.accessor
                    .exists::<StatefulSet>(&namespace, &sts_name(ls))
                    .await,
            ),
            errors.record(
                self.accessor
                    .exists::<Service>(&namespace, &discovery_svc_name(ls))
                    .await,
            ),
        ];
        let complete = checks.iter().all(|exists| *exists == Some(false));
        debug!(logset = %ls.name_any(), complete, ?checks, "Checked owned resources");
        (complete, errors.into_error())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use logset_api::{InitialConfig, LogSetSpec, VolumeSpec};

    use super::*;
    use crate::accessor::{Fault, InMemoryAccessor, Operation};

    async fn setup(replicas: i32) -> (LogSetActor<InMemoryAccessor>, LogSet) {
        let accessor = Arc::new(InMemoryAccessor::new());
        let mut ls = LogSet::new(
            "demo",
            LogSetSpec {
                replicas,
                image: "logservice:1.0".to_string(),
                volume: VolumeSpec {
                    size: "10Gi".to_string(),
                    storage_class_name: None,
                },
                resources: None,
                config: None,
                initial_config: InitialConfig::default(),
                service_type: None,
            },
        );
        ls.metadata.namespace = Some("db".to_string());
        let ls = accessor.create(&ls).await.unwrap();
        (LogSetActor::new(accessor, ReconcilerConfig::default()), ls)
    }

    #[tokio::test]
    async fn test_observe_without_resources_creates() {
        let (actor, mut ls) = setup(3).await;
        let action = actor.observe(&mut ls, Utc::now()).await.unwrap();
        assert_eq!(action, Some(Action::Create));
        assert!(ls.status.is_none());
    }

    #[tokio::test]
    async fn test_create_writes_every_resource() {
        let (actor, ls) = setup(3).await;
        actor.create(&ls).await.unwrap();

        let accessor = actor.accessor();
        assert_eq!(accessor.count("Service").await, 2);
        assert_eq!(accessor.count("StatefulSet").await, 1);
        assert_eq!(accessor.count("ConfigMap").await, 2);

        let sts: StatefulSet = accessor.get("db", "demo-log").await.unwrap();
        assert_eq!(declared_replicas(&sts), 3);
        assert_eq!(sts.owner_references().len(), 1);
    }

    #[tokio::test]
    async fn test_create_aggregates_failures() {
        let (actor, ls) = setup(3).await;
        let accessor = actor.accessor();
        accessor
            .fail(Operation::Create, "Service", Fault::Api("unavailable".to_string()))
            .await;

        let err = actor.create(&ls).await.unwrap_err();
        match err {
            Error::Combined(combined) => assert_eq!(combined.len(), 2),
            other => panic!("expected combined error, got {other:?}"),
        }
        // Creations not hit by the fault still went through.
        assert_eq!(accessor.count("StatefulSet").await, 1);
        assert_eq!(accessor.count("ConfigMap").await, 2);
    }

    #[tokio::test]
    async fn test_create_skips_statefulset_without_config() {
        let (actor, ls) = setup(3).await;
        let accessor = actor.accessor();
        let config_name = build_config_map(&ls).unwrap().name_any();
        accessor
            .fail_once(
                Operation::Create,
                "ConfigMap",
                &config_name,
                Fault::Api("unavailable".to_string()),
            )
            .await;

        assert!(actor.create(&ls).await.is_err());
        assert_eq!(accessor.count("StatefulSet").await, 0);
        assert_eq!(accessor.count("Service").await, 2);
    }

    #[tokio::test]
    async fn test_finalize_reports_check_errors() {
        let (actor, ls) = setup(1).await;
        actor
            .accessor()
            .fail(Operation::Get, "StatefulSet", Fault::Api("timeout".to_string()))
            .await;

        let (complete, err) = actor.finalize(&ls).await;
        assert!(!complete);
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn test_finalize_complete_when_nothing_exists() {
        let (actor, ls) = setup(1).await;
        let (complete, err) = actor.finalize(&ls).await;
        assert!(complete);
        assert!(err.is_none());
    }

    #[tokio::test]
    async fn test_repair_performs_no_writes() {
        let (actor, ls) = setup(1).await;
        actor.accessor().clear_writes().await;
        let failed = vec![LogStore {
            pod_name: "demo-log-0".to_string(),
            phase: logset_api::StorePhase::Down,
            last_transition: None,
        }];
        actor.execute(&ls, Action::Repair { failed_stores: failed }).await.unwrap();
        assert!(actor.accessor().writes().await.is_empty());
    }
}
