//! Shared fixtures for the reconciler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateWaiting, ContainerStatus, Pod, PodCondition, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use logset_api::{InitialConfig, LogSet, LogSetSpec, VolumeSpec};
use logset_reconciler::builders::{selector_labels, sts_name};
use logset_reconciler::{InMemoryAccessor, Reconciler, ReconcilerConfig, ResourceAccessor};

pub const NAMESPACE: &str = "db";

pub fn logset(name: &str, replicas: i32) -> LogSet {
    let mut ls = LogSet::new(
        name,
        LogSetSpec {
            replicas,
            image: "logservice:1.0".to_string(),
            volume: VolumeSpec {
                size: "10Gi".to_string(),
                storage_class_name: Some("standard".to_string()),
            },
            resources: None,
            config: None,
            initial_config: InitialConfig::default(),
            service_type: None,
        },
    );
    ls.metadata.namespace = Some(NAMESPACE.to_string());
    ls
}

/// A store holding one persisted `LogSet`, and a reconciler over it.
pub async fn setup(
    replicas: i32,
) -> (Arc<InMemoryAccessor>, Reconciler<InMemoryAccessor>, LogSet) {
    let accessor = Arc::new(InMemoryAccessor::new());
    let ls = accessor
        .create(&logset("demo", replicas))
        .await
        .expect("LogSet should be stored");
    let reconciler = Reconciler::new(accessor.clone(), ReconcilerConfig::default());
    (accessor, reconciler, ls)
}

pub async fn latest(accessor: &InMemoryAccessor, ls: &LogSet) -> LogSet {
    accessor
        .get(NAMESPACE, &ls.name_any())
        .await
        .expect("LogSet should exist")
}

pub async fn stateful_set(accessor: &InMemoryAccessor, ls: &LogSet) -> StatefulSet {
    accessor
        .get(NAMESPACE, &sts_name(ls))
        .await
        .expect("StatefulSet should exist")
}

fn pod(ls: &LogSet, ordinal: usize, phase: &str, ready: bool, since: DateTime<Utc>) -> Pod {
    let mut pod = Pod::default();
    pod.metadata.name = Some(format!("{}-{ordinal}", sts_name(ls)));
    pod.metadata.namespace = Some(NAMESPACE.to_string());
    pod.metadata.labels = Some(selector_labels(ls));
    pod.metadata.creation_timestamp = Some(Time(since));
    pod.status = Some(PodStatus {
        phase: Some(phase.to_string()),
        conditions: Some(vec![PodCondition {
            type_: "Ready".to_string(),
            status: if ready { "True" } else { "False" }.to_string(),
            last_transition_time: Some(Time(since)),
            ..PodCondition::default()
        }]),
        ..PodStatus::default()
    });
    pod
}

pub fn ready_pod(ls: &LogSet, ordinal: usize) -> Pod {
    pod(ls, ordinal, "Running", true, Utc::now())
}

pub fn crash_looping_pod(ls: &LogSet, ordinal: usize) -> Pod {
    let mut pod = pod(ls, ordinal, "Running", false, Utc::now());
    if let Some(status) = pod.status.as_mut() {
        status.container_statuses = Some(vec![ContainerStatus {
            name: "main".to_string(),
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some("CrashLoopBackOff".to_string()),
                    message: None,
                }),
                ..ContainerState::default()
            }),
            ..ContainerStatus::default()
        }]);
    }
    pod
}

pub async fn seed_ready_pods(accessor: &InMemoryAccessor, ls: &LogSet, count: usize) {
    for ordinal in 0..count {
        accessor
            .put(&ready_pod(ls, ordinal))
            .await
            .expect("pod should be stored");
    }
}

/// Run passes until one converges, failing after `limit` passes.
pub async fn converge(
    accessor: &InMemoryAccessor,
    reconciler: &Reconciler<InMemoryAccessor>,
    ls: &LogSet,
    limit: usize,
) -> LogSet {
    for _ in 0..limit {
        let current = latest(accessor, ls).await;
        let report = reconciler
            .reconcile(&current)
            .await
            .expect("pass should succeed");
        if !report.acted() {
            return latest(accessor, ls).await;
        }
    }
    panic!("no convergence after {limit} passes");
}
