//! Status aggregation.
//!
//! Derives store health from a snapshot of live pods. Everything here is a
//! pure function of its inputs; the clock is passed in.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use logset_api::{LogSet, LogSetDiscovery, LogSetStatus, LogStore, StorePhase};
use tracing::debug;

use crate::builders::{LOG_SERVICE_PORT, discovery_address};

const CRASH_LOOP_BACK_OFF: &str = "CrashLoopBackOff";

/// Pods partitioned by health, each list sorted by pod name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    pub available: Vec<LogStore>,
    pub failed: Vec<LogStore>,
}

fn ready_condition(pod: &Pod) -> Option<(bool, Option<DateTime<Utc>>)> {
    pod.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|c| c.type_ == "Ready")
        .map(|c| (c.status == "True", c.last_transition_time.as_ref().map(|t| t.0)))
}

fn phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn crash_looping(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_ref())
        .is_some_and(|statuses| {
            statuses.iter().any(|cs| {
                cs.state
                    .as_ref()
                    .and_then(|s| s.waiting.as_ref())
                    .and_then(|w| w.reason.as_deref())
                    == Some(CRASH_LOOP_BACK_OFF)
            })
        })
}

/// Classify one pod. `None` means still starting: neither available nor failed.
fn classify(pod: &Pod, now: DateTime<Utc>, timeout: TimeDelta) -> Option<LogStore> {
    let ready = ready_condition(pod);
    let since = ready
        .and_then(|(_, at)| at)
        .or_else(|| pod.metadata.creation_timestamp.as_ref().map(|t| t.0));
    let is_ready = phase(pod) == Some("Running") && ready.is_some_and(|(status, _)| status);

    let store_phase = if is_ready {
        StorePhase::Up
    } else if crash_looping(pod)
        || phase(pod) == Some("Failed")
        || since.is_some_and(|since| now.signed_duration_since(since) > timeout)
    {
        StorePhase::Down
    } else {
        return None;
    };

    Some(LogStore {
        pod_name: pod.name_any(),
        phase: store_phase,
        last_transition: since,
    })
}

/// Partition `pods` into available and failed stores.
///
/// Pods that are being deleted are ignored. Identical inputs always produce
/// identical output.
pub fn collect_store_status(pods: &[Pod], now: DateTime<Utc>, failure_timeout: Duration) -> StoreStatus {
    let timeout = TimeDelta::from_std(failure_timeout).unwrap_or(TimeDelta::MAX);
    let (mut available, mut failed): (Vec<_>, Vec<_>) = pods
        .iter()
        .filter(|pod| pod.metadata.deletion_timestamp.is_none())
        .filter_map(|pod| classify(pod, now, timeout))
        .partition(|store| store.phase == StorePhase::Up);
    available.sort_by(|a, b| a.pod_name.cmp(&b.pod_name));
    failed.sort_by(|a, b| a.pod_name.cmp(&b.pod_name));
    StoreStatus { available, failed }
}

/// Recompute the full status of `ls` from its pods.
///
/// The previous status only contributes condition transition times.
pub fn recompute(
    ls: &LogSet,
    pods: &[Pod],
    now: DateTime<Utc>,
    failure_timeout: Duration,
) -> LogSetStatus {
    let stores = collect_store_status(pods, now, failure_timeout);
    let mut status = LogSetStatus {
        available_stores: stores.available,
        failed_stores: stores.failed,
        discovery: Some(LogSetDiscovery {
            address: discovery_address(ls),
            port: LOG_SERVICE_PORT,
        }),
        conditions: ls
            .status
            .as_ref()
            .map(|s| s.conditions.clone())
            .unwrap_or_default(),
    };
    status.update_ready(ls.spec.replicas, ls.metadata.generation, now);
    debug!(
        logset = %ls.name_any(),
        available = status.available_stores.len(),
        failed = status.failed_stores.len(),
        ready = status.is_ready(),
        "Recomputed status"
    );
    status
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateWaiting, ContainerStatus, PodCondition, PodStatus,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(600);

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn pod(name: &str, phase: &str, ready: bool, transition: i64) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.creation_timestamp = Some(Time(at(0)));
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            conditions: Some(vec![PodCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                last_transition_time: Some(Time(at(transition))),
                ..PodCondition::default()
            }]),
            ..PodStatus::default()
        });
        pod
    }

    fn crash_looping_pod(name: &str) -> Pod {
        let mut pod = pod(name, "Running", false, 0);
        if let Some(status) = pod.status.as_mut() {
            status.container_statuses = Some(vec![ContainerStatus {
                name: "main".to_string(),
                state: Some(ContainerState {
                    waiting: Some(ContainerStateWaiting {
                        reason: Some(CRASH_LOOP_BACK_OFF.to_string()),
                        message: None,
                    }),
                    ..ContainerState::default()
                }),
                ..ContainerStatus::default()
            }]);
        }
        pod
    }

    fn names(stores: &[LogStore]) -> Vec<&str> {
        stores.iter().map(|s| s.pod_name.as_str()).collect()
    }

    #[test]
    fn test_ready_pods_are_available() {
        let pods = vec![pod("s-1", "Running", true, 10), pod("s-0", "Running", true, 5)];
        let status = collect_store_status(&pods, at(20), TIMEOUT);
        assert_eq!(names(&status.available), vec!["s-0", "s-1"]);
        assert!(status.failed.is_empty());
    }

    #[test]
    fn test_crash_loop_is_failed_immediately() {
        let status = collect_store_status(&[crash_looping_pod("s-0")], at(1), TIMEOUT);
        assert!(status.available.is_empty());
        assert_eq!(names(&status.failed), vec!["s-0"]);
        assert_eq!(status.failed.first().map(|s| s.phase), Some(StorePhase::Down));
    }

    #[test]
    fn test_failed_phase_is_failed() {
        let status = collect_store_status(&[pod("s-0", "Failed", false, 0)], at(1), TIMEOUT);
        assert_eq!(names(&status.failed), vec!["s-0"]);
    }

    #[test]
    fn test_starting_pod_is_neither() {
        let status = collect_store_status(&[pod("s-0", "Pending", false, 0)], at(60), TIMEOUT);
        assert_eq!(status, StoreStatus::default());
    }

    #[test]
    fn test_not_ready_past_timeout_is_failed() {
        let pods = [pod("s-0", "Running", false, 0)];
        assert!(collect_store_status(&pods, at(600), TIMEOUT).failed.is_empty());
        assert_eq!(names(&collect_store_status(&pods, at(601), TIMEOUT).failed), vec!["s-0"]);
    }

    #[test]
    fn test_ready_but_not_running_is_not_available() {
        let status = collect_store_status(&[pod("s-0", "Pending", true, 0)], at(1), TIMEOUT);
        assert!(status.available.is_empty());
    }

    #[test]
    fn test_terminating_pods_are_ignored() {
        let mut terminating = pod("s-0", "Running", true, 0);
        terminating.metadata.deletion_timestamp = Some(Time(at(5)));
        let status = collect_store_status(&[terminating], at(10), TIMEOUT);
        assert_eq!(status, StoreStatus::default());
    }

    #[test]
    fn test_recompute_sets_discovery_and_ready() {
        let mut ls = LogSet::new("demo", serde_json::from_value(serde_json::json!({
            "replicas": 2,
            "image": "logservice:1.0",
            "volume": {"size": "1Gi"}
        })).unwrap());
        ls.metadata.namespace = Some("db".to_string());

        let pods = vec![pod("demo-log-0", "Running", true, 0)];
        let status = recompute(&ls, &pods, at(10), TIMEOUT);
        assert!(!status.is_ready());
        assert_eq!(
            status.discovery,
            Some(LogSetDiscovery {
                address: "demo-log-discovery.db.svc".to_string(),
                port: LOG_SERVICE_PORT,
            })
        );

        let pods = vec![
            pod("demo-log-0", "Running", true, 0),
            pod("demo-log-1", "Running", true, 0),
        ];
        assert!(recompute(&ls, &pods, at(10), TIMEOUT).is_ready());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut ls = LogSet::new("demo", serde_json::from_value(serde_json::json!({
            "replicas": 1,
            "image": "logservice:1.0",
            "volume": {"size": "1Gi"}
        })).unwrap());
        let pods = vec![pod("demo-log-0", "Running", true, 0)];
        let first = recompute(&ls, &pods, at(10), TIMEOUT);
        ls.status = Some(first.clone());
        let second = recompute(&ls, &pods, at(99), TIMEOUT);
        assert_eq!(first, second);
    }
}
