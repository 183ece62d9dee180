//! `LogSet` spec and status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kube::CustomResource;
use logset_core::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::{self, Condition, ConditionStatus};
use crate::{CONDITION_TYPE_READY, REASON_NO_ENOUGH_READY_STORES};

/// Desired shape of a log-service cluster.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    group = "logservice.dev",
    version = "v1alpha1",
    kind = "LogSet",
    namespaced,
    status = "LogSetStatus",
    shortname = "ls",
    printcolumn = r#"{"name":"Replicas","type":"integer","jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Ready","type":"string","jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct LogSetSpec {
    /// Desired number of stores.
    pub replicas: i32,

    /// Log-service container image.
    pub image: String,

    /// Per-store persistent volume.
    pub volume: VolumeSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<StoreResources>,

    /// TOML merged over the generated service configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,

    /// Bootstrap parameters. Only read when the cluster is first created.
    #[serde(default)]
    pub initial_config: InitialConfig,

    /// Service type of the discovery endpoint. Defaults to `ClusterIP`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    /// Requested storage, as a Kubernetes quantity (e.g. `10Gi`).
    pub size: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

/// Compute resources as quantity strings keyed by resource name.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StoreResources {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Bootstrap parameters; unset fields are derived from `replicas`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitialConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_shards: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn_shards: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_shard_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ha_keeper_replicas: Option<i32>,
}

/// [`InitialConfig`] with every default filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedInitialConfig {
    pub log_shards: i32,
    pub dn_shards: i32,
    pub log_shard_replicas: i32,
    pub ha_keeper_replicas: i32,
}

impl InitialConfig {
    /// Fill defaults: one shard of each kind, three-way replication once the
    /// cluster is large enough to hold it.
    pub fn resolve(&self, replicas: i32) -> ResolvedInitialConfig {
        let replication = if replicas >= 3 { 3 } else { 1 };
        ResolvedInitialConfig {
            log_shards: self.log_shards.unwrap_or(1),
            dn_shards: self.dn_shards.unwrap_or(1),
            log_shard_replicas: self.log_shard_replicas.unwrap_or(replication),
            ha_keeper_replicas: self.ha_keeper_replicas.unwrap_or(replication),
        }
    }
}

impl ResolvedInitialConfig {
    /// Check bootstrap parameters against the replica count at creation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] naming the first offending field.
    pub fn validate(&self, replicas: i32) -> Result<()> {
        if self.log_shards < 1 || self.dn_shards < 1 {
            return Err(Error::invalid_spec("shard counts must be at least 1"));
        }
        if self.log_shard_replicas < 1 || self.log_shard_replicas > replicas {
            return Err(Error::invalid_spec(format!(
                "logShardReplicas must be within [1, {replicas}], got {}",
                self.log_shard_replicas
            )));
        }
        if self.ha_keeper_replicas < 1 || self.ha_keeper_replicas > replicas {
            return Err(Error::invalid_spec(format!(
                "haKeeperReplicas must be within [1, {replicas}], got {}",
                self.ha_keeper_replicas
            )));
        }
        Ok(())
    }
}

impl LogSetSpec {
    /// Reject specs the reconciler cannot realise.
    ///
    /// Bootstrap parameters are only checked on create, by
    /// [`ResolvedInitialConfig::validate`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSpec`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.replicas < 1 {
            return Err(Error::invalid_spec(format!(
                "replicas must be at least 1, got {}",
                self.replicas
            )));
        }
        if self.image.trim().is_empty() {
            return Err(Error::invalid_spec("image must not be empty"));
        }
        if self.volume.size.trim().is_empty() {
            return Err(Error::invalid_spec("volume.size must not be empty"));
        }
        Ok(())
    }
}

/// Observed state, owned by the reconciler.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogSetStatus {
    #[serde(default)]
    pub available_stores: Vec<LogStore>,
    #[serde(default)]
    pub failed_stores: Vec<LogStore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<LogSetDiscovery>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl LogSetStatus {
    /// Insert or replace a condition, keeping its transition time if unchanged.
    pub fn set_condition(&mut self, condition: Condition) {
        condition::set_condition(&mut self.conditions, condition);
    }

    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        condition::find_condition(&self.conditions, type_)
    }

    pub fn is_ready(&self) -> bool {
        self.condition(CONDITION_TYPE_READY)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Derive `Ready` from the available store count.
    ///
    /// `Ready=True` iff at least `replicas` stores are available; otherwise
    /// `Ready=False` with reason `NoEnoughReadyStores`.
    pub fn update_ready(&mut self, replicas: i32, generation: Option<i64>, now: DateTime<Utc>) {
        let available = self.available_stores.len();
        let wanted = usize::try_from(replicas).unwrap_or(0);
        let condition = if available >= wanted {
            Condition::new(CONDITION_TYPE_READY, ConditionStatus::True, now)
        } else {
            Condition::new(CONDITION_TYPE_READY, ConditionStatus::False, now)
                .with_reason(REASON_NO_ENOUGH_READY_STORES)
                .with_message(format!("{available} of {replicas} stores available"))
        };
        self.set_condition(condition.with_observed_generation(generation));
    }
}

/// One store, identified by the pod backing it.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogStore {
    pub pod_name: String,
    pub phase: StorePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum StorePhase {
    Up,
    Down,
}

/// Where new members find the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogSetDiscovery {
    pub address: String,
    pub port: i32,
}
