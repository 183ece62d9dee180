//! In-memory object store.
//!
//! Models the parts of the API server the reconciler relies on: optimistic
//! concurrency through `resourceVersion`, status as a separate sub-resource,
//! finalizers holding back deletion, and owner-reference garbage collection.
//! Faults can be injected per operation and kind.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use logset_core::{Error, Result};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{KubeObject, ResourceAccessor, kind_of};

/// Accessor operation, for fault injection and the write log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

/// Error to return from an injected fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// A transient API failure.
    Api(String),
    /// A stale-write conflict.
    Conflict,
}

/// A successful mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub operation: Operation,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoreKey {
    kind: String,
    namespace: String,
    name: String,
}

#[derive(Debug, Clone)]
struct FaultRule {
    operation: Operation,
    kind: String,
    name: Option<String>,
    fault: Fault,
    remaining: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<StoreKey, Value>,
    revision: u64,
    faults: Vec<FaultRule>,
    writes: Vec<Write>,
    manual_gc: bool,
}

impl State {
    fn next_revision(&mut self) -> String {
        self.revision = self.revision.saturating_add(1);
        self.revision.to_string()
    }

    fn take_fault(&mut self, operation: Operation, kind: &str, name: &str) -> Option<Error> {
        let rule = self.faults.iter_mut().find(|rule| {
            rule.operation == operation
                && rule.kind == kind
                && rule.name.as_deref().is_none_or(|n| n == name)
                && rule.remaining != Some(0)
        })?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        Some(match &rule.fault {
            Fault::Api(reason) => Error::api(format!("{operation:?}"), reason.clone()),
            Fault::Conflict => Error::conflict(kind, name, "injected conflict"),
        })
    }

    fn record(&mut self, operation: Operation, kind: &str, name: &str) {
        self.writes.push(Write {
            operation,
            kind: kind.to_string(),
            name: name.to_string(),
        });
    }

    /// Remove an object and, transitively, everything it owns.
    fn remove_cascading(&mut self, key: &StoreKey) {
        let Some(removed) = self.objects.remove(key) else {
            return;
        };
        if self.manual_gc {
            return;
        }
        if let Some(uid) = uid_of(&removed) {
            self.collect_dependents(&uid);
        }
    }

    fn collect_dependents(&mut self, owner_uid: &str) {
        let dependents: Vec<StoreKey> = self
            .objects
            .iter()
            .filter(|(_, value)| owner_uids(value).contains(owner_uid))
            .map(|(key, _)| key.clone())
            .collect();
        for key in dependents {
            self.remove_cascading(&key);
        }
    }

    /// Owners that are gone or being deleted no longer hold their dependents.
    fn collect_garbage(&mut self) {
        let live: BTreeSet<String> = self
            .objects
            .values()
            .filter(|value| value.pointer("/metadata/deletionTimestamp").is_none())
            .filter_map(uid_of)
            .collect();
        let orphans: Vec<StoreKey> = self
            .objects
            .iter()
            .filter(|(_, value)| {
                let owners = owner_uids(value);
                !owners.is_empty() && owners.iter().all(|uid| !live.contains(uid))
            })
            .map(|(key, _)| key.clone())
            .collect();
        let was_manual = std::mem::replace(&mut self.manual_gc, false);
        for key in &orphans {
            self.remove_cascading(key);
        }
        self.manual_gc = was_manual;
    }
}

fn uid_of(value: &Value) -> Option<String> {
    value
        .pointer("/metadata/uid")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn owner_uids(value: &Value) -> BTreeSet<String> {
    value
        .pointer("/metadata/ownerReferences")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("uid").and_then(Value::as_str))
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn labels_match(value: &Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = value.pointer("/metadata/labels");
    selector.iter().all(|(k, v)| {
        labels
            .and_then(|l| l.get(k))
            .and_then(Value::as_str)
            .is_some_and(|actual| actual == v)
    })
}

fn to_value<K: KubeObject>(object: &K) -> Result<Value> {
    serde_json::to_value(object).map_err(|e| Error::serialization(e.to_string()))
}

fn from_value<K: KubeObject>(value: Value) -> Result<K> {
    serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string()))
}

fn key_of<K: KubeObject>(object: &K) -> Result<StoreKey> {
    let namespace = object.namespace().ok_or_else(|| {
        Error::invariant_violation(format!(
            "{} '{}' has no namespace",
            kind_of::<K>(),
            object.name_any()
        ))
    })?;
    Ok(StoreKey {
        kind: kind_of::<K>(),
        namespace,
        name: object.name_any(),
    })
}

/// In-memory object store for testing.
#[derive(Debug, Default)]
pub struct InMemoryAccessor {
    state: RwLock<State>,
}

impl InMemoryAccessor {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave dependents in place when their owner goes away, until
    /// [`collect_garbage`](Self::collect_garbage) runs.
    pub async fn set_manual_gc(&self, manual: bool) {
        self.state.write().await.manual_gc = manual;
    }

    /// Delete dependents whose owners are gone or being deleted.
    pub async fn collect_garbage(&self) {
        self.state.write().await.collect_garbage();
    }

    /// Fail every `operation` on `kind` until cleared.
    pub async fn fail(&self, operation: Operation, kind: &str, fault: Fault) {
        self.push_fault(operation, kind, None, fault, None).await;
    }

    /// Fail the next `operation` on the named object once.
    pub async fn fail_once(&self, operation: Operation, kind: &str, name: &str, fault: Fault) {
        self.push_fault(operation, kind, Some(name.to_string()), fault, Some(1))
            .await;
    }

    async fn push_fault(
        &self,
        operation: Operation,
        kind: &str,
        name: Option<String>,
        fault: Fault,
        remaining: Option<usize>,
    ) {
        self.state.write().await.faults.push(FaultRule {
            operation,
            kind: kind.to_string(),
            name,
            fault,
            remaining,
        });
    }

    /// Successful mutating calls, oldest first.
    pub async fn writes(&self) -> Vec<Write> {
        self.state.read().await.writes.clone()
    }

    pub async fn clear_writes(&self) {
        self.state.write().await.writes.clear();
    }

    /// Number of stored objects of `kind`.
    pub async fn count(&self, kind: &str) -> usize {
        self.state
            .read()
            .await
            .objects
            .keys()
            .filter(|key| key.kind == kind)
            .count()
    }

    /// Store an object as-is, bypassing every check. Seeds observed state
    /// such as pods, which the reconciler never writes.
    ///
    /// # Errors
    ///
    /// Fails when the object has no namespace or does not serialize.
    pub async fn put<K: KubeObject>(&self, object: &K) -> Result<()> {
        let key = key_of(object)?;
        let mut value = to_value(object)?;
        let mut state = self.state.write().await;
        let revision = state.next_revision();
        if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("resourceVersion".to_string(), Value::String(revision));
        }
        state.objects.insert(key, value);
        Ok(())
    }

    /// Delete an object. Objects with finalizers are only marked for
    /// deletion; everything else is removed along with its dependents.
    ///
    /// # Errors
    ///
    /// Fails with `NotFound` when the object is absent.
    pub async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<()> {
        let kind = kind_of::<K>();
        let key = StoreKey {
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::Delete, &kind, name) {
            return Err(err);
        }
        let has_finalizers = state
            .objects
            .get(&key)
            .ok_or_else(|| Error::not_found(&kind, name))?
            .pointer("/metadata/finalizers")
            .and_then(Value::as_array)
            .is_some_and(|f| !f.is_empty());

        if has_finalizers {
            let revision = state.next_revision();
            let now = serde_json::to_value(Time(Utc::now()))
                .map_err(|e| Error::serialization(e.to_string()))?;
            if let Some(meta) = state
                .objects
                .get_mut(&key)
                .and_then(|v| v.get_mut("metadata"))
                .and_then(Value::as_object_mut)
            {
                meta.entry("deletionTimestamp").or_insert(now);
                meta.insert("resourceVersion".to_string(), Value::String(revision));
            }
            if !state.manual_gc {
                state.collect_garbage();
            }
        } else {
            state.remove_cascading(&key);
        }
        state.record(Operation::Delete, &kind, name);
        Ok(())
    }
}

#[async_trait]
impl ResourceAccessor for InMemoryAccessor {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K> {
        let kind = kind_of::<K>();
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::Get, &kind, name) {
            return Err(err);
        }
        let key = StoreKey {
            kind: kind.clone(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let value = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(&kind, name))?;
        from_value(value)
    }

    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let kind = kind_of::<K>();
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::List, &kind, "") {
            return Err(err);
        }
        state
            .objects
            .iter()
            .filter(|(key, _)| key.kind == kind && key.namespace == namespace)
            .filter(|(_, value)| labels_match(value, labels))
            .map(|(_, value)| from_value(value.clone()))
            .collect()
    }

    async fn create<K: KubeObject>(&self, object: &K) -> Result<K> {
        let key = key_of(object)?;
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::Create, &key.kind, &key.name) {
            return Err(err);
        }
        if state.objects.contains_key(&key) {
            return Err(Error::already_exists(&key.kind, &key.name));
        }

        let mut stored = object.clone();
        let revision = state.next_revision();
        let meta: &mut ObjectMeta = stored.meta_mut();
        meta.resource_version = Some(revision.clone());
        meta.uid = Some(format!("uid-{revision}"));
        meta.generation = Some(1);
        meta.creation_timestamp.get_or_insert_with(|| Time(Utc::now()));

        state.objects.insert(key.clone(), to_value(&stored)?);
        state.record(Operation::Create, &key.kind, &key.name);
        Ok(stored)
    }

    async fn update<K: KubeObject>(&self, object: &K) -> Result<K> {
        let key = key_of(object)?;
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::Update, &key.kind, &key.name) {
            return Err(err);
        }
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(&key.kind, &key.name))?;
        let current: K = from_value(current)?;
        check_version(&key, object, &current)?;

        let mut next = to_value(object)?;
        let previous = to_value(&current)?;
        // Status is a separate sub-resource; a plain update never changes it.
        match previous.get("status") {
            Some(status) => {
                if let Some(obj) = next.as_object_mut() {
                    obj.insert("status".to_string(), status.clone());
                }
            }
            None => {
                if let Some(obj) = next.as_object_mut() {
                    obj.remove("status");
                }
            }
        }
        let mut stored: K = from_value(next)?;
        let spec_changed = to_value(&stored)?.get("spec") != previous.get("spec");
        let revision = state.next_revision();
        let meta = stored.meta_mut();
        meta.resource_version = Some(revision);
        meta.uid.clone_from(&current.meta().uid);
        meta.creation_timestamp.clone_from(&current.meta().creation_timestamp);
        meta.deletion_timestamp.clone_from(&current.meta().deletion_timestamp);
        let generation = current.meta().generation.unwrap_or(1);
        meta.generation = Some(if spec_changed {
            generation.saturating_add(1)
        } else {
            generation
        });

        let released = stored.meta().deletion_timestamp.is_some() && stored.finalizers().is_empty();
        state.record(Operation::Update, &key.kind, &key.name);
        if released {
            state.remove_cascading(&key);
        } else {
            state.objects.insert(key, to_value(&stored)?);
        }
        Ok(stored)
    }

    async fn update_status<K: KubeObject>(&self, object: &K) -> Result<K> {
        let key = key_of(object)?;
        let mut state = self.state.write().await;
        if let Some(err) = state.take_fault(Operation::UpdateStatus, &key.kind, &key.name) {
            return Err(err);
        }
        let current = state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(&key.kind, &key.name))?;
        let current_obj: K = from_value(current.clone())?;
        check_version(&key, object, &current_obj)?;

        let mut next = current;
        let status = to_value(object)?.get("status").cloned();
        if let Some(obj) = next.as_object_mut() {
            match status {
                Some(status) => obj.insert("status".to_string(), status),
                None => obj.remove("status"),
            };
        }
        let revision = state.next_revision();
        if let Some(meta) = next.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("resourceVersion".to_string(), Value::String(revision));
        }
        let stored: K = from_value(next.clone())?;
        state.objects.insert(key.clone(), next);
        state.record(Operation::UpdateStatus, &key.kind, &key.name);
        Ok(stored)
    }
}

fn check_version<K: KubeObject>(key: &StoreKey, incoming: &K, current: &K) -> Result<()> {
    match (&incoming.meta().resource_version, &current.meta().resource_version) {
        (Some(theirs), Some(ours)) if theirs != ours => Err(Error::conflict(
            &key.kind,
            &key.name,
            format!("resourceVersion {theirs} is stale, latest is {ours}"),
        )),
        _ => Ok(()),
    }
}
