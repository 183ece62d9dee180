//! Typed access to the orchestration platform's object store.
//!
//! The object store is the single source of truth and the arbiter of
//! conflicting writes. Every write is optimistic: `update` fails with
//! `Conflict` when the object's `resourceVersion` is stale, and the whole
//! pass is retried by the scheduler.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use logset_core::{Error, Result, ResultExt};
use serde::Serialize;
use serde::de::DeserializeOwned;

mod cluster;
mod memory;

pub use cluster::KubeAccessor;
pub use memory::{Fault, InMemoryAccessor, Operation, Write};

/// Namespaced Kubernetes object the accessor can store.
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<T> KubeObject for T where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Kind name of `K`, for error messages and store keys.
pub fn kind_of<K: KubeObject>() -> String {
    K::kind(&()).to_string()
}

/// Trait for object store backends.
#[async_trait]
pub trait ResourceAccessor: Send + Sync {
    /// Fetch one object. Fails with `NotFound` when absent.
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K>;

    /// List objects carrying every label in `labels`.
    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>>;

    /// Create an object. Fails with `AlreadyExists` when the name is taken.
    async fn create<K: KubeObject>(&self, object: &K) -> Result<K>;

    /// Replace an object. Fails with `Conflict` on a stale `resourceVersion`.
    async fn update<K: KubeObject>(&self, object: &K) -> Result<K>;

    /// Replace the status sub-resource of an object.
    async fn update_status<K: KubeObject>(&self, object: &K) -> Result<K>;

    /// Read-modify-write against the latest stored version.
    async fn patch<K, F>(&self, namespace: &str, name: &str, mutate: F) -> Result<K>
    where
        K: KubeObject,
        F: FnOnce(&mut K) + Send,
    {
        let mut latest: K = self.get(namespace, name).await?;
        mutate(&mut latest);
        self.update(&latest).await
    }

    /// Whether the object exists.
    async fn exists<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<bool> {
        self.get::<K>(namespace, name)
            .await
            .found()
            .map(|object| object.is_some())
    }
}

/// Create `object` with a controller owner reference to `owner`, so it is
/// garbage-collected when the owner is deleted.
///
/// # Errors
///
/// Fails with `InvariantViolation` when the owner has not been persisted yet,
/// otherwise with whatever `create` returns.
pub async fn create_owned<A, O, K>(accessor: &A, owner: &O, mut object: K) -> Result<K>
where
    A: ResourceAccessor,
    O: Resource<DynamicType = ()>,
    K: KubeObject,
{
    let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
        Error::invariant_violation(format!(
            "owner of {} '{}' has no uid",
            kind_of::<K>(),
            object.name_any()
        ))
    })?;
    object.owner_references_mut().push(owner_ref);
    accessor.create(&object).await
}
