//! Object store backed by a live Kubernetes API server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use itertools::Itertools;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use logset_core::{Error, Result};
use serde_json::json;

use super::{KubeObject, ResourceAccessor, kind_of};

/// Accessor over `kube::Api`, mapping API status codes onto the error taxonomy.
#[derive(Clone)]
pub struct KubeAccessor {
    client: Client,
}

impl KubeAccessor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: KubeObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// 404 and 409 carry meaning for the reconciler; everything else is transient.
fn classify<K: KubeObject>(operation: &str, name: &str, err: kube::Error) -> Error {
    let kind = kind_of::<K>();
    match err {
        kube::Error::Api(resp) if resp.code == 404 => Error::not_found(kind, name),
        kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
            Error::already_exists(kind, name)
        }
        kube::Error::Api(resp) if resp.code == 409 => Error::conflict(kind, name, resp.message),
        other => Error::api(format!("{operation} {kind}/{name}"), other.to_string()),
    }
}

fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels.iter().map(|(k, v)| format!("{k}={v}")).join(",")
}

#[async_trait]
impl ResourceAccessor for KubeAccessor {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K> {
        tracing::trace!(kind = %kind_of::<K>(), namespace, name, "get");
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| classify::<K>("get", name, e))
    }

    async fn list<K: KubeObject>(
        &self,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<K>> {
        let params = ListParams::default().labels(&label_selector(labels));
        self.api::<K>(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| classify::<K>("list", "", e))
    }

    async fn create<K: KubeObject>(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        tracing::debug!(kind = %kind_of::<K>(), %namespace, %name, "create");
        self.api::<K>(&namespace)
            .create(&PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>("create", &name, e))
    }

    async fn update<K: KubeObject>(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        tracing::debug!(kind = %kind_of::<K>(), %namespace, %name, "update");
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|e| classify::<K>("update", &name, e))
    }

    async fn update_status<K: KubeObject>(&self, object: &K) -> Result<K> {
        let name = object.name_any();
        let namespace = object.namespace().unwrap_or_default();
        let value = serde_json::to_value(object).map_err(|e| Error::serialization(e.to_string()))?;
        let status = value.get("status").cloned().unwrap_or(serde_json::Value::Null);
        tracing::debug!(kind = %kind_of::<K>(), %namespace, %name, "update status");
        self.api::<K>(&namespace)
            .patch_status(
                &name,
                &PatchParams::default(),
                &Patch::Merge(json!({ "status": status })),
            )
            .await
            .map_err(|e| classify::<K>("update status", &name, e))
    }
}
