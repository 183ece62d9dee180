//! Sub-resource builders.
//!
//! Pure functions from a `LogSet` to the objects that realise it. `build_*`
//! produce fresh objects for the create path; `sync_*` write the fields the
//! reconciler owns onto an existing object and leave everything else (API
//! server defaults included) untouched, so re-syncing an up-to-date object is
//! a no-op.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, Probe,
    ResourceRequirements, Service, ServicePort, ServiceSpec, TCPSocketAction, Volume,
    VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use logset_api::{LogSet, StoreResources};
use logset_core::{Error, Result};
use sha2::{Digest, Sha256};
use toml::{Table, Value};

use crate::config::IdRange;

pub const RAFT_PORT: i32 = 32000;
pub const LOG_SERVICE_PORT: i32 = 32001;
pub const GOSSIP_PORT: i32 = 32002;

/// Records the identifier range allocated to a cluster's initial members.
pub const BOOTSTRAP_ANNOTATION: &str = "logset.logservice.dev/bootstrap";

pub const CONFIG_FILE: &str = "config.toml";
pub const BOOTSTRAP_FILE: &str = "bootstrap.toml";

const MAIN_CONTAINER: &str = "main";
const DATA_VOLUME: &str = "data";
const CONFIG_VOLUME: &str = "config";
const BOOTSTRAP_VOLUME: &str = "bootstrap";
const DATA_DIR: &str = "/var/lib/logservice";
const CONFIG_DIR: &str = "/etc/logservice";
const BOOTSTRAP_DIR: &str = "/etc/bootstrap";
const CONFIG_HASH_LEN: usize = 10;
const DEFAULT_MODE: i32 = 0o644;

pub fn sts_name(ls: &LogSet) -> String {
    format!("{}-log", ls.name_any())
}

pub fn headless_svc_name(ls: &LogSet) -> String {
    format!("{}-log-headless", ls.name_any())
}

pub fn discovery_svc_name(ls: &LogSet) -> String {
    format!("{}-log-discovery", ls.name_any())
}

pub fn bootstrap_name(ls: &LogSet) -> String {
    format!("{}-log-bootstrap", ls.name_any())
}

/// In-cluster DNS name of the discovery service.
pub fn discovery_address(ls: &LogSet) -> String {
    format!(
        "{}.{}.svc",
        discovery_svc_name(ls),
        ls.namespace().unwrap_or_default()
    )
}

/// Labels carried by every sub-resource and pod of `ls`.
pub fn selector_labels(ls: &LogSet) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), "logset".to_string()),
        ("app.kubernetes.io/instance".to_string(), ls.name_any()),
        (
            "app.kubernetes.io/component".to_string(),
            "log-service".to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            "logset-operator".to_string(),
        ),
    ])
}

fn object_meta(ls: &LogSet, name: String) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: ls.namespace(),
        labels: Some(selector_labels(ls)),
        ..ObjectMeta::default()
    }
}

fn service_port(name: &str, port: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some("TCP".to_string()),
        target_port: Some(IntOrString::Int(port)),
        ..ServicePort::default()
    }
}

/// Stable network identities for the stores.
pub fn build_headless_service(ls: &LogSet) -> Service {
    Service {
        metadata: object_meta(ls, headless_svc_name(ls)),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector_labels(ls)),
            ports: Some(vec![
                service_port("raft", RAFT_PORT),
                service_port("log-service", LOG_SERVICE_PORT),
                service_port("gossip", GOSSIP_PORT),
            ]),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

/// The address new members use to find the cluster.
pub fn build_discovery_service(ls: &LogSet) -> Service {
    Service {
        metadata: object_meta(ls, discovery_svc_name(ls)),
        spec: Some(ServiceSpec {
            type_: Some(
                ls.spec
                    .service_type
                    .clone()
                    .unwrap_or_else(|| "ClusterIP".to_string()),
            ),
            selector: Some(selector_labels(ls)),
            ports: Some(vec![service_port("log-service", LOG_SERVICE_PORT)]),
            ..ServiceSpec::default()
        }),
        status: None,
    }
}

/// A StatefulSet skeleton; replicas, pod template and claims are filled in
/// by the `sync_*` functions.
pub fn build_stateful_set(ls: &LogSet, headless: &Service) -> StatefulSet {
    let mut spec = StatefulSetSpec {
        selector: LabelSelector {
            match_labels: Some(selector_labels(ls)),
            ..LabelSelector::default()
        },
        pod_management_policy: Some("Parallel".to_string()),
        update_strategy: Some(StatefulSetUpdateStrategy {
            type_: Some("RollingUpdate".to_string()),
            rolling_update: None,
        }),
        ..StatefulSetSpec::default()
    };
    spec.service_name = headless.name_any().into();
    StatefulSet {
        metadata: object_meta(ls, sts_name(ls)),
        spec: Some(spec),
        status: None,
    }
}

pub fn set_replicas(sts: &mut StatefulSet, replicas: i32) {
    sts.spec.get_or_insert_with(StatefulSetSpec::default).replicas = Some(replicas);
}

pub fn sync_replicas(ls: &LogSet, sts: &mut StatefulSet) {
    set_replicas(sts, ls.spec.replicas);
}

/// Replica count the StatefulSet declares; the API defaults an unset count to 1.
pub fn declared_replicas(sts: &StatefulSet) -> i32 {
    sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1)
}

pub fn sync_pod_meta(ls: &LogSet, sts: &mut StatefulSet) {
    let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);
    let meta = spec.template.metadata.get_or_insert_with(ObjectMeta::default);
    meta.labels
        .get_or_insert_with(BTreeMap::new)
        .extend(selector_labels(ls));
}

fn field_env(name: &str, path: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                api_version: Some("v1".to_string()),
                field_path: path.to_string(),
            }),
            ..EnvVarSource::default()
        }),
    }
}

fn value_env(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value),
        value_from: None,
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        name: Some(name.to_string()),
        container_port: port,
        protocol: Some("TCP".to_string()),
        ..ContainerPort::default()
    }
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    (!values.is_empty()).then(|| {
        values
            .iter()
            .map(|(k, v)| (k.clone(), Quantity(v.clone())))
            .collect()
    })
}

fn resource_requirements(resources: Option<&StoreResources>) -> ResourceRequirements {
    resources.map_or_else(ResourceRequirements::default, |r| ResourceRequirements {
        requests: quantities(&r.requests),
        limits: quantities(&r.limits),
        ..ResourceRequirements::default()
    })
}

fn volume_mount(name: &str, path: &str, read_only: bool) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        read_only: read_only.then_some(true),
        ..VolumeMount::default()
    }
}

fn config_map_volume(name: &str, config_map: String) -> Volume {
    Volume {
        name: name.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map.into(),
            default_mode: Some(DEFAULT_MODE),
            ..ConfigMapVolumeSource::default()
        }),
        ..Volume::default()
    }
}

/// Insert `volume`, replacing any volume of the same name in place.
fn upsert_volume(pod_spec: &mut PodSpec, volume: Volume) {
    let volumes = pod_spec.volumes.get_or_insert_with(Vec::new);
    match volumes.iter_mut().find(|v| v.name == volume.name) {
        Some(existing) => *existing = volume,
        None => volumes.push(volume),
    }
}

fn sync_main_container(ls: &LogSet, main: &mut Container) {
    main.image = Some(ls.spec.image.clone());
    main.image_pull_policy = Some("IfNotPresent".to_string());
    main.args = Some(vec![
        format!("--cfg={CONFIG_DIR}/{CONFIG_FILE}"),
        format!("--bootstrap-cfg={BOOTSTRAP_DIR}/{BOOTSTRAP_FILE}"),
    ]);
    main.env = Some(vec![
        field_env("POD_NAME", "metadata.name"),
        field_env("NAMESPACE", "metadata.namespace"),
        value_env("HEADLESS_SERVICE_NAME", headless_svc_name(ls)),
        value_env(
            "DISCOVERY_ADDRESS",
            format!("{}:{LOG_SERVICE_PORT}", discovery_address(ls)),
        ),
    ]);
    main.ports = Some(vec![
        container_port("raft", RAFT_PORT),
        container_port("log-service", LOG_SERVICE_PORT),
        container_port("gossip", GOSSIP_PORT),
    ]);
    main.resources = Some(resource_requirements(ls.spec.resources.as_ref()));
    main.volume_mounts = Some(vec![
        volume_mount(DATA_VOLUME, DATA_DIR, false),
        volume_mount(CONFIG_VOLUME, CONFIG_DIR, true),
        volume_mount(BOOTSTRAP_VOLUME, BOOTSTRAP_DIR, true),
    ]);
    main.readiness_probe = Some(Probe {
        tcp_socket: Some(TCPSocketAction {
            host: None,
            port: IntOrString::Int(LOG_SERVICE_PORT),
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        timeout_seconds: Some(1),
        success_threshold: Some(1),
        failure_threshold: Some(3),
        ..Probe::default()
    });
}

/// Write the reconciler-owned pod spec fields onto the template.
///
/// The main container is edited in place, so fields the API server
/// defaulted on it survive.
pub fn sync_pod_spec(ls: &LogSet, sts: &mut StatefulSet) {
    let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);
    let pod_spec = spec.template.spec.get_or_insert_with(PodSpec::default);

    if let Some(main) = pod_spec
        .containers
        .iter_mut()
        .find(|c| c.name == MAIN_CONTAINER)
    {
        sync_main_container(ls, main);
    } else {
        let mut main = Container {
            name: MAIN_CONTAINER.to_string(),
            ..Container::default()
        };
        sync_main_container(ls, &mut main);
        pod_spec.containers.push(main);
    }

    upsert_volume(
        pod_spec,
        config_map_volume(BOOTSTRAP_VOLUME, bootstrap_name(ls)),
    );
}

/// Storage identity is fixed at creation; only the create path calls this.
pub fn sync_volume_claim_template(ls: &LogSet, sts: &mut StatefulSet) {
    let claim = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(selector_labels(ls)),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(ls.spec.volume.size.clone()),
                )])),
                limits: None,
            }),
            storage_class_name: ls.spec.volume.storage_class_name.clone(),
            ..PersistentVolumeClaimSpec::default()
        }),
        status: None,
    };
    sts.spec
        .get_or_insert_with(StatefulSetSpec::default)
        .volume_claim_templates = Some(vec![claim]);
}

/// Point the pod template's config volume at `cm`.
pub fn sync_config_map_ref(sts: &mut StatefulSet, cm: &ConfigMap) {
    let spec = sts.spec.get_or_insert_with(StatefulSetSpec::default);
    let pod_spec = spec.template.spec.get_or_insert_with(PodSpec::default);
    upsert_volume(pod_spec, config_map_volume(CONFIG_VOLUME, cm.name_any()));
}

/// Everything an update is allowed to change: pod metadata, pod spec and the
/// config reference. Replicas and claim templates are left alone.
pub fn sync_pods(ls: &LogSet, sts: &mut StatefulSet, cm: &ConfigMap) {
    sync_pod_meta(ls, sts);
    sync_pod_spec(ls, sts);
    sync_config_map_ref(sts, cm);
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        if let Value::Table(incoming) = value {
            if let Some(Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}

/// Render the service configuration, with the user overlay merged on top.
///
/// # Errors
///
/// Fails with `InvalidSpec` when the overlay is not valid TOML.
pub fn render_config(ls: &LogSet) -> Result<String> {
    let mut hakeeper_client = Table::new();
    hakeeper_client.insert(
        "discovery-address".to_string(),
        Value::from(format!("{}:{LOG_SERVICE_PORT}", discovery_address(ls))),
    );

    let mut logservice = Table::new();
    logservice.insert("deployment-id".to_string(), Value::Integer(1));
    logservice.insert("raft-port".to_string(), Value::from(i64::from(RAFT_PORT)));
    logservice.insert(
        "logservice-port".to_string(),
        Value::from(i64::from(LOG_SERVICE_PORT)),
    );
    logservice.insert("gossip-port".to_string(), Value::from(i64::from(GOSSIP_PORT)));

    let mut config = Table::new();
    config.insert("service-type".to_string(), Value::from("LOG"));
    config.insert("data-dir".to_string(), Value::from(DATA_DIR));
    config.insert("logservice".to_string(), Value::Table(logservice));
    config.insert("hakeeper-client".to_string(), Value::Table(hakeeper_client));

    if let Some(overlay) = ls.spec.config.as_deref() {
        let overlay: Table = toml::from_str(overlay)
            .map_err(|e| Error::invalid_spec(format!("config is not valid TOML: {e}")))?;
        merge_tables(&mut config, overlay);
    }

    toml::to_string(&config).map_err(|e| Error::serialization(e.to_string()))
}

fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{digest:x}").chars().take(CONFIG_HASH_LEN).collect()
}

/// The content-addressed service configuration.
///
/// The name embeds a hash of the content, so an unchanged configuration maps
/// to an existing object and a changed one to a new object.
///
/// # Errors
///
/// Fails with `InvalidSpec` when the user overlay does not parse.
pub fn build_config_map(ls: &LogSet) -> Result<ConfigMap> {
    let rendered = render_config(ls)?;
    let name = format!("{}-config-{}", sts_name(ls), content_hash(&rendered));
    Ok(ConfigMap {
        metadata: object_meta(ls, name),
        data: Some(BTreeMap::from([(CONFIG_FILE.to_string(), rendered)])),
        ..ConfigMap::default()
    })
}

fn toml_int(value: u64) -> Result<Value> {
    i64::try_from(value)
        .map(Value::Integer)
        .map_err(|e| Error::invalid_spec(format!("identifier {value} out of range: {e}")))
}

/// The bootstrap marker: identifiers for the initial members, allocated from
/// `range`, plus an annotation recording the range itself.
///
/// # Errors
///
/// Fails with `InvalidSpec` when the bootstrap parameters do not fit
/// `replicas` or the range cannot hold the initial members.
pub fn build_bootstrap_config(ls: &LogSet, range: &IdRange) -> Result<ConfigMap> {
    let initial = ls.spec.initial_config.resolve(ls.spec.replicas);
    initial.validate(ls.spec.replicas)?;
    let count = usize::try_from(initial.ha_keeper_replicas)
        .map_err(|e| Error::invalid_spec(format!("haKeeperReplicas: {e}")))?;
    let sts = sts_name(ls);
    let members = range
        .allocate(count)?
        .into_iter()
        .enumerate()
        .map(|(ordinal, id)| Value::from(format!("{id}:{sts}-{ordinal}")))
        .collect();

    let mut bootstrap = Table::new();
    bootstrap.insert("id-range-start".to_string(), toml_int(range.start)?);
    bootstrap.insert("id-range-end".to_string(), toml_int(range.end)?);
    bootstrap.insert(
        "num-of-log-shards".to_string(),
        Value::from(i64::from(initial.log_shards)),
    );
    bootstrap.insert(
        "num-of-dn-shards".to_string(),
        Value::from(i64::from(initial.dn_shards)),
    );
    bootstrap.insert(
        "num-of-log-shard-replicas".to_string(),
        Value::from(i64::from(initial.log_shard_replicas)),
    );
    bootstrap.insert("init-hakeeper-members".to_string(), Value::Array(members));

    let mut document = Table::new();
    document.insert("bootstrap".to_string(), Value::Table(bootstrap));
    let rendered = toml::to_string(&document).map_err(|e| Error::serialization(e.to_string()))?;

    let mut metadata = object_meta(ls, bootstrap_name(ls));
    metadata.annotations = Some(BTreeMap::from([(
        BOOTSTRAP_ANNOTATION.to_string(),
        range.to_string(),
    )]));
    Ok(ConfigMap {
        metadata,
        data: Some(BTreeMap::from([(BOOTSTRAP_FILE.to_string(), rendered)])),
        ..ConfigMap::default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use logset_api::{InitialConfig, LogSetSpec, VolumeSpec};

    use super::*;

    fn logset() -> LogSet {
        let mut ls = LogSet::new(
            "demo",
            LogSetSpec {
                replicas: 3,
                image: "logservice:1.0".to_string(),
                volume: VolumeSpec {
                    size: "10Gi".to_string(),
                    storage_class_name: Some("fast".to_string()),
                },
                resources: None,
                config: None,
                initial_config: InitialConfig::default(),
                service_type: None,
            },
        );
        ls.metadata.namespace = Some("db".to_string());
        ls
    }

    fn full_stateful_set(ls: &LogSet) -> StatefulSet {
        let headless = build_headless_service(ls);
        let mut sts = build_stateful_set(ls, &headless);
        sync_replicas(ls, &mut sts);
        sync_pods(ls, &mut sts, &build_config_map(ls).unwrap());
        sync_volume_claim_template(ls, &mut sts);
        sts
    }

    #[test]
    fn test_names() {
        let ls = logset();
        assert_eq!(sts_name(&ls), "demo-log");
        assert_eq!(headless_svc_name(&ls), "demo-log-headless");
        assert_eq!(discovery_svc_name(&ls), "demo-log-discovery");
        assert_eq!(discovery_address(&ls), "demo-log-discovery.db.svc");
    }

    #[test]
    fn test_headless_service_has_no_cluster_ip() {
        let svc = build_headless_service(&logset());
        let spec = svc.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("None"));
        assert_eq!(spec.publish_not_ready_addresses, Some(true));
        assert_eq!(spec.ports.map(|p| p.len()), Some(3));
    }

    #[test]
    fn test_discovery_service_type_defaults_to_cluster_ip() {
        let mut ls = logset();
        let svc = build_discovery_service(&ls);
        assert_eq!(svc.spec.and_then(|s| s.type_).as_deref(), Some("ClusterIP"));

        ls.spec.service_type = Some("NodePort".to_string());
        let svc = build_discovery_service(&ls);
        assert_eq!(svc.spec.and_then(|s| s.type_).as_deref(), Some("NodePort"));
    }

    #[test]
    fn test_config_map_name_is_content_addressed() {
        let ls = logset();
        let a = build_config_map(&ls).unwrap();
        let b = build_config_map(&ls).unwrap();
        assert_eq!(a.metadata.name, b.metadata.name);
        assert!(a.name_any().starts_with("demo-log-config-"));

        let mut changed = logset();
        changed.spec.config = Some("[logservice]\nraft-port = 40000\n".to_string());
        let c = build_config_map(&changed).unwrap();
        assert_ne!(a.metadata.name, c.metadata.name);
    }

    #[test]
    fn test_overlay_merges_nested_tables() {
        let mut ls = logset();
        ls.spec.config = Some("[logservice]\ndeployment-id = 7\n".to_string());
        let rendered: Table = toml::from_str(&render_config(&ls).unwrap()).unwrap();
        let logservice = rendered.get("logservice").and_then(Value::as_table).unwrap();
        assert_eq!(logservice.get("deployment-id").and_then(Value::as_integer), Some(7));
        assert_eq!(
            logservice.get("raft-port").and_then(Value::as_integer),
            Some(i64::from(RAFT_PORT))
        );
    }

    #[test]
    fn test_invalid_overlay_is_invalid_spec() {
        let mut ls = logset();
        ls.spec.config = Some("not = [valid".to_string());
        assert!(matches!(
            build_config_map(&ls),
            Err(Error::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_bootstrap_marker_records_range_and_members() {
        let cm = build_bootstrap_config(&logset(), &IdRange::DEFAULT).unwrap();
        assert_eq!(
            cm.metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(BOOTSTRAP_ANNOTATION))
                .map(String::as_str),
            Some("131072-262144")
        );
        let data = cm.data.unwrap();
        let doc: Table = toml::from_str(data.get(BOOTSTRAP_FILE).unwrap()).unwrap();
        let members = doc
            .get("bootstrap")
            .and_then(|b| b.get("init-hakeeper-members"))
            .and_then(Value::as_array)
            .unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members.first().and_then(Value::as_str), Some("131072:demo-log-0"));
    }

    #[test]
    fn test_bootstrap_rejects_small_range() {
        let range = IdRange::new(1, 2).unwrap();
        assert!(build_bootstrap_config(&logset(), &range).is_err());
    }

    #[test]
    fn test_bootstrap_rejects_members_above_replicas() {
        let mut ls = logset();
        ls.spec.initial_config.ha_keeper_replicas = Some(4);
        assert!(matches!(
            build_bootstrap_config(&ls, &IdRange::DEFAULT),
            Err(Error::InvalidSpec { .. })
        ));
    }

    #[test]
    fn test_sync_pods_is_idempotent() {
        let ls = logset();
        let sts = full_stateful_set(&ls);
        let mut again = sts.clone();
        sync_pods(&ls, &mut again, &build_config_map(&ls).unwrap());
        assert_eq!(sts, again);
    }

    #[test]
    fn test_sync_pod_spec_preserves_foreign_fields() {
        let ls = logset();
        let mut sts = full_stateful_set(&ls);
        let pod_spec = sts.spec.as_mut().and_then(|s| s.template.spec.as_mut()).unwrap();
        pod_spec.dns_policy = Some("ClusterFirst".to_string());
        if let Some(main) = pod_spec.containers.first_mut() {
            main.termination_message_path = Some("/dev/termination-log".to_string());
        }

        let before = sts.clone();
        sync_pods(&ls, &mut sts, &build_config_map(&ls).unwrap());
        assert_eq!(before, sts);
    }

    #[test]
    fn test_image_change_is_visible_in_template() {
        let ls = logset();
        let sts = full_stateful_set(&ls);

        let mut upgraded = logset();
        upgraded.spec.image = "logservice:2.0".to_string();
        let mut synced = sts.clone();
        sync_pods(&upgraded, &mut synced, &build_config_map(&upgraded).unwrap());
        assert_ne!(sts, synced);
        assert_eq!(declared_replicas(&sts), declared_replicas(&synced));
    }

    #[test]
    fn test_volume_claim_template() {
        let sts = full_stateful_set(&logset());
        let claims = sts.spec.and_then(|s| s.volume_claim_templates).unwrap();
        let claim = claims.first().unwrap();
        let spec = claim.spec.as_ref().unwrap();
        assert_eq!(spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(
            spec.resources
                .as_ref()
                .and_then(|r| r.requests.as_ref())
                .and_then(|r| r.get("storage")),
            Some(&Quantity("10Gi".to_string()))
        );
    }

    #[test]
    fn test_declared_replicas_defaults_to_one() {
        let sts = StatefulSet::default();
        assert_eq!(declared_replicas(&sts), 1);
    }
}
