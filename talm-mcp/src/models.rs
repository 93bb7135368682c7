//! Summaries of the ACM and TALM custom resources.
//!
//! Each kind has one explicit mapping from a `DynamicObject`. Missing fields
//! fall back to the defaults the TALM CRDs document.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use serde::Serialize;
use serde_json::{json, Value};

pub const CONDITION_AVAILABLE: &str = "ManagedClusterConditionAvailable";
pub const CONDITION_JOINED: &str = "ManagedClusterJoined";

/// CGU states that mean an upgrade still needs attention.
pub const ACTIVE_CGU_STATES: [&str; 3] = ["InProgress", "Timedout", "PartiallyDone"];

const UNKNOWN: &str = "Unknown";

fn at<'a>(obj: &'a DynamicObject, pointer: &str) -> Option<&'a Value> {
    obj.data.pointer(pointer)
}

fn str_at(obj: &DynamicObject, pointer: &str, default: &str) -> String {
    at(obj, pointer)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

fn bool_at(obj: &DynamicObject, pointer: &str) -> bool {
    at(obj, pointer).and_then(Value::as_bool).unwrap_or(false)
}

fn object_at(obj: &DynamicObject, pointer: &str) -> Value {
    at(obj, pointer).cloned().unwrap_or_else(|| json!({}))
}

fn name_of(obj: &DynamicObject) -> String {
    obj.metadata.name.clone().unwrap_or_default()
}

fn namespace_of(obj: &DynamicObject) -> String {
    obj.metadata.namespace.clone().unwrap_or_default()
}

/// RFC 3339 creation time, empty when the server did not set one.
pub fn created_of(obj: &DynamicObject) -> String {
    obj.metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0.to_rfc3339())
        .unwrap_or_default()
}

fn labels_of(obj: &DynamicObject) -> BTreeMap<String, String> {
    obj.metadata.labels.clone().unwrap_or_default()
}

/// Clusters targeted by a CGU.
pub fn cgu_clusters(obj: &DynamicObject) -> Vec<String> {
    at(obj, "/spec/clusters")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

pub fn cgu_targets(obj: &DynamicObject, cluster_name: &str) -> bool {
    cgu_clusters(obj).iter().any(|c| c == cluster_name)
}

pub fn cgu_state(obj: &DynamicObject) -> String {
    str_at(obj, "/status/status/status", UNKNOWN)
}

/// One status condition of a ManagedCluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    pub reason: String,
    pub message: String,
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: String,
}

impl ClusterCondition {
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}

pub fn conditions_of(obj: &DynamicObject) -> Vec<ClusterCondition> {
    let Some(items) = at(obj, "/status/conditions").and_then(Value::as_array) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|c| {
            let field = |key: &str| c.get(key).and_then(Value::as_str).unwrap_or("").to_string();
            ClusterCondition {
                kind: field("type"),
                status: field("status"),
                reason: field("reason"),
                message: field("message"),
                last_transition_time: field("lastTransitionTime"),
            }
        })
        .collect()
}

/// Entry of `talm://clusters`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub name: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
    pub created: String,
    pub cpu_capacity: String,
    pub kubernetes_version: String,
    pub hub_accepted: bool,
}

impl ClusterSummary {
    pub fn from_object(obj: &DynamicObject) -> Self {
        let status = conditions_of(obj)
            .into_iter()
            .find(|c| c.kind == CONDITION_AVAILABLE)
            .map(|c| if c.is_true() { "Available" } else { "Unavailable" })
            .unwrap_or(UNKNOWN);

        Self {
            name: name_of(obj),
            status: status.to_string(),
            labels: labels_of(obj),
            created: created_of(obj),
            cpu_capacity: str_at(obj, "/status/allocatable/cpu", UNKNOWN),
            kubernetes_version: kubernetes_version(obj),
            hub_accepted: hub_accepted(obj),
        }
    }
}

pub fn kubernetes_version(obj: &DynamicObject) -> String {
    str_at(obj, "/status/version/kubernetes", UNKNOWN)
}

pub fn hub_accepted(obj: &DynamicObject) -> bool {
    bool_at(obj, "/spec/hubAcceptsClient")
}

/// Entry of `talm://policies`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicySummary {
    pub name: String,
    pub namespace: String,
    pub compliance: String,
    pub templates: usize,
    pub created: String,
}

impl PolicySummary {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            name: name_of(obj),
            namespace: namespace_of(obj),
            compliance: str_at(obj, "/status/compliant", UNKNOWN),
            templates: at(obj, "/spec/policy-templates")
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
            created: created_of(obj),
        }
    }
}

/// Full view of one ManagedCluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterDetail {
    pub name: String,
    pub created: String,
    pub labels: BTreeMap<String, String>,
    pub hub_accepted: bool,
    pub conditions: Vec<ClusterCondition>,
    pub capacity: Value,
    pub allocatable: Value,
    pub version: Value,
}

impl ClusterDetail {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            name: name_of(obj),
            created: created_of(obj),
            labels: labels_of(obj),
            hub_accepted: hub_accepted(obj),
            conditions: conditions_of(obj),
            capacity: object_at(obj, "/status/capacity"),
            allocatable: object_at(obj, "/status/allocatable"),
            version: object_at(obj, "/status/version"),
        }
    }
}

/// CGU as listed under a cluster's status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CguReference {
    pub name: String,
    pub namespace: String,
    pub status: String,
    pub current_batch: i64,
    pub started_at: String,
    pub enable: bool,
}

impl CguReference {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            name: name_of(obj),
            namespace: namespace_of(obj),
            status: cgu_state(obj),
            current_batch: at(obj, "/status/status/currentBatch")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            started_at: str_at(obj, "/status/status/startedAt", ""),
            enable: bool_at(obj, "/spec/enable"),
        }
    }
}

/// `talm://clusters/{cluster_name}/status` document.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterStatusReport {
    pub cluster: ClusterDetail,
    pub cgus: Vec<CguReference>,
}

/// Entry of `list_active_cgus`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CguSummary {
    pub name: String,
    pub namespace: String,
    pub clusters: Vec<String>,
    pub status: String,
    pub current_batch: i64,
    pub max_concurrency: i64,
    pub timeout: i64,
    pub enable: bool,
    pub created: String,
    pub managed_policies: Vec<Value>,
}

impl CguSummary {
    pub fn from_object(obj: &DynamicObject) -> Self {
        Self {
            name: name_of(obj),
            namespace: namespace_of(obj),
            clusters: cgu_clusters(obj),
            status: cgu_state(obj),
            current_batch: at(obj, "/status/status/currentBatch")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            max_concurrency: at(obj, "/spec/remediationStrategy/maxConcurrency")
                .and_then(Value::as_i64)
                .unwrap_or(1),
            timeout: at(obj, "/spec/remediationStrategy/timeout")
                .and_then(Value::as_i64)
                .unwrap_or(240),
            enable: bool_at(obj, "/spec/enable"),
            created: created_of(obj),
            managed_policies: at(obj, "/spec/managedPolicies")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn is_active(&self) -> bool {
        ACTIVE_CGU_STATES.contains(&self.status.as_str())
    }
}
