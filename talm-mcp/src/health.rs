//! Cluster health analysis.

use kube::api::DynamicObject;
use serde::Serialize;

use crate::models::{
    cgu_state, cgu_targets, conditions_of, created_of, hub_accepted, kubernetes_version,
    ClusterCondition, CONDITION_AVAILABLE, CONDITION_JOINED,
};

/// How many CGUs `check_cluster_health` reports.
pub const RECENT_OPERATIONS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
    /// The cluster does not exist.
    NotFound,
    /// No cluster connection to ask.
    Unknown,
    /// The API call failed.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub message: String,
}

impl HealthIssue {
    fn from_condition(kind: &str, condition: &ClusterCondition) -> Self {
        let message = if condition.message.is_empty() {
            "Unknown reason".to_string()
        } else {
            condition.message.clone()
        };
        Self {
            kind: kind.to_string(),
            reason: condition.reason.clone(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentOperation {
    pub name: String,
    pub status: String,
    pub enable: bool,
    pub created: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealthReport {
    pub cluster_name: String,
    pub health_status: HealthStatus,
    pub hub_accepted: bool,
    pub kubernetes_version: String,
    pub issues: Vec<HealthIssue>,
    pub recent_operations: Vec<RecentOperation>,
}

/// Availability failures make a cluster unhealthy; a join failure alone
/// only raises a warning.
pub fn analyze_conditions(conditions: &[ClusterCondition]) -> (HealthStatus, Vec<HealthIssue>) {
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();

    for condition in conditions.iter().filter(|c| !c.is_true()) {
        match condition.kind.as_str() {
            CONDITION_AVAILABLE => {
                status = HealthStatus::Unhealthy;
                issues.push(HealthIssue::from_condition("availability", condition));
            }
            CONDITION_JOINED => {
                if status == HealthStatus::Healthy {
                    status = HealthStatus::Warning;
                }
                issues.push(HealthIssue::from_condition("join_status", condition));
            }
            _ => {}
        }
    }

    (status, issues)
}

/// Most recent CGUs targeting `cluster_name`, newest first.
pub fn recent_operations(cluster_name: &str, cgus: &[DynamicObject]) -> Vec<RecentOperation> {
    let mut operations: Vec<RecentOperation> = cgus
        .iter()
        .filter(|cgu| cgu_targets(cgu, cluster_name))
        .map(|cgu| RecentOperation {
            name: cgu.metadata.name.clone().unwrap_or_default(),
            status: cgu_state(cgu),
            enable: cgu
                .data
                .pointer("/spec/enable")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            created: created_of(cgu),
        })
        .collect();

    // RFC 3339 in UTC sorts lexicographically
    operations.sort_by(|a, b| b.created.cmp(&a.created));
    operations.truncate(RECENT_OPERATIONS);
    operations
}

pub fn health_report(cluster: &DynamicObject, name: &str, cgus: &[DynamicObject]) -> ClusterHealthReport {
    let (health_status, issues) = analyze_conditions(&conditions_of(cluster));
    ClusterHealthReport {
        cluster_name: name.to_string(),
        health_status,
        hub_accepted: hub_accepted(cluster),
        kubernetes_version: kubernetes_version(cluster),
        issues,
        recent_operations: recent_operations(name, cgus),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::{cgu, managed_cluster};

    #[test]
    fn test_available_cluster_is_healthy() {
        let report = health_report(&managed_cluster("sno-1", "True", "True"), "sno-1", &[]);
        assert_eq!(report.health_status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn test_unavailable_is_unhealthy_even_with_join_issue() {
        let (status, issues) =
            analyze_conditions(&conditions_of(&managed_cluster("sno-1", "Unknown", "False")));
        assert_eq!(status, HealthStatus::Unhealthy);
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].kind, "availability");
        assert_eq!(issues[1].kind, "join_status");
        assert_eq!(issues[1].message, "Unknown reason");
    }

    #[test]
    fn test_join_failure_alone_is_a_warning() {
        let (status, _) =
            analyze_conditions(&conditions_of(&managed_cluster("sno-1", "True", "False")));
        assert_eq!(status, HealthStatus::Warning);
        assert_eq!(serde_json::to_value(status).unwrap(), "warning");
    }

    #[test]
    fn test_recent_operations_keeps_three_newest_for_cluster() {
        let cgus = vec![
            cgu("a", &["sno-1"], "Completed", "2024-05-01T00:00:00Z"),
            cgu("b", &["sno-1", "sno-2"], "InProgress", "2024-05-04T00:00:00Z"),
            cgu("c", &["sno-2"], "InProgress", "2024-05-05T00:00:00Z"),
            cgu("d", &["sno-1"], "Timedout", "2024-05-03T00:00:00Z"),
            cgu("e", &["sno-1"], "Completed", "2024-05-02T00:00:00Z"),
        ];
        let names: Vec<String> = recent_operations("sno-1", &cgus)
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, ["b", "d", "e"]);
    }
}
