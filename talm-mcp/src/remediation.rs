//! Remediation ClusterGroupUpgrade construction.

use kube::api::DynamicObject;
use serde_json::{json, Value};

use crate::cluster_api::cgu_resource;

/// Namespace CGUs are created in unless `TALM_CGU_NAMESPACE` says otherwise.
pub const DEFAULT_CGU_NAMESPACE: &str = "ztp-install";
pub const MAX_CONCURRENCY: u32 = 1;
/// Minutes, the CRD default.
pub const TIMEOUT_MINUTES: u32 = 240;

/// A CGU that re-applies every non-compliant policy of one cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationPlan {
    pub cgu_name: String,
    pub cluster_name: String,
    pub namespace: String,
}

impl RemediationPlan {
    pub fn new(cluster_name: &str, namespace: &str, unix_ts: i64) -> Self {
        Self {
            cgu_name: format!("{}-remediate-{}", cluster_name, unix_ts),
            cluster_name: cluster_name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// The CGU object to submit. `managedPolicies` stays empty so TALM
    /// discovers the non-compliant policies itself.
    pub fn to_object(&self) -> DynamicObject {
        DynamicObject::new(&self.cgu_name, &cgu_resource())
            .within(&self.namespace)
            .data(json!({
                "spec": {
                    "clusters": [self.cluster_name],
                    "enable": true,
                    "managedPolicies": [],
                    "remediationStrategy": {
                        "maxConcurrency": MAX_CONCURRENCY,
                        "timeout": TIMEOUT_MINUTES
                    }
                }
            }))
    }

    /// Tool result after the CGU was accepted.
    pub fn outcome(&self) -> Value {
        json!({
            "success": true,
            "cgu_name": self.cgu_name,
            "cluster_name": self.cluster_name,
            "namespace": self.namespace,
            "message": "Remediation CGU created successfully",
            "monitor_resource": format!("talm://clusters/{}/status", self.cluster_name),
            "remediation_strategy": {
                "max_concurrency": MAX_CONCURRENCY,
                "timeout": TIMEOUT_MINUTES
            }
        })
    }
}
