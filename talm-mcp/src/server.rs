//! TALM MCP server.
//!
//! Resources are read-only views over ManagedClusters, Policies and CGUs.
//! Tools report cluster problems inside their result (flagged `isError`)
//! so an agent can read what went wrong.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::mcp::{
    HealthReport, McpHandler, PromptDefinition, ResourceDefinition, ResourceTemplate, ServerInfo,
    ToolDefinition, ToolOutput,
};

use crate::client::{ClusterConnection, ConnectionMode};
use crate::cluster_api::ClusterApi;
use crate::health::{health_report, HealthStatus};
use crate::models::{
    cgu_targets, CguReference, CguSummary, ClusterDetail, ClusterStatusReport, ClusterSummary,
    PolicySummary,
};
use crate::prompts;
use crate::remediation::RemediationPlan;

const CLUSTERS_URI: &str = "talm://clusters";
const POLICIES_URI: &str = "talm://policies";
const CLUSTER_STATUS_PREFIX: &str = "talm://clusters/";
const CLUSTER_STATUS_SUFFIX: &str = "/status";

const NO_CONNECTION: &str = "No cluster connection available";
const CHECK_CONNECTIVITY: &str = "Check your kubeconfig and cluster connectivity";

#[derive(Debug, Deserialize, Validate)]
struct ClusterNameRequest {
    #[validate(length(min = 1, message = "cluster_name is required"))]
    cluster_name: String,
}

pub struct TalmMcpServer {
    service_name: String,
    connection: ClusterConnection,
    cgu_namespace: String,
}

impl TalmMcpServer {
    pub fn new(service_name: impl Into<String>, connection: ClusterConnection, cgu_namespace: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            connection,
            cgu_namespace: cgu_namespace.into(),
        }
    }

    fn api(&self) -> AppResult<&Arc<dyn ClusterApi>> {
        self.connection.api().ok_or_else(|| {
            AppError::ClusterOffline(
                "server started in offline mode, check your kubeconfig and cluster connectivity"
                    .into(),
            )
        })
    }

    fn connection_state(&self) -> Value {
        let mode = self.connection.mode();
        json!({
            "mode": mode,
            "config_source": self.connection.config_source(),
            "kubernetes_client": mode != ConnectionMode::Offline,
            "cluster_connected": mode == ConnectionMode::Connected,
            "error": self.connection.error(),
        })
    }

    fn server_status(&self) -> Value {
        let mut status = self.connection_state();
        status["server_running"] = json!(true);
        status["recommendations"] = if self.connection.api().is_none() {
            json!([
                "Check your kubeconfig file",
                "Ensure cluster is accessible",
                "Verify network connectivity",
                "Restart the MCP server"
            ])
        } else {
            json!([])
        };
        status
    }

    /// CGUs are supplementary; listing failures leave them out.
    async fn cgus_or_empty(&self, api: &Arc<dyn ClusterApi>, purpose: &str) -> Vec<kube::api::DynamicObject> {
        match api.list_cgus().await {
            Ok(cgus) => cgus,
            Err(e) => {
                tracing::warn!(error = %e, purpose, "could not fetch ClusterGroupUpgrades");
                Vec::new()
            }
        }
    }

    async fn cluster_status(&self, cluster_name: &str) -> AppResult<Value> {
        let api = self.api()?;
        let cluster = api.get_managed_cluster(cluster_name).await?;
        let cgus = self
            .cgus_or_empty(api, "cluster status")
            .await
            .iter()
            .filter(|cgu| cgu_targets(cgu, cluster_name))
            .map(CguReference::from_object)
            .collect();
        Ok(serde_json::to_value(ClusterStatusReport {
            cluster: ClusterDetail::from_object(&cluster),
            cgus,
        })?)
    }

    async fn remediate_cluster(&self, cluster_name: &str) -> ToolOutput {
        let api = match self.api() {
            Ok(api) => api,
            Err(_) => {
                return ToolOutput::error(json!({
                    "success": false,
                    "error": NO_CONNECTION,
                    "message": CHECK_CONNECTIVITY,
                }))
            }
        };

        match api.get_managed_cluster(cluster_name).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                return ToolOutput::error(json!({
                    "success": false,
                    "error": "Cluster not found",
                    "cluster_name": cluster_name,
                }))
            }
            Err(e) => return remediation_failed(cluster_name, &e),
        }

        let plan = RemediationPlan::new(
            cluster_name,
            &self.cgu_namespace,
            chrono::Utc::now().timestamp(),
        );
        match api.create_cgu(&plan.namespace, &plan.to_object()).await {
            Ok(_) => {
                tracing::info!(cluster = cluster_name, cgu = %plan.cgu_name, "remediation started");
                ToolOutput::json(plan.outcome())
            }
            Err(e) => remediation_failed(cluster_name, &e),
        }
    }

    async fn check_cluster_health(&self, cluster_name: &str) -> AppResult<ToolOutput> {
        let api = match self.api() {
            Ok(api) => api,
            Err(_) => {
                return Ok(ToolOutput::error(json!({
                    "cluster_name": cluster_name,
                    "health_status": HealthStatus::Unknown,
                    "error": NO_CONNECTION,
                    "message": CHECK_CONNECTIVITY,
                })))
            }
        };

        let cluster = match api.get_managed_cluster(cluster_name).await {
            Ok(cluster) => cluster,
            Err(e) => {
                let (status, error) = if e.is_not_found() {
                    (HealthStatus::NotFound, "Cluster not found".to_string())
                } else {
                    tracing::error!(cluster = cluster_name, error = %e, "health check failed");
                    (HealthStatus::Error, format!("Failed to check health: {}", e))
                };
                return Ok(ToolOutput::error(json!({
                    "cluster_name": cluster_name,
                    "health_status": status,
                    "error": error,
                })));
            }
        };

        let cgus = self.cgus_or_empty(api, "health check").await;
        ToolOutput::from_serialize(&health_report(&cluster, cluster_name, &cgus))
    }

    async fn list_active_cgus(&self) -> ToolOutput {
        let api = match self.api() {
            Ok(api) => api,
            Err(_) => {
                return ToolOutput::error(json!({
                    "active_cgus": [],
                    "error": NO_CONNECTION,
                    "message": CHECK_CONNECTIVITY,
                }))
            }
        };

        match api.list_cgus().await {
            Ok(cgus) => {
                let active: Vec<CguSummary> = cgus
                    .iter()
                    .map(CguSummary::from_object)
                    .filter(CguSummary::is_active)
                    .collect();
                ToolOutput::json(json!({
                    "count": active.len(),
                    "active_cgus": active,
                }))
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to list active CGUs");
                ToolOutput::error(json!({
                    "active_cgus": [],
                    "error": format!("Failed to list active CGUs: {}", e),
                }))
            }
        }
    }
}

fn remediation_failed(cluster_name: &str, e: &AppError) -> ToolOutput {
    tracing::error!(cluster = cluster_name, error = %e, "failed to remediate cluster");
    ToolOutput::error(json!({
        "success": false,
        "error": format!("Failed to remediate cluster '{}': {}", cluster_name, e),
    }))
}

fn cluster_name_argument(arguments: Value) -> AppResult<String> {
    let request: ClusterNameRequest =
        serde_json::from_value(arguments).map_err(|e| AppError::InvalidParams(e.to_string()))?;
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(request.cluster_name)
}

fn cluster_name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "cluster_name": {"type": "string", "description": "Name of the ManagedCluster"}
        },
        "required": ["cluster_name"]
    })
}

/// `talm://clusters/{cluster_name}/status` → `cluster_name`.
fn status_uri_cluster(uri: &str) -> Option<&str> {
    uri.strip_prefix(CLUSTER_STATUS_PREFIX)?
        .strip_suffix(CLUSTER_STATUS_SUFFIX)
        .filter(|name| !name.is_empty() && !name.contains('/'))
}

#[async_trait]
impl McpHandler for TalmMcpServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("TALM MCP Server".to_string()),
        }
    }

    fn instructions(&self) -> Option<String> {
        Some(
            "Topology Aware Lifecycle Manager for Red Hat ACM. Read talm://clusters and \
             talm://policies for inventory, check_cluster_health before acting, and \
             remediate_cluster to create a ClusterGroupUpgrade."
                .to_string(),
        )
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::no_arguments(
                "server_status",
                "Check TALM MCP Server status and connectivity",
            ),
            ToolDefinition::new(
                "remediate_cluster",
                "Re-apply all non-compliant policies for a specific cluster",
                cluster_name_schema(),
            ),
            ToolDefinition::new(
                "check_cluster_health",
                "Perform a comprehensive health check on a cluster",
                cluster_name_schema(),
            ),
            ToolDefinition::no_arguments(
                "list_active_cgus",
                "List all currently active ClusterGroupUpgrades",
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<ToolOutput> {
        match name {
            "server_status" => Ok(ToolOutput::json(self.server_status())),
            "remediate_cluster" => {
                let cluster = cluster_name_argument(arguments)?;
                Ok(self.remediate_cluster(&cluster).await)
            }
            "check_cluster_health" => {
                let cluster = cluster_name_argument(arguments)?;
                self.check_cluster_health(&cluster).await
            }
            "list_active_cgus" => Ok(self.list_active_cgus().await),
            other => Err(AppError::InvalidParams(format!("unknown tool: {}", other))),
        }
    }

    fn resources(&self) -> Vec<ResourceDefinition> {
        vec![
            ResourceDefinition {
                uri: CLUSTERS_URI.into(),
                name: "clusters".into(),
                description: "List all managed clusters in ACM".into(),
                mime_type: "application/json".into(),
            },
            ResourceDefinition {
                uri: POLICIES_URI.into(),
                name: "policies".into(),
                description: "List all policies bound to managed clusters".into(),
                mime_type: "application/json".into(),
            },
        ]
    }

    fn resource_templates(&self) -> Vec<ResourceTemplate> {
        vec![ResourceTemplate {
            uri_template: "talm://clusters/{cluster_name}/status".into(),
            name: "cluster_status".into(),
            description: "Get detailed status for a specific cluster".into(),
            mime_type: "application/json".into(),
        }]
    }

    async fn read_resource(&self, uri: &str) -> AppResult<Value> {
        match uri {
            CLUSTERS_URI => {
                let clusters = self.api()?.list_managed_clusters().await?;
                let summaries: Vec<ClusterSummary> =
                    clusters.iter().map(ClusterSummary::from_object).collect();
                Ok(serde_json::to_value(summaries)?)
            }
            POLICIES_URI => {
                let policies = self.api()?.list_policies().await?;
                let summaries: Vec<PolicySummary> =
                    policies.iter().map(PolicySummary::from_object).collect();
                Ok(serde_json::to_value(summaries)?)
            }
            _ => match status_uri_cluster(uri) {
                Some(cluster_name) => self.cluster_status(cluster_name).await,
                None => Err(AppError::ResourceNotFound(format!("resource '{}'", uri))),
            },
        }
    }

    fn prompts(&self) -> Vec<PromptDefinition> {
        prompts::definitions()
    }

    fn get_prompt(&self, name: &str, arguments: &Map<String, Value>) -> AppResult<String> {
        prompts::render(name, arguments)
    }

    async fn health(&self) -> HealthReport {
        HealthReport::new(
            self.connection.mode() == ConnectionMode::Connected,
            self.connection_state(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_api::testing::FakeClusterApi;
    use crate::models::fixtures::{cgu, managed_cluster, policy};
    use common::mcp::protocol::RESOURCE_NOT_FOUND;
    use common::mcp::{handle_request, JsonRpcRequest};

    fn fake() -> FakeClusterApi {
        FakeClusterApi {
            clusters: vec![
                managed_cluster("sno-1", "True", "True"),
                managed_cluster("sno-2", "False", "True"),
            ],
            policies: vec![policy("du-profile", "ztp-site", Some("NonCompliant"))],
            cgus: vec![
                cgu("sno-2-upgrade", &["sno-2"], "InProgress", "2024-05-03T00:00:00Z"),
                cgu("sno-1-done", &["sno-1"], "Completed", "2024-05-02T00:00:00Z"),
                cgu("fleet", &["sno-1", "sno-2"], "PartiallyDone", "2024-05-04T00:00:00Z"),
            ],
            ..Default::default()
        }
    }

    fn connected(api: Arc<FakeClusterApi>) -> TalmMcpServer {
        TalmMcpServer::new(
            "talm-mcp",
            ClusterConnection::connected(api, "kubeconfig"),
            "ztp-install",
        )
    }

    fn offline() -> TalmMcpServer {
        TalmMcpServer::new("talm-mcp", ClusterConnection::offline("no kubeconfig"), "ztp-install")
    }

    async fn tool(server: &TalmMcpServer, name: &str, arguments: Value) -> (bool, Value) {
        let resp = handle_request(
            server,
            JsonRpcRequest::new(1, "tools/call", json!({"name": name, "arguments": arguments})),
        )
        .await
        .unwrap();
        let result = resp.result.unwrap();
        let text = result["content"][0]["text"].as_str().unwrap();
        (
            result["isError"].as_bool().unwrap(),
            serde_json::from_str(text).unwrap(),
        )
    }

    async fn resource(server: &TalmMcpServer, uri: &str) -> Result<Value, i32> {
        let resp = handle_request(
            server,
            JsonRpcRequest::new(1, "resources/read", json!({"uri": uri})),
        )
        .await
        .unwrap();
        match (resp.result, resp.error) {
            (Some(result), _) => {
                Ok(serde_json::from_str(result["contents"][0]["text"].as_str().unwrap()).unwrap())
            }
            (None, Some(error)) => Err(error.code),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_server_status_offline_recommends_fixes() {
        let (is_error, body) = tool(&offline(), "server_status", json!({})).await;
        assert!(!is_error);
        assert_eq!(body["server_running"], true);
        assert_eq!(body["cluster_connected"], false);
        assert_eq!(body["mode"], "offline");
        assert_eq!(body["recommendations"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_remediate_creates_cgu() {
        let api = Arc::new(fake());
        let server = connected(api.clone());

        let (is_error, body) = tool(&server, "remediate_cluster", json!({"cluster_name": "sno-2"})).await;
        assert!(!is_error);
        assert_eq!(body["success"], true);
        assert!(body["cgu_name"].as_str().unwrap().starts_with("sno-2-remediate-"));

        let created = api.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].0, "ztp-install");
        assert_eq!(created[0].1.data["spec"]["clusters"], json!(["sno-2"]));
    }

    #[tokio::test]
    async fn test_remediate_unknown_cluster() {
        let api = Arc::new(fake());
        let server = connected(api.clone());

        let (is_error, body) = tool(&server, "remediate_cluster", json!({"cluster_name": "ghost"})).await;
        assert!(is_error);
        assert_eq!(body["error"], "Cluster not found");
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn test_remediate_offline() {
        let (is_error, body) = tool(&offline(), "remediate_cluster", json!({"cluster_name": "sno-1"})).await;
        assert!(is_error);
        assert_eq!(body["error"], NO_CONNECTION);
    }

    #[tokio::test]
    async fn test_check_cluster_health() {
        let server = connected(Arc::new(fake()));

        let (is_error, body) = tool(&server, "check_cluster_health", json!({"cluster_name": "sno-2"})).await;
        assert!(!is_error);
        assert_eq!(body["health_status"], "unhealthy");
        assert_eq!(body["issues"][0]["type"], "availability");
        let recent: Vec<&str> = body["recent_operations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o["name"].as_str().unwrap())
            .collect();
        assert_eq!(recent, ["fleet", "sno-2-upgrade"]);

        let (is_error, body) = tool(&server, "check_cluster_health", json!({"cluster_name": "ghost"})).await;
        assert!(is_error);
        assert_eq!(body["health_status"], "not_found");
    }

    #[tokio::test]
    async fn test_health_survives_cgu_listing_failure() {
        let server = connected(Arc::new(FakeClusterApi {
            fail_cgu_listing: true,
            ..fake()
        }));
        let (is_error, body) = tool(&server, "check_cluster_health", json!({"cluster_name": "sno-1"})).await;
        assert!(!is_error);
        assert_eq!(body["health_status"], "healthy");
        assert_eq!(body["recent_operations"], json!([]));
    }

    #[tokio::test]
    async fn test_list_active_cgus_filters_states() {
        let server = connected(Arc::new(fake()));
        let (is_error, body) = tool(&server, "list_active_cgus", json!({})).await;
        assert!(!is_error);
        assert_eq!(body["count"], 2);
        let names: Vec<&str> = body["active_cgus"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["sno-2-upgrade", "fleet"]);
    }

    #[tokio::test]
    async fn test_missing_cluster_name_is_tool_error() {
        let server = connected(Arc::new(fake()));
        let (is_error, body) = tool(&server, "check_cluster_health", json!({})).await;
        assert!(is_error);
        assert_eq!(body["error"], "INVALID_PARAMS");
    }

    #[tokio::test]
    async fn test_resources() {
        let server = connected(Arc::new(fake()));

        let clusters = resource(&server, CLUSTERS_URI).await.unwrap();
        assert_eq!(clusters.as_array().unwrap().len(), 2);
        assert_eq!(clusters[1]["status"], "Unavailable");

        let policies = resource(&server, POLICIES_URI).await.unwrap();
        assert_eq!(policies[0]["compliance"], "NonCompliant");

        let status = resource(&server, "talm://clusters/sno-1/status").await.unwrap();
        assert_eq!(status["cluster"]["name"], "sno-1");
        assert_eq!(status["cgus"].as_array().unwrap().len(), 2);

        assert_eq!(
            resource(&server, "talm://clusters/ghost/status").await,
            Err(RESOURCE_NOT_FOUND)
        );
        assert_eq!(resource(&server, "talm://nodes").await, Err(RESOURCE_NOT_FOUND));
    }

    #[tokio::test]
    async fn test_resources_offline_are_errors() {
        let code = resource(&offline(), CLUSTERS_URI).await.unwrap_err();
        assert_ne!(code, RESOURCE_NOT_FOUND);
    }

    #[test]
    fn test_status_uri_parsing() {
        assert_eq!(status_uri_cluster("talm://clusters/sno-1/status"), Some("sno-1"));
        assert_eq!(status_uri_cluster("talm://clusters//status"), None);
        assert_eq!(status_uri_cluster("talm://clusters/a/b/status"), None);
        assert_eq!(status_uri_cluster("talm://clusters"), None);
    }

    #[tokio::test]
    async fn test_health_reflects_connection() {
        assert!(connected(Arc::new(fake())).health().await.healthy);
        assert!(!offline().health().await.healthy);
    }
}
