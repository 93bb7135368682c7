//! Prompt templates.

use serde_json::{Map, Value};

use common::errors::{AppError, AppResult};
use common::mcp::{PromptArgument, PromptDefinition};

pub const DEFAULT_BATCH_SIZE: &str = "5";

pub fn definitions() -> Vec<PromptDefinition> {
    vec![
        PromptDefinition {
            name: "remediate_cluster_prompt".into(),
            description: "Generate a remediation plan for a specific cluster".into(),
            arguments: vec![PromptArgument {
                name: "cluster_name".into(),
                description: "Name of the managed cluster".into(),
                required: true,
            }],
        },
        PromptDefinition {
            name: "cluster_health_audit".into(),
            description: "Generate a comprehensive cluster health audit prompt".into(),
            arguments: vec![],
        },
        PromptDefinition {
            name: "batch_remediation_prompt".into(),
            description: "Generate a batch remediation strategy".into(),
            arguments: vec![PromptArgument {
                name: "batch_size".into(),
                description: "Clusters per batch (default 5)".into(),
                required: false,
            }],
        },
    ]
}

/// Prompt arguments arrive as strings, numbers are tolerated.
fn argument(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    match arguments.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn render(name: &str, arguments: &Map<String, Value>) -> AppResult<String> {
    match name {
        "remediate_cluster_prompt" => {
            let cluster = argument(arguments, "cluster_name")
                .ok_or_else(|| AppError::InvalidParams("cluster_name is required".into()))?;
            Ok(format!(
                "I need to remediate cluster '{cluster}' to fix policy compliance issues.

Please help me:
1. Check the current health status of the cluster
2. Review what policies are non-compliant
3. Execute the remediation process
4. Monitor the progress

Use the available TALM tools to perform these operations step by step."
            ))
        }
        "cluster_health_audit" => Ok(
            "I need to perform a comprehensive health audit of all managed clusters.

Please help me:
1. List all managed clusters and their current status
2. Identify any clusters with health issues
3. Check for any active upgrade operations
4. Provide recommendations for clusters that need attention

Use the TALM resources and tools to gather this information."
                .to_string(),
        ),
        "batch_remediation_prompt" => {
            let batch_size = argument(arguments, "batch_size")
                .unwrap_or_else(|| DEFAULT_BATCH_SIZE.to_string());
            Ok(format!(
                "I need to remediate multiple clusters in batches to ensure stability.

Please help me create a strategy to:
1. List all clusters that need remediation
2. Group them into batches of {batch_size} clusters
3. Execute remediation for each batch sequentially
4. Monitor progress and handle any failures

Use the TALM tools to implement this batch processing approach."
            ))
        }
        other => Err(AppError::ResourceNotFound(format!("prompt '{}'", other))),
    }
}
