//! MCP tools of the PostgreSQL server.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use validator::Validate;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::mcp::{HealthReport, McpHandler, ServerInfo, ToolDefinition, ToolOutput};
use common::models::{QueryEnvelope, QueryRequest};

use crate::registry::DatabaseRegistry;
use crate::selector::DatabaseSelector;
use crate::service::QueryService;

const INSTRUCTIONS: &str = "Read-only access to the RAN PostgreSQL databases. \
Call list_all_databases to see what is reachable, select_database to pick a database \
for a question, then execute_query with a SELECT or WITH statement. When unsure what a \
column means, query col_description() rather than guessing from the data.";

const EXECUTE_QUERY_DESCRIPTION: &str = "Execute a read-only SQL query on a specified database. \
Only statements starting with SELECT or WITH are accepted. Returns a JSON envelope with \
success, query, result (rows as column/value objects), count, columns and message. \
Example: SELECT table_name FROM information_schema.tables WHERE table_schema = 'public'";

/// Arguments of `select_database`.
#[derive(Debug, Deserialize, Validate)]
struct SelectDatabaseRequest {
    #[validate(length(min = 1, message = "description is required"))]
    description: String,
}

pub struct PostgresMcpServer {
    service_name: String,
    registry: Arc<DatabaseRegistry>,
    selector: DatabaseSelector,
    queries: QueryService,
}

impl PostgresMcpServer {
    pub fn new(registry: Arc<DatabaseRegistry>, config: &AppConfig) -> Self {
        Self::with_service(
            config.service_name.clone(),
            registry.clone(),
            QueryService::new(registry, config),
        )
    }

    pub fn with_service(
        service_name: String,
        registry: Arc<DatabaseRegistry>,
        queries: QueryService,
    ) -> Self {
        Self {
            service_name,
            registry,
            selector: DatabaseSelector::default(),
            queries,
        }
    }

    fn list_all_databases(&self) -> Value {
        let databases = self.registry.list();
        let available = self.registry.available();
        json!({
            "success": true,
            "count": databases.len(),
            "available": available,
            "databases": databases,
        })
    }

    async fn execute_query(&self, request: QueryRequest) -> AppResult<ToolOutput> {
        let envelope = match self.queries.execute(&request.database, &request.query).await {
            Ok(envelope) => envelope,
            Err(e) => {
                let message = match &e {
                    AppError::RejectedStatement(_) => {
                        "Only SELECT or WITH queries are allowed for safety"
                    }
                    e if e.is_not_found() => "Database not available",
                    _ => "Query execution failed",
                };
                QueryEnvelope::failure(request.query.as_str(), message, e.to_string())
            }
        };

        let value = serde_json::to_value(&envelope)?;
        Ok(if envelope.success {
            ToolOutput::json(value)
        } else {
            ToolOutput::error(value)
        })
    }
}

fn parse_arguments<T: DeserializeOwned + Validate>(arguments: Value) -> AppResult<T> {
    let parsed: T =
        serde_json::from_value(arguments).map_err(|e| AppError::InvalidParams(e.to_string()))?;
    parsed
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(parsed)
}

#[async_trait]
impl McpHandler for PostgresMcpServer {
    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            name: self.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            title: Some("PostgreSQL MCP Server".to_string()),
        }
    }

    fn instructions(&self) -> Option<String> {
        Some(INSTRUCTIONS.to_string())
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::no_arguments(
                "list_all_databases",
                "List every logical database with its configuration and reachability.",
            ),
            ToolDefinition::new(
                "select_database",
                "Recommend the database best suited to a natural language description of the data needed.",
                json!({
                    "type": "object",
                    "properties": {
                        "description": {
                            "type": "string",
                            "description": "What the question is about, e.g. 'critical alarms from last week'"
                        }
                    },
                    "required": ["description"]
                }),
            ),
            ToolDefinition::new(
                "execute_query",
                EXECUTE_QUERY_DESCRIPTION,
                json!({
                    "type": "object",
                    "properties": {
                        "database": {
                            "type": "string",
                            "description": "Logical database name (alarms, resources, clusters or main)"
                        },
                        "query": {
                            "type": "string",
                            "description": "PostgreSQL SELECT query to execute"
                        }
                    },
                    "required": ["database", "query"]
                }),
            ),
        ]
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<ToolOutput> {
        match name {
            "list_all_databases" => Ok(ToolOutput::json(self.list_all_databases())),
            "select_database" => {
                let request: SelectDatabaseRequest = parse_arguments(arguments)?;
                ToolOutput::from_serialize(
                    &self
                        .selector
                        .recommend_available(&request.description, &self.registry.available()),
                )
            }
            "execute_query" => {
                let request: QueryRequest = parse_arguments(arguments)?;
                self.execute_query(request).await
            }
            other => Err(AppError::InvalidParams(format!("unknown tool: {}", other))),
        }
    }

    async fn health(&self) -> HealthReport {
        let healthy =
            self.registry.reachable_count() > 0 && self.registry.all_configured_reachable();
        HealthReport::new(healthy, json!({ "databases": self.registry.list() }))
    }
}
