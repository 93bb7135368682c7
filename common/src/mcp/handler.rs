//! MCP method dispatch.
//!
//! A server implements [`McpHandler`]; [`handle_message`] maps a decoded
//! JSON-RPC message (single or batch) onto it. Both transports share this
//! path, so stdio and HTTP clients see identical behaviour.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::protocol::*;
use crate::errors::{AppError, AppResult};

/// Outcome of a health check.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthReport {
    pub healthy: bool,
    #[schema(value_type = Object)]
    pub details: Value,
}

impl HealthReport {
    pub fn new(healthy: bool, details: Value) -> Self {
        Self { healthy, details }
    }
}

/// The contract both MCP servers implement.
#[async_trait]
pub trait McpHandler: Send + Sync {
    fn server_info(&self) -> ServerInfo;

    /// Free-form usage hints returned from `initialize`.
    fn instructions(&self) -> Option<String> {
        None
    }

    fn tools(&self) -> Vec<ToolDefinition>;

    /// Invoke a tool by name. `Err` is rendered as an error tool result,
    /// not as a JSON-RPC error.
    async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<ToolOutput>;

    fn resources(&self) -> Vec<ResourceDefinition> {
        Vec::new()
    }

    fn resource_templates(&self) -> Vec<ResourceTemplate> {
        Vec::new()
    }

    async fn read_resource(&self, uri: &str) -> AppResult<Value> {
        Err(AppError::ResourceNotFound(format!("resource '{}'", uri)))
    }

    fn prompts(&self) -> Vec<PromptDefinition> {
        Vec::new()
    }

    /// Render a prompt into the text of a single user message.
    fn get_prompt(&self, name: &str, _arguments: &Map<String, Value>) -> AppResult<String> {
        Err(AppError::ResourceNotFound(format!("prompt '{}'", name)))
    }

    async fn health(&self) -> HealthReport {
        HealthReport::new(true, Value::Null)
    }
}

/// Handle a decoded message. Returns `None` when nothing must be sent back
/// (a notification, or a batch made only of notifications).
pub async fn handle_message(handler: &dyn McpHandler, message: Value) -> Option<Value> {
    match message {
        Value::Array(items) if items.is_empty() => Some(to_value(JsonRpcResponse::error(
            None,
            INVALID_REQUEST,
            "empty batch",
        ))),
        Value::Array(items) => {
            let mut responses = Vec::with_capacity(items.len());
            for item in items {
                if let Some(resp) = handle_single(handler, item).await {
                    responses.push(to_value(resp));
                }
            }
            if responses.is_empty() {
                None
            } else {
                Some(Value::Array(responses))
            }
        }
        other => handle_single(handler, other).await.map(to_value),
    }
}

fn to_value(response: JsonRpcResponse) -> Value {
    serde_json::to_value(response).unwrap_or(Value::Null)
}

async fn handle_single(handler: &dyn McpHandler, message: Value) -> Option<JsonRpcResponse> {
    let id = message.get("id").cloned().filter(|v| !v.is_null());
    let request: JsonRpcRequest = match serde_json::from_value(message) {
        Ok(req) => req,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("invalid request: {}", e),
            ))
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return Some(JsonRpcResponse::error(
            request.id,
            INVALID_REQUEST,
            "jsonrpc must be \"2.0\"",
        ));
    }
    handle_request(handler, request).await
}

/// Dispatch one request to the handler.
pub async fn handle_request(
    handler: &dyn McpHandler,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let JsonRpcRequest {
        id, method, params, ..
    } = request;

    if id.is_none() {
        tracing::debug!(method = %method, "notification received");
        return None;
    }

    tracing::debug!(method = %method, "handling request");

    let outcome = match method.as_str() {
        "initialize" => Ok(initialize(handler, &params)),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(json!({ "tools": handler.tools() })),
        "tools/call" => call_tool(handler, &params).await,
        "resources/list" => Ok(json!({ "resources": handler.resources() })),
        "resources/templates/list" => {
            Ok(json!({ "resourceTemplates": handler.resource_templates() }))
        }
        "resources/read" => read_resource(handler, &params).await,
        "prompts/list" => Ok(json!({ "prompts": handler.prompts() })),
        "prompts/get" => get_prompt(handler, &params),
        _ => Err((METHOD_NOT_FOUND, format!("method not found: {}", method))),
    };

    Some(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err((code, message)) => {
            tracing::warn!(method = %method, code, error = %message, "request failed");
            JsonRpcResponse::error(id, code, message)
        }
    })
}

type Outcome = Result<Value, (i32, String)>;

fn initialize(handler: &dyn McpHandler, params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);

    let mut capabilities = Map::new();
    capabilities.insert("tools".into(), json!({ "listChanged": false }));
    if !handler.resources().is_empty() || !handler.resource_templates().is_empty() {
        capabilities.insert(
            "resources".into(),
            json!({ "subscribe": false, "listChanged": false }),
        );
    }
    if !handler.prompts().is_empty() {
        capabilities.insert("prompts".into(), json!({ "listChanged": false }));
    }

    let mut result = json!({
        "protocolVersion": protocol_version,
        "capabilities": capabilities,
        "serverInfo": handler.server_info(),
    });
    if let Some(instructions) = handler.instructions() {
        result["instructions"] = Value::String(instructions);
    }
    result
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, (i32, String)> {
    params
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| (INVALID_PARAMS, format!("missing '{}' parameter", key)))
}

async fn call_tool(handler: &dyn McpHandler, params: &Value) -> Outcome {
    let name = required_str(params, "name")?;
    if !handler.tools().iter().any(|t| t.name == name) {
        return Err((INVALID_PARAMS, format!("unknown tool: {}", name)));
    }
    let arguments = match params.get("arguments") {
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(args @ Value::Object(_)) => args.clone(),
        Some(_) => return Err((INVALID_PARAMS, "arguments must be an object".into())),
    };

    let output = match handler.call_tool(name, arguments).await {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(tool = name, code = e.code(), error = %e, "tool call failed");
            ToolOutput::error(json!({
                "success": false,
                "error": e.code(),
                "message": e.to_string(),
            }))
        }
    };
    Ok(output.into_call_result())
}

async fn read_resource(handler: &dyn McpHandler, params: &Value) -> Outcome {
    let uri = required_str(params, "uri")?;
    match handler.read_resource(uri).await {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value)
                .map_err(|e| (INTERNAL_ERROR, e.to_string()))?;
            Ok(json!({
                "contents": [{
                    "uri": uri,
                    "mimeType": "application/json",
                    "text": text,
                }]
            }))
        }
        Err(e) if e.is_not_found() => Err((RESOURCE_NOT_FOUND, e.to_string())),
        Err(e) => Err((INTERNAL_ERROR, e.to_string())),
    }
}

fn get_prompt(handler: &dyn McpHandler, params: &Value) -> Outcome {
    let name = required_str(params, "name")?;
    let arguments = params
        .get("arguments")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let description = handler
        .prompts()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.description)
        .ok_or_else(|| (INVALID_PARAMS, format!("unknown prompt: {}", name)))?;

    let text = handler
        .get_prompt(name, &arguments)
        .map_err(|e| (INVALID_PARAMS, e.to_string()))?;

    Ok(json!({
        "description": description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text },
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoServer;

    #[async_trait]
    impl McpHandler for EchoServer {
        fn server_info(&self) -> ServerInfo {
            ServerInfo {
                name: "echo".into(),
                version: "0.0.1".into(),
                title: None,
            }
        }

        fn tools(&self) -> Vec<ToolDefinition> {
            vec![
                ToolDefinition::no_arguments("echo", "Echo the arguments"),
                ToolDefinition::no_arguments("fail", "Always fails"),
            ]
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> AppResult<ToolOutput> {
            match name {
                "echo" => Ok(ToolOutput::json(arguments)),
                _ => Err(AppError::Internal("boom".into())),
            }
        }

        fn prompts(&self) -> Vec<PromptDefinition> {
            vec![PromptDefinition {
                name: "greet".into(),
                description: "Say hello".into(),
                arguments: vec![],
            }]
        }

        fn get_prompt(&self, _name: &str, arguments: &Map<String, Value>) -> AppResult<String> {
            let who = arguments.get("who").and_then(Value::as_str).unwrap_or("world");
            Ok(format!("hello {}", who))
        }
    }

    async fn call(method: &str, params: Value) -> JsonRpcResponse {
        handle_request(&EchoServer, JsonRpcRequest::new(1, method, params))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_initialize_advertises_capabilities() {
        let resp = call("initialize", json!({"protocolVersion": "2024-11-05"})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "echo");
        assert!(result["capabilities"].get("tools").is_some());
        assert!(result["capabilities"].get("prompts").is_some());
        assert!(result["capabilities"].get("resources").is_none());
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let req: JsonRpcRequest =
            serde_json::from_value(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
                .unwrap();
        assert!(handle_request(&EchoServer, req).await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let resp = call("does/not/exist", Value::Null).await;
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tool_call_success_and_failure() {
        let ok = call("tools/call", json!({"name": "echo", "arguments": {"a": 1}})).await;
        let result = ok.result.unwrap();
        assert_eq!(result["isError"], false);

        let failed = call("tools/call", json!({"name": "fail"})).await;
        let result = failed.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("INTERNAL_ERROR"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_invalid_params() {
        let resp = call("tools/call", json!({"name": "nope"})).await;
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_default_read_resource_is_not_found() {
        let resp = call("resources/read", json!({"uri": "x://y"})).await;
        assert_eq!(resp.error.unwrap().code, RESOURCE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_prompt_rendering() {
        let resp = call("prompts/get", json!({"name": "greet", "arguments": {"who": "ops"}})).await;
        let result = resp.result.unwrap();
        assert_eq!(result["messages"][0]["content"]["text"], "hello ops");
    }

    #[tokio::test]
    async fn test_batch_skips_notifications() {
        let batch = json!([
            {"jsonrpc": "2.0", "id": 1, "method": "ping"},
            {"jsonrpc": "2.0", "method": "notifications/initialized"},
            {"jsonrpc": "2.0", "id": 2, "method": "tools/list"}
        ]);
        let out = handle_message(&EchoServer, batch).await.unwrap();
        assert_eq!(out.as_array().unwrap().len(), 2);

        let only_notes = json!([{"jsonrpc": "2.0", "method": "notifications/initialized"}]);
        assert!(handle_message(&EchoServer, only_notes).await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_request_object() {
        let out = handle_message(&EchoServer, json!({"id": 7})).await.unwrap();
        assert_eq!(out["id"], 7);
        assert_eq!(out["error"]["code"], INVALID_REQUEST);
    }
}
