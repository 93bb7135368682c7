//! SQL query models.
//!
//! Contains the `execute_query` request and its wire-level result envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use validator::Validate;

/// Arguments of the `execute_query` tool.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct QueryRequest {
    /// Logical database name (e.g. "alarms").
    #[validate(length(min = 1, message = "database is required"))]
    pub database: String,

    /// PostgreSQL SELECT (or WITH) statement. The read-only gate decides
    /// whether it runs, so an empty string is accepted here.
    #[serde(default)]
    pub query: String,
}

/// Result envelope of a query.
///
/// The field set and names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryEnvelope {
    /// Whether the statement ran.
    pub success: bool,

    /// The statement as received.
    pub query: String,

    /// Rows as column → value maps, in result order.
    #[schema(value_type = Vec<Object>)]
    pub result: Vec<Map<String, Value>>,

    /// Number of rows in `result`.
    pub count: usize,

    /// Column names in result order.
    pub columns: Vec<String>,

    /// Human-readable message.
    pub message: String,

    /// Error detail (present on failure).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Set when rows beyond the configured cap were dropped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

impl QueryEnvelope {
    /// Creates a successful envelope.
    pub fn success(
        query: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
        truncated: bool,
    ) -> Self {
        let count = rows.len();
        let message = match (count, truncated) {
            (0, _) => "Query executed successfully, no rows returned".to_string(),
            (n, true) => format!("Query executed successfully, result truncated to {} rows", n),
            _ => "Query executed successfully".to_string(),
        };
        Self {
            success: true,
            query: query.into(),
            result: rows,
            count,
            columns,
            message,
            error: None,
            truncated,
        }
    }

    /// Creates a failed envelope carrying the error detail.
    pub fn failure(
        query: impl Into<String>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            query: query.into(),
            result: vec![],
            count: 0,
            columns: vec![],
            message: message.into(),
            error: Some(error.into()),
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use validator::Validate;

    #[test]
    fn test_success_envelope_shape() {
        let mut row = Map::new();
        row.insert("x".into(), json!(1));
        let envelope = QueryEnvelope::success("select 1 as x", vec!["x".into()], vec![row], false);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "query": "select 1 as x",
                "result": [{"x": 1}],
                "count": 1,
                "columns": ["x"],
                "message": "Query executed successfully"
            })
        );
    }

    #[test]
    fn test_failure_envelope_has_error_and_empty_rows() {
        let envelope = QueryEnvelope::failure("select nope", "Query execution failed", "syntax error");
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("syntax error"));
        assert_eq!(value["count"], json!(0));
        assert_eq!(value["result"], json!([]));
    }

    #[test]
    fn test_column_order_is_preserved() {
        let mut row = Map::new();
        row.insert("zeta".into(), json!(1));
        row.insert("alpha".into(), json!(2));
        let envelope = QueryEnvelope::success("q", vec!["zeta".into(), "alpha".into()], vec![row], false);
        let text = serde_json::to_string(&envelope.result[0]).unwrap();
        assert_eq!(text, r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn test_request_requires_database() {
        let req = QueryRequest {
            database: String::new(),
            query: "select 1".into(),
        };
        assert!(req.validate().is_err());
    }
}
