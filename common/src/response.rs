//! Body of the plain HTTP error responses.
//!
//! MCP traffic uses JSON-RPC framing instead, see [`crate::mcp`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse {
    /// Always `false`, successful HTTP answers use their own bodies.
    pub success: bool,
    pub error: ApiError,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Stable code, see [`crate::errors::AppError::code`].
    pub code: String,
    pub message: String,
}

impl ApiResponse {
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ApiError {
                code: code.into(),
                message: message.into(),
            },
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let value = serde_json::to_value(ApiResponse::err("NOT_FOUND", "missing")).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "NOT_FOUND");
        assert_eq!(value["error"]["message"], "missing");
        assert!(value["timestamp"].is_string());
    }
}
