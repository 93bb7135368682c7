//! Application error types.
//!
//! Every failure a caller can observe is one of these variants. None of them
//! is fatal to the serving process.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Unified error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A required configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Input failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// The read-only gate refused the statement.
    #[error("statement rejected: {0}")]
    RejectedStatement(String),

    /// No handle is registered under this logical name.
    #[error("database '{name}' not found. Available: [{}]", .available.join(", "))]
    DatabaseNotFound { name: String, available: Vec<String> },

    /// The handle exists but has no live connection.
    #[error("database '{name}' is not available: {reason}")]
    DatabaseUnavailable { name: String, reason: String },

    /// Opening a connection failed.
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    /// The driver or the server reported an error while running a statement.
    #[error("{0}")]
    DatabaseQuery(String),

    /// The statement did not finish in time.
    #[error("query timed out after {} ms", .0.as_millis())]
    QueryTimeout(std::time::Duration),

    /// The cluster façade has no usable Kubernetes client.
    #[error("no cluster connection available: {0}")]
    ClusterOffline(String),

    /// The Kubernetes API returned an error.
    #[error("Kubernetes API error: {0}")]
    Kubernetes(String),

    /// A named resource (cluster, MCP resource URI, prompt) does not exist.
    #[error("{0} not found")]
    ResourceNotFound(String),

    /// Protocol level parameter error.
    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable error code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::RejectedStatement(_) => "REJECTED",
            AppError::DatabaseNotFound { .. } | AppError::DatabaseUnavailable { .. } => {
                "NOT_FOUND"
            }
            AppError::DatabaseConnection(_) => "DATABASE_CONNECTION_ERROR",
            AppError::DatabaseQuery(_) => "DATABASE_ERROR",
            AppError::QueryTimeout(_) => "QUERY_TIMEOUT",
            AppError::ClusterOffline(_) => "CLUSTER_OFFLINE",
            AppError::Kubernetes(_) => "KUBERNETES_ERROR",
            AppError::ResourceNotFound(_) => "NOT_FOUND",
            AppError::InvalidParams(_) => "INVALID_PARAMS",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether this is a "not found" class error.
    pub fn is_not_found(&self) -> bool {
        self.code() == "NOT_FOUND"
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::RejectedStatement(_)
            | AppError::InvalidParams(_)
            | AppError::Serialization(_) => StatusCode::BAD_REQUEST,
            AppError::DatabaseNotFound { .. } | AppError::ResourceNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::DatabaseUnavailable { .. } | AppError::ClusterOffline(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::QueryTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::DatabaseConnection(_) | AppError::Kubernetes(_) => StatusCode::BAD_GATEWAY,
            AppError::Configuration(_) | AppError::DatabaseQuery(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_available_databases() {
        let err = AppError::DatabaseNotFound {
            name: "nonexistent_db".into(),
            available: vec!["alarms".into(), "resources".into()],
        };
        assert_eq!(
            err.to_string(),
            "database 'nonexistent_db' not found. Available: [alarms, resources]"
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unavailable_is_not_found_class() {
        let err = AppError::DatabaseUnavailable {
            name: "clusters".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_query_error_message_is_verbatim() {
        let err = AppError::DatabaseQuery("relation \"t\" does not exist".into());
        assert_eq!(err.to_string(), "relation \"t\" does not exist");
    }
}
