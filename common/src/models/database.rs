//! Database registry and selection models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Status of one registered logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DatabaseStatus {
    /// Logical database name (alarms, resources, clusters, main).
    pub name: String,
    /// Whether connection parameters were found.
    pub configured: bool,
    /// Whether a connection was established at start-up.
    pub reachable: bool,
    /// Database host.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Database port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database name on the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Why the database is not reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Recommendation produced by the keyword selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SelectionRecommendation {
    /// Recommended database, absent when no keyword matched.
    pub recommended_database: Option<String>,
    /// Share of keyword hits that point at the recommendation, in [0, 1].
    pub confidence: f64,
    /// Keywords that matched the recommended database.
    pub matched_keywords: Vec<String>,
    /// Other databases that matched at least one keyword, best first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<SelectionCandidate>,
    /// Human-readable summary.
    pub message: String,
}

/// One scored database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SelectionCandidate {
    /// Logical database name.
    pub database: String,
    /// Number of distinct matched keywords.
    pub hits: usize,
    /// Keywords that matched.
    pub matched_keywords: Vec<String>,
}
