//! Shared data models for the MCP servers.

pub mod connection;
pub mod database;
pub mod query;

// Re-export commonly used types
pub use connection::DatabaseSettings;
pub use database::{DatabaseStatus, SelectionCandidate, SelectionRecommendation};
pub use query::{QueryEnvelope, QueryRequest};
