//! Unique ID generator.

use uuid::Uuid;

/// Generates unique identifiers for requests and sessions.
pub struct IdGenerator;

impl IdGenerator {
    /// Generates a unique request ID.
    pub fn request_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generates an MCP session ID (UUID without hyphens).
    pub fn session_id() -> String {
        Uuid::new_v4().simple().to_string()
    }
}
