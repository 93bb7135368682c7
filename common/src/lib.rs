//! Shared building blocks for the MCP servers.
//!
//! - `config`: environment driven configuration
//! - `errors`: the error taxonomy shared by every tool and transport
//! - `mcp`: JSON-RPC framing plus stdio and streamable HTTP transports
//! - `models`: request/response models
//! - `telemetry`: tracing set-up shared by the binaries
//! - `utils`: the read-only SQL gate and id helpers

pub mod config;
pub mod errors;
pub mod mcp;
pub mod middleware;
pub mod models;
pub mod response;
pub mod telemetry;
pub mod utils;
