//! Minimal Model Context Protocol server layer.
//!
//! JSON-RPC framing, method dispatch and the two transports (stdio and
//! streamable HTTP). Servers plug in through [`McpHandler`].

pub mod handler;
pub mod http;
pub mod protocol;
pub mod stdio;

pub use handler::{handle_message, handle_request, HealthReport, McpHandler};
pub use http::{router, serve_http};
pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, PromptArgument, PromptDefinition,
    ResourceDefinition, ResourceTemplate, ServerInfo, ToolDefinition, ToolOutput,
};
pub use stdio::serve_stdio;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::{AppConfig, Transport};

/// 按所选传输方式提供服务
///
/// # Arguments
/// * `handler` - MCP 服务实现
/// * `config` - HTTP 传输使用其中的 `host` 与 `port`
/// * `transport` - 传输方式
///
/// # Returns
/// stdio 在 stdin 关闭或收到关闭信号并排空请求后返回；HTTP 在优雅关闭后返回。
pub async fn run(
    handler: Arc<dyn McpHandler>,
    config: &AppConfig,
    transport: Transport,
) -> std::io::Result<()> {
    tracing::info!(service = %config.service_name, %transport, "启动服务");
    match transport {
        Transport::Stdio => serve_stdio(handler, shutdown_signal()).await,
        Transport::StreamableHttp => {
            let addr: SocketAddr = format!("{}:{}", config.host, config.port)
                .parse()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
            serve_http(handler, addr, shutdown_signal()).await
        }
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
