//! TALM MCP 服务
//!
//! 通过 MCP 暴露 Red Hat ACM / TALM 的集群管理能力：
//! - 资源：ManagedCluster、Policy、集群状态
//! - 工具：健康检查、创建修复用 ClusterGroupUpgrade
//! - 提示词模板

mod client;
mod cluster_api;
mod health;
mod models;
mod prompts;
mod remediation;
mod server;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::config::{env_lookup, load_dotenv, AppConfig, ServeArgs};
use common::mcp::{self, McpHandler};
use server::TalmMcpServer;
use tracing::info;

const SERVICE_NAME: &str = "talm-mcp";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "TALM MCP Server")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    common::telemetry::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_for(SERVICE_NAME, DEFAULT_PORT, &cli.serve);
    let cgu_namespace = env_lookup("TALM_CGU_NAMESPACE")
        .unwrap_or_else(|| remediation::DEFAULT_CGU_NAMESPACE.to_string());

    // 连接失败时以受限/离线模式启动
    let connection = client::bootstrap().await;
    info!(
        service = SERVICE_NAME,
        mode = ?connection.mode(),
        cgu_namespace = %cgu_namespace,
        "cluster connection ready"
    );

    let server: Arc<dyn McpHandler> =
        Arc::new(TalmMcpServer::new(SERVICE_NAME, connection, cgu_namespace));
    mcp::run(server, &config, cli.serve.transport)
        .await
        .context("transport failed")?;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}
