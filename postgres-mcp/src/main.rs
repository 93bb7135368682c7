//! PostgreSQL MCP 服务
//!
//! 为 AI 代理提供只读 SQL 访问，包括：
//! - 多个逻辑数据库（alarms / resources / clusters / main）
//! - 基于关键字的数据库推荐
//! - 只读 SQL 校验、超时与行数限制

mod connection;
mod registry;
mod selector;
mod service;
mod tools;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use common::config::{env_lookup, load_dotenv, AppConfig, ServeArgs};
use common::mcp::{self, McpHandler};
use registry::DatabaseRegistry;
use tools::PostgresMcpServer;
use tracing::info;

const SERVICE_NAME: &str = "postgres-mcp";
const DEFAULT_PORT: u16 = 3000;

#[derive(Debug, Parser)]
#[command(name = SERVICE_NAME, version, about = "PG MCP Server")]
struct Cli {
    #[command(flatten)]
    serve: ServeArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 初始化日志追踪（stdout 留给 stdio 协议）
    common::telemetry::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load_for(SERVICE_NAME, DEFAULT_PORT, &cli.serve);

    // 连接所有已配置的数据库（部分失败不影响启动）
    let registry = Arc::new(
        DatabaseRegistry::connect(registry::settings_from_env(&env_lookup), &config).await,
    );
    info!(
        service = SERVICE_NAME,
        reachable = registry.reachable_count(),
        available = ?registry.available(),
        "database registry ready"
    );

    let server: Arc<dyn McpHandler> = Arc::new(PostgresMcpServer::new(registry.clone(), &config));
    let served = mcp::run(server, &config, cli.serve.transport).await;

    // 关闭所有连接池
    registry.close().await;
    served.context("transport failed")?;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}
