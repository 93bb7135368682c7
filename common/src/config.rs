//! Service configuration loaded from the environment.

use std::str::FromStr;

use clap::ValueEnum;

/// MCP transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Newline delimited JSON-RPC over stdin/stdout.
    Stdio,
    /// JSON-RPC over `POST /mcp`.
    StreamableHttp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::StreamableHttp => write!(f, "streamable-http"),
        }
    }
}

/// Service level settings shared by every binary.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name reported in logs, health checks and `serverInfo`.
    pub service_name: String,
    /// Bind address for the HTTP transport.
    pub host: String,
    /// Bind port for the HTTP transport.
    pub port: u16,
    /// Timeout for opening a database connection.
    pub connect_timeout_secs: u64,
    /// Pool size per database.
    pub max_connections: u32,
    /// Per-statement execution bound, client and server side.
    pub query_timeout_secs: u64,
    /// Row cap for a single result envelope.
    pub max_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service_name: "mcp-server".to_string(),
            host: "0.0.0.0".to_string(),
            port: 3000,
            connect_timeout_secs: 5,
            max_connections: 5,
            query_timeout_secs: 30,
            max_rows: 1000,
        }
    }
}

impl AppConfig {
    /// Loads the configuration for `service` from the process environment.
    pub fn load_with_service(service: &str) -> Self {
        Self::from_lookup(service, &env_lookup)
    }

    /// Loads the configuration through an arbitrary variable lookup.
    pub fn from_lookup(service: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: service.to_string(),
            host: lookup("SERVER_HOST").unwrap_or(defaults.host),
            port: parse_or(lookup, "SERVER_PORT", defaults.port),
            connect_timeout_secs: parse_positive(
                lookup,
                "DB_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            max_connections: parse_positive(lookup, "DB_MAX_CONNECTIONS", defaults.max_connections),
            query_timeout_secs: parse_positive(
                lookup,
                "QUERY_TIMEOUT_SECS",
                defaults.query_timeout_secs,
            ),
            max_rows: parse_positive(lookup, "QUERY_MAX_ROWS", defaults.max_rows),
        }
    }

    /// 加载服务配置并应用命令行参数
    ///
    /// # Arguments
    /// * `service` - 服务名称
    /// * `default_port` - `--port` 与 `SERVER_PORT` 都未设置时使用的端口
    /// * `args` - 传输相关命令行参数
    pub fn load_for(service: &str, default_port: u16, args: &ServeArgs) -> Self {
        Self::from_args(service, default_port, args, &env_lookup)
    }

    /// 端口优先级：`--port` > `SERVER_PORT` > `default_port`
    pub fn from_args(
        service: &str,
        default_port: u16,
        args: &ServeArgs,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let mut config = Self::from_lookup(service, lookup);
        config.port = args
            .port
            .or_else(|| lookup("SERVER_PORT").and_then(|v| v.trim().parse().ok()))
            .unwrap_or(default_port);
        if let Some(host) = &args.host {
            config.host = host.clone();
        }
        config
    }
}

/// 传输相关命令行参数，各服务通过 `#[command(flatten)]` 复用
#[derive(Debug, Clone, clap::Args)]
pub struct ServeArgs {
    /// Transport method
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    pub transport: Transport,

    /// Port for the streamable HTTP transport
    #[arg(long)]
    pub port: Option<u16>,

    /// Bind address for the streamable HTTP transport
    #[arg(long)]
    pub host: Option<String>,
}

/// Reads an environment variable, treating empty values as unset.
pub fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparsable configuration value");
                default
            }
        },
        None => default,
    }
}

/// Like [`parse_or`], but zero falls back to `default` as well.
fn parse_positive<T>(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy,
{
    let value = parse_or(lookup, key, default);
    if value > T::default() {
        value
    } else {
        tracing::warn!(key, "configuration value must be positive, using default");
        default
    }
}

/// Load .env file from the working directory (best-effort, no error if missing).
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if !env_path.exists() {
        return;
    }
    if let Ok(content) = std::fs::read_to_string(env_path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim().trim_matches('"');
                // Only set if not already set by the environment
                if std::env::var(key).is_err() {
                    std::env::set_var(key, value);
                }
            }
        }
    }
}
