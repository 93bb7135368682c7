//! 日志与追踪初始化

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::env_lookup;

/// 初始化全局 tracing 订阅者
///
/// 日志写到 stderr，stdout 留给 stdio 协议。`RUST_LOG` 控制级别（默认
/// `info`），`LOG_FORMAT=json` 切换为 JSON 格式。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json_requested(env_lookup("LOG_FORMAT").as_deref()) {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn json_requested(format: Option<&str>) -> bool {
    format.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}
