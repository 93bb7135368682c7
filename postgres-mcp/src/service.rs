//! 查询执行服务模块

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::QueryEnvelope;
use common::utils::SqlValidator;

use crate::registry::DatabaseRegistry;

/// SQL 查询执行服务
pub struct QueryService {
    registry: Arc<DatabaseRegistry>,
    timeout: Duration,
    max_rows: usize,
}

impl QueryService {
    pub fn new(registry: Arc<DatabaseRegistry>, config: &AppConfig) -> Self {
        Self::with_limits(
            registry,
            Duration::from_secs(config.query_timeout_secs),
            config.max_rows,
        )
    }

    pub fn with_limits(registry: Arc<DatabaseRegistry>, timeout: Duration, max_rows: usize) -> Self {
        Self {
            registry,
            timeout,
            max_rows,
        }
    }

    /// 执行只读 SQL 查询
    ///
    /// # Arguments
    /// * `database` - 逻辑数据库名称
    /// * `sql` - 待执行的语句
    ///
    /// # Returns
    /// 语句发出后的失败（驱动错误、超时）以 `success: false` 的结果返回。
    ///
    /// # Errors
    /// 数据库解析失败或语句被拒绝时返回 `Err`，此时不会发出任何语句。
    pub async fn execute(&self, database: &str, sql: &str) -> AppResult<QueryEnvelope> {
        let connection = self.registry.get(database)?;
        SqlValidator::check(sql)?;

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, connection.fetch_rows(sql, self.max_rows)).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(set)) => {
                tracing::info!(
                    database,
                    rows = set.rows.len(),
                    truncated = set.truncated,
                    elapsed_ms,
                    "query executed"
                );
                return Ok(QueryEnvelope::success(sql, set.columns, set.rows, set.truncated));
            }
            Ok(Err(e)) => e,
            Err(_) => AppError::QueryTimeout(self.timeout),
        };

        tracing::warn!(database, elapsed_ms, code = error.code(), error = %error, "query failed");
        Ok(QueryEnvelope::failure(
            sql,
            "Query execution failed",
            error.to_string(),
        ))
    }
}
