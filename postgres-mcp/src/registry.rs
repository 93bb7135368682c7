//! Database registry.
//!
//! Holds one handle per logical database, built once at start-up and closed
//! at shutdown. A database that is not configured or did not answer keeps its
//! handle, so `list_all_databases` can explain why it is missing.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::{DatabaseSettings, DatabaseStatus};

use crate::connection::{PostgresConnection, QueryConnection};

/// Logical databases in registry order, which is also selector priority.
pub const DATABASE_NAMES: [&str; 4] = ["alarms", "resources", "clusters", "main"];

/// Name of the database configured through the flat `POSTGRES_*` variables.
pub const LEGACY_DATABASE: &str = "main";

/// Resolves connection settings for every logical database.
pub fn settings_from_env(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Vec<(String, AppResult<DatabaseSettings>)> {
    DATABASE_NAMES
        .iter()
        .map(|name| {
            let settings = if *name == LEGACY_DATABASE {
                DatabaseSettings::from_legacy(lookup)
            } else {
                DatabaseSettings::from_prefixed(&name.to_uppercase(), lookup)
            };
            (name.to_string(), settings)
        })
        .collect()
}

/// One logical database.
pub struct DatabaseHandle {
    pub name: String,
    pub settings: Option<DatabaseSettings>,
    pub connection: Option<Arc<dyn QueryConnection>>,
    pub error: Option<String>,
}

impl DatabaseHandle {
    pub fn connected(
        name: impl Into<String>,
        settings: Option<DatabaseSettings>,
        connection: Arc<dyn QueryConnection>,
    ) -> Self {
        Self {
            name: name.into(),
            settings,
            connection: Some(connection),
            error: None,
        }
    }

    pub fn unconfigured(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            settings: None,
            connection: None,
            error: Some(reason.into()),
        }
    }

    pub fn unreachable(
        name: impl Into<String>,
        settings: DatabaseSettings,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            settings: Some(settings),
            connection: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.connection.is_some()
    }

    pub fn status(&self) -> DatabaseStatus {
        DatabaseStatus {
            name: self.name.clone(),
            configured: self.settings.is_some(),
            reachable: self.is_reachable(),
            host: self.settings.as_ref().map(|s| s.host.clone()),
            port: self.settings.as_ref().map(|s| s.port),
            database: self.settings.as_ref().map(|s| s.database.clone()),
            error: self.error.clone(),
        }
    }
}

/// All logical databases of this process.
pub struct DatabaseRegistry {
    handles: Vec<DatabaseHandle>,
}

impl DatabaseRegistry {
    /// 并发连接所有已配置的数据库
    ///
    /// # Arguments
    /// * `settings` - 每个逻辑数据库的解析结果，`Err` 表示未配置
    /// * `config` - 连接池大小与超时
    ///
    /// # Returns
    /// 始终返回注册表；单个数据库失败只影响它自己的句柄。
    pub async fn connect(
        settings: Vec<(String, AppResult<DatabaseSettings>)>,
        config: &AppConfig,
    ) -> Self {
        let attempts = settings.into_iter().map(|(name, resolved)| async move {
            let settings = match resolved {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::info!(database = %name, reason = %e, "database not configured");
                    return DatabaseHandle::unconfigured(name, e.to_string());
                }
            };
            match PostgresConnection::connect(&settings, config).await {
                Ok(conn) => {
                    tracing::info!(
                        database = %name,
                        host = %settings.host,
                        port = settings.port,
                        "connected to database"
                    );
                    DatabaseHandle::connected(name, Some(settings), Arc::new(conn))
                }
                Err(e) => {
                    tracing::warn!(database = %name, error = %e, "failed to connect to database");
                    DatabaseHandle::unreachable(name, settings, e.to_string())
                }
            }
        });

        let handles = futures::future::join_all(attempts).await;
        let registry = Self::from_handles(handles);
        if registry.reachable_count() == 0 {
            tracing::warn!("no database connections established");
        }
        registry
    }

    /// Builds a registry from prepared handles.
    pub fn from_handles(handles: Vec<DatabaseHandle>) -> Self {
        Self { handles }
    }

    /// 根据逻辑名称获取连接
    ///
    /// # Arguments
    /// * `name` - 逻辑数据库名称
    ///
    /// # Errors
    /// `DatabaseNotFound` for an unknown name, `DatabaseUnavailable` when the
    /// handle has no connection.
    pub fn get(&self, name: &str) -> AppResult<Arc<dyn QueryConnection>> {
        let handle = self
            .handles
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| AppError::DatabaseNotFound {
                name: name.to_string(),
                available: self.available(),
            })?;

        handle
            .connection
            .clone()
            .ok_or_else(|| AppError::DatabaseUnavailable {
                name: name.to_string(),
                reason: handle
                    .error
                    .clone()
                    .unwrap_or_else(|| "not connected".to_string()),
            })
    }

    /// Status of every handle, in registry order.
    pub fn list(&self) -> Vec<DatabaseStatus> {
        self.handles.iter().map(DatabaseHandle::status).collect()
    }

    /// Names of databases that can be queried.
    pub fn available(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| h.is_reachable())
            .map(|h| h.name.clone())
            .collect()
    }

    pub fn reachable_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_reachable()).count()
    }

    /// Whether every configured database is reachable.
    pub fn all_configured_reachable(&self) -> bool {
        self.handles
            .iter()
            .filter(|h| h.settings.is_some())
            .all(DatabaseHandle::is_reachable)
    }

    /// 关闭所有连接池
    pub async fn close(&self) {
        for handle in &self.handles {
            if let Some(conn) = &handle.connection {
                conn.close().await;
                tracing::info!(database = %handle.name, "database connection closed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::SpyConnection;
    use std::collections::HashMap;

    fn settings(db: &str) -> DatabaseSettings {
        DatabaseSettings {
            host: "localhost".into(),
            port: 5432,
            database: db.into(),
            username: "reader".into(),
            password: "secret".into(),
        }
    }

    fn partial_registry(spy: Arc<SpyConnection>) -> DatabaseRegistry {
        DatabaseRegistry::from_handles(vec![
            DatabaseHandle::connected("alarms", Some(settings("alarms")), spy),
            DatabaseHandle::unreachable("resources", settings("resources"), "connection refused"),
            DatabaseHandle::unconfigured("clusters", "CLUSTERS_DB_HOST is not set"),
        ])
    }

    #[test]
    fn test_settings_from_env_covers_every_name() {
        let vars: HashMap<&str, &str> = [
            ("ALARMS_DB_HOST", "alarms-db"),
            ("ALARMS_DB_NAME", "alarms"),
            ("POSTGRES_HOST", "legacy-db"),
        ]
        .into_iter()
        .collect();
        let lookup = |key: &str| vars.get(key).map(|v| v.to_string());
        let resolved = settings_from_env(&lookup);

        let names: Vec<&str> = resolved.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, DATABASE_NAMES);
        assert!(resolved[0].1.is_ok());
        assert!(resolved[1].1.is_err());
        assert!(resolved[2].1.is_err());
        assert_eq!(resolved[3].1.as_ref().unwrap().host, "legacy-db");
    }

    #[test]
    fn test_unknown_name_lists_available() {
        let registry = partial_registry(Arc::new(SpyConnection::counting(1)));
        let err = registry.get("nonexistent_db").err().unwrap();
        assert!(matches!(err, AppError::DatabaseNotFound { .. }));
        assert_eq!(
            err.to_string(),
            "database 'nonexistent_db' not found. Available: [alarms]"
        );
    }

    #[test]
    fn test_unreachable_and_unconfigured_are_unavailable() {
        let registry = partial_registry(Arc::new(SpyConnection::counting(1)));

        let err = registry.get("resources").err().unwrap();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("connection refused"));

        let err = registry.get("clusters").err().unwrap();
        assert!(matches!(err, AppError::DatabaseUnavailable { .. }));
    }

    #[test]
    fn test_list_reports_partial_configuration() {
        let registry = partial_registry(Arc::new(SpyConnection::counting(1)));
        let statuses = registry.list();

        assert_eq!(statuses.len(), 3);
        assert!(statuses[0].configured && statuses[0].reachable);
        assert!(statuses[1].configured && !statuses[1].reachable);
        assert!(!statuses[2].configured);
        assert_eq!(
            statuses[2].error.as_deref(),
            Some("CLUSTERS_DB_HOST is not set")
        );
        assert!(!registry.all_configured_reachable());
    }

    #[test]
    fn test_status_never_exposes_password() {
        let registry = partial_registry(Arc::new(SpyConnection::counting(1)));
        let text = serde_json::to_string(&registry.list()).unwrap();
        assert!(!text.contains("secret"));
    }

    #[tokio::test]
    async fn test_close_reaches_every_connection() {
        let spy = Arc::new(SpyConnection::counting(1));
        let registry = partial_registry(spy.clone());
        registry.close().await;
        assert!(spy.is_closed());
    }

    #[tokio::test]
    async fn test_connect_tolerates_unconfigured_and_unreachable() {
        let config = AppConfig {
            connect_timeout_secs: 1,
            ..AppConfig::default()
        };
        let dead = DatabaseSettings {
            host: "127.0.0.1".into(),
            port: 1,
            ..settings("resources")
        };

        let registry = DatabaseRegistry::connect(
            vec![
                (
                    "alarms".to_string(),
                    Err(AppError::Configuration("ALARMS_DB_HOST is not set".into())),
                ),
                ("resources".to_string(), Ok(dead)),
            ],
            &config,
        )
        .await;

        let statuses = registry.list();
        assert_eq!(statuses.len(), 2);
        assert!(!statuses[0].configured && !statuses[0].reachable);
        assert!(statuses[0].error.as_deref().unwrap().contains("ALARMS_DB_HOST"));
        assert!(statuses[1].configured && !statuses[1].reachable);
        assert!(statuses[1].error.is_some());
        assert_eq!(registry.reachable_count(), 0);
        assert!(matches!(
            registry.get("resources").err(),
            Some(AppError::DatabaseUnavailable { .. })
        ));
    }
}
