//! Connection configuration models.
//!
//! Contains the PostgreSQL connection parameters resolved from the environment.

use serde::Serialize;
use utoipa::ToSchema;

use crate::errors::{AppError, AppResult};

/// Default PostgreSQL port.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;

/// Connection parameters for one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DatabaseSettings {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name on the server.
    pub database: String,
    /// Database username.
    pub username: String,
    /// Database password (not serialized in responses).
    #[serde(skip_serializing)]
    pub password: String,
}

impl DatabaseSettings {
    /// Resolves `{PREFIX}_DB_HOST`, `{PREFIX}_DB_PORT`, `{PREFIX}_DB_NAME`,
    /// `{PREFIX}_DB_USER` and `{PREFIX}_DB_PASSWORD`.
    ///
    /// Host and name are required. Port, user and password fall back to the
    /// legacy `POSTGRES_*` variables.
    ///
    /// # Errors
    /// Returns `AppError::Configuration` naming the first missing variable.
    pub fn from_prefixed(prefix: &str, lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let var = |suffix: &str| format!("{}_DB_{}", prefix, suffix);
        let required = |suffix: &str| {
            let key = var(suffix);
            lookup(&key).ok_or_else(|| AppError::Configuration(format!("{} is not set", key)))
        };

        let host = required("HOST")?;
        let database = required("NAME")?;
        let port = match lookup(&var("PORT")).or_else(|| lookup("POSTGRES_PORT")) {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_POSTGRES_PORT,
        };
        let username = lookup(&var("USER"))
            .or_else(|| lookup("POSTGRES_USER"))
            .unwrap_or_else(|| "postgres".to_string());
        let password = lookup(&var("PASSWORD"))
            .or_else(|| lookup("POSTGRES_PASSWORD"))
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            database,
            username,
            password,
        })
    }

    /// Resolves the legacy flat `POSTGRES_*` set.
    ///
    /// # Errors
    /// Returns `AppError::Configuration` when `POSTGRES_HOST` is not set.
    pub fn from_legacy(lookup: &dyn Fn(&str) -> Option<String>) -> AppResult<Self> {
        let host = lookup("POSTGRES_HOST")
            .ok_or_else(|| AppError::Configuration("POSTGRES_HOST is not set".into()))?;
        let port = match lookup("POSTGRES_PORT") {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_POSTGRES_PORT,
        };
        Ok(Self {
            host,
            port,
            database: lookup("POSTGRES_DB").unwrap_or_else(|| "alarms".to_string()),
            username: lookup("POSTGRES_USER").unwrap_or_else(|| "alarms".to_string()),
            password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
        })
    }
}

fn parse_port(raw: &str) -> AppResult<u16> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Configuration(format!("invalid port '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_prefixed_settings() {
        let lookup = lookup_from(&[
            ("ALARMS_DB_HOST", "alarms-db"),
            ("ALARMS_DB_PORT", "6432"),
            ("ALARMS_DB_NAME", "alarms"),
            ("ALARMS_DB_USER", "reader"),
            ("ALARMS_DB_PASSWORD", "secret"),
        ]);
        let settings = DatabaseSettings::from_prefixed("ALARMS", &lookup).unwrap();
        assert_eq!(settings.host, "alarms-db");
        assert_eq!(settings.port, 6432);
        assert_eq!(settings.username, "reader");
        assert_eq!(settings.password, "secret");
    }

    #[test]
    fn test_prefixed_falls_back_to_legacy_credentials() {
        let lookup = lookup_from(&[
            ("RESOURCES_DB_HOST", "inventory"),
            ("RESOURCES_DB_NAME", "resources"),
            ("POSTGRES_USER", "shared"),
            ("POSTGRES_PASSWORD", "shared-pw"),
        ]);
        let settings = DatabaseSettings::from_prefixed("RESOURCES", &lookup).unwrap();
        assert_eq!(settings.port, DEFAULT_POSTGRES_PORT);
        assert_eq!(settings.username, "shared");
        assert_eq!(settings.password, "shared-pw");
    }

    #[test]
    fn test_missing_host_names_the_variable() {
        let lookup = lookup_from(&[("CLUSTERS_DB_NAME", "clusters")]);
        let err = DatabaseSettings::from_prefixed("CLUSTERS", &lookup).unwrap_err();
        assert!(err.to_string().contains("CLUSTERS_DB_HOST"));
    }

    #[test]
    fn test_invalid_port_is_a_configuration_error() {
        let lookup = lookup_from(&[("POSTGRES_HOST", "localhost"), ("POSTGRES_PORT", "http")]);
        let err = DatabaseSettings::from_legacy(&lookup).unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_legacy_defaults() {
        let lookup = lookup_from(&[("POSTGRES_HOST", "localhost")]);
        let settings = DatabaseSettings::from_legacy(&lookup).unwrap();
        assert_eq!(settings.database, "alarms");
        assert_eq!(settings.username, "alarms");
        assert_eq!(settings.port, 5432);
    }

    #[test]
    fn test_password_is_not_serialized() {
        let settings = DatabaseSettings {
            host: "h".into(),
            port: 5432,
            database: "d".into(),
            username: "u".into(),
            password: "hunter2".into(),
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("hunter2"));
    }
}
