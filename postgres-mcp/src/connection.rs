//! PostgreSQL connection seam.
//!
//! [`QueryConnection`] is what the registry hands out; [`PostgresConnection`]
//! is the sqlx pool behind it. Rows are decoded into JSON maps keyed by
//! column name, in column order.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use serde_json::{json, Map, Value};
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::types::BigDecimal;
use sqlx::{Column, Decode, Postgres, Row, Type, TypeInfo, ValueRef};

use common::config::AppConfig;
use common::errors::{AppError, AppResult};
use common::models::DatabaseSettings;

/// Materialised result of one statement.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    /// More rows were available than requested.
    pub truncated: bool,
}

/// A live connection to one logical database.
#[async_trait]
pub trait QueryConnection: Send + Sync {
    /// Run `sql` and collect at most `max_rows` rows.
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> AppResult<RowSet>;

    /// Release the underlying connections.
    async fn close(&self);
}

/// 单个数据库的 sqlx 连接池
pub struct PostgresConnection {
    pool: PgPool,
}

impl PostgresConnection {
    /// 创建连接池并建立第一个连接
    ///
    /// # Arguments
    /// * `settings` - 数据库地址与凭据
    /// * `config` - 连接池大小、获取超时与查询超时
    ///
    /// # Errors
    /// 连接失败时返回 `AppError::DatabaseConnection`。
    ///
    /// 每个连接都带有与查询超时一致的服务端 `statement_timeout`。
    pub async fn connect(settings: &DatabaseSettings, config: &AppConfig) -> AppResult<Self> {
        let statement_timeout = format!("{}s", config.query_timeout_secs);
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .database(&settings.database)
            .username(&settings.username)
            .password(&settings.password)
            .application_name(&config.service_name)
            .options([("statement_timeout", statement_timeout.as_str())]);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| AppError::DatabaseConnection(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl QueryConnection for PostgresConnection {
    async fn fetch_rows(&self, sql: &str, max_rows: usize) -> AppResult<RowSet> {
        // Unprepared extended protocol: exactly one statement per call.
        let mut stream = sqlx::query(sql).persistent(false).fetch(&self.pool);
        let mut set = RowSet::default();

        while let Some(row) = stream.try_next().await.map_err(query_error)? {
            if set.columns.is_empty() {
                set.columns = row.columns().iter().map(|c| c.name().to_string()).collect();
            }
            if set.rows.len() >= max_rows {
                set.truncated = true;
                break;
            }
            set.rows.push(row_to_map(&row));
        }

        Ok(set)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Database errors keep the server's message untouched.
fn query_error(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) => AppError::DatabaseQuery(db.message().to_string()),
        _ => AppError::DatabaseQuery(e.to_string()),
    }
}

fn row_to_map(row: &PgRow) -> Map<String, Value> {
    let mut map = Map::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), decode_column(row, idx));
    }
    map
}

fn decode_column(row: &PgRow, idx: usize) -> Value {
    let type_info = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().into_owned(),
        Err(_) => return Value::Null,
    };
    decode_typed(row, idx, &type_info)
        .unwrap_or_else(|| Value::String(format!("<{}>", type_info.name())))
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Option<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(idx).ok()
}

/// Decodes the types agents actually query. Anything else becomes a
/// `<TYPENAME>` placeholder.
fn decode_typed(row: &PgRow, idx: usize, ty: &PgTypeInfo) -> Option<Value> {
    match ty.kind() {
        PgTypeKind::Domain(base) => return decode_typed(row, idx, base),
        PgTypeKind::Enum(_) => {
            return row
                .try_get_unchecked::<String, _>(idx)
                .ok()
                .map(Value::String)
        }
        _ => {}
    }

    let value = match ty.name() {
        "BOOL" => Value::Bool(get(row, idx)?),
        "INT2" => json!(get::<i16>(row, idx)?),
        "INT4" => json!(get::<i32>(row, idx)?),
        "INT8" => json!(get::<i64>(row, idx)?),
        "FLOAT4" => json!(get::<f32>(row, idx)?),
        "FLOAT8" => json!(get::<f64>(row, idx)?),
        // Decimal covers 28 digits, larger values go through BigDecimal
        "NUMERIC" => Value::String(match get::<rust_decimal::Decimal>(row, idx) {
            Some(d) => d.to_string(),
            None => get::<BigDecimal>(row, idx)?.to_string(),
        }),
        "OID" => json!(get::<Oid>(row, idx)?.0),
        "\"CHAR\"" => Value::String(char::from(get::<i8>(row, idx)? as u8).to_string()),
        "INTERVAL" => Value::String(format_interval(&get::<PgInterval>(row, idx)?)),
        "INET" | "CIDR" => Value::String(format_network(&get::<IpNetwork>(row, idx)?, ty.name())),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CITEXT" | "UNKNOWN" => {
            Value::String(row.try_get_unchecked::<String, _>(idx).ok()?)
        }
        "UUID" => Value::String(get::<uuid::Uuid>(row, idx)?.to_string()),
        "JSON" | "JSONB" => get::<Value>(row, idx)?,
        "TIMESTAMPTZ" => Value::String(get::<chrono::DateTime<chrono::Utc>>(row, idx)?.to_rfc3339()),
        "TIMESTAMP" => Value::String(get::<chrono::NaiveDateTime>(row, idx)?.to_string()),
        "DATE" => Value::String(get::<chrono::NaiveDate>(row, idx)?.to_string()),
        "TIME" => Value::String(get::<chrono::NaiveTime>(row, idx)?.to_string()),
        "BYTEA" => {
            let bytes: Vec<u8> = get(row, idx)?;
            let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
            Value::String(format!("\\x{}", hex))
        }
        "VOID" => Value::Null,
        "TEXT[]" | "VARCHAR[]" | "NAME[]" => json!(get::<Vec<Option<String>>>(row, idx)?),
        "INT4[]" => json!(get::<Vec<Option<i32>>>(row, idx)?),
        "INT8[]" => json!(get::<Vec<Option<i64>>>(row, idx)?),
        "FLOAT8[]" => json!(get::<Vec<Option<f64>>>(row, idx)?),
        "BOOL[]" => json!(get::<Vec<Option<bool>>>(row, idx)?),
        _ => return None,
    };
    Some(value)
}

/// PostgreSQL's default `IntervalStyle`, e.g. `1 year 2 mons 3 days 04:05:06.5`.
fn format_interval(interval: &PgInterval) -> String {
    fn unit(n: i32, singular: &str, plural: &str) -> String {
        format!("{} {}", n, if n.abs() == 1 { singular } else { plural })
    }

    let mut parts = Vec::new();
    let (years, months) = (interval.months / 12, interval.months % 12);
    if years != 0 {
        parts.push(unit(years, "year", "years"));
    }
    if months != 0 {
        parts.push(unit(months, "mon", "mons"));
    }
    if interval.days != 0 {
        parts.push(unit(interval.days, "day", "days"));
    }

    let micros = interval.microseconds;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let abs = micros.unsigned_abs();
        let secs = abs / 1_000_000;
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = abs % 1_000_000;
        if frac != 0 {
            time.push_str(format!(".{:06}", frac).trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// `inet` host addresses print without their prefix, as psql does.
fn format_network(network: &IpNetwork, type_name: &str) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if type_name == "INET" && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_keep_driver_text() {
        let err = query_error(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "DATABASE_ERROR");
        assert_eq!(err.to_string(), sqlx::Error::PoolTimedOut.to_string());
    }

    #[test]
    fn test_interval_formatting() {
        let interval = PgInterval {
            months: 14,
            days: 3,
            microseconds: 4 * 3_600_000_000 + 5 * 60_000_000 + 6_500_000,
        };
        assert_eq!(format_interval(&interval), "1 year 2 mons 3 days 04:05:06.5");

        let zero = PgInterval { months: 0, days: 0, microseconds: 0 };
        assert_eq!(format_interval(&zero), "00:00:00");

        let day = PgInterval { months: 0, days: 1, microseconds: 0 };
        assert_eq!(format_interval(&day), "1 day");

        let back = PgInterval { months: 0, days: 0, microseconds: -90_000_000 };
        assert_eq!(format_interval(&back), "-00:01:30");
    }

    #[test]
    fn test_network_formatting() {
        let host: IpNetwork = "10.0.0.1/32".parse().unwrap();
        assert_eq!(format_network(&host, "INET"), "10.0.0.1");
        assert_eq!(format_network(&host, "CIDR"), "10.0.0.1/32");

        let subnet: IpNetwork = "10.0.0.0/24".parse().unwrap();
        assert_eq!(format_network(&subnet, "INET"), "10.0.0.0/24");
    }

    /// 需要真实数据库：`PG_TEST_URL=postgres://... cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_decoding_of_catalog_types() {
        let Ok(url) = std::env::var("PG_TEST_URL") else {
            return;
        };
        let conn = PostgresConnection {
            pool: PgPool::connect(&url).await.unwrap(),
        };

        let set = conn.fetch_rows("select 1 as x", 10).await.unwrap();
        assert_eq!(set.columns, ["x"]);
        assert_eq!(set.rows[0]["x"], 1);

        let set = conn
            .fetch_rows(
                "SELECT c.oid, c.relkind, interval '1 day 02:00:00' AS age, \
                 1e40::numeric AS big, 12.50::numeric AS small, '10.0.0.1'::inet AS ip \
                 FROM pg_class c WHERE c.relname = 'pg_class'",
                10,
            )
            .await
            .unwrap();
        let row = &set.rows[0];
        assert!(row["oid"].is_u64());
        assert_eq!(row["relkind"], "r");
        assert_eq!(row["age"], "1 day 02:00:00");
        let big: f64 = row["big"].as_str().unwrap().parse().unwrap();
        assert_eq!(big, 1e40);
        assert_eq!(row["small"], "12.50");
        assert_eq!(row["ip"], "10.0.0.1");
        conn.close().await;
    }

    #[tokio::test]
    async fn test_spy_truncates_to_cap() {
        let spy = testing::SpyConnection::counting(5);
        let set = spy.fetch_rows("select x", 3).await.unwrap();
        assert_eq!(set.rows.len(), 3);
        assert!(set.truncated);
        assert_eq!(spy.call_count(), 1);
    }
}
