//! Postgres-protocol warehouse backed by an `sqlx` pool.
//!
//! Redshift speaks the Postgres wire protocol, so the same client serves both.

use super::{Row, ScalarValue, Warehouse};
use crate::errors::{StarflowError, WarehouseError};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::{Column, Row as _, TypeInfo};
use std::time::Duration;

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 1,
            acquire_timeout_secs: 30,
        }
    }
}

/// A [`Warehouse`] talking to Postgres or Redshift.
#[derive(Debug, Clone)]
pub struct PostgresWarehouse {
    pool: PgPool,
}

impl PostgresWarehouse {
    /// Connects with the default pool configuration.
    ///
    /// # Errors
    ///
    /// Returns a warehouse error if the pool cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, StarflowError> {
        Self::connect_with(database_url, PoolConfig::default()).await
    }

    /// Connects with an explicit pool configuration.
    ///
    /// # Errors
    ///
    /// Returns a warehouse error if the pool cannot be established.
    pub async fn connect_with(database_url: &str, config: PoolConfig) -> Result<Self, StarflowError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| WarehouseError::new(format!("Failed to connect: {e}")))?;

        Ok(Self { pool })
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn run(&self, sql: &str) -> Result<u64, WarehouseError> {
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| WarehouseError::new(e.to_string()).with_statement(sql))?;
        Ok(result.rows_affected())
    }

    async fn get_records(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| WarehouseError::new(e.to_string()).with_statement(sql))?;

        rows.iter()
            .map(|row| decode_row(row).map_err(|e| e.with_statement(sql)))
            .collect()
    }
}

/// How a result column is decoded into a [`ScalarValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric,
    Timestamp,
    TimestampTz,
    Date,
    Text,
    Other,
}

fn column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOL" => ColumnKind::Bool,
        "INT2" => ColumnKind::SmallInt,
        "INT4" => ColumnKind::Int,
        "INT8" => ColumnKind::BigInt,
        "FLOAT4" => ColumnKind::Real,
        "FLOAT8" => ColumnKind::Double,
        "NUMERIC" => ColumnKind::Numeric,
        "TIMESTAMP" => ColumnKind::Timestamp,
        "TIMESTAMPTZ" => ColumnKind::TimestampTz,
        "DATE" => ColumnKind::Date,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" | "UNKNOWN" => ColumnKind::Text,
        _ => ColumnKind::Other,
    }
}

/// Integral decimals become `Int` so counts compare against integer
/// expectations; everything else becomes `Float`.
fn numeric_scalar(rendered: &str) -> ScalarValue {
    if let Ok(v) = rendered.parse::<i64>() {
        return ScalarValue::Int(v);
    }
    let trimmed = rendered
        .split_once('.')
        .filter(|(_, frac)| frac.chars().all(|c| c == '0'))
        .map(|(whole, _)| whole);
    if let Some(v) = trimmed.and_then(|whole| whole.parse::<i64>().ok()) {
        return ScalarValue::Int(v);
    }
    rendered
        .parse::<f64>()
        .map_or_else(|_| ScalarValue::Text(rendered.to_string()), ScalarValue::Float)
}

fn decode_row(row: &PgRow) -> Result<Row, WarehouseError> {
    row.columns()
        .iter()
        .map(|column| {
            let index = column.ordinal();
            let type_name = column.type_info().name();
            let decoded = match column_kind(type_name) {
                ColumnKind::Bool => row.try_get::<Option<bool>, _>(index).map(ScalarValue::from),
                ColumnKind::SmallInt => row
                    .try_get::<Option<i16>, _>(index)
                    .map(|v| ScalarValue::from(v.map(i64::from))),
                ColumnKind::Int => row
                    .try_get::<Option<i32>, _>(index)
                    .map(|v| ScalarValue::from(v.map(i64::from))),
                ColumnKind::BigInt => row.try_get::<Option<i64>, _>(index).map(ScalarValue::from),
                ColumnKind::Real => row
                    .try_get::<Option<f32>, _>(index)
                    .map(|v| ScalarValue::from(v.map(f64::from))),
                ColumnKind::Double => row.try_get::<Option<f64>, _>(index).map(ScalarValue::from),
                ColumnKind::Numeric => row
                    .try_get::<Option<BigDecimal>, _>(index)
                    .map(|v| v.map_or(ScalarValue::Null, |d| numeric_scalar(&d.to_string()))),
                ColumnKind::Timestamp => row
                    .try_get::<Option<NaiveDateTime>, _>(index)
                    .map(|v| ScalarValue::from(v.map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()))),
                ColumnKind::TimestampTz => row
                    .try_get::<Option<DateTime<Utc>>, _>(index)
                    .map(|v| ScalarValue::from(v.map(|ts| ts.to_rfc3339()))),
                ColumnKind::Date => row
                    .try_get::<Option<NaiveDate>, _>(index)
                    .map(|v| ScalarValue::from(v.map(|d| d.format("%Y-%m-%d").to_string()))),
                ColumnKind::Text | ColumnKind::Other => {
                    row.try_get::<Option<String>, _>(index).map(ScalarValue::from)
                }
            };
            decoded.map_err(|e| {
                WarehouseError::new(format!(
                    "Cannot decode column '{}' of type {type_name}: {e}",
                    column.name()
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kinds() {
        assert_eq!(column_kind("INT8"), ColumnKind::BigInt);
        assert_eq!(column_kind("NUMERIC"), ColumnKind::Numeric);
        assert_eq!(column_kind("TIMESTAMP"), ColumnKind::Timestamp);
        assert_eq!(column_kind("TIMESTAMPTZ"), ColumnKind::TimestampTz);
        assert_eq!(column_kind("DATE"), ColumnKind::Date);
        for name in ["VARCHAR", "TEXT", "BPCHAR"] {
            assert_eq!(column_kind(name), ColumnKind::Text);
        }
        assert_eq!(column_kind("JSONB"), ColumnKind::Other);
    }

    #[test]
    fn test_numeric_scalar() {
        assert_eq!(numeric_scalar("42"), ScalarValue::Int(42));
        assert_eq!(numeric_scalar("42.000"), ScalarValue::Int(42));
        assert_eq!(numeric_scalar("-7.0"), ScalarValue::Int(-7));
        assert_eq!(numeric_scalar("268.25"), ScalarValue::Float(268.25));
        assert!(numeric_scalar("3").matches(&ScalarValue::Float(3.0)));
    }
}
