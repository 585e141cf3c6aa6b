//! Warehouse abstraction.
//!
//! Every statement the pipeline issues goes through the [`Warehouse`] trait.
//! Connections are looked up by name in a [`ConnectionRegistry`], so task
//! declarations only carry connection ids, never hosts or passwords.

#[cfg(feature = "postgres")]
mod postgres;
mod registry;
mod value;

#[cfg(feature = "postgres")]
pub use postgres::{PoolConfig, PostgresWarehouse};
pub use registry::ConnectionRegistry;
pub use value::{Row, ScalarValue};

use crate::errors::WarehouseError;
use async_trait::async_trait;

/// A SQL endpoint the pipeline loads into and checks against.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Executes one or more statements, returning the number of affected rows.
    async fn run(&self, sql: &str) -> Result<u64, WarehouseError>;

    /// Executes a query and returns all rows.
    async fn get_records(&self, sql: &str) -> Result<Vec<Row>, WarehouseError>;
}
