//! Database connection handling

use std::time::Duration;

use sqlx::{
    mysql::MySqlPoolOptions, postgres::PgPoolOptions, sqlite::SqlitePoolOptions, MySql, Pool,
    Postgres, Sqlite,
};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::schema::sqltype::Dialect;

/// Connection pool for one of the supported backends
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
    Sqlite(Pool<Sqlite>),
}

impl DatabaseConnection {
    /// Open a pool for the configured driver
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool_size = config.pool_size.unwrap_or(10);
        let timeout = Duration::from_secs(config.timeout_seconds.unwrap_or(30));
        let dialect = Dialect::from_driver(&config.driver)?;
        debug!(driver = %config.driver, pool_size, "Connecting to database");

        let connection = match dialect {
            Dialect::Postgres => DatabaseConnection::Postgres(
                PgPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?,
            ),
            Dialect::MySql => DatabaseConnection::MySql(
                MySqlPoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?,
            ),
            Dialect::Sqlite => DatabaseConnection::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(pool_size)
                    .acquire_timeout(timeout)
                    .connect(&config.url)
                    .await?,
            ),
            Dialect::Generic => {
                return Err(Error::DatabaseError(format!(
                    "Driver '{}' has no database backend",
                    config.driver
                )))
            }
        };
        Ok(connection)
    }

    /// Dialect used to compile defaults and pick type modules
    pub fn dialect(&self) -> Dialect {
        match self {
            DatabaseConnection::Postgres(_) => Dialect::Postgres,
            DatabaseConnection::MySql(_) => Dialect::MySql,
            DatabaseConnection::Sqlite(_) => Dialect::Sqlite,
        }
    }
}
