use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Sqlite;
use tracing::info;

use crate::libs::error::{Error, Result};

/// Hands out one connection per table operation. The connection goes back to
/// its pool when the returned guard is dropped.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn acquire(&self) -> Result<PoolConnection<Sqlite>>;
}

#[async_trait]
impl ConnectionProvider for SqlitePool {
    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(sqlx::Pool::<Sqlite>::acquire(self).await?)
    }
}

#[async_trait]
impl<P: ConnectionProvider + ?Sized> ConnectionProvider for Arc<P> {
    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        (**self).acquire().await
    }
}

/// Connection settings, loadable from the environment or any serde source.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub create_if_missing: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 30,
            create_if_missing: true,
        }
    }
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reads `DATABASE_URL` and `DATABASE_MAX_CONNECTIONS`, falling back to
    /// the defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(url) = get("DATABASE_URL") {
            config.url = url;
        }
        if let Some(max) = get("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = max.trim().parse().map_err(|_| {
                Error::Config(format!("DATABASE_MAX_CONNECTIONS is not a number: {max}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("database url is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(Error::Config("max_connections must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// A pooled SQLite database; the usual provider behind a table binding.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        info!(url = %config.url, max_connections = config.max_connections, "connecting to sqlite");

        let options =
            SqliteConnectOptions::from_str(&config.url)?.create_if_missing(config.create_if_missing);
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs));
        // An in-memory database lives only while some connection is open.
        if config.is_in_memory() {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ConnectionProvider for Database {
    async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool.acquire().await.map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_falls_back_to_defaults() {
        let config = DatabaseConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }

    #[test]
    fn env_overrides_url_and_pool_size() {
        let config = DatabaseConfig::from_vars(vars(&[
            ("DATABASE_URL", "sqlite://app.db"),
            ("DATABASE_MAX_CONNECTIONS", " 2 "),
        ]))
        .unwrap();
        assert_eq!(config.url, "sqlite://app.db");
        assert_eq!(config.max_connections, 2);
    }

    #[test]
    fn env_rejects_bad_pool_size() {
        for bad in ["lots", "0"] {
            let err =
                DatabaseConfig::from_vars(vars(&[("DATABASE_MAX_CONNECTIONS", bad)])).unwrap_err();
            assert!(matches!(err, Error::Config(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url": "sqlite://x.db", "create_if_missing": false}"#)
                .unwrap();
        assert_eq!(config.url, "sqlite://x.db");
        assert_eq!(config.max_connections, 5);
        assert!(!config.create_if_missing);
    }

    #[test]
    fn detects_in_memory_urls() {
        assert!(DatabaseConfig::default().is_in_memory());
        assert!(DatabaseConfig::new("sqlite:file:jobs?mode=memory&cache=shared").is_in_memory());
        assert!(!DatabaseConfig::new("sqlite://app.db").is_in_memory());
    }

    #[tokio::test]
    async fn in_memory_pool_keeps_a_connection_open() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        let options = db.pool().options();
        assert_eq!(options.get_min_connections(), 1);
        assert_eq!(options.get_idle_timeout(), None);
        assert_eq!(options.get_max_lifetime(), None);

        sqlx::query("CREATE TABLE kept (n INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();
        let mut conn = ConnectionProvider::acquire(&db).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kept")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn connect_hands_out_connections() {
        let db = Database::connect(&DatabaseConfig::default()).await.unwrap();
        let mut conn = ConnectionProvider::acquire(&db).await.unwrap();
        let one: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(one, 1);
    }
}
