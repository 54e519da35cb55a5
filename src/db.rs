//! Database connection pool
//!
//! [`DbPool`] is a [`Pool`] whose factory opens connections through a
//! [`Connector`] using the parameters of a [`DbConfig`]. It adds nothing to
//! the pooling behavior; the connection protocol lives entirely behind the
//! connector.

use crate::config::{DEFAULT_POOL_SIZE, PoolConfiguration};
use crate::errors::{FactoryError, PoolResult};
use crate::factory::ResourceFactory;
use crate::pool::Pool;

use async_trait::async_trait;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Connection parameters for a database pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::DbConfig;
///
/// let config = DbConfig::new()
///     .with_host("127.0.0.1")
///     .with_port(3306)
///     .with_dbname("test")
///     .with_charset("utf8")
///     .with_username("root")
///     .with_password("root");
///
/// assert_eq!(config.dsn(), "mysql:host=127.0.0.1;dbname=test;charset=utf8");
/// ```
#[derive(Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DbConfig {
    pub driver: String,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub charset: String,
    pub username: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing))]
    pub password: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            driver: "mysql".to_string(),
            host: "127.0.0.1".to_string(),
            port: 3306,
            dbname: "test".to_string(),
            charset: "utf8mb4".to_string(),
            username: "root".to_string(),
            password: String::new(),
        }
    }
}

impl DbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.dbname = dbname.into();
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Data source name handed to the connector. Credentials are passed
    /// separately.
    pub fn dsn(&self) -> String {
        format!(
            "{}:host={};dbname={};charset={}",
            self.driver, self.host, self.dbname, self.charset
        )
    }
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("charset", &self.charset)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Opens database connections
///
/// The only part of a [`DbPool`] that speaks the database protocol.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(
        &self,
        dsn: &str,
        username: &str,
        password: &str,
    ) -> Result<Self::Connection, FactoryError>;
}

struct ConnectionFactory<K> {
    connector: K,
    config: Arc<DbConfig>,
}

#[async_trait]
impl<K: Connector> ResourceFactory for ConnectionFactory<K> {
    type Resource = K::Connection;

    async fn create(&self) -> Result<K::Connection, FactoryError> {
        let dsn = self.config.dsn();
        tracing::debug!(dsn = %dsn, username = %self.config.username, "opening database connection");
        self.connector
            .connect(&dsn, &self.config.username, &self.config.password)
            .await
    }
}

/// Pool of database connections
///
/// Derefs to [`Pool`], so connections are acquired, released and discarded
/// exactly as with any other pool.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{Connector, DbConfig, DbPool, FactoryError};
///
/// struct Loopback;
///
/// #[async_trait::async_trait]
/// impl Connector for Loopback {
///     type Connection = String;
///
///     async fn connect(&self, dsn: &str, _user: &str, _password: &str) -> Result<String, FactoryError> {
///         Ok(dsn.to_string())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = DbPool::new(DbConfig::new().with_dbname("app"), Loopback).unwrap();
/// let conn = pool.acquire().await.unwrap();
///
/// assert_eq!(pool.capacity(), 64);
/// assert!(conn.contains("dbname=app"));
/// # }
/// ```
pub struct DbPool<C> {
    pool: Pool<C>,
    config: Arc<DbConfig>,
}

impl<C> Clone for DbPool<C> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<C> fmt::Debug for DbPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbPool")
            .field("config", &self.config)
            .field("pool", &self.pool)
            .finish()
    }
}

impl<C: Send + 'static> DbPool<C> {
    /// Create a pool of [`DEFAULT_POOL_SIZE`] connections
    pub fn new<K>(config: DbConfig, connector: K) -> PoolResult<Self>
    where
        K: Connector<Connection = C>,
    {
        Self::with_size(config, connector, DEFAULT_POOL_SIZE)
    }

    /// Create a pool of at most `size` connections
    pub fn with_size<K>(config: DbConfig, connector: K, size: usize) -> PoolResult<Self>
    where
        K: Connector<Connection = C>,
    {
        Self::with_configuration(
            config,
            connector,
            PoolConfiguration::new().with_max_pool_size(size),
        )
    }

    /// Create a pool with full control over the pool settings
    pub fn with_configuration<K>(
        config: DbConfig,
        connector: K,
        pool_config: PoolConfiguration<C>,
    ) -> PoolResult<Self>
    where
        K: Connector<Connection = C>,
    {
        let config = Arc::new(config);
        let factory = ConnectionFactory {
            connector,
            config: Arc::clone(&config),
        };
        Ok(Self {
            pool: Pool::new(factory, pool_config)?,
            config,
        })
    }
}

impl<C> DbPool<C> {
    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn pool(&self) -> &Pool<C> {
        &self.pool
    }
}

impl<C> Deref for DbPool<C> {
    type Target = Pool<C>;

    fn deref(&self) -> &Pool<C> {
        &self.pool
    }
}
