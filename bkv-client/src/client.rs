//! # Database Facade
//!
//! Purpose: One handle over the pooled record store and the search client,
//! configured once and shared for the life of the process.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Database` hides the pool, key generator, and HTTP
//!    client behind record and search calls.
//! 2. **Explicit Construction**: No globals; every `Database` owns its own pool,
//!    so tests can build isolated instances.
//! 3. **Pluggable Backend**: `with_connector` swaps the transport while keeping
//!    pooling and mapping logic identical.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;

use crate::backend::{Connector, RespConnector};
use crate::error::{ClientError, ClientResult};
use crate::keygen::{KeyGenerator, DEFAULT_KEY_LENGTH, DEFAULT_MAX_ATTEMPTS, MIN_KEY_LENGTH};
use crate::pool::{ConnectionPool, PoolConfig, PoolStatus};
use crate::search::{SearchClient, SearchQuery, SearchResult};
use crate::store::RecordStore;

/// Configuration for a [`Database`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Key-value backend address, e.g. "127.0.0.1:8087".
    pub backend_addr: String,
    /// Search service address, e.g. "127.0.0.1:8098".
    pub search_addr: String,
    /// Maximum pooled backend connections.
    pub pool_capacity: usize,
    /// How long `acquire` waits on a saturated pool.
    pub acquire_timeout: Duration,
    /// Optional backend socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional backend socket write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional backend connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Optional timeout for each search HTTP request.
    pub http_timeout: Option<Duration>,
    /// Random bytes per key generated by `create`.
    pub key_length: usize,
    /// Probe attempts before `create` gives up on finding an unused key.
    pub max_key_attempts: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend_addr: "127.0.0.1:8087".to_string(),
            search_addr: "127.0.0.1:8098".to_string(),
            pool_capacity: 20,
            acquire_timeout: Duration::from_secs(10),
            read_timeout: Some(Duration::from_millis(100)),
            write_timeout: Some(Duration::from_millis(100)),
            connect_timeout: Some(Duration::from_secs(1)),
            http_timeout: Some(Duration::from_secs(30)),
            key_length: DEFAULT_KEY_LENGTH,
            max_key_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl DatabaseConfig {
    /// Checks values that would make the database unusable.
    pub fn validate(&self) -> ClientResult<()> {
        if self.backend_addr.trim().is_empty() {
            return Err(ClientError::InvalidConfig("backend_addr is empty".to_string()));
        }
        if self.search_addr.trim().is_empty() {
            return Err(ClientError::InvalidConfig("search_addr is empty".to_string()));
        }
        if self.pool_capacity == 0 {
            return Err(ClientError::InvalidConfig("pool_capacity must be at least 1".to_string()));
        }
        if self.key_length < MIN_KEY_LENGTH {
            return Err(ClientError::InvalidConfig(format!(
                "key_length must be at least {MIN_KEY_LENGTH}"
            )));
        }
        if self.max_key_attempts == 0 {
            return Err(ClientError::InvalidConfig("max_key_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    fn connector(&self) -> RespConnector {
        RespConnector {
            addr: self.backend_addr.clone(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            connect_timeout: self.connect_timeout,
        }
    }
}

/// Record and search access for one backend and its search index.
///
/// Each call draws a connection from the pool, runs one backend command, and
/// returns the connection before the call completes.
pub struct Database<C: Connector = RespConnector> {
    config: DatabaseConfig,
    store: RecordStore<C>,
    search: SearchClient,
}

impl Database<RespConnector> {
    /// Creates a database handle with default settings for both addresses.
    pub fn connect(backend_addr: impl Into<String>, search_addr: impl Into<String>) -> ClientResult<Self> {
        let config = DatabaseConfig {
            backend_addr: backend_addr.into(),
            search_addr: search_addr.into(),
            ..DatabaseConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a database handle from a full configuration.
    pub fn with_config(config: DatabaseConfig) -> ClientResult<Self> {
        let connector = config.connector();
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> Database<C> {
    /// Creates a database handle whose pool draws members from `connector`.
    ///
    /// `config.backend_addr` is kept for reporting only; `connector` decides
    /// where connections go.
    pub fn with_connector(config: DatabaseConfig, connector: C) -> ClientResult<Self> {
        config.validate()?;
        let pool = ConnectionPool::new(
            connector,
            PoolConfig {
                capacity: config.pool_capacity,
                acquire_timeout: config.acquire_timeout,
            },
        )?;
        let store = RecordStore::new(pool)
            .with_key_settings(KeyGenerator::new(config.max_key_attempts), config.key_length);
        let search = SearchClient::new(config.search_addr.clone(), config.http_timeout)?;

        info!(
            backend = %config.backend_addr,
            search = %config.search_addr,
            capacity = config.pool_capacity,
            "database handle ready"
        );
        Ok(Database { config, store, search })
    }

    /// Configuration this handle was built with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Underlying record store.
    pub fn store(&self) -> &RecordStore<C> {
        &self.store
    }

    /// Underlying search client.
    pub fn search_client(&self) -> &SearchClient {
        &self.search
    }

    /// Pool counters.
    pub fn pool_status(&self) -> PoolStatus {
        self.store.pool_status()
    }

    /// Pings the backend through the pool.
    pub fn ping(&self) -> ClientResult<()> {
        self.store.ping()
    }

    /// Fetches and decodes the record at `bucket`/`key`.
    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> ClientResult<T> {
        self.store.get(bucket, key)
    }

    /// Fetches raw stored bytes.
    pub fn get_raw(&self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
        self.store.get_raw(bucket, key)
    }

    /// Reports whether `bucket`/`key` holds a record.
    pub fn exists(&self, bucket: &str, key: &str) -> ClientResult<bool> {
        self.store.exists(bucket, key)
    }

    /// Stores `value` as JSON at `bucket`/`key`.
    pub fn put<T: Serialize + ?Sized>(&self, bucket: &str, key: &str, value: &T) -> ClientResult<()> {
        self.store.put(bucket, key, value)
    }

    /// Stores `value` under a new unused key and returns the key.
    pub fn create<T: Serialize + ?Sized>(&self, bucket: &str, value: &T) -> ClientResult<String> {
        self.store.create(bucket, value)
    }

    /// Removes the record at `bucket`/`key`.
    pub fn delete(&self, bucket: &str, key: &str) -> ClientResult<()> {
        self.store.delete(bucket, key)
    }

    /// Finds a key of `config.key_length` random bytes not used in `bucket`.
    pub fn unused_key(&self, bucket: &str) -> ClientResult<String> {
        self.store.unused_key(bucket, self.config.key_length)
    }

    /// Runs a search, decoding documents as raw JSON.
    pub fn search(&self, query: &mut SearchQuery) -> ClientResult<SearchResult> {
        self.search.search(query)
    }

    /// Runs a search, decoding documents as `T`.
    pub fn search_as<T: DeserializeOwned>(&self, query: &mut SearchQuery) -> ClientResult<SearchResult<T>> {
        self.search.search(query)
    }

    /// Registers `bucket` with the search index.
    pub fn make_searchable(&self, bucket: &str) -> ClientResult<()> {
        self.search.make_searchable(bucket)
    }
}
