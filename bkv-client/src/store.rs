//! # Record Store
//!
//! Purpose: Map JSON-serializable values onto backend objects addressed by
//! bucket and key.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: Callers see typed records; pooling and wire details
//!    stay behind `ConnectionPool`.
//! 2. **Caller-Owned Shapes**: Decoding targets are chosen by the caller's type
//!    parameter, not by runtime inspection.
//! 3. **Encode Before Acquire**: Serialization failures never hold a connection.
//! 4. **Scoped Release**: Every operation holds its guard in a local, so the
//!    connection goes back on success and error alike.

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::backend::Connector;
use crate::error::{ClientError, ClientResult};
use crate::keygen::{KeyGenerator, DEFAULT_KEY_LENGTH};
use crate::pool::{ConnectionPool, PoolStatus};

/// CRUD operations over pooled backend connections.
pub struct RecordStore<C: Connector> {
    pool: ConnectionPool<C>,
    keys: KeyGenerator,
    key_length: usize,
}

impl<C: Connector> RecordStore<C> {
    /// Creates a store drawing connections from `pool`.
    pub fn new(pool: ConnectionPool<C>) -> Self {
        RecordStore {
            pool,
            keys: KeyGenerator::default(),
            key_length: DEFAULT_KEY_LENGTH,
        }
    }

    /// Overrides key generation settings used by `create`.
    pub fn with_key_settings(mut self, keys: KeyGenerator, key_length: usize) -> Self {
        self.keys = keys;
        self.key_length = key_length;
        self
    }

    /// Returns the pool backing this store.
    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Returns the pool counters.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Fetches and decodes the record at `bucket`/`key`.
    ///
    /// # Errors
    /// Pool, transport, `NotFound`, or `Decode`.
    pub fn get<T: DeserializeOwned>(&self, bucket: &str, key: &str) -> ClientResult<T> {
        let bytes = self.get_raw(bucket, key)?;
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }

    /// Fetches the stored bytes without decoding them.
    pub fn get_raw(&self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let mut conn = self.pool.acquire()?;
        conn.fetch_object(bucket, key)
    }

    /// Reports whether an object exists at `bucket`/`key`.
    pub fn exists(&self, bucket: &str, key: &str) -> ClientResult<bool> {
        match self.get_raw(bucket, key) {
            Ok(_) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Encodes `value` as JSON and stores it at `bucket`/`key`.
    ///
    /// # Errors
    /// `Encode`, pool, or transport.
    pub fn put<T: Serialize + ?Sized>(&self, bucket: &str, key: &str, value: &T) -> ClientResult<()> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let body = serde_json::to_vec(value).map_err(ClientError::Encode)?;
        let mut conn = self.pool.acquire()?;
        conn.store_object(bucket, key, &body)?;
        debug!(bucket, key, bytes = body.len(), "stored record");
        Ok(())
    }

    /// Finds a key that is not stored in `bucket` yet.
    ///
    /// # Errors
    /// Probe errors other than `NotFound`, generation errors, or
    /// `KeyGenerationExhausted`.
    pub fn unused_key(&self, bucket: &str, length: usize) -> ClientResult<String> {
        validate_bucket(bucket)?;
        self.keys
            .unused_key(bucket, length, |candidate| self.exists(bucket, candidate))
    }

    /// Stores `value` under a freshly generated key and returns that key.
    #[instrument(level = "debug", skip(self, value))]
    pub fn create<T: Serialize + ?Sized>(&self, bucket: &str, value: &T) -> ClientResult<String> {
        let key = self.unused_key(bucket, self.key_length)?;
        self.put(bucket, &key, value)?;
        Ok(key)
    }

    /// Removes the object at `bucket`/`key`.
    pub fn delete(&self, bucket: &str, key: &str) -> ClientResult<()> {
        validate_bucket(bucket)?;
        validate_key(key)?;
        let mut conn = self.pool.acquire()?;
        conn.delete_object(bucket, key)
    }

    /// Round-trips a ping over a pooled connection.
    pub fn ping(&self) -> ClientResult<()> {
        let mut conn = self.pool.acquire()?;
        conn.ping()
    }
}

fn validate_bucket(bucket: &str) -> ClientResult<()> {
    if bucket.is_empty() {
        return Err(ClientError::InvalidName("bucket name is empty".to_string()));
    }
    Ok(())
}

fn validate_key(key: &str) -> ClientResult<()> {
    if key.is_empty() {
        return Err(ClientError::InvalidName("key is empty".to_string()));
    }
    Ok(())
}
