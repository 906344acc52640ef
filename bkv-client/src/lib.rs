//! # BucketKV Client
//!
//! Purpose: Store and fetch JSON records by bucket and key over pooled backend
//! connections, create records under collision-checked random keys, and run
//! paginated queries against the search index that mirrors a bucket.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Backend sessions are reused, bounded, and
//!    released by RAII guards.
//! 2. **Strategy Pattern**: The backend transport sits behind `Connector`.
//! 3. **Typed Errors**: Every failure maps to an `ErrorKind` callers can act on.
//! 4. **Blocking by Default**: Calls run on the caller's thread; deadlines come
//!    from pool, socket, and HTTP timeouts.
//!
//! ```no_run
//! use bkv_client::{Database, SearchQuery};
//!
//! # fn main() -> bkv_client::ClientResult<()> {
//! let db = Database::connect("127.0.0.1:8087", "127.0.0.1:8098")?;
//! let key = db.create("users", &serde_json::json!({"name": "ada"}))?;
//! let user: serde_json::Value = db.get("users", &key)?;
//!
//! let mut query = SearchQuery::new("users", "name:ada");
//! let page = db.search(&mut query)?;
//! println!("{} matches, first page {:?}", page.total, page.results);
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

mod backend;
mod client;
mod error;
mod keygen;
mod pool;
mod resp;
mod search;
mod store;

pub use backend::{BackendConnection, Connector, RespConnection, RespConnector};
pub use client::{Database, DatabaseConfig};
pub use error::{ClientError, ClientResult, ErrorKind};
pub use keygen::{generate_key, KeyGenerator, DEFAULT_KEY_LENGTH, DEFAULT_MAX_ATTEMPTS, MIN_KEY_LENGTH};
pub use pool::{ConnectionPool, PoolConfig, PoolStatus, PooledConnection};
pub use search::{SearchClient, SearchQuery, SearchResult, DEFAULT_QUERY, DEFAULT_ROWS, DEFAULT_SORT};
pub use store::RecordStore;
