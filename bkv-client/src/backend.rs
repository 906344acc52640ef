//! # Backend Connections
//!
//! Purpose: Define the seam between the pool and whatever speaks to the
//! key-value backend, and ship the TCP implementation used in production.
//!
//! ## Design Principles
//! 1. **Strategy Pattern**: The pool is generic over `Connector`, so tests can
//!    plug in an in-memory backend without touching pool logic.
//! 2. **Lazy Transport**: `connect` only prepares a handle; `dial` opens the
//!    socket and is repeated on every checkout because idle sockets go stale.
//! 3. **Buffer Reuse**: Each connection owns its framing buffers.
//!
//! ## Wire Mapping
//!
//! Objects live under the wire key `bucket/key`:
//!
//! ```text
//! fetch_object  -> GET bucket/key        ($-1 => NotFound)
//! store_object  -> SET bucket/key body   (+OK)
//! delete_object -> DEL bucket/key        (:n, missing keys are fine)
//! ping          -> PING                  (+PONG)
//! ```

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{ClientError, ClientResult};
use crate::resp::{encode_command, read_response, RespValue};

/// A session handle to the backend.
///
/// At most one caller holds a given handle at a time; the pool enforces this.
pub trait BackendConnection: Send {
    /// (Re)establishes the transport. Called on every checkout.
    fn dial(&mut self) -> ClientResult<()>;

    /// Round-trips a no-op command.
    fn ping(&mut self) -> ClientResult<()>;

    /// Returns the raw object bytes or `ClientError::NotFound`.
    fn fetch_object(&mut self, bucket: &str, key: &str) -> ClientResult<Vec<u8>>;

    /// Stores `value` under `bucket`/`key`, replacing any existing object.
    fn store_object(&mut self, bucket: &str, key: &str, value: &[u8]) -> ClientResult<()>;

    /// Removes the object. Deleting a missing object is not an error.
    fn delete_object(&mut self, bucket: &str, key: &str) -> ClientResult<()>;
}

/// Factory for new pool members.
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by this connector.
    type Conn: BackendConnection;

    /// Creates a new, not yet dialed, connection handle.
    fn connect(&self) -> ClientResult<Self::Conn>;
}

/// Settings for TCP backend connections.
#[derive(Debug, Clone)]
pub struct RespConnector {
    /// Backend address, e.g. "127.0.0.1:8087". Host names are resolved on dial.
    pub addr: String,
    /// Optional socket read timeout.
    pub read_timeout: Option<Duration>,
    /// Optional socket write timeout.
    pub write_timeout: Option<Duration>,
    /// Optional connect timeout.
    pub connect_timeout: Option<Duration>,
}

impl RespConnector {
    /// Creates a connector for `addr` with no socket timeouts.
    pub fn new(addr: impl Into<String>) -> Self {
        RespConnector {
            addr: addr.into(),
            read_timeout: None,
            write_timeout: None,
            connect_timeout: None,
        }
    }
}

impl Connector for RespConnector {
    type Conn = RespConnection;

    fn connect(&self) -> ClientResult<RespConnection> {
        if self.addr.trim().is_empty() {
            return Err(ClientError::InvalidAddress(self.addr.clone()));
        }
        Ok(RespConnection {
            settings: self.clone(),
            reader: None,
            line_buf: Vec::with_capacity(128),
            write_buf: Vec::with_capacity(256),
        })
    }
}

/// TCP connection speaking RESP2 to the backend.
pub struct RespConnection {
    settings: RespConnector,
    // None until the first dial.
    reader: Option<BufReader<TcpStream>>,
    line_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl RespConnection {
    fn exec(&mut self, args: &[&[u8]]) -> ClientResult<RespValue> {
        if self.reader.is_none() {
            self.dial()?;
        }
        let reader = self.reader.as_mut().ok_or(ClientError::Protocol)?;

        self.write_buf.clear();
        encode_command(args, &mut self.write_buf);
        trace!(bytes = self.write_buf.len(), "sending backend command");

        let stream = reader.get_mut();
        stream.write_all(&self.write_buf)?;
        stream.flush()?;

        match read_response(reader, &mut self.line_buf)? {
            RespValue::Error(message) => Err(ClientError::Server(message)),
            reply => Ok(reply),
        }
    }
}

impl BackendConnection for RespConnection {
    fn dial(&mut self) -> ClientResult<()> {
        // Drop the old socket first; a stale peer may have closed it already.
        self.reader = None;
        let stream = open_stream(&self.settings)?;
        stream.set_read_timeout(self.settings.read_timeout)?;
        stream.set_write_timeout(self.settings.write_timeout)?;
        // Disable Nagle to keep small request latency low.
        stream.set_nodelay(true)?;
        debug!(addr = %self.settings.addr, "dialed backend");
        self.reader = Some(BufReader::new(stream));
        Ok(())
    }

    fn ping(&mut self) -> ClientResult<()> {
        match self.exec(&[b"PING"])? {
            RespValue::Simple(_) => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    fn fetch_object(&mut self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
        let wire_key = wire_key(bucket, key)?;
        match self.exec(&[b"GET", &wire_key])? {
            RespValue::Bulk(Some(data)) => Ok(data),
            RespValue::Bulk(None) => Err(ClientError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            }),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    fn store_object(&mut self, bucket: &str, key: &str, value: &[u8]) -> ClientResult<()> {
        let wire_key = wire_key(bucket, key)?;
        match self.exec(&[b"SET", &wire_key, value])? {
            RespValue::Simple(_) => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    fn delete_object(&mut self, bucket: &str, key: &str) -> ClientResult<()> {
        let wire_key = wire_key(bucket, key)?;
        match self.exec(&[b"DEL", &wire_key])? {
            RespValue::Integer(_) => Ok(()),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }
}

/// Joins `bucket` and `key` as `bucket/key`.
///
/// # Errors
/// `InvalidName` when the bucket contains `/`, since the split would be ambiguous.
fn wire_key(bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
    if bucket.contains('/') {
        return Err(ClientError::InvalidName(format!(
            "bucket name {bucket:?} contains '/'"
        )));
    }
    let mut out = Vec::with_capacity(bucket.len() + key.len() + 1);
    out.extend_from_slice(bucket.as_bytes());
    out.push(b'/');
    out.extend_from_slice(key.as_bytes());
    Ok(out)
}

fn open_stream(settings: &RespConnector) -> ClientResult<TcpStream> {
    let addr = resolve(&settings.addr)?;
    let stream = match settings.connect_timeout {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout)?,
        None => TcpStream::connect(addr)?,
    };
    Ok(stream)
}

/// Resolves `host:port` to the first socket address.
pub(crate) fn resolve(addr: &str) -> ClientResult<SocketAddr> {
    addr.to_socket_addrs()
        .map_err(|_| ClientError::InvalidAddress(addr.to_string()))?
        .next()
        .ok_or_else(|| ClientError::InvalidAddress(addr.to_string()))
}
