//! # Search Client
//!
//! Purpose: Query the full-text index that shadows a bucket and register
//! buckets for indexing.
//!
//! ## Design Principles
//! 1. **Pass-Through Queries**: The query string reaches the index verbatim;
//!    only pagination and sort defaults are filled in.
//! 2. **Diagnosable Requests**: The built endpoint is stored on the query so
//!    callers can log or replay it.
//! 3. **Typed Documents**: Result documents decode into the caller's type,
//!    defaulting to raw JSON values.
//!
//! ## Endpoints
//!
//! ```text
//! GET http://{addr}/solr/{index}/select?q=..&q.op=and&start=..&rows=..&sort=..&wt=json
//!     -> {"response":{"numFound":N,"start":S,"docs":[...]}}
//! PUT http://{addr}/riak/{bucket}   (pre-commit hook props)  -> 204
//! ```

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Query used when none is given.
pub const DEFAULT_QUERY: &str = "*";

/// Page size used when `rows` is zero.
pub const DEFAULT_ROWS: u64 = 1000;

/// Sort used when none is given; the index picks its own order.
pub const DEFAULT_SORT: &str = "none";

/// Bucket properties that route writes through the indexing hook.
const PRECOMMIT_PROPS: &str =
    r#"{"props":{"precommit":[{"mod":"riak_search_kv_hook","fun":"precommit"}]}}"#;

/// A paginated query against one index.
///
/// Empty or zero fields are replaced with defaults when the endpoint is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    /// Index to query, normally the bucket name.
    pub index: String,
    /// Query string in the index's own syntax.
    pub query: String,
    /// Offset of the first result.
    pub start: u64,
    /// Maximum results to return.
    pub rows: u64,
    /// Sort clause.
    pub sort: String,
    /// Last endpoint built for this query.
    pub endpoint: Option<String>,
}

impl SearchQuery {
    /// Creates a query for `index` with all other fields defaulted.
    pub fn new(index: impl Into<String>, query: impl Into<String>) -> Self {
        SearchQuery {
            index: index.into(),
            query: query.into(),
            ..SearchQuery::default()
        }
    }

    /// Fills empty query, zero rows, and empty sort with defaults.
    pub fn apply_defaults(&mut self) {
        if self.query.is_empty() {
            self.query = DEFAULT_QUERY.to_string();
        }
        if self.rows == 0 {
            self.rows = DEFAULT_ROWS;
        }
        if self.sort.is_empty() {
            self.sort = DEFAULT_SORT.to_string();
        }
    }

    /// Applies defaults, builds the select URL, and records it on the query.
    ///
    /// # Errors
    /// `InvalidName` for an empty index; `InvalidAddress` when `search_addr`
    /// does not form a valid URL authority.
    pub fn endpoint(&mut self, search_addr: &str) -> ClientResult<&str> {
        if self.index.is_empty() {
            return Err(ClientError::InvalidName("search index is empty".to_string()));
        }
        self.apply_defaults();

        let mut url = base_url(search_addr, &["solr", self.index.as_str(), "select"])?;
        url.query_pairs_mut()
            .append_pair("q", &self.query)
            .append_pair("q.op", "and")
            .append_pair("start", &self.start.to_string())
            .append_pair("rows", &self.rows.to_string())
            .append_pair("sort", &self.sort)
            .append_pair("wt", "json");

        Ok(self.endpoint.insert(url.into()).as_str())
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<T = serde_json::Value> {
    /// Matching documents, in index order.
    pub results: Vec<T>,
    /// Offset of the first document in this page.
    pub start: u64,
    /// Total matches reported by the index.
    pub total: u64,
}

#[derive(Deserialize)]
struct Envelope<T> {
    response: EnvelopeBody<T>,
}

#[derive(Deserialize)]
struct EnvelopeBody<T> {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    start: u64,
    #[serde(default = "Vec::new")]
    docs: Vec<T>,
}

/// HTTP client for the search collaborator.
#[derive(Debug, Clone)]
pub struct SearchClient {
    addr: String,
    http: Client,
}

impl SearchClient {
    /// Creates a client for the search service at `addr` (`host:port`).
    ///
    /// `timeout` bounds each request from connect to last body byte. The
    /// search service is addressed directly; environment proxies are ignored.
    pub fn new(addr: impl Into<String>, timeout: Option<Duration>) -> ClientResult<Self> {
        let http = Client::builder().timeout(timeout).no_proxy().build()?;
        Ok(SearchClient {
            addr: addr.into(),
            http,
        })
    }

    /// Search service address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Runs `query` and decodes the documents as `T`.
    ///
    /// Defaults are written back into `query`, along with the endpoint used.
    ///
    /// # Errors
    /// `Http` on transport failure, `UnexpectedStatus` on a non-2xx reply,
    /// `MalformedEnvelope` when the body is not a search envelope.
    pub fn search<T: DeserializeOwned>(&self, query: &mut SearchQuery) -> ClientResult<SearchResult<T>> {
        let url = query.endpoint(&self.addr)?.to_string();
        debug!(%url, "search request");

        let response = self.http.get(url).send()?;
        let status = response.status();
        let body = response.bytes()?;
        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            });
        }

        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|err| ClientError::MalformedEnvelope(err.to_string()))?;
        debug!(total = envelope.response.num_found, "search response");

        Ok(SearchResult {
            results: envelope.response.docs,
            start: envelope.response.start,
            total: envelope.response.num_found,
        })
    }

    /// Registers the indexing hook on `bucket`.
    ///
    /// # Errors
    /// `UnexpectedStatus` carrying the observed code for anything but 204.
    pub fn make_searchable(&self, bucket: &str) -> ClientResult<()> {
        if bucket.is_empty() {
            return Err(ClientError::InvalidName("bucket name is empty".to_string()));
        }
        let url = base_url(&self.addr, &["riak", bucket])?;
        debug!(%url, "registering search hook");

        let response = self
            .http
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .body(PRECOMMIT_PROPS)
            .send()?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(()),
            status => Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
            }),
        }
    }
}

fn base_url(addr: &str, segments: &[&str]) -> ClientResult<Url> {
    let invalid = || ClientError::InvalidAddress(addr.to_string());
    let mut url = Url::parse(&format!("http://{addr}/")).map_err(|_| invalid())?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
