#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bkv_client::{BackendConnection, ClientError, ClientResult, Connector, Database, DatabaseConfig};
use tiny_http::{Header, Response, Server};
use url::form_urlencoded;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBackend {
    pub objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    pub created: AtomicUsize,
    pub dials: AtomicUsize,
    pub fetches: AtomicUsize,
    pub fail_fetch: AtomicBool,
    /// Number of upcoming fetches answered as if the key already held data.
    pub taken_probes: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    pub backend: Arc<MemoryBackend>,
}

pub struct MemoryConnection {
    pub id: usize,
    backend: Arc<MemoryBackend>,
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    fn connect(&self) -> ClientResult<MemoryConnection> {
        let id = self.backend.created.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            id,
            backend: Arc::clone(&self.backend),
        })
    }
}

impl BackendConnection for MemoryConnection {
    fn dial(&mut self) -> ClientResult<()> {
        self.backend.dials.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn ping(&mut self) -> ClientResult<()> {
        Ok(())
    }

    fn fetch_object(&mut self, bucket: &str, key: &str) -> ClientResult<Vec<u8>> {
        self.backend.fetches.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_fetch.load(Ordering::SeqCst) {
            return Err(ClientError::Server("ERR backend unavailable".to_string()));
        }
        let taken = self
            .backend
            .taken_probes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if taken {
            return Ok(b"{}".to_vec());
        }
        let objects = self.backend.objects.lock().unwrap();
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| ClientError::NotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    fn store_object(&mut self, bucket: &str, key: &str, value: &[u8]) -> ClientResult<()> {
        let mut objects = self.backend.objects.lock().unwrap();
        objects.insert((bucket.to_string(), key.to_string()), value.to_vec());
        Ok(())
    }

    fn delete_object(&mut self, bucket: &str, key: &str) -> ClientResult<()> {
        let mut objects = self.backend.objects.lock().unwrap();
        objects.remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

pub fn memory_database(search_addr: &str) -> (Database<MemoryConnector>, Arc<MemoryBackend>) {
    init_tracing();
    let connector = MemoryConnector::default();
    let backend = Arc::clone(&connector.backend);
    let config = DatabaseConfig {
        search_addr: search_addr.to_string(),
        pool_capacity: 4,
        acquire_timeout: Duration::from_millis(200),
        ..DatabaseConfig::default()
    };
    let db = Database::with_connector(config, connector).expect("database");
    (db, backend)
}

// ---------------------------------------------------------------------------
// Fake RESP backend server
// ---------------------------------------------------------------------------

/// Serves RESP commands against an in-process map until the listener is dropped.
///
/// Each dial opens a new TCP connection, so the server accepts in a loop.
pub fn spawn_resp_server() -> (String, Arc<Mutex<Vec<Vec<Vec<u8>>>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let log = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::new(Mutex::new(HashMap::<Vec<u8>, Vec<u8>>::new()));

    let server_log = Arc::clone(&log);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(_) => break,
            };
            let log = Arc::clone(&server_log);
            let store = Arc::clone(&store);
            thread::spawn(move || serve_resp(stream, log, store));
        }
    });

    (addr, log)
}

fn serve_resp(
    stream: TcpStream,
    log: Arc<Mutex<Vec<Vec<Vec<u8>>>>>,
    store: Arc<Mutex<HashMap<Vec<u8>, Vec<u8>>>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let mut writer = stream.try_clone().expect("clone");
    let mut reader = BufReader::new(stream);
    while let Ok(Some(args)) = read_command(&mut reader) {
        log.lock().unwrap().push(args.clone());
        let reply: Vec<u8> = match args[0].as_slice() {
            b"PING" => b"+PONG\r\n".to_vec(),
            b"GET" => match store.lock().unwrap().get(&args[1]) {
                Some(value) => bulk(value),
                None => b"$-1\r\n".to_vec(),
            },
            b"SET" => {
                store.lock().unwrap().insert(args[1].clone(), args[2].clone());
                b"+OK\r\n".to_vec()
            }
            b"DEL" => {
                let removed = store.lock().unwrap().remove(&args[1]).is_some();
                format!(":{}\r\n", removed as i64).into_bytes()
            }
            _ => b"-ERR unknown command\r\n".to_vec(),
        };
        if writer.write_all(&reply).is_err() {
            break;
        }
    }
}

fn bulk(data: &[u8]) -> Vec<u8> {
    let mut out = format!("${}\r\n", data.len()).into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
    out
}

fn read_command(reader: &mut BufReader<TcpStream>) -> std::io::Result<Option<Vec<Vec<u8>>>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let count: usize = line
        .trim_end()
        .strip_prefix('*')
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "expected array"))?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line)?;
        let len: usize = line
            .trim_end()
            .strip_prefix('$')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "expected bulk"))?;
        let mut data = vec![0u8; len + 2];
        reader.read_exact(&mut data)?;
        data.truncate(len);
        args.push(data);
    }
    Ok(Some(args))
}

// ---------------------------------------------------------------------------
// Fake HTTP search server
// ---------------------------------------------------------------------------

/// A request as seen by the fake HTTP server.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub type HttpHandler = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

/// Starts an HTTP server answering every request with `handler`.
pub fn spawn_http_server(handler: HttpHandler) -> (String, Arc<Mutex<Vec<RecordedRequest>>>) {
    let server = Server::http("127.0.0.1:0").expect("bind");
    let addr = server.server_addr().to_ip().expect("ip addr").to_string();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = Arc::clone(&requests);
    thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut body = Vec::new();
            if request.as_reader().read_to_end(&mut body).is_err() {
                continue;
            }
            let recorded = RecordedRequest {
                method: request.method().to_string(),
                target: request.url().to_string(),
                headers: request
                    .headers()
                    .iter()
                    .map(|header| (header.field.to_string(), header.value.to_string()))
                    .collect(),
                body,
            };
            seen.lock().unwrap().push(recorded.clone());

            let (status, body) = handler(&recorded);
            let content_type =
                Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).expect("header");
            let response = Response::from_string(body)
                .with_status_code(status)
                .with_header(content_type);
            let _ = request.respond(response);
        }
    });

    (addr, requests)
}

/// Returns the decoded value of query parameter `name` in `target`.
pub fn query_param(target: &str, name: &str) -> Option<String> {
    let (_, query) = target.split_once('?')?;
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
