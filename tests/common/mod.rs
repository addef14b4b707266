//! In-process stand-in for the ClickHouse HTTP interface
//!
//! Serves `GET /ping` and `POST /` over plain HTTP/1.1 (one request per
//! connection). Queries are routed on the SQL text: the two scan tables are
//! filtered by `param_p1`/`param_p2` the way the real tables would be.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Canned misbehaviour for the next queries
#[derive(Debug, Clone)]
pub enum Fault {
    /// Reply with this HTTP status and exception
    Status { status: u16, code: u32, message: String },
    /// Reply 200 with this literal body
    RawBody(String),
    /// Normal rows, then an exception line
    ExceptionAfterRows(String),
    /// Normal rows, then close the socket before `Content-Length` is reached
    Truncate,
    /// Normal rows, then keep the socket open without sending more
    Stall,
}

/// One request as the server saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    address: String,
    slot_key: String,
    block: u64,
    deleted: bool,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<(String, u64)>,
    slots: Vec<Slot>,
    ping_fails: bool,
    fault: Option<Fault>,
    requests: Vec<RecordedRequest>,
}

/// Mock server handle; the server stops when this is dropped
pub struct MockClickHouse {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    accept: JoinHandle<()>,
}

impl Drop for MockClickHouse {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

impl MockClickHouse {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock");
        let addr = listener.local_addr().expect("local addr");
        let state = Arc::new(Mutex::new(State::default()));

        let shared = Arc::clone(&state);
        let accept = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(socket, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            accept,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// DSN in the custom-scheme form
    pub fn dsn(&self) -> String {
        format!("clickhouse+http://default:secret@{}/default", self.addr)
    }

    pub fn add_account(&self, address: &str, block: u64) {
        self.lock().accounts.push((address.to_string(), block));
    }

    pub fn add_slot(&self, address: &str, slot_key: &str, block: u64, deleted: bool) {
        self.lock().slots.push(Slot {
            address: address.to_string(),
            slot_key: slot_key.to_string(),
            block,
            deleted,
        });
    }

    pub fn fail_ping(&self) {
        self.lock().ping_fails = true;
    }

    pub fn set_fault(&self, fault: Fault) {
        self.lock().fault = Some(fault);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn queries(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "POST")
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("mock state")
    }
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<State>>) -> std::io::Result<()> {
    let request = match read_request(&mut socket).await? {
        Some(request) => request,
        None => return Ok(()),
    };

    let (ping_fails, fault, rows) = {
        let mut state = state.lock().expect("mock state");
        state.requests.push(request.clone());
        let rows = if request.method == "POST" {
            rows_for(&state, &request)
        } else {
            String::new()
        };
        (state.ping_fails, state.fault.clone(), rows)
    };

    if request.method == "GET" && request.path == "/ping" {
        return if ping_fails {
            write_response(&mut socket, 503, &[], "Service Unavailable\n").await
        } else {
            write_response(&mut socket, 200, &[], "Ok.\n").await
        };
    }

    match fault {
        None => write_response(&mut socket, 200, &[], &rows).await,
        Some(Fault::Status {
            status,
            code,
            message,
        }) => {
            let code = code.to_string();
            write_response(
                &mut socket,
                status,
                &[("X-ClickHouse-Exception-Code", code.as_str())],
                &format!("{}\n", message),
            )
            .await
        }
        Some(Fault::RawBody(body)) => write_response(&mut socket, 200, &[], &body).await,
        Some(Fault::ExceptionAfterRows(message)) => {
            write_response(&mut socket, 200, &[], &format!("{}{}\n", rows, message)).await
        }
        Some(Fault::Truncate) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                rows.len() + 64
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(rows.as_bytes()).await?;
            socket.flush().await?;
            socket.shutdown().await
        }
        Some(Fault::Stall) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                rows.len() + 64
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(rows.as_bytes()).await?;
            socket.flush().await?;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }
}

fn rows_for(state: &State, request: &RecordedRequest) -> String {
    let sql = request.body.as_str();
    let bound = |name: &str| -> u64 {
        request
            .param(name)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    };

    if sql.contains("max(last_access_block)") {
        let max = state.accounts.iter().map(|(_, block)| *block).max();
        return match max {
            Some(max) => format!("[\"{}\"]\n", max),
            None if request.param("aggregate_functions_null_for_empty") == Some("1") => {
                "[null]\n".to_string()
            }
            None => "[\"0\"]\n".to_string(),
        };
    }

    let (start, end) = (bound("param_p1"), bound("param_p2"));

    if sql.contains("storage_last_access") {
        let live_only = sql.contains("is_deleted = false");
        return state
            .slots
            .iter()
            .filter(|s| start <= s.block && s.block < end)
            .filter(|s| !(live_only && s.deleted))
            .map(|s| format!("[{:?},{:?}]\n", s.address, s.slot_key))
            .collect();
    }

    if sql.contains("accounts_last_access") {
        return state
            .accounts
            .iter()
            .filter(|(_, block)| start <= *block && *block < end)
            .map(|(address, _)| format!("[{:?}]\n", address))
            .collect();
    }

    "[1]\n".to_string()
}

async fn read_request(socket: &mut TcpStream) -> std::io::Result<Option<RecordedRequest>> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split(' ');
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or("/").to_string();

    let mut headers = HashMap::new();
    for line in lines.filter(|l| !l.is_empty()) {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let content_length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = (header_end + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path.to_string(), parse_query(query)),
        None => (target.clone(), Vec::new()),
    };

    Ok(Some(RecordedRequest {
        method,
        path,
        query,
        headers,
        body,
    }))
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode(k), decode(v)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Form-decode a query component: `+` is a space, then percent escapes
fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

async fn write_response(
    socket: &mut TcpStream,
    status: u16,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> std::io::Result<()> {
    let reason = match status {
        200 => "OK",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Error",
    };
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=UTF-8\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        reason,
        body.len()
    );
    for (name, value) in extra_headers {
        head.push_str(&format!("{}: {}\r\n", name, value));
    }
    head.push_str("\r\n");

    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body.as_bytes()).await?;
    socket.flush().await?;
    socket.shutdown().await
}
