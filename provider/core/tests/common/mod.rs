//! Scripted HTTP server for integration tests
//!
//! Speaks just enough HTTP/1.1 for reqwest: one request per connection,
//! `Connection: close` on every reply. Routes are matched on method + path
//! and answer with a queue of scripted replies; the last reply repeats.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use provider_core::{ProviderConfig, ProviderKind, RetryPolicy};

/// How a chunked body ends
#[derive(Clone, Debug)]
pub enum BodyEnd {
    /// Terminating zero-length chunk
    Complete,
    /// Keep the connection open without sending anything else
    Stall,
    /// Close the socket mid-body
    Abort,
}

/// One scripted reply
#[derive(Clone, Debug)]
pub enum Reply {
    /// Complete response with a JSON body
    Json { status: u16, body: String },
    /// Chunked response, one write per chunk
    Chunked {
        content_type: &'static str,
        chunks: Vec<Vec<u8>>,
        delay: Duration,
        end: BodyEnd,
    },
    /// Error status whose `Content-Length` promises more than `partial`
    /// delivers; the rest never arrives
    StalledError {
        status: u16,
        declared_len: usize,
        partial: String,
    },
    /// Read the request, then never answer
    Hang,
    /// Read the request, then close the socket without answering
    Drop,
}

impl Reply {
    pub fn json(body: serde_json::Value) -> Self {
        Self::Json {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn status(status: u16, body: serde_json::Value) -> Self {
        Self::Json {
            status,
            body: body.to_string(),
        }
    }

    /// NDJSON body, one chunk per line
    pub fn ndjson(lines: &[serde_json::Value]) -> Self {
        Self::Chunked {
            content_type: "application/x-ndjson",
            chunks: lines.iter().map(|l| format!("{l}\n").into_bytes()).collect(),
            delay: Duration::ZERO,
            end: BodyEnd::Complete,
        }
    }

    /// Event-stream body from raw `data:` payloads, one chunk per event
    pub fn events(payloads: &[&str]) -> Self {
        Self::Chunked {
            content_type: "text/event-stream",
            chunks: payloads
                .iter()
                .map(|p| format!("data: {p}\n\n").into_bytes())
                .collect(),
            delay: Duration::ZERO,
            end: BodyEnd::Complete,
        }
    }

    /// Raw chunks, written exactly as given
    pub fn raw(content_type: &'static str, chunks: &[&str]) -> Self {
        Self::Chunked {
            content_type,
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
            delay: Duration::ZERO,
            end: BodyEnd::Complete,
        }
    }

    /// One body cut into `piece`-byte chunks, ignoring line and UTF-8 boundaries
    pub fn split(content_type: &'static str, body: &[u8], piece: usize) -> Self {
        Self::Chunked {
            content_type,
            chunks: body.chunks(piece).map(<[u8]>::to_vec).collect(),
            delay: Duration::ZERO,
            end: BodyEnd::Complete,
        }
    }

    /// Change how a chunked body ends
    pub fn ending(mut self, new_end: BodyEnd) -> Self {
        if let Self::Chunked { ref mut end, .. } = self {
            *end = new_end;
        }
        self
    }

    /// Pause before every chunk
    pub fn paced(mut self, pause: Duration) -> Self {
        if let Self::Chunked { ref mut delay, .. } = self {
            *delay = pause;
        }
        self
    }
}

/// A request as the server saw it
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl RecordedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Default)]
struct State {
    routes: HashMap<(String, String), Vec<Reply>>,
    requests: Vec<RecordedRequest>,
}

/// Scripted server bound to an ephemeral local port
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    arrived: Arc<Notify>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State::default()));
        let arrived = Arc::new(Notify::new());

        let accept_state = Arc::clone(&state);
        let accept_arrived = Arc::clone(&arrived);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let state = Arc::clone(&accept_state);
                let arrived = Arc::clone(&accept_arrived);
                tokio::spawn(serve(socket, state, arrived));
            }
        });

        Self {
            addr,
            state,
            arrived,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Script a route; replies are served in order, the last one repeats
    pub fn route(&self, method: &str, path: &str, replies: Vec<Reply>) {
        assert!(!replies.is_empty(), "a route needs at least one reply");
        self.state
            .lock()
            .routes
            .insert((method.to_string(), path.to_string()), replies);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let notified = self.arrived.notified();
                if self.state.lock().requests.len() >= count {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("requests did not arrive in time");
    }

    /// Client settings pointing at this server, with fast retries
    pub fn config(&self, kind: ProviderKind) -> ProviderConfig {
        ProviderConfig::for_kind(kind)
            .with_base_url(self.url())
            .with_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(3))
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
    }
}

/// Base URL of a local port nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

async fn serve(mut socket: TcpStream, state: Arc<Mutex<State>>, arrived: Arc<Notify>) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };

    let reply = {
        let mut state = state.lock();
        let key = (request.method.clone(), request.path.clone());
        let reply = match state.routes.get_mut(&key) {
            Some(replies) if replies.len() > 1 => Some(replies.remove(0)),
            Some(replies) => replies.first().cloned(),
            None => None,
        };
        state.requests.push(request);
        reply
    };
    arrived.notify_waiters();

    let reply = reply.unwrap_or_else(|| Reply::status(404, serde_json::json!({"error": "no route"})));
    let _ = write_reply(&mut socket, reply).await;
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let body_end = buffer.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buffer[header_end..body_end]).to_string();

    Some(RecordedRequest { method, path, body })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn write_reply(socket: &mut TcpStream, reply: Reply) -> std::io::Result<()> {
    match reply {
        Reply::Json { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reason(status),
                body.len()
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(body.as_bytes()).await?;
            socket.flush().await?;
        }
        Reply::Chunked {
            content_type,
            chunks,
            delay,
            end,
        } => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await?;
            socket.flush().await?;

            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                socket
                    .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                    .await?;
                socket.write_all(&chunk).await?;
                socket.write_all(b"\r\n").await?;
                socket.flush().await?;
            }

            match end {
                BodyEnd::Complete => {
                    socket.write_all(b"0\r\n\r\n").await?;
                    socket.flush().await?;
                }
                BodyEnd::Stall => std::future::pending::<()>().await,
                BodyEnd::Abort => {
                    socket.shutdown().await?;
                }
            }
        }
        Reply::StalledError {
            status,
            declared_len,
            partial,
        } => {
            let head = format!(
                "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {declared_len}\r\nConnection: close\r\n\r\n",
                reason(status)
            );
            socket.write_all(head.as_bytes()).await?;
            socket.write_all(partial.as_bytes()).await?;
            socket.flush().await?;
            std::future::pending::<()>().await;
        }
        Reply::Hang => std::future::pending::<()>().await,
        Reply::Drop => {}
    }
    Ok(())
}
