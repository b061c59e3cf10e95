//! A loopback HTTP/1.1 server scripted per test.
//!
//! Every connection serves one request and is closed. Requests carrying a
//! `Range` header are segment fetches; requests without one are prefetches.
//! Content and transfer codings are only applied when the request sends
//! `Accept-Encoding`, so a plain prefetch always sees the identity length.

use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use splitlink::http::Headers;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// How the server answers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The resource.
    pub body: Vec<u8>,
    /// `Accept-Ranges` value; `None` leaves the header out.
    pub accept_ranges: Option<String>,
    /// Leave `Content-Length` out.
    pub omit_length: bool,
    /// Send this `Content-Length` value verbatim instead of the real one.
    pub length_override: Option<String>,
    /// `gzip`, `deflate` (zlib-wrapped) or any other label sent unencoded.
    /// Only used when the request sends `Accept-Encoding`.
    pub encoding: Option<&'static str>,
    /// Use chunked transfer coding for bodies of requests that send
    /// `Accept-Encoding`.
    pub chunked: bool,
    /// Answer ranged requests with the whole resource and `200`.
    pub ignore_range: bool,
    /// Write the head in two pieces with a pause in between.
    pub split_head: bool,
    /// Answer everything with this status and an empty body.
    pub status: Option<(u16, &'static str)>,
    /// Cut off this many ranged responses halfway through the body.
    pub truncate_first: usize,
    /// Ranged responses starting at or beyond this offset send their head
    /// and then hang.
    pub stall_from: Option<u64>,
    /// Delay before answering ranged requests.
    pub delay: Option<Duration>,
}

impl ServerConfig {
    pub fn serving(body: Vec<u8>) -> Self {
        Self {
            body,
            accept_ranges: Some("bytes".into()),
            omit_length: false,
            length_override: None,
            encoding: None,
            chunked: false,
            ignore_range: false,
            split_head: false,
            status: None,
            truncate_first: 0,
            stall_from: None,
            delay: None,
        }
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Headers,
    pub peer: SocketAddr,
}

impl RecordedRequest {
    pub fn range(&self) -> Option<(u64, u64)> {
        parse_range(self.headers.get("Range")?)
    }
}

struct State {
    config: ServerConfig,
    log: Mutex<Vec<RecordedRequest>>,
    truncated: AtomicUsize,
}

pub struct MockServer {
    address: SocketAddr,
    state: Arc<State>,
    task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let address = listener.local_addr().expect("Mock server has no address");
        let state = Arc::new(State {
            config,
            log: Mutex::new(Vec::new()),
            truncated: AtomicUsize::new(0),
        });

        let accept_state = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let state = accept_state.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, peer, state).await;
                });
            }
        });

        Self {
            address,
            state,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.log.lock().unwrap().clone()
    }

    /// Requests that carried a `Range` header.
    pub fn ranged_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.headers.contains("Range"))
            .collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, peer: SocketAddr, state: Arc<State>) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        if let Some(end) = find(&buffer, b"\r\n\r\n") {
            break end;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
    };

    let text = String::from_utf8_lossy(&buffer[..head_end]).into_owned();
    let request_line = text.lines().next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let headers = Headers::parse(&text);
    let request = RecordedRequest {
        method,
        target,
        headers,
        peer,
    };
    state.log.lock().unwrap().push(request.clone());

    let config = &state.config;
    if let Some((code, reason)) = config.status {
        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            code, reason
        );
        stream.write_all(head.as_bytes()).await?;
        return stream.shutdown().await;
    }

    let total = config.body.len() as u64;
    let requested = request.range().filter(|_| !config.ignore_range);
    let ranged = request.headers.contains("Range");

    if ranged {
        if let Some(delay) = config.delay {
            tokio::time::sleep(delay).await;
        }
    }

    let (status, content) = match requested {
        Some((start, end)) => {
            let end = end.min(total.saturating_sub(1));
            (
                format!("206 Partial Content\r\nContent-Range: bytes {}-{}/{}", start, end, total),
                &config.body[start as usize..=end as usize],
            )
        }
        None => ("200 OK".to_string(), &config.body[..]),
    };

    let negotiated = request.headers.contains("Accept-Encoding");
    let encoding = config.encoding.filter(|_| negotiated);
    let chunked = config.chunked && negotiated;

    let payload = match encoding {
        Some("gzip") => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            encoder.finish()?
        }
        Some("deflate") => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            encoder.finish()?
        }
        _ => content.to_vec(),
    };

    let mut head = format!("HTTP/1.1 {}\r\nConnection: close\r\n", status);
    if let Some(accept_ranges) = &config.accept_ranges {
        head.push_str(&format!("Accept-Ranges: {}\r\n", accept_ranges));
    }
    if let Some(encoding) = encoding {
        head.push_str(&format!("Content-Encoding: {}\r\n", encoding));
    }
    if chunked {
        head.push_str("Transfer-Encoding: chunked\r\n");
    } else if let Some(length) = &config.length_override {
        head.push_str(&format!("Content-Length: {}\r\n", length));
    } else if !config.omit_length {
        head.push_str(&format!("Content-Length: {}\r\n", payload.len()));
    }
    head.push_str("\r\n");

    if request.method == "HEAD" {
        stream.write_all(head.as_bytes()).await?;
        return stream.shutdown().await;
    }

    if ranged && requested.is_some_and(|(start, _)| config.stall_from.is_some_and(|from| start >= from)) {
        stream.write_all(head.as_bytes()).await?;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return Ok(());
    }

    let mut body = if chunked {
        let mut framed = Vec::new();
        for piece in payload.chunks(7) {
            framed.extend_from_slice(format!("{:x}\r\n", piece.len()).as_bytes());
            framed.extend_from_slice(piece);
            framed.extend_from_slice(b"\r\n");
        }
        framed.extend_from_slice(b"0\r\n\r\n");
        framed
    } else {
        payload
    };

    if ranged && state.truncated.fetch_add(1, Ordering::SeqCst) < config.truncate_first {
        body.truncate(body.len() / 2);
    }

    if config.split_head {
        let (first, second) = head.as_bytes().split_at(head.len() / 2);
        stream.write_all(first).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(second).await?;
        stream.write_all(&body).await?;
    } else {
        // Head and body in one write, so body bytes share a read with the
        // blank line.
        let mut response = head.into_bytes();
        response.extend_from_slice(&body);
        stream.write_all(&response).await?;
    }
    stream.shutdown().await
}

fn parse_range(value: &str) -> Option<(u64, u64)> {
    let (start, end) = value.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
