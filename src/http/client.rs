//! Raw HTTP/1.1 client.
//!
//! Every call opens a fresh TCP connection, optionally bound to a local
//! address first so that the request leaves through a chosen interface,
//! writes one request and reads one response. The connection is dropped,
//! and therefore closed, when the call returns, whatever the outcome.
//!
//! # Examples
//!
//! ```rust,no_run
//! use splitlink::http::{create_http_client, Headers, HttpClientConfig};
//! use url::Url;
//!
//! # async fn example() -> splitlink::Result<()> {
//! let config = HttpClientConfig {
//!     bind_address: Some("192.168.1.20".parse().unwrap()),
//!     ..HttpClientConfig::default()
//! };
//! let client = create_http_client(config);
//!
//! let url = Url::parse("http://example.com/big.iso").unwrap();
//! let head = client.prefetch(&url, &Headers::new()).await?;
//! println!("{} bytes", head.content_length().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::http::body::{BodyDecoder, Framing};
use crate::http::headers::{read_head, Headers, ResponseHead};
use crate::http::request::{frame_request, Method, Target};
use crate::progress::ProgressTracker;
use crate::throttle::ThrottledReader;

use std::future::Future;
use std::io::{self, Cursor};
use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU64;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tracing::{debug, trace};
use url::{Host, Url};

/// Default size of socket reads.
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Configuration for HTTP client setup.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Local address outbound sockets are bound to before connecting.
    pub bind_address: Option<IpAddr>,
    /// Size of a single socket read, also the largest throttle burst.
    pub buffer_size: usize,
    /// Limit on establishing the connection.
    pub connect_timeout: Duration,
    /// Limit on a single read staying idle.
    pub read_timeout: Duration,
    /// Default headers to include with all requests.
    pub headers: Option<Headers>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            bind_address: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            headers: None,
        }
    }
}

/// Creates an HTTP client from its configuration.
pub fn create_http_client(config: HttpClientConfig) -> HttpClient {
    HttpClient { config }
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Response head.
    pub head: ResponseHead,
    /// Body bytes read off the wire, before decoding.
    pub wire_bytes: u64,
    /// Decoded bytes written to the sink.
    pub body_bytes: u64,
}

/// A connection-per-request HTTP/1.1 client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Requests `url` and returns the response head without reading the
    /// body. Uses `GET`.
    pub async fn prefetch(&self, url: &Url, headers: &Headers) -> Result<ResponseHead> {
        self.prefetch_with(url, headers, Method::Get).await
    }

    /// Requests `url` with `method` and returns the response head.
    ///
    /// Fails with [`Error::Protocol`] if the connection ends before the
    /// head is complete.
    ///
    /// [`Error::Protocol`]: crate::Error::Protocol
    pub async fn prefetch_with(
        &self,
        url: &Url,
        headers: &Headers,
        method: Method,
    ) -> Result<ResponseHead> {
        let target = Target::from_url(url)?;
        let mut stream = self.open(&target, method, headers, false).await?;
        let (head, _) = self.read_response_head(&mut stream).await?;
        debug!("Prefetch of {} answered {}", url, head);
        Ok(head)
    }

    /// Downloads `url` into `sink`.
    ///
    /// See [`fetch_with`](Self::fetch_with); this variant accepts any
    /// successful response.
    pub async fn fetch<W>(
        &self,
        url: &Url,
        headers: &Headers,
        sink: W,
        throttle: Option<NonZeroU64>,
        tracker: Option<&ProgressTracker>,
    ) -> Result<FetchOutcome>
    where
        W: AsyncWrite + Unpin,
    {
        self.fetch_with(url, headers, sink, throttle, tracker, |_| Ok(()))
            .await
    }

    /// Downloads `url` into `sink`, decoding the body on the way.
    ///
    /// The response is checked before a single body byte reaches the sink:
    /// a non-2xx status fails with [`Error::Status`], a content coding other
    /// than identity, gzip or deflate fails with
    /// [`Error::UnsupportedEncoding`], and `validate` may reject the head
    /// too. Body bytes that arrived together with the head are forwarded.
    /// Reads go through a [`ThrottledReader`] capped at `throttle`, and
    /// `tracker` receives progress counted from what it already holds.
    ///
    /// The sink is flushed on success and dropped on every path.
    ///
    /// [`Error::Status`]: crate::Error::Status
    /// [`Error::UnsupportedEncoding`]: crate::Error::UnsupportedEncoding
    pub async fn fetch_with<W, V>(
        &self,
        url: &Url,
        headers: &Headers,
        mut sink: W,
        throttle: Option<NonZeroU64>,
        tracker: Option<&ProgressTracker>,
        validate: V,
    ) -> Result<FetchOutcome>
    where
        W: AsyncWrite + Unpin,
        V: FnOnce(&ResponseHead) -> Result<()>,
    {
        let target = Target::from_url(url)?;
        let mut stream = self.open(&target, Method::Get, headers, true).await?;
        let (head, leftover) = self.read_response_head(&mut stream).await?;
        debug!("Fetch of {} answered {}", url, head);

        head.ensure_success()?;
        let encoding = head.content_encoding()?;
        validate(&head)?;

        let framing = Framing::for_response(Method::Get, &head);
        trace!("Body framing {:?}, encoding {:?}", framing, encoding);
        let mut body = BodyDecoder::new(framing, encoding);
        let buffer_size = self.config.buffer_size.max(1);
        let mut reader =
            ThrottledReader::new(Cursor::new(leftover).chain(stream), throttle, buffer_size);

        let base = tracker.map(|t| t.transferred()).unwrap_or_default();
        let mut buffer = vec![0u8; buffer_size];
        let mut decoded = Vec::with_capacity(buffer_size);
        let mut wire_bytes = 0u64;
        let mut body_bytes = 0u64;

        while !body.is_complete() {
            let limit = body.max_read(buffer.len());
            let n = self.with_read_timeout(reader.read(&mut buffer[..limit])).await?;
            if n == 0 {
                break;
            }
            wire_bytes += n as u64;
            decoded.clear();
            body.feed(&buffer[..n], &mut decoded)?;
            self.forward(&mut sink, &decoded, &mut body_bytes, base, tracker)
                .await?;
        }

        decoded.clear();
        body.finish_at_eof(&mut decoded)?;
        self.forward(&mut sink, &decoded, &mut body_bytes, base, tracker)
            .await?;
        sink.flush().await?;

        debug!(
            "Fetched {} body bytes ({} on the wire) from {}",
            body_bytes, wire_bytes, url
        );
        Ok(FetchOutcome {
            head,
            wire_bytes,
            body_bytes,
        })
    }

    async fn forward<W>(
        &self,
        sink: &mut W,
        decoded: &[u8],
        body_bytes: &mut u64,
        base: u64,
        tracker: Option<&ProgressTracker>,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if decoded.is_empty() {
            return Ok(());
        }
        sink.write_all(decoded).await?;
        *body_bytes += decoded.len() as u64;
        if let Some(tracker) = tracker {
            tracker.on_transfer_progress(decoded.len() as u64, base + *body_bytes);
        }
        Ok(())
    }

    /// Connects and writes the request.
    async fn open(
        &self,
        target: &Target,
        method: Method,
        headers: &Headers,
        accept_encoding: bool,
    ) -> Result<TcpStream> {
        let mut all = self.config.headers.clone().unwrap_or_default();
        all.extend(headers);
        let request = frame_request(method, target, &all, accept_encoding);

        let mut stream = self.connect(target).await?;
        trace!("Sending request:\n{}", request);
        stream.write_all(request.as_bytes()).await?;
        Ok(stream)
    }

    async fn read_response_head<R>(&self, stream: &mut R) -> Result<(ResponseHead, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        match tokio::time::timeout(
            self.config.read_timeout,
            read_head(stream, self.config.buffer_size),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(timed_out("reading the response head").into()),
        }
    }

    async fn with_read_timeout<F>(&self, read: F) -> Result<usize>
    where
        F: Future<Output = io::Result<usize>>,
    {
        match tokio::time::timeout(self.config.read_timeout, read).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(timed_out("reading the response body").into()),
        }
    }

    async fn connect(&self, target: &Target) -> Result<TcpStream> {
        let addresses: Vec<SocketAddr> = match &target.host {
            Host::Ipv4(ip) => vec![SocketAddr::new(IpAddr::V4(*ip), target.port)],
            Host::Ipv6(ip) => vec![SocketAddr::new(IpAddr::V6(*ip), target.port)],
            Host::Domain(name) => lookup_host((name.as_str(), target.port)).await?.collect(),
        };

        // A socket bound to an IPv4 address cannot reach an IPv6 peer.
        let bind = self.config.bind_address;
        let candidates = addresses
            .into_iter()
            .filter(|address| bind.is_none_or(|local| local.is_ipv4() == address.is_ipv4()));

        let mut last_error = None;
        for address in candidates {
            debug!("Connecting to {} (bound to {:?})", address, bind);
            match tokio::time::timeout(self.config.connect_timeout, self.connect_to(address))
                .await
            {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => last_error = Some(e),
                Err(_) => last_error = Some(timed_out("connecting")),
            }
        }

        Err(last_error
            .unwrap_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no usable address for {}", target.host_header()),
                )
            })
            .into())
    }

    async fn connect_to(&self, address: SocketAddr) -> io::Result<TcpStream> {
        let socket = match address {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        if let Some(local) = self.config.bind_address {
            socket.bind(SocketAddr::new(local, 0))?;
        }
        let stream = socket.connect(address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

fn timed_out(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, format!("timed out {}", what))
}
