//! HTTP module containing the raw HTTP/1.1 client.
//!
//! No HTTP library is involved: requests are framed by hand, response heads
//! are parsed off the socket and bodies are decoded incrementally.
//!
//! - [`request`] - request targets and request framing
//! - [`headers`] - header mappings and response head parsing
//! - [`body`] - transfer framing and gzip/deflate decoding
//! - [`client`] - connection handling, prefetch and fetch
//!
//! # Examples
//!
//! ## Parsing a Header Block
//!
//! ```rust
//! use splitlink::http::Headers;
//!
//! let headers = Headers::parse("Content-Length: 101\r\nAccept-Ranges: bytes\r\n");
//! assert_eq!(headers.get("Content-Length"), Some("101"));
//! // Lookups are case-sensitive.
//! assert_eq!(headers.get("content-length"), None);
//! ```

pub mod body;
pub mod client;
pub mod headers;
pub mod request;

pub use body::ContentEncoding;
pub use client::{create_http_client, FetchOutcome, HttpClient, HttpClientConfig};
pub use headers::{Headers, ResponseHead};
pub use request::Method;
