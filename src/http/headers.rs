//! Header mappings and response head parsing.
//!
//! The response head is read byte by byte off the socket until the blank
//! line (`\r\n\r\n`) that ends it. Body bytes that arrive in the same read
//! as the terminator are handed back to the caller so they can be forwarded
//! to the sink.

use crate::error::{Error, Result};
use crate::http::body::ContentEncoding;
use crate::utils::content_length::{accepts_byte_ranges, content_length};

use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Sequence that terminates a response head.
pub const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Response heads larger than this are rejected.
pub const MAX_HEAD_LEN: usize = 64 * 1024;

/// An ordered header mapping.
///
/// Keys are compared case-sensitively. Inserting a key that is already
/// present replaces its value in place, so later duplicates overwrite earlier
/// ones while the original order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a header block.
    ///
    /// The text is split into lines on `\n`. For each line containing a
    /// colon, the text before the first colon is the key and the trimmed
    /// remainder is the value. Lines without a colon (such as the status
    /// line) are ignored.
    pub fn parse(text: &str) -> Self {
        let mut headers = Headers::new();
        for line in text.split('\n') {
            if let Some((key, value)) = line.split_once(':') {
                headers.insert(key, value.trim());
            }
        }
        headers
    }

    /// Inserts a header, returning the value it replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Looks up a header by its exact key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the mapping holds `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Copies every header of `other` into this mapping.
    pub fn extend(&mut self, other: &Headers) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
    }

    /// Number of headers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serializes the mapping as `Key: Value\r\n` lines.
    pub fn to_block(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{}: {}\r\n", key, value))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (key, value) in iter {
            headers.insert(key, value);
        }
        headers
    }
}

/// Status line and headers of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Protocol version from the status line, e.g. `HTTP/1.1`.
    pub version: String,
    /// Numeric status code.
    pub status: u16,
    /// Reason phrase, possibly empty.
    pub reason: String,
    /// Parsed header mapping.
    pub headers: Headers,
}

impl ResponseHead {
    /// Parses a full response head (status line plus header block).
    pub fn parse(text: &str) -> Result<Self> {
        let (status_line, rest) = text.split_once('\n').unwrap_or((text, ""));
        let status_line = status_line.trim_end_matches('\r');

        let mut parts = status_line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default();
        if !version.starts_with("HTTP/") {
            return Err(Error::Protocol(format!(
                "malformed status line `{}`",
                status_line
            )));
        }
        let status = parts
            .next()
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| Error::Protocol(format!("malformed status line `{}`", status_line)))?;
        let reason = parts.next().unwrap_or_default().trim().to_string();

        Ok(Self {
            version: version.to_string(),
            status,
            reason,
            headers: Headers::parse(rest),
        })
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Fails with [`Error::Status`] unless the status is 2xx.
    pub fn ensure_success(&self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                code: self.status,
                reason: self.reason.clone(),
            })
        }
    }

    /// The `Content-Length` header, if present and non-negative.
    pub fn content_length(&self) -> Option<u64> {
        content_length(&self.headers)
    }

    /// Whether `Accept-Ranges` advertises byte ranges; `None` when absent.
    pub fn accepts_ranges(&self) -> Option<bool> {
        accepts_byte_ranges(&self.headers)
    }

    /// The body's content coding.
    pub fn content_encoding(&self) -> Result<ContentEncoding> {
        ContentEncoding::from_header(self.headers.get("Content-Encoding"))
    }

    /// Returns `true` if the body uses chunked transfer coding.
    pub fn is_chunked(&self) -> bool {
        self.headers
            .get("Transfer-Encoding")
            .is_some_and(|value| value.to_ascii_lowercase().contains("chunked"))
    }
}

impl fmt::Display for ResponseHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.version, self.status, self.reason)
    }
}

/// Finds the end of the response head in `bytes`, returning the index just
/// past the terminator.
pub fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(HEAD_TERMINATOR.len())
        .position(|window| window == HEAD_TERMINATOR)
        .map(|position| position + HEAD_TERMINATOR.len())
}

/// Reads a response head from `reader`.
///
/// Reads of up to `buffer_size` bytes are accumulated until the terminator
/// shows up, even when it straddles two reads. Returns the parsed head and
/// the body bytes that were read past it.
pub async fn read_head<R>(reader: &mut R, buffer_size: usize) -> Result<(ResponseHead, Vec<u8>)>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut head = Vec::with_capacity(buffer.len());
    let mut scanned: usize = 0;

    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            return Err(Error::Protocol(format!(
                "connection closed after {} bytes, before the end of the response head",
                head.len()
            )));
        }
        head.extend_from_slice(&buffer[..n]);

        let from = scanned.saturating_sub(HEAD_TERMINATOR.len() - 1);
        if let Some(end) = find_head_end(&head[from..]) {
            let body = head.split_off(from + end);
            let text = String::from_utf8_lossy(&head);
            return Ok((ResponseHead::parse(&text)?, body));
        }

        scanned = head.len();
        if scanned > MAX_HEAD_LEN {
            return Err(Error::Protocol(format!(
                "response head exceeds {} bytes",
                MAX_HEAD_LEN
            )));
        }
    }
}
