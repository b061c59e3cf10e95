//! Request targets and request framing.

use crate::error::{Error, Result};
use crate::http::headers::Headers;

use std::fmt;
use url::{Host, Url};

/// Request method used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// `GET`; the default for both prefetch and fetch.
    #[default]
    Get,
    /// `HEAD`; useful as a prefetch method against servers that honor it.
    Head,
}

impl Method {
    /// Token written in the request line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a request goes: the host to connect to and the request-target to
/// put in the request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host to resolve and connect to.
    pub host: Host<String>,
    /// TCP port, `80` unless the URL names one.
    pub port: u16,
    /// Origin-form request target: path plus query.
    pub path: String,
}

impl Target {
    /// Builds a target from a URL.
    ///
    /// Only `http` URLs with a host are accepted.
    pub fn from_url(url: &Url) -> Result<Self> {
        if url.scheme() != "http" {
            return Err(Error::InvalidUrl(format!(
                "unsupported scheme `{}` in {}",
                url.scheme(),
                url
            )));
        }
        let host = url
            .host()
            .map(|host| host.to_owned())
            .ok_or_else(|| Error::InvalidUrl(format!("missing host in {}", url)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let mut path = url.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self { host, port, path })
    }

    /// Value of the `Host` header. The port is only included when it is not
    /// the default.
    pub fn host_header(&self) -> String {
        let host = match &self.host {
            Host::Ipv6(address) => format!("[{}]", address),
            other => other.to_string(),
        };
        if self.port == 80 {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Serializes a request line and header block.
///
/// `Host`, `Connection: keep-alive` and `Accept: */*` are always sent. When
/// `accept_encoding` is set, `Accept-Encoding: gzip, deflate` is added as
/// well. Caller supplied headers are written last and override the defaults.
pub fn frame_request(
    method: Method,
    target: &Target,
    headers: &Headers,
    accept_encoding: bool,
) -> String {
    let mut block = Headers::new();
    block.insert("Host", target.host_header());
    block.insert("Connection", "keep-alive");
    block.insert("Accept", "*/*");
    if accept_encoding {
        block.insert("Accept-Encoding", "gzip, deflate");
    }
    block.extend(headers);

    format!(
        "{} {} HTTP/1.1\r\n{}\r\n",
        method,
        target.path,
        block.to_block()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(url: &str) -> Target {
        Target::from_url(&Url::parse(url).unwrap()).unwrap()
    }

    #[test]
    fn test_target_from_url() {
        let t = target("http://example.com/files/a.bin?x=1");
        assert_eq!(t.host, Host::Domain("example.com".to_string()));
        assert_eq!(t.port, 80);
        assert_eq!(t.path, "/files/a.bin?x=1");
        assert_eq!(t.host_header(), "example.com");
    }

    #[test]
    fn test_target_non_default_port() {
        let t = target("http://127.0.0.1:8080");
        assert_eq!(t.port, 8080);
        assert_eq!(t.path, "/");
        assert_eq!(t.host_header(), "127.0.0.1:8080");
    }

    #[test]
    fn test_target_rejects_https() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(matches!(Target::from_url(&url), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_frame_fetch_request() {
        let mut headers = Headers::new();
        headers.insert("Range", "bytes=0-49");
        let request = frame_request(Method::Get, &target("http://h:81/f"), &headers, true);

        assert!(request.starts_with("GET /f HTTP/1.1\r\n"));
        assert!(request.contains("Host: h:81\r\n"));
        assert!(request.contains("Connection: keep-alive\r\n"));
        assert!(request.contains("Accept: */*\r\n"));
        assert!(request.contains("Accept-Encoding: gzip, deflate\r\n"));
        assert!(request.contains("Range: bytes=0-49\r\n"));
        assert!(request.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_frame_prefetch_request_omits_encoding() {
        let request = frame_request(Method::Head, &target("http://h/f"), &Headers::new(), false);
        assert!(request.starts_with("HEAD /f HTTP/1.1\r\n"));
        assert!(!request.contains("Accept-Encoding"));
    }

    #[test]
    fn test_caller_headers_override_defaults() {
        let mut headers = Headers::new();
        headers.insert("Accept", "application/octet-stream");
        let request = frame_request(Method::Get, &target("http://h/f"), &headers, false);
        assert!(request.contains("Accept: application/octet-stream\r\n"));
        assert!(!request.contains("Accept: */*"));
    }
}
