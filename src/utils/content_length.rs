//! Content length and range header utilities.
//!
//! These helpers read the `Content-Length`, `Content-Range` and
//! `Accept-Ranges` headers of a parsed response head.

use crate::http::headers::Headers;

/// Extract the content length from the `Content-Length` header.
///
/// Returns `None` when the header is missing, is not an integer, or is
/// negative.
///
/// # Example
///
/// ```rust
/// use splitlink::http::Headers;
/// use splitlink::utils::content_length;
///
/// let headers = Headers::parse("Content-Length: 2048\r\n");
/// assert_eq!(content_length(&headers), Some(2048));
///
/// let headers = Headers::parse("Content-Length: -1\r\n");
/// assert_eq!(content_length(&headers), None);
/// ```
pub fn content_length(headers: &Headers) -> Option<u64> {
    let value = headers.get("Content-Length")?.trim().parse::<i64>().ok()?;
    u64::try_from(value).ok()
}

/// Parse a `Content-Range` header value into `(start, end, total)`.
///
/// Content-Range header format: `bytes start-end/total`. The total may be
/// `*` when the server does not know it, in which case it is returned as
/// `None`.
///
/// # Example
///
/// ```rust
/// use splitlink::utils::parse_content_range;
///
/// assert_eq!(parse_content_range("bytes 0-1023/2048"), Some((0, 1023, Some(2048))));
/// assert_eq!(parse_content_range("bytes 5-9/*"), Some((5, 9, None)));
/// ```
pub fn parse_content_range(content_range: &str) -> Option<(u64, u64, Option<u64>)> {
    let rest = content_range.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = rest.split_once('/')?;
    let (start, end) = range.trim().split_once('-')?;
    let start = start.trim().parse::<u64>().ok()?;
    let end = end.trim().parse::<u64>().ok()?;
    if end < start {
        return None;
    }
    let total = match total.trim() {
        "*" => None,
        size => Some(size.parse::<u64>().ok()?),
    };
    Some((start, end, total))
}

/// Whether the `Accept-Ranges` header advertises byte ranges.
///
/// Returns `None` when the header is absent, `Some(true)` when its value
/// contains `bytes` in any case, and `Some(false)` otherwise (for instance
/// `Accept-Ranges: none`).
pub fn accepts_byte_ranges(headers: &Headers) -> Option<bool> {
    let value = headers.get("Accept-Ranges")?;
    Some(value.to_ascii_lowercase().contains("bytes"))
}
