//! Byte ranges and length partitioning.

use std::fmt;

/// A contiguous run of bytes of the remote resource.
///
/// Stored as a start offset plus a length so that the empty range of a
/// zero-share segment can be represented; [`end`](Self::end) gives the
/// inclusive end used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    len: u64,
}

impl ByteRange {
    /// Creates a range of `len` bytes starting at `start`.
    pub fn new(start: u64, len: u64) -> Self {
        Self { start, len }
    }

    /// Creates the inclusive range `[start, end]`.
    pub fn inclusive(start: u64, end: u64) -> Self {
        Self {
            start,
            len: end.saturating_sub(start) + 1,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    /// Inclusive end offset, `None` for an empty range.
    pub fn end(&self) -> Option<u64> {
        (self.len > 0).then(|| self.start + self.len - 1)
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if this range is the whole of a `total`-byte resource.
    pub fn covers(&self, total: u64) -> bool {
        self.start == 0 && self.len == total
    }

    /// The range left after the first `n` bytes.
    pub fn skip(&self, n: u64) -> Self {
        let n = n.min(self.len);
        Self {
            start: self.start + n,
            len: self.len - n,
        }
    }

    /// Value of the `Range` request header, `bytes=<start>-<end>`.
    pub fn header_value(&self) -> Option<String> {
        self.end()
            .map(|end| format!("bytes={}-{}", self.start, end))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end() {
            Some(end) => write!(f, "[{}, {}]", self.start, end),
            None => write!(f, "[empty at {}]", self.start),
        }
    }
}

/// Splits `total` bytes into contiguous ranges, one per share.
///
/// Every share but the last gets `round(share * total)` bytes (never more
/// than what is left). The last share gets the exact remainder, so rounding
/// error never opens a gap or an overlap.
///
/// ```rust
/// use splitlink::allocation::{partition, ByteRange};
///
/// let ranges = partition(100, &[0.33, 0.33, 0.34]);
/// let lengths: Vec<u64> = ranges.iter().map(ByteRange::len).collect();
/// assert_eq!(lengths, vec![33, 33, 34]);
/// ```
pub fn partition(total: u64, shares: &[f64]) -> Vec<ByteRange> {
    let mut ranges = Vec::with_capacity(shares.len());
    let mut offset = 0u64;
    for (index, share) in shares.iter().enumerate() {
        let left = total - offset;
        let len = if index + 1 == shares.len() {
            left
        } else {
            ((share * total as f64).round() as u64).min(left)
        };
        ranges.push(ByteRange::new(offset, len));
        offset += len;
    }
    ranges
}
