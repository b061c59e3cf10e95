//! Shared utility functions.
//!
//! This module contains helpers used by both the HTTP client and the segment
//! workers, mostly for reading length and range information out of response
//! headers.
//!
//! # Examples
//!
//! ## Parsing Content-Range Headers
//!
//! ```rust
//! use splitlink::utils::parse_content_range;
//!
//! let header_value = "bytes 0-1023/2048";
//! if let Some((start, end, Some(total))) = parse_content_range(header_value) {
//!     println!("{}..={} of {} bytes", start, end, total);
//! }
//! ```

pub mod content_length;

pub use content_length::{accepts_byte_ranges, content_length, parse_content_range};
