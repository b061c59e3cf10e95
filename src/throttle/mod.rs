//! Per-segment rate limiting.
//!
//! A [`ThrottledReader`] wraps the socket of one segment and paces reads with
//! a [`TokenBucket`] refilled at the segment's throttle (bytes per second).
//! Without a throttle the reader is a plain pass-through.

pub mod bucket;
pub mod reader;

pub use bucket::{Grant, TokenBucket};
pub use reader::ThrottledReader;
