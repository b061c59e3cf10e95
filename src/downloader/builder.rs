//! Fluent construction of a [`Downloader`].
//!
//! # Examples
//!
//! ## Retries and pool size
//!
//! ```rust
//! use splitlink::downloader::DownloaderBuilder;
//! use std::time::Duration;
//!
//! let downloader = DownloaderBuilder::new()
//!     .retries(5)
//!     .concurrency(4)
//!     .tick(Duration::from_millis(250))
//!     .build();
//! ```
//!
//! ## Checksum and Callbacks
//!
//! ```rust
//! use splitlink::download::Checksum;
//! use splitlink::downloader::DownloaderBuilder;
//!
//! let downloader = DownloaderBuilder::hidden()
//!     .header("User-Agent", "splitlink/0.1")
//!     .checksum(Checksum::with_algorithm(
//!         "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
//!         "SHA-256",
//!     ))
//!     .on_segment_complete(|segment| {
//!         println!("{} done via {}", segment.id, segment.interface);
//!     })
//!     .build();
//! ```

use super::config::{DownloaderConfig, MIN_TICK};
use super::downloader::Downloader;
use crate::download::{Checksum, SegmentReport};
use crate::downloader::Phase;
use crate::http::{Headers, Method};
use crate::progress::{ProgressSnapshot, StyleOptions};

use std::sync::Arc;
use std::time::Duration;

/// A builder used to create a [`Downloader`].
///
/// ```rust
/// # fn main()  {
/// use splitlink::downloader::DownloaderBuilder;
///
/// let d = DownloaderBuilder::new().retries(5).concurrency(2).build();
/// # }
/// ```
#[derive(Default)]
pub struct DownloaderBuilder {
    config: DownloaderConfig,
}

impl DownloaderBuilder {
    /// Creates a builder with the default options.
    pub fn new() -> Self {
        DownloaderBuilder::default()
    }

    /// Builder whose downloads draw no progress bars.
    pub fn hidden() -> Self {
        let mut builder = DownloaderBuilder::default();
        builder.config.style_options = StyleOptions::hidden();
        builder
    }

    /// Set the number of retries per segment.
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set how many segments are fetched at the same time.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    /// Set the interval of the progress loop. Values below 50 ms are raised
    /// to 50 ms.
    pub fn tick(mut self, tick: Duration) -> Self {
        self.config.tick = tick.max(MIN_TICK);
        self
    }

    /// Styles of the total and segment bars.
    pub fn style_options(mut self, style_options: StyleOptions) -> Self {
        self.config.style_options = style_options;
        self
    }

    /// Send the prefetch with `method` instead of `GET`.
    pub fn prefetch_method(mut self, method: Method) -> Self {
        self.config.prefetch_method = method;
        self
    }

    /// Set the size of a single socket read.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.config.buffer_size = buffer_size.max(1);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Verify the output against `checksum` once merged.
    ///
    /// A mismatch does not fail the download; it is reported through
    /// [`Report::status`](crate::download::Report::status).
    pub fn checksum(mut self, checksum: Checksum) -> Self {
        self.config.checksum = Some(checksum);
        self
    }

    /// Merges `headers` into the extra headers sent with every request.
    /// Repeated calls accumulate and later values win.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.config
            .headers
            .get_or_insert_with(Headers::new)
            .extend(&headers);
        self
    }

    /// Adds one extra request header, replacing an earlier value of the
    /// same name.
    ///
    /// ```
    /// use splitlink::downloader::DownloaderBuilder;
    ///
    /// let downloader = DownloaderBuilder::new()
    ///     .header("User-Agent", "splitlink-test/1.0")
    ///     .header("X-Mirror-Token", "b1946ac9")
    ///     .build();
    /// ```
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config
            .headers
            .get_or_insert_with(Headers::new)
            .insert(name, value);
        self
    }

    /// Set callback for aggregate progress, run on every tick of the
    /// progress loop while segments are downloading.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.config.on_progress = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Set callback for when each segment completes.
    ///
    /// The callback is called as soon as a segment's transfer ends,
    /// regardless of whether other segments are still in progress.
    pub fn on_segment_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SegmentReport) + Send + Sync + 'static,
    {
        self.config.on_segment_complete = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Set callback for every phase the download enters.
    pub fn on_phase<F>(mut self, callback: F) -> Self
    where
        F: Fn(Phase) + Send + Sync + 'static,
    {
        self.config.on_phase = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Create the [`Downloader`] with the specified options.
    pub fn build(self) -> Downloader {
        Downloader::new(self.config)
    }
}
