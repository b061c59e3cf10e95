//! Configuration structures and defaults for the downloader.
//!
//! This module provides the configuration used by the [`Downloader`] and
//! [`DownloaderBuilder`], including the callback types the orchestrator
//! reports through.
//!
//! [`Downloader`]: super::Downloader
//! [`DownloaderBuilder`]: super::DownloaderBuilder
//!
//! # Examples
//!
//! ## Using Callbacks
//!
//! ```rust
//! use splitlink::downloader::{ProgressCallback, SegmentCallback};
//! use splitlink::download::SegmentReport;
//! use splitlink::progress::ProgressSnapshot;
//!
//! let on_progress: ProgressCallback = Box::new(|snapshot: &ProgressSnapshot| {
//!     println!("{:.1}%", snapshot.overall * 100.0);
//! });
//! let on_segment: SegmentCallback = Box::new(|segment: &SegmentReport| {
//!     println!("{} finished: {} bytes", segment.id, segment.bytes);
//! });
//! ```

use crate::download::{Checksum, SegmentReport};
use crate::downloader::Phase;
use crate::http::client::DEFAULT_BUFFER_SIZE;
use crate::http::{Headers, HttpClientConfig, Method};
use crate::progress::{ProgressSnapshot, StyleOptions};

use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

/// Shortest allowed interval between two progress ticks.
pub const MIN_TICK: Duration = Duration::from_millis(50);

/// Default interval between two progress ticks.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Callback type for aggregate progress, run on every tick.
pub type ProgressCallback = Box<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// Callback type for segment completion events.
pub type SegmentCallback = Box<dyn Fn(&SegmentReport) + Send + Sync>;

/// Callback type for phase transitions.
pub type PhaseCallback = Box<dyn Fn(Phase) + Send + Sync>;

/// Configuration structure for the downloader
#[derive(Clone)]
pub struct DownloaderConfig {
    /// Number of retries per segment.
    pub retries: u32,
    /// Number of segments fetched at the same time.
    pub concurrency: usize,
    /// Interval of the progress loop, never below [`MIN_TICK`].
    pub tick: Duration,
    /// Downloader style options.
    pub style_options: StyleOptions,
    /// Custom HTTP headers, sent with the prefetch and every segment.
    pub headers: Option<Headers>,
    /// Method of the prefetch request.
    pub prefetch_method: Method,
    /// Size of a single socket read.
    pub buffer_size: usize,
    /// Limit on establishing a connection.
    pub connect_timeout: Duration,
    /// Limit on a single read staying idle.
    pub read_timeout: Duration,
    /// Checksum the output is verified against.
    pub checksum: Option<Checksum>,
    /// Callback for aggregate progress.
    pub on_progress: Option<Arc<ProgressCallback>>,
    /// Callback for when each segment completes.
    pub on_segment_complete: Option<Arc<SegmentCallback>>,
    /// Callback for phase transitions.
    pub on_phase: Option<Arc<PhaseCallback>>,
}

impl DownloaderConfig {
    /// Raw client settings for a socket bound to `bind_address`.
    pub fn client_config(&self, bind_address: Option<IpAddr>) -> HttpClientConfig {
        HttpClientConfig {
            bind_address,
            buffer_size: self.buffer_size,
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            headers: self.headers.clone(),
        }
    }
}

impl std::fmt::Debug for DownloaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloaderConfig")
            .field("retries", &self.retries)
            .field("concurrency", &self.concurrency)
            .field("tick", &self.tick)
            .field("style_options", &self.style_options)
            .field("headers", &self.headers)
            .field("prefetch_method", &self.prefetch_method)
            .field("buffer_size", &self.buffer_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("checksum", &self.checksum)
            .field("on_progress", &self.on_progress.is_some())
            .field("on_segment_complete", &self.on_segment_complete.is_some())
            .field("on_phase", &self.on_phase.is_some())
            .finish()
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        let client = HttpClientConfig::default();
        Self {
            retries: 3,
            concurrency: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(4),
            tick: DEFAULT_TICK,
            style_options: StyleOptions::default(),
            headers: None,
            prefetch_method: Method::Get,
            buffer_size: DEFAULT_BUFFER_SIZE,
            connect_timeout: client.connect_timeout,
            read_timeout: client.read_timeout,
            checksum: None,
            on_progress: None,
            on_segment_complete: None,
            on_phase: None,
        }
    }
}
