//! Downloader module containing the orchestrator, its builder, and its
//! configuration.
//!
//! # Overview
//!
//! - `downloader` - the [`Downloader`] that runs one segmented download
//! - `builder` - [`DownloaderBuilder`] for configuring it
//! - `config` - configuration structure and callback types
//! - `phase` - the [`Phase`]s a download goes through
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use splitlink::allocation::{Allocation, NetInterface};
//! use splitlink::downloader::DownloaderBuilder;
//!
//! # async fn example() -> splitlink::Result<()> {
//! let allocation = Allocation::new()
//!     .add_fixed(NetInterface::new("eth0", "192.168.1.20".parse().unwrap()), 0.5, None)?
//!     .add_fixed(NetInterface::new("eth1", "192.168.2.20".parse().unwrap()), 0.5, None)?
//!     .lock()?;
//!
//! let report = DownloaderBuilder::new()
//!     .build()
//!     .download("http://example.com/file.zip", "file.zip", allocation)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Hidden Progress Bars
//!
//! ```rust
//! use splitlink::downloader::DownloaderBuilder;
//!
//! // Create a downloader with hidden progress bars
//! let downloader = DownloaderBuilder::hidden().build();
//! ```

pub mod builder;
pub mod config;
pub mod downloader;
pub mod phase;

pub use builder::DownloaderBuilder;
pub use config::{DownloaderConfig, PhaseCallback, ProgressCallback, SegmentCallback};
pub use downloader::Downloader;
pub use phase::Phase;
