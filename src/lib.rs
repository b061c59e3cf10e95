//! Splitlink downloads one resource over plain HTTP/1.1 by splitting it into
//! byte ranges, fetching the ranges concurrently (each optionally through its
//! own local interface and at its own rate ceiling) and merging them back in
//! order.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use splitlink::allocation::{Allocation, NetInterface};
//! use splitlink::{DownloaderBuilder, Error};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Error> {
//! let allocation = Allocation::new()
//!     .add_fixed(NetInterface::new("eth0", "192.168.1.20".parse().unwrap()), 0.6, None)?
//!     .add_dynamic(NetInterface::new("usb0", "172.20.10.2".parse().unwrap()), Some(256 * 1024))?
//!     .lock()?;
//!
//! let report = DownloaderBuilder::new()
//!     .build()
//!     .download("http://example.com/debian.iso", "output/debian.iso", allocation)
//!     .await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`allocation`] - the work plan: interfaces, shares, throttles and byte ranges
//! - [`download`] - segment workers, checksum verification and the final report
//! - [`downloader`] - the `Downloader` orchestrator and its builder
//! - [`error`] - Centralized error handling with the `Error` enum
//! - [`http`] - the raw HTTP/1.1 client
//! - [`progress`] - per-segment trackers and progress bars
//! - [`throttle`] - per-segment rate limiting
//! - [`utils`] - Shared utility functions

pub mod allocation;
pub mod download;
pub mod downloader;
pub mod error;
pub mod http;
pub mod progress;
pub mod throttle;
pub mod utils;

pub use allocation::{Allocation, ByteRange, NetInterface};
pub use download::hash::{detect_hash_type, verify_hash, Checksum, HashAlgorithm};
pub use download::{Report, Status};
pub use downloader::{Downloader, DownloaderBuilder, Phase};
pub use error::{Error, Result};
pub use http::{create_http_client, HttpClientConfig};
pub use progress::{BarStyle, ProgressSnapshot, StyleOptions};
pub use utils::content_length::{accepts_byte_ranges, content_length};
