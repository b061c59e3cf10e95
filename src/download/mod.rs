//! Segment downloads, checksum verification and reporting.
//!
//! - [`worker`] - fetches one allocation entry into its temporary store
//! - [`hash`] - digest computation and comparison
//! - [`summary`] - the final [`Report`] of a download
//!
//! # Examples
//!
//! ## Verifying a File
//!
//! ```rust,no_run
//! use splitlink::download::{verify_hash, Checksum};
//! use std::path::Path;
//!
//! # async fn example() -> splitlink::Result<()> {
//! let checksum = Checksum::with_algorithm("5d41402abc4b2a76b9719d911017c592", "MD5");
//! let (algorithm, computed, matches) = verify_hash(Path::new("hello.txt"), &checksum).await?;
//! println!("{} {} {}", algorithm, computed, if matches { "ok" } else { "mismatch" });
//! # Ok(())
//! # }
//! ```

pub mod hash;
pub mod summary;
pub mod worker;

pub use hash::{detect_hash_type, digest_file, verify_hash, Checksum, HashAlgorithm};
pub use summary::{ChecksumReport, Report, SegmentReport, Status};
pub use worker::SegmentWorker;
