//! Final report of a download.
//!
//! A [`Report`] is returned by every run that reaches `Done`. It carries the
//! elapsed time, one [`SegmentReport`] per allocation entry and, when a
//! checksum was requested, both the expected and the computed digest.
//!
//! # Examples
//!
//! ```rust,no_run
//! use splitlink::download::Status;
//! # fn show(report: splitlink::Report) {
//! match report.status {
//!     Status::Success => println!("saved {}", report.output.display()),
//!     Status::ChecksumMismatch => {
//!         let checksum = report.checksum.as_ref().unwrap();
//!         println!("expected {}, got {}", checksum.expected, checksum.computed);
//!     }
//! }
//! for segment in &report.segments {
//!     println!("{}: {:.0} B/s", segment.id, segment.average_throughput);
//! }
//! # }
//! ```

use crate::allocation::{AllocationEntry, ByteRange};
use crate::download::hash::HashAlgorithm;

use std::fmt;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of a completed download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The output is complete and, if requested, its checksum matched.
    Success,
    /// The output is complete but its checksum differs from the expected
    /// one.
    ChecksumMismatch,
}

/// Result of checksum verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumReport {
    pub algorithm: HashAlgorithm,
    /// Digest supplied by the caller.
    pub expected: String,
    /// Digest of the output, lowercase hex.
    pub computed: String,
    pub matches: bool,
}

/// What one segment did.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentReport {
    pub id: String,
    /// Name of the interface the segment went through.
    pub interface: String,
    pub range: ByteRange,
    /// Bytes written to the segment store.
    pub bytes: u64,
    /// Last sampled throughput, bytes per second.
    pub throughput: f64,
    /// Throughput averaged over the transfer, bytes per second.
    pub average_throughput: f64,
    pub throttle: Option<NonZeroU64>,
}

impl SegmentReport {
    pub(crate) fn from_entry(entry: &AllocationEntry) -> Self {
        let tracker = entry.tracker();
        Self {
            id: entry.id().to_string(),
            interface: entry.interface().name.clone(),
            range: entry.range().unwrap_or_else(|| ByteRange::new(0, 0)),
            bytes: tracker.transferred(),
            throughput: tracker.throughput(),
            average_throughput: tracker.average_throughput(),
            throttle: entry.throttle(),
        }
    }
}

/// Structured final report of a download.
#[derive(Debug, Clone)]
pub struct Report {
    /// Success unless a supplied checksum did not match.
    pub status: Status,
    /// Time from prefetch to the end of verification.
    pub elapsed: Duration,
    /// Length of the resource, as announced by the prefetch.
    pub total_length: u64,
    /// Path of the assembled file.
    pub output: PathBuf,
    /// Segments in allocation order.
    pub segments: Vec<SegmentReport>,
    /// Present when a checksum was supplied.
    pub checksum: Option<ChecksumReport>,
}

impl Report {
    pub(crate) fn new(
        elapsed: Duration,
        total_length: u64,
        output: PathBuf,
        segments: Vec<SegmentReport>,
        checksum: Option<ChecksumReport>,
    ) -> Self {
        let status = match &checksum {
            Some(checksum) if !checksum.matches => Status::ChecksumMismatch,
            _ => Status::Success,
        };
        Self {
            status,
            elapsed,
            total_length,
            output,
            segments,
            checksum,
        }
    }

    /// Bytes per second over the whole run.
    pub fn average_throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.total_length as f64 / seconds
        } else {
            0.0
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bytes -> {} in {:.2?}",
            self.total_length,
            self.output.display(),
            self.elapsed
        )?;
        for segment in &self.segments {
            write!(
                f,
                "\n  {} via {} {}: {} bytes, {:.0} B/s",
                segment.id, segment.interface, segment.range, segment.bytes, segment.average_throughput
            )?;
            if segment.throttle.is_some() {
                write!(f, " *")?;
            }
        }
        if let Some(checksum) = &self.checksum {
            write!(
                f,
                "\n  {} {} (expected {}): {}",
                checksum.algorithm,
                checksum.computed,
                checksum.expected,
                if checksum.matches { "ok" } else { "MISMATCH" }
            )?;
        }
        Ok(())
    }
}
