//! Progress tracking and display.
//!
//! - [`tracker`] - lock-free per-segment progress state written by workers
//! - [`snapshot`] - aggregate view over every tracker of an allocation
//! - `display` - `indicatif` rendering of snapshots
//! - `style` - progress bar styling options
//!
//! # Examples
//!
//! ```rust
//! use splitlink::progress::ProgressTracker;
//!
//! let tracker = ProgressTracker::new();
//! tracker.on_transfer_start(200);
//! tracker.on_transfer_progress(50, 50);
//! assert_eq!(tracker.fraction(), 0.25);
//!
//! tracker.on_transfer_end();
//! assert!(tracker.is_finished());
//! ```

pub(crate) mod display;
pub mod snapshot;
pub(crate) mod style;
pub mod tracker;

pub use display::ProgressDisplay;
pub use snapshot::{ProgressSnapshot, SegmentProgress};
pub use style::{BarStyle, StyleOptions};
pub use tracker::{ProgressTracker, SAMPLE_INTERVAL};
