//! Work allocation.
//!
//! Turns a set of `(interface, share, throttle)` declarations into a locked
//! [`Allocation`] whose shares sum to one, and later into concrete
//! [`ByteRange`]s once the resource length is known. Every entry owns a
//! private [`TempStore`] and a [`ProgressTracker`](crate::progress::ProgressTracker).
//!
//! # Examples
//!
//! ```rust
//! use splitlink::allocation::{Allocation, NetInterface};
//!
//! # fn main() -> splitlink::Result<()> {
//! let mut allocation = Allocation::new()
//!     .add_fixed(NetInterface::new("lo", "127.0.0.1".parse().unwrap()), 0.5, None)?
//!     .add_fixed(NetInterface::any(), 0.5, Some(1024 * 1024))?
//!     .lock()?;
//!
//! let ranges = allocation.assign_ranges(101)?;
//! assert_eq!(ranges[0].header_value().as_deref(), Some("bytes=0-50"));
//! assert_eq!(ranges[1].header_value().as_deref(), Some("bytes=51-100"));
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod plan;
pub mod range;
pub mod store;

pub use entry::{AllocationEntry, NetInterface, Share};
pub use plan::{Allocation, SHARE_TOLERANCE};
pub use range::{partition, ByteRange};
pub use store::TempStore;
