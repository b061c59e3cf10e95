//! Allocation entries: one planned segment each.

use crate::allocation::range::ByteRange;
use crate::allocation::store::TempStore;
use crate::error::{Error, Result};
use crate::progress::ProgressTracker;

use std::fmt;
use std::net::IpAddr;
use std::num::NonZeroU64;
use std::sync::Arc;

/// A local network interface a segment is sent through.
///
/// Only the address matters on the wire: outbound sockets of the segment
/// are bound to it before connecting. An interface without an address lets
/// the operating system pick the route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NetInterface {
    /// Name used in ids, logs and the progress display, e.g. `eth0`.
    pub name: String,
    /// Local address to bind to.
    pub address: Option<IpAddr>,
}

impl NetInterface {
    /// An interface bound to `address`.
    pub fn new(name: impl Into<String>, address: IpAddr) -> Self {
        Self {
            name: name.into(),
            address: Some(address),
        }
    }

    /// A named interface that leaves the route to the operating system.
    pub fn unbound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
        }
    }

    /// The default route.
    pub fn any() -> Self {
        Self::unbound("any")
    }
}

impl fmt::Display for NetInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            Some(address) => write!(f, "{} ({})", self.name, address),
            None => f.write_str(&self.name),
        }
    }
}

/// Declared share of an entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Share {
    /// A fixed fraction in `(0, 1]`.
    Fixed(f64),
    /// An equal part of whatever the fixed shares leave, resolved at lock.
    Dynamic,
}

impl Share {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Share::Dynamic)
    }
}

/// One planned segment of a download.
#[derive(Debug)]
pub struct AllocationEntry {
    id: String,
    interface: NetInterface,
    share: Share,
    resolved: Option<f64>,
    throttle: Option<NonZeroU64>,
    range: Option<ByteRange>,
    store: TempStore,
    tracker: Arc<ProgressTracker>,
}

impl AllocationEntry {
    pub(crate) fn new(
        id: String,
        interface: NetInterface,
        share: Share,
        throttle: Option<NonZeroU64>,
        store: TempStore,
    ) -> Self {
        Self {
            id,
            interface,
            share,
            resolved: None,
            throttle,
            range: None,
            store,
            tracker: Arc::new(ProgressTracker::new()),
        }
    }

    /// Identifier, unique within the allocation.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interface(&self) -> &NetInterface {
        &self.interface
    }

    /// Share as declared.
    pub fn share(&self) -> Share {
        self.share
    }

    /// Share after locking; `None` before.
    pub fn resolved_share(&self) -> Option<f64> {
        self.resolved
    }

    /// Throughput ceiling in bytes per second, `None` when unlimited.
    pub fn throttle(&self) -> Option<NonZeroU64> {
        self.throttle
    }

    /// Assigned byte range; `None` until partitioning.
    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn store(&self) -> &TempStore {
        &self.store
    }

    pub fn tracker(&self) -> &Arc<ProgressTracker> {
        &self.tracker
    }

    pub(crate) fn resolve(&mut self, share: f64) {
        self.resolved = Some(share);
    }

    /// Attaches the byte range. A range can only be set once.
    pub(crate) fn assign_range(&mut self, range: ByteRange) -> Result<()> {
        if let Some(existing) = self.range {
            return Err(Error::State(format!(
                "entry {} already has range {}",
                self.id, existing
            )));
        }
        self.range = Some(range);
        Ok(())
    }
}

impl fmt::Display for AllocationEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} => ", self.id, self.interface.name)?;
        match (self.resolved, self.share) {
            (Some(share), _) | (None, Share::Fixed(share)) => {
                write!(f, "{}%", format_percent(share))?
            }
            (None, Share::Dynamic) => f.write_str("<dynamic>")?,
        }
        if let Some(throttle) = self.throttle {
            write!(f, " @ {} B/s", throttle)?;
        }
        Ok(())
    }
}

fn format_percent(share: f64) -> String {
    let percent = format!("{:.2}", share * 100.0);
    percent
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
