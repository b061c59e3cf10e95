//! The allocation (work plan) and its lock-time validation.

use crate::allocation::entry::{AllocationEntry, NetInterface, Share};
use crate::allocation::range::{partition, ByteRange};
use crate::allocation::store::TempStore;
use crate::error::{Error, Result};

use std::fmt;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Slack allowed when checking that shares sum to one.
pub const SHARE_TOLERANCE: f64 = 1e-6;

/// The set of segments one download is split into.
///
/// Entries are added with [`add_fixed`](Self::add_fixed) and
/// [`add_dynamic`](Self::add_dynamic), then the allocation is
/// [`lock`](Self::lock)ed, which resolves dynamic shares and checks that
/// everything sums to one. After locking only byte ranges can be attached.
/// Entries keep their insertion order, which is the order ranges are laid
/// out in and the order segments are merged in.
///
/// Entries are reference counted so segment workers can run as their own
/// tasks. Changing an entry while a clone of it is alive fails with
/// [`Error::State`].
///
/// ```rust
/// use splitlink::allocation::{Allocation, NetInterface};
///
/// # fn main() -> splitlink::Result<()> {
/// let allocation = Allocation::new()
///     .add_fixed(NetInterface::unbound("eth0"), 0.5, None)?
///     .add_dynamic(NetInterface::unbound("wlan0"), Some(64 * 1024))?
///     .lock()?;
///
/// assert_eq!(allocation.len(), 2);
/// assert_eq!(allocation.entries()[1].resolved_share(), Some(0.5));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Allocation {
    entries: Vec<Arc<AllocationEntry>>,
    directory: PathBuf,
    locked: bool,
}

impl Default for Allocation {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocation {
    /// Creates an empty allocation whose stores live in the system temporary
    /// directory.
    pub fn new() -> Self {
        Self::in_dir(std::env::temp_dir())
    }

    /// Creates an empty allocation whose stores live in `directory`.
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            directory: directory.into(),
            locked: false,
        }
    }

    /// Adds an entry with a fixed share in `(0, 1]`.
    pub fn add_fixed(
        self,
        interface: NetInterface,
        share: f64,
        throttle: Option<u64>,
    ) -> Result<Self> {
        if !(share > 0.0 && share <= 1.0) {
            return Err(Error::Validation(format!(
                "share {} for {} is outside (0, 1]",
                share, interface.name
            )));
        }
        self.push(interface, Share::Fixed(share), throttle)
    }

    /// Adds an entry whose share is resolved when locking.
    pub fn add_dynamic(self, interface: NetInterface, throttle: Option<u64>) -> Result<Self> {
        self.push(interface, Share::Dynamic, throttle)
    }

    fn push(mut self, interface: NetInterface, share: Share, throttle: Option<u64>) -> Result<Self> {
        self.ensure_unlocked()?;
        let throttle = match throttle {
            Some(bytes) => Some(NonZeroU64::new(bytes).ok_or_else(|| {
                Error::Validation(format!("throttle for {} must be positive", interface.name))
            })?),
            None => None,
        };

        let id = self.unique_id(&interface.name);
        let store = TempStore::create_in(&self.directory, &id)?;
        debug!("Planned segment {} on {}", id, interface);
        self.entries
            .push(Arc::new(AllocationEntry::new(id, interface, share, throttle, store)));
        Ok(self)
    }

    /// Resolves dynamic shares and freezes the allocation.
    ///
    /// Dynamic entries split `1 - sum(fixed)` evenly. Fails with
    /// [`Error::Validation`] when there are no entries, when fixed shares
    /// exceed one, when dynamic entries would get nothing, or when the
    /// resolved shares do not sum to one. Locking twice fails with
    /// [`Error::State`].
    pub fn lock(mut self) -> Result<Self> {
        self.ensure_unlocked()?;
        if self.entries.is_empty() {
            return Err(Error::Validation("allocation has no entries".into()));
        }

        let fixed: f64 = self
            .entries
            .iter()
            .filter_map(|entry| match entry.share() {
                Share::Fixed(share) => Some(share),
                Share::Dynamic => None,
            })
            .sum();
        if fixed > 1.0 + SHARE_TOLERANCE {
            return Err(Error::Validation(format!(
                "fixed shares sum to {}, more than 1",
                fixed
            )));
        }

        let dynamic = self.entries.iter().filter(|e| e.share().is_dynamic()).count();
        let remainder = 1.0 - fixed;
        if dynamic > 0 && remainder <= SHARE_TOLERANCE {
            return Err(Error::Validation(format!(
                "fixed shares leave nothing for {} dynamic entries",
                dynamic
            )));
        }
        let each = if dynamic > 0 {
            remainder / dynamic as f64
        } else {
            0.0
        };

        for entry in &mut self.entries {
            let share = match entry.share() {
                Share::Fixed(share) => share,
                Share::Dynamic => each,
            };
            entry_mut(entry)?.resolve(share);
        }

        let total: f64 = self.shares().iter().sum();
        if (total - 1.0).abs() >= SHARE_TOLERANCE {
            return Err(Error::Validation(format!(
                "shares sum to {}, not 1",
                total
            )));
        }

        self.locked = true;
        debug!("Locked allocation:\n{}", self);
        Ok(self)
    }

    /// Splits a `total`-byte resource across the entries, in order.
    pub fn assign_ranges(&mut self, total: u64) -> Result<Vec<ByteRange>> {
        if !self.locked {
            return Err(Error::State(
                "ranges can only be assigned to a locked allocation".into(),
            ));
        }
        let ranges = partition(total, &self.shares());
        for (entry, range) in self.entries.iter_mut().zip(&ranges) {
            entry_mut(entry)?.assign_range(*range)?;
        }
        Ok(ranges)
    }

    /// Removes every temporary store that is still on disk.
    ///
    /// Returns how many files this call deleted. Stores already claimed by
    /// the merge are skipped.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        for entry in &self.entries {
            match entry.store().remove() {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to remove temporary store {:?}: {}",
                    entry.store().path(),
                    e
                ),
            }
        }
        if removed > 0 {
            debug!("Cleanup removed {} temporary stores", removed);
        }
        removed
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[Arc<AllocationEntry>] {
        &self.entries
    }

    /// Looks an entry up by id.
    pub fn entry(&self, id: &str) -> Option<&AllocationEntry> {
        self.entries
            .iter()
            .find(|entry| entry.id() == id)
            .map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Directory holding the temporary stores.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn shares(&self) -> Vec<f64> {
        self.entries
            .iter()
            .map(|entry| entry.resolved_share().unwrap_or(0.0))
            .collect()
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.locked {
            Err(Error::State("allocation is locked".into()))
        } else {
            Ok(())
        }
    }

    fn unique_id(&self, name: &str) -> String {
        let taken = |id: &str| self.entries.iter().any(|entry| entry.id() == id);
        if !taken(name) {
            return name.to_string();
        }
        (1..)
            .map(|n| format!("{}{{{}}}", name, n))
            .find(|id| !taken(id))
            .unwrap_or_else(|| name.to_string())
    }
}

fn entry_mut(entry: &mut Arc<AllocationEntry>) -> Result<&mut AllocationEntry> {
    let id = entry.id().to_string();
    Arc::get_mut(entry).ok_or_else(|| Error::State(format!("entry {} is in use", id)))
}

impl fmt::Display for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Work plan")?;
        if !self.locked {
            write!(f, " (unlocked)")?;
        }
        for entry in &self.entries {
            write!(f, "\n  {}", entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iface(name: &str) -> NetInterface {
        NetInterface::unbound(name)
    }

    #[test]
    fn test_single_dynamic_entry_gets_everything() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .lock()
            .unwrap();
        assert_eq!(allocation.entries()[0].resolved_share(), Some(1.0));
    }

    #[test]
    fn test_dynamic_entries_share_remainder() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 0.4, None)
            .unwrap()
            .add_dynamic(iface("wlan0"), None)
            .unwrap()
            .add_dynamic(iface("usb0"), Some(1024))
            .unwrap()
            .lock()
            .unwrap();

        let shares: Vec<f64> = allocation
            .entries()
            .iter()
            .map(|e| e.resolved_share().unwrap())
            .collect();
        assert!((shares[1] - 0.3).abs() < 1e-12);
        assert!((shares[2] - 0.3).abs() < 1e-12);
        assert!((shares.iter().sum::<f64>() - 1.0).abs() < SHARE_TOLERANCE);
    }

    #[test]
    fn test_share_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        for share in [0.0, -0.5, 1.5, f64::NAN] {
            let result = Allocation::in_dir(dir.path()).add_fixed(iface("eth0"), share, None);
            assert!(matches!(result, Err(Error::Validation(_))), "share {}", share);
        }
    }

    #[test]
    fn test_zero_throttle_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = Allocation::in_dir(dir.path()).add_dynamic(iface("eth0"), Some(0));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_allocation_is_invalid() {
        assert!(matches!(Allocation::new().lock(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_fixed_shares_must_sum_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let under = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 0.5, None)
            .unwrap()
            .lock();
        assert!(matches!(under, Err(Error::Validation(_))));

        let over = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 0.7, None)
            .unwrap()
            .add_fixed(iface("eth1"), 0.7, None)
            .unwrap()
            .lock();
        assert!(matches!(over, Err(Error::Validation(_))));

        let starved = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 1.0, None)
            .unwrap()
            .add_dynamic(iface("eth1"), None)
            .unwrap()
            .lock();
        assert!(matches!(starved, Err(Error::Validation(_))));
    }

    #[test]
    fn test_float_accumulation_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocation = Allocation::in_dir(dir.path());
        for i in 0..10 {
            allocation = allocation
                .add_fixed(iface(&format!("eth{}", i)), 0.1, None)
                .unwrap();
        }
        assert!(allocation.lock().is_ok());
    }

    #[test]
    fn test_locked_allocation_is_frozen() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .lock()
            .unwrap();
        assert!(allocation.is_locked());

        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .lock()
            .unwrap();
        assert!(matches!(
            allocation.add_dynamic(iface("eth1"), None),
            Err(Error::State(_))
        ));

        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .lock()
            .unwrap();
        assert!(matches!(allocation.lock(), Err(Error::State(_))));
    }

    #[test]
    fn test_duplicate_interfaces_get_unique_ids() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .add_dynamic(iface("eth0"), None)
            .unwrap();
        let ids: Vec<&str> = allocation.entries().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["eth0", "eth0{1}", "eth0{2}"]);
    }

    #[test]
    fn test_assign_ranges_requires_lock() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap();
        assert!(matches!(allocation.assign_ranges(10), Err(Error::State(_))));
    }

    #[test]
    fn test_assign_ranges_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocation = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 0.5, None)
            .unwrap()
            .add_fixed(iface("eth1"), 0.5, None)
            .unwrap()
            .lock()
            .unwrap();

        let ranges = allocation.assign_ranges(101).unwrap();
        assert_eq!(ranges[0], ByteRange::inclusive(0, 50));
        assert_eq!(ranges[1], ByteRange::inclusive(51, 100));
        assert!(matches!(allocation.assign_ranges(101), Err(Error::State(_))));
    }

    #[test]
    fn test_shared_entry_cannot_take_a_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .lock()
            .unwrap();

        let held = Arc::clone(&allocation.entries()[0]);
        assert!(matches!(allocation.assign_ranges(10), Err(Error::State(_))));
        drop(held);
        assert_eq!(allocation.assign_ranges(10).unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_removes_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_dynamic(iface("eth0"), None)
            .unwrap()
            .add_dynamic(iface("eth1"), None)
            .unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);

        assert!(allocation.entries()[0].store().remove().unwrap());
        assert_eq!(allocation.cleanup(), 1);
        assert_eq!(allocation.cleanup(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_display_lists_entries() {
        let dir = tempfile::tempdir().unwrap();
        let allocation = Allocation::in_dir(dir.path())
            .add_fixed(iface("eth0"), 0.5, None)
            .unwrap()
            .add_dynamic(iface("wlan0"), None)
            .unwrap();
        assert_eq!(
            allocation.to_string(),
            "Work plan (unlocked)\n  eth0:eth0 => 50%\n  wlan0:wlan0 => <dynamic>"
        );
    }
}
