//! Aggregate progress of a download.

use crate::allocation::Allocation;

/// Progress of one segment at the time of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentProgress {
    pub id: String,
    pub interface: String,
    pub fraction: f64,
    /// Last sampled throughput, bytes per second.
    pub throughput: f64,
    pub transferred: u64,
    pub length: u64,
    pub throttled: bool,
    pub finished: bool,
}

/// Point-in-time view over every tracker of an allocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressSnapshot {
    /// Mean of the per-segment fractions.
    pub overall: f64,
    /// Segments in allocation order.
    pub segments: Vec<SegmentProgress>,
}

impl ProgressSnapshot {
    /// Reads every tracker of `allocation`. Never blocks the workers.
    pub fn capture(allocation: &Allocation) -> Self {
        let segments: Vec<SegmentProgress> = allocation
            .entries()
            .iter()
            .map(|entry| {
                let tracker = entry.tracker();
                SegmentProgress {
                    id: entry.id().to_string(),
                    interface: entry.interface().name.clone(),
                    fraction: tracker.fraction(),
                    throughput: tracker.throughput(),
                    transferred: tracker.transferred(),
                    length: entry.range().map(|r| r.len()).unwrap_or_default(),
                    throttled: entry.throttle().is_some(),
                    finished: tracker.is_finished(),
                }
            })
            .collect();

        let overall = if segments.is_empty() {
            0.0
        } else {
            segments.iter().map(|s| s.fraction).sum::<f64>() / segments.len() as f64
        };

        Self { overall, segments }
    }

    /// Bytes transferred across all segments.
    pub fn transferred(&self) -> u64 {
        self.segments.iter().map(|s| s.transferred).sum()
    }

    /// Sum of the segments' last throughput samples.
    pub fn throughput(&self) -> f64 {
        self.segments.iter().map(|s| s.throughput).sum()
    }

    /// Returns `true` when every segment has finished.
    pub fn is_finished(&self) -> bool {
        self.segments.iter().all(|s| s.finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocation::NetInterface;

    #[test]
    fn test_overall_is_mean_of_fractions() {
        let dir = tempfile::tempdir().unwrap();
        let mut allocation = Allocation::in_dir(dir.path())
            .add_fixed(NetInterface::unbound("a"), 0.5, None)
            .unwrap()
            .add_fixed(NetInterface::unbound("b"), 0.5, Some(100))
            .unwrap()
            .lock()
            .unwrap();
        allocation.assign_ranges(200).unwrap();

        let entries = allocation.entries();
        entries[0].tracker().on_transfer_start(100);
        entries[0].tracker().on_transfer_progress(100, 100);
        entries[0].tracker().on_transfer_end();
        entries[1].tracker().on_transfer_start(100);

        let snapshot = ProgressSnapshot::capture(&allocation);
        assert_eq!(snapshot.overall, 0.5);
        assert_eq!(snapshot.transferred(), 100);
        assert!(!snapshot.is_finished());
        assert!(snapshot.segments[1].throttled);
        assert_eq!(snapshot.segments[0].length, 100);
        assert_eq!(snapshot.segments[0].id, "a");
    }
}
