//! Per-segment progress state.
//!
//! A [`ProgressTracker`] is written by exactly one segment worker and read
//! at any time by the orchestrator's display loop. Everything the reader
//! needs lives in atomics, so a reader never waits on the worker. Floating
//! point values are stored as their bit patterns in `AtomicU64`.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// How often the instantaneous throughput is recomputed.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

type Completion = Box<dyn FnOnce() + Send>;

#[derive(Debug, Default)]
struct SampleWindow {
    started: Option<Instant>,
    ended: Option<Instant>,
    sampled_at: Option<Instant>,
    pending: u64,
    baseline: u64,
}

/// Thread-safe progress of one segment transfer.
pub struct ProgressTracker {
    length: AtomicU64,
    transferred: AtomicU64,
    fraction: AtomicU64,
    throughput: AtomicU64,
    finished: AtomicBool,
    window: Mutex<SampleWindow>,
    completion: Mutex<Option<Completion>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("length", &self.length())
            .field("transferred", &self.transferred())
            .field("fraction", &self.fraction())
            .field("throughput", &self.throughput())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl ProgressTracker {
    /// Creates a tracker with every reading at zero.
    pub fn new() -> Self {
        Self {
            length: AtomicU64::new(0),
            transferred: AtomicU64::new(0),
            fraction: AtomicU64::new(0f64.to_bits()),
            throughput: AtomicU64::new(0f64.to_bits()),
            finished: AtomicBool::new(false),
            window: Mutex::new(SampleWindow::default()),
            completion: Mutex::new(None),
        }
    }

    /// Registers the one-shot callback run by [`on_transfer_end`](Self::on_transfer_end).
    ///
    /// A later registration replaces an earlier one that has not fired yet.
    pub fn register_completion<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Ok(mut completion) = self.completion.lock() {
            *completion = Some(Box::new(callback));
        }
    }

    /// Starts a transfer of `length` bytes now.
    pub fn on_transfer_start(&self, length: u64) {
        self.on_transfer_start_at(length, Instant::now());
    }

    /// Starts a transfer of `length` bytes at `now`, resetting the sampling
    /// window and the transferred-bytes baseline.
    pub fn on_transfer_start_at(&self, length: u64, now: Instant) {
        self.length.store(length, Ordering::Release);
        self.transferred.store(0, Ordering::Release);
        store_f64(&self.fraction, 0.0);
        store_f64(&self.throughput, 0.0);
        if let Ok(mut window) = self.window.lock() {
            *window = SampleWindow {
                started: Some(now),
                sampled_at: Some(now),
                ..SampleWindow::default()
            };
        }
    }

    /// Records `delta` new bytes, `cumulative` in total.
    pub fn on_transfer_progress(&self, delta: u64, cumulative: u64) {
        self.on_transfer_progress_at(delta, cumulative, Instant::now());
    }

    /// Records progress at `now`.
    ///
    /// The fraction is updated right away. The throughput is only recomputed
    /// once [`SAMPLE_INTERVAL`] has elapsed since the previous sample, from
    /// the bytes received since that sample.
    pub fn on_transfer_progress_at(&self, delta: u64, cumulative: u64, now: Instant) {
        self.transferred.store(cumulative, Ordering::Release);
        let length = self.length.load(Ordering::Acquire);
        if length > 0 {
            store_f64(&self.fraction, (cumulative as f64 / length as f64).min(1.0));
        }

        let Ok(mut window) = self.window.lock() else {
            return;
        };
        window.pending += delta;
        let sampled_at = *window.sampled_at.get_or_insert(now);
        let elapsed = now.saturating_duration_since(sampled_at);
        if elapsed >= SAMPLE_INTERVAL {
            store_f64(
                &self.throughput,
                window.pending as f64 / elapsed.as_secs_f64(),
            );
            window.pending = 0;
            window.sampled_at = Some(now);
        }
    }

    /// Continues an interrupted transfer that already holds `cumulative`
    /// bytes. The sampling window restarts at `now`.
    pub fn resume_from(&self, cumulative: u64) {
        self.transferred.store(cumulative, Ordering::Release);
        if let Ok(mut window) = self.window.lock() {
            let now = Instant::now();
            window.sampled_at = Some(now);
            window.pending = 0;
            window.baseline = cumulative;
            if window.started.is_none() {
                window.started = Some(now);
            }
        }
    }

    /// Throws away the bytes of an interrupted transfer.
    pub fn reset(&self) {
        self.transferred.store(0, Ordering::Release);
        store_f64(&self.fraction, 0.0);
        if let Ok(mut window) = self.window.lock() {
            window.sampled_at = Some(Instant::now());
            window.pending = 0;
            window.baseline = 0;
        }
    }

    /// Marks the transfer as finished and runs the completion callback.
    ///
    /// Only the first call has any effect.
    pub fn on_transfer_end(&self) {
        self.on_transfer_end_at(Instant::now());
    }

    /// Marks the transfer as finished at `now`.
    pub fn on_transfer_end_at(&self, now: Instant) {
        if self.finished.swap(true, Ordering::AcqRel) {
            return;
        }
        store_f64(&self.fraction, 1.0);
        if let Ok(mut window) = self.window.lock() {
            window.ended = Some(now);
        }
        let callback = self
            .completion
            .lock()
            .ok()
            .and_then(|mut completion| completion.take());
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Fraction complete in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        load_f64(&self.fraction)
    }

    /// Last sampled throughput in bytes per second; `0` before the first
    /// sample.
    pub fn throughput(&self) -> f64 {
        load_f64(&self.throughput)
    }

    /// Returns `true` once the transfer has ended.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Bytes transferred so far.
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// Length of the segment.
    pub fn length(&self) -> u64 {
        self.length.load(Ordering::Acquire)
    }

    /// Average throughput of the bytes moved in this run, from the start of
    /// the transfer to its end (or to now while it is running).
    pub fn average_throughput(&self) -> f64 {
        let Ok(window) = self.window.lock() else {
            return 0.0;
        };
        let Some(started) = window.started else {
            return 0.0;
        };
        let ended = window.ended.unwrap_or_else(Instant::now);
        let elapsed = ended.saturating_duration_since(started).as_secs_f64();
        let moved = self.transferred().saturating_sub(window.baseline);
        if elapsed > 0.0 {
            moved as f64 / elapsed
        } else {
            0.0
        }
    }
}

fn store_f64(cell: &AtomicU64, value: f64) {
    cell.store(value.to_bits(), Ordering::Release);
}

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Acquire))
}
