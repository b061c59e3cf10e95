//! Core downloader implementation.
//!
//! This module contains the [`Downloader`] that takes one resource from a
//! locked [`Allocation`] to a merged, optionally verified output file:
//! prefetch, partitioning, concurrent segment fetches, ordered merge and
//! checksum verification. Temporary stores are removed on every exit path.
//!
//! # Examples
//!
//! ## Basic Download
//!
//! ```rust,no_run
//! use splitlink::allocation::{Allocation, NetInterface};
//! use splitlink::downloader::DownloaderBuilder;
//!
//! # async fn example() -> splitlink::Result<()> {
//! let allocation = Allocation::new()
//!     .add_fixed(NetInterface::new("eth0", "192.168.1.20".parse().unwrap()), 0.7, None)?
//!     .add_dynamic(NetInterface::new("wlan0", "10.0.0.7".parse().unwrap()), Some(512 * 1024))?
//!     .lock()?;
//!
//! let downloader = DownloaderBuilder::new().build();
//! let report = downloader
//!     .download("http://example.com/big.iso", "big.iso", allocation)
//!     .await?;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cancellation
//!
//! ```rust,no_run
//! use splitlink::allocation::{Allocation, NetInterface};
//! use splitlink::downloader::DownloaderBuilder;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> splitlink::Result<()> {
//! let allocation = Allocation::new().add_dynamic(NetInterface::any(), None)?.lock()?;
//! let cancel = CancellationToken::new();
//!
//! let stop = cancel.clone();
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     stop.cancel();
//! });
//!
//! let downloader = DownloaderBuilder::new().build();
//! let result = downloader
//!     .download_with_cancel("http://example.com/big.iso", "big.iso", allocation, cancel)
//!     .await;
//! # Ok(())
//! # }
//! ```

use super::config::{DownloaderConfig, MIN_TICK};
use super::phase::PhaseMachine;
use crate::allocation::{Allocation, AllocationEntry};
use crate::download::{
    digest_file, Checksum, ChecksumReport, HashAlgorithm, Report, SegmentReport, SegmentWorker,
};
use crate::error::{Error, Result};
use crate::http::request::Target;
use crate::http::{create_http_client, Headers, ResponseHead};
use crate::progress::{ProgressDisplay, ProgressSnapshot};
use crate::utils::{accepts_byte_ranges, content_length};

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Represents the download controller.
///
/// A downloader can be created via its builder:
///
/// ```rust
/// # fn main()  {
/// use splitlink::downloader::DownloaderBuilder;
///
/// let d = DownloaderBuilder::new().build();
/// # }
/// ```
#[derive(Clone)]
pub struct Downloader {
    config: DownloaderConfig,
}

impl fmt::Debug for Downloader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Downloader")
            .field("config", &self.config)
            .finish()
    }
}

impl Downloader {
    /// Creates a new Downloader with the given configuration.
    pub(crate) fn new(config: DownloaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Gets the number of retries per segment.
    pub fn retries(&self) -> u32 {
        self.config.retries
    }

    /// Gets the number of segments fetched at the same time.
    pub fn concurrency(&self) -> usize {
        self.config.concurrency
    }

    /// Downloads `url` into `output`, split as planned by `allocation`.
    ///
    /// See [`download_with_cancel`](Self::download_with_cancel).
    pub async fn download(
        &self,
        url: &str,
        output: impl AsRef<Path>,
        allocation: Allocation,
    ) -> Result<Report> {
        self.download_with_cancel(url, output, allocation, CancellationToken::new())
            .await
    }

    /// Downloads `url` into `output`, stopping early when `cancel` fires.
    ///
    /// The allocation must be locked. Its entries are fetched concurrently
    /// and merged in allocation order. A checksum mismatch still returns a
    /// [`Report`], with [`Status::ChecksumMismatch`].
    ///
    /// Any failure, cancellation included, comes back as [`Error::Phase`]
    /// naming the phase that was running. Every temporary store is deleted
    /// before this returns, whatever the outcome. The output file is only
    /// created once all segments are in; a failed merge leaves it in place.
    ///
    /// [`Status::ChecksumMismatch`]: crate::download::Status::ChecksumMismatch
    pub async fn download_with_cancel(
        &self,
        url: &str,
        output: impl AsRef<Path>,
        mut allocation: Allocation,
        cancel: CancellationToken,
    ) -> Result<Report> {
        let observer = self.config.on_phase.as_deref().map(|callback| &**callback);
        let mut phases = PhaseMachine::new(observer);

        let result = self
            .run(&mut phases, url, output.as_ref(), &mut allocation, &cancel)
            .await;
        allocation.cleanup();

        match result {
            Ok(report) => {
                phases.advance();
                info!("Downloaded {}", report);
                Ok(report)
            }
            Err(source) => {
                let phase = phases.fail(&source);
                Err(Error::Phase {
                    phase,
                    source: Box::new(source),
                })
            }
        }
    }

    async fn run(
        &self,
        phases: &mut PhaseMachine<'_>,
        url: &str,
        output: &Path,
        allocation: &mut Allocation,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        let started = Instant::now();

        // Nothing touches the network until the inputs are known to be good.
        if !allocation.is_locked() {
            return Err(Error::State(
                "the allocation must be locked before downloading".into(),
            ));
        }
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))?;
        Target::from_url(&url)?;
        let algorithm = self
            .config
            .checksum
            .as_ref()
            .map(Checksum::resolve)
            .transpose()?;

        phases.advance();
        let total = self.prefetch(&url, allocation, cancel).await?;
        info!("{} is {} bytes", url, total);

        phases.advance();
        let ranges = allocation.assign_ranges(total)?;
        for (entry, range) in allocation.entries().iter().zip(&ranges) {
            debug!("Segment {} gets {}", entry.id(), range);
        }

        phases.advance();
        self.download_segments(&url, total, allocation, cancel)
            .await?;

        phases.advance();
        self.merge(allocation, output, total).await?;

        phases.advance();
        let checksum = match (&self.config.checksum, algorithm) {
            (Some(checksum), Some(algorithm)) => {
                Some(self.verify(output, checksum, algorithm).await?)
            }
            _ => None,
        };

        let segments = allocation
            .entries()
            .iter()
            .map(|entry| SegmentReport::from_entry(entry))
            .collect();
        Ok(Report::new(
            started.elapsed(),
            total,
            output.to_path_buf(),
            segments,
            checksum,
        ))
    }

    /// Learns the resource length, through the first entry's interface.
    async fn prefetch(
        &self,
        url: &Url,
        allocation: &Allocation,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let bind = allocation
            .entries()
            .first()
            .and_then(|entry| entry.interface().address);
        let client = create_http_client(self.config.client_config(bind));
        let headers = Headers::new();

        let head = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            head = client.prefetch_with(url, &headers, self.config.prefetch_method) => head?,
        };
        check_prefetch(&head, allocation.len())
    }

    /// Spawns one worker task per entry and drives the progress loop until
    /// every worker is done, one fails, or `cancel` fires. The loop only
    /// reads trackers, so a slow callback never holds a transfer back.
    async fn download_segments(
        &self,
        url: &Url,
        total: u64,
        allocation: &Allocation,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let (completed_tx, mut completed) = mpsc::unbounded_channel();
        for (index, entry) in allocation.entries().iter().enumerate() {
            let completed_tx = completed_tx.clone();
            entry.tracker().register_completion(move || {
                // The receiver is gone once the run is over.
                let _ = completed_tx.send(index);
            });
        }
        drop(completed_tx);

        let worker = SegmentWorker::new(url.clone(), total, self.config.client_config(None))
            .retries(self.config.retries);
        let token = cancel.child_token();
        let display = ProgressDisplay::new(
            self.config.style_options.clone(),
            total,
            &ProgressSnapshot::capture(allocation),
        );

        let mut workers = self.spawn_workers(&worker, allocation, &token);

        let mut ticker = tokio::time::interval(self.config.tick.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut running = allocation.len();

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Download cancelled with {} segments running", running);
                    break Err(Error::Cancelled);
                }
                Some(index) = completed.recv() => {
                    self.segment_completed(allocation, index, &display);
                }
                joined = workers.join_next() => match joined {
                    Some(Ok(Ok(_))) => running -= 1,
                    Some(Ok(Err(e))) => break Err(e),
                    Some(Err(e)) => std::panic::resume_unwind(e.into_panic()),
                    None => break Ok(()),
                },
                _ = ticker.tick() => self.report_progress(allocation, &display),
            }
        };

        // Stop whatever is still in flight and wait until its socket and
        // store handle are closed.
        token.cancel();
        workers.shutdown().await;

        match result {
            Ok(()) => {
                while let Ok(index) = completed.try_recv() {
                    self.segment_completed(allocation, index, &display);
                }
                self.report_progress(allocation, &display);
                display.finish();
                Ok(())
            }
            Err(e) => {
                display.abandon();
                Err(e)
            }
        }
    }

    /// At most `concurrency` workers transfer at once; the others wait for a
    /// permit.
    fn spawn_workers(
        &self,
        worker: &SegmentWorker,
        allocation: &Allocation,
        token: &CancellationToken,
    ) -> JoinSet<Result<u64>> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut workers = JoinSet::new();
        for entry in allocation.entries() {
            let worker = worker.clone();
            let entry = Arc::clone(entry);
            let token = token.clone();
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(Error::Cancelled),
                    permit = permits.acquire_owned() => permit.map_err(|_| Error::Cancelled)?,
                };
                let bytes = worker.run(&entry, &token).await?;
                check_segment(&entry, bytes)
            });
        }
        workers
    }

    fn segment_completed(&self, allocation: &Allocation, index: usize, display: &ProgressDisplay) {
        let Some(entry) = allocation.entries().get(index) else {
            return;
        };
        let report = SegmentReport::from_entry(entry);
        info!(
            "Segment {} via {} finished: {} bytes at {:.0} B/s",
            report.id, report.interface, report.bytes, report.average_throughput
        );
        display.println(format!("{} done via {}", report.id, report.interface));
        if let Some(ref callback) = self.config.on_segment_complete {
            callback(&report);
        }
    }

    fn report_progress(&self, allocation: &Allocation, display: &ProgressDisplay) {
        let snapshot = ProgressSnapshot::capture(allocation);
        display.update(&snapshot);
        if let Some(ref callback) = self.config.on_progress {
            callback(&snapshot);
        }
    }

    /// Concatenates the stores into `output` in allocation order.
    async fn merge(&self, allocation: &Allocation, output: &Path, total: u64) -> Result<u64> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            debug!("Creating destination directory {:?}", parent);
            fs::create_dir_all(parent)
                .await
                .map_err(merge_error(parent))?;
        }

        debug!("Creating destination file {:?}", output);
        let file = File::create(output).await.map_err(merge_error(output))?;
        let mut writer = BufWriter::new(file);
        let copied = append_stores(allocation, &mut writer, output).await;
        // Whatever was merged before a failure stays in the output.
        let flushed = writer.flush().await.map_err(merge_error(output));
        let merged = copied?;
        flushed?;

        if merged != total {
            return Err(Error::Protocol(format!(
                "merged {} bytes into {}, expected {}",
                merged,
                output.display(),
                total
            )));
        }
        info!("Merged {} segments into {:?}", allocation.len(), output);
        Ok(merged)
    }

    async fn verify(
        &self,
        output: &Path,
        checksum: &Checksum,
        algorithm: HashAlgorithm,
    ) -> Result<ChecksumReport> {
        let computed = digest_file(output, algorithm).await?;
        let matches = checksum.matches(&computed);
        if matches {
            info!("{} checksum of {:?} verified", algorithm, output);
        } else {
            warn!(
                "{} checksum mismatch for {:?}: expected {}, computed {}",
                algorithm,
                output,
                checksum.expected.trim(),
                computed
            );
        }
        Ok(ChecksumReport {
            algorithm,
            expected: checksum.expected.trim().to_string(),
            computed,
            matches,
        })
    }
}

/// Checks the prefetch response and returns the resource length.
fn check_prefetch(head: &ResponseHead, entries: usize) -> Result<u64> {
    head.ensure_success()?;

    if entries > 1 && accepts_byte_ranges(&head.headers) == Some(false) {
        return Err(Error::RangeUnsupported(format!(
            "server advertises `Accept-Ranges: {}` and {} segments were planned",
            head.headers.get("Accept-Ranges").unwrap_or_default(),
            entries
        )));
    }

    content_length(&head.headers).ok_or_else(|| match head.headers.get("Content-Length") {
        Some(value) => Error::LengthUnknown(format!("unusable Content-Length `{}`", value)),
        None => Error::LengthUnknown("the prefetch response has no Content-Length".into()),
    })
}

/// Fails a segment whose store does not hold exactly its range.
fn check_segment(entry: &AllocationEntry, bytes: u64) -> Result<u64> {
    let expected = entry.range().map(|range| range.len()).unwrap_or_default();
    if bytes == expected {
        return Ok(bytes);
    }
    Err(Error::Segment {
        id: entry.id().to_string(),
        source: Box::new(Error::Protocol(format!(
            "store holds {} bytes, expected {}",
            bytes, expected
        ))),
    })
}

/// Copies every store into `writer` in allocation order, deleting each store
/// as soon as it has been copied.
async fn append_stores(
    allocation: &Allocation,
    writer: &mut BufWriter<File>,
    output: &Path,
) -> Result<u64> {
    let mut merged = 0u64;
    for entry in allocation.entries() {
        let store = entry.store();
        let mut segment = File::open(store.path())
            .await
            .map_err(merge_error(store.path()))?;
        let copied = tokio::io::copy(&mut segment, writer)
            .await
            .map_err(merge_error(output))?;
        drop(segment);

        if let Err(e) = store.remove() {
            warn!("Failed to remove temporary store {:?}: {}", store.path(), e);
        }
        debug!("Merged segment {} ({} bytes)", entry.id(), copied);
        merged += copied;
    }
    Ok(merged)
}

fn merge_error(path: &Path) -> impl FnOnce(io::Error) -> Error {
    let path = path.to_path_buf();
    move |source| Error::Merge { path, source }
}
