//! Segment workers.
//!
//! A [`SegmentWorker`] downloads the byte range of one allocation entry into
//! the entry's temporary store, through the entry's interface and throttle,
//! and drives the entry's tracker. Transient failures are retried with
//! exponential backoff; identity-encoded segments resume where the store
//! left off instead of starting over.

use crate::allocation::{AllocationEntry, ByteRange};
use crate::error::{Error, Result};
use crate::http::{create_http_client, HttpClient, HttpClientConfig, Headers, ResponseHead};
use crate::utils::content_length::parse_content_range;

use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Delay before the first retry.
pub const BACKOFF_BASE: Duration = Duration::from_millis(250);

/// Upper bound of the retry delay.
pub const BACKOFF_MAX: Duration = Duration::from_secs(8);

/// Delay before retry number `attempt` (0-based).
pub fn backoff(attempt: u32) -> Duration {
    BACKOFF_BASE
        .saturating_mul(1u32 << attempt.min(16))
        .min(BACKOFF_MAX)
}

/// Downloads segments of one resource.
#[derive(Debug, Clone)]
pub struct SegmentWorker {
    url: Url,
    total_length: u64,
    headers: Headers,
    retries: u32,
    client_config: HttpClientConfig,
}

impl SegmentWorker {
    /// A worker for the `total_length`-byte resource at `url`.
    pub fn new(url: Url, total_length: u64, client_config: HttpClientConfig) -> Self {
        Self {
            url,
            total_length,
            headers: Headers::new(),
            retries: 3,
            client_config,
        }
    }

    /// Extra headers sent with every segment request.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// How many times a failed transfer is retried.
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Downloads the range of `entry` into its store.
    ///
    /// Returns the number of bytes in the store. Stops as soon as `cancel`
    /// fires; the in-flight connection and store handle are closed by
    /// dropping the transfer. Failures are tagged with the entry id.
    pub async fn run(&self, entry: &AllocationEntry, cancel: &CancellationToken) -> Result<u64> {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Segment {} cancelled", entry.id());
                return Err(Error::Cancelled);
            }
            result = self.transfer(entry) => result,
        };
        result.map_err(|source| Error::Segment {
            id: entry.id().to_string(),
            source: Box::new(source),
        })
    }

    async fn transfer(&self, entry: &AllocationEntry) -> Result<u64> {
        let range = entry
            .range()
            .ok_or_else(|| Error::State(format!("segment {} has no range", entry.id())))?;
        let tracker = entry.tracker();
        tracker.on_transfer_start(range.len());

        if range.is_empty() {
            debug!("Segment {} is empty, nothing to fetch", entry.id());
            tracker.on_transfer_end();
            return Ok(0);
        }

        let client = create_http_client(HttpClientConfig {
            bind_address: entry.interface().address,
            ..self.client_config.clone()
        });
        info!(
            "Segment {} fetching {} via {}",
            entry.id(),
            range,
            entry.interface()
        );

        let mut attempt = 0;
        let mut identity = false;
        let mut resume_at = 0;
        loop {
            let remaining = range.skip(resume_at);
            match self
                .attempt(&client, entry, remaining, resume_at > 0, &mut identity)
                .await
            {
                Ok(()) => break,
                Err(e) if e.is_transient() && attempt < self.retries => {
                    let delay = backoff(attempt);
                    attempt += 1;
                    resume_at = if identity { entry.store().len()? } else { 0 };
                    warn!(
                        "Segment {} failed: {}. Retry {}/{} in {:?} from offset {}",
                        entry.id(),
                        e,
                        attempt,
                        self.retries,
                        delay,
                        range.start() + resume_at
                    );
                    if resume_at > 0 {
                        tracker.resume_from(resume_at);
                    } else {
                        tracker.reset();
                    }
                    tokio::time::sleep(delay).await;
                    if resume_at >= range.len() {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        tracker.on_transfer_end();
        let bytes = entry.store().len()?;
        info!("Segment {} done, {} bytes", entry.id(), bytes);
        Ok(bytes)
    }

    async fn attempt(
        &self,
        client: &HttpClient,
        entry: &AllocationEntry,
        requested: ByteRange,
        append: bool,
        identity: &mut bool,
    ) -> Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .append(append)
            .truncate(!append)
            .open(entry.store().path())
            .await?;

        let mut headers = self.headers.clone();
        if let Some(value) = requested.header_value() {
            headers.insert("Range", value);
        }

        let total = self.total_length;
        let mut sink = BufWriter::new(file);
        let result = client
            .fetch_with(
                &self.url,
                &headers,
                &mut sink,
                entry.throttle(),
                Some(entry.tracker().as_ref()),
                |head| validate_segment(head, requested, total, identity),
            )
            .await;
        // Bytes that made it before a failure are what a retry resumes from.
        if let Err(e) = sink.flush().await {
            debug!("Segment {} could not flush its store: {}", entry.id(), e);
        }
        let outcome = result?;
        if outcome.wire_bytes != outcome.body_bytes {
            debug!(
                "Segment {} decoded {} bytes from {} on the wire",
                entry.id(),
                outcome.body_bytes,
                outcome.wire_bytes
            );
        }
        Ok(())
    }
}

/// Checks that a response actually carries `requested`.
///
/// A `206` must start where asked and, without content coding, be exactly
/// as long as the range. A `200` means the server ignored the range, which is
/// only acceptable when the range is the whole resource.
fn validate_segment(
    head: &ResponseHead,
    requested: ByteRange,
    total: u64,
    identity: &mut bool,
) -> Result<()> {
    let encoding = head.content_encoding()?;
    *identity = encoding.is_identity();

    match head.status {
        206 => {
            if let Some(value) = head.headers.get("Content-Range") {
                match parse_content_range(value) {
                    Some((start, _, _)) if start == requested.start() => {}
                    _ => {
                        return Err(Error::RangeMismatch(format!(
                            "Content-Range `{}` does not match {}",
                            value, requested
                        )))
                    }
                }
            }
            if encoding.is_identity() {
                if let Some(length) = head.content_length() {
                    if length != requested.len() {
                        return Err(Error::RangeMismatch(format!(
                            "asked for {} bytes, server sent {}",
                            requested.len(),
                            length
                        )));
                    }
                }
            }
            Ok(())
        }
        200 if requested.covers(total) => Ok(()),
        200 => Err(Error::RangeUnsupported(format!(
            "server ignored Range {} and sent the whole resource",
            requested
        ))),
        status => Err(Error::RangeMismatch(format!(
            "unexpected status {} for a ranged request",
            status
        ))),
    }
}
