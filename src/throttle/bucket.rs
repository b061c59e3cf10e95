//! Token bucket used to pace reads.

use std::num::NonZeroU64;
use std::time::Duration;
use tokio::time::Instant;

/// Answer of [`TokenBucket::grant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    /// Up to this many bytes may be read now.
    Ready(usize),
    /// Nothing may be read before this delay has passed.
    Wait(Duration),
}

/// Token bucket algorithm implementation for bandwidth limiting.
///
/// One token is one byte. The bucket refills at `rate` tokens per second and
/// holds at most `capacity` tokens, which is the largest burst a reader can
/// get. The capacity never exceeds one second of traffic, so a read larger
/// than the capacity is split into several grants instead of waiting for
/// tokens that could never accumulate.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    rate: f64,
    capacity: u64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket refilled at `rate` bytes per second, holding at
    /// most `min(rate, burst)` tokens (and at least one).
    pub fn new(rate: NonZeroU64, burst: usize, now: Instant) -> Self {
        let capacity = rate.get().min(burst as u64).max(1);
        Self {
            rate: rate.get() as f64,
            capacity,
            tokens: capacity as f64,
            last_refill: now,
        }
    }

    /// Maximum burst in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens currently available, after refilling up to `now`.
    pub fn available(&mut self, now: Instant) -> u64 {
        self.refill(now);
        self.tokens as u64
    }

    /// Asks to read `wanted` bytes at `now`.
    ///
    /// The request is capped at the capacity. When the bucket cannot cover
    /// the capped request yet, returns how long to wait until it can. Tokens
    /// are only taken by [`consume`](Self::consume), once the read happened.
    pub fn grant(&mut self, wanted: usize, now: Instant) -> Grant {
        self.refill(now);
        let need = (wanted as u64).min(self.capacity).max(1);
        if self.tokens >= need as f64 {
            Grant::Ready(need as usize)
        } else {
            let deficit = need as f64 - self.tokens;
            Grant::Wait(Duration::from_secs_f64(deficit / self.rate))
        }
    }

    /// Takes `bytes` tokens.
    pub fn consume(&mut self, bytes: usize) {
        self.tokens = (self.tokens - bytes as f64).max(0.0);
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.rate).min(self.capacity as f64);
        self.last_refill = now;
    }
}
