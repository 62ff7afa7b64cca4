//! Downlink throughput and latency tracking.
//!
//! The frame trailer already carries per-frame numbers; this aggregates
//! them over a rolling window so the client can report a steady
//! bytes-per-second figure and a smoothed pose RTT instead of one noisy
//! sample per frame.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling-window throughput estimator with a smoothed RTT.
///
/// Records `(when, bytes)` samples and averages over the most recent
/// `window`; RTT samples feed an exponential moving average (α = 1/8).
pub struct ThroughputEstimator {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
    smoothed_rtt_ns: u64,
}

impl ThroughputEstimator {
    /// Create an estimator with a 1-second rolling window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    /// Create an estimator with a custom window duration.
    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(128),
            window,
            total_bytes: 0,
            smoothed_rtt_ns: 0,
        }
    }

    /// Record that `bytes` of encoded data arrived this frame.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    /// Record with an explicit timestamp (useful for testing).
    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Fold one pose round-trip sample into the smoothed RTT.
    pub fn record_rtt(&mut self, rtt_ns: u64) {
        if self.smoothed_rtt_ns == 0 {
            self.smoothed_rtt_ns = rtt_ns;
        } else {
            // EWMA: srtt = 7/8 * srtt + 1/8 * sample
            self.smoothed_rtt_ns = self.smoothed_rtt_ns * 7 / 8 + rtt_ns / 8;
        }
    }

    /// Estimated downlink throughput in bytes/second over the window.
    pub fn estimate_bps(&self) -> u64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(&(first, _)), Some(&(last, _))) => (first, last),
            _ => return 0,
        };
        let elapsed = last.duration_since(first);
        let elapsed = if elapsed.is_zero() {
            Duration::from_millis(1)
        } else {
            elapsed
        };
        (self.total_bytes as f64 / elapsed.as_secs_f64()) as u64
    }

    /// Smoothed pose round-trip time; zero until first measured.
    pub fn smoothed_rtt(&self) -> Duration {
        Duration::from_nanos(self.smoothed_rtt_ns)
    }

    /// Number of samples currently in the window.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputEstimator {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
