//! Fixed-bucket latency histogram backing in-memory timers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Number of bucket boundaries spanning the expected sample range.
const BUCKET_COUNT: usize = 24;

/// Lock-free histogram with geometric bucket boundaries.
///
/// Boundaries span the timer's expected sample range. Samples below the
/// first boundary land in the first bucket; samples above the last land in
/// an overflow bucket, so percentile estimates never leave the configured
/// range. All operations use atomic counters.
pub(super) struct LatencyHistogram {
    /// Bucket upper boundaries in nanoseconds, ascending.
    boundaries: Vec<u64>,
    /// Per-bucket sample counts; one extra slot at the end for overflow.
    counts: Vec<AtomicU64>,
}

impl LatencyHistogram {
    /// Build geometric boundaries covering `[min, max]`.
    ///
    /// The range is assumed non-empty with a positive lower bound; the
    /// timer configuration is validated before a histogram is built.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(super) fn new(min: Duration, max: Duration) -> Self {
        let min_ns = saturating_nanos(min).max(1);
        let max_ns = saturating_nanos(max).max(min_ns);
        let ratio = (max_ns as f64 / min_ns as f64).powf(1.0 / (BUCKET_COUNT as f64 - 1.0));
        let mut boundaries: Vec<u64> = Vec::with_capacity(BUCKET_COUNT);
        let mut bound = min_ns as f64;
        for _ in 0..BUCKET_COUNT {
            boundaries.push(bound.round() as u64);
            bound *= ratio;
        }
        // rounding drift accumulates across the series; pin the top boundary
        // to the configured maximum
        if let Some(last) = boundaries.last_mut() {
            *last = max_ns;
        }
        let counts = (0..=BUCKET_COUNT).map(|_| AtomicU64::new(0)).collect();
        Self { boundaries, counts }
    }

    /// Record one sample.
    pub(super) fn observe(&self, duration: Duration) {
        let value_ns = saturating_nanos(duration);
        let slot = self
            .boundaries
            .iter()
            .position(|&boundary| value_ns <= boundary)
            .unwrap_or(self.boundaries.len());
        if let Some(count) = self.counts.get(slot) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Estimate the `p` percentile as the upper boundary of the bucket
    /// containing it. Returns `None` when no samples have been recorded.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(super) fn percentile(&self, p: f64) -> Option<Duration> {
        let counts: Vec<u64> = self
            .counts
            .iter()
            .map(|count| count.load(Ordering::Relaxed))
            .collect();
        let total: u64 = counts.iter().sum();
        if total == 0 {
            return None;
        }
        let target = ((total as f64) * p).ceil().max(1.0) as u64;
        let mut cumulative = 0u64;
        for (count, &boundary) in counts.iter().zip(self.boundaries.iter()) {
            cumulative += count;
            if cumulative >= target {
                return Some(Duration::from_nanos(boundary));
            }
        }
        // target falls in the overflow bucket; report the largest tracked
        // boundary rather than an unbounded value
        self.boundaries.last().map(|&ns| Duration::from_nanos(ns))
    }
}

/// Nanoseconds as `u64`, clamped rather than wrapped for pathological inputs.
fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
