//! The shared registry abstraction instruments are registered into.
//!
//! A [`MetricSink`] is process-wide shared state: constructed once at
//! startup by the surrounding application, injected by reference into the
//! factory, and implemented by whatever monitoring backend the application
//! exports through. This crate bundles one implementation,
//! [`crate::memory::InMemorySink`].
//!
//! All metrics follow Prometheus naming conventions:
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration distributions
//!
//! Tag sets are bounded by the caller (feature id and stage labels), keeping
//! series cardinality predictable.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

/// A key/value label attached to an instrument for dimensional filtering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    /// Label key
    pub key: String,
    /// Label value
    pub value: String,
}

impl Tag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Kind of instrument a name is registered under.
///
/// A metric name belongs to exactly one kind for the lifetime of the sink;
/// re-registering it under another kind fails with
/// [`MetricsError::DuplicateRegistration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Monotonically non-decreasing total
    Counter,
    /// Lazily evaluated current value
    Gauge,
    /// Sample count plus duration distribution
    Timer,
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Timer => write!(f, "timer"),
        }
    }
}

/// Zero-argument value source backing a pull-based gauge.
///
/// The sink stores the source and invokes it exactly once per sample; the
/// evaluated value is never cached across samples.
pub type ValueSource = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Distribution configuration applied when a timer is first registered.
///
/// Backends must honor the configuration they are handed: publish the listed
/// percentiles and, when `histogram` is set, maintain buckets spanning the
/// expected sample range.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerConfig {
    /// Percentiles published for the distribution, each in `(0, 1)`
    pub percentiles: Vec<f64>,
    /// Whether to maintain histogram buckets in addition to percentiles
    pub histogram: bool,
    /// Lower bound of the expected sample range
    pub min_expected: Duration,
    /// Upper bound of the expected sample range
    pub max_expected: Duration,
}

impl TimerConfig {
    /// Check the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidArgument`] if a percentile falls
    /// outside `(0, 1)`, the expected range is empty, or its lower bound is
    /// zero.
    pub fn validate(&self) -> Result<()> {
        for p in &self.percentiles {
            if !(*p > 0.0 && *p < 1.0) {
                return Err(MetricsError::InvalidArgument(format!(
                    "percentile must be within (0, 1), got {p}"
                )));
            }
        }
        if self.min_expected.is_zero() {
            return Err(MetricsError::InvalidArgument(
                "minimum expected duration must be positive".to_string(),
            ));
        }
        if self.max_expected < self.min_expected {
            return Err(MetricsError::InvalidArgument(format!(
                "expected range is empty: {:?} > {:?}",
                self.min_expected, self.max_expected
            )));
        }
        Ok(())
    }
}

/// A monotonically non-decreasing total.
pub trait CounterHandle: Send + Sync {
    /// Add `amount` to the total.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidArgument`] if `amount` is negative or
    /// non-finite; the total never decreases.
    fn increment(&self, amount: f64) -> Result<()>;

    /// Accumulated total.
    fn count(&self) -> f64;
}

/// Current value of an externally supplied condition.
pub trait GaugeHandle: Send + Sync {
    /// Sample the gauge.
    ///
    /// Every call re-invokes the registered [`ValueSource`]; the result is
    /// never computed once and cached at registration time.
    fn value(&self) -> f64;
}

/// A sample count plus a duration distribution.
pub trait TimerHandle: Send + Sync {
    /// Record one elapsed-duration sample.
    fn record(&self, duration: Duration);

    /// Number of recorded samples.
    fn count(&self) -> u64;

    /// Sum of all recorded samples.
    fn total_time(&self) -> Duration;

    /// Largest recorded sample.
    fn max(&self) -> Duration;

    /// Estimate of the `p` percentile of the recorded distribution, or
    /// `None` when the timer tracks no distribution (histogram disabled or
    /// no samples yet).
    fn percentile(&self, p: f64) -> Option<Duration>;
}

/// Process-wide registry that creates or fetches named, tagged instruments
/// and reports their values to a monitoring backend.
///
/// # Contract
///
/// - Every method is get-or-create: calling it twice with an identical
///   `(name, tags)` key returns handles referring to the same underlying
///   instrument, and updates through either handle accumulate on that one
///   instrument.
/// - Concurrent first-time registrations racing on the same key resolve to
///   exactly one winning instrument; no duplicate series, no lost updates.
/// - A name already registered under a different instrument kind fails with
///   [`MetricsError::DuplicateRegistration`].
/// - Implementations own all synchronization; every method is safe under
///   unsynchronized concurrent invocation, completes in bounded time, and
///   performs no caller-visible I/O.
/// - Descriptions are metadata: the first registration's description is
///   kept, later ones are ignored.
///
/// A backend that cannot register or report fails with
/// [`MetricsError::SinkUnavailable`]; callers of this crate see that error
/// unchanged.
pub trait MetricSink: Send + Sync {
    /// Get or create the counter registered under `(name, tags)`.
    ///
    /// # Errors
    ///
    /// [`MetricsError::DuplicateRegistration`] on kind conflict,
    /// [`MetricsError::InvalidArgument`] for a blank name,
    /// [`MetricsError::SinkUnavailable`] from the backend.
    fn counter(&self, name: &str, description: &str, tags: &[Tag])
        -> Result<Arc<dyn CounterHandle>>;

    /// Get or create the gauge registered under `(name, tags)`.
    ///
    /// The `source` is stored and re-invoked on every sample. Under
    /// get-or-create, the first registration's source wins and later
    /// sources for the same key are dropped.
    ///
    /// # Errors
    ///
    /// [`MetricsError::DuplicateRegistration`] on kind conflict,
    /// [`MetricsError::InvalidArgument`] for a blank name,
    /// [`MetricsError::SinkUnavailable`] from the backend.
    fn gauge(
        &self,
        name: &str,
        description: &str,
        tags: &[Tag],
        source: ValueSource,
    ) -> Result<Arc<dyn GaugeHandle>>;

    /// Get or create the timer registered under `(name, tags)`, configured
    /// with `config` on first registration.
    ///
    /// # Errors
    ///
    /// [`MetricsError::DuplicateRegistration`] on kind conflict,
    /// [`MetricsError::InvalidArgument`] for a blank name or invalid
    /// `config`, [`MetricsError::SinkUnavailable`] from the backend.
    fn timer(
        &self,
        name: &str,
        description: &str,
        tags: &[Tag],
        config: &TimerConfig,
    ) -> Result<Arc<dyn TimerHandle>>;
}
