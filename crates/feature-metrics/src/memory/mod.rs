//! In-memory [`MetricSink`] for tests and single-process deployments.
//!
//! Instruments live in a sharded concurrent map keyed by name plus sorted
//! tags. First-time registration goes through the map's entry API, so racing
//! registrations of one key resolve to exactly one winning instrument
//! without a global lock. A separate name-to-kind table enforces that a
//! metric name keeps one instrument kind for the sink's lifetime.
//!
//! The sink never performs I/O and never raises
//! [`MetricsError::SinkUnavailable`]; that variant exists for remote
//! backends. Exporters walk [`InMemorySink::snapshot`] instead.

mod histogram;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use self::histogram::LatencyHistogram;
use crate::descriptor::require_non_blank;
use crate::error::{MetricsError, Result};
use crate::sink::{
    CounterHandle, GaugeHandle, InstrumentKind, MetricSink, Tag, TimerConfig, TimerHandle,
    ValueSource,
};

/// Identity of a series: metric name plus its tag pairs in sorted order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    name: String,
    tags: Vec<(String, String)>,
}

impl SeriesKey {
    fn new(name: &str, tags: &[Tag]) -> Self {
        let mut tags: Vec<(String, String)> = tags
            .iter()
            .map(|tag| (tag.key.clone(), tag.value.clone()))
            .collect();
        tags.sort();
        Self {
            name: name.to_string(),
            tags,
        }
    }
}

/// Lock-free f64 accumulator.
///
/// The total is stored as raw bits and updated with a compare-exchange loop,
/// so concurrent increments are never lost.
struct CounterCell {
    bits: AtomicU64,
}

impl CounterCell {
    fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
        }
    }
}

impl CounterHandle for CounterCell {
    fn increment(&self, amount: f64) -> Result<()> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(MetricsError::InvalidArgument(format!(
                "counter increment must be a non-negative finite number, got {amount}"
            )));
        }
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + amount).to_bits();
            match self
                .bits
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    fn count(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Stores the registered value source and re-invokes it per sample.
struct GaugeCell {
    source: ValueSource,
}

impl GaugeHandle for GaugeCell {
    fn value(&self) -> f64 {
        (self.source)()
    }
}

/// Count, total and max atomics plus an optional bucketed distribution.
struct TimerCell {
    samples: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
    histogram: Option<LatencyHistogram>,
    percentiles: Vec<f64>,
}

impl TimerCell {
    fn new(config: &TimerConfig) -> Self {
        Self {
            samples: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
            max_nanos: AtomicU64::new(0),
            histogram: config
                .histogram
                .then(|| LatencyHistogram::new(config.min_expected, config.max_expected)),
            percentiles: config.percentiles.clone(),
        }
    }
}

impl TimerHandle for TimerCell {
    fn record(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.samples.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);

        let mut current = self.max_nanos.load(Ordering::Relaxed);
        while nanos > current {
            match self.max_nanos.compare_exchange_weak(
                current,
                nanos,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        if let Some(histogram) = &self.histogram {
            histogram.observe(duration);
        }
    }

    fn count(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    fn total_time(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }

    fn max(&self) -> Duration {
        Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed))
    }

    fn percentile(&self, p: f64) -> Option<Duration> {
        if !(p > 0.0 && p < 1.0) {
            return None;
        }
        self.histogram.as_ref()?.percentile(p)
    }
}

/// One registered instrument with its metadata.
enum Instrument {
    Counter {
        description: String,
        cell: Arc<CounterCell>,
    },
    Gauge {
        description: String,
        cell: Arc<GaugeCell>,
    },
    Timer {
        description: String,
        cell: Arc<TimerCell>,
    },
}

impl Instrument {
    fn kind(&self) -> InstrumentKind {
        match self {
            Self::Counter { .. } => InstrumentKind::Counter,
            Self::Gauge { .. } => InstrumentKind::Gauge,
            Self::Timer { .. } => InstrumentKind::Timer,
        }
    }
}

/// Point-in-time value of one registered series.
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    /// Accumulated counter total
    Counter(f64),
    /// Gauge value sampled at snapshot time
    Gauge(f64),
    /// Timer statistics, with one entry per configured percentile when a
    /// distribution is tracked
    Timer {
        /// Number of recorded samples
        count: u64,
        /// Sum of recorded samples
        total: Duration,
        /// Largest recorded sample
        max: Duration,
        /// `(percentile, estimate)` pairs in configuration order
        percentiles: Vec<(f64, Duration)>,
    },
}

/// Point-in-time view of one registered series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    /// Metric name
    pub name: String,
    /// Tag pairs in sorted order
    pub tags: Vec<Tag>,
    /// Description supplied at first registration
    pub description: String,
    /// Current value
    pub value: SeriesValue,
}

/// In-memory implementation of [`MetricSink`].
///
/// The default backend for tests and for single-process deployments that
/// export by walking [`snapshot`](Self::snapshot). Cheap to construct;
/// intended to be created once at startup and shared as
/// `Arc<InMemorySink>`.
#[derive(Default)]
pub struct InMemorySink {
    instruments: DashMap<SeriesKey, Instrument>,
    kinds: DashMap<String, InstrumentKind>,
}

impl InMemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an already registered counter by name and tags.
    #[must_use]
    pub fn find_counter(&self, name: &str, tags: &[Tag]) -> Option<Arc<dyn CounterHandle>> {
        match self.instruments.get(&SeriesKey::new(name, tags))?.value() {
            Instrument::Counter { cell, .. } => Some(Arc::clone(cell) as Arc<dyn CounterHandle>),
            _ => None,
        }
    }

    /// Look up an already registered gauge by name and tags.
    #[must_use]
    pub fn find_gauge(&self, name: &str, tags: &[Tag]) -> Option<Arc<dyn GaugeHandle>> {
        match self.instruments.get(&SeriesKey::new(name, tags))?.value() {
            Instrument::Gauge { cell, .. } => Some(Arc::clone(cell) as Arc<dyn GaugeHandle>),
            _ => None,
        }
    }

    /// Look up an already registered timer by name and tags.
    #[must_use]
    pub fn find_timer(&self, name: &str, tags: &[Tag]) -> Option<Arc<dyn TimerHandle>> {
        match self.instruments.get(&SeriesKey::new(name, tags))?.value() {
            Instrument::Timer { cell, .. } => Some(Arc::clone(cell) as Arc<dyn TimerHandle>),
            _ => None,
        }
    }

    /// Snapshot every registered series with its current value.
    ///
    /// Gauges are sampled during the walk, so their value sources run here.
    #[must_use]
    pub fn snapshot(&self) -> Vec<SeriesSnapshot> {
        self.instruments
            .iter()
            .map(|entry| {
                let key = entry.key();
                let (description, value) = match entry.value() {
                    Instrument::Counter { description, cell } => {
                        (description.clone(), SeriesValue::Counter(cell.count()))
                    }
                    Instrument::Gauge { description, cell } => {
                        (description.clone(), SeriesValue::Gauge(cell.value()))
                    }
                    Instrument::Timer { description, cell } => {
                        let percentiles = cell
                            .percentiles
                            .iter()
                            .filter_map(|&p| cell.percentile(p).map(|estimate| (p, estimate)))
                            .collect();
                        (
                            description.clone(),
                            SeriesValue::Timer {
                                count: cell.count(),
                                total: cell.total_time(),
                                max: cell.max(),
                                percentiles,
                            },
                        )
                    }
                };
                SeriesSnapshot {
                    name: key.name.clone(),
                    tags: key
                        .tags
                        .iter()
                        .map(|(key, value)| Tag::new(key.clone(), value.clone()))
                        .collect(),
                    description,
                    value,
                }
            })
            .collect()
    }

    /// Reserve `name` for `requested`, or fail if it already belongs to a
    /// different kind. The entry API holds the shard lock across the
    /// check-and-insert, so racing reservations have one winner.
    fn reserve_kind(&self, name: &str, requested: InstrumentKind) -> Result<()> {
        match self.kinds.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let existing = *entry.get();
                if existing == requested {
                    Ok(())
                } else {
                    Err(MetricsError::DuplicateRegistration {
                        name: name.to_string(),
                        existing,
                        requested,
                    })
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(requested);
                Ok(())
            }
        }
    }
}

impl MetricSink for InMemorySink {
    fn counter(
        &self,
        name: &str,
        description: &str,
        tags: &[Tag],
    ) -> Result<Arc<dyn CounterHandle>> {
        require_non_blank("metric name", name)?;
        self.reserve_kind(name, InstrumentKind::Counter)?;
        match self.instruments.entry(SeriesKey::new(name, tags)) {
            Entry::Occupied(entry) => match entry.get() {
                Instrument::Counter { cell, .. } => Ok(Arc::clone(cell) as Arc<dyn CounterHandle>),
                other => Err(MetricsError::DuplicateRegistration {
                    name: name.to_string(),
                    existing: other.kind(),
                    requested: InstrumentKind::Counter,
                }),
            },
            Entry::Vacant(entry) => {
                debug!(metric = name, kind = "counter", "registering instrument");
                let cell = Arc::new(CounterCell::new());
                entry.insert(Instrument::Counter {
                    description: description.to_string(),
                    cell: Arc::clone(&cell),
                });
                Ok(cell)
            }
        }
    }

    fn gauge(
        &self,
        name: &str,
        description: &str,
        tags: &[Tag],
        source: ValueSource,
    ) -> Result<Arc<dyn GaugeHandle>> {
        require_non_blank("metric name", name)?;
        self.reserve_kind(name, InstrumentKind::Gauge)?;
        match self.instruments.entry(SeriesKey::new(name, tags)) {
            Entry::Occupied(entry) => match entry.get() {
                Instrument::Gauge { cell, .. } => Ok(Arc::clone(cell) as Arc<dyn GaugeHandle>),
                other => Err(MetricsError::DuplicateRegistration {
                    name: name.to_string(),
                    existing: other.kind(),
                    requested: InstrumentKind::Gauge,
                }),
            },
            Entry::Vacant(entry) => {
                debug!(metric = name, kind = "gauge", "registering instrument");
                let cell = Arc::new(GaugeCell { source });
                entry.insert(Instrument::Gauge {
                    description: description.to_string(),
                    cell: Arc::clone(&cell),
                });
                Ok(cell)
            }
        }
    }

    fn timer(
        &self,
        name: &str,
        description: &str,
        tags: &[Tag],
        config: &TimerConfig,
    ) -> Result<Arc<dyn TimerHandle>> {
        require_non_blank("metric name", name)?;
        config.validate()?;
        self.reserve_kind(name, InstrumentKind::Timer)?;
        match self.instruments.entry(SeriesKey::new(name, tags)) {
            Entry::Occupied(entry) => match entry.get() {
                Instrument::Timer { cell, .. } => Ok(Arc::clone(cell) as Arc<dyn TimerHandle>),
                other => Err(MetricsError::DuplicateRegistration {
                    name: name.to_string(),
                    existing: other.kind(),
                    requested: InstrumentKind::Timer,
                }),
            },
            Entry::Vacant(entry) => {
                debug!(metric = name, kind = "timer", "registering instrument");
                let cell = Arc::new(TimerCell::new(config));
                entry.insert(Instrument::Timer {
                    description: description.to_string(),
                    cell: Arc::clone(&cell),
                });
                Ok(cell)
            }
        }
    }
}
