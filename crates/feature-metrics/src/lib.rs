//! Feature-scoped metrics instrumentation.
//!
//! Lets independently developed functional units ("features") of a larger
//! service emit consistently named, consistently tagged operational signals
//! — error counts, event counts, up/down state and processing-latency
//! distributions — into a shared metrics backend, without each feature
//! re-deriving naming conventions, tag discipline, or histogram
//! configuration.
//!
//! The application constructs one [`MetricSink`] at startup (the bundled
//! [`InMemorySink`] or any backend implementing the trait), wraps it in a
//! [`FeatureMetricsFactory`], and hands each feature a [`FeatureMetrics`]
//! for its [`FeatureDescriptor`]:
//!
//! ```
//! use std::sync::Arc;
//! use feature_metrics::{FeatureDescriptor, FeatureMetricsFactory, InMemorySink};
//!
//! # fn main() -> feature_metrics::Result<()> {
//! let sink = Arc::new(InMemorySink::new());
//! let factory = FeatureMetricsFactory::new(sink);
//! let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "ingestor")?);
//!
//! metrics.event_counter("ingest")?.increment(1.0)?;
//! let parsed = metrics.processing_timer("parse", || 21 * 2)?;
//! assert_eq!(parsed, 42);
//! # Ok(())
//! # }
//! ```
//!
//! Registration is get-or-create throughout: instruments are created once
//! and reused, and updates accumulate independently of which binding
//! requested the instrument. Instrumentation failures surface as
//! [`MetricsError`] and are never swallowed here — a feature that cannot
//! register its metrics should get to decide how to degrade.

#![warn(clippy::pedantic)]

/// Module for error types
pub mod error;

/// Module for feature identity values
pub mod descriptor;

/// Module for the sink abstraction and instrument handles
pub mod sink;

/// Module for the bundled in-memory sink
pub mod memory;

/// Module for per-feature instrument constructors
pub mod metrics;

/// Module for the factory entry point
pub mod factory;

pub use descriptor::FeatureDescriptor;
pub use error::{MetricsError, Result};
pub use factory::FeatureMetricsFactory;
pub use memory::{InMemorySink, SeriesSnapshot, SeriesValue};
pub use metrics::FeatureMetrics;
pub use sink::{
    CounterHandle, GaugeHandle, InstrumentKind, MetricSink, Tag, TimerConfig, TimerHandle,
    ValueSource,
};
