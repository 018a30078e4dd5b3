//! Entry point producing [`FeatureMetrics`] bindings over a shared sink.

use std::sync::Arc;

use crate::descriptor::FeatureDescriptor;
use crate::metrics::FeatureMetrics;
use crate::sink::MetricSink;

/// Produces [`FeatureMetrics`] instances over one shared [`MetricSink`].
///
/// The factory holds the only reference this crate keeps to the sink; the
/// sink itself is constructed once at process start by the surrounding
/// application, which also owns its lifecycle (and shutdown or flush, if
/// the backend requires one).
pub struct FeatureMetricsFactory {
    sink: Arc<dyn MetricSink>,
}

impl FeatureMetricsFactory {
    /// Create a factory over the application's shared sink.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricSink>) -> Self {
        Self { sink }
    }

    /// Build a binding for `descriptor`.
    ///
    /// Every call constructs a fresh [`FeatureMetrics`]; bindings are never
    /// cached or deduplicated. Only the instruments in the sink are: two
    /// bindings over value-equal descriptors drive the same underlying
    /// instruments whenever they request the same name and tag combination.
    #[must_use]
    pub fn for_feature(&self, descriptor: &FeatureDescriptor) -> FeatureMetrics {
        FeatureMetrics::new(Arc::clone(&self.sink), descriptor.clone())
    }
}
