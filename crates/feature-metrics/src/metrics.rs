//! Per-feature instrument constructors with the naming and tag convention
//! baked in.
//!
//! Every instrument a feature emits carries the same shape:
//! - name: `<application>_feature_<signal>` with the Prometheus `_total` /
//!   `_seconds` suffixes
//! - tags: `feature` (the feature id) and `stage` (a sub-phase label)
//!
//! Labels are bounded by the caller's stage vocabulary, so series
//! cardinality stays predictable across features.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::descriptor::{require_non_blank, FeatureDescriptor};
use crate::error::Result;
use crate::sink::{
    CounterHandle, GaugeHandle, MetricSink, Tag, TimerConfig, TimerHandle, ValueSource,
};

/// Percentiles published for feature processing timers.
const PROCESSING_PERCENTILES: [f64; 4] = [0.5, 0.9, 0.95, 0.99];

/// Expected processing latency range, bounding histogram buckets.
const PROCESSING_MIN_EXPECTED: Duration = Duration::from_millis(1);
const PROCESSING_MAX_EXPECTED: Duration = Duration::from_secs(5);

/// Binds one [`FeatureDescriptor`] to a [`MetricSink`] and hands out
/// instruments for that feature.
///
/// The binding itself is stateless: it may be built freely and repeatedly
/// for the same descriptor, and all accumulation lives in the sink. Two
/// bindings over equal descriptors drive the same underlying instruments
/// whenever they request the same name and tags.
pub struct FeatureMetrics {
    sink: Arc<dyn MetricSink>,
    descriptor: FeatureDescriptor,
}

impl FeatureMetrics {
    /// Bind `descriptor` to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MetricSink>, descriptor: FeatureDescriptor) -> Self {
        Self { sink, descriptor }
    }

    /// Descriptor this binding instruments on behalf of.
    #[must_use]
    pub fn descriptor(&self) -> &FeatureDescriptor {
        &self.descriptor
    }

    /// Counter of errors observed by this feature in `stage`.
    ///
    /// Registered as `<application>_feature_errors_total` with `feature` and
    /// `stage` tags. The instrument is created once and reused; repeated
    /// calls return handles onto the same total.
    ///
    /// # Errors
    ///
    /// [`crate::MetricsError::InvalidArgument`] for a blank stage; sink
    /// registration errors propagate unchanged.
    pub fn error_counter(&self, stage: &str) -> Result<Arc<dyn CounterHandle>> {
        require_non_blank("stage", stage)?;
        let name = format!("{}_feature_errors_total", self.descriptor.application());
        self.sink.counter(
            &name,
            "Total errors observed by a feature",
            &self.stage_tags(stage),
        )
    }

    /// Counter of events processed by this feature in `stage`.
    ///
    /// Registered as `<application>_feature_events_total`; otherwise
    /// identical to [`error_counter`](Self::error_counter).
    ///
    /// # Errors
    ///
    /// [`crate::MetricsError::InvalidArgument`] for a blank stage; sink
    /// registration errors propagate unchanged.
    pub fn event_counter(&self, stage: &str) -> Result<Arc<dyn CounterHandle>> {
        require_non_blank("stage", stage)?;
        let name = format!("{}_feature_events_total", self.descriptor.application());
        self.sink.counter(
            &name,
            "Total events processed by a feature",
            &self.stage_tags(stage),
        )
    }

    /// Pull-based up/down gauge for this feature.
    ///
    /// Registered as `<application>_feature_state`. Each time the backend
    /// samples the gauge it re-invokes `state` and reports 1 for `true`, 0
    /// for `false`; the value is never computed once and cached. An absent
    /// `stage` keeps a `stage=""` tag rather than dropping the tag, so
    /// series matching stays uniform across features.
    ///
    /// # Errors
    ///
    /// [`crate::MetricsError::InvalidArgument`] for a blank explicit stage;
    /// sink registration errors propagate unchanged.
    pub fn feature_state_gauge(
        &self,
        state: impl Fn() -> bool + Send + Sync + 'static,
        stage: Option<&str>,
    ) -> Result<Arc<dyn GaugeHandle>> {
        if let Some(stage) = stage {
            require_non_blank("stage", stage)?;
        }
        let name = format!("{}_feature_state", self.descriptor.application());
        let tags = self.stage_tags(stage.unwrap_or(""));
        let source: ValueSource = Arc::new(move || if state() { 1.0 } else { 0.0 });
        self.sink
            .gauge(&name, "Feature state (0=down, 1=up)", &tags, source)
    }

    /// Run `block` and record its latency for `stage`.
    ///
    /// Registered as `<application>_feature_processing_seconds` with
    /// percentiles {0.5, 0.9, 0.95, 0.99}, histogram buckets, and an
    /// expected range of 1ms to 5s. Exactly one elapsed wall-clock sample is
    /// recorded on every exit path: the recording lives in a drop guard, so
    /// a normal return and an unwinding panic both record before control
    /// leaves this call, and the panic continues to the caller unchanged.
    ///
    /// The block's result is returned unchanged on success.
    ///
    /// # Errors
    ///
    /// [`crate::MetricsError::InvalidArgument`] for a blank stage; sink
    /// registration errors propagate unchanged and `block` does not run.
    pub fn processing_timer<T>(&self, stage: &str, block: impl FnOnce() -> T) -> Result<T> {
        let timer = self.processing_timer_instrument(stage)?;
        let _guard = TimerRecordGuard::start(timer);
        Ok(block())
    }

    /// Run a future and record its latency for `stage`.
    ///
    /// Same instrument and recording contract as
    /// [`processing_timer`](Self::processing_timer), for cooperatively
    /// scheduled work: if the returned future is dropped before completion
    /// (task cancellation), the guard still records exactly one sample
    /// covering elapsed time up to the drop, and the cancellation itself
    /// propagates unchanged.
    ///
    /// # Errors
    ///
    /// [`crate::MetricsError::InvalidArgument`] for a blank stage; sink
    /// registration errors propagate unchanged and `block` is not polled.
    pub async fn processing_timer_async<T, F>(&self, stage: &str, block: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        let timer = self.processing_timer_instrument(stage)?;
        let _guard = TimerRecordGuard::start(timer);
        Ok(block.await)
    }

    fn processing_timer_instrument(&self, stage: &str) -> Result<Arc<dyn TimerHandle>> {
        require_non_blank("stage", stage)?;
        let name = format!(
            "{}_feature_processing_seconds",
            self.descriptor.application()
        );
        let config = TimerConfig {
            percentiles: PROCESSING_PERCENTILES.to_vec(),
            histogram: true,
            min_expected: PROCESSING_MIN_EXPECTED,
            max_expected: PROCESSING_MAX_EXPECTED,
        };
        self.sink.timer(
            &name,
            "Feature processing latency",
            &self.stage_tags(stage),
            &config,
        )
    }

    fn stage_tags(&self, stage: &str) -> [Tag; 2] {
        [
            Tag::new("feature", self.descriptor.feature_id()),
            Tag::new("stage", stage),
        ]
    }
}

/// Records one elapsed-time sample into a timer when dropped.
///
/// The timing sample is a scoped resource: holding the guard across the
/// instrumented work means `Drop` runs exactly once on normal return, panic
/// unwind, or future drop.
struct TimerRecordGuard {
    timer: Arc<dyn TimerHandle>,
    started: Instant,
}

impl TimerRecordGuard {
    fn start(timer: Arc<dyn TimerHandle>) -> Self {
        Self {
            timer,
            started: Instant::now(),
        }
    }
}

impl Drop for TimerRecordGuard {
    fn drop(&mut self) {
        self.timer.record(self.started.elapsed());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::error::MetricsError;
    use crate::memory::InMemorySink;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn setup() -> (Arc<InMemorySink>, FeatureMetrics) {
        let sink = Arc::new(InMemorySink::new());
        let descriptor = FeatureDescriptor::new("myapp", "feat1").unwrap();
        let metrics = FeatureMetrics::new(Arc::clone(&sink) as Arc<dyn MetricSink>, descriptor);
        (sink, metrics)
    }

    fn tags(stage: &str) -> Vec<Tag> {
        vec![Tag::new("feature", "feat1"), Tag::new("stage", stage)]
    }

    #[test]
    fn test_error_counter_registers_with_tags_and_increments() {
        let (sink, metrics) = setup();
        metrics
            .error_counter("processing")
            .unwrap()
            .increment(2.0)
            .unwrap();

        let found = sink
            .find_counter("myapp_feature_errors_total", &tags("processing"))
            .unwrap();
        assert_eq!(found.count(), 2.0);
    }

    #[test]
    fn test_event_counter_registers_with_tags_and_increments() {
        let (sink, metrics) = setup();
        metrics
            .event_counter("ingest")
            .unwrap()
            .increment(3.0)
            .unwrap();

        let found = sink
            .find_counter("myapp_feature_events_total", &tags("ingest"))
            .unwrap();
        assert_eq!(found.count(), 3.0);
    }

    #[test]
    fn test_counters_reject_blank_stage() {
        let (_sink, metrics) = setup();
        assert!(matches!(
            metrics.error_counter(" "),
            Err(MetricsError::InvalidArgument(_))
        ));
        assert!(matches!(
            metrics.event_counter(""),
            Err(MetricsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_state_gauge_reports_one_when_up_and_zero_when_down() {
        let (sink, metrics) = setup();
        let up = Arc::new(AtomicBool::new(true));
        let observed = Arc::clone(&up);
        metrics
            .feature_state_gauge(move || observed.load(Ordering::Relaxed), None)
            .unwrap();

        let gauge = sink.find_gauge("myapp_feature_state", &tags("")).unwrap();
        assert_eq!(gauge.value(), 1.0);
        up.store(false, Ordering::Relaxed);
        assert_eq!(gauge.value(), 0.0);
    }

    #[test]
    fn test_state_gauge_omitted_stage_keeps_empty_tag() {
        let (sink, metrics) = setup();
        metrics.feature_state_gauge(|| true, None).unwrap();

        // the stage tag is present with an empty value, not dropped
        assert!(sink.find_gauge("myapp_feature_state", &tags("")).is_some());
        assert!(sink
            .find_gauge(
                "myapp_feature_state",
                &[Tag::new("feature", "feat1")],
            )
            .is_none());
    }

    #[test]
    fn test_state_gauge_explicit_stage_tagged() {
        let (sink, metrics) = setup();
        metrics
            .feature_state_gauge(|| false, Some("discovery"))
            .unwrap();

        let gauge = sink
            .find_gauge("myapp_feature_state", &tags("discovery"))
            .unwrap();
        assert_eq!(gauge.value(), 0.0);
    }

    #[test]
    fn test_state_gauge_rejects_blank_explicit_stage() {
        let (_sink, metrics) = setup();
        assert!(matches!(
            metrics.feature_state_gauge(|| true, Some("  ")),
            Err(MetricsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_processing_timer_records_one_sample_and_returns_result() {
        let (sink, metrics) = setup();
        let result = metrics
            .processing_timer("proc", || {
                std::thread::sleep(Duration::from_millis(10));
                "ok"
            })
            .unwrap();
        assert_eq!(result, "ok");

        let timer = sink
            .find_timer("myapp_feature_processing_seconds", &tags("proc"))
            .unwrap();
        assert_eq!(timer.count(), 1);
        assert!(timer.total_time() > Duration::ZERO);
    }

    #[test]
    fn test_processing_timer_reuses_one_instrument_across_calls() {
        let (sink, metrics) = setup();
        metrics.processing_timer("proc", || ()).unwrap();
        metrics.processing_timer("proc", || ()).unwrap();

        let timer = sink
            .find_timer("myapp_feature_processing_seconds", &tags("proc"))
            .unwrap();
        assert_eq!(timer.count(), 2);
    }

    #[test]
    fn test_processing_timer_rejects_blank_stage_without_running_block() {
        let (_sink, metrics) = setup();
        let ran = Arc::new(AtomicBool::new(false));
        let observed = Arc::clone(&ran);
        let result = metrics.processing_timer(" ", move || {
            observed.store(true, Ordering::Relaxed);
        });
        assert!(matches!(result, Err(MetricsError::InvalidArgument(_))));
        assert!(!ran.load(Ordering::Relaxed));
    }
}
