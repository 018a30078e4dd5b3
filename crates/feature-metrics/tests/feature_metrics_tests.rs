//! Integration tests for the feature metrics surface.
//!
//! Exercises the behavioral contracts end to end over the bundled
//! [`InMemorySink`]:
//! - get-or-create instrument sharing across bindings
//! - pull-based state gauge sampling
//! - stage tag normalization
//! - exactly-once latency recording on the success and panic paths
//! - series isolation across `feature` tags
//! - error propagation (kind conflicts, invalid arguments)

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use feature_metrics::{
    FeatureDescriptor, FeatureMetricsFactory, InMemorySink, InstrumentKind, MetricSink,
    MetricsError, Tag,
};

fn setup() -> (Arc<InMemorySink>, FeatureMetricsFactory) {
    let sink = Arc::new(InMemorySink::new());
    let factory = FeatureMetricsFactory::new(Arc::clone(&sink) as Arc<dyn MetricSink>);
    (sink, factory)
}

fn tags(feature_id: &str, stage: &str) -> Vec<Tag> {
    vec![Tag::new("feature", feature_id), Tag::new("stage", stage)]
}

#[test]
fn test_two_bindings_drive_the_same_instrument() {
    let (sink, factory) = setup();
    let descriptor = FeatureDescriptor::new("myapp", "feat1").unwrap();

    // value-equal descriptors, separately constructed bindings
    let first = factory.for_feature(&descriptor);
    let second = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());

    first.event_counter("ingest").unwrap().increment(2.0).unwrap();
    second.event_counter("ingest").unwrap().increment(3.0).unwrap();

    let found = sink
        .find_counter("myapp_feature_events_total", &tags("feat1", "ingest"))
        .unwrap();
    assert_eq!(found.count(), 5.0);
}

#[test]
fn test_state_gauge_tracks_live_condition_without_re_registration() {
    let (sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());

    let up = Arc::new(AtomicBool::new(true));
    let observed = Arc::clone(&up);
    metrics
        .feature_state_gauge(move || observed.load(Ordering::Relaxed), None)
        .unwrap();

    let gauge = sink
        .find_gauge("myapp_feature_state", &tags("feat1", ""))
        .unwrap();
    assert_eq!(gauge.value(), 1.0);

    // the underlying condition flips; the next sample sees it through the
    // same registered gauge
    up.store(false, Ordering::Relaxed);
    assert_eq!(gauge.value(), 0.0);
}

#[test]
fn test_omitted_stage_is_an_empty_tag_value_not_an_absent_tag() {
    let (sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());
    metrics.feature_state_gauge(|| true, None).unwrap();

    assert!(sink
        .find_gauge("myapp_feature_state", &tags("feat1", ""))
        .is_some());
    assert!(sink
        .find_gauge("myapp_feature_state", &[Tag::new("feature", "feat1")])
        .is_none());
}

#[test]
fn test_processing_timer_returns_result_and_records_one_sample() {
    let (sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());

    let result = metrics
        .processing_timer("proc", || {
            std::thread::sleep(Duration::from_millis(10));
            "ok"
        })
        .unwrap();
    assert_eq!(result, "ok");

    let timer = sink
        .find_timer("myapp_feature_processing_seconds", &tags("feat1", "proc"))
        .unwrap();
    assert_eq!(timer.count(), 1);
    assert!(timer.total_time() > Duration::ZERO);
}

#[test]
fn test_panicking_block_still_records_one_sample() {
    let (sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        metrics.processing_timer("failing", || -> &str { panic!("boom") })
    }));
    assert!(outcome.is_err(), "the panic must reach the caller");

    let timer = sink
        .find_timer(
            "myapp_feature_processing_seconds",
            &tags("feat1", "failing"),
        )
        .unwrap();
    assert_eq!(timer.count(), 1);
}

#[test]
fn test_series_do_not_merge_across_feature_tags() {
    let (sink, factory) = setup();

    let feat1 = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());
    let feat2 = factory.for_feature(&FeatureDescriptor::new("myapp", "feat2").unwrap());
    feat1.error_counter("processing").unwrap().increment(1.0).unwrap();
    feat2.error_counter("processing").unwrap().increment(3.0).unwrap();

    let first = sink
        .find_counter("myapp_feature_errors_total", &tags("feat1", "processing"))
        .unwrap();
    let second = sink
        .find_counter("myapp_feature_errors_total", &tags("feat2", "processing"))
        .unwrap();
    assert_eq!(first.count(), 1.0);
    assert_eq!(second.count(), 3.0);
}

#[test]
fn test_kind_conflict_surfaces_unchanged() {
    let (sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());
    metrics.event_counter("ingest").unwrap();

    // the same name registered directly against the sink as another kind
    let err = sink
        .timer(
            "myapp_feature_events_total",
            "conflicting",
            &tags("feat1", "ingest"),
            &feature_metrics::TimerConfig {
                percentiles: vec![0.5],
                histogram: false,
                min_expected: Duration::from_millis(1),
                max_expected: Duration::from_secs(1),
            },
        )
        .unwrap_err();
    assert!(matches!(
        err,
        MetricsError::DuplicateRegistration {
            existing: InstrumentKind::Counter,
            requested: InstrumentKind::Timer,
            ..
        }
    ));
}

#[test]
fn test_invalid_arguments_fail_synchronously() {
    let (_sink, factory) = setup();
    let metrics = factory.for_feature(&FeatureDescriptor::new("myapp", "feat1").unwrap());

    assert!(matches!(
        FeatureDescriptor::new("", "feat1"),
        Err(MetricsError::InvalidArgument(_))
    ));
    assert!(matches!(
        metrics.error_counter(" "),
        Err(MetricsError::InvalidArgument(_))
    ));
    let counter = metrics.error_counter("processing").unwrap();
    assert!(matches!(
        counter.increment(-1.0),
        Err(MetricsError::InvalidArgument(_))
    ));
    assert_eq!(counter.count(), 0.0);
}
