//! The core of the metrics pipeline.
//!
//! ## Configuration
//!
//! Each [SdkMeterProvider] owns a [Resource], the cardinality limit applied to
//! every instrument, and any number of readers. Readers are either pulled on
//! demand ([ManualReader]) or push to an exporter on an interval
//! ([PeriodicReader]). Every reader picks its own [Temporality] and
//! [Aggregation] per instrument kind.
//!
//! ### Example
//!
//! ```
//! use opentelemetry_metrics_sdk::metrics::{ManualReader, SdkMeterProvider, Temporality};
//! use opentelemetry_metrics_sdk::{KeyValue, Resource};
//!
//! let resource = Resource::builder().build(); // default attributes about the current process
//!
//! let reader = ManualReader::builder()
//!     .with_temporality(Temporality::Delta)
//!     .build();
//! let meter_provider = SdkMeterProvider::builder()
//!     .with_resource(resource)
//!     .with_reader(reader.clone())
//!     .build();
//!
//! let meter = meter_provider.meter("my_app");
//! let counter = meter
//!     .u64_counter("power_consumption")
//!     .with_unit("kWh")
//!     .build();
//!
//! counter.add(10, &[KeyValue::new("rate", "standard")]);
//!
//! let collected = reader.collect().unwrap();
//! assert_eq!(collected.resource_metrics.scope_metrics.len(), 1);
//!
//! // shutdown the provider at the end of the application to ensure any metrics not yet
//! // exported are flushed.
//! meter_provider.shutdown().unwrap();
//! ```
//!
//! [Resource]: crate::Resource

pub(crate) mod aggregation;
pub(crate) mod attribute_set;
pub(crate) mod collector;
pub mod data;
mod error;
pub mod exporter;
pub(crate) mod instrument;
pub(crate) mod internal;
pub(crate) mod manual_reader;
pub(crate) mod meter;
mod meter_provider;
pub(crate) mod periodic_reader;
pub mod reader;

/// In-Memory metric exporter for testing purpose.
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub mod in_memory_exporter;
#[cfg(any(feature = "testing", test))]
#[cfg_attr(docsrs, doc(cfg(any(feature = "testing", test))))]
pub use in_memory_exporter::{InMemoryMetricExporter, InMemoryMetricExporterBuilder};

pub use aggregation::*;
pub use collector::{CollectOptions, CollectorId, MetricCollector};
pub use error::{MetricError, MetricResult};
pub use instrument::*;
pub use manual_reader::*;
pub use meter::Meter;
pub use meter_provider::*;
pub use periodic_reader::*;
pub use reader::{AggregationSelector, DefaultAggregationSelector, MetricReader};

use std::hash::Hash;

/// Defines the window that an aggregation was calculated over.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Temporality {
    /// A measurement interval that continues to expand forward in time from a
    /// starting point.
    ///
    /// New measurements are added to all previous measurements since a start time.
    #[default]
    Cumulative,

    /// A measurement interval that resets each cycle.
    ///
    /// Measurements from one cycle are recorded independently, measurements from
    /// other cycles do not affect them.
    Delta,

    /// Configures Synchronous Counter and Histogram instruments to use
    /// Delta aggregation temporality, which allows them to shed memory
    /// following a cardinality explosion, thus use less memory.
    LowMemory,
}

#[cfg(test)]
mod tests {
    use super::data::{
        AggregatedMetrics, CollectionResult, GaugeDataPoint, Metric, MetricData, ResourceMetrics,
        Sum,
    };
    use super::*;
    use crate::{InstrumentationScope, KeyValue};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    // Run all tests in this mod
    // cargo test metrics::tests

    struct TestContext {
        delta: ManualReader,
        cumulative: ManualReader,
        meter_provider: SdkMeterProvider,
    }

    impl TestContext {
        fn new() -> Self {
            Self::with_cardinality_limit(internal::STREAM_CARDINALITY_LIMIT)
        }

        fn with_cardinality_limit(limit: usize) -> Self {
            let delta = ManualReader::builder()
                .with_temporality(Temporality::Delta)
                .build();
            let cumulative = ManualReader::builder().build();
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(delta.clone())
                .with_reader(cumulative.clone())
                .with_cardinality_limit(limit)
                .build();

            TestContext {
                delta,
                cumulative,
                meter_provider,
            }
        }

        fn meter(&self) -> Meter {
            self.meter_provider.meter("test")
        }
    }

    fn find_metric<'a>(collected: &'a CollectionResult, name: &str) -> Option<&'a Metric> {
        collected
            .resource_metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .find(|metric| metric.name == name)
    }

    fn u64_sum<'a>(collected: &'a CollectionResult, name: &str) -> &'a Sum<u64> {
        match find_metric(collected, name).map(|metric| &metric.data) {
            Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => sum,
            other => panic!("expected a u64 sum for {name}, got {other:?}"),
        }
    }

    fn u64_total(collected: &CollectionResult, name: &str) -> u64 {
        u64_sum(collected, name)
            .data_points
            .iter()
            .map(|dp| dp.value)
            .sum()
    }

    #[test]
    fn delta_reset_is_independent_per_reader() {
        let ctx = TestContext::new();
        let counter = ctx.meter().u64_counter("requests").build();

        counter.add(5, &[KeyValue::new("key1", "value1")]);
        counter.add(3, &[KeyValue::new("key1", "value1")]);

        let delta = ctx.delta.collect().unwrap();
        let cumulative = ctx.cumulative.collect().unwrap();
        assert_eq!(u64_total(&delta, "requests"), 8);
        assert_eq!(u64_total(&cumulative, "requests"), 8);
        assert_eq!(u64_sum(&delta, "requests").temporality, Temporality::Delta);
        assert_eq!(
            u64_sum(&cumulative, "requests").temporality,
            Temporality::Cumulative
        );

        counter.add(2, &[KeyValue::new("key1", "value1")]);

        // collect in the opposite order
        let cumulative = ctx.cumulative.collect().unwrap();
        let delta = ctx.delta.collect().unwrap();
        assert_eq!(u64_total(&delta, "requests"), 2);
        assert_eq!(u64_total(&cumulative, "requests"), 10);
    }

    #[test]
    fn delta_collection_of_one_reader_does_not_drain_another() {
        let ctx = TestContext::new();
        let counter = ctx.meter().u64_counter("requests").build();
        counter.add(4, &[]);

        // several delta collections before the cumulative reader looks
        assert_eq!(u64_total(&ctx.delta.collect().unwrap(), "requests"), 4);
        assert!(find_metric(&ctx.delta.collect().unwrap(), "requests").is_none());

        assert_eq!(u64_total(&ctx.cumulative.collect().unwrap(), "requests"), 4);
    }

    #[test]
    fn failing_scope_does_not_hide_others() {
        let ctx = TestContext::new();
        let broken = ctx.meter_provider.meter("broken");
        let healthy = ctx.meter_provider.meter("healthy");

        let histogram = broken
            .f64_histogram("latency")
            .with_boundaries(vec![5.0, 1.0])
            .build();
        let counter = healthy.u64_counter("requests").build();
        histogram.record(2.0, &[]);
        counter.add(7, &[]);

        let collected = ctx.cumulative.collect().unwrap();
        let scopes = &collected.resource_metrics.scope_metrics;
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].scope.name(), "broken");
        assert!(scopes[0].metrics.is_empty());
        assert_eq!(scopes[1].scope.name(), "healthy");
        assert_eq!(u64_total(&collected, "requests"), 7);

        assert_eq!(collected.errors.len(), 1);
        match &collected.errors[0] {
            MetricError::Aggregation {
                scope, instrument, ..
            } => {
                assert_eq!(scope, "broken");
                assert_eq!(instrument, "latency");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn panicking_callback_is_reported() {
        let ctx = TestContext::new();
        let meter = ctx.meter();
        let _gauge = meter
            .u64_observable_gauge("exploding")
            .with_callback(|_| panic!("callback failure"))
            .build();
        let counter = meter.u64_counter("requests").build();
        counter.add(1, &[]);

        let collected = ctx.cumulative.collect().unwrap();
        assert_eq!(u64_total(&collected, "requests"), 1);
        assert!(matches!(
            collected.errors.as_slice(),
            [MetricError::CallbackPanicked { scope }] if scope == "test"
        ));
    }

    #[test]
    fn collect_after_shutdown_is_rejected() {
        let ctx = TestContext::new();
        ctx.meter().u64_counter("requests").build().add(1, &[]);

        ctx.meter_provider.shutdown().unwrap();
        for _ in 0..2 {
            assert!(matches!(
                ctx.delta.collect(),
                Err(MetricError::AlreadyShutdown)
            ));
            assert!(matches!(
                ctx.cumulative.collect(),
                Err(MetricError::AlreadyShutdown)
            ));
        }
        assert!(ctx.meter_provider.shutdown().is_ok());
    }

    #[test]
    fn scopes_share_one_collection_time() {
        let ctx = TestContext::new();
        for name in ["a", "b", "c", "d"] {
            ctx.meter_provider
                .meter(name)
                .u64_counter("requests")
                .build()
                .add(1, &[]);
        }
        ctx.meter_provider
            .meter("e")
            .f64_gauge("temperature")
            .build()
            .record(20.5, &[]);

        let collected = ctx.delta.collect().unwrap();
        let scopes = &collected.resource_metrics.scope_metrics;
        assert_eq!(scopes.len(), 5);
        let names: Vec<&str> = scopes.iter().map(|s| s.scope.name()).collect();
        assert_eq!(names, ["a", "b", "c", "d", "e"]);

        let times: Vec<_> = scopes
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .map(|metric| metric.data.time())
            .collect();
        assert!(times.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn concurrent_recording_and_delta_collection_loses_nothing() {
        let ctx = TestContext::new();
        let counter = ctx.meter().u64_counter("requests").build();
        let done = Arc::new(AtomicBool::new(false));
        let recorded = Arc::new(AtomicU64::new(0));

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let counter = counter.clone();
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || {
                    let attributes = [KeyValue::new("writer", i as i64)];
                    for _ in 0..10_000 {
                        counter.add(1, &attributes);
                        recorded.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();

        let collector = {
            let reader = ctx.delta.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut seen = 0;
                while !done.load(Ordering::Acquire) {
                    let collected = reader.collect().unwrap();
                    if find_metric(&collected, "requests").is_some() {
                        seen += u64_total(&collected, "requests");
                    }
                    thread::yield_now();
                }
                seen
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        done.store(true, Ordering::Release);
        let mut seen = collector.join().unwrap();

        let last = ctx.delta.collect().unwrap();
        if find_metric(&last, "requests").is_some() {
            seen += u64_total(&last, "requests");
        }

        assert_eq!(seen, recorded.load(Ordering::Relaxed));
        assert_eq!(seen, 40_000);
        assert_eq!(u64_total(&ctx.cumulative.collect().unwrap(), "requests"), 40_000);
    }

    #[test]
    fn last_value_follows_recording_order() {
        let ctx = TestContext::new();
        let gauge = ctx.meter().i64_gauge("queue_depth").build();

        gauge.record(
            1,
            &[KeyValue::new("a", "1"), KeyValue::new("b", "2")],
        );
        gauge.record(
            -4,
            &[KeyValue::new("b", "2"), KeyValue::new("a", "1")],
        );

        let collected = ctx.cumulative.collect().unwrap();
        let gauge = match find_metric(&collected, "queue_depth").map(|m| &m.data) {
            Some(AggregatedMetrics::I64(MetricData::Gauge(gauge))) => gauge,
            other => panic!("expected an i64 gauge, got {other:?}"),
        };
        assert_eq!(gauge.data_points.len(), 1);
        let GaugeDataPoint { value, attributes } = &gauge.data_points[0];
        assert_eq!(*value, -4);
        assert_eq!(attributes.len(), 2);
    }

    #[test]
    fn overflow_folds_into_overflow_series() {
        let ctx = TestContext::with_cardinality_limit(3);
        let counter = ctx.meter().u64_counter("requests").build();
        for i in 0..10 {
            counter.add(1, &[KeyValue::new("user", i as i64)]);
        }

        let collected = ctx.cumulative.collect().unwrap();
        let sum = u64_sum(&collected, "requests");
        assert_eq!(u64_total(&collected, "requests"), 10);
        let overflow = sum
            .data_points
            .iter()
            .find(|dp| dp.attributes == [KeyValue::new("otel.metric.overflow", true)])
            .expect("overflow series present");
        assert!(overflow.value > 0);

        assert!(matches!(
            collected.errors.as_slice(),
            [MetricError::CardinalityLimitExceeded { instrument, limit: 3, .. }] if instrument == "requests"
        ));
        assert!(collected.errors[0].is_warning());
    }

    #[test]
    fn observable_counter_reports_deltas_per_reader() {
        let ctx = TestContext::new();
        let total = Arc::new(AtomicU64::new(0));
        let observed = Arc::clone(&total);
        let _counter = ctx
            .meter()
            .u64_observable_counter("bytes_sent")
            .with_callback(move |observer| {
                observer.observe(observed.load(Ordering::Relaxed), &[])
            })
            .build();

        total.store(100, Ordering::Relaxed);
        assert_eq!(u64_total(&ctx.delta.collect().unwrap(), "bytes_sent"), 100);

        total.store(130, Ordering::Relaxed);
        assert_eq!(u64_total(&ctx.delta.collect().unwrap(), "bytes_sent"), 30);
        assert_eq!(
            u64_total(&ctx.cumulative.collect().unwrap(), "bytes_sent"),
            130
        );

        total.store(180, Ordering::Relaxed);
        assert_eq!(u64_total(&ctx.delta.collect().unwrap(), "bytes_sent"), 50);
    }

    #[test]
    fn collect_timeout_skips_remaining_instruments() {
        let ctx = TestContext::new();
        let meter = ctx.meter();
        meter.u64_counter("first").build().add(1, &[]);
        meter.u64_counter("second").build().add(1, &[]);

        let collected = ctx.cumulative.collect_with_timeout(Duration::ZERO).unwrap();
        let scopes = &collected.resource_metrics.scope_metrics;
        assert_eq!(scopes.len(), 1);
        assert!(scopes[0].metrics.is_empty());
        assert!(matches!(
            collected.errors.as_slice(),
            [MetricError::Timeout { skipped: 2, .. }]
        ));

        // nothing was drained, the next collection sees everything
        let collected = ctx.cumulative.collect().unwrap();
        assert_eq!(u64_total(&collected, "first"), 1);
        assert_eq!(u64_total(&collected, "second"), 1);
    }

    #[test]
    fn low_memory_resolves_per_kind() {
        let reader = ManualReader::builder()
            .with_temporality(Temporality::LowMemory)
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader.clone())
            .build();
        let meter = provider.meter("test");
        meter.u64_counter("counter").build().add(1, &[]);
        meter.i64_up_down_counter("updown").build().add(1, &[]);

        let collected = reader.collect().unwrap();
        let temporality = |name| {
            find_metric(&collected, name)
                .and_then(|metric| metric.data.temporality())
                .unwrap()
        };
        assert_eq!(temporality("counter"), Temporality::Delta);
        assert_eq!(temporality("updown"), Temporality::Cumulative);
    }

    #[test]
    fn meter_with_scope_keeps_scopes_apart() {
        let ctx = TestContext::new();
        let v1 = ctx
            .meter_provider
            .meter_with_scope(InstrumentationScope::builder("lib").with_version("1").build());
        let v2 = ctx
            .meter_provider
            .meter_with_scope(InstrumentationScope::builder("lib").with_version("2").build());
        v1.u64_counter("requests").build().add(1, &[]);
        v2.u64_counter("requests").build().add(2, &[]);

        let collected = ctx.cumulative.collect().unwrap();
        let scopes = &collected.resource_metrics.scope_metrics;
        assert_eq!(scopes.len(), 2);
        assert_eq!(scopes[0].scope.version(), Some("1"));
        assert_eq!(scopes[1].scope.version(), Some("2"));
    }

    #[test]
    fn periodic_reader_exports_on_flush_and_shutdown() {
        let exporter = InMemoryMetricExporterBuilder::new()
            .with_temporality(Temporality::Delta)
            .build();
        let meter_provider = SdkMeterProvider::builder()
            .with_periodic_exporter(exporter.clone())
            .build();
        let counter = meter_provider.meter("test").u64_counter("requests").build();

        counter.add(5, &[]);
        meter_provider.force_flush().unwrap();
        counter.add(2, &[]);
        meter_provider.shutdown().unwrap();

        let exported: Vec<ResourceMetrics> = exporter.get_finished_metrics().unwrap();
        let totals: Vec<u64> = exported
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .flat_map(|scope| scope.metrics.iter())
            .map(|metric| match &metric.data {
                AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                    sum.data_points.iter().map(|dp| dp.value).sum()
                }
                other => panic!("unexpected data {other:?}"),
            })
            .collect();
        assert_eq!(totals, [5, 2]);
        assert!(exporter.is_shutdown());
    }

    #[test]
    fn selected_aggregation_sees_measurements_before_first_collect() {
        let summing = ManualReader::builder()
            .with_temporality(Temporality::Delta)
            .with_aggregation_selector(|kind: InstrumentKind| match kind {
                InstrumentKind::Histogram => Aggregation::Sum,
                _ => Aggregation::Default,
            })
            .build();
        let buckets = ManualReader::builder().build();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(summing.clone())
            .with_reader(buckets.clone())
            .build();
        let histogram = meter_provider.meter("test").f64_histogram("latency").build();

        histogram.record(3.0, &[]);
        histogram.record(4.0, &[]);

        let collected = summing.collect().unwrap();
        assert!(collected.errors.is_empty());
        match find_metric(&collected, "latency").map(|metric| &metric.data) {
            Some(AggregatedMetrics::F64(MetricData::Sum(sum))) => {
                assert_eq!(sum.data_points.len(), 1);
                assert_eq!(sum.data_points[0].value, 7.0);
            }
            other => panic!("expected an f64 sum, got {other:?}"),
        }

        let collected = buckets.collect().unwrap();
        match find_metric(&collected, "latency").map(|metric| &metric.data) {
            Some(AggregatedMetrics::F64(MetricData::Histogram(histogram))) => {
                assert_eq!(histogram.data_points[0].count, 2);
                assert_eq!(histogram.data_points[0].sum, 7.0);
            }
            other => panic!("expected an f64 histogram, got {other:?}"),
        }
    }

    #[test]
    fn oversized_timeouts_mean_no_deadline() {
        let ctx = TestContext::new();
        ctx.meter().u64_counter("requests").build().add(3, &[]);

        let collected = ctx.cumulative.collect_with_timeout(Duration::MAX).unwrap();
        assert!(collected.errors.is_empty());
        assert_eq!(u64_total(&collected, "requests"), 3);

        ctx.meter_provider
            .force_flush_with_timeout(Duration::MAX)
            .unwrap();
        ctx.meter_provider.shutdown_with_timeout(Duration::MAX).unwrap();
        assert!(matches!(
            ctx.delta.collect(),
            Err(MetricError::AlreadyShutdown)
        ));
        assert!(matches!(
            ctx.cumulative.collect(),
            Err(MetricError::AlreadyShutdown)
        ));
    }

    #[test]
    fn periodic_reader_accepts_oversized_timeout() {
        let exporter = InMemoryMetricExporter::default();
        let meter_provider = SdkMeterProvider::builder()
            .with_reader(
                PeriodicReader::builder(exporter.clone())
                    .with_timeout(Duration::MAX)
                    .build(),
            )
            .build();
        meter_provider
            .meter("test")
            .u64_counter("requests")
            .build()
            .add(1, &[]);

        meter_provider.shutdown_with_timeout(Duration::MAX).unwrap();
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
        assert!(exporter.is_shutdown());
    }

    #[test]
    fn scopes_keep_their_position_across_collections() {
        let ctx = TestContext::new();
        let first = ctx.meter_provider.meter("first").u64_counter("a").build();
        let second = ctx.meter_provider.meter("second").u64_counter("b").build();
        first.add(1, &[]);
        second.add(1, &[]);
        ctx.delta.collect().unwrap();

        second.add(1, &[]);
        let collected = ctx.delta.collect().unwrap();
        let scopes = &collected.resource_metrics.scope_metrics;
        let names: Vec<&str> = scopes.iter().map(|scope| scope.scope.name()).collect();
        assert_eq!(names, ["first", "second"]);
        assert!(scopes[0].metrics.is_empty());
        assert_eq!(scopes[1].metrics[0].name, "b");
    }
}
