use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use opentelemetry_metrics_sdk::error::{OTelSdkError, OTelSdkResult};
use opentelemetry_metrics_sdk::metrics::data::{
    AggregatedMetrics, CollectionResult, MetricData, ResourceMetrics,
};
use opentelemetry_metrics_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_metrics_sdk::metrics::{
    Aggregation, CollectOptions, InstrumentKind, ManualReader, MetricCollector, MetricError,
    MetricReader, MetricResult, PeriodicReader, SdkMeterProvider, Temporality,
};
use opentelemetry_metrics_sdk::{KeyValue, Resource};
use rstest::rstest;

fn f64_total(collected: &CollectionResult, name: &str) -> Option<f64> {
    collected
        .resource_metrics
        .scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .find(|metric| metric.name == name)
        .map(|metric| match &metric.data {
            AggregatedMetrics::F64(MetricData::Sum(sum)) => {
                sum.data_points.iter().map(|dp| dp.value).sum()
            }
            other => panic!("expected an f64 sum, got {other:?}"),
        })
}

#[rstest]
#[case::cumulative(Temporality::Cumulative, vec![Some(5.0), Some(5.0), Some(9.0), Some(9.0)])]
#[case::delta(Temporality::Delta, vec![Some(5.0), None, Some(4.0), None])]
#[case::low_memory(Temporality::LowMemory, vec![Some(5.0), None, Some(4.0), None])]
fn counter_temporality(#[case] temporality: Temporality, #[case] expected: Vec<Option<f64>>) {
    let reader = ManualReader::builder()
        .with_temporality(temporality)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    let counter = provider.meter("test").f64_counter("counter").build();

    let mut results = Vec::new();
    counter.add(5.0, &[]);
    results.push(f64_total(&reader.collect().unwrap(), "counter"));
    results.push(f64_total(&reader.collect().unwrap(), "counter"));
    counter.add(1.5, &[]);
    counter.add(2.5, &[]);
    results.push(f64_total(&reader.collect().unwrap(), "counter"));
    results.push(f64_total(&reader.collect().unwrap(), "counter"));

    assert_eq!(results, expected);
}

/// A reader written outside the crate, sharing one collector between clones
/// and overriding the aggregation of histograms.
#[derive(Clone, Debug, Default)]
struct SharedReader {
    collector: Arc<Mutex<Option<Weak<MetricCollector>>>>,
}

impl MetricReader for SharedReader {
    fn register_collector(&self, collector: Weak<MetricCollector>) {
        *self.collector.lock().unwrap() = Some(collector);
    }

    fn collect(&self) -> MetricResult<CollectionResult> {
        let collector = self
            .collector
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(MetricError::AlreadyShutdown)?;
        collector.collect(CollectOptions::default())
    }

    fn force_flush(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        Temporality::Cumulative
    }

    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        match kind {
            InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
                boundaries: vec![10.0, 100.0],
                record_min_max: false,
            },
            _ => Aggregation::Default,
        }
    }
}

#[test]
fn custom_reader_selects_aggregation() {
    let reader = SharedReader::default();
    let provider = SdkMeterProvider::builder()
        .with_resource(Resource::builder_empty().with_service_name("svc").build())
        .with_reader(reader.clone())
        .build();
    let histogram = provider.meter("test").u64_histogram("size").build();
    for value in [1, 20, 200, 300] {
        histogram.record(value, &[KeyValue::new("kind", "upload")]);
    }

    let collected = reader.collect().unwrap();
    assert!(collected.errors.is_empty());
    let metric = &collected.resource_metrics.scope_metrics[0].metrics[0];
    let histogram = match &metric.data {
        AggregatedMetrics::U64(MetricData::Histogram(histogram)) => histogram,
        other => panic!("expected a histogram, got {other:?}"),
    };
    let point = &histogram.data_points[0];
    assert_eq!(point.bounds, vec![10.0, 100.0]);
    assert_eq!(point.bucket_counts, vec![1, 1, 2]);
    assert_eq!(point.count, 4);
    assert_eq!(point.sum, 521);
    assert_eq!(point.min, None);
    assert_eq!(point.max, None);

    provider.shutdown().unwrap();
    // the custom reader still holds a weak reference, the provider is done
    assert!(matches!(reader.collect(), Err(MetricError::AlreadyShutdown)));
}

/// Exporter that records how many data points it saw per export.
#[derive(Clone, Debug, Default)]
struct CountingExporter {
    exports: Arc<Mutex<Vec<usize>>>,
}

impl PushMetricExporter for CountingExporter {
    async fn export(&self, metrics: &ResourceMetrics) -> OTelSdkResult {
        let points = metrics
            .scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .map(|metric| match &metric.data {
                AggregatedMetrics::I64(MetricData::Sum(sum)) => sum.data_points.len(),
                _ => 0,
            })
            .sum();
        self.exports
            .lock()
            .map(|mut exports| exports.push(points))
            .map_err(|_| OTelSdkError::InternalFailure("poisoned".into()))
    }

    fn force_flush(&self) -> OTelSdkResult {
        Ok(())
    }

    fn shutdown_with_timeout(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    fn temporality(&self) -> Temporality {
        Temporality::Cumulative
    }
}

#[test]
fn periodic_and_manual_readers_coexist() {
    let exporter = CountingExporter::default();
    let manual = ManualReader::builder()
        .with_temporality(Temporality::Delta)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(PeriodicReader::builder(exporter.clone()).build())
        .with_reader(manual.clone())
        .build();
    let updown = provider.meter("test").i64_up_down_counter("active").build();

    updown.add(3, &[KeyValue::new("pool", "a")]);
    updown.add(-1, &[KeyValue::new("pool", "b")]);
    provider.force_flush().unwrap();

    // up-down counters stay cumulative for delta readers
    let collected = manual.collect().unwrap();
    let metric = &collected.resource_metrics.scope_metrics[0].metrics[0];
    assert_eq!(metric.data.temporality(), Some(Temporality::Cumulative));

    provider.shutdown().unwrap();
    assert_eq!(*exporter.exports.lock().unwrap(), vec![2, 2]);
}

#[test]
fn provider_resource_is_attached_to_every_collection() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder()
        .with_resource(
            Resource::builder_empty()
                .with_attributes([KeyValue::new("host.name", "test-host")])
                .build(),
        )
        .with_reader(reader.clone())
        .build();
    provider
        .meter("test")
        .u64_counter("requests")
        .build()
        .add(1, &[]);

    let collected = reader.collect().unwrap();
    assert_eq!(
        collected
            .resource_metrics
            .resource
            .get(&"host.name".into())
            .map(|value| value.to_string()),
        Some("test-host".to_string())
    );
}
