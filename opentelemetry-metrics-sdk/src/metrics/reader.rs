//! Interfaces for reading and producing metrics
use std::{fmt, sync::Weak, time::Duration};

use crate::error::OTelSdkResult;

use super::{
    aggregation::Aggregation, collector::MetricCollector, data::CollectionResult,
    error::MetricResult, InstrumentKind, Temporality,
};

/// The policy and lifecycle interface a consumer of metrics implements.
///
/// Control flow is bi-directional through the `MetricReader`, since the SDK
/// initiates `force_flush` and `shutdown` while the reader initiates
/// collection. The `register_collector` method here informs the metric reader
/// that it can begin reading, signaling the start of bi-directional control
/// flow.
///
/// Typically, push-based exporters that are periodic will implement
/// [`PushMetricExporter`] themselves and construct a [`PeriodicReader`] to
/// satisfy this interface.
///
/// Pull-based exporters will typically implement `MetricReader` themselves,
/// since they read on demand.
///
/// [`PushMetricExporter`]: crate::metrics::exporter::PushMetricExporter
/// [`PeriodicReader`]: crate::metrics::PeriodicReader
pub trait MetricReader: fmt::Debug + Send + Sync + 'static {
    /// Hands the reader the [MetricCollector] created for it.
    ///
    /// The collector allows the `MetricReader` to signal the sdk to collect
    /// aggregated metric measurements. The reference is weak: once the
    /// provider is gone, collecting fails.
    fn register_collector(&self, collector: Weak<MetricCollector>);

    /// Gathers and returns all metric data related to the [MetricReader].
    ///
    /// An error is returned if this is called after shutdown or before the
    /// reader was registered with a provider.
    fn collect(&self) -> MetricResult<CollectionResult>;

    /// Flushes all metric measurements held in an export pipeline.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources have
    /// been released on error.
    fn force_flush(&self, timeout: Duration) -> OTelSdkResult;

    /// Flushes all metric measurements held in an export pipeline and releases any
    /// held computational resources.
    ///
    /// After `shutdown` is called, calls to `collect` will perform no operation and
    /// instead will return an error indicating the shutdown state.
    fn shutdown(&self, timeout: Duration) -> OTelSdkResult;

    /// The output temporality, a function of instrument kind.
    /// This SHOULD be obtained from the exporter.
    ///
    /// If not configured, the Cumulative temporality SHOULD be used.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;

    /// The output aggregation, a function of instrument kind.
    ///
    /// Asked again on every collection.
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        let _ = kind;
        Aggregation::Default
    }
}

/// An interface for selecting the aggregation and the parameters for an
/// [InstrumentKind].
pub trait AggregationSelector: Send + Sync {
    /// Selects the aggregation and the parameters to use for that aggregation based on
    /// the [InstrumentKind].
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation;
}

impl<T> AggregationSelector for T
where
    T: Fn(InstrumentKind) -> Aggregation + Send + Sync,
{
    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self(kind)
    }
}

/// The default aggregation and parameters for an instrument of [InstrumentKind].
///
/// This [AggregationSelector] uses the following selection mapping:
///
/// * Counter ⇨ Sum
/// * Observable Counter ⇨ Sum
/// * UpDownCounter ⇨ Sum
/// * Observable UpDownCounter ⇨ Sum
/// * Gauge ⇨ LastValue
/// * Observable Gauge ⇨ LastValue
/// * Histogram ⇨ ExplicitBucketHistogram
#[derive(Clone, Default, Debug)]
pub struct DefaultAggregationSelector {
    pub(crate) _private: (),
}

impl DefaultAggregationSelector {
    /// Create a new default aggregation selector.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AggregationSelector for DefaultAggregationSelector {
    fn aggregation(&self, _kind: InstrumentKind) -> Aggregation {
        Aggregation::Default
    }
}
