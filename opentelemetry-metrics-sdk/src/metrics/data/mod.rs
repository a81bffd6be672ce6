//! Types for delivery of pre-aggregated metric time series data.

use std::{borrow::Cow, time::SystemTime};

use crate::{InstrumentationScope, KeyValue, Resource};

use super::error::MetricError;
use super::instrument::InstrumentDescriptor;
use super::Temporality;

/// The outcome of one collection by one reader.
///
/// Partial failures do not abort a collection: `errors` lists every scope or
/// instrument that could not be collected, and `resource_metrics` still holds
/// everything that could.
#[derive(Debug)]
pub struct CollectionResult {
    /// The collected data.
    pub resource_metrics: ResourceMetrics,
    /// Errors and warnings raised while collecting, in scope order.
    pub errors: Vec<MetricError>,
}

/// A collection of [ScopeMetrics] and the associated [Resource] that created them.
#[derive(Debug, Clone)]
pub struct ResourceMetrics {
    /// The entity that collected the metrics.
    pub resource: Resource,
    /// The collection of metrics with unique [InstrumentationScope]s, in the
    /// order the scopes were first used.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// A collection of metrics produced by a meter.
#[derive(Default, Debug, Clone)]
pub struct ScopeMetrics {
    /// The [InstrumentationScope] that the meter was created with.
    pub scope: InstrumentationScope,
    /// The list of aggregations created by the meter.
    pub metrics: Vec<Metric>,
}

/// A collection of one or more aggregated time series from an [Instrument].
///
/// [Instrument]: crate::metrics::InstrumentKind
#[derive(Debug, Clone)]
pub struct Metric {
    /// The name of the instrument that created this data.
    pub name: Cow<'static, str>,
    /// The description of the instrument, which can be used in documentation.
    pub description: Cow<'static, str>,
    /// The unit in which the instrument reports.
    pub unit: Cow<'static, str>,
    /// The full description of the instrument.
    pub descriptor: InstrumentDescriptor,
    /// The aggregated data from an instrument.
    pub data: AggregatedMetrics,
}

/// Aggregated metrics data from an instrument
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedMetrics {
    /// All metric data with type [`f64`]
    F64(MetricData<f64>),
    /// All metric data with type [`u64`]
    U64(MetricData<u64>),
    /// All metric data with type [`i64`]
    I64(MetricData<i64>),
}

impl AggregatedMetrics {
    /// The temporality of the data, `None` for gauges.
    pub fn temporality(&self) -> Option<Temporality> {
        match self {
            AggregatedMetrics::F64(data) => data.temporality(),
            AggregatedMetrics::U64(data) => data.temporality(),
            AggregatedMetrics::I64(data) => data.temporality(),
        }
    }

    /// The end of the aggregation window, the collection instant.
    pub fn time(&self) -> SystemTime {
        match self {
            AggregatedMetrics::F64(data) => data.time(),
            AggregatedMetrics::U64(data) => data.time(),
            AggregatedMetrics::I64(data) => data.time(),
        }
    }
}

impl From<MetricData<f64>> for AggregatedMetrics {
    fn from(value: MetricData<f64>) -> Self {
        AggregatedMetrics::F64(value)
    }
}

impl From<MetricData<i64>> for AggregatedMetrics {
    fn from(value: MetricData<i64>) -> Self {
        AggregatedMetrics::I64(value)
    }
}

impl From<MetricData<u64>> for AggregatedMetrics {
    fn from(value: MetricData<u64>) -> Self {
        AggregatedMetrics::U64(value)
    }
}

/// Metric data for all types
#[derive(Debug, Clone, PartialEq)]
pub enum MetricData<T> {
    /// Metric data for Gauge
    Gauge(Gauge<T>),
    /// Metric data for Sum
    Sum(Sum<T>),
    /// Metric data for Histogram
    Histogram(Histogram<T>),
    /// Metric data for ExponentialHistogram
    ExponentialHistogram(ExponentialHistogram<T>),
}

impl<T> MetricData<T> {
    fn temporality(&self) -> Option<Temporality> {
        match self {
            MetricData::Gauge(_) => None,
            MetricData::Sum(sum) => Some(sum.temporality),
            MetricData::Histogram(hist) => Some(hist.temporality),
            MetricData::ExponentialHistogram(hist) => Some(hist.temporality),
        }
    }

    fn time(&self) -> SystemTime {
        match self {
            MetricData::Gauge(gauge) => gauge.time,
            MetricData::Sum(sum) => sum.time,
            MetricData::Histogram(hist) => hist.time,
            MetricData::ExponentialHistogram(hist) => hist.time,
        }
    }
}

/// DataPoint is a single data point in a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeDataPoint<T> {
    /// Attributes is the set of key value pairs that uniquely identify the
    /// time series.
    pub attributes: Vec<KeyValue>,
    /// The value of this data point.
    pub value: T,
}

/// A measurement of the current value of an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Gauge<T> {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<GaugeDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: Option<SystemTime>,
    /// The time when the time series was recorded.
    pub time: SystemTime,
}

/// DataPoint is a single data point in a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct SumDataPoint<T> {
    /// Attributes is the set of key value pairs that uniquely identify the
    /// time series.
    pub attributes: Vec<KeyValue>,
    /// The value of this data point.
    pub value: T,
}

/// Represents the sum of all measurements of values from an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Sum<T> {
    /// Represents individual aggregated measurements with unique attributes.
    pub data_points: Vec<SumDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
    /// Whether this aggregation only increases or decreases.
    pub is_monotonic: bool,
}

/// Represents the histogram of all measurements of values from an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram<T> {
    /// Individual aggregated measurements with unique attributes.
    pub data_points: Vec<HistogramDataPoint<T>>,
    /// The time when the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
}

/// A single histogram data point in a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramDataPoint<T> {
    /// The set of key value pairs that uniquely identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The number of updates this histogram has been calculated with.
    pub count: u64,
    /// The upper bounds of the buckets of the histogram.
    ///
    /// Because the last boundary is +infinity this one is implied.
    pub bounds: Vec<f64>,
    /// The count of each of the buckets.
    pub bucket_counts: Vec<u64>,
    /// The minimum value recorded.
    pub min: Option<T>,
    /// The maximum value recorded.
    pub max: Option<T>,
    /// The sum of the values recorded.
    pub sum: T,
}

/// The histogram of all measurements of values from an instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialHistogram<T> {
    /// The individual aggregated measurements with unique attributes.
    pub data_points: Vec<ExponentialHistogramDataPoint<T>>,
    /// When the time series was started.
    pub start_time: SystemTime,
    /// The time when the time series was recorded.
    pub time: SystemTime,
    /// Describes if the aggregation is reported as the change from the last report
    /// time, or the cumulative changes since a fixed start time.
    pub temporality: Temporality,
}

/// A single exponential histogram data point in a time series.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialHistogramDataPoint<T> {
    /// The set of key value pairs that uniquely identify the time series.
    pub attributes: Vec<KeyValue>,
    /// The number of updates this histogram has been calculated with.
    pub count: usize,
    /// The minimum value recorded.
    pub min: Option<T>,
    /// The maximum value recorded.
    pub max: Option<T>,
    /// The sum of the values recorded.
    pub sum: T,
    /// Describes the resolution of the histogram.
    ///
    /// Boundaries are located at powers of the base, where:
    ///
    ///   base = 2 ^ (2 ^ -scale)
    pub scale: i8,
    /// The number of values whose absolute value is less than or equal to
    /// `zero_threshold`.
    pub zero_count: u64,
    /// The range of positive value bucket counts.
    pub positive_bucket: ExponentialBucket,
    /// The range of negative value bucket counts.
    pub negative_bucket: ExponentialBucket,
    /// The width of the zero region.
    pub zero_threshold: f64,
}

/// A set of bucket counts, encoded in a contiguous array of counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBucket {
    /// The bucket index of the first entry in the `counts` vec.
    pub offset: i32,
    /// A vec where `counts[i]` carries the count of the bucket at index `offset + i`.
    pub counts: Vec<u64>,
}
