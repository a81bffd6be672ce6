use std::fmt;

use crate::metrics::error::{MetricError, MetricResult};
use crate::metrics::instrument::{InstrumentDescriptor, InstrumentKind};
use crate::metrics::internal::{EXPO_MAX_SCALE, EXPO_MIN_SCALE};

/// Default explicit bucket boundaries for histograms.
pub(crate) const DEFAULT_HISTOGRAM_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0,
    7500.0, 10000.0,
];

/// The way recorded measurements are summarized.
///
/// Readers select an aggregation per [InstrumentKind] at every collection, so
/// the same instrument may be summarized differently for different readers.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Aggregation {
    /// An aggregation that drops all recorded data.
    Drop,
    /// An aggregation that uses the default instrument kind selection mapping to
    /// select another aggregation.
    ///
    /// See [default_aggregation] for the mapping.
    Default,
    /// An aggregation that summarizes a set of measurements as their arithmetic
    /// sum.
    Sum,
    /// An aggregation that summarizes a set of measurements as the last one made.
    LastValue,
    /// An aggregation that summarizes a set of measurements as a histogram with
    /// explicitly defined buckets.
    ExplicitBucketHistogram {
        /// The increasing bucket boundary values.
        ///
        /// Boundary values define bucket upper bounds. Buckets are exclusive of their
        /// lower boundary and inclusive of their upper bound (except at positive
        /// infinity). A measurement is defined to fall into the greatest-numbered
        /// bucket with a boundary that is greater than or equal to the measurement. As
        /// an example, boundaries defined as:
        ///
        /// vec![0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0,
        /// 1000.0, 2500.0, 5000.0, 7500.0, 10000.0];
        ///
        /// Will define these buckets:
        ///
        /// (-∞, 0], (0, 5.0], (5.0, 10.0], (10.0, 25.0], (25.0, 50.0], (50.0,
        ///  75.0], (75.0, 100.0], (100.0, 250.0], (250.0, 500.0], (500.0,
        ///  750.0], (750.0, 1000.0], (1000.0, 2500.0], (2500.0, 5000.0],
        ///  (5000.0, 7500.0], (7500.0, 10000.0], (10000.0, +∞)
        boundaries: Vec<f64>,
        /// Indicates whether to record the min and max of the distribution.
        record_min_max: bool,
    },
    /// An aggregation that summarizes a set of measurements as a histogram with
    /// bucket widths that grow exponentially.
    Base2ExponentialHistogram {
        /// The maximum number of buckets to use for the histogram.
        max_size: u32,
        /// The maximum resolution scale to use for the histogram.
        ///
        /// The maximum value is `20`, the minimum value is `-10`.
        max_scale: i8,
        /// Indicates whether to record the min and max of the distribution.
        record_min_max: bool,
    },
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Aggregation::Drop => "Drop",
            Aggregation::Default => "Default",
            Aggregation::Sum => "Sum",
            Aggregation::LastValue => "LastValue",
            Aggregation::ExplicitBucketHistogram { .. } => "ExplicitBucketHistogram",
            Aggregation::Base2ExponentialHistogram { .. } => "Base2ExponentialHistogram",
        };

        f.write_str(name)
    }
}

impl Aggregation {
    /// Validate that this aggregation has correct configuration
    pub fn validate(&self) -> MetricResult<()> {
        match self {
            Aggregation::Drop => Ok(()),
            Aggregation::Default => Ok(()),
            Aggregation::Sum => Ok(()),
            Aggregation::LastValue => Ok(()),
            Aggregation::ExplicitBucketHistogram { boundaries, .. } => {
                if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
                    return Err(MetricError::Config(format!(
                        "aggregation: explicit bucket histogram: non-finite boundary {bad} in {boundaries:?}",
                    )));
                }
                for x in boundaries.windows(2) {
                    if x[0] >= x[1] {
                        return Err(MetricError::Config(format!(
                            "aggregation: explicit bucket histogram: non-monotonic boundaries: {boundaries:?}",
                        )));
                    }
                }

                Ok(())
            }
            Aggregation::Base2ExponentialHistogram {
                max_size,
                max_scale,
                ..
            } => {
                if *max_scale > EXPO_MAX_SCALE {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max scale ({max_scale}) is greater than {EXPO_MAX_SCALE}",
                    )));
                }
                if *max_scale < EXPO_MIN_SCALE {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max scale ({max_scale}) is less than {EXPO_MIN_SCALE}",
                    )));
                }
                if *max_size < 2 {
                    return Err(MetricError::Config(format!(
                        "aggregation: exponential histogram: max size ({max_size}) must be at least 2",
                    )));
                }

                Ok(())
            }
        }
    }

    /// Replaces [Aggregation::Default] with the concrete aggregation for the
    /// instrument. Histograms use the instrument's advisory boundaries when it
    /// has any.
    pub(crate) fn resolve(&self, descriptor: &InstrumentDescriptor) -> Aggregation {
        match self {
            Aggregation::Default => match (&descriptor.kind, &descriptor.boundaries) {
                (InstrumentKind::Histogram, Some(boundaries)) => {
                    Aggregation::ExplicitBucketHistogram {
                        boundaries: boundaries.clone(),
                        record_min_max: true,
                    }
                }
                (kind, _) => default_aggregation(*kind),
            },
            other => other.clone(),
        }
    }
}

/// The aggregation used for an instrument kind when a reader asks for
/// [Aggregation::Default].
///
/// * Counters and up-down counters, synchronous or observable: [Aggregation::Sum]
/// * Gauges, synchronous or observable: [Aggregation::LastValue]
/// * Histograms: [Aggregation::ExplicitBucketHistogram] with boundaries
///   `[0, 5, 10, 25, 50, 75, 100, 250, 500, 750, 1000, 2500, 5000, 7500, 10000]`
pub fn default_aggregation(kind: InstrumentKind) -> Aggregation {
    match kind {
        InstrumentKind::Counter
        | InstrumentKind::UpDownCounter
        | InstrumentKind::ObservableCounter
        | InstrumentKind::ObservableUpDownCounter => Aggregation::Sum,
        InstrumentKind::Gauge | InstrumentKind::ObservableGauge => Aggregation::LastValue,
        InstrumentKind::Histogram => Aggregation::ExplicitBucketHistogram {
            boundaries: DEFAULT_HISTOGRAM_BOUNDARIES.to_vec(),
            record_min_max: true,
        },
    }
}

/// Checks if the aggregation can summarize measurements of the instrument kind.
pub(crate) fn is_aggregator_compatible(
    kind: InstrumentKind,
    agg: &Aggregation,
) -> MetricResult<()> {
    match agg {
        Aggregation::Default | Aggregation::Drop => Ok(()),
        Aggregation::ExplicitBucketHistogram { .. }
        | Aggregation::Base2ExponentialHistogram { .. } => match kind {
            InstrumentKind::Counter
            | InstrumentKind::Histogram
            | InstrumentKind::Gauge
            | InstrumentKind::ObservableGauge => Ok(()),
            _ => Err(MetricError::Config(format!(
                "{agg} aggregation is not available for {kind:?}"
            ))),
        },
        Aggregation::Sum => match kind {
            InstrumentKind::ObservableCounter
            | InstrumentKind::ObservableUpDownCounter
            | InstrumentKind::Counter
            | InstrumentKind::Histogram
            | InstrumentKind::UpDownCounter => Ok(()),
            _ => Err(MetricError::Config(format!(
                "Sum aggregation is not available for {kind:?}"
            ))),
        },
        Aggregation::LastValue => match kind {
            InstrumentKind::Gauge | InstrumentKind::ObservableGauge => Ok(()),
            _ => Err(MetricError::Config(format!(
                "LastValue aggregation is only available for Gauge or ObservableGauge, but not for {kind:?}"
            ))),
        },
    }
}
