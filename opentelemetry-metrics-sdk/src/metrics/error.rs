use std::result;
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for metric operations.
pub type MetricResult<T> = result::Result<T, MetricError>;

/// Errors returned by the metrics pipeline.
///
/// Collection never fails because of a single scope or instrument. Those
/// problems are returned in [`CollectionResult::errors`] next to the data that
/// could be collected; only conditions that make a whole collection
/// meaningless, such as a shut down collector, are returned as `Err`.
///
/// [`CollectionResult::errors`]: crate::metrics::data::CollectionResult::errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// The collector was shut down; no further collection is possible.
    #[error("metric collector is already shut down")]
    AlreadyShutdown,
    /// The collection deadline passed before every instrument of the scope was
    /// visited.
    #[error("collection of scope `{scope}` timed out after {timeout:?}; {skipped} instrument(s) were not collected")]
    Timeout {
        /// Name of the scope being collected.
        scope: String,
        /// The deadline that was exceeded.
        timeout: Duration,
        /// How many instruments of the scope were skipped.
        skipped: usize,
    },
    /// One instrument could not produce a value under the aggregation its
    /// reader selected.
    #[error("instrument `{instrument}` of scope `{scope}` could not be aggregated: {reason}")]
    Aggregation {
        /// Name of the scope owning the instrument.
        scope: String,
        /// Name of the failing instrument.
        instrument: String,
        /// Why the aggregation failed.
        reason: String,
    },
    /// An instrument saw more distinct attribute sets than the configured
    /// limit. Extra measurements were folded into the series carrying the
    /// `otel.metric.overflow=true` attribute; no data was dropped.
    #[error("instrument `{instrument}` of scope `{scope}` exceeded the cardinality limit of {limit}")]
    CardinalityLimitExceeded {
        /// Name of the scope owning the instrument.
        scope: String,
        /// Name of the overflowing instrument.
        instrument: String,
        /// The configured limit.
        limit: usize,
    },
    /// An observable instrument callback panicked.
    #[error("an observable callback of scope `{scope}` panicked")]
    CallbackPanicked {
        /// Name of the scope that registered the callback.
        scope: String,
    },
    /// Collection of a whole scope failed unexpectedly.
    #[error("collection of scope `{scope}` failed: {reason}")]
    ScopeFailed {
        /// Name of the failing scope.
        scope: String,
        /// Why the scope failed.
        reason: String,
    },
    /// Invalid configuration
    #[error("Config error {0}")]
    Config(String),
    /// Invalid instrument configuration such as an invalid instrument name or
    /// unit.
    #[error("Invalid instrument configuration: {0}")]
    InvalidInstrumentConfiguration(&'static str),
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl MetricError {
    /// Returns `true` for warning-class errors that do not mean data was
    /// lost, such as a cardinality overflow.
    pub fn is_warning(&self) -> bool {
        matches!(self, MetricError::CardinalityLimitExceeded { .. })
    }
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}
