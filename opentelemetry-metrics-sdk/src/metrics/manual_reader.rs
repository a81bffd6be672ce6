use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, Weak,
    },
    time::Duration,
};

use crate::error::OTelSdkResult;
use opentelemetry::otel_warn;

use super::{
    aggregation::Aggregation,
    collector::{CollectOptions, MetricCollector},
    data::CollectionResult,
    error::{MetricError, MetricResult},
    instrument::InstrumentKind,
    reader::{AggregationSelector, DefaultAggregationSelector, MetricReader},
    Temporality,
};

/// A simple [MetricReader] that allows an application to read metrics on demand.
///
/// The reader is a cheap handle: register one clone with the provider and
/// keep another to call [collect](ManualReader::collect). See
/// [ManualReaderBuilder] for configuration options.
///
/// # Example
///
/// ```
/// use opentelemetry_metrics_sdk::metrics::{ManualReader, Temporality};
///
/// // can specify additional reader configuration
/// let reader = ManualReader::builder()
///     .with_temporality(Temporality::Delta)
///     .build();
/// # drop(reader)
/// ```
#[derive(Clone)]
pub struct ManualReader {
    inner: Arc<ManualReaderInner>,
}

struct ManualReaderInner {
    collector: Mutex<Option<Weak<MetricCollector>>>,
    is_shutdown: AtomicBool,
    temporality: Temporality,
    aggregation_selector: Box<dyn AggregationSelector>,
}

impl Default for ManualReader {
    fn default() -> Self {
        ManualReader::builder().build()
    }
}

impl fmt::Debug for ManualReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReader")
            .field("temporality", &self.inner.temporality)
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl ManualReader {
    /// Configuration for this reader
    pub fn builder() -> ManualReaderBuilder {
        ManualReaderBuilder::default()
    }

    /// Gathers all metrics of the provider this reader is registered with,
    /// running observable callbacks as needed.
    ///
    /// Returns an error if called after shutdown or before registration.
    pub fn collect(&self) -> MetricResult<CollectionResult> {
        self.collect_with_options(CollectOptions::default())
    }

    /// Like [collect](ManualReader::collect), skipping the instruments not
    /// reached within `timeout`.
    pub fn collect_with_timeout(&self, timeout: Duration) -> MetricResult<CollectionResult> {
        self.collect_with_options(CollectOptions::with_timeout(timeout))
    }

    fn collect_with_options(&self, options: CollectOptions) -> MetricResult<CollectionResult> {
        if self.inner.is_shutdown.load(Ordering::Acquire) {
            return Err(MetricError::AlreadyShutdown);
        }
        let collector = self.inner.collector.lock()?.clone();
        match collector {
            Some(weak) => weak
                .upgrade()
                .ok_or(MetricError::AlreadyShutdown)?
                .collect(options),
            None => Err(MetricError::Other("reader is not registered".into())),
        }
    }
}

impl MetricReader for ManualReader {
    fn register_collector(&self, collector: Weak<MetricCollector>) {
        let _ = self.inner.collector.lock().map(|mut inner| {
            // Only register once. If a collector is already set, do nothing.
            if inner.is_none() {
                *inner = Some(collector);
            } else {
                otel_warn!(
                    name: "ManualReader.DuplicateRegistration",
                    message = "duplicate reader registration, did not register manual reader"
                );
            }
        });
    }

    fn collect(&self) -> MetricResult<CollectionResult> {
        ManualReader::collect(self)
    }

    /// ForceFlush is a no-op, it always returns Ok.
    fn force_flush(&self, _timeout: Duration) -> OTelSdkResult {
        Ok(())
    }

    /// Any future call to collect will return an error.
    fn shutdown(&self, _timeout: Duration) -> OTelSdkResult {
        self.inner.is_shutdown.store(true, Ordering::Release);
        Ok(())
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        self.inner.temporality
    }

    fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.inner.aggregation_selector.aggregation(kind)
    }
}

/// Configuration for a [ManualReader]
pub struct ManualReaderBuilder {
    temporality: Temporality,
    aggregation_selector: Box<dyn AggregationSelector>,
}

impl fmt::Debug for ManualReaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualReaderBuilder")
            .field("temporality", &self.temporality)
            .finish()
    }
}

impl Default for ManualReaderBuilder {
    fn default() -> Self {
        ManualReaderBuilder {
            temporality: Temporality::default(),
            aggregation_selector: Box::new(DefaultAggregationSelector::new()),
        }
    }
}

impl ManualReaderBuilder {
    /// New manual builder configuration
    pub fn new() -> Self {
        Default::default()
    }

    /// Set the [Temporality] of the reader. `LowMemory` is resolved per
    /// instrument kind. Defaults to `Cumulative`.
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Sets the [AggregationSelector] a reader will use to determine the
    /// aggregation to use for an instrument based on its kind.
    ///
    /// If this option is not used, every instrument is collected with its
    /// default aggregation.
    pub fn with_aggregation_selector(
        mut self,
        aggregation_selector: impl AggregationSelector + 'static,
    ) -> Self {
        self.aggregation_selector = Box::new(aggregation_selector);
        self
    }

    /// Create a new [ManualReader] from this configuration.
    pub fn build(self) -> ManualReader {
        ManualReader {
            inner: Arc::new(ManualReaderInner {
                collector: Mutex::new(None),
                is_shutdown: AtomicBool::new(false),
                temporality: self.temporality,
                aggregation_selector: self.aggregation_selector,
            }),
        }
    }
}
