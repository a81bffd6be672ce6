use core::fmt;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock, Weak};
use std::time::Instant;

use crate::metrics::{
    collector::{panic_reason, CollectContext, CollectorId},
    data::{Metric, ScopeMetrics},
    error::{MetricError, MetricResult},
    instrument::{
        AsyncInstrumentBuilder, Callback, Counter, Gauge, Histogram, HistogramBuilder,
        InstrumentBuilder, InstrumentDescriptor, InstrumentKind, NoopSyncInstrument,
        ObservableCounter, ObservableGauge, ObservableUpDownCounter, SyncInstrument,
        UpDownCounter, ValueType,
    },
    internal::{Accumulator, CollectRequest, InstrumentCollect, Number},
    meter_provider::ProviderSharedState,
    Aggregation,
};
use opentelemetry::{otel_debug, otel_warn, InstrumentationScope};

// maximum length of instrument name
const INSTRUMENT_NAME_MAX_LENGTH: usize = 255;
// maximum length of instrument unit name
const INSTRUMENT_UNIT_NAME_MAX_LENGTH: usize = 63;
const INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS: [char; 4] = ['_', '.', '-', '/'];

// instrument validation error strings
const INSTRUMENT_NAME_EMPTY: &str = "instrument name must be non-empty";
const INSTRUMENT_NAME_LENGTH: &str = "instrument name must be less than 256 characters";
const INSTRUMENT_NAME_INVALID_CHAR: &str =
    "characters in instrument name must be ASCII and belong to the alphanumeric characters, '_', '.', '-' and '/'";
const INSTRUMENT_NAME_FIRST_ALPHABETIC: &str =
    "instrument name must start with an alphabetic character";
const INSTRUMENT_UNIT_LENGTH: &str = "instrument unit must be less than 64 characters";
const INSTRUMENT_UNIT_INVALID_CHAR: &str = "characters in instrument unit must be ASCII";

/// Creates instruments for one instrumentation scope.
///
/// Obtained from [`SdkMeterProvider::meter`]. All instruments created by the
/// same meter are collected together as one [`ScopeMetrics`]. A meter handed
/// out by a provider that was already shut down creates instruments that
/// record nothing.
///
/// [`SdkMeterProvider::meter`]: crate::metrics::SdkMeterProvider::meter
#[derive(Clone)]
pub struct Meter {
    state: Option<Arc<MeterSharedState>>,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.state {
            Some(state) => f.debug_struct("Meter").field("scope", &state.scope).finish(),
            None => f.write_str("Meter(noop)"),
        }
    }
}

impl Meter {
    pub(crate) fn new(state: Arc<MeterSharedState>) -> Self {
        Meter { state: Some(state) }
    }

    pub(crate) fn noop() -> Self {
        Meter { state: None }
    }

    /// Creates a builder for a [Counter] recording `u64` values.
    pub fn u64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Counter] recording `f64` values.
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [UpDownCounter] recording `i64` values.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [UpDownCounter] recording `f64` values.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Gauge] recording `u64` values.
    pub fn u64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Gauge] recording `i64` values.
    pub fn i64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Gauge] recording `f64` values.
    pub fn f64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Histogram] recording `u64` values.
    pub fn u64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> HistogramBuilder<'_, Histogram<u64>> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for a [Histogram] recording `f64` values.
    pub fn f64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> HistogramBuilder<'_, Histogram<f64>> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableCounter] reporting `u64` totals.
    pub fn u64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter<u64>, u64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableCounter] reporting `f64` totals.
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableCounter<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableUpDownCounter] reporting `i64`
    /// totals.
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableUpDownCounter<i64>, i64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableUpDownCounter] reporting `f64`
    /// totals.
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableUpDownCounter<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableGauge] reporting `u64` values.
    pub fn u64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<u64>, u64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableGauge] reporting `i64` values.
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<i64>, i64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Creates a builder for an [ObservableGauge] reporting `f64` values.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> AsyncInstrumentBuilder<'_, ObservableGauge<f64>, f64> {
        AsyncInstrumentBuilder::new(self, name.into())
    }

    /// Looks up or creates the accumulator of a validated instrument.
    fn accumulator<T: Number>(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
        boundaries: Option<Vec<f64>>,
    ) -> Option<Arc<Accumulator<T>>> {
        let state = self.state.as_ref()?;
        if let Err(err) = validate_instrument_config(name.as_ref(), &unit) {
            otel_debug!(
                name: "Meter.InvalidInstrument",
                scope = state.scope.name(),
                instrument = name.as_ref(),
                reason = format!("{err}")
            );
            return None;
        }

        Some(state.instrument(InstrumentDescriptor {
            name,
            kind,
            unit: unit.unwrap_or_default(),
            description: description.unwrap_or_default(),
            value_type: T::VALUE_TYPE,
            boundaries,
        }))
    }

    fn sync_instrument<T: Number>(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
        boundaries: Option<Vec<f64>>,
    ) -> Arc<dyn SyncInstrument<T>> {
        match self.accumulator::<T>(kind, name, description, unit, boundaries) {
            Some(accumulator) => accumulator,
            None => Arc::new(NoopSyncInstrument),
        }
    }

    fn observable<T: Number>(
        &self,
        kind: InstrumentKind,
        name: Cow<'static, str>,
        description: Option<Cow<'static, str>>,
        unit: Option<Cow<'static, str>>,
        callbacks: Vec<Callback<T>>,
    ) {
        let (Some(state), Some(accumulator)) = (
            self.state.as_ref(),
            self.accumulator::<T>(kind, name, description, unit, None),
        ) else {
            return;
        };

        for callback in callbacks {
            let inst = Arc::clone(&accumulator);
            state.register_callback(Arc::new(move || callback(inst.as_ref())));
        }
    }
}

macro_rules! build_sync {
    ($builder:ident, $inst:ident, $kind:expr, $($ty:ty),+) => {
        $(
            impl $builder<'_, $inst<$ty>> {
                /// Validates the instrument configuration and creates a new instrument.
                ///
                /// An invalid name or unit is logged and yields an instrument
                /// that records nothing.
                pub fn build(self) -> $inst<$ty> {
                    $inst::new(self.meter.sync_instrument::<$ty>(
                        $kind,
                        self.name,
                        self.description,
                        self.unit,
                        None,
                    ))
                }
            }
        )+
    };
}

build_sync!(InstrumentBuilder, Counter, InstrumentKind::Counter, u64, f64);
build_sync!(InstrumentBuilder, UpDownCounter, InstrumentKind::UpDownCounter, i64, f64);
build_sync!(InstrumentBuilder, Gauge, InstrumentKind::Gauge, u64, i64, f64);

macro_rules! build_histogram {
    ($($ty:ty),+) => {
        $(
            impl HistogramBuilder<'_, Histogram<$ty>> {
                /// Validates the instrument configuration and creates a new histogram.
                pub fn build(self) -> Histogram<$ty> {
                    Histogram::new(self.meter.sync_instrument::<$ty>(
                        InstrumentKind::Histogram,
                        self.name,
                        self.description,
                        self.unit,
                        self.boundaries,
                    ))
                }
            }
        )+
    };
}

build_histogram!(u64, f64);

macro_rules! build_async {
    ($inst:ident, $kind:expr, $($ty:ty),+) => {
        $(
            impl AsyncInstrumentBuilder<'_, $inst<$ty>, $ty> {
                /// Validates the instrument configuration, registers its
                /// callbacks and creates a new instrument.
                pub fn build(self) -> $inst<$ty> {
                    self.meter.observable::<$ty>(
                        $kind,
                        self.name,
                        self.description,
                        self.unit,
                        self.callbacks,
                    );
                    $inst::new()
                }
            }
        )+
    };
}

build_async!(ObservableCounter, InstrumentKind::ObservableCounter, u64, f64);
build_async!(ObservableUpDownCounter, InstrumentKind::ObservableUpDownCounter, i64, f64);
build_async!(ObservableGauge, InstrumentKind::ObservableGauge, u64, i64, f64);

fn validate_instrument_config(name: &str, unit: &Option<Cow<'static, str>>) -> MetricResult<()> {
    validate_instrument_name(name).and_then(|_| validate_instrument_unit(unit))
}

fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_EMPTY,
        ));
    }
    if name.len() > INSTRUMENT_NAME_MAX_LENGTH {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_LENGTH,
        ));
    }
    if name.starts_with(|c: char| !c.is_ascii_alphabetic()) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_FIRST_ALPHABETIC,
        ));
    }
    if name.contains(|c: char| {
        !c.is_ascii_alphanumeric() && !INSTRUMENT_NAME_ALLOWED_NON_ALPHANUMERIC_CHARS.contains(&c)
    }) {
        return Err(MetricError::InvalidInstrumentConfiguration(
            INSTRUMENT_NAME_INVALID_CHAR,
        ));
    }
    Ok(())
}

fn validate_instrument_unit(unit: &Option<Cow<'static, str>>) -> MetricResult<()> {
    if let Some(unit) = unit {
        if unit.len() > INSTRUMENT_UNIT_NAME_MAX_LENGTH {
            return Err(MetricError::InvalidInstrumentConfiguration(
                INSTRUMENT_UNIT_LENGTH,
            ));
        }
        if unit.contains(|c: char| !c.is_ascii()) {
            return Err(MetricError::InvalidInstrumentConfiguration(
                INSTRUMENT_UNIT_INVALID_CHAR,
            ));
        }
    }
    Ok(())
}

/// Identity of an instrument within a scope. Names compare case-insensitively.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct InstrumentId {
    name: String,
    kind: InstrumentKind,
    unit: Cow<'static, str>,
    value_type: ValueType,
}

impl InstrumentId {
    fn new(descriptor: &InstrumentDescriptor) -> Self {
        InstrumentId {
            name: descriptor.name.to_ascii_lowercase(),
            kind: descriptor.kind,
            unit: descriptor.unit.clone(),
            value_type: descriptor.value_type,
        }
    }
}

#[derive(Default)]
struct InstrumentRegistry {
    /// Registration order, which is also collection order.
    ordered: Vec<Arc<dyn InstrumentCollect>>,
    by_id: HashMap<InstrumentId, Arc<dyn Any + Send + Sync>>,
}

type ScopeCallback = Arc<dyn Fn() + Send + Sync>;

/// The instruments and callbacks of one instrumentation scope.
pub(crate) struct MeterSharedState {
    scope: InstrumentationScope,
    cardinality_limit: usize,
    provider: Weak<ProviderSharedState>,
    instruments: RwLock<InstrumentRegistry>,
    callbacks: RwLock<Vec<ScopeCallback>>,
}

impl fmt::Debug for MeterSharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterSharedState")
            .field("scope", &self.scope)
            .field("cardinality_limit", &self.cardinality_limit)
            .finish()
    }
}

/// The outcome of collecting one scope for one collector.
#[derive(Debug)]
pub(crate) struct ScopeCollection {
    pub(crate) metrics: ScopeMetrics,
    pub(crate) errors: Vec<MetricError>,
}

impl ScopeCollection {
    pub(crate) fn failed(scope: InstrumentationScope, reason: String) -> Self {
        let error = MetricError::ScopeFailed {
            scope: scope.name().to_string(),
            reason,
        };
        ScopeCollection {
            metrics: ScopeMetrics {
                scope,
                metrics: Vec::new(),
            },
            errors: vec![error],
        }
    }
}

impl MeterSharedState {
    pub(crate) fn new(
        scope: InstrumentationScope,
        cardinality_limit: usize,
        provider: Weak<ProviderSharedState>,
    ) -> Self {
        MeterSharedState {
            scope,
            cardinality_limit,
            provider,
            instruments: RwLock::new(InstrumentRegistry::default()),
            callbacks: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Returns the accumulator registered under the descriptor's identity,
    /// creating it on first use with a stream for every registered
    /// collector's aggregation.
    pub(crate) fn instrument<T: Number>(
        &self,
        descriptor: InstrumentDescriptor,
    ) -> Arc<Accumulator<T>> {
        let id = InstrumentId::new(&descriptor);
        let mut registry = self.instruments.write().unwrap_or_else(|err| err.into_inner());
        if let Some(existing) = registry.by_id.get(&id) {
            if let Ok(accumulator) = Arc::clone(existing).downcast::<Accumulator<T>>() {
                return accumulator;
            }
        }

        if registry.by_id.keys().any(|other| other.name == id.name) {
            otel_warn!(
                name: "Meter.DuplicateInstrument",
                scope = self.scope.name(),
                instrument = descriptor.name.as_ref(),
                message = "an instrument with the same name but a different kind, unit or value type already exists in this scope"
            );
        }

        let collectors = self.collector_aggregations(descriptor.kind);
        let accumulator = Arc::new(Accumulator::<T>::new(
            descriptor,
            self.cardinality_limit,
            &collectors,
        ));
        registry.ordered.push(accumulator.clone());
        registry.by_id.insert(id, accumulator.clone());
        otel_debug!(
            name: "Meter.InstrumentCreated",
            scope = self.scope.name(),
            instruments = registry.ordered.len() as u64
        );
        accumulator
    }

    /// The aggregation every registered collector selects for `kind`.
    fn collector_aggregations(&self, kind: InstrumentKind) -> Vec<(CollectorId, Aggregation)> {
        self.provider
            .upgrade()
            .map(|provider| {
                provider
                    .collectors()
                    .iter()
                    .map(|collector| (collector.id(), collector.aggregation(kind)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn register_callback(&self, callback: ScopeCallback) {
        self.callbacks
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .push(callback);
    }

    /// Runs the scope's callbacks, then collects every instrument for the
    /// context's collector.
    ///
    /// Instruments are collected one after another in registration order on
    /// the calling thread; concurrency comes from the collector running
    /// scopes in parallel. The deadline is checked before each instrument.
    pub(crate) fn collect(&self, ctx: &CollectContext<'_>) -> ScopeCollection {
        let mut errors = Vec::new();
        self.run_callbacks(&mut errors);

        let instruments: Vec<Arc<dyn InstrumentCollect>> = self
            .instruments
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .ordered
            .clone();

        let request = CollectRequest {
            handle: ctx.collector,
            time: ctx.time,
        };

        let mut metrics = Vec::with_capacity(instruments.len());
        for (visited, instrument) in instruments.iter().enumerate() {
            if let Some((deadline, timeout)) = ctx.deadline {
                if Instant::now() >= deadline {
                    errors.push(MetricError::Timeout {
                        scope: self.scope.name().to_string(),
                        timeout,
                        skipped: instruments.len() - visited,
                    });
                    break;
                }
            }

            let descriptor = instrument.descriptor();
            let aggregation = ctx.collector.aggregation(descriptor.kind);
            match instrument.collect(&request, &aggregation) {
                Ok(collected) => {
                    if collected.overflowed {
                        otel_warn!(
                            name: "Meter.CardinalityLimitExceeded",
                            scope = self.scope.name(),
                            instrument = descriptor.name.as_ref(),
                            limit = self.cardinality_limit as u64
                        );
                        errors.push(MetricError::CardinalityLimitExceeded {
                            scope: self.scope.name().to_string(),
                            instrument: descriptor.name.to_string(),
                            limit: self.cardinality_limit,
                        });
                    }
                    if let Some(data) = collected.data {
                        metrics.push(Metric {
                            name: descriptor.name.clone(),
                            description: descriptor.description.clone(),
                            unit: descriptor.unit.clone(),
                            descriptor: descriptor.clone(),
                            data,
                        });
                    }
                }
                Err(err) => errors.push(MetricError::Aggregation {
                    scope: self.scope.name().to_string(),
                    instrument: descriptor.name.to_string(),
                    reason: err.to_string(),
                }),
            }
        }

        ScopeCollection {
            metrics: ScopeMetrics {
                scope: self.scope.clone(),
                metrics,
            },
            errors,
        }
    }

    fn run_callbacks(&self, errors: &mut Vec<MetricError>) {
        let callbacks: Vec<ScopeCallback> = self
            .callbacks
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone();

        for callback in callbacks {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback())) {
                otel_warn!(
                    name: "Meter.CallbackPanicked",
                    scope = self.scope.name(),
                    reason = panic_reason(&*payload)
                );
                errors.push(MetricError::CallbackPanicked {
                    scope: self.scope.name().to_string(),
                });
            }
        }
    }
}
