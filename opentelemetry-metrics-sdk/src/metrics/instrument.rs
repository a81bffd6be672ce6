use std::{borrow::Cow, fmt, marker, sync::Arc};

use crate::KeyValue;

use super::meter::Meter;
use super::Temporality;

/// The identifier of a group of instruments that all perform the same function.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum InstrumentKind {
    /// Identifies a group of instruments that record increasing values synchronously
    /// with the code path they are measuring.
    Counter,
    /// A group of instruments that record increasing and decreasing values
    /// synchronously with the code path they are measuring.
    UpDownCounter,
    /// A group of instruments that record a distribution of values synchronously with
    /// the code path they are measuring.
    Histogram,
    /// A group of instruments that record increasing values in an asynchronous
    /// callback.
    ObservableCounter,
    /// A group of instruments that record increasing and decreasing values in an
    /// asynchronous callback.
    ObservableUpDownCounter,
    /// a group of instruments that record current value synchronously with
    /// the code path they are measuring.
    Gauge,
    /// a group of instruments that record current values in an asynchronous callback.
    ObservableGauge,
}

impl InstrumentKind {
    /// Resolves a reader's [Temporality] preference into the temporality used
    /// for this kind. The result is always `Cumulative` or `Delta`.
    pub fn temporality_preference(&self, temporality: Temporality) -> Temporality {
        match temporality {
            Temporality::Cumulative => Temporality::Cumulative,
            Temporality::Delta => match self {
                Self::Counter
                | Self::Histogram
                | Self::ObservableCounter
                | Self::Gauge
                | Self::ObservableGauge => Temporality::Delta,
                Self::UpDownCounter | Self::ObservableUpDownCounter => Temporality::Cumulative,
            },
            Temporality::LowMemory => match self {
                Self::Counter | Self::Histogram => Temporality::Delta,
                Self::ObservableCounter
                | Self::Gauge
                | Self::ObservableGauge
                | Self::UpDownCounter
                | Self::ObservableUpDownCounter => Temporality::Cumulative,
            },
        }
    }

    /// Observable instruments are recorded by callbacks at collection time.
    pub(crate) fn is_async(&self) -> bool {
        matches!(
            self,
            Self::ObservableCounter | Self::ObservableUpDownCounter | Self::ObservableGauge
        )
    }

    pub(crate) fn is_monotonic(&self) -> bool {
        matches!(self, Self::Counter | Self::ObservableCounter | Self::Histogram)
    }
}

/// The numeric type an instrument records.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ValueType {
    /// Unsigned 64-bit integers
    U64,
    /// Signed 64-bit integers
    I64,
    /// 64-bit floating point numbers
    F64,
}

/// Immutable description of an instrument, fixed when it is created.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct InstrumentDescriptor {
    /// The name of the instrument.
    pub name: Cow<'static, str>,
    /// The kind of the instrument.
    pub kind: InstrumentKind,
    /// Unit of the measurements, following UCUM.
    pub unit: Cow<'static, str>,
    /// Human readable description.
    pub description: Cow<'static, str>,
    /// The type of the recorded values.
    pub value_type: ValueType,
    /// Advisory explicit bucket boundaries, used by histograms that are
    /// collected with [Aggregation::Default](crate::metrics::Aggregation::Default).
    pub boundaries: Option<Vec<f64>>,
}

/// An SDK implemented instrument that records measurements synchronously.
pub trait SyncInstrument<T>: Send + Sync {
    /// Records a measurement.
    fn measure(&self, measurement: T, attributes: &[KeyValue]);
}

/// An SDK implemented instrument that records measurements via callback.
pub trait AsyncInstrument<T>: Send + Sync {
    /// Observes the state of the instrument.
    ///
    /// It is only valid to call this within a callback.
    fn observe(&self, measurement: T, attributes: &[KeyValue]);
}

/// A function registered with a [Meter] that makes observations for the
/// instrument it is registered with.
///
/// Callbacks run at the start of every collection of every reader and must
/// complete in a finite amount of time.
pub type Callback<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

pub(crate) struct NoopSyncInstrument;

impl<T> SyncInstrument<T> for NoopSyncInstrument {
    fn measure(&self, _measurement: T, _attributes: &[KeyValue]) {}
}

macro_rules! sync_instrument {
    ($(#[$doc:meta])* $name:ident, $method:ident, $verb:literal) => {
        $(#[$doc])*
        #[derive(Clone)]
        #[non_exhaustive]
        pub struct $name<T>(Arc<dyn SyncInstrument<T>>);

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!(
                    "{}<{}>",
                    stringify!($name),
                    std::any::type_name::<T>()
                ))
            }
        }

        impl<T> $name<T> {
            pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
                $name(inner)
            }

            #[doc = concat!("Records ", $verb, ".")]
            pub fn $method(&self, value: T, attributes: &[KeyValue]) {
                self.0.measure(value, attributes)
            }
        }
    };
}

sync_instrument!(
    /// An instrument that records increasing values.
    Counter,
    add,
    "an increment to the counter"
);
sync_instrument!(
    /// An instrument that records increasing or decreasing values.
    UpDownCounter,
    add,
    "an increment or decrement to the counter"
);
sync_instrument!(
    /// An instrument that records a distribution of values.
    Histogram,
    record,
    "a value in the distribution"
);
sync_instrument!(
    /// An instrument that records independent values.
    Gauge,
    record,
    "the current value"
);

macro_rules! async_instrument {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[non_exhaustive]
        pub struct $name<T> {
            _marker: marker::PhantomData<T>,
        }

        impl<T> $name<T> {
            pub(crate) fn new() -> Self {
                $name {
                    _marker: marker::PhantomData,
                }
            }
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_fmt(format_args!(
                    "{}<{}>",
                    stringify!($name),
                    std::any::type_name::<T>()
                ))
            }
        }
    };
}

async_instrument!(
    /// An observable instrument that reports increasing values from a callback.
    ///
    /// Observed values are totals since start; the pipeline computes deltas
    /// for readers that want them.
    ObservableCounter
);
async_instrument!(
    /// An observable instrument that reports increasing or decreasing totals
    /// from a callback.
    ObservableUpDownCounter
);
async_instrument!(
    /// An observable instrument that reports current values from a callback.
    ObservableGauge
);

/// Configuration for building a sync instrument.
pub struct InstrumentBuilder<'a, I> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    _inst: marker::PhantomData<I>,
}

impl<'a, I> InstrumentBuilder<'a, I> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        InstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _inst: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl<I> fmt::Debug for InstrumentBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .finish()
    }
}

/// Configuration for building a histogram.
pub struct HistogramBuilder<'a, I> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    pub(crate) boundaries: Option<Vec<f64>>,
    _inst: marker::PhantomData<I>,
}

impl<'a, I> HistogramBuilder<'a, I> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        HistogramBuilder {
            meter,
            name,
            description: None,
            unit: None,
            boundaries: None,
            _inst: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set advisory bucket boundaries for this histogram.
    ///
    /// They are used whenever a reader collects the histogram with the default
    /// aggregation. Boundaries must be finite and strictly increasing;
    /// otherwise every such collection reports an error for this instrument.
    pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }
}

impl<I> fmt::Debug for HistogramBuilder<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistogramBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("boundaries", &self.boundaries)
            .field("kind", &std::any::type_name::<I>())
            .finish()
    }
}

/// Configuration for building an async instrument.
pub struct AsyncInstrumentBuilder<'a, I, M> {
    pub(crate) meter: &'a Meter,
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Option<Cow<'static, str>>,
    pub(crate) unit: Option<Cow<'static, str>>,
    pub(crate) callbacks: Vec<Callback<M>>,
    _inst: marker::PhantomData<I>,
}

impl<'a, I, M> AsyncInstrumentBuilder<'a, I, M> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        AsyncInstrumentBuilder {
            meter,
            name,
            description: None,
            unit: None,
            callbacks: Vec::new(),
            _inst: marker::PhantomData,
        }
    }

    /// Set the description for this instrument
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set the callback to be called for this instrument.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn AsyncInstrument<M>) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl<I, M> fmt::Debug for AsyncInstrumentBuilder<'_, I, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncInstrumentBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<I>())
            .field("callback_count", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InstrumentKind::Counter, Temporality::Delta, Temporality::Delta)]
    #[case(InstrumentKind::UpDownCounter, Temporality::Delta, Temporality::Cumulative)]
    #[case(InstrumentKind::ObservableCounter, Temporality::LowMemory, Temporality::Cumulative)]
    #[case(InstrumentKind::Histogram, Temporality::LowMemory, Temporality::Delta)]
    #[case(InstrumentKind::Gauge, Temporality::Cumulative, Temporality::Cumulative)]
    fn temporality_preference(
        #[case] kind: InstrumentKind,
        #[case] preference: Temporality,
        #[case] expected: Temporality,
    ) {
        assert_eq!(kind.temporality_preference(preference), expected);
    }

    #[test]
    fn async_kinds() {
        assert!(InstrumentKind::ObservableGauge.is_async());
        assert!(!InstrumentKind::Gauge.is_async());
        assert!(InstrumentKind::Histogram.is_monotonic());
        assert!(!InstrumentKind::ObservableUpDownCounter.is_monotonic());
    }
}
