mod accumulator;
mod exponential_histogram;
mod histogram;
mod last_value;
mod precomputed_sum;
mod sum;
mod value_map;

use core::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::SystemTime;

use crate::KeyValue;

use super::data::{AggregatedMetrics, MetricData};
use super::instrument::ValueType;
use super::Temporality;

pub(crate) use accumulator::{Accumulator, CollectRequest, Collected, InstrumentCollect};
pub(crate) use exponential_histogram::{EXPO_MAX_SCALE, EXPO_MIN_SCALE};

/// Default maximum number of distinct attribute sets per instrument stream.
pub(crate) const STREAM_CARDINALITY_LIMIT: usize = 2000;

/// Common interface of the per attribute set trackers.
///
/// A tracker receives measurements concurrently through `update`. At
/// collection it is drained out of the working set and turned into a
/// `Point`, a plain value that can be merged into the per collector state.
pub(crate) trait Aggregator: Send + Sync + 'static {
    /// The measurement type.
    type PreComputedValue: Number;

    /// Settings shared by all trackers of one stream.
    type InitConfig: Send + Sync + 'static;

    /// The drained, mergeable snapshot of a tracker.
    type Point: Clone + Send + Sync + 'static;

    fn create(init: &Self::InitConfig) -> Self;

    fn update(&self, value: Self::PreComputedValue);

    fn into_point(self) -> Self::Point;

    /// Folds a later snapshot into an earlier one.
    fn merge(into: &mut Self::Point, later: Self::Point);

    /// The value reported for a delta reader of an observable instrument
    /// given the value it last reported.
    fn delta(current: &Self::Point, _previous: &Self::Point) -> Self::Point {
        current.clone()
    }

    fn to_data(
        init: &Self::InitConfig,
        points: Vec<(Vec<KeyValue>, Self::Point)>,
        window: CollectionWindow,
    ) -> MetricData<Self::PreComputedValue>;
}

/// The time range and temporality of one reported aggregation.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CollectionWindow {
    pub(crate) start: SystemTime,
    pub(crate) time: SystemTime,
    pub(crate) temporality: Temporality,
}

/// A value that can be atomically stored, added to and read.
pub(crate) trait AtomicTracker<T>: Sync + Send + 'static {
    fn store(&self, value: T);
    fn add(&self, value: T);
    fn get_value(&self) -> T;
}

/// Marks a type that can have an atomic tracker generated for it
pub(crate) trait AtomicallyUpdate<T> {
    type AtomicTracker: AtomicTracker<T>;
    fn new_atomic_tracker(init: T) -> Self::AtomicTracker;
}

pub(crate) trait Number:
    Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + PartialOrd
    + fmt::Debug
    + Clone
    + Copy
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
    + AtomicallyUpdate<Self>
{
    const VALUE_TYPE: ValueType;

    fn min() -> Self;
    fn max() -> Self;

    fn into_float(self) -> f64;

    /// The change from `previous` to `self` for totals that only grow. A
    /// total that went down restarted, so the whole current value is the
    /// change.
    fn delta_from(self, previous: Self) -> Self;

    fn into_aggregated_metrics(data: MetricData<Self>) -> AggregatedMetrics;
}

impl Number for i64 {
    const VALUE_TYPE: ValueType = ValueType::I64;

    fn min() -> Self {
        i64::MIN
    }

    fn max() -> Self {
        i64::MAX
    }

    fn into_float(self) -> f64 {
        // May have precision loss at high values
        self as f64
    }

    fn delta_from(self, previous: Self) -> Self {
        self.wrapping_sub(previous)
    }

    fn into_aggregated_metrics(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::I64(data)
    }
}

impl Number for u64 {
    const VALUE_TYPE: ValueType = ValueType::U64;

    fn min() -> Self {
        u64::MIN
    }

    fn max() -> Self {
        u64::MAX
    }

    fn into_float(self) -> f64 {
        // May have precision loss at high values
        self as f64
    }

    fn delta_from(self, previous: Self) -> Self {
        self.checked_sub(previous).unwrap_or(self)
    }

    fn into_aggregated_metrics(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::U64(data)
    }
}

impl Number for f64 {
    const VALUE_TYPE: ValueType = ValueType::F64;

    fn min() -> Self {
        f64::MIN
    }

    fn max() -> Self {
        f64::MAX
    }

    fn into_float(self) -> f64 {
        self
    }

    fn delta_from(self, previous: Self) -> Self {
        self - previous
    }

    fn into_aggregated_metrics(data: MetricData<Self>) -> AggregatedMetrics {
        AggregatedMetrics::F64(data)
    }
}

impl AtomicTracker<u64> for AtomicU64 {
    fn store(&self, value: u64) {
        self.store(value, Ordering::Relaxed);
    }

    fn add(&self, value: u64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn get_value(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }
}

impl AtomicallyUpdate<u64> for u64 {
    type AtomicTracker = AtomicU64;

    fn new_atomic_tracker(init: u64) -> Self::AtomicTracker {
        AtomicU64::new(init)
    }
}

impl AtomicTracker<i64> for AtomicI64 {
    fn store(&self, value: i64) {
        self.store(value, Ordering::Relaxed);
    }

    fn add(&self, value: i64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn get_value(&self) -> i64 {
        self.load(Ordering::Relaxed)
    }
}

impl AtomicallyUpdate<i64> for i64 {
    type AtomicTracker = AtomicI64;

    fn new_atomic_tracker(init: i64) -> Self::AtomicTracker {
        AtomicI64::new(init)
    }
}

/// Floating points have no native atomics; the bits live in an `AtomicU64`
/// and additions retry on contention.
pub(crate) struct F64AtomicTracker {
    inner: AtomicU64,
}

impl F64AtomicTracker {
    fn new(init: f64) -> Self {
        let value_as_u64: u64 = init.to_bits();
        F64AtomicTracker {
            inner: AtomicU64::new(value_as_u64),
        }
    }
}

impl AtomicTracker<f64> for F64AtomicTracker {
    fn store(&self, value: f64) {
        let value_as_u64: u64 = value.to_bits();
        self.inner.store(value_as_u64, Ordering::Relaxed);
    }

    fn add(&self, value: f64) {
        let mut current_value_as_u64 = self.inner.load(Ordering::Relaxed);

        loop {
            let current_value = f64::from_bits(current_value_as_u64);
            let new_value = current_value + value;
            let new_value_as_u64 = new_value.to_bits();
            match self.inner.compare_exchange_weak(
                current_value_as_u64,
                new_value_as_u64,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                // Succeeded in updating the value
                Ok(_) => return,

                // Some other thread changed the value before this thread could update it.
                // Read the latest value again and try to swap it with the recomputed `new_value_as_u64`.
                Err(v) => current_value_as_u64 = v,
            }
        }
    }

    fn get_value(&self) -> f64 {
        let value_as_u64 = self.inner.load(Ordering::Relaxed);
        f64::from_bits(value_as_u64)
    }
}

impl AtomicallyUpdate<f64> for f64 {
    type AtomicTracker = F64AtomicTracker;

    fn new_atomic_tracker(init: f64) -> Self::AtomicTracker {
        F64AtomicTracker::new(init)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_store_u64_atomic_value() {
        let atomic = u64::new_atomic_tracker(0);
        let atomic_tracker = &atomic as &dyn AtomicTracker<u64>;

        let value = atomic.get_value();
        assert_eq!(value, 0);

        atomic_tracker.store(25);
        let value = atomic.get_value();
        assert_eq!(value, 25);
    }

    #[test]
    fn can_add_and_get_u64_atomic_value() {
        let atomic = u64::new_atomic_tracker(0);
        atomic.add(15);
        atomic.add(10);

        let value = atomic.get_value();
        assert_eq!(value, 25);
    }

    #[test]
    fn can_add_and_get_i64_atomic_value() {
        let atomic = i64::new_atomic_tracker(0);
        atomic.add(15);
        atomic.add(-10);

        let value = atomic.get_value();
        assert_eq!(value, 5);
    }

    #[test]
    fn can_store_and_add_f64_atomic_value() {
        let atomic = f64::new_atomic_tracker(0.0);
        atomic.add(15.3);
        atomic.add(10.4);

        let value = atomic.get_value();
        assert!(f64::abs(25.7 - value) < 0.0001);

        atomic.store(-1.5);
        assert_eq!(atomic.get_value(), -1.5);
    }

    #[test]
    fn concurrent_f64_additions_are_not_lost() {
        let atomic = f64::new_atomic_tracker(0.0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        atomic.add(0.5);
                    }
                });
            }
        });
        assert_eq!(atomic.get_value(), 2000.0);
    }

    #[test]
    fn delta_from_handles_restarts() {
        assert_eq!(10_u64.delta_from(4), 6);
        assert_eq!(3_u64.delta_from(4), 3);
        assert_eq!((-3_i64).delta_from(4), -7);
        assert_eq!(2.5_f64.delta_from(1.0), 1.5);
    }
}
