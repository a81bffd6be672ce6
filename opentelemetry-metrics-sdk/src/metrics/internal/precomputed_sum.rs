use crate::metrics::data::MetricData;
use crate::KeyValue;

use super::sum::{Increment, SumConfig};
use super::{Aggregator, AtomicTracker, CollectionWindow, Number};

/// Holds the total an observable counter reported for one attribute set.
///
/// Observations are totals, so a later one replaces an earlier one and the
/// delta is the difference between two consecutive totals.
pub(crate) struct Observed<T: Number> {
    value: T::AtomicTracker,
}

impl<T: Number> Aggregator for Observed<T> {
    type PreComputedValue = T;
    type InitConfig = SumConfig;
    type Point = T;

    fn create(_init: &SumConfig) -> Self {
        Self {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    fn update(&self, value: T) {
        self.value.store(value)
    }

    fn into_point(self) -> T {
        self.value.get_value()
    }

    fn merge(into: &mut T, later: T) {
        *into = later;
    }

    fn delta(current: &T, previous: &T) -> T {
        current.delta_from(*previous)
    }

    fn to_data(
        init: &SumConfig,
        points: Vec<(Vec<KeyValue>, T)>,
        window: CollectionWindow,
    ) -> MetricData<T> {
        Increment::<T>::to_data(init, points, window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observations_replace_and_diff() {
        let config = SumConfig { monotonic: true };
        let tracker = Observed::<u64>::create(&config);
        tracker.update(10);
        tracker.update(25);

        let current = tracker.into_point();
        assert_eq!(current, 25);
        assert_eq!(Observed::<u64>::delta(&current, &10), 15);
        // a total that went backwards restarted
        assert_eq!(Observed::<u64>::delta(&4, &10), 4);
    }
}
