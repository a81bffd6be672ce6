use crate::metrics::data::{Gauge, GaugeDataPoint, MetricData};
use crate::KeyValue;

use super::{Aggregator, AtomicTracker, CollectionWindow, Number};

/// Keeps the last measurement made for one attribute set.
pub(crate) struct Assign<T: Number> {
    value: T::AtomicTracker,
}

impl<T: Number> Aggregator for Assign<T> {
    type PreComputedValue = T;
    type InitConfig = ();
    type Point = T;

    fn create(_init: &()) -> Self {
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

    fn to_data(
        _init: &(),
        points: Vec<(Vec<KeyValue>, T)>,
        window: CollectionWindow,
    ) -> MetricData<T> {
        MetricData::Gauge(Gauge {
            data_points: points
                .into_iter()
                .map(|(attributes, value)| GaugeDataPoint { attributes, value })
                .collect(),
            start_time: Some(window.start),
            time: window.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_value_replaces_earlier() {
        let tracker = Assign::<f64>::create(&());
        tracker.update(1.5);
        tracker.update(-4.0);
        assert_eq!(tracker.into_point(), -4.0);

        let mut point = 7.0;
        Assign::<f64>::merge(&mut point, 2.0);
        assert_eq!(point, 2.0);
    }
}
