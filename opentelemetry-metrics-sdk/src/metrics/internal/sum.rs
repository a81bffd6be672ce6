use crate::metrics::data::{MetricData, Sum, SumDataPoint};
use crate::KeyValue;

use super::{Aggregator, AtomicTracker, CollectionWindow, Number};

pub(crate) struct SumConfig {
    pub(crate) monotonic: bool,
}

/// Summarizes measurements of one attribute set as their arithmetic sum.
pub(crate) struct Increment<T: Number> {
    value: T::AtomicTracker,
}

impl<T: Number> Aggregator for Increment<T> {
    type PreComputedValue = T;
    type InitConfig = SumConfig;
    type Point = T;

    fn create(_init: &SumConfig) -> Self {
        Self {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    fn update(&self, value: T) {
        self.value.add(value)
    }

    fn into_point(self) -> T {
        self.value.get_value()
    }

    fn merge(into: &mut T, later: T) {
        *into += later;
    }

    fn to_data(
        init: &SumConfig,
        points: Vec<(Vec<KeyValue>, T)>,
        window: CollectionWindow,
    ) -> MetricData<T> {
        MetricData::Sum(Sum {
            data_points: points
                .into_iter()
                .map(|(attributes, value)| SumDataPoint { attributes, value })
                .collect(),
            start_time: window.start,
            time: window.time,
            temporality: window.temporality,
            is_monotonic: init.monotonic,
        })
    }
}
