use std::sync::{Arc, Mutex};

use crate::metrics::data::{Histogram, HistogramDataPoint, MetricData};
use crate::KeyValue;

use super::{Aggregator, CollectionWindow, Number};

pub(crate) struct HistogramConfig {
    pub(crate) bounds: Arc<[f64]>,
    pub(crate) record_min_max: bool,
    pub(crate) record_sum: bool,
}

/// Summarizes measurements of one attribute set as a histogram with
/// explicitly defined buckets.
pub(crate) struct HistogramTracker<T> {
    bounds: Arc<[f64]>,
    buckets: Mutex<Buckets<T>>,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Buckets<T> {
    counts: Vec<u64>,
    count: u64,
    total: T,
    min: T,
    max: T,
}

impl<T: Number> Buckets<T> {
    /// returns buckets with `n` bins.
    fn new(n: usize) -> Buckets<T> {
        Buckets {
            counts: vec![0; n],
            count: 0,
            total: T::default(),
            min: T::max(),
            max: T::min(),
        }
    }

    fn bin(&mut self, idx: usize, value: T) {
        self.counts[idx] += 1;
        self.count += 1;
        self.total += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value
        }
    }
}

impl<T: Number> Aggregator for HistogramTracker<T> {
    type PreComputedValue = T;
    type InitConfig = HistogramConfig;
    type Point = Buckets<T>;

    fn create(init: &HistogramConfig) -> Self {
        HistogramTracker {
            bounds: Arc::clone(&init.bounds),
            buckets: Mutex::new(Buckets::new(init.bounds.len() + 1)),
        }
    }

    fn update(&self, value: T) {
        let f = value.into_float();
        // Ignore NaN and infinity.
        if !f.is_finite() {
            return;
        }
        // This search will return an index in the range `[0, bounds.len()]`, where
        // it will return `bounds.len()` if value is greater than the last element
        // of `bounds`. This aligns with the buckets in that the length of buckets
        // is `bounds.len()+1`, with the last bucket representing:
        // `(bounds[bounds.len()-1], +∞)`.
        let index = self.bounds.partition_point(|&x| x < f);

        let mut buckets = self.buckets.lock().unwrap_or_else(|err| err.into_inner());
        buckets.bin(index, value);
    }

    fn into_point(self) -> Buckets<T> {
        self.buckets
            .into_inner()
            .unwrap_or_else(|err| err.into_inner())
    }

    fn merge(into: &mut Buckets<T>, later: Buckets<T>) {
        for (count, more) in into.counts.iter_mut().zip(later.counts) {
            *count += more;
        }
        into.count += later.count;
        into.total += later.total;
        if later.min < into.min {
            into.min = later.min;
        }
        if later.max > into.max {
            into.max = later.max;
        }
    }

    fn to_data(
        init: &HistogramConfig,
        points: Vec<(Vec<KeyValue>, Buckets<T>)>,
        window: CollectionWindow,
    ) -> MetricData<T> {
        let data_points = points
            .into_iter()
            .map(|(attributes, b)| {
                let has_values = init.record_min_max && b.count > 0;
                HistogramDataPoint {
                    attributes,
                    count: b.count,
                    bounds: init.bounds.to_vec(),
                    bucket_counts: b.counts,
                    min: has_values.then_some(b.min),
                    max: has_values.then_some(b.max),
                    sum: if init.record_sum {
                        b.total
                    } else {
                        T::default()
                    },
                }
            })
            .collect();

        MetricData::Histogram(Histogram {
            data_points,
            start_time: window.start,
            time: window.time,
            temporality: window.temporality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Temporality;
    use std::time::SystemTime;

    fn config(bounds: &[f64], record_sum: bool) -> HistogramConfig {
        HistogramConfig {
            bounds: bounds.into(),
            record_min_max: true,
            record_sum,
        }
    }

    fn window() -> CollectionWindow {
        let now = SystemTime::now();
        CollectionWindow {
            start: now,
            time: now,
            temporality: Temporality::Cumulative,
        }
    }

    #[test]
    fn values_land_in_upper_inclusive_buckets() {
        let config = config(&[0.0, 5.0, 10.0], true);
        let tracker = HistogramTracker::<f64>::create(&config);
        for v in [-1.0, 0.0, 5.0, 5.5, 10.0, 11.0, f64::NAN, f64::INFINITY] {
            tracker.update(v);
        }

        let point = tracker.into_point();
        assert_eq!(point.counts, vec![2, 1, 2, 1]);
        assert_eq!(point.count, 6);
        assert_eq!(point.total, 30.5);
        assert_eq!(point.min, -1.0);
        assert_eq!(point.max, 11.0);
    }

    #[test]
    fn merge_adds_counts_and_widens_range() {
        let config = config(&[10.0], true);
        let first = HistogramTracker::<u64>::create(&config);
        first.update(3);
        let second = HistogramTracker::<u64>::create(&config);
        second.update(12);
        second.update(1);

        let mut point = first.into_point();
        HistogramTracker::<u64>::merge(&mut point, second.into_point());
        assert_eq!(point.counts, vec![2, 1]);
        assert_eq!(point.count, 3);
        assert_eq!(point.total, 16);
        assert_eq!((point.min, point.max), (1, 12));
    }

    #[test]
    fn sum_is_omitted_when_disabled() {
        let config = config(&[1.0], false);
        let tracker = HistogramTracker::<i64>::create(&config);
        tracker.update(-5);

        let data = HistogramTracker::<i64>::to_data(
            &config,
            vec![(vec![], tracker.into_point())],
            window(),
        );
        let MetricData::Histogram(hist) = data else {
            unreachable!("histogram aggregation produced {data:?}")
        };
        let dp = &hist.data_points[0];
        assert_eq!(dp.sum, 0);
        assert_eq!(dp.min, Some(-5));
        assert_eq!(dp.bounds, vec![1.0]);
        assert_eq!(dp.bucket_counts, vec![1, 0]);
    }
}
