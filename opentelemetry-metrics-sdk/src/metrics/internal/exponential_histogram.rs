use std::{f64::consts::LOG2_E, sync::Mutex};

use once_cell::sync::Lazy;

use crate::metrics::data::{
    ExponentialBucket, ExponentialHistogram, ExponentialHistogramDataPoint, MetricData,
};
use opentelemetry::{otel_debug, KeyValue};

use super::{Aggregator, CollectionWindow, Number};

pub(crate) const EXPO_MAX_SCALE: i8 = 20;
pub(crate) const EXPO_MIN_SCALE: i8 = -10;

pub(crate) struct ExpoConfig {
    pub(crate) max_size: i32,
    pub(crate) max_scale: i8,
    pub(crate) record_min_max: bool,
    pub(crate) record_sum: bool,
}

/// A single data point in an exponential histogram.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ExpoHistogramDataPoint<T> {
    count: usize,
    min: T,
    max: T,
    sum: T,

    max_size: i32,
    scale: i8,

    pos_buckets: ExpoBuckets,
    neg_buckets: ExpoBuckets,
    zero_count: u64,
}

impl<T: Number> ExpoHistogramDataPoint<T> {
    fn new(config: &ExpoConfig) -> Self {
        ExpoHistogramDataPoint {
            count: 0,
            min: T::max(),
            max: T::min(),
            sum: T::default(),
            max_size: config.max_size,
            scale: config.max_scale,
            pos_buckets: ExpoBuckets::default(),
            neg_buckets: ExpoBuckets::default(),
            zero_count: 0,
        }
    }

    /// Adds a new measurement to the histogram.
    ///
    /// It will rescale the buckets if needed.
    fn record(&mut self, v: T) {
        self.count += 1;

        if v < self.min {
            self.min = v;
        }
        if v > self.max {
            self.max = v;
        }
        self.sum += v;

        let abs_v = v.into_float().abs();

        if abs_v == 0.0 {
            self.zero_count += 1;
            return;
        }

        let mut bin = self.get_bin(abs_v);

        let v_is_negative = v < T::default();

        // If the new bin would make the counts larger than `max_scale`, we need to
        // downscale current measurements.
        let scale_delta = {
            let bucket = if v_is_negative {
                &self.neg_buckets
            } else {
                &self.pos_buckets
            };

            scale_change(
                self.max_size,
                bin,
                bucket.start_bin,
                bucket.counts.len() as i32,
            )
        };
        if scale_delta > 0 {
            if (self.scale - scale_delta as i8) < EXPO_MIN_SCALE {
                // With a scale of -10 there is only two buckets for the whole range of f64 values.
                // This can only happen if there is a max size of 1.
                otel_debug!(
                    name: "ExponentialHistogram.ScaleUnderflow",
                    scale = self.scale as i64,
                    delta = scale_delta as u64
                );
                return;
            }
            // Downscale
            self.scale -= scale_delta as i8;
            self.pos_buckets.downscale(scale_delta);
            self.neg_buckets.downscale(scale_delta);

            bin = self.get_bin(abs_v);
        }

        if v_is_negative {
            self.neg_buckets.record(bin)
        } else {
            self.pos_buckets.record(bin)
        }
    }

    /// the bin `v` should be recorded into.
    fn get_bin(&self, v: f64) -> i32 {
        let (frac, exp) = frexp(v);
        if self.scale <= 0 {
            // With negative scale `frac` is always 1 power of two higher than we want.
            let mut correction = 1;
            if frac == 0.5 {
                // If `v` is an exact power of two, `frac` will be `0.5` and the exp
                // will be then be two higher than we want.
                correction = 2;
            }
            return (exp - correction) >> -self.scale;
        }
        (exp << self.scale) + (frac.ln() * SCALE_FACTORS[self.scale as usize]) as i32 - 1
    }

    /// Folds `other` into `self` at the highest scale at which the buckets of
    /// both still fit in `max_size`.
    fn merge(&mut self, mut other: Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }

        let common = self.scale.min(other.scale);
        let own_shift = (self.scale - common) as u32;
        let other_shift = (other.scale - common) as u32;
        let change = merged_scale_change(
            self.max_size,
            self.pos_buckets.range_at(own_shift),
            other.pos_buckets.range_at(other_shift),
        )
        .max(merged_scale_change(
            self.max_size,
            self.neg_buckets.range_at(own_shift),
            other.neg_buckets.range_at(other_shift),
        ));
        let target = (common as i32 - change as i32).max(EXPO_MIN_SCALE as i32) as i8;

        self.downscale_to(target);
        other.downscale_to(target);

        self.pos_buckets.merge(&other.pos_buckets);
        self.neg_buckets.merge(&other.neg_buckets);
        self.count += other.count;
        self.zero_count += other.zero_count;
        self.sum += other.sum;
        if other.min < self.min {
            self.min = other.min;
        }
        if other.max > self.max {
            self.max = other.max;
        }
    }

    fn downscale_to(&mut self, scale: i8) {
        if scale >= self.scale {
            return;
        }
        let delta = (self.scale - scale) as u32;
        self.pos_buckets.downscale(delta);
        self.neg_buckets.downscale(delta);
        self.scale = scale;
    }
}

/// The magnitude of the scale change needed to fit bin in the bucket.
///
/// If no scale change is needed 0 is returned.
fn scale_change(max_size: i32, bin: i32, start_bin: i32, length: i32) -> u32 {
    if length == 0 {
        // No need to rescale if there are no buckets.
        return 0;
    }

    let mut low = start_bin;
    let mut high = bin;
    if start_bin >= bin {
        low = bin;
        high = start_bin + length - 1;
    }

    let mut count = 0u32;
    while high - low >= max_size {
        low >>= 1;
        high >>= 1;
        count += 1;

        if count > (EXPO_MAX_SCALE - EXPO_MIN_SCALE) as u32 {
            return count;
        }
    }

    count
}

/// The scale change needed for the union of two bin ranges to fit in
/// `max_size` buckets.
fn merged_scale_change(max_size: i32, a: Option<(i32, i32)>, b: Option<(i32, i32)>) -> u32 {
    let (mut low, mut high) = match (a, b) {
        (Some(a), Some(b)) => (a.0.min(b.0), a.1.max(b.1)),
        (Some(range), None) | (None, Some(range)) => range,
        (None, None) => return 0,
    };

    let mut count = 0u32;
    while high - low >= max_size {
        low >>= 1;
        high >>= 1;
        count += 1;
    }
    count
}

/// Constants used in calculating the logarithm index.
static SCALE_FACTORS: Lazy<[f64; 21]> = Lazy::new(|| {
    let mut factors = [0.0; 21];
    for (scale, factor) in factors.iter_mut().enumerate() {
        *factor = LOG2_E * 2f64.powi(scale as i32);
    }
    factors
});

/// Breaks the number into a normalized fraction and a base-2 exponent.
///
/// This impl is necessary as rust removed this functionality from std in
/// <https://github.com/rust-lang/rust/pull/41437>
#[inline(always)]
fn frexp(x: f64) -> (f64, i32) {
    let mut y = x.to_bits();
    let ee = ((y >> 52) & 0x7ff) as i32;

    if ee == 0 {
        if x != 0.0 {
            let x1p64 = f64::from_bits(0x43f0000000000000);
            let (x, e) = frexp(x * x1p64);
            return (x, e - 64);
        }
        return (x, 0);
    } else if ee == 0x7ff {
        return (x, 0);
    }

    let e = ee - 0x3fe;
    y &= 0x800fffffffffffff;
    y |= 0x3fe0000000000000;

    (f64::from_bits(y), e)
}

/// A set of buckets in an exponential histogram.
#[derive(Clone, Default, Debug, PartialEq)]
struct ExpoBuckets {
    start_bin: i32,
    counts: Vec<u64>,
}

impl ExpoBuckets {
    /// Increments the count for the given bin, and expands the buckets if needed.
    ///
    /// Size changes must be done before calling this function.
    fn record(&mut self, bin: i32) {
        if self.counts.is_empty() {
            self.counts = vec![1];
            self.start_bin = bin;
            return;
        }

        let end_bin = self.start_bin + self.counts.len() as i32 - 1;

        // if the new bin is inside the current range
        if bin >= self.start_bin && bin <= end_bin {
            self.counts[(bin - self.start_bin) as usize] += 1;
            return;
        }

        // if the new bin is before the current start, prepend the slots in `self.counts`
        if bin < self.start_bin {
            let mut zeroes = vec![0; (end_bin - bin + 1) as usize];
            let shift = (self.start_bin - bin) as usize;
            zeroes[shift..].copy_from_slice(&self.counts);
            self.counts = zeroes;
            self.counts[0] = 1;
            self.start_bin = bin;
        } else {
            // the new bin is after the end, initialize the slots up to the new bin
            self.counts.resize((bin - self.start_bin + 1) as usize, 0);
            self.counts[(bin - self.start_bin) as usize] = 1;
        }
    }

    /// Shrinks a bucket by a factor of 2*s.
    ///
    /// It will sum counts into the correct lower resolution bucket.
    fn downscale(&mut self, delta: u32) {
        // Example
        // delta = 2
        // original offset: -6
        // counts: [ 3,  1,  2,  3,  4,  5, 6, 7, 8, 9, 10]
        // bins:    -6  -5, -4, -3, -2, -1, 0, 1, 2, 3, 4
        // new bins:-2, -2, -1, -1, -1, -1, 0, 0, 0, 0, 1
        // new offset: -2
        // new counts: [4, 14, 30, 10]

        if self.counts.len() <= 1 || delta < 1 {
            self.start_bin >>= delta;
            return;
        }

        let steps = 1 << delta;
        let mut offset = self.start_bin % steps;
        offset = (offset + steps) % steps; // to make offset positive
        for i in 1..self.counts.len() {
            let idx = i + offset as usize;
            if idx % steps as usize == 0 {
                self.counts[idx / steps as usize] = self.counts[i];
                continue;
            }
            self.counts[idx / steps as usize] += self.counts[i];
        }

        let last_idx = (self.counts.len() as i32 - 1 + offset) / steps;
        self.counts.truncate(last_idx as usize + 1);
        self.start_bin >>= delta;
    }

    /// First and last bin after downscaling by `shift`, `None` when empty.
    fn range_at(&self, shift: u32) -> Option<(i32, i32)> {
        if self.counts.is_empty() {
            return None;
        }
        let end_bin = self.start_bin + self.counts.len() as i32 - 1;
        Some((self.start_bin >> shift, end_bin >> shift))
    }

    /// Adds the counts of `other`, which must have the same scale.
    fn merge(&mut self, other: &ExpoBuckets) {
        if other.counts.is_empty() {
            return;
        }
        if self.counts.is_empty() {
            *self = other.clone();
            return;
        }

        let start = self.start_bin.min(other.start_bin);
        let end = (self.start_bin + self.counts.len() as i32 - 1)
            .max(other.start_bin + other.counts.len() as i32 - 1);
        let mut counts = vec![0; (end - start + 1) as usize];
        for buckets in [&*self, other] {
            let shift = (buckets.start_bin - start) as usize;
            for (slot, count) in counts[shift..].iter_mut().zip(&buckets.counts) {
                *slot += count;
            }
        }
        self.start_bin = start;
        self.counts = counts;
    }
}

/// Summarizes measurements of one attribute set as an exponential histogram.
pub(crate) struct ExpoTracker<T> {
    point: Mutex<ExpoHistogramDataPoint<T>>,
}

impl<T: Number> Aggregator for ExpoTracker<T> {
    type PreComputedValue = T;
    type InitConfig = ExpoConfig;
    type Point = ExpoHistogramDataPoint<T>;

    fn create(init: &ExpoConfig) -> Self {
        ExpoTracker {
            point: Mutex::new(ExpoHistogramDataPoint::new(init)),
        }
    }

    fn update(&self, value: T) {
        let f_value = value.into_float();
        // Ignore NaN and infinity.
        if !f_value.is_finite() {
            return;
        }

        self.point
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .record(value)
    }

    fn into_point(self) -> ExpoHistogramDataPoint<T> {
        self.point.into_inner().unwrap_or_else(|err| err.into_inner())
    }

    fn merge(into: &mut Self::Point, later: Self::Point) {
        into.merge(later)
    }

    fn to_data(
        init: &ExpoConfig,
        points: Vec<(Vec<KeyValue>, Self::Point)>,
        window: CollectionWindow,
    ) -> MetricData<T> {
        let data_points = points
            .into_iter()
            .map(|(attributes, b)| {
                let has_values = init.record_min_max && b.count > 0;
                ExponentialHistogramDataPoint {
                    attributes,
                    count: b.count,
                    min: has_values.then_some(b.min),
                    max: has_values.then_some(b.max),
                    sum: if init.record_sum { b.sum } else { T::default() },
                    scale: b.scale,
                    zero_count: b.zero_count,
                    positive_bucket: ExponentialBucket {
                        offset: b.pos_buckets.start_bin,
                        counts: b.pos_buckets.counts,
                    },
                    negative_bucket: ExponentialBucket {
                        offset: b.neg_buckets.start_bin,
                        counts: b.neg_buckets.counts,
                    },
                    zero_threshold: 0.0,
                }
            })
            .collect();

        MetricData::ExponentialHistogram(ExponentialHistogram {
            data_points,
            start_time: window.start,
            time: window.time,
            temporality: window.temporality,
        })
    }
}
