use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::mem;
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use crate::metrics::aggregation::{is_aggregator_compatible, Aggregation};
use crate::metrics::attribute_set::{AttributeSet, OVERFLOW_ATTRIBUTE_SET};
use crate::metrics::collector::{CollectorId, MetricCollectorHandle};
use crate::metrics::data::{AggregatedMetrics, MetricData};
use crate::metrics::error::MetricResult;
use crate::metrics::instrument::{
    AsyncInstrument, InstrumentDescriptor, InstrumentKind, SyncInstrument,
};
use crate::metrics::Temporality;
use crate::KeyValue;

use super::exponential_histogram::{ExpoConfig, ExpoTracker};
use super::histogram::{HistogramConfig, HistogramTracker};
use super::last_value::Assign;
use super::precomputed_sum::Observed;
use super::sum::{Increment, SumConfig};
use super::value_map::{distinct_sets, ValueMap};
use super::{Aggregator, CollectionWindow, Number};

/// Who is collecting and when.
pub(crate) struct CollectRequest<'a> {
    pub(crate) handle: &'a dyn MetricCollectorHandle,
    /// The single timestamp of this collection.
    pub(crate) time: SystemTime,
}

/// The outcome of collecting one instrument for one collector.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) data: Option<AggregatedMetrics>,
    /// The reported data holds the overflow series.
    pub(crate) overflowed: bool,
}

/// Type-erased view of an [`Accumulator`] used by the meter.
pub(crate) trait InstrumentCollect: Send + Sync {
    fn descriptor(&self) -> &InstrumentDescriptor;

    fn collect(
        &self,
        request: &CollectRequest<'_>,
        aggregation: &Aggregation,
    ) -> MetricResult<Collected>;
}

/// One aggregation of one instrument.
trait AggregateStream<T>: Send + Sync {
    fn aggregation(&self) -> &Aggregation;

    fn measure(&self, value: T, attributes: &AttributeSet);

    /// Starts keeping unreported data for `collector`. Idempotent.
    fn attach(&self, collector: CollectorId);

    fn collect(&self, request: &CollectRequest<'_>) -> Option<MetricData<T>>;

    #[cfg(test)]
    fn attached(&self) -> Vec<usize>;
}

/// What one collector has not seen yet, plus what it needs to report
/// cumulative totals or observable deltas.
struct CollectorSlot<P> {
    unreported: HashMap<AttributeSet, P>,
    cumulative: HashMap<AttributeSet, P>,
    reported: HashMap<AttributeSet, P>,
    last_collection: SystemTime,
}

impl<P> CollectorSlot<P> {
    fn new(start: SystemTime) -> Self {
        CollectorSlot {
            unreported: HashMap::new(),
            cumulative: HashMap::new(),
            reported: HashMap::new(),
            last_collection: start,
        }
    }
}

struct Stream<A: Aggregator> {
    aggregation: Aggregation,
    kind: InstrumentKind,
    values: ValueMap<A>,
    slots: Mutex<Vec<Option<CollectorSlot<A::Point>>>>,
    created: SystemTime,
    cardinality_limit: usize,
}

impl<A: Aggregator> Stream<A> {
    fn new(
        aggregation: Aggregation,
        kind: InstrumentKind,
        config: A::InitConfig,
        cardinality_limit: usize,
    ) -> Self {
        Stream {
            aggregation,
            kind,
            values: ValueMap::new(config, cardinality_limit),
            slots: Mutex::new(Vec::new()),
            created: SystemTime::now(),
            cardinality_limit,
        }
    }

    fn attach_slot(&self, slots: &mut Vec<Option<CollectorSlot<A::Point>>>, index: usize) {
        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }
        if slots[index].is_none() {
            slots[index] = Some(CollectorSlot::new(self.created));
        }
    }

    /// Merges a point into a per collector table, folding new attribute sets
    /// into the overflow series once the table is full.
    fn fold(&self, table: &mut HashMap<AttributeSet, A::Point>, attrs: AttributeSet, point: A::Point) {
        let key = if attrs.is_empty()
            || table.contains_key(&attrs)
            || distinct_sets(table) < self.cardinality_limit
        {
            attrs
        } else {
            OVERFLOW_ATTRIBUTE_SET.clone()
        };
        match table.entry(key) {
            Entry::Occupied(mut entry) => A::merge(entry.get_mut(), point),
            Entry::Vacant(entry) => {
                entry.insert(point);
            }
        }
    }
}

impl<A: Aggregator> AggregateStream<A::PreComputedValue> for Stream<A> {
    fn aggregation(&self) -> &Aggregation {
        &self.aggregation
    }

    fn measure(&self, value: A::PreComputedValue, attributes: &AttributeSet) {
        self.values.measure(value, attributes)
    }

    fn attach(&self, collector: CollectorId) {
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        self.attach_slot(&mut slots, collector.index());
    }

    #[cfg(test)]
    fn attached(&self) -> Vec<usize> {
        let slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|_| index))
            .collect()
    }

    fn collect(&self, request: &CollectRequest<'_>) -> Option<MetricData<A::PreComputedValue>> {
        let temporality = request.handle.temporality(self.kind);
        let id = request.handle.id().index();

        // Held while draining so collections of this stream are applied in
        // drain order.
        let mut slots = self.slots.lock().unwrap_or_else(|err| err.into_inner());
        // a collector this stream was not created for starts from here
        self.attach_slot(&mut slots, id);

        let drained: Vec<(AttributeSet, A::Point)> = self
            .values
            .drain()
            .into_iter()
            .map(|(attrs, tracker)| (attrs, tracker.into_point()))
            .collect();

        // only collectors attached to this stream keep unreported data
        let mut attached: Vec<&mut CollectorSlot<A::Point>> = slots.iter_mut().flatten().collect();
        if let Some((last, rest)) = attached.split_last_mut() {
            for slot in rest {
                for (attrs, point) in &drained {
                    self.fold(&mut slot.unreported, attrs.clone(), point.clone());
                }
            }
            for (attrs, point) in drained {
                self.fold(&mut last.unreported, attrs, point);
            }
        }

        let slot = slots[id].as_mut()?;
        let unreported = mem::take(&mut slot.unreported);
        let (start, points): (SystemTime, Vec<(AttributeSet, A::Point)>) =
            match (self.kind.is_async(), temporality) {
                (false, Temporality::Delta) => {
                    (slot.last_collection, unreported.into_iter().collect())
                }
                (false, _) => {
                    for (attrs, point) in unreported {
                        self.fold(&mut slot.cumulative, attrs, point);
                    }
                    let points = slot
                        .cumulative
                        .iter()
                        .map(|(attrs, point)| (attrs.clone(), point.clone()))
                        .collect();
                    (self.created, points)
                }
                (true, Temporality::Delta) => {
                    let points = unreported
                        .iter()
                        .map(|(attrs, current)| {
                            let delta = match slot.reported.get(attrs) {
                                Some(previous) => A::delta(current, previous),
                                None => current.clone(),
                            };
                            (attrs.clone(), delta)
                        })
                        .collect();
                    slot.reported = unreported;
                    (slot.last_collection, points)
                }
                (true, _) => (self.created, unreported.into_iter().collect()),
            };
        slot.last_collection = request.time;

        if points.is_empty() {
            return None;
        }

        let points = points
            .into_iter()
            .map(|(attrs, point)| (attrs.into_vec(), point))
            .collect();
        Some(A::to_data(
            self.values.config(),
            points,
            CollectionWindow {
                start,
                time: request.time,
                temporality,
            },
        ))
    }
}

/// Histograms do not report a sum for instruments that can record negative
/// values.
fn records_sum(kind: InstrumentKind) -> bool {
    !matches!(
        kind,
        InstrumentKind::UpDownCounter
            | InstrumentKind::ObservableUpDownCounter
            | InstrumentKind::Gauge
            | InstrumentKind::ObservableGauge
    )
}

/// Builds the stream for a resolved aggregation, `None` for aggregations that
/// keep no data.
fn new_stream<T: Number>(
    aggregation: &Aggregation,
    kind: InstrumentKind,
    cardinality_limit: usize,
) -> Option<Arc<dyn AggregateStream<T>>> {
    let agg = aggregation.clone();
    match aggregation {
        Aggregation::Drop | Aggregation::Default => None,
        Aggregation::Sum => {
            let config = SumConfig {
                monotonic: kind.is_monotonic(),
            };
            if kind.is_async() {
                Some(Arc::new(Stream::<Observed<T>>::new(
                    agg,
                    kind,
                    config,
                    cardinality_limit,
                )))
            } else {
                Some(Arc::new(Stream::<Increment<T>>::new(
                    agg,
                    kind,
                    config,
                    cardinality_limit,
                )))
            }
        }
        Aggregation::LastValue => Some(Arc::new(Stream::<Assign<T>>::new(
            agg,
            kind,
            (),
            cardinality_limit,
        ))),
        Aggregation::ExplicitBucketHistogram {
            boundaries,
            record_min_max,
        } => {
            let config = HistogramConfig {
                bounds: boundaries.as_slice().into(),
                record_min_max: *record_min_max,
                record_sum: records_sum(kind),
            };
            Some(Arc::new(Stream::<HistogramTracker<T>>::new(
                agg,
                kind,
                config,
                cardinality_limit,
            )))
        }
        Aggregation::Base2ExponentialHistogram {
            max_size,
            max_scale,
            record_min_max,
        } => {
            let config = ExpoConfig {
                max_size: i32::try_from(*max_size).unwrap_or(i32::MAX),
                max_scale: *max_scale,
                record_min_max: *record_min_max,
                record_sum: records_sum(kind),
            };
            Some(Arc::new(Stream::<ExpoTracker<T>>::new(
                agg,
                kind,
                config,
                cardinality_limit,
            )))
        }
    }
}

/// The measurement store of one instrument.
///
/// Holds one stream per distinct aggregation its collectors resolved. Streams
/// for the collectors known at creation exist from the start, so they see
/// every measurement; a stream first requested by a later collection starts
/// empty.
pub(crate) struct Accumulator<T> {
    descriptor: InstrumentDescriptor,
    cardinality_limit: usize,
    streams: RwLock<Vec<Arc<dyn AggregateStream<T>>>>,
}

impl<T: Number> Accumulator<T> {
    /// Creates the accumulator with a stream for every aggregation in
    /// `collectors`, each collector attached to the stream it selected.
    ///
    /// Invalid or incompatible selections get no stream; they are reported
    /// when that collector collects.
    pub(crate) fn new(
        descriptor: InstrumentDescriptor,
        cardinality_limit: usize,
        collectors: &[(CollectorId, Aggregation)],
    ) -> Self {
        let mut streams: Vec<Arc<dyn AggregateStream<T>>> = Vec::new();
        for (id, aggregation) in collectors {
            let resolved = aggregation.resolve(&descriptor);
            if resolved.validate().is_err()
                || is_aggregator_compatible(descriptor.kind, &resolved).is_err()
            {
                continue;
            }
            let existing = streams.iter().find(|s| *s.aggregation() == resolved).cloned();
            let stream = match existing {
                Some(stream) => stream,
                None => {
                    let Some(stream) = new_stream(&resolved, descriptor.kind, cardinality_limit)
                    else {
                        continue;
                    };
                    streams.push(Arc::clone(&stream));
                    stream
                }
            };
            stream.attach(*id);
        }

        Accumulator {
            descriptor,
            cardinality_limit,
            streams: RwLock::new(streams),
        }
    }

    pub(crate) fn record(&self, value: T, attributes: &[KeyValue]) {
        let attributes = AttributeSet::from(attributes);
        let streams = self.streams.read().unwrap_or_else(|err| err.into_inner());
        for stream in streams.iter() {
            stream.measure(value, &attributes);
        }
    }

    fn stream_for(&self, aggregation: &Aggregation) -> Option<Arc<dyn AggregateStream<T>>> {
        {
            let streams = self.streams.read().unwrap_or_else(|err| err.into_inner());
            if let Some(stream) = streams.iter().find(|s| s.aggregation() == aggregation) {
                return Some(Arc::clone(stream));
            }
        }

        let mut streams = self.streams.write().unwrap_or_else(|err| err.into_inner());
        if let Some(stream) = streams.iter().find(|s| s.aggregation() == aggregation) {
            return Some(Arc::clone(stream));
        }
        let stream = new_stream(aggregation, self.descriptor.kind, self.cardinality_limit)?;
        streams.push(Arc::clone(&stream));
        Some(stream)
    }
}

impl<T: Number> InstrumentCollect for Accumulator<T> {
    fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    fn collect(
        &self,
        request: &CollectRequest<'_>,
        aggregation: &Aggregation,
    ) -> MetricResult<Collected> {
        let resolved = aggregation.resolve(&self.descriptor);
        resolved.validate()?;
        is_aggregator_compatible(self.descriptor.kind, &resolved)?;

        let Some(stream) = self.stream_for(&resolved) else {
            return Ok(Collected::default());
        };

        let Some(data) = stream.collect(request) else {
            return Ok(Collected::default());
        };
        let overflowed = has_overflow(&data);
        Ok(Collected {
            data: Some(T::into_aggregated_metrics(data)),
            overflowed,
        })
    }
}

fn has_overflow<T>(data: &MetricData<T>) -> bool {
    let overflow = OVERFLOW_ATTRIBUTE_SET.to_vec();
    let is_overflow = |attributes: &Vec<KeyValue>| *attributes == overflow;
    match data {
        MetricData::Gauge(g) => g.data_points.iter().any(|dp| is_overflow(&dp.attributes)),
        MetricData::Sum(s) => s.data_points.iter().any(|dp| is_overflow(&dp.attributes)),
        MetricData::Histogram(h) => h.data_points.iter().any(|dp| is_overflow(&dp.attributes)),
        MetricData::ExponentialHistogram(h) => {
            h.data_points.iter().any(|dp| is_overflow(&dp.attributes))
        }
    }
}

impl<T: Number> SyncInstrument<T> for Accumulator<T> {
    fn measure(&self, measurement: T, attributes: &[KeyValue]) {
        self.record(measurement, attributes)
    }
}

impl<T: Number> AsyncInstrument<T> for Accumulator<T> {
    fn observe(&self, measurement: T, attributes: &[KeyValue]) {
        self.record(measurement, attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::Sum;
    use crate::metrics::error::MetricError;
    use crate::metrics::instrument::ValueType;
    use std::time::Duration;

    struct TestHandle {
        id: usize,
        temporality: Temporality,
    }

    impl MetricCollectorHandle for TestHandle {
        fn id(&self) -> CollectorId {
            CollectorId::new(self.id)
        }

        fn temporality(&self, _kind: InstrumentKind) -> Temporality {
            self.temporality
        }
    }

    const DELTA: TestHandle = TestHandle {
        id: 0,
        temporality: Temporality::Delta,
    };
    const CUMULATIVE: TestHandle = TestHandle {
        id: 1,
        temporality: Temporality::Cumulative,
    };

    fn descriptor(kind: InstrumentKind, value_type: ValueType) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: "requests".into(),
            kind,
            unit: "".into(),
            description: "".into(),
            value_type,
            boundaries: None,
        }
    }

    /// Accumulator with both test collectors attached to the default
    /// aggregation.
    fn accumulator<T: Number>(
        kind: InstrumentKind,
        value_type: ValueType,
        cardinality_limit: usize,
    ) -> Accumulator<T> {
        Accumulator::new(
            descriptor(kind, value_type),
            cardinality_limit,
            &[
                (CollectorId::new(0), Aggregation::Default),
                (CollectorId::new(1), Aggregation::Default),
            ],
        )
    }

    fn collect<T: Number>(
        acc: &Accumulator<T>,
        handle: &TestHandle,
        aggregation: &Aggregation,
    ) -> MetricResult<Collected> {
        let request = CollectRequest {
            handle,
            time: SystemTime::now(),
        };
        acc.collect(&request, aggregation)
    }

    fn u64_sum(collected: Collected) -> Sum<u64> {
        match collected.data {
            Some(AggregatedMetrics::U64(MetricData::Sum(sum))) => sum,
            other => panic!("expected a u64 sum, got {other:?}"),
        }
    }

    fn total(sum: &Sum<u64>) -> u64 {
        sum.data_points.iter().map(|dp| dp.value).sum()
    }

    #[test]
    fn delta_reset_does_not_affect_other_collector() {
        let acc = accumulator::<u64>(InstrumentKind::Counter, ValueType::U64, 10);
        acc.record(5, &[]);
        acc.record(3, &[]);

        let delta = u64_sum(collect(&acc, &DELTA, &Aggregation::Default).unwrap());
        let cumulative = u64_sum(collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap());
        assert_eq!(total(&delta), 8);
        assert_eq!(delta.temporality, Temporality::Delta);
        assert_eq!(total(&cumulative), 8);
        assert_eq!(cumulative.temporality, Temporality::Cumulative);

        acc.record(2, &[]);
        // reverse the order of the two collections
        let cumulative = u64_sum(collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap());
        let delta = u64_sum(collect(&acc, &DELTA, &Aggregation::Default).unwrap());
        assert_eq!(total(&delta), 2);
        assert_eq!(total(&cumulative), 10);
        assert!(cumulative.start_time <= delta.start_time);
    }

    #[test]
    fn delta_with_nothing_new_reports_nothing() {
        let acc = accumulator::<u64>(InstrumentKind::Counter, ValueType::U64, 10);
        acc.record(1, &[KeyValue::new("k", "v")]);
        assert!(collect(&acc, &DELTA, &Aggregation::Default).unwrap().data.is_some());
        assert!(collect(&acc, &DELTA, &Aggregation::Default).unwrap().data.is_none());
        // the cumulative collector still sees the value
        assert_eq!(
            total(&u64_sum(collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap())),
            1
        );
    }

    #[test]
    fn delta_window_starts_at_previous_collection() {
        let acc = accumulator::<u64>(InstrumentKind::Counter, ValueType::U64, 10);
        acc.record(1, &[]);
        let first_time = SystemTime::now();
        let request = CollectRequest {
            handle: &DELTA,
            time: first_time,
        };
        acc.collect(&request, &Aggregation::Default).unwrap();

        acc.record(1, &[]);
        let second_time = first_time + Duration::from_secs(1);
        let request = CollectRequest {
            handle: &DELTA,
            time: second_time,
        };
        let sum = u64_sum(acc.collect(&request, &Aggregation::Default).unwrap());
        assert_eq!(sum.start_time, first_time);
        assert_eq!(sum.time, second_time);
    }

    #[test]
    fn observable_counter_reports_precomputed_deltas() {
        let acc = accumulator::<u64>(InstrumentKind::ObservableCounter, ValueType::U64, 10);
        acc.record(10, &[]);
        assert_eq!(total(&u64_sum(collect(&acc, &DELTA, &Aggregation::Default).unwrap())), 10);
        assert_eq!(
            total(&u64_sum(collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap())),
            10
        );

        acc.record(25, &[]);
        assert_eq!(total(&u64_sum(collect(&acc, &DELTA, &Aggregation::Default).unwrap())), 15);
        assert_eq!(
            total(&u64_sum(collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap())),
            25
        );

        // nothing observed since the last collection
        assert!(collect(&acc, &DELTA, &Aggregation::Default).unwrap().data.is_none());
    }

    #[test]
    fn last_value_keeps_most_recent_measurement() {
        let acc = accumulator::<i64>(InstrumentKind::Gauge, ValueType::I64, 10);
        acc.record(1, &[KeyValue::new("a", 1_i64), KeyValue::new("b", 2_i64)]);
        acc.record(7, &[KeyValue::new("b", 2_i64), KeyValue::new("a", 1_i64)]);

        let collected = collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap();
        let Some(AggregatedMetrics::I64(MetricData::Gauge(gauge))) = collected.data else {
            panic!("expected an i64 gauge");
        };
        assert_eq!(gauge.data_points.len(), 1);
        assert_eq!(gauge.data_points[0].value, 7);
    }

    #[test]
    fn overflow_is_flagged() {
        let acc = accumulator::<u64>(InstrumentKind::Counter, ValueType::U64, 2);
        for i in 0..4_i64 {
            acc.record(1, &[KeyValue::new("id", i)]);
        }

        let collected = collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap();
        assert!(collected.overflowed);
        let sum = u64_sum(collected);
        assert_eq!(sum.data_points.len(), 3);
        assert_eq!(total(&sum), 4);
    }

    #[test]
    fn drop_reports_nothing() {
        let acc = accumulator::<f64>(InstrumentKind::Histogram, ValueType::F64, 10);
        acc.record(1.0, &[]);
        let collected = collect(&acc, &DELTA, &Aggregation::Drop).unwrap();
        assert!(collected.data.is_none());
        assert!(!collected.overflowed);
    }

    #[test]
    fn invalid_aggregations_are_errors() {
        let acc = accumulator::<f64>(InstrumentKind::Counter, ValueType::F64, 10);
        let result = collect(&acc, &DELTA, &Aggregation::LastValue);
        assert!(matches!(result, Err(MetricError::Config(_))));

        let result = collect(
            &acc,
            &DELTA,
            &Aggregation::ExplicitBucketHistogram {
                boundaries: vec![5.0, 1.0],
                record_min_max: false,
            },
        );
        assert!(matches!(result, Err(MetricError::Config(_))));
    }

    #[test]
    fn new_aggregation_starts_empty() {
        let acc = accumulator::<f64>(InstrumentKind::Histogram, ValueType::F64, 10);
        acc.record(3.0, &[]);
        // first request creates the stream
        assert!(collect(&acc, &DELTA, &Aggregation::Sum).unwrap().data.is_none());

        acc.record(4.0, &[]);
        let collected = collect(&acc, &DELTA, &Aggregation::Sum).unwrap();
        let Some(AggregatedMetrics::F64(MetricData::Sum(sum))) = collected.data else {
            panic!("expected an f64 sum");
        };
        assert_eq!(sum.data_points[0].value, 4.0);

        // the default stream saw both measurements
        let collected = collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap();
        let Some(AggregatedMetrics::F64(MetricData::Histogram(hist))) = collected.data else {
            panic!("expected an f64 histogram");
        };
        assert_eq!(hist.data_points[0].count, 2);
        assert_eq!(hist.data_points[0].sum, 7.0);
    }

    #[test]
    fn selected_aggregations_see_measurements_from_creation() {
        // collector 0 sums the histogram, collector 1 keeps the default buckets
        let acc = Accumulator::<f64>::new(
            descriptor(InstrumentKind::Histogram, ValueType::F64),
            10,
            &[
                (CollectorId::new(0), Aggregation::Sum),
                (CollectorId::new(1), Aggregation::Default),
            ],
        );
        acc.record(3.0, &[]);
        acc.record(4.0, &[]);

        let collected = collect(&acc, &DELTA, &Aggregation::Sum).unwrap();
        let Some(AggregatedMetrics::F64(MetricData::Sum(sum))) = collected.data else {
            panic!("expected an f64 sum");
        };
        assert_eq!(sum.data_points[0].value, 7.0);

        let collected = collect(&acc, &CUMULATIVE, &Aggregation::Default).unwrap();
        let Some(AggregatedMetrics::F64(MetricData::Histogram(hist))) = collected.data else {
            panic!("expected an f64 histogram");
        };
        assert_eq!(hist.data_points[0].count, 2);

        // each stream keeps unreported data only for the collector using it
        let streams = acc.streams.read().unwrap();
        assert_eq!(streams.len(), 2);
        for stream in streams.iter() {
            let expected = match stream.aggregation() {
                Aggregation::Sum => vec![0],
                _ => vec![1],
            };
            assert_eq!(stream.attached(), expected);
        }
    }

    #[test]
    fn no_collectors_means_no_streams() {
        let acc = Accumulator::<u64>::new(
            descriptor(InstrumentKind::Counter, ValueType::U64),
            10,
            &[(CollectorId::new(0), Aggregation::Drop)],
        );
        acc.record(1, &[]);
        assert!(acc.streams.read().unwrap().is_empty());
        assert!(collect(&acc, &DELTA, &Aggregation::Drop).unwrap().data.is_none());
    }
}
