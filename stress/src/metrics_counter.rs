/*
    Measures Counter::add throughput while a delta reader collects every
    100ms, then checks that every recorded increment was collected exactly
    once.

    Run with: cargo run --release --bin metrics
    Stop with Ctrl-C.
*/

use num_format::{Locale, ToFormattedString};
use once_cell::sync::Lazy;
use opentelemetry::KeyValue;
use opentelemetry_metrics_sdk::metrics::{
    data::{AggregatedMetrics, CollectionResult, MetricData},
    Counter, ManualReader, SdkMeterProvider, Temporality,
};
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

mod throughput;

const ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

static READER: Lazy<ManualReader> = Lazy::new(|| {
    ManualReader::builder()
        .with_temporality(Temporality::Delta)
        .build()
});

static PROVIDER: Lazy<SdkMeterProvider> = Lazy::new(|| {
    SdkMeterProvider::builder()
        .with_reader(READER.clone())
        .build()
});

static COUNTER: Lazy<Counter<u64>> =
    Lazy::new(|| PROVIDER.meter("stress").u64_counter("hello").build());

static DONE: AtomicBool = AtomicBool::new(false);

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn main() {
    let collector = thread::spawn(|| {
        let mut collected = 0;
        while !DONE.load(Ordering::Acquire) {
            collected += total(READER.collect().expect("provider is running"));
            thread::sleep(Duration::from_millis(100));
        }
        collected
    });

    let recorded = throughput::test_throughput(test_counter);
    DONE.store(true, Ordering::Release);
    let mut collected = collector.join().unwrap();
    collected += total(READER.collect().expect("provider is running"));

    println!(
        "Recorded {} measurements, collected {}",
        recorded.to_formatted_string(&Locale::en),
        collected.to_formatted_string(&Locale::en)
    );
    assert_eq!(recorded, collected, "measurements were lost or duplicated");
    PROVIDER.shutdown().expect("shutdown succeeds");
}

fn test_counter() {
    let [first, second, third] = CURRENT_RNG.with_borrow_mut(|rng| {
        [
            rng.random_range(0..ATTRIBUTE_VALUES.len()),
            rng.random_range(0..ATTRIBUTE_VALUES.len()),
            rng.random_range(0..ATTRIBUTE_VALUES.len()),
        ]
    });

    // each attribute has 10 possible values, so there are 1000 possible combinations (time-series)
    COUNTER.add(
        1,
        &[
            KeyValue::new("attribute1", ATTRIBUTE_VALUES[first]),
            KeyValue::new("attribute2", ATTRIBUTE_VALUES[second]),
            KeyValue::new("attribute3", ATTRIBUTE_VALUES[third]),
        ],
    );
}

fn total(collected: CollectionResult) -> u64 {
    collected
        .resource_metrics
        .scope_metrics
        .iter()
        .flat_map(|scope| scope.metrics.iter())
        .map(|metric| match &metric.data {
            AggregatedMetrics::U64(MetricData::Sum(sum)) => {
                sum.data_points.iter().map(|dp| dp.value).sum()
            }
            _ => 0,
        })
        .sum()
}
