use std::{
    cell::RefCell,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Barrier,
    },
    time::{Duration, Instant},
};

use clap::{Parser, ValueEnum};
use num_format::{Locale, ToFormattedString};
use opentelemetry::KeyValue;
use opentelemetry_metrics_sdk::metrics::{Histogram, ManualReader, SdkMeterProvider, Temporality};
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliTemporality {
    Cumulative,
    Delta,
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Measure metrics performance while collecting",
    long_about = "The purpose of this test is to see how collecting interferes with measurements.\n\
    Recording threads keep updating a histogram while a reader collects, so the\n\
    numbers show whether collection stalls recording."
)]
struct Cli {
    /// Select collection phase temporality
    temporality: CliTemporality,

    /// How long to run, in seconds
    #[arg(long, default_value_t = 3)]
    seconds: u64,
}

const ATTRIBUTE_VALUES: [&str; 10] = [
    "value1", "value2", "value3", "value4", "value5", "value6", "value7", "value8", "value9",
    "value10",
];

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

fn main() {
    let cli = Cli::parse();
    let temporality = match cli.temporality {
        CliTemporality::Cumulative => Temporality::Cumulative,
        CliTemporality::Delta => Temporality::Delta,
    };
    let reader = ManualReader::builder()
        .with_temporality(temporality)
        .build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader.clone())
        .build();
    // use histogram, as it is a bit more complicated during collection
    let histogram = provider.meter("test").u64_histogram("hello").build();

    calculate_measurements_during_collection(
        histogram,
        reader,
        Duration::from_secs(cli.seconds),
    )
    .print_results();

    provider.shutdown().expect("shutdown succeeds");
}

fn calculate_measurements_during_collection(
    histogram: Histogram<u64>,
    reader: ManualReader,
    duration: Duration,
) -> MeasurementResults {
    // leave half of the CPUs to the operating system, so the recording threads
    // stay stable in performance
    let num_threads = (num_cpus::get() / 2).max(2);

    let mut res = MeasurementResults {
        total_measurements_count: 0,
        total_time_collecting: 0,
        num_iterations: 0,
        collection_errors: 0,
    };
    let start = Instant::now();
    while start.elapsed() < duration {
        res.num_iterations += 1;
        let is_collecting = AtomicBool::new(false);
        let measurements_while_collecting = AtomicUsize::new(0);
        let time_while_collecting = AtomicUsize::new(0);
        let collection_errors = AtomicUsize::new(0);
        let barrier = Barrier::new(num_threads + 1);
        std::thread::scope(|s| {
            // first create a bunch of measurements,
            // so that the collection phase isn't "empty"
            let handles: Vec<_> = (0..num_threads)
                .map(|_| {
                    s.spawn(|| {
                        for _ in 0..1000 {
                            record(&histogram);
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            // simultaneously start collecting and creating more measurements
            for _ in 0..num_threads - 1 {
                s.spawn(|| {
                    barrier.wait();
                    let now = Instant::now();
                    let mut count = 0;
                    while is_collecting.load(Ordering::Acquire) {
                        record(&histogram);
                        count += 1;
                    }
                    measurements_while_collecting.fetch_add(count, Ordering::AcqRel);
                    time_while_collecting
                        .fetch_add(now.elapsed().as_micros() as usize, Ordering::AcqRel);
                });
            }

            let collect_handle = s.spawn(|| {
                is_collecting.store(true, Ordering::Release);
                barrier.wait();
                let collected = reader.collect().expect("provider is running");
                collection_errors.fetch_add(collected.errors.len(), Ordering::AcqRel);
                is_collecting.store(false, Ordering::Release);
            });
            barrier.wait();
            collect_handle.join().unwrap();
        });
        res.total_measurements_count += measurements_while_collecting.load(Ordering::Acquire);
        res.total_time_collecting += time_while_collecting.load(Ordering::Acquire);
        res.collection_errors += collection_errors.load(Ordering::Acquire);
    }
    res
}

fn record(histogram: &Histogram<u64>) {
    let attributes = CURRENT_RNG.with_borrow_mut(random_attribute_set3);
    histogram.record(1, &attributes);
}

struct MeasurementResults {
    total_measurements_count: usize,
    total_time_collecting: usize,
    num_iterations: usize,
    collection_errors: usize,
}

impl MeasurementResults {
    fn print_results(&self) {
        println!(
            "{:>10.2} measurements/ms",
            self.total_measurements_count as f32 / (self.total_time_collecting as f32 / 1000.0f32)
        );
        println!(
            "{:>10.2} measurements/it",
            self.total_measurements_count as f32 / self.num_iterations as f32,
        );
        println!(
            "{:>10.2} μs/it",
            self.total_time_collecting as f32 / self.num_iterations as f32,
        );
        println!(
            "{:>10} iterations, {} collection errors",
            self.num_iterations.to_formatted_string(&Locale::en),
            self.collection_errors
        );
    }
}

fn random_attribute_set3(rng: &mut SmallRng) -> [KeyValue; 3] {
    let len = ATTRIBUTE_VALUES.len();
    [
        KeyValue::new("attribute1", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
        KeyValue::new("attribute2", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
        KeyValue::new("attribute3", ATTRIBUTE_VALUES[rng.random_range(0..len)]),
    ]
}
