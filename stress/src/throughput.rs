use num_format::{Locale, ToFormattedString};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const SLIDING_WINDOW_SIZE: u64 = 2; // In seconds
const BATCH_SIZE: u64 = 1000;

static STOP: AtomicBool = AtomicBool::new(false);

#[repr(C)]
#[derive(Default)]
struct WorkerStats {
    count: AtomicU64,
    // keep each counter on its own cache line
    padding: [u64; 15],
}

/// Runs `func` in a tight loop on all but one physical core and prints the
/// combined throughput every couple of seconds until Ctrl-C.
///
/// Returns the number of times `func` ran.
pub fn test_throughput<F>(func: F) -> u64
where
    F: Fn() + Sync + Send + 'static,
{
    ctrlc::set_handler(move || {
        STOP.store(true, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");
    let num_threads = num_cpus::get_physical().max(2);
    println!("Number of threads: {}", num_threads);
    let func_arc = Arc::new(func);

    let worker_stats: Arc<Vec<WorkerStats>> =
        Arc::new((0..num_threads).map(|_| WorkerStats::default()).collect());
    let worker_stats_monitor = Arc::clone(&worker_stats);

    let monitor = thread::spawn(move || {
        let mut start_time = Instant::now();
        let mut total_count_old: u64 = 0;
        while !STOP.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(500));
            let elapsed = start_time.elapsed().as_secs();
            if elapsed >= SLIDING_WINDOW_SIZE {
                let total_count: u64 = worker_stats_monitor
                    .iter()
                    .map(|stats| stats.count.load(Ordering::Relaxed))
                    .sum();
                let throughput = (total_count - total_count_old) / elapsed;
                total_count_old = total_count;
                println!(
                    "Throughput: {} iterations/sec",
                    throughput.to_formatted_string(&Locale::en)
                );
                start_time = Instant::now();
            }
        }
    });

    let workers: Vec<_> = (0..num_threads - 1)
        .map(|thread_index| {
            let worker_stats = Arc::clone(&worker_stats);
            let func = Arc::clone(&func_arc);
            thread::spawn(move || {
                while !STOP.load(Ordering::SeqCst) {
                    for _ in 0..BATCH_SIZE {
                        func();
                    }
                    worker_stats[thread_index]
                        .count
                        .fetch_add(BATCH_SIZE, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    monitor.join().unwrap();

    worker_stats
        .iter()
        .map(|stats| stats.count.load(Ordering::Relaxed))
        .sum()
}
