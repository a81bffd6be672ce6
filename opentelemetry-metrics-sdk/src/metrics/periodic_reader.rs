use std::{
    env, fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, Weak,
    },
    thread,
    time::{Duration, Instant},
};

use crate::error::{OTelSdkError, OTelSdkResult};
use opentelemetry::{otel_debug, otel_error, otel_info, otel_warn};

use super::{
    collector::{CollectOptions, MetricCollector},
    data::CollectionResult,
    error::{MetricError, MetricResult},
    exporter::PushMetricExporter,
    instrument::InstrumentKind,
    reader::MetricReader,
    Temporality,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

const METRIC_EXPORT_INTERVAL_NAME: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const METRIC_EXPORT_TIMEOUT_NAME: &str = "OTEL_METRIC_EXPORT_TIMEOUT";

/// Configuration options for [PeriodicReader].
///
/// A periodic reader is a [MetricReader] that collects and exports metric data
/// to the exporter at a defined interval.
///
/// By default, the returned [MetricReader] will collect and export data every
/// 60 seconds. The export time is not counted towards the interval between
/// attempts. The timeout bounds each collection and is passed on to the
/// exporter on shutdown.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    timeout: Duration,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: PushMetricExporter,
{
    fn new(exporter: E) -> Self {
        let interval = env::var(METRIC_EXPORT_INTERVAL_NAME)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_INTERVAL);
        let timeout = env::var(METRIC_EXPORT_TIMEOUT_NAME)
            .ok()
            .and_then(|v| v.parse().map(Duration::from_millis).ok())
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT);

        PeriodicReaderBuilder {
            interval,
            timeout,
            exporter,
        }
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable.
    ///
    /// If this option is not used or `interval` is equal to zero, 60 seconds is
    /// used as the default.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Configures the time allowed for each collection. Instruments not
    /// collected in time are reported as errors and picked up by the next
    /// export.
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_TIMEOUT`
    /// environment variable.
    ///
    /// If this option is not used or `timeout` is equal to zero, 30 seconds is used
    /// as the default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.timeout = timeout;
        }
        self
    }

    /// Create a [PeriodicReader] with the given config.
    pub fn build(self) -> PeriodicReader<E> {
        PeriodicReader::new(self.exporter, self.interval, self.timeout)
    }
}

/// A [MetricReader] that continuously collects and exports metric data at a set
/// interval.
///
/// By default, PeriodicReader will collect and export data every
/// 60 seconds. The export time is not counted towards the interval between
/// attempts. Exports run on a dedicated background thread; a flush or a
/// shutdown triggers an immediate export on that thread.
///
/// The exporter can be any exporter that implements [PushMetricExporter].
///
/// # Example
///
/// ```no_run
/// use opentelemetry_metrics_sdk::metrics::PeriodicReader;
/// # fn example<E>(get_exporter: impl Fn() -> E)
/// # where
/// #     E: opentelemetry_metrics_sdk::metrics::exporter::PushMetricExporter,
/// # {
///
/// let exporter = get_exporter(); // set up a push exporter
///
/// let reader = PeriodicReader::builder(exporter).build();
/// # drop(reader);
/// # }
/// ```
pub struct PeriodicReader<E: PushMetricExporter> {
    inner: Arc<PeriodicReaderInner<E>>,
}

impl<E: PushMetricExporter> Clone for PeriodicReader<E> {
    fn clone(&self) -> Self {
        PeriodicReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: PushMetricExporter> PeriodicReader<E> {
    /// Configuration options for a periodic reader
    pub fn builder(exporter: E) -> PeriodicReaderBuilder<E> {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new(exporter: E, interval: Duration, timeout: Duration) -> Self {
        let (message_sender, message_receiver): (Sender<Message>, Receiver<Message>) =
            mpsc::channel();
        let reader = PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                message_sender: Mutex::new(message_sender),
                is_shutdown: AtomicBool::new(false),
                collector: Mutex::new(None),
                exporter,
            }),
        };
        let cloned_reader = reader.clone();

        let result_thread_creation = thread::Builder::new()
            .name("OpenTelemetry.Metrics.PeriodicReader".to_string())
            .spawn(move || {
                let mut interval_start = Instant::now();
                let mut remaining_interval = interval;
                otel_info!(
                    name: "PeriodReaderThreadStarted",
                    interval_in_millisecs = interval.as_millis() as u64,
                    timeout_in_millisecs = timeout.as_millis() as u64
                );
                loop {
                    otel_debug!(
                        name: "PeriodReaderThreadLoopAlive",
                        message = "Next export will happen after interval, unless flush or shutdown is triggered.",
                        interval_in_millisecs = remaining_interval.as_millis() as u64
                    );
                    match message_receiver.recv_timeout(remaining_interval) {
                        Ok(Message::Flush(response_sender)) => {
                            otel_debug!(name: "PeriodReaderThreadExportingDueToFlush");
                            let result = cloned_reader
                                .inner
                                .collect_and_export(timeout)
                                .and_then(|_| cloned_reader.inner.exporter.force_flush());
                            let _ = response_sender.send(result);

                            // Adjust the remaining interval after the flush
                            let elapsed = interval_start.elapsed();
                            if elapsed < interval {
                                remaining_interval = interval - elapsed;
                                otel_debug!(
                                    name: "PeriodReaderThreadAdjustingRemainingIntervalAfterFlush",
                                    remaining_interval = remaining_interval.as_millis() as u64
                                );
                            } else {
                                otel_debug!(name: "PeriodReaderThreadAdjustingExportAfterFlush");
                                // The flush ran past the regular export time,
                                // so export again right away.
                                interval_start = Instant::now();
                                remaining_interval = Duration::ZERO;
                            }
                        }
                        Ok(Message::Shutdown(response_sender)) => {
                            // Perform final export and break out of loop and exit the thread
                            otel_debug!(name: "PeriodReaderThreadExportingDueToShutdown");
                            let export_result = cloned_reader.inner.collect_and_export(timeout);
                            let shutdown_result =
                                cloned_reader.inner.exporter.shutdown_with_timeout(timeout);
                            let _ = response_sender.send(export_result.and(shutdown_result));
                            break;
                        }
                        Err(mpsc::RecvTimeoutError::Timeout) => {
                            let export_start = Instant::now();
                            otel_debug!(name: "PeriodReaderThreadExportingDueToTimer");

                            if cloned_reader.inner.collect_and_export(timeout).is_err() {
                                otel_debug!(name: "PeriodReaderThreadExportingDueToTimerFailed");
                            }

                            let time_taken_for_export = export_start.elapsed();
                            if time_taken_for_export > interval {
                                otel_debug!(name: "PeriodReaderThreadExportTookLongerThanInterval");
                                // if export took longer than interval, do the
                                // next export immediately.
                                interval_start = Instant::now();
                                remaining_interval = Duration::ZERO;
                            } else {
                                remaining_interval = interval - time_taken_for_export;
                                interval_start = Instant::now();
                            }
                        }
                        Err(mpsc::RecvTimeoutError::Disconnected) => {
                            // Every reader handle is gone. Exit the thread.
                            break;
                        }
                    }
                }
                otel_info!(name: "PeriodReaderThreadStopped");
            });

        if let Err(e) = result_thread_creation {
            otel_error!(
                name: "PeriodReaderThreadStartError",
                message = "Failed to start PeriodicReader thread; no metrics will be exported.",
                error = format!("{:?}", e)
            );
        }
        reader
    }
}

impl<E: PushMetricExporter> fmt::Debug for PeriodicReader<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

struct PeriodicReaderInner<E> {
    exporter: E,
    message_sender: Mutex<Sender<Message>>,
    collector: Mutex<Option<Weak<MetricCollector>>>,
    is_shutdown: AtomicBool,
}

impl<E: PushMetricExporter> PeriodicReaderInner<E> {
    fn register_collector(&self, collector: Weak<MetricCollector>) {
        let _ = self.collector.lock().map(|mut inner| {
            if inner.is_none() {
                *inner = Some(collector);
            } else {
                otel_warn!(
                    name: "PeriodicReader.DuplicateRegistration",
                    message = "duplicate reader registration, did not register periodic reader"
                );
            }
        });
    }

    fn collect(&self, options: CollectOptions) -> MetricResult<CollectionResult> {
        let collector = self.collector.lock()?.clone();
        match collector {
            Some(weak) => weak
                .upgrade()
                .ok_or(MetricError::AlreadyShutdown)?
                .collect(options),
            None => Err(MetricError::Other("reader is not registered".into())),
        }
    }

    fn collect_and_export(&self, timeout: Duration) -> OTelSdkResult {
        let collected = match self.collect(CollectOptions::with_timeout(timeout)) {
            Ok(collected) => collected,
            Err(e) => {
                otel_warn!(
                    name: "PeriodReaderCollectError",
                    error = format!("{:?}", e)
                );
                return Err(OTelSdkError::InternalFailure(e.to_string()));
            }
        };

        for error in &collected.errors {
            otel_warn!(
                name: "PeriodReaderCollectionIssue",
                warning = error.is_warning(),
                error = format!("{}", error)
            );
        }

        if collected
            .resource_metrics
            .scope_metrics
            .iter()
            .all(|scope| scope.metrics.is_empty())
        {
            otel_debug!(name: "NoMetricsCollected");
            return Ok(());
        }

        // Relying on futures executor to execute async call. No timeout is
        // enforced here. The exporter is responsible for enforcing the timeout.
        let exporter_result =
            futures_executor::block_on(self.exporter.export(&collected.resource_metrics));
        if let Err(e) = &exporter_result {
            otel_warn!(
                name: "PeriodReaderExportError",
                error = format!("{:?}", e)
            );
        }
        exporter_result
    }

    /// Hands `message` to the background thread and waits for its answer.
    fn request(
        &self,
        message: impl FnOnce(Sender<OTelSdkResult>) -> Message,
        timeout: Duration,
    ) -> OTelSdkResult {
        let (response_tx, response_rx) = mpsc::channel();
        self.message_sender
            .lock()
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?
            .send(message(response_tx))
            .map_err(|e| OTelSdkError::InternalFailure(e.to_string()))?;

        match response_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => Err(OTelSdkError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(OTelSdkError::InternalFailure(
                "PeriodicReader thread exited without responding".into(),
            )),
        }
    }

    fn force_flush(&self, timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.load(Ordering::Relaxed) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        let result = self.request(Message::Flush, timeout);
        if let Err(e) = &result {
            otel_error!(
                name: "PeriodReaderForceFlushError",
                error = format!("{:?}", e)
            );
        }
        result
    }

    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        let result = self.request(Message::Shutdown, timeout);
        if let Err(e) = &result {
            otel_error!(
                name: "PeriodReaderShutdownError",
                error = format!("{:?}", e)
            );
        }
        result
    }
}

#[derive(Debug)]
enum Message {
    Flush(Sender<OTelSdkResult>),
    Shutdown(Sender<OTelSdkResult>),
}

impl<E: PushMetricExporter> MetricReader for PeriodicReader<E> {
    fn register_collector(&self, collector: Weak<MetricCollector>) {
        self.inner.register_collector(collector);
    }

    fn collect(&self) -> MetricResult<CollectionResult> {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(MetricError::AlreadyShutdown);
        }
        self.inner.collect(CollectOptions::default())
    }

    fn force_flush(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.force_flush(timeout)
    }

    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.shutdown(timeout)
    }

    fn temporality(&self, _kind: InstrumentKind) -> Temporality {
        self.inner.exporter.temporality()
    }
}
