use core::fmt;
use std::{
    borrow::Cow,
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    time::{Duration, Instant},
};

use crate::error::{OTelSdkError, OTelSdkResult};
use crate::Resource;
use opentelemetry::{otel_debug, otel_error, otel_info, otel_warn, InstrumentationScope};

use super::{
    collector::{CollectorId, MetricCollector},
    error::{MetricError, MetricResult},
    exporter::PushMetricExporter,
    internal::STREAM_CARDINALITY_LIMIT,
    meter::{Meter, MeterSharedState},
    reader::MetricReader,
    PeriodicReader,
};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct ScopeRegistry {
    /// First use order, which is also the order scopes are reported in.
    ordered: Vec<Arc<MeterSharedState>>,
    index: HashMap<InstrumentationScope, usize>,
}

/// State shared by everything a provider creates: the resource, the scope
/// registry and the registered collectors.
///
/// The provider owns meter states and collectors; collectors point back here
/// through a `Weak`, so nothing forms a cycle.
pub(crate) struct ProviderSharedState {
    resource: Resource,
    scopes: RwLock<ScopeRegistry>,
    collectors: RwLock<Vec<Arc<MetricCollector>>>,
    cardinality_limit: usize,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for ProviderSharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSharedState")
            .field("resource", &self.resource)
            .field("cardinality_limit", &self.cardinality_limit)
            .field("is_shutdown", &self.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

impl ProviderSharedState {
    fn new(resource: Resource, cardinality_limit: usize) -> Self {
        ProviderSharedState {
            resource,
            scopes: RwLock::new(ScopeRegistry::default()),
            collectors: RwLock::new(Vec::new()),
            cardinality_limit,
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Creates the collector for `reader` and hands the reader a weak
    /// reference to it.
    pub(crate) fn register_collector(
        self: &Arc<Self>,
        reader: Box<dyn MetricReader>,
    ) -> MetricResult<Arc<MetricCollector>> {
        let collector = {
            let mut collectors = self.collectors.write()?;
            if self.is_shutdown.load(Ordering::Acquire) {
                return Err(MetricError::AlreadyShutdown);
            }
            let id = CollectorId::new(collectors.len());
            let collector = Arc::new(MetricCollector::new(id, reader, Arc::downgrade(self)));
            collectors.push(Arc::clone(&collector));
            collector
        };

        collector.attach();
        otel_debug!(
            name: "MeterProvider.CollectorRegistered",
            collector = collector.id().index() as u64
        );
        Ok(collector)
    }

    /// Snapshot of the scope registry in first use order.
    pub(crate) fn meter_states(&self) -> Vec<Arc<MeterSharedState>> {
        self.scopes
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .ordered
            .clone()
    }

    /// Returns the state of `scope`, creating it on first use.
    pub(crate) fn meter_state(
        self: &Arc<Self>,
        scope: InstrumentationScope,
    ) -> Arc<MeterSharedState> {
        {
            let scopes = self.scopes.read().unwrap_or_else(|err| err.into_inner());
            if let Some(&i) = scopes.index.get(&scope) {
                return Arc::clone(&scopes.ordered[i]);
            }
        }

        let mut scopes = self.scopes.write().unwrap_or_else(|err| err.into_inner());
        if let Some(&i) = scopes.index.get(&scope) {
            return Arc::clone(&scopes.ordered[i]);
        }
        let state = Arc::new(MeterSharedState::new(
            scope.clone(),
            self.cardinality_limit,
            Arc::downgrade(self),
        ));
        otel_debug!(
            name: "MeterProvider.NewMeterCreated",
            meter_name = scope.name(),
        );
        let i = scopes.ordered.len();
        scopes.ordered.push(Arc::clone(&state));
        scopes.index.insert(scope, i);
        state
    }

    pub(crate) fn collector_count(&self) -> usize {
        self.collectors
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub(crate) fn resource(&self) -> &Resource {
        &self.resource
    }

    pub(crate) fn collectors(&self) -> Vec<Arc<MetricCollector>> {
        self.collectors
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    fn force_flush(&self, timeout: Duration) -> OTelSdkResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        let deadline = Instant::now().checked_add(timeout);
        combine(
            self.collectors()
                .iter()
                .map(|c| c.force_flush(remaining(deadline, timeout))),
        )
    }

    /// Rejects further registrations, then shuts every collector down.
    /// Returns `Ok` without doing anything when already shut down.
    fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        let deadline = Instant::now().checked_add(timeout);
        let collectors = {
            let collectors = self.collectors.write().unwrap_or_else(|err| err.into_inner());
            if self.is_shutdown.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            collectors.clone()
        };

        combine(
            collectors
                .iter()
                .map(|c| c.shutdown(remaining(deadline, timeout))),
        )
    }
}

impl Drop for SdkMeterProviderInner {
    fn drop(&mut self) {
        // If user has already shutdown the provider manually by calling
        // shutdown(), then we don't need to call shutdown again.
        if self.state.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
        } else {
            otel_info!(
                name: "MeterProvider.Drop",
                message = "Last reference of MeterProvider dropped, initiating shutdown."
            );
            if let Err(err) = self.state.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
                otel_error!(
                    name: "MeterProvider.Drop.ShutdownFailed",
                    message = "Shutdown attempt failed during drop of MeterProvider.",
                    reason = format!("{}", err)
                );
            }
        }
    }
}

/// Time left until `deadline`. Without a deadline the whole `timeout` is
/// handed on, which only happens when it does not fit into an `Instant`.
fn remaining(deadline: Option<Instant>, timeout: Duration) -> Duration {
    deadline.map_or(timeout, |deadline| {
        deadline.saturating_duration_since(Instant::now())
    })
}

/// Folds per collector lifecycle results into one.
fn combine(results: impl Iterator<Item = OTelSdkResult>) -> OTelSdkResult {
    let mut errs: Vec<OTelSdkError> = results.filter_map(Result::err).collect();
    match errs.len() {
        0 => Ok(()),
        1 => Err(errs.remove(0)),
        _ => Err(OTelSdkError::InternalFailure(format!("{errs:?}"))),
    }
}

/// Handles the creation and coordination of [Meter]s.
///
/// All `Meter`s created by a `SdkMeterProvider` are associated with the same
/// [Resource] and have their measurements collected by every registered
/// [MetricReader]. This is a clonable handle to the provider; cloning it
/// creates a new reference, not a new provider. Dropping the last reference
/// triggers shutdown. Shutdown can also be triggered manually by calling the
/// `shutdown` method.
#[derive(Clone, Debug)]
pub struct SdkMeterProvider {
    inner: Arc<SdkMeterProviderInner>,
}

/// Shuts the provider down when the last handle is dropped, while the shared
/// state is still reachable for a final export.
#[derive(Debug)]
struct SdkMeterProviderInner {
    state: Arc<ProviderSharedState>,
}

impl Default for SdkMeterProvider {
    fn default() -> Self {
        SdkMeterProvider::builder().build()
    }
}

impl SdkMeterProvider {
    /// Return default [MeterProviderBuilder]
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns the meter of the scope called `name`.
    ///
    /// Meters with the same name, version and schema url share their
    /// instruments.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns the meter of `scope`.
    ///
    /// After shutdown the returned meter creates instruments that record
    /// nothing.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if self.inner.state.is_shutdown.load(Ordering::Relaxed) {
            otel_debug!(
                name: "MeterProvider.NoOpMeterReturned",
                meter_name = scope.name(),
            );
            return Meter::noop();
        }

        if scope.name().is_empty() {
            otel_info!(name: "MeterNameEmpty", message = "Meter name is empty; consider providing a meaningful name. Meter will function normally and the provided name will be used as-is.");
        };

        Meter::new(self.inner.state.meter_state(scope))
    }

    /// The resource every collection of this provider reports.
    pub fn resource(&self) -> &Resource {
        self.inner.state.resource()
    }

    /// Flushes every registered reader.
    ///
    /// There is no guaranteed that all telemetry be flushed or all resources have
    /// been released on error.
    pub fn force_flush(&self) -> OTelSdkResult {
        self.force_flush_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Flushes every registered reader, sharing one deadline.
    pub fn force_flush_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.inner.state.force_flush(timeout)
    }

    /// Shuts down the meter provider flushing all pending telemetry and releasing
    /// any held computational resources.
    ///
    /// This call is idempotent. The first call performs the shutdown of every
    /// reader; later calls do nothing and return `Ok`. After shutdown no
    /// reader can collect and meters record nothing.
    pub fn shutdown(&self) -> OTelSdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Same as [shutdown](SdkMeterProvider::shutdown) with a deadline shared
    /// by all readers.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        otel_info!(
            name: "MeterProvider.Shutdown",
            message = "User initiated shutdown of MeterProvider."
        );
        self.inner.state.shutdown(timeout)
    }
}

/// Configuration options for a [SdkMeterProvider].
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    readers: Vec<Box<dyn MetricReader>>,
    cardinality_limit: usize,
}

impl Default for MeterProviderBuilder {
    fn default() -> Self {
        MeterProviderBuilder {
            resource: None,
            readers: Vec::new(),
            cardinality_limit: STREAM_CARDINALITY_LIMIT,
        }
    }
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [SdkMeterProvider].
    ///
    /// This [Resource] represents the entity producing telemetry and is associated
    /// with all [Meter]s the [SdkMeterProvider] will create.
    ///
    /// By default, if this option is not used, the default [Resource] will be used.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Associates a [MetricReader] with a [SdkMeterProvider].
    /// [`MeterProviderBuilder::with_periodic_exporter()`] can be used to add a
    /// PeriodicReader which is the most common use case.
    ///
    /// A [SdkMeterProvider] will export no metrics without [MetricReader]
    /// added. Readers are registered in the order they are added.
    pub fn with_reader<T: MetricReader>(mut self, reader: T) -> Self {
        self.readers.push(Box::new(reader));
        self
    }

    /// Adds a [`PushMetricExporter`] to the [`SdkMeterProvider`] and configures it
    /// to export metrics at **fixed** intervals (60 seconds) using a
    /// [`PeriodicReader`].
    ///
    /// To customize the export interval, set the
    /// **"OTEL_METRIC_EXPORT_INTERVAL"** environment variable (in
    /// milliseconds), or build the reader with
    /// [`PeriodicReader::builder`] and attach it using
    /// [`MeterProviderBuilder::with_reader()`].
    pub fn with_periodic_exporter<T>(mut self, exporter: T) -> Self
    where
        T: PushMetricExporter,
    {
        let reader = PeriodicReader::builder(exporter).build();
        self.readers.push(Box::new(reader));
        self
    }

    /// Sets the maximum number of distinct attribute sets each instrument
    /// keeps per aggregation. Further sets are folded into the
    /// `otel.metric.overflow=true` series.
    ///
    /// Defaults to 2000. A limit of zero is ignored.
    pub fn with_cardinality_limit(mut self, limit: usize) -> Self {
        if limit == 0 {
            otel_warn!(
                name: "MeterProvider.InvalidCardinalityLimit",
                message = "cardinality limit must be greater than zero; keeping the current limit"
            );
        } else {
            self.cardinality_limit = limit;
        }
        self
    }

    /// Construct a new [SdkMeterProvider] with this configuration.
    pub fn build(self) -> SdkMeterProvider {
        otel_debug!(
            name: "MeterProvider.Building",
            builder = format!("{:?}", &self),
        );

        let state = Arc::new(ProviderSharedState::new(
            self.resource.unwrap_or_else(|| Resource::builder().build()),
            self.cardinality_limit,
        ));
        for reader in self.readers {
            if let Err(err) = state.register_collector(reader) {
                otel_error!(
                    name: "MeterProvider.ReaderRegistrationFailed",
                    reason = format!("{}", err)
                );
            }
        }

        otel_info!(
            name: "MeterProvider.Built",
            readers = state.collector_count() as u64
        );
        SdkMeterProvider {
            inner: Arc::new(SdkMeterProviderInner { state }),
        }
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("readers", &self.readers)
            .field("cardinality_limit", &self.cardinality_limit)
            .finish()
    }
}
