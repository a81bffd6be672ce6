//! The per reader collection orchestrator.
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crate::error::{OTelSdkError, OTelSdkResult};
use opentelemetry::otel_debug;

use super::aggregation::Aggregation;
use super::data::{CollectionResult, ResourceMetrics};
use super::error::{MetricError, MetricResult};
use super::meter::{MeterSharedState, ScopeCollection};
use super::meter_provider::ProviderSharedState;
use super::reader::MetricReader;
use super::{InstrumentKind, Temporality};

const ACTIVE: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const SHUTDOWN: u8 = 2;

/// Identity of a registered reader's collector.
///
/// Ids are small, dense and assigned in registration order; they never change
/// for the lifetime of the provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectorId(usize);

impl CollectorId {
    pub(crate) fn new(index: usize) -> Self {
        CollectorId(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for CollectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collector-{}", self.0)
    }
}

/// What an accumulator needs to know about the collector asking for data.
pub(crate) trait MetricCollectorHandle: Send + Sync {
    fn id(&self) -> CollectorId;

    /// Always `Cumulative` or `Delta`.
    fn temporality(&self, kind: InstrumentKind) -> Temporality;
}

/// Options for a single collection.
#[derive(Clone, Copy, Debug, Default)]
pub struct CollectOptions {
    /// Instruments not visited before this much time has passed are skipped
    /// and reported as a [`MetricError::Timeout`].
    pub timeout: Option<Duration>,
}

impl CollectOptions {
    /// Collect with a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        CollectOptions {
            timeout: Some(timeout),
        }
    }
}

/// Everything a meter needs for one collection by one collector.
pub(crate) struct CollectContext<'a> {
    pub(crate) collector: &'a MetricCollector,
    pub(crate) time: SystemTime,
    pub(crate) deadline: Option<(Instant, Duration)>,
}

/// Collects metrics for exactly one registered reader.
///
/// Created by the provider when a reader is registered. The reader receives a
/// weak reference and uses it to [collect](MetricCollector::collect).
pub struct MetricCollector {
    id: CollectorId,
    reader: Box<dyn MetricReader>,
    provider: Weak<ProviderSharedState>,
    state: AtomicU8,
}

impl fmt::Debug for MetricCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricCollector")
            .field("id", &self.id)
            .field("reader", &self.reader)
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish()
    }
}

impl MetricCollector {
    pub(crate) fn new(
        id: CollectorId,
        reader: Box<dyn MetricReader>,
        provider: Weak<ProviderSharedState>,
    ) -> Self {
        MetricCollector {
            id,
            reader,
            provider,
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// The identity of this collector.
    pub fn id(&self) -> CollectorId {
        self.id
    }

    /// Hands the reader its weak reference to this collector.
    pub(crate) fn attach(self: &Arc<Self>) {
        self.reader.register_collector(Arc::downgrade(self));
    }

    /// Produces one snapshot of every scope of the provider for this
    /// collector's reader.
    ///
    /// All scopes share one collection timestamp. Every scope is reported, in
    /// registration order, even when it has nothing to report this time, so a
    /// scope keeps its position across calls. Failures of single scopes or
    /// instruments are returned in [`CollectionResult::errors`]; only a shut
    /// down collector or provider makes the whole call fail.
    pub fn collect(&self, options: CollectOptions) -> MetricResult<CollectionResult> {
        if self.state.load(Ordering::Acquire) == SHUTDOWN {
            return Err(MetricError::AlreadyShutdown);
        }
        let provider = self.provider.upgrade().ok_or(MetricError::AlreadyShutdown)?;

        let time = SystemTime::now();
        let ctx = CollectContext {
            collector: self,
            time,
            // a timeout too large to add to now means no deadline
            deadline: options.timeout.and_then(|timeout| {
                Instant::now()
                    .checked_add(timeout)
                    .map(|deadline| (deadline, timeout))
            }),
        };

        let states = provider.meter_states();
        let collections: Vec<ScopeCollection> = if states.len() > 1 {
            thread::scope(|s| {
                let handles: Vec<_> = states
                    .iter()
                    .map(|state| {
                        let ctx = &ctx;
                        let spawned = thread::Builder::new()
                            .name("OTel metrics collect".to_string())
                            .spawn_scoped(s, move || state.collect(ctx));
                        (state, spawned)
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|(state, spawned)| match spawned {
                        Ok(handle) => handle.join().unwrap_or_else(|payload| {
                            ScopeCollection::failed(state.scope().clone(), panic_reason(&*payload))
                        }),
                        Err(_) => collect_inline(state, &ctx),
                    })
                    .collect()
            })
        } else {
            states.iter().map(|state| collect_inline(state, &ctx)).collect()
        };

        let mut scope_metrics = Vec::with_capacity(collections.len());
        let mut errors = Vec::new();
        for collection in collections {
            scope_metrics.push(collection.metrics);
            errors.extend(collection.errors);
        }

        otel_debug!(
            name: "MetricCollector.Collected",
            collector = self.id.index() as u64,
            scopes = scope_metrics.len() as u64,
            errors = errors.len() as u64
        );

        Ok(CollectionResult {
            resource_metrics: ResourceMetrics {
                resource: provider.resource().clone(),
                scope_metrics,
            },
            errors,
        })
    }

    /// Asks the reader to flush. Fails once shutdown has started.
    pub fn force_flush(&self, timeout: Duration) -> OTelSdkResult {
        if self.state.load(Ordering::Acquire) != ACTIVE {
            return Err(OTelSdkError::AlreadyShutdown);
        }
        self.reader.force_flush(timeout)
    }

    /// Shuts the reader down. Calling it again is a no-op.
    ///
    /// Collections are still admitted while the reader shuts down so it can
    /// export a final snapshot.
    pub fn shutdown(&self, timeout: Duration) -> OTelSdkResult {
        if self
            .state
            .compare_exchange(ACTIVE, SHUTTING_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        let result = self.reader.shutdown(timeout);
        self.state.store(SHUTDOWN, Ordering::Release);
        otel_debug!(
            name: "MetricCollector.Shutdown",
            collector = self.id.index() as u64,
            success = result.is_ok()
        );
        result
    }

    /// The temporality the reader wants for `kind`, with `LowMemory` resolved.
    pub fn temporality(&self, kind: InstrumentKind) -> Temporality {
        match self.reader.temporality(kind) {
            Temporality::LowMemory => kind.temporality_preference(Temporality::LowMemory),
            temporality => temporality,
        }
    }

    /// The aggregation the reader wants for `kind`.
    pub fn aggregation(&self, kind: InstrumentKind) -> Aggregation {
        self.reader.aggregation(kind)
    }
}

impl MetricCollectorHandle for MetricCollector {
    fn id(&self) -> CollectorId {
        self.id
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        MetricCollector::temporality(self, kind)
    }
}

fn collect_inline(state: &MeterSharedState, ctx: &CollectContext<'_>) -> ScopeCollection {
    panic::catch_unwind(AssertUnwindSafe(|| state.collect(ctx))).unwrap_or_else(|payload| {
        ScopeCollection::failed(state.scope().clone(), panic_reason(&*payload))
    })
}

pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        (*reason).to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "panicked".to_string()
    }
}
