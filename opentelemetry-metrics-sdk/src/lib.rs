//! # Metrics collection and aggregation pipeline
//!
//! This crate records measurements from application instruments and turns
//! them into consistent, point-in-time snapshots for any number of
//! independently configured metric readers.
//!
//! Each registered reader gets its own collector. Measurements are shared by
//! all collectors, but the state needed to report delta or cumulative values
//! is kept per collector, so a reader that resets its view on every collection
//! never disturbs a reader that reports totals since start.
//!
//! ## Getting started
//!
//! ```
//! use opentelemetry_metrics_sdk::metrics::{ManualReader, SdkMeterProvider};
//! use opentelemetry_metrics_sdk::{KeyValue, Resource};
//!
//! let reader = ManualReader::builder().build();
//! let provider = SdkMeterProvider::builder()
//!     .with_resource(Resource::builder().with_service_name("checkout").build())
//!     .with_reader(reader.clone())
//!     .build();
//!
//! let meter = provider.meter("checkout");
//! let orders = meter.u64_counter("orders").build();
//! orders.add(1, &[KeyValue::new("region", "eu")]);
//!
//! let collected = reader.collect().expect("provider is running");
//! assert!(collected.errors.is_empty());
//! assert_eq!(collected.resource_metrics.scope_metrics.len(), 1);
//! # provider.shutdown().unwrap();
//! ```
//!
//! ## Crate Feature Flags
//!
//! * `internal-logs` (enabled by default): emit internal diagnostics through
//!   the `opentelemetry` crate's `tracing` based logging macros.
//! * `testing`: exposes [`metrics::InMemoryMetricExporter`] for tests outside
//!   this crate.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod error;
pub mod metrics;
pub mod resource;

pub use opentelemetry::{InstrumentationScope, Key, KeyValue, Value};
pub use resource::Resource;
