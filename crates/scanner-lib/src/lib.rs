//! Scanner library for finding wasted cloud resources
//!
//! This crate provides the core functionality for:
//! - A bounded-concurrency pipeline engine with per-resource failure isolation
//! - Reusable classification rules (exclusion tags, age gates, activity tests)
//! - Memoized hourly price resolution with tiered fallbacks
//! - Concrete pipelines for volumes, instances, gateways, addresses,
//!   snapshots, streams, tables and log groups
//! - Report sinks, metrics and structured logging

pub mod classifier;
pub mod engine;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipelines;
pub mod pricing;
pub mod report;
pub mod sources;
pub mod units;

pub use engine::{EngineConfig, Pipeline, PipelineEngine, RunReport};
pub use error::{EvaluationFailure, ScanError};
pub use models::*;
pub use observability::{ScannerMetrics, StructuredLogger};
pub use report::{JsonFileSink, MemorySink, ReportSink};
