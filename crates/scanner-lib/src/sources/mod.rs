//! External collaborators the pipelines read from
//!
//! The scanner never talks to a cloud API directly. Resource inventories,
//! metric time series, log queries and pricing data all come through the
//! traits below, so
//! a run can be backed by an SDK adapter, an inventory snapshot file or a test
//! double without changing any pipeline code.

mod snapshot;

pub use snapshot::{
    CatalogRecord, InventorySnapshot, LogQueryRecord, MetricRecord, SnapshotBackend, SpotRecord,
};

use crate::models::{MetricSeries, MetricWindow, ResourceDescriptor, ResourceKind};
use crate::observability::ScannerMetrics;
use crate::pricing::{PriceResolver, PricingCatalog, SpotPriceHistory};
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

pub use async_trait::async_trait;

/// Enumerates resources of one kind
#[async_trait]
pub trait ResourceSource: Send + Sync {
    /// List every resource of `kind`; pagination is handled by the implementation
    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceDescriptor>>;
}

/// Answers metric time-series queries
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Query one metric window
    ///
    /// Must return an empty series rather than an error when the window has
    /// no datapoints.
    async fn query(&self, window: &MetricWindow) -> Result<MetricSeries>;
}

/// Aggregate log query over one log group
#[derive(Debug, Clone, PartialEq)]
pub struct LogQuery {
    pub log_group: String,
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Named numeric fields of the first result row
pub type LogQueryStats = HashMap<String, f64>;

/// Runs aggregate queries over log groups
#[async_trait]
pub trait LogQuerySource: Send + Sync {
    /// Run `query` to completion
    ///
    /// A missing log group or a query without results yields empty stats, not
    /// an error.
    async fn run(&self, query: &LogQuery) -> Result<LogQueryStats>;
}

/// Long-lived collaborator handles shared by every pipeline of a process
#[derive(Clone)]
pub struct Collaborators {
    pub resources: Arc<dyn ResourceSource>,
    pub metrics: Arc<dyn MetricSource>,
    pub logs: Arc<dyn LogQuerySource>,
    pub catalog: Arc<dyn PricingCatalog>,
    pub spot: Arc<dyn SpotPriceHistory>,
}

impl Collaborators {
    /// Use one backend for every collaborator role
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ResourceSource
            + MetricSource
            + LogQuerySource
            + PricingCatalog
            + SpotPriceHistory
            + 'static,
    {
        Self {
            resources: backend.clone(),
            metrics: backend.clone(),
            logs: backend.clone(),
            catalog: backend.clone(),
            spot: backend,
        }
    }
}

/// Client bundle scoped to a single pipeline run
///
/// Each bundle owns a fresh [`PriceResolver`], so price memoization never
/// outlives the run that populated it.
#[derive(Clone)]
pub struct ScanClients {
    pub resources: Arc<dyn ResourceSource>,
    pub metrics: Arc<dyn MetricSource>,
    pub logs: Arc<dyn LogQuerySource>,
    pub prices: Arc<PriceResolver>,
}

impl ScanClients {
    pub fn for_run(collaborators: &Collaborators, metrics: ScannerMetrics) -> Self {
        Self {
            resources: collaborators.resources.clone(),
            metrics: collaborators.metrics.clone(),
            logs: collaborators.logs.clone(),
            prices: Arc::new(PriceResolver::new(
                collaborators.catalog.clone(),
                collaborators.spot.clone(),
                metrics,
            )),
        }
    }
}
