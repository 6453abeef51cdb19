//! Offline backend reading an inventory snapshot file
//!
//! Lets a scan run end to end without cloud credentials: resources, metric
//! samples and pricing data are all read from one JSON document.

use super::{LogQuery, LogQuerySource, LogQueryStats, MetricSource, ResourceSource};
use crate::models::{
    Dimension, MetricSeries, MetricWindow, ResourceDescriptor, ResourceKind, Sample, Statistic,
};
use crate::pricing::{CatalogFilter, PriceTerm, PricingCatalog, SpotPriceHistory, SpotQuery};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Stored time series for one metric and dimension set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub namespace: String,
    pub metric: String,
    pub dimension: Dimension,
    #[serde(default)]
    pub sub_dimension: Option<Dimension>,
    /// Only answers queries for this statistic when set
    #[serde(default)]
    pub statistic: Option<Statistic>,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

impl MetricRecord {
    fn matches(&self, window: &MetricWindow) -> bool {
        self.namespace == window.namespace
            && self.metric == window.metric_name
            && self.dimension == window.dimension
            && self.sub_dimension == window.sub_dimension
            && self.statistic.map_or(true, |s| s == window.statistic)
    }
}

/// Stored aggregate results for one log group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogQueryRecord {
    pub log_group: String,
    #[serde(default)]
    pub stats: LogQueryStats,
}

/// On-demand price term for one catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub instance_type: String,
    pub location: String,
    pub operating_system: String,
    #[serde(default = "default_tenancy")]
    pub tenancy: String,
    #[serde(flatten)]
    pub term: PriceTerm,
}

fn default_tenancy() -> String {
    "Shared".to_string()
}

impl CatalogRecord {
    fn matches(&self, filter: &CatalogFilter) -> bool {
        self.instance_type == filter.instance_type
            && self.location == filter.location
            && self.operating_system == filter.operating_system
            && self.tenancy == filter.tenancy
    }
}

/// One spot price observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    pub instance_type: String,
    pub product_description: String,
    pub region: String,
    /// Undated records match any query window
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub price: f64,
}

impl SpotRecord {
    fn matches(&self, query: &SpotQuery) -> bool {
        self.instance_type == query.instance_type
            && self.product_description == query.product_description
            && self.region == query.region
            && self
                .timestamp
                .map_or(true, |ts| ts >= query.start && ts <= query.end)
    }
}

/// Contents of an inventory snapshot file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySnapshot {
    /// Descriptors keyed by resource kind (`volume`, `instance`, ...)
    pub resources: HashMap<String, Vec<Map<String, Value>>>,
    pub metrics: Vec<MetricRecord>,
    pub log_queries: Vec<LogQueryRecord>,
    pub price_terms: Vec<CatalogRecord>,
    pub spot_prices: Vec<SpotRecord>,
}

/// Backend implementing every collaborator role from a snapshot
pub struct SnapshotBackend {
    snapshot: InventorySnapshot,
}

impl SnapshotBackend {
    pub fn from_snapshot(snapshot: InventorySnapshot) -> Self {
        Self { snapshot }
    }

    /// Load a snapshot from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("reading inventory snapshot {}", path.display()))?;
        let snapshot: InventorySnapshot = serde_json::from_str(&body)
            .with_context(|| format!("parsing inventory snapshot {}", path.display()))?;

        info!(
            path = %path.display(),
            kinds = snapshot.resources.len(),
            metric_series = snapshot.metrics.len(),
            "Loaded inventory snapshot"
        );
        Ok(Self::from_snapshot(snapshot))
    }
}

#[async_trait]
impl ResourceSource for SnapshotBackend {
    async fn list(&self, kind: ResourceKind) -> Result<Vec<ResourceDescriptor>> {
        let items = self
            .snapshot
            .resources
            .get(kind.as_str())
            .cloned()
            .unwrap_or_default();

        Ok(items
            .into_iter()
            .map(|attributes| ResourceDescriptor::new(kind, attributes))
            .collect())
    }
}

#[async_trait]
impl MetricSource for SnapshotBackend {
    async fn query(&self, window: &MetricWindow) -> Result<MetricSeries> {
        let Some(record) = self.snapshot.metrics.iter().find(|r| r.matches(window)) else {
            debug!(
                namespace = %window.namespace,
                metric = %window.metric_name,
                dimension = %window.dimension.value,
                "No stored series, returning empty"
            );
            return Ok(MetricSeries::empty());
        };

        let samples = record
            .samples
            .iter()
            .filter(|s| s.timestamp >= window.start && s.timestamp <= window.end)
            .copied()
            .collect();
        Ok(MetricSeries::new(samples))
    }
}

#[async_trait]
impl LogQuerySource for SnapshotBackend {
    async fn run(&self, query: &LogQuery) -> Result<LogQueryStats> {
        Ok(self
            .snapshot
            .log_queries
            .iter()
            .find(|r| r.log_group == query.log_group)
            .map(|r| r.stats.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PricingCatalog for SnapshotBackend {
    async fn on_demand_terms(&self, filter: &CatalogFilter) -> Result<Vec<PriceTerm>> {
        Ok(self
            .snapshot
            .price_terms
            .iter()
            .filter(|r| r.matches(filter))
            .map(|r| r.term.clone())
            .collect())
    }
}

#[async_trait]
impl SpotPriceHistory for SnapshotBackend {
    async fn spot_prices(&self, query: &SpotQuery) -> Result<Vec<f64>> {
        Ok(self
            .snapshot
            .spot_prices
            .iter()
            .filter(|r| r.matches(query))
            .map(|r| r.price)
            .collect())
    }
}
