//! Log group ingestion and retention checks

use super::{excluded, ScanContext, LOGS_HIGH_INGESTION, LOGS_NEVER_EXPIRE};
use crate::classifier::{AgeGate, ExclusionReason, MetricCheck};
use crate::engine::Pipeline;
use crate::models::{Dimension, Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const HIGH_INGESTION_HEADER: &[&str] = &["Log Group", "Ingested (GB)"];
const NEVER_EXPIRE_HEADER: &[&str] = &["Log Group", "Stored (GB)", "Ingested (GB)"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsHighIngestionSettings {
    pub lookback_days: u32,
    /// Groups ingesting less than this over the lookback are skipped
    pub threshold_gb: f64,
}

impl Default for LogsHighIngestionSettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            threshold_gb: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsNeverExpireSettings {
    /// Window for the ingested column
    pub period_days: u32,
}

impl Default for LogsNeverExpireSettings {
    fn default() -> Self {
        Self { period_days: 30 }
    }
}

/// Bytes ingested by a log group over `days` ending at `now`
async fn ingested_gb(ctx: &ScanContext, group: &str, days: u32) -> Result<f64> {
    let (start, end) = AgeGate::new(days).window(ctx.now);
    let window = MetricCheck::daily_sum("AWS/Logs", "IncomingBytes").window(
        Dimension::new("LogGroupName", group),
        start,
        end,
    );
    let series = ctx.clients.metrics.query(&window).await?;
    Ok(ctx.units.to_gb(series.sum()))
}

pub struct LogsHighIngestionPipeline {
    ctx: ScanContext,
    settings: LogsHighIngestionSettings,
}

impl LogsHighIngestionPipeline {
    pub fn new(ctx: ScanContext, settings: LogsHighIngestionSettings) -> Self {
        Self { ctx, settings }
    }
}

#[async_trait]
impl Pipeline for LogsHighIngestionPipeline {
    fn name(&self) -> &'static str {
        LOGS_HIGH_INGESTION
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    fn header(&self) -> &'static [&'static str] {
        HIGH_INGESTION_HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Ingested (GB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx.clients.resources.list(ResourceKind::LogGroup).await
    }

    async fn evaluate(&self, group: &ResourceDescriptor) -> Result<Evaluation> {
        let name = group.id();
        let ingested = ingested_gb(&self.ctx, &name, self.settings.lookback_days).await?;

        if ingested < self.settings.threshold_gb {
            return Ok(excluded(ExclusionReason::NotApplicable(format!(
                "ingested {ingested:.2} GB, below {} GB",
                self.settings.threshold_gb
            ))));
        }

        Ok(Evaluation::include(vec![
            Field::text(name),
            Field::decimal(ingested, 2),
        ]))
    }
}

pub struct LogsNeverExpirePipeline {
    ctx: ScanContext,
    settings: LogsNeverExpireSettings,
}

impl LogsNeverExpirePipeline {
    pub fn new(ctx: ScanContext, settings: LogsNeverExpireSettings) -> Self {
        Self { ctx, settings }
    }
}

#[async_trait]
impl Pipeline for LogsNeverExpirePipeline {
    fn name(&self) -> &'static str {
        LOGS_NEVER_EXPIRE
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::LogGroup
    }

    fn header(&self) -> &'static [&'static str] {
        NEVER_EXPIRE_HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Stored (GB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        let groups = self
            .ctx
            .clients
            .resources
            .list(ResourceKind::LogGroup)
            .await?;

        Ok(groups
            .into_iter()
            .filter(|g| g.get("retentionInDays").map_or(true, |v| v.is_null()))
            .collect())
    }

    async fn evaluate(&self, group: &ResourceDescriptor) -> Result<Evaluation> {
        let name = group.id();
        let stored = self
            .ctx
            .units
            .to_gb(group.u64_attr("storedBytes").unwrap_or(0) as f64);
        let ingested = ingested_gb(&self.ctx, &name, self.settings.period_days).await?;

        Ok(Evaluation::include(vec![
            Field::text(name),
            Field::decimal(stored, 2),
            Field::decimal(ingested, 2),
        ]))
    }
}
