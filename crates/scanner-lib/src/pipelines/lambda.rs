//! Function memory sizing from invocation metrics and execution reports

use super::{ScanContext, LAMBDA_MEMORY};
use crate::classifier::{AgeGate, MetricCheck};
use crate::engine::Pipeline;
use crate::models::{Dimension, Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use crate::sources::{LogQuery, LogQueryStats};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const HEADER: &[&str] = &[
    "Function",
    "Memory (MB)",
    "Invocations",
    "Avg Billed (s)",
    "Avg Memory Used (MB)",
    "Max Memory Used (MB)",
];

/// Aggregates the per-invocation REPORT lines a function writes to its log group
const REPORT_QUERY: &str = r"filter @message like /REPORT RequestId/
| parse @message /Billed Duration: (?<billed>[0-9.]+) ms/
| parse @message /Max Memory Used: (?<memory>[0-9.]+) MB/
| stats avg(billed) as avg_billed, avg(memory) as avg_memory, max(memory) as max_memory";

/// Log group prefixes tried in order
const LOG_GROUP_PREFIXES: &[&str] = &["/aws/lambda/", "/lambda/"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LambdaMemorySettings {
    /// Window for the invocation count
    pub invocation_lookback_days: u32,
    /// Window for the execution report query
    pub report_lookback_days: u32,
}

impl Default for LambdaMemorySettings {
    fn default() -> Self {
        Self {
            invocation_lookback_days: 30,
            report_lookback_days: 7,
        }
    }
}

/// Reports configured memory next to what invocations actually used
pub struct LambdaMemoryPipeline {
    ctx: ScanContext,
    settings: LambdaMemorySettings,
}

impl LambdaMemoryPipeline {
    pub fn new(ctx: ScanContext, settings: LambdaMemorySettings) -> Self {
        Self { ctx, settings }
    }

    async fn invocations(&self, function: &str) -> Result<u64> {
        let (start, end) = AgeGate::new(self.settings.invocation_lookback_days).window(self.ctx.now);
        let window = MetricCheck::daily_sum("AWS/Lambda", "Invocations")
            .with_period(3600)
            .window(Dimension::new("FunctionName", function), start, end);
        let series = self.ctx.clients.metrics.query(&window).await?;
        Ok(series.sum() as u64)
    }

    /// Stats from the first log group that returns any
    async fn report_stats(&self, function: &str) -> Result<LogQueryStats> {
        let (start, end) = AgeGate::new(self.settings.report_lookback_days).window(self.ctx.now);
        for prefix in LOG_GROUP_PREFIXES {
            let query = LogQuery {
                log_group: format!("{prefix}{function}"),
                query: REPORT_QUERY.to_string(),
                start,
                end,
            };
            let stats = self.ctx.clients.logs.run(&query).await?;
            if !stats.is_empty() {
                return Ok(stats);
            }
        }
        Ok(LogQueryStats::new())
    }
}

#[async_trait]
impl Pipeline for LambdaMemoryPipeline {
    fn name(&self) -> &'static str {
        LAMBDA_MEMORY
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Memory (MB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx.clients.resources.list(ResourceKind::Function).await
    }

    async fn evaluate(&self, function: &ResourceDescriptor) -> Result<Evaluation> {
        let name = function.id();
        let memory = function.u64_attr("MemorySize").unwrap_or(0);
        let invocations = self.invocations(&name).await?;
        let stats = self.report_stats(&name).await?;
        let stat = |field: &str| stats.get(field).copied().unwrap_or(0.0);

        Ok(Evaluation::include(vec![
            Field::text(name),
            Field::Integer(memory as i64),
            Field::Integer(invocations as i64),
            Field::decimal(stat("avg_billed") / 1000.0, 2),
            Field::Integer(stat("avg_memory") as i64),
            Field::Integer(stat("max_memory") as i64),
        ]))
    }
}
