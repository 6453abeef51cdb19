//! Stream shard sizing against observed throughput
//!
//! Every stream is reported with its traffic shape so over-provisioned
//! shards stand out next to idle or spiky workloads.

use super::{ScanContext, KINESIS_SHARDS};
use crate::classifier::{AgeGate, MetricCheck, TrafficPolicy};
use crate::engine::Pipeline;
use crate::models::{
    Dimension, Evaluation, Field, MetricSeries, ResourceDescriptor, ResourceKind, SortSpec,
    Statistic,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const HEADER: &[&str] = &[
    "Stream",
    "Mode",
    "Traffic",
    "Shards",
    "Retention (h)",
    "Consumers",
    "Avg Read MB/s",
    "Avg Write MB/s",
    "Max Read MB/s",
    "Max Write MB/s",
    "Read GB",
    "Write GB",
    "Max Iterator Age (s)",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KinesisShardsSettings {
    pub lookback_days: u32,
    pub period_hours: u32,
    pub traffic: TrafficPolicy,
}

impl Default for KinesisShardsSettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            period_hours: 12,
            traffic: TrafficPolicy::default(),
        }
    }
}

pub struct KinesisShardsPipeline {
    ctx: ScanContext,
    settings: KinesisShardsSettings,
    period_secs: u32,
}

impl KinesisShardsPipeline {
    pub fn new(ctx: ScanContext, settings: KinesisShardsSettings) -> Self {
        let period_secs = settings.period_hours.max(1).saturating_mul(3600);
        Self {
            ctx,
            settings,
            period_secs,
        }
    }

    async fn series(&self, stream: &str, check: MetricCheck) -> Result<MetricSeries> {
        let (start, end) = AgeGate::new(self.settings.lookback_days).window(self.ctx.now);
        let window = check
            .with_period(self.period_secs)
            .window(Dimension::new("StreamName", stream), start, end);
        self.ctx.clients.metrics.query(&window).await
    }

    fn avg_mb_per_sec(&self, bytes: &MetricSeries) -> f64 {
        self.ctx.units.mb_per_sec(bytes.mean(), self.period_secs)
    }

    fn max_mb_per_sec(&self, bytes: &MetricSeries) -> f64 {
        self.ctx.units.mb_per_sec(bytes.max(), self.period_secs)
    }
}

#[async_trait]
impl Pipeline for KinesisShardsPipeline {
    fn name(&self) -> &'static str {
        KINESIS_SHARDS
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Stream
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Shards")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx.clients.resources.list(ResourceKind::Stream).await
    }

    async fn evaluate(&self, stream: &ResourceDescriptor) -> Result<Evaluation> {
        let name = stream.id();
        let mode = stream
            .str_attr("StreamModeDetails.StreamMode")
            .unwrap_or("PROVISIONED")
            .to_string();
        let retention_hours = stream.u64_attr("RetentionPeriodHours").unwrap_or(24);
        // On-demand streams scale shards on their own
        let shards = if mode == "PROVISIONED" {
            stream.u64_attr("OpenShardCount").unwrap_or(0)
        } else {
            0
        };
        let consumers = stream.u64_attr("ConsumerCount").unwrap_or(0);

        // Write = incoming, read = outgoing
        let incoming = self
            .series(&name, MetricCheck::daily_sum("AWS/Kinesis", "IncomingBytes"))
            .await?;
        let outgoing = self
            .series(&name, MetricCheck::daily_sum("AWS/Kinesis", "OutgoingBytes"))
            .await?;
        let iterator_age = self
            .series(
                &name,
                MetricCheck::daily_sum("AWS/Kinesis", "GetRecords.IteratorAgeMilliseconds")
                    .with_statistic(Statistic::Maximum),
            )
            .await?;

        let avg_read = self.avg_mb_per_sec(&outgoing);
        let avg_write = self.avg_mb_per_sec(&incoming);
        let max_read = self.max_mb_per_sec(&outgoing);
        let max_write = self.max_mb_per_sec(&incoming);

        let traffic = self
            .settings
            .traffic
            .classify(avg_read.max(avg_write), max_read.max(max_write));

        Ok(Evaluation::include(vec![
            Field::text(name),
            Field::text(mode),
            Field::text(traffic.as_str()),
            Field::Integer(shards as i64),
            Field::Integer(retention_hours as i64),
            Field::Integer(consumers as i64),
            Field::decimal(avg_read, 4),
            Field::decimal(avg_write, 4),
            Field::decimal(max_read, 4),
            Field::decimal(max_write, 4),
            Field::decimal(self.ctx.units.to_gb(outgoing.sum()), 2),
            Field::decimal(self.ctx.units.to_gb(incoming.sum()), 2),
            Field::decimal(iterator_age.max() / 1000.0, 2),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{context, FakeCloud};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Arc;

    const PERIOD_SECS: f64 = 12.0 * 3600.0;
    const MB: f64 = 1024.0 * 1024.0;

    fn stream(name: &str, mode: &str) -> ResourceDescriptor {
        ResourceDescriptor::from_value(
            ResourceKind::Stream,
            json!({
                "StreamName": name,
                "StreamModeDetails": {"StreamMode": mode},
                "OpenShardCount": 8,
                "RetentionPeriodHours": 48,
                "ConsumerCount": 2
            }),
        )
        .unwrap()
    }

    fn pipeline(cloud: FakeCloud) -> KinesisShardsPipeline {
        KinesisShardsPipeline::new(
            context(Arc::new(cloud), Utc::now()),
            KinesisShardsSettings::default(),
        )
    }

    fn text(e: &Evaluation, index: usize) -> String {
        match e {
            Evaluation::Included(row) => row.get(index).map(Field::render).unwrap_or_default(),
            _ => String::new(),
        }
    }

    #[tokio::test]
    async fn test_idle_stream() {
        let result = pipeline(FakeCloud::default())
            .evaluate(&stream("events", "PROVISIONED"))
            .await
            .unwrap();

        assert_eq!(text(&result, 2), "IDLE");
        assert_eq!(text(&result, 3), "8");
        assert_eq!(text(&result, 4), "48");
    }

    #[tokio::test]
    async fn test_spiky_and_consistent() {
        // One busy period among quiet ones: mean 1 MB/s, peak 5 MB/s
        let burst = vec![5.0 * MB * PERIOD_SECS, 0.0, 0.0, 0.0, 0.0];
        let spiky = pipeline(FakeCloud::default().with_series("IncomingBytes", "events", burst))
            .evaluate(&stream("events", "PROVISIONED"))
            .await
            .unwrap();
        assert_eq!(text(&spiky, 2), "SPIKY");
        assert_eq!(text(&spiky, 9), "5");

        let steady = vec![MB * PERIOD_SECS; 4];
        let consistent = pipeline(FakeCloud::default().with_series("OutgoingBytes", "events", steady))
            .evaluate(&stream("events", "PROVISIONED"))
            .await
            .unwrap();
        assert_eq!(text(&consistent, 2), "CONSISTENT");
        assert_eq!(text(&consistent, 6), "1");
    }

    #[tokio::test]
    async fn test_on_demand_reports_zero_shards() {
        let result = pipeline(FakeCloud::default())
            .evaluate(&stream("events", "ON_DEMAND"))
            .await
            .unwrap();
        assert_eq!(text(&result, 3), "0");
    }

    #[tokio::test]
    async fn test_iterator_age_in_seconds() {
        let result = pipeline(
            FakeCloud::default().with_series("GetRecords.IteratorAgeMilliseconds", "events", vec![1500.0, 250.0]),
        )
        .evaluate(&stream("events", "PROVISIONED"))
        .await
        .unwrap();
        assert_eq!(text(&result, 12), "1.5");
    }
}
