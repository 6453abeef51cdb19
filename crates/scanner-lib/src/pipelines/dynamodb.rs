//! Tables with no consumed capacity

use super::{excluded, ScanContext, DYNAMODB_UNUSED};
use crate::classifier::{AgeGate, ExclusionReason, MetricCheck, RuleChain, Screening};
use crate::engine::Pipeline;
use crate::models::{
    Dimension, Evaluation, Field, MetricSeries, ResourceDescriptor, ResourceKind, SortSpec,
    Statistic,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const HEADER: &[&str] = &[
    "Table",
    "Billing Mode",
    "Items",
    "Size (GB)",
    "Prov RCU",
    "Prov WCU",
    "Read Units",
    "Write Units",
    "Created",
    "Status",
    "GSIs",
    "PITR",
];

const CONSUMED_READ: &str = "ConsumedReadCapacityUnits";
const CONSUMED_WRITE: &str = "ConsumedWriteCapacityUnits";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamoDbUnusedSettings {
    pub lookback_days: u32,
}

impl Default for DynamoDbUnusedSettings {
    fn default() -> Self {
        Self { lookback_days: 30 }
    }
}

/// Capacity figures summed over a table and its global secondary indexes
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Capacity {
    read: f64,
    write: f64,
}

pub struct DynamoDbUnusedPipeline {
    ctx: ScanContext,
    gate: AgeGate,
    rules: RuleChain,
}

impl DynamoDbUnusedPipeline {
    pub fn new(ctx: ScanContext, settings: DynamoDbUnusedSettings) -> Self {
        let gate = AgeGate::new(settings.lookback_days);
        let rules = RuleChain::new(ctx.exclusions.clone()).with_age_gate(gate);
        Self { ctx, gate, rules }
    }

    async fn series(
        &self,
        table: &str,
        index: Option<&str>,
        check: MetricCheck,
    ) -> Result<MetricSeries> {
        let (start, end) = self.gate.window(self.ctx.now);
        let window = check
            .window(Dimension::new("TableName", table), start, end)
            .with_sub_dimension(index.map(|i| Dimension::new("GlobalSecondaryIndexName", i)));
        self.ctx.clients.metrics.query(&window).await
    }

    /// Sums `reduce(series)` for both directions over the table and every index
    async fn capacity(
        &self,
        table: &str,
        indexes: &[String],
        metrics: (&'static str, &'static str),
        statistic: Statistic,
        reduce: fn(&MetricSeries) -> f64,
    ) -> Result<Capacity> {
        let targets = std::iter::once(None).chain(indexes.iter().map(|i| Some(i.as_str())));
        let mut total = Capacity::default();
        for index in targets {
            let read = MetricCheck::daily_sum("AWS/DynamoDB", metrics.0).with_statistic(statistic);
            let write = MetricCheck::daily_sum("AWS/DynamoDB", metrics.1).with_statistic(statistic);
            total.read += reduce(&self.series(table, index, read).await?);
            total.write += reduce(&self.series(table, index, write).await?);
        }
        Ok(total)
    }
}

fn index_names(table: &ResourceDescriptor) -> Vec<String> {
    match table.get("GlobalSecondaryIndexes") {
        Some(Value::Array(indexes)) => indexes
            .iter()
            .filter_map(|i| i.get("IndexName").and_then(Value::as_str))
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Table figure plus the matching figure across its global secondary indexes
fn with_indexes(table: &ResourceDescriptor, own: &str, per_index: &str) -> u64 {
    let indexes: u64 = match table.get("GlobalSecondaryIndexes") {
        Some(Value::Array(indexes)) => indexes
            .iter()
            .filter_map(|i| i.get(per_index).and_then(Value::as_u64))
            .sum(),
        _ => 0,
    };
    table.u64_attr(own).unwrap_or(0) + indexes
}

#[async_trait]
impl Pipeline for DynamoDbUnusedPipeline {
    fn name(&self) -> &'static str {
        DYNAMODB_UNUSED
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Table
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Size (GB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx.clients.resources.list(ResourceKind::Table).await
    }

    async fn evaluate(&self, table: &ResourceDescriptor) -> Result<Evaluation> {
        let created = table.time_attr("CreationDateTime");
        if let Screening::Excluded(reason) = self.rules.screen(&table.tags(), created, self.ctx.now) {
            return Ok(excluded(reason));
        }

        let name = table.id();
        let status = table.str_attr("TableStatus").unwrap_or("UNKNOWN");
        let billing = table
            .str_attr("BillingModeSummary.BillingMode")
            .unwrap_or("PROVISIONED");
        let pitr = table.str_attr("PointInTimeRecoveryDescription.PointInTimeRecoveryStatus")
            == Some("ENABLED");
        let indexes = index_names(table);

        // Metrics are only published for active tables
        let consumed = if status == "ACTIVE" {
            self.capacity(
                &name,
                &indexes,
                (CONSUMED_READ, CONSUMED_WRITE),
                Statistic::Sum,
                MetricSeries::sum,
            )
            .await?
        } else {
            Capacity::default()
        };

        if consumed.read > 0.0 {
            return Ok(excluded(ExclusionReason::Active {
                metric: CONSUMED_READ.to_string(),
            }));
        }
        if consumed.write > 0.0 {
            return Ok(excluded(ExclusionReason::Active {
                metric: CONSUMED_WRITE.to_string(),
            }));
        }

        let provisioned = if billing == "PROVISIONED" {
            self.capacity(
                &name,
                &indexes,
                ("ProvisionedReadCapacityUnits", "ProvisionedWriteCapacityUnits"),
                Statistic::Average,
                MetricSeries::mean,
            )
            .await?
        } else {
            Capacity::default()
        };

        let size_bytes = with_indexes(table, "TableSizeBytes", "IndexSizeBytes");

        Ok(Evaluation::include(vec![
            Field::text(name),
            Field::text(billing),
            Field::Integer(with_indexes(table, "ItemCount", "ItemCount") as i64),
            Field::decimal(self.ctx.units.to_gb(size_bytes as f64), 2),
            Field::decimal(provisioned.read, 2),
            Field::decimal(provisioned.write, 2),
            Field::decimal(consumed.read, 2),
            Field::decimal(consumed.write, 2),
            Field::timestamp(created),
            Field::text(status),
            Field::Integer(indexes.len() as i64),
            Field::text(if pitr { "YES" } else { "NO" }),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipelines::testing::{context, FakeCloud};
    use chrono::{Duration, Utc};
    use serde_json::json;
    use std::sync::Arc;

    fn table(status: &str, billing: &str) -> ResourceDescriptor {
        ResourceDescriptor::from_value(
            ResourceKind::Table,
            json!({
                "TableName": "orders",
                "TableStatus": status,
                "BillingModeSummary": {"BillingMode": billing},
                "CreationDateTime": (Utc::now() - Duration::days(120)).to_rfc3339(),
                "ItemCount": 10,
                "TableSizeBytes": 1024,
                "GlobalSecondaryIndexes": [
                    {"IndexName": "by-customer", "ItemCount": 5, "IndexSizeBytes": 512}
                ],
                "PointInTimeRecoveryDescription": {"PointInTimeRecoveryStatus": "ENABLED"}
            }),
        )
        .unwrap()
    }

    fn pipeline(cloud: FakeCloud) -> (DynamoDbUnusedPipeline, Arc<FakeCloud>) {
        let cloud = Arc::new(cloud);
        let p = DynamoDbUnusedPipeline::new(
            context(cloud.clone(), Utc::now()),
            DynamoDbUnusedSettings::default(),
        );
        (p, cloud)
    }

    #[tokio::test]
    async fn test_unused_provisioned_table() {
        let cloud = FakeCloud::default()
            .with_series("ProvisionedReadCapacityUnits", "orders", vec![5.0, 5.0])
            .with_sub_series("ProvisionedReadCapacityUnits", "orders", "by-customer", vec![2.0])
            .with_series("ProvisionedWriteCapacityUnits", "orders", vec![1.0]);
        let (p, _) = pipeline(cloud);

        match p.evaluate(&table("ACTIVE", "PROVISIONED")).await.unwrap() {
            Evaluation::Included(row) => {
                assert_eq!(row.len(), HEADER.len());
                assert_eq!(row.get(2), Some(&Field::Integer(15)));
                assert_eq!(row.get(4), Some(&Field::Decimal(7.0)));
                assert_eq!(row.get(5), Some(&Field::Decimal(1.0)));
                assert_eq!(row.get(10), Some(&Field::Integer(1)));
                assert_eq!(row.get(11), Some(&Field::text("YES")));
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_index_reads_mark_table_active() {
        let cloud = FakeCloud::default().with_sub_series(CONSUMED_READ, "orders", "by-customer", vec![0.0, 3.0]);
        let (p, _) = pipeline(cloud);

        assert_eq!(
            p.evaluate(&table("ACTIVE", "PAY_PER_REQUEST")).await.unwrap(),
            Evaluation::exclude("active (ConsumedReadCapacityUnits)")
        );
    }

    #[tokio::test]
    async fn test_writes_mark_table_active() {
        let cloud = FakeCloud::default().with_series(CONSUMED_WRITE, "orders", vec![1.0]);
        let (p, _) = pipeline(cloud);

        assert!(!p.evaluate(&table("ACTIVE", "PROVISIONED")).await.unwrap().is_included());
    }

    #[tokio::test]
    async fn test_inactive_table_skips_metrics() {
        let (p, cloud) = pipeline(FakeCloud::default());

        match p.evaluate(&table("ARCHIVED", "PAY_PER_REQUEST")).await.unwrap() {
            Evaluation::Included(row) => {
                assert_eq!(row.get(4), Some(&Field::Decimal(0.0)));
                assert_eq!(row.get(9), Some(&Field::text("ARCHIVED")));
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
        assert!(cloud.queried_dimensions().is_empty());
    }

    #[tokio::test]
    async fn test_young_table_is_excluded() {
        let (p, cloud) = pipeline(FakeCloud::default());
        let young = ResourceDescriptor::from_value(
            ResourceKind::Table,
            json!({
                "TableName": "fresh",
                "TableStatus": "ACTIVE",
                "CreationDateTime": (Utc::now() - Duration::days(2)).to_rfc3339()
            }),
        )
        .unwrap();

        assert!(!p.evaluate(&young).await.unwrap().is_included());
        assert!(cloud.queried_dimensions().is_empty());
    }
}
