//! Unused block storage volumes

use super::{excluded, ScanContext, EBS_UNUSED};
use crate::classifier::{ActivityTest, AgeGate, ExclusionReason, MetricCheck, RuleChain, Screening};
use crate::engine::Pipeline;
use crate::models::{Dimension, Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const HEADER: &[&str] = &["ID", "Type", "Size (GB)", "Create Time", "Monthly Cost ($)"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsUnusedSettings {
    pub lookback_days: u32,
    /// USD per GB-month keyed by volume type
    pub price_per_gb_month: HashMap<String, f64>,
}

impl Default for EbsUnusedSettings {
    fn default() -> Self {
        let prices = [
            ("gp2", 0.10),
            ("gp3", 0.08),
            ("io1", 0.125),
            ("io2", 0.125),
            ("st1", 0.045),
            ("sc1", 0.015),
            ("standard", 0.05),
        ];
        Self {
            lookback_days: 30,
            price_per_gb_month: prices
                .into_iter()
                .map(|(t, p)| (t.to_string(), p))
                .collect(),
        }
    }
}

/// Volumes with no read or write operations over the lookback window
pub struct EbsUnusedPipeline {
    ctx: ScanContext,
    settings: EbsUnusedSettings,
    gate: AgeGate,
    rules: RuleChain,
    activity: ActivityTest,
}

impl EbsUnusedPipeline {
    pub fn new(ctx: ScanContext, settings: EbsUnusedSettings) -> Self {
        let gate = AgeGate::new(settings.lookback_days);
        let rules = RuleChain::new(ctx.exclusions.clone()).with_age_gate(gate);
        let activity = ActivityTest::new(vec![
            MetricCheck::daily_sum("AWS/EBS", "VolumeReadOps"),
            MetricCheck::daily_sum("AWS/EBS", "VolumeWriteOps"),
        ]);
        Self {
            ctx,
            settings,
            gate,
            rules,
            activity,
        }
    }

    /// Monthly storage cost, `None` for volume types without a price
    fn monthly_cost(&self, volume_type: &str, size_gb: u64) -> Option<f64> {
        self.settings
            .price_per_gb_month
            .get(volume_type)
            .map(|price| price * size_gb as f64)
    }
}

#[async_trait]
impl Pipeline for EbsUnusedPipeline {
    fn name(&self) -> &'static str {
        EBS_UNUSED
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Size (GB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx.clients.resources.list(ResourceKind::Volume).await
    }

    async fn evaluate(&self, volume: &ResourceDescriptor) -> Result<Evaluation> {
        let created = volume.time_attr("CreateTime");
        if let Screening::Excluded(reason) = self.rules.screen(&volume.tags(), created, self.ctx.now) {
            return Ok(excluded(reason));
        }

        let (start, end) = self.gate.window(self.ctx.now);
        let assessment = self
            .activity
            .run(
                self.ctx.clients.metrics.as_ref(),
                &Dimension::new("VolumeId", volume.id()),
                start,
                end,
            )
            .await?;

        if let Some(metric) = assessment.triggered_by {
            return Ok(excluded(ExclusionReason::Active {
                metric: metric.to_string(),
            }));
        }

        let volume_type = volume.str_attr("VolumeType").unwrap_or_default();
        let size_gb = volume.u64_attr("Size").unwrap_or(0);

        Ok(Evaluation::include(vec![
            Field::text(volume.id()),
            Field::text(volume_type),
            Field::Integer(size_gb as i64),
            Field::timestamp(created),
            Field::usd(self.monthly_cost(volume_type, size_gb), 2),
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

    fn volume(id: &str, volume_type: &str, age_days: i64, tags: serde_json::Value) -> serde_json::Value {
        json!({
            "VolumeId": id,
            "VolumeType": volume_type,
            "Size": 100,
            "CreateTime": (Utc::now() - Duration::days(age_days)).to_rfc3339(),
            "Tags": tags,
        })
    }

    fn pipeline(cloud: FakeCloud) -> (EbsUnusedPipeline, Arc<FakeCloud>) {
        let cloud = Arc::new(cloud);
        let ctx = context(cloud.clone(), Utc::now());
        (EbsUnusedPipeline::new(ctx, EbsUnusedSettings::default()), cloud)
    }

    #[tokio::test]
    async fn test_idle_volume_is_reported_with_cost() {
        let (pipeline, _) = pipeline(FakeCloud::default().with_series("VolumeReadOps", "vol-1", vec![0.0]));
        let d = ResourceDescriptor::from_value(ResourceKind::Volume, volume("vol-1", "gp3", 60, json!([])))
            .unwrap();

        match pipeline.evaluate(&d).await.unwrap() {
            Evaluation::Included(row) => {
                assert_eq!(row.len(), HEADER.len());
                assert_eq!(row.get(2), Some(&Field::Integer(100)));
                assert_eq!(row.get(4), Some(&Field::Usd(Some(8.0))));
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_active_volume_is_excluded() {
        let (pipeline, _) = pipeline(FakeCloud::default().with_series("VolumeWriteOps", "vol-1", vec![0.0, 12.0]));
        let d = ResourceDescriptor::from_value(ResourceKind::Volume, volume("vol-1", "gp3", 60, json!([])))
            .unwrap();

        assert_eq!(
            pipeline.evaluate(&d).await.unwrap(),
            Evaluation::exclude("active (VolumeWriteOps)")
        );
    }

    #[tokio::test]
    async fn test_managed_volume_skips_metrics() {
        let (pipeline, cloud) = pipeline(FakeCloud::default());
        let d = ResourceDescriptor::from_value(
            ResourceKind::Volume,
            volume("vol-1", "gp3", 60, json!([{"Key": "ebs.csi.aws.com/cluster", "Value": "true"}])),
        )
        .unwrap();

        assert!(!pipeline.evaluate(&d).await.unwrap().is_included());
        assert!(cloud.queried_dimensions().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_volume_type_cost_unresolved() {
        let (pipeline, _) = pipeline(FakeCloud::default());
        let d = ResourceDescriptor::from_value(ResourceKind::Volume, volume("vol-1", "gp9", 60, json!([])))
            .unwrap();

        match pipeline.evaluate(&d).await.unwrap() {
            Evaluation::Included(row) => assert_eq!(row.get(4), Some(&Field::Usd(None))),
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_young_volume_is_excluded() {
        let (pipeline, cloud) = pipeline(FakeCloud::default());
        let d = ResourceDescriptor::from_value(ResourceKind::Volume, volume("vol-1", "gp3", 5, json!([])))
            .unwrap();

        assert!(!pipeline.evaluate(&d).await.unwrap().is_included());
        assert!(cloud.queried_dimensions().is_empty());
    }
}
