//! NAT gateways without connections or traffic

use super::{excluded, ScanContext, NAT_UNUSED};
use crate::classifier::{ActivityTest, AgeGate, ExclusionReason, MetricCheck, RuleChain, Screening};
use crate::engine::Pipeline;
use crate::models::{Dimension, Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const HEADER: &[&str] = &["ID", "VPC", "State", "Subnet", "Create Time"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatUnusedSettings {
    pub lookback_days: u32,
}

impl Default for NatUnusedSettings {
    fn default() -> Self {
        Self { lookback_days: 30 }
    }
}

pub struct NatUnusedPipeline {
    ctx: ScanContext,
    gate: AgeGate,
    rules: RuleChain,
    activity: ActivityTest,
}

impl NatUnusedPipeline {
    pub fn new(ctx: ScanContext, settings: NatUnusedSettings) -> Self {
        let gate = AgeGate::new(settings.lookback_days);
        let rules = RuleChain::new(ctx.exclusions.clone()).with_age_gate(gate);
        let activity = ActivityTest::new(vec![
            MetricCheck::daily_sum("AWS/NATGateway", "ActiveConnectionCount"),
            MetricCheck::daily_sum("AWS/NATGateway", "BytesOutToDestination"),
            MetricCheck::daily_sum("AWS/NATGateway", "BytesInFromDestination"),
        ]);
        Self {
            ctx,
            gate,
            rules,
            activity,
        }
    }
}

#[async_trait]
impl Pipeline for NatUnusedPipeline {
    fn name(&self) -> &'static str {
        NAT_UNUSED
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::NatGateway
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::ascending("Create Time")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        let gateways = self
            .ctx
            .clients
            .resources
            .list(ResourceKind::NatGateway)
            .await?;

        // Deleted gateways linger in listings for a while
        Ok(gateways
            .into_iter()
            .filter(|g| !matches!(g.str_attr("State"), Some("deleted" | "deleting")))
            .collect())
    }

    async fn evaluate(&self, gateway: &ResourceDescriptor) -> Result<Evaluation> {
        let created = gateway.time_attr("CreateTime");
        if let Screening::Excluded(reason) =
            self.rules.screen(&gateway.tags(), created, self.ctx.now)
        {
            return Ok(excluded(reason));
        }

        let (start, end) = self.gate.window(self.ctx.now);
        let assessment = self
            .activity
            .run(
                self.ctx.clients.metrics.as_ref(),
                &Dimension::new("NatGatewayId", gateway.id()),
                start,
                end,
            )
            .await?;

        if let Some(metric) = assessment.triggered_by {
            return Ok(excluded(ExclusionReason::Active {
                metric: metric.to_string(),
            }));
        }

        Ok(Evaluation::include(vec![
            Field::text(gateway.id()),
            Field::text(gateway.str_attr("VpcId").unwrap_or_default()),
            Field::text(gateway.str_attr("State").unwrap_or_default()),
            Field::text(gateway.str_attr("SubnetId").unwrap_or("N/A")),
            Field::timestamp(created),
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

    fn gateway(id: &str, state: &str) -> serde_json::Value {
        json!({
            "NatGatewayId": id,
            "VpcId": "vpc-1",
            "State": state,
            "CreateTime": (Utc::now() - Duration::days(90)).to_rfc3339(),
        })
    }

    #[tokio::test]
    async fn test_fetch_drops_deleted() {
        let cloud = FakeCloud::default().with_resources(
            ResourceKind::NatGateway,
            vec![gateway("nat-1", "available"), gateway("nat-2", "deleted")],
        );
        let pipeline = NatUnusedPipeline::new(context(Arc::new(cloud), Utc::now()), NatUnusedSettings::default());

        let fetched = pipeline.fetch().await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id(), "nat-1");
    }

    #[tokio::test]
    async fn test_idle_gateway_row() {
        let pipeline = NatUnusedPipeline::new(
            context(Arc::new(FakeCloud::default()), Utc::now()),
            NatUnusedSettings::default(),
        );
        let d = ResourceDescriptor::from_value(ResourceKind::NatGateway, gateway("nat-1", "available")).unwrap();

        match pipeline.evaluate(&d).await.unwrap() {
            Evaluation::Included(row) => {
                assert_eq!(row.len(), HEADER.len());
                assert_eq!(row.get(3), Some(&Field::text("N/A")));
            }
            other => panic!("expected inclusion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connections_mean_active() {
        let cloud = FakeCloud::default().with_series("ActiveConnectionCount", "nat-1", vec![0.0, 1.0]);
        let pipeline = NatUnusedPipeline::new(context(Arc::new(cloud), Utc::now()), NatUnusedSettings::default());
        let d = ResourceDescriptor::from_value(ResourceKind::NatGateway, gateway("nat-1", "available")).unwrap();

        assert_eq!(
            pipeline.evaluate(&d).await.unwrap(),
            Evaluation::exclude("active (ActiveConnectionCount)")
        );
    }
}
