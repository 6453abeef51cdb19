//! Elastic IPs not associated with anything in use

use super::{excluded, InventoryIndex, ScanContext, EIP_UNUSED};
use crate::classifier::{ExclusionReason, RuleChain, Screening};
use crate::engine::Pipeline;
use crate::models::{Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

const HEADER: &[&str] = &["Public IP", "Allocation ID", "Instance ID"];

pub struct EipUnusedPipeline {
    ctx: ScanContext,
    rules: RuleChain,
    inventory: Arc<InventoryIndex>,
}

impl EipUnusedPipeline {
    pub fn new(ctx: ScanContext, inventory: Arc<InventoryIndex>) -> Self {
        let rules = RuleChain::new(ctx.exclusions.clone());
        Self {
            ctx,
            rules,
            inventory,
        }
    }
}

#[async_trait]
impl Pipeline for EipUnusedPipeline {
    fn name(&self) -> &'static str {
        EIP_UNUSED
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::ElasticIp
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::ascending("Public IP")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx
            .clients
            .resources
            .list(ResourceKind::ElasticIp)
            .await
    }

    async fn evaluate(&self, address: &ResourceDescriptor) -> Result<Evaluation> {
        if let Screening::Excluded(reason) = self.rules.screen(&address.tags(), None, self.ctx.now) {
            return Ok(excluded(reason));
        }

        // Associated through a network interface (NAT gateway, ENI, load balancer)
        if address.str_attr("AssociationId").is_some()
            || address.str_attr("NetworkInterfaceId").is_some()
        {
            return Ok(excluded(ExclusionReason::NotApplicable(
                "associated".to_string(),
            )));
        }

        let instance_id = address.str_attr("InstanceId").unwrap_or_default();
        if !instance_id.is_empty() && self.inventory.instance_state(instance_id) == Some("running") {
            return Ok(excluded(ExclusionReason::NotApplicable(format!(
                "attached to running instance {instance_id}"
            ))));
        }

        Ok(Evaluation::include(vec![
            Field::text(address.str_attr("PublicIp").unwrap_or_default()),
            Field::text(address.str_attr("AllocationId").unwrap_or_default()),
            Field::text(instance_id),
        ]))
    }
}
