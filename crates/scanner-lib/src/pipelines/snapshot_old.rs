//! Snapshots taken before a cutoff date

use super::{excluded, InventoryIndex, ScanContext, SNAPSHOT_OLD};
use crate::classifier::{ExclusionReason, RuleChain, Screening};
use crate::engine::Pipeline;
use crate::models::{Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const HEADER: &[&str] = &[
    "Snapshot ID",
    "Volume ID",
    "Volume Name",
    "Volume Type",
    "Instance ID",
    "Instance Name",
    "Size (GB)",
    "Snapshot Date",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotOldSettings {
    /// Fixed cutoff; snapshots started before midnight UTC of this date are old
    pub cutoff_date: Option<NaiveDate>,
    /// Rolling cutoff used when no fixed date is configured
    pub max_age_days: u32,
}

impl Default for SnapshotOldSettings {
    fn default() -> Self {
        Self {
            cutoff_date: None,
            max_age_days: 365,
        }
    }
}

impl SnapshotOldSettings {
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.cutoff_date {
            Some(date) => Utc.from_utc_datetime(&date.and_time(NaiveTime::default())),
            None => now - Duration::days(i64::from(self.max_age_days)),
        }
    }
}

pub struct SnapshotOldPipeline {
    ctx: ScanContext,
    cutoff: DateTime<Utc>,
    rules: RuleChain,
    inventory: Arc<InventoryIndex>,
}

impl SnapshotOldPipeline {
    pub fn new(
        ctx: ScanContext,
        settings: SnapshotOldSettings,
        inventory: Arc<InventoryIndex>,
    ) -> Self {
        let cutoff = settings.cutoff(ctx.now);
        let rules = RuleChain::new(ctx.exclusions.clone());
        Self {
            ctx,
            cutoff,
            rules,
            inventory,
        }
    }
}

#[async_trait]
impl Pipeline for SnapshotOldPipeline {
    fn name(&self) -> &'static str {
        SNAPSHOT_OLD
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Snapshot
    }

    fn header(&self) -> &'static [&'static str] {
        HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Size (GB)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx
            .clients
            .resources
            .list(ResourceKind::Snapshot)
            .await
    }

    async fn evaluate(&self, snapshot: &ResourceDescriptor) -> Result<Evaluation> {
        if let Screening::Excluded(reason) = self.rules.screen(&snapshot.tags(), None, self.ctx.now) {
            return Ok(excluded(reason));
        }

        let Some(started) = snapshot.time_attr("StartTime") else {
            return Ok(excluded(ExclusionReason::MissingCreationTime));
        };
        if started >= self.cutoff {
            return Ok(excluded(ExclusionReason::NotApplicable(
                "taken after the cutoff".to_string(),
            )));
        }

        let volume_id = snapshot.str_attr("VolumeId").unwrap_or_default();
        let (volume_name, volume_type, instance_id, instance_name) =
            match self.inventory.volume(volume_id) {
                Some(volume) => {
                    let instance_id = volume.instance_id.clone().unwrap_or_default();
                    let instance_name = self
                        .inventory
                        .instance(&instance_id)
                        .map(|i| i.name.clone())
                        .unwrap_or_default();
                    (
                        volume.name.clone(),
                        volume.volume_type.clone(),
                        instance_id,
                        instance_name,
                    )
                }
                None => (
                    "DeletedVolume".to_string(),
                    "Unknown".to_string(),
                    "N/A".to_string(),
                    "N/A".to_string(),
                ),
            };

        Ok(Evaluation::include(vec![
            Field::text(snapshot.id()),
            Field::text(volume_id),
            Field::text(volume_name),
            Field::text(volume_type),
            Field::text(instance_id),
            Field::text(instance_name),
            Field::Integer(snapshot.u64_attr("VolumeSize").unwrap_or(0) as i64),
            Field::text(started.date_naive().to_string()),
        ]))
    }
}
