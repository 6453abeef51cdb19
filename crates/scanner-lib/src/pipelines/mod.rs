//! Concrete pipelines, one per resource kind and waste pattern
//!
//! Each pipeline is a thin [`Pipeline`] implementation over the shared rule
//! families in [`crate::classifier`]. Per-pipeline thresholds live in
//! [`PipelineSettings`], which the binary loads from its configuration.

mod dynamodb;
mod ebs_unused;
mod ec2;
mod eip_unused;
mod inventory;
mod kinesis;
mod lambda;
mod logs;
mod nat_unused;
mod snapshot_old;

pub use dynamodb::{DynamoDbUnusedPipeline, DynamoDbUnusedSettings};
pub use ebs_unused::{EbsUnusedPipeline, EbsUnusedSettings};
pub use ec2::{Ec2IdlePipeline, Ec2IdleSettings, Ec2UnusedPipeline, Ec2UnusedSettings};
pub use eip_unused::EipUnusedPipeline;
pub use inventory::{InstanceSummary, InventoryIndex, VolumeSummary};
pub use kinesis::{KinesisShardsPipeline, KinesisShardsSettings};
pub use lambda::{LambdaMemoryPipeline, LambdaMemorySettings};
pub use logs::{
    LogsHighIngestionPipeline, LogsHighIngestionSettings, LogsNeverExpirePipeline,
    LogsNeverExpireSettings,
};
pub use nat_unused::{NatUnusedPipeline, NatUnusedSettings};
pub use snapshot_old::{SnapshotOldPipeline, SnapshotOldSettings};

use crate::classifier::{
    ExclusionPolicy, ExclusionReason, DEFAULT_MANAGED_INDICATORS, DEFAULT_PROTECTED_KEYS,
};
use crate::engine::Pipeline;
use crate::error::ScanError;
use crate::models::Evaluation;
use crate::sources::ScanClients;
use crate::units::ByteUnits;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const EBS_UNUSED: &str = "ebs-unused";
pub const EC2_UNUSED: &str = "ec2-unused";
pub const EC2_IDLE: &str = "ec2-idle";
pub const NAT_UNUSED: &str = "nat-unused";
pub const EIP_UNUSED: &str = "eip-unused";
pub const SNAPSHOT_OLD: &str = "snapshot-old";
pub const KINESIS_SHARDS: &str = "kinesis-shards";
pub const DYNAMODB_UNUSED: &str = "dynamodb-unused";
pub const LOGS_HIGH_INGESTION: &str = "logs-high-ingestion";
pub const LOGS_NEVER_EXPIRE: &str = "logs-never-expire";
pub const LAMBDA_MEMORY: &str = "lambda-memory";

/// Longest lookback any pipeline accepts
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Every pipeline name, in default run order
pub const ALL_PIPELINES: &[&str] = &[
    EBS_UNUSED,
    EC2_UNUSED,
    EC2_IDLE,
    NAT_UNUSED,
    EIP_UNUSED,
    SNAPSHOT_OLD,
    KINESIS_SHARDS,
    DYNAMODB_UNUSED,
    LOGS_HIGH_INGESTION,
    LOGS_NEVER_EXPIRE,
    LAMBDA_MEMORY,
];

/// Pipelines that read other kinds through an [`InventoryIndex`]
pub fn needs_inventory(name: &str) -> bool {
    matches!(name, EIP_UNUSED | SNAPSHOT_OLD)
}

/// Thresholds and rule parameters for every pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Divisor for every byte conversion in a run
    pub byte_units: ByteUnits,
    pub protected_tag_keys: Vec<String>,
    pub managed_tag_indicators: Vec<String>,
    pub ebs_unused: EbsUnusedSettings,
    pub ec2_unused: Ec2UnusedSettings,
    pub ec2_idle: Ec2IdleSettings,
    pub nat_unused: NatUnusedSettings,
    pub snapshot_old: SnapshotOldSettings,
    pub kinesis_shards: KinesisShardsSettings,
    pub dynamodb_unused: DynamoDbUnusedSettings,
    pub logs_high_ingestion: LogsHighIngestionSettings,
    pub logs_never_expire: LogsNeverExpireSettings,
    pub lambda_memory: LambdaMemorySettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            byte_units: ByteUnits::default(),
            protected_tag_keys: DEFAULT_PROTECTED_KEYS.iter().map(|s| s.to_string()).collect(),
            managed_tag_indicators: DEFAULT_MANAGED_INDICATORS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ebs_unused: EbsUnusedSettings::default(),
            ec2_unused: Ec2UnusedSettings::default(),
            ec2_idle: Ec2IdleSettings::default(),
            nat_unused: NatUnusedSettings::default(),
            snapshot_old: SnapshotOldSettings::default(),
            kinesis_shards: KinesisShardsSettings::default(),
            dynamodb_unused: DynamoDbUnusedSettings::default(),
            logs_high_ingestion: LogsHighIngestionSettings::default(),
            logs_never_expire: LogsNeverExpireSettings::default(),
            lambda_memory: LambdaMemorySettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn exclusion_policy(&self) -> ExclusionPolicy {
        ExclusionPolicy::new(&self.protected_tag_keys, &self.managed_tag_indicators)
    }

    /// Reject windows longer than [`MAX_WINDOW_DAYS`]
    pub fn validate(&self) -> Result<(), ScanError> {
        let days = [
            ("ebs_unused.lookback_days", self.ebs_unused.lookback_days),
            ("ec2_unused.lookback_days", self.ec2_unused.lookback_days),
            ("ec2_idle.lookback_days", self.ec2_idle.lookback_days),
            ("nat_unused.lookback_days", self.nat_unused.lookback_days),
            ("snapshot_old.max_age_days", self.snapshot_old.max_age_days),
            ("kinesis_shards.lookback_days", self.kinesis_shards.lookback_days),
            ("dynamodb_unused.lookback_days", self.dynamodb_unused.lookback_days),
            ("logs_high_ingestion.lookback_days", self.logs_high_ingestion.lookback_days),
            ("logs_never_expire.period_days", self.logs_never_expire.period_days),
            (
                "lambda_memory.invocation_lookback_days",
                self.lambda_memory.invocation_lookback_days,
            ),
            ("lambda_memory.report_lookback_days", self.lambda_memory.report_lookback_days),
        ];
        let hours = [
            ("ec2_unused.period_hours", self.ec2_unused.period_hours),
            ("kinesis_shards.period_hours", self.kinesis_shards.period_hours),
        ];

        if let Some((key, value)) = days.iter().find(|(_, v)| *v > MAX_WINDOW_DAYS) {
            return Err(ScanError::Config(format!(
                "{key} is {value}, at most {MAX_WINDOW_DAYS} days allowed"
            )));
        }
        if let Some((key, value)) = hours.iter().find(|(_, v)| *v > MAX_WINDOW_DAYS * 24) {
            return Err(ScanError::Config(format!(
                "{key} is {value}, at most {} hours allowed",
                MAX_WINDOW_DAYS * 24
            )));
        }
        Ok(())
    }
}

/// Everything a pipeline needs for one run
#[derive(Clone)]
pub struct ScanContext {
    /// Reference time for windows and age checks
    pub now: DateTime<Utc>,
    pub units: ByteUnits,
    pub exclusions: Arc<ExclusionPolicy>,
    pub clients: ScanClients,
}

impl ScanContext {
    pub fn new(settings: &PipelineSettings, clients: ScanClients) -> Self {
        Self {
            now: Utc::now(),
            units: settings.byte_units,
            exclusions: Arc::new(settings.exclusion_policy()),
            clients,
        }
    }

    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

/// Build a pipeline by name
///
/// `inventory` is required by the pipelines listed in [`needs_inventory`].
pub fn build(
    name: &str,
    ctx: ScanContext,
    settings: &PipelineSettings,
    inventory: Option<Arc<InventoryIndex>>,
) -> Result<Arc<dyn Pipeline>, ScanError> {
    let missing_inventory =
        || ScanError::Config(format!("pipeline {name} requires an inventory index"));

    let pipeline: Arc<dyn Pipeline> = match name {
        EBS_UNUSED => Arc::new(EbsUnusedPipeline::new(ctx, settings.ebs_unused.clone())),
        EC2_UNUSED => Arc::new(Ec2UnusedPipeline::new(ctx, settings.ec2_unused.clone())),
        EC2_IDLE => Arc::new(Ec2IdlePipeline::new(ctx, settings.ec2_idle.clone())),
        NAT_UNUSED => Arc::new(NatUnusedPipeline::new(ctx, settings.nat_unused.clone())),
        EIP_UNUSED => Arc::new(EipUnusedPipeline::new(
            ctx,
            inventory.ok_or_else(missing_inventory)?,
        )),
        SNAPSHOT_OLD => Arc::new(SnapshotOldPipeline::new(
            ctx,
            settings.snapshot_old.clone(),
            inventory.ok_or_else(missing_inventory)?,
        )),
        KINESIS_SHARDS => Arc::new(KinesisShardsPipeline::new(
            ctx,
            settings.kinesis_shards.clone(),
        )),
        DYNAMODB_UNUSED => Arc::new(DynamoDbUnusedPipeline::new(
            ctx,
            settings.dynamodb_unused.clone(),
        )),
        LOGS_HIGH_INGESTION => Arc::new(LogsHighIngestionPipeline::new(
            ctx,
            settings.logs_high_ingestion.clone(),
        )),
        LOGS_NEVER_EXPIRE => Arc::new(LogsNeverExpirePipeline::new(
            ctx,
            settings.logs_never_expire.clone(),
        )),
        LAMBDA_MEMORY => Arc::new(LambdaMemoryPipeline::new(
            ctx,
            settings.lambda_memory.clone(),
        )),
        other => return Err(ScanError::Config(format!("unknown pipeline '{other}'"))),
    };

    Ok(pipeline)
}

fn excluded(reason: ExclusionReason) -> Evaluation {
    Evaluation::exclude(reason.to_string())
}


#[cfg(test)]
mod tests {
    use super::testing::{context, FakeCloud};
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.byte_units, ByteUnits::Binary);
        assert_eq!(settings.protected_tag_keys.len(), 3);
        assert_eq!(settings.ebs_unused.lookback_days, 30);
    }

    #[test]
    fn test_partial_settings_deserialize() {
        let settings: PipelineSettings = serde_json::from_value(serde_json::json!({
            "byte_units": "decimal",
            "ec2_unused": {"cpu_threshold_percent": 10.0}
        }))
        .unwrap();
        assert_eq!(settings.byte_units, ByteUnits::Decimal);
        assert_eq!(settings.ec2_unused.cpu_threshold_percent, 10.0);
        assert_eq!(settings.ec2_unused.lookback_days, 30);
    }

    #[test]
    fn test_validate_bounds_windows() {
        assert!(PipelineSettings::default().validate().is_ok());

        let mut settings = PipelineSettings::default();
        settings.ec2_idle.lookback_days = 50_000;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("ec2_idle.lookback_days"));

        let mut settings = PipelineSettings::default();
        settings.kinesis_shards.period_hours = u32::MAX;
        assert!(matches!(settings.validate(), Err(ScanError::Config(_))));
    }

    #[test]
    fn test_build_every_pipeline() {
        let settings = PipelineSettings::default();
        let ctx = context(Arc::new(FakeCloud::default()), Utc::now());
        let inventory = Arc::new(InventoryIndex::default());

        for name in ALL_PIPELINES {
            let pipeline = build(name, ctx.clone(), &settings, Some(inventory.clone())).unwrap();
            assert_eq!(pipeline.name(), *name);
            assert!(pipeline.header().contains(&pipeline.sort().column));
        }
    }

    #[test]
    fn test_build_rejects_unknown_and_missing_inventory() {
        let settings = PipelineSettings::default();
        let ctx = context(Arc::new(FakeCloud::default()), Utc::now());

        assert!(matches!(
            build("lambda-unused", ctx.clone(), &settings, None),
            Err(ScanError::Config(_))
        ));
        assert!(matches!(
            build(EIP_UNUSED, ctx, &settings, None),
            Err(ScanError::Config(_))
        ));
        assert!(needs_inventory(SNAPSHOT_OLD));
        assert!(!needs_inventory(EBS_UNUSED));
    }
}
