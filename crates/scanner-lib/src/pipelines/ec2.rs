//! Compute instance pipelines
//!
//! `ec2-unused` flags long-running instances whose CPU and network peaks
//! stay below their thresholds and prices them. `ec2-idle` reports every
//! instance with an IDLE/ACTIVE status (or its state when not running).

use super::{excluded, ScanContext, EC2_IDLE, EC2_UNUSED};
use crate::classifier::{
    ActivityAssessment, ActivityTest, ActivityThreshold, AgeGate, ExclusionReason, MetricCheck,
    RuleChain, Screening,
};
use crate::engine::Pipeline;
use crate::models::{
    Dimension, Evaluation, Field, ResourceDescriptor, ResourceKind, SortSpec, Statistic,
};
use crate::pricing::Lifecycle;
use crate::units::ByteUnits;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const UNUSED_HEADER: &[&str] = &[
    "ID",
    "Name",
    "Type",
    "Lifecycle",
    "Status",
    "Launch Time",
    "Max CPU %",
    "Max Net In (MB)",
    "Max Net Out (MB)",
    "Hourly Cost ($)",
];

const IDLE_HEADER: &[&str] = &[
    "ID",
    "Name",
    "Type",
    "Lifecycle",
    "State",
    "Launch Time",
    "Status",
    "Max CPU %",
    "Max Net In (MB)",
    "Max Net Out (MB)",
];

/// States that are on their way out and never worth flagging
const TERMINAL_STATES: &[&str] = &["terminated", "shutting-down", "stopping", "stopped"];

const CPU: usize = 0;
const NET_IN: usize = 1;
const NET_OUT: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2UnusedSettings {
    pub lookback_days: u32,
    /// Max CPU at or above this keeps an instance active
    pub cpu_threshold_percent: f64,
    /// Max network in/out at or above this keeps an instance active
    pub network_threshold_mb: f64,
    pub period_hours: u32,
}

impl Default for Ec2UnusedSettings {
    fn default() -> Self {
        Self {
            lookback_days: 30,
            cpu_threshold_percent: 5.0,
            network_threshold_mb: 5.0,
            period_hours: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ec2IdleSettings {
    pub lookback_days: u32,
    pub cpu_threshold_percent: f64,
    pub network_threshold_mb: f64,
}

impl Default for Ec2IdleSettings {
    fn default() -> Self {
        Self {
            lookback_days: 14,
            cpu_threshold_percent: 2.0,
            network_threshold_mb: 5.0,
        }
    }
}

/// CPU, network in and network out maxima in that order
fn instance_activity(
    units: ByteUnits,
    cpu_threshold_percent: f64,
    network_threshold_mb: f64,
    period_secs: u32,
) -> ActivityTest {
    let net_threshold = ActivityThreshold::AtLeast(network_threshold_mb * units.mega());
    let check = |metric| {
        MetricCheck::daily_sum("AWS/EC2", metric)
            .with_statistic(Statistic::Maximum)
            .with_period(period_secs)
    };

    ActivityTest::new(vec![
        check("CPUUtilization").with_threshold(ActivityThreshold::AtLeast(cpu_threshold_percent)),
        check("NetworkIn").with_threshold(net_threshold),
        check("NetworkOut").with_threshold(net_threshold),
    ])
}

fn state_of(instance: &ResourceDescriptor) -> String {
    instance
        .str_attr("State.Name")
        .unwrap_or_default()
        .to_ascii_lowercase()
}

/// Leading columns shared by both reports
fn identity_fields(instance: &ResourceDescriptor) -> [Field; 4] {
    [
        Field::text(instance.id()),
        Field::text(instance.name_tag()),
        Field::text(instance.str_attr("InstanceType").unwrap_or_default()),
        Field::text(Lifecycle::from_descriptor(instance).as_str()),
    ]
}

fn peak_fields(assessment: Option<&ActivityAssessment>, units: ByteUnits) -> [Field; 3] {
    let peak = |index| assessment.map(|a| a.peak(index)).unwrap_or(0.0);
    [
        Field::decimal(peak(CPU), 2),
        Field::decimal(units.to_mb(peak(NET_IN)), 2),
        Field::decimal(units.to_mb(peak(NET_OUT)), 2),
    ]
}

async fn assess_instance(
    ctx: &ScanContext,
    activity: &ActivityTest,
    lookback_days: u32,
    instance: &ResourceDescriptor,
) -> Result<ActivityAssessment> {
    let (start, end) = AgeGate::new(lookback_days).window(ctx.now);
    activity
        .run(
            ctx.clients.metrics.as_ref(),
            &Dimension::new("InstanceId", instance.id()),
            start,
            end,
        )
        .await
}

/// Running and pending instances that showed no meaningful activity
pub struct Ec2UnusedPipeline {
    ctx: ScanContext,
    settings: Ec2UnusedSettings,
    rules: RuleChain,
    activity: ActivityTest,
}

impl Ec2UnusedPipeline {
    pub fn new(ctx: ScanContext, settings: Ec2UnusedSettings) -> Self {
        let rules = RuleChain::new(ctx.exclusions.clone())
            .with_age_gate(AgeGate::new(settings.lookback_days));
        let activity = instance_activity(
            ctx.units,
            settings.cpu_threshold_percent,
            settings.network_threshold_mb,
            settings.period_hours.max(1).saturating_mul(3600),
        );
        Self {
            ctx,
            settings,
            rules,
            activity,
        }
    }
}

#[async_trait]
impl Pipeline for Ec2UnusedPipeline {
    fn name(&self) -> &'static str {
        EC2_UNUSED
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Instance
    }

    fn header(&self) -> &'static [&'static str] {
        UNUSED_HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::descending("Hourly Cost ($)")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        let instances = self
            .ctx
            .clients
            .resources
            .list(ResourceKind::Instance)
            .await?;

        Ok(instances
            .into_iter()
            .filter(|i| !TERMINAL_STATES.contains(&state_of(i).as_str()))
            .collect())
    }

    async fn evaluate(&self, instance: &ResourceDescriptor) -> Result<Evaluation> {
        let launched: Option<DateTime<Utc>> = instance.time_attr("LaunchTime");
        if let Screening::Excluded(reason) =
            self.rules
                .screen(&instance.tags(), launched, self.ctx.now)
        {
            return Ok(excluded(reason));
        }

        let state = state_of(instance);
        let assessment = if state == "running" {
            let assessment =
                assess_instance(&self.ctx, &self.activity, self.settings.lookback_days, instance)
                    .await?;
            if let Some(metric) = assessment.triggered_by {
                return Ok(excluded(ExclusionReason::Active {
                    metric: metric.to_string(),
                }));
            }
            Some(assessment)
        } else {
            None
        };

        let status = if state == "running" {
            "IDLE".to_string()
        } else {
            state.to_ascii_uppercase()
        };
        let price = self.ctx.clients.prices.resolve(instance).await;

        let mut fields = identity_fields(instance).to_vec();
        fields.push(Field::text(status));
        fields.push(Field::timestamp(launched));
        fields.extend(peak_fields(assessment.as_ref(), self.ctx.units));
        fields.push(price.to_field(4));

        Ok(Evaluation::include(fields))
    }
}

/// Every instance with its activity status
pub struct Ec2IdlePipeline {
    ctx: ScanContext,
    settings: Ec2IdleSettings,
    activity: ActivityTest,
}

impl Ec2IdlePipeline {
    pub fn new(ctx: ScanContext, settings: Ec2IdleSettings) -> Self {
        // One datapoint spanning the whole lookback
        let period_secs = settings.lookback_days.max(1).saturating_mul(86_400);
        let activity = instance_activity(
            ctx.units,
            settings.cpu_threshold_percent,
            settings.network_threshold_mb,
            period_secs,
        );
        Self {
            ctx,
            settings,
            activity,
        }
    }
}

#[async_trait]
impl Pipeline for Ec2IdlePipeline {
    fn name(&self) -> &'static str {
        EC2_IDLE
    }

    fn kind(&self) -> ResourceKind {
        ResourceKind::Instance
    }

    fn header(&self) -> &'static [&'static str] {
        IDLE_HEADER
    }

    fn sort(&self) -> SortSpec {
        SortSpec::ascending("Max CPU %")
    }

    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>> {
        self.ctx
            .clients
            .resources
            .list(ResourceKind::Instance)
            .await
    }

    async fn evaluate(&self, instance: &ResourceDescriptor) -> Result<Evaluation> {
        let state = state_of(instance);

        let (status, assessment) = if state == "running" {
            let assessment =
                assess_instance(&self.ctx, &self.activity, self.settings.lookback_days, instance)
                    .await?;
            let status = if assessment.active { "ACTIVE" } else { "IDLE" };
            (status.to_string(), Some(assessment))
        } else {
            (state.to_ascii_uppercase(), None)
        };

        let mut fields = identity_fields(instance).to_vec();
        fields.push(Field::text(state.to_ascii_uppercase()));
        fields.push(Field::timestamp(instance.time_attr("LaunchTime")));
        fields.push(Field::text(status));
        fields.extend(peak_fields(assessment.as_ref(), self.ctx.units));

        Ok(Evaluation::include(fields))
    }
}
