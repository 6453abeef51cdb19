//! Idle and waste classification rules
//!
//! Every pipeline composes the same rule families, in this order:
//! - hard exclusions (protection and managed-subsystem tags)
//! - age gate (lookback window plus one day)
//! - activity test over metric series
//!
//! Streaming resources additionally get a traffic-shape classification.

mod activity;
mod age_gate;
mod exclusion;
mod traffic;

pub use activity::{ActivityAssessment, ActivityTest, ActivityThreshold, MetricCheck};
pub use age_gate::AgeGate;
pub use exclusion::{ExclusionPolicy, DEFAULT_MANAGED_INDICATORS, DEFAULT_PROTECTED_KEYS};
pub use traffic::{TrafficPattern, TrafficPolicy};

use crate::models::Tag;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Why a resource was left out of a report
#[derive(Debug, Clone, PartialEq)]
pub enum ExclusionReason {
    Protected { key: String },
    Managed { key: String },
    TooYoung { age_days: i64 },
    MissingCreationTime,
    Active { metric: String },
    /// Kind-specific rule (state, association, cutoff date, threshold)
    NotApplicable(String),
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Protected { key } => write!(f, "protected by tag '{key}'"),
            ExclusionReason::Managed { key } => write!(f, "managed by another subsystem (tag '{key}')"),
            ExclusionReason::TooYoung { age_days } => {
                write!(f, "younger than the lookback window ({age_days} days old)")
            }
            ExclusionReason::MissingCreationTime => f.write_str("creation time unknown"),
            ExclusionReason::Active { metric } => write!(f, "active ({metric})"),
            ExclusionReason::NotApplicable(reason) => f.write_str(reason),
        }
    }
}

/// Outcome of the cheap, metric-free rules
#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    Eligible,
    Excluded(ExclusionReason),
}

impl Screening {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Screening::Eligible)
    }
}

/// Hard exclusions followed by an optional age gate
#[derive(Debug, Clone)]
pub struct RuleChain {
    exclusions: Arc<ExclusionPolicy>,
    age_gate: Option<AgeGate>,
}

impl RuleChain {
    pub fn new(exclusions: Arc<ExclusionPolicy>) -> Self {
        Self {
            exclusions,
            age_gate: None,
        }
    }

    pub fn with_age_gate(mut self, age_gate: AgeGate) -> Self {
        self.age_gate = Some(age_gate);
        self
    }

    pub fn age_gate(&self) -> Option<&AgeGate> {
        self.age_gate.as_ref()
    }

    /// Apply exclusions then the age gate; never issues a metric call
    pub fn screen(
        &self,
        tags: &[Tag],
        created_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Screening {
        if let Some(reason) = self.exclusions.check(tags) {
            return Screening::Excluded(reason);
        }

        let Some(gate) = &self.age_gate else {
            return Screening::Eligible;
        };

        match created_at {
            None => Screening::Excluded(ExclusionReason::MissingCreationTime),
            Some(created) if !gate.admits(created, now) => {
                Screening::Excluded(ExclusionReason::TooYoung {
                    age_days: (now - created).num_days(),
                })
            }
            Some(_) => Screening::Eligible,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSeries, Sample, Statistic};
    use chrono::Duration;
    use proptest::prelude::*;

    fn chain() -> RuleChain {
        RuleChain::new(Arc::new(ExclusionPolicy::default())).with_age_gate(AgeGate::new(30))
    }

    #[test]
    fn test_exclusions_come_before_age() {
        let now = Utc::now();
        let screening = chain().screen(&[Tag::new("protected", "")], Some(now), now);
        assert_eq!(
            screening,
            Screening::Excluded(ExclusionReason::Protected {
                key: "protected".to_string()
            })
        );
    }

    #[test]
    fn test_age_gate_applied() {
        let now = Utc::now();
        let young = chain().screen(&[], Some(now - Duration::days(30)), now);
        assert_eq!(
            young,
            Screening::Excluded(ExclusionReason::TooYoung { age_days: 30 })
        );

        let old = chain().screen(&[], Some(now - Duration::days(40)), now);
        assert!(old.is_eligible());

        let unknown = chain().screen(&[], None, now);
        assert_eq!(
            unknown,
            Screening::Excluded(ExclusionReason::MissingCreationTime)
        );
    }

    #[test]
    fn test_no_age_gate() {
        let chain = RuleChain::new(Arc::new(ExclusionPolicy::default()));
        assert!(chain.screen(&[], None, Utc::now()).is_eligible());
    }

    #[test]
    fn test_reason_display() {
        let reason = ExclusionReason::Active {
            metric: "CPUUtilization".to_string(),
        };
        assert_eq!(reason.to_string(), "active (CPUUtilization)");
    }

    proptest! {
        #[test]
        fn classification_is_idempotent(
            values in prop::collection::vec(0.0f64..100.0, 0..20),
            threshold in 0.0f64..100.0,
            age_days in 0i64..90,
        ) {
            let now = Utc::now();
            let created = now - Duration::days(age_days);
            let series = MetricSeries::new(
                values.iter().map(|v| Sample { timestamp: now, value: *v }).collect(),
            );
            let test = ActivityTest::new(vec![
                MetricCheck::daily_sum("AWS/EC2", "CPUUtilization")
                    .with_statistic(Statistic::Maximum)
                    .with_threshold(ActivityThreshold::AtLeast(threshold)),
            ]);

            let chain = chain();
            let first = (chain.screen(&[], Some(created), now), test.assess(&[series.clone()]));
            let second = (chain.screen(&[], Some(created), now), test.assess(&[series]));
            prop_assert_eq!(first, second);
        }
    }
}
