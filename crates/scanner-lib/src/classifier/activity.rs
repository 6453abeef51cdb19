//! Metric-based activity test
//!
//! A resource is active when any sample of any configured metric crosses
//! that metric's threshold. Queries go through the [`MetricSource`]; the
//! decision itself is a pure function of the returned series.

use crate::models::{Dimension, MetricSeries, MetricWindow, Statistic};
use crate::sources::MetricSource;
use anyhow::Result;
use chrono::{DateTime, Utc};

/// What counts as activity for one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActivityThreshold {
    /// Count and byte metrics: any sample above zero
    AnyNonZero,
    /// Rate metrics: any sample at or above the threshold.
    ///
    /// The comparison is inclusive, so a CPU sample of exactly the threshold
    /// keeps the resource active.
    AtLeast(f64),
}

impl ActivityThreshold {
    pub fn is_active(&self, value: f64) -> bool {
        match self {
            ActivityThreshold::AnyNonZero => value > 0.0,
            ActivityThreshold::AtLeast(threshold) => value >= *threshold,
        }
    }
}

/// One metric queried by an activity test
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCheck {
    pub namespace: &'static str,
    pub metric: &'static str,
    pub statistic: Statistic,
    pub period_secs: u32,
    pub threshold: ActivityThreshold,
}

impl MetricCheck {
    /// Daily sums compared against zero
    pub fn daily_sum(namespace: &'static str, metric: &'static str) -> Self {
        Self {
            namespace,
            metric,
            statistic: Statistic::Sum,
            period_secs: 86_400,
            threshold: ActivityThreshold::AnyNonZero,
        }
    }

    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = statistic;
        self
    }

    pub fn with_period(mut self, period_secs: u32) -> Self {
        self.period_secs = period_secs;
        self
    }

    pub fn with_threshold(mut self, threshold: ActivityThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn window(
        &self,
        dimension: Dimension,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> MetricWindow {
        MetricWindow::new(self.namespace, self.metric, dimension, start, end)
            .with_period(self.period_secs)
            .with_statistic(self.statistic)
    }
}

/// Result of an activity test
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityAssessment {
    pub active: bool,
    /// Largest sample per check, in check order
    pub peaks: Vec<f64>,
    /// First metric that crossed its threshold
    pub triggered_by: Option<&'static str>,
}

impl ActivityAssessment {
    pub fn peak(&self, index: usize) -> f64 {
        self.peaks.get(index).copied().unwrap_or(0.0)
    }
}

/// Set of metric checks evaluated together
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTest {
    checks: Vec<MetricCheck>,
}

impl ActivityTest {
    pub fn new(checks: Vec<MetricCheck>) -> Self {
        Self { checks }
    }

    pub fn checks(&self) -> &[MetricCheck] {
        &self.checks
    }

    /// Windows to query for one resource
    pub fn windows(
        &self,
        dimension: &Dimension,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MetricWindow> {
        self.checks
            .iter()
            .map(|c| c.window(dimension.clone(), start, end))
            .collect()
    }

    /// Decide activity from one series per check
    ///
    /// Missing trailing series are treated as empty.
    pub fn assess(&self, series: &[MetricSeries]) -> ActivityAssessment {
        let empty = MetricSeries::empty();
        let mut peaks = Vec::with_capacity(self.checks.len());
        let mut triggered_by = None;

        for (index, check) in self.checks.iter().enumerate() {
            let s = series.get(index).unwrap_or(&empty);
            peaks.push(s.max());
            if triggered_by.is_none() && s.values().any(|v| check.threshold.is_active(v)) {
                triggered_by = Some(check.metric);
            }
        }

        ActivityAssessment {
            active: triggered_by.is_some(),
            peaks,
            triggered_by,
        }
    }

    /// Query every check and assess the result
    ///
    /// All checks are queried even after one is found active, so the peaks
    /// are always complete for reporting.
    pub async fn run(
        &self,
        metrics: &dyn MetricSource,
        dimension: &Dimension,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ActivityAssessment> {
        let mut series = Vec::with_capacity(self.checks.len());
        for window in self.windows(dimension, start, end) {
            series.push(metrics.query(&window).await?);
        }
        Ok(self.assess(&series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn series(values: &[f64]) -> MetricSeries {
        let now = Utc::now();
        MetricSeries::new(
            values
                .iter()
                .map(|v| Sample {
                    timestamp: now,
                    value: *v,
                })
                .collect(),
        )
    }

    fn cpu_test(threshold: f64) -> ActivityTest {
        ActivityTest::new(vec![MetricCheck::daily_sum("AWS/EC2", "CPUUtilization")
            .with_statistic(Statistic::Maximum)
            .with_threshold(ActivityThreshold::AtLeast(threshold))])
    }

    #[test]
    fn test_threshold_boundary_is_active() {
        let test = cpu_test(5.0);
        assert!(test.assess(&[series(&[1.0, 5.0])]).active);
        assert!(!test.assess(&[series(&[1.0, 4.99])]).active);
    }

    #[test]
    fn test_any_non_zero() {
        let test = ActivityTest::new(vec![
            MetricCheck::daily_sum("AWS/EBS", "VolumeReadOps"),
            MetricCheck::daily_sum("AWS/EBS", "VolumeWriteOps"),
        ]);

        let idle = test.assess(&[series(&[0.0, 0.0]), series(&[])]);
        assert!(!idle.active);
        assert_eq!(idle.peaks, vec![0.0, 0.0]);

        let active = test.assess(&[series(&[0.0]), series(&[0.0, 2.0])]);
        assert!(active.active);
        assert_eq!(active.triggered_by, Some("VolumeWriteOps"));
        assert_eq!(active.peak(1), 2.0);
    }

    #[test]
    fn test_missing_series_is_empty() {
        let test = cpu_test(5.0);
        let assessment = test.assess(&[]);
        assert!(!assessment.active);
        assert_eq!(assessment.peak(0), 0.0);
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricSource for CountingSource {
        async fn query(&self, window: &MetricWindow) -> Result<MetricSeries> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if window.metric_name == "VolumeReadOps" {
                Ok(series(&[3.0]))
            } else {
                Ok(MetricSeries::empty())
            }
        }
    }

    #[tokio::test]
    async fn test_run_queries_every_check() {
        let source = CountingSource {
            calls: AtomicUsize::new(0),
        };
        let test = ActivityTest::new(vec![
            MetricCheck::daily_sum("AWS/EBS", "VolumeReadOps"),
            MetricCheck::daily_sum("AWS/EBS", "VolumeWriteOps"),
        ]);
        let now = Utc::now();

        let assessment = test
            .run(&source, &Dimension::new("VolumeId", "vol-1"), now, now)
            .await
            .unwrap();

        assert!(assessment.active);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }
}
