//! Generic pipeline execution engine
//!
//! Every scanner is a [`Pipeline`]: it fetches resources of one kind and
//! evaluates each one into an included row or an exclusion. The engine owns
//! the run lifecycle:
//! - fetch once, before any evaluation starts
//! - evaluate concurrently in a semaphore-bounded pool, each evaluation under
//!   a timeout
//! - collect included rows, check their arity against the header
//! - stable-sort by the pipeline's sort column and hand the rows to the sink


use crate::error::{EvaluationFailure, ScanError};
use crate::models::{Evaluation, ResourceDescriptor, ResourceKind, Row, SortDirection, SortSpec};
use crate::observability::{ScannerMetrics, StructuredLogger};
use crate::report::ReportSink;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout, Instant};
use tracing::debug;

/// A resource scanner run by the [`PipelineEngine`]
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Stable pipeline identifier, also used as the report name
    fn name(&self) -> &'static str;

    fn kind(&self) -> ResourceKind;

    /// Report columns; every included row must match this arity
    fn header(&self) -> &'static [&'static str];

    fn sort(&self) -> SortSpec;

    /// List the resources to evaluate; called once per run
    async fn fetch(&self) -> Result<Vec<ResourceDescriptor>>;

    /// Classify one resource
    async fn evaluate(&self, resource: &ResourceDescriptor) -> Result<Evaluation>;
}

/// Configuration for pipeline runs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent evaluations per run (default: 8)
    pub max_workers: usize,
    /// Upper bound for a single evaluation (default: 60 seconds)
    pub evaluation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 8,
            evaluation_timeout: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_evaluation_timeout(mut self, evaluation_timeout: Duration) -> Self {
        self.evaluation_timeout = evaluation_timeout;
        self
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub pipeline: String,
    pub fetched: usize,
    pub evaluated: usize,
    pub included: usize,
    /// Excluded resources, failed evaluations included
    pub excluded: usize,
    pub failures: Vec<EvaluationFailure>,
    pub elapsed: Duration,
}

/// Runs pipelines
pub struct PipelineEngine {
    config: EngineConfig,
    metrics: ScannerMetrics,
    logger: StructuredLogger,
}

impl PipelineEngine {
    pub fn new(config: EngineConfig, metrics: ScannerMetrics, logger: StructuredLogger) -> Self {
        Self {
            config,
            metrics,
            logger,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run a pipeline to completion and write its report
    ///
    /// Individual evaluation failures never abort the run; only fetch and
    /// sink failures (and a sort column missing from the header) do.
    pub async fn run(
        &self,
        pipeline: Arc<dyn Pipeline>,
        sink: &dyn ReportSink,
    ) -> Result<RunReport, ScanError> {
        let name = pipeline.name();
        let header = pipeline.header();
        let sort = pipeline.sort();

        let sort_index = header
            .iter()
            .position(|column| *column == sort.column)
            .ok_or_else(|| ScanError::Schema {
                pipeline: name.to_string(),
                column: sort.column.to_string(),
            })?;

        self.logger.log_pipeline_started(name);
        let started = Instant::now();

        let resources = match pipeline.fetch().await {
            Ok(resources) => resources,
            Err(source) => {
                self.metrics.inc_pipeline_failures(name);
                return Err(ScanError::Fetch {
                    pipeline: name.to_string(),
                    source,
                });
            }
        };

        let fetched = resources.len();
        self.metrics.add_fetched(name, fetched);
        debug!(pipeline = %name, kind = %pipeline.kind(), fetched, "Fetched resources");

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut handles = Vec::with_capacity(fetched);

        for resource in resources {
            let resource_id = resource.id();
            let pipeline = pipeline.clone();
            let semaphore = semaphore.clone();
            let metrics = self.metrics.clone();
            let limit = self.config.evaluation_timeout;

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|e| anyhow!("Failed to acquire worker permit: {}", e))?;

                let eval_started = Instant::now();
                let outcome = timeout(limit, pipeline.evaluate(&resource)).await;
                metrics.observe_evaluation_latency(
                    pipeline.name(),
                    eval_started.elapsed().as_secs_f64(),
                );

                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(anyhow!("evaluation timed out after {:?}", limit)),
                }
            });

            handles.push((resource_id, handle));
        }

        let mut rows = Vec::new();
        let mut excluded = 0;
        let mut failures = Vec::new();

        // Awaited in fetch order so ties in the sort keep fetch order
        for (resource_id, handle) in handles {
            let failure = match handle.await {
                Ok(Ok(Evaluation::Included(row))) if row.len() == header.len() => {
                    rows.push(row);
                    continue;
                }
                Ok(Ok(Evaluation::Included(row))) => format!(
                    "row has {} fields but the report header has {}",
                    row.len(),
                    header.len()
                ),
                Ok(Ok(Evaluation::Excluded { reason })) => {
                    debug!(pipeline = %name, resource_id = %resource_id, reason = %reason, "Resource excluded");
                    excluded += 1;
                    continue;
                }
                Ok(Err(e)) => format!("{e:#}"),
                Err(e) if e.is_panic() => "evaluation panicked".to_string(),
                Err(e) => format!("evaluation task failed: {e}"),
            };

            self.metrics.inc_evaluation_failures(name);
            self.logger
                .log_evaluation_failure(name, &resource_id, &failure);
            excluded += 1;
            failures.push(EvaluationFailure::new(resource_id, failure));
        }

        sort_rows(&mut rows, sort_index, sort.direction);

        if let Err(source) = sink.write(name, header, &rows).await {
            self.metrics.inc_pipeline_failures(name);
            return Err(ScanError::Sink {
                pipeline: name.to_string(),
                source,
            });
        }

        self.metrics.add_flagged(name, rows.len());
        self.metrics.add_excluded(name, excluded);

        let report = RunReport {
            pipeline: name.to_string(),
            fetched,
            evaluated: fetched,
            included: rows.len(),
            excluded,
            failures,
            elapsed: started.elapsed(),
        };
        self.logger.log_pipeline_finished(&report);

        Ok(report)
    }
}

/// Stable sort on one column; ties keep their current order in both directions
pub fn sort_rows(rows: &mut [Row], column: usize, direction: SortDirection) {
    rows.sort_by(|a, b| {
        let ordering = match (a.get(column), b.get(column)) {
            (Some(x), Some(y)) => x.sort_cmp(y),
            _ => Ordering::Equal,
        };
        match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    });
}
