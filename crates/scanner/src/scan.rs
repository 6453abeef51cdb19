//! Runs the selected pipelines concurrently and collects their outcomes

use crate::config::ScannerConfig;
use crate::summary::SummaryRow;
use scanner_lib::{
    pipelines::{self, InventoryIndex, ScanContext},
    sources::{Collaborators, ScanClients},
    JsonFileSink, PipelineEngine, RunReport, ScannerMetrics, StructuredLogger,
};
use std::sync::Arc;
use tracing::error;

/// Summary rows of one process run, in pipeline order
pub struct ScanOutcome {
    pub rows: Vec<SummaryRow>,
    pub failed: usize,
}

/// Run every pipeline in `config.pipelines`
///
/// A pipeline failure, including a failed inventory collection for the
/// pipelines that read it, is recorded as a failed row and never stops the
/// other pipelines.
pub async fn run_pipelines(
    config: &ScannerConfig,
    collaborators: &Collaborators,
    metrics: &ScannerMetrics,
    logger: &StructuredLogger,
) -> ScanOutcome {
    // Shared lookups for pipelines that join against instances and volumes
    let mut inventory_error = None;
    let inventory = if config.pipelines.iter().any(|p| pipelines::needs_inventory(p)) {
        match InventoryIndex::collect(collaborators.resources.as_ref()).await {
            Ok(index) => Some(Arc::new(index)),
            Err(e) => {
                let message = format!("collecting instance and volume inventory failed: {e:#}");
                error!(error = %message, "Inventory collection failed");
                inventory_error = Some(message);
                None
            }
        }
    } else {
        None
    };

    let engine = Arc::new(PipelineEngine::new(
        config.engine(),
        metrics.clone(),
        logger.clone(),
    ));
    let sink = Arc::new(JsonFileSink::new(&config.output_dir));
    let settings = Arc::new(config.scan.clone());

    let mut rows = Vec::with_capacity(config.pipelines.len());
    let mut failed = 0;
    let mut handles = Vec::with_capacity(config.pipelines.len());
    for name in &config.pipelines {
        if let (true, Some(message)) = (pipelines::needs_inventory(name), &inventory_error) {
            failed += 1;
            logger.log_pipeline_failed(name, message);
            rows.push(SummaryRow::failed(name, message.clone()));
            continue;
        }

        let task_name = name.clone();
        let clients = ScanClients::for_run(collaborators, metrics.clone());
        let ctx = ScanContext::new(&settings, clients);
        let settings = settings.clone();
        let inventory = inventory.clone();
        let engine = engine.clone();
        let sink = sink.clone();

        let handle = tokio::spawn(async move {
            let pipeline = pipelines::build(&task_name, ctx, &settings, inventory)?;
            engine.run(pipeline, sink.as_ref()).await
        });
        handles.push((name.clone(), handle));
    }

    for (name, handle) in handles {
        let outcome: Result<RunReport, String> = match handle.await {
            Ok(Ok(report)) => Ok(report),
            Ok(Err(e)) => Err(e.to_string()),
            Err(e) => Err(format!("pipeline task panicked: {e}")),
        };

        match outcome {
            Ok(report) => rows.push(SummaryRow::finished(&report)),
            Err(message) => {
                failed += 1;
                logger.log_pipeline_failed(&name, &message);
                rows.push(SummaryRow::failed(&name, message));
            }
        }
    }

    ScanOutcome { rows, failed }
}
