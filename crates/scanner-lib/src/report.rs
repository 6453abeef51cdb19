//! Report sinks
//!
//! The engine hands every finished run to a [`ReportSink`] exactly once with
//! the full, ordered row set. Sinks overwrite whatever a previous run wrote.

use crate::models::Row;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

/// Durable destination for report rows
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write(&self, pipeline: &str, header: &[&str], rows: &[Row]) -> Result<()>;
}

/// Header-keyed JSON record for one row
pub fn row_record(header: &[&str], row: &Row) -> Value {
    let record: Map<String, Value> = header
        .iter()
        .zip(row.fields())
        .map(|(column, field)| (column.to_string(), field.to_json()))
        .collect();
    Value::Object(record)
}

/// Writes `<dir>/<pipeline>.json` per run
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pipeline: &str) -> PathBuf {
        self.dir.join(format!("{pipeline}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ReportSink for JsonFileSink {
    async fn write(&self, pipeline: &str, header: &[&str], rows: &[Row]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating report directory {}", self.dir.display()))?;

        let document = json!({
            "pipeline": pipeline,
            "generated_at": Utc::now().to_rfc3339(),
            "header": header,
            "rows": rows.iter().map(|r| row_record(header, r)).collect::<Vec<_>>(),
        });

        let path = self.path_for(pipeline);
        let body = serde_json::to_vec_pretty(&document)?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing report {}", path.display()))?;

        info!(
            pipeline = %pipeline,
            rows = rows.len(),
            path = %path.display(),
            "Report written"
        );
        Ok(())
    }
}

/// A report captured in memory
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedReport {
    pub header: Vec<String>,
    pub rows: Vec<Row>,
    /// Number of times this pipeline has been written
    pub writes: usize,
}

/// In-memory sink used by tests and the table summary
#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<HashMap<String, CapturedReport>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, pipeline: &str) -> Option<CapturedReport> {
        self.reports
            .lock()
            .ok()
            .and_then(|reports| reports.get(pipeline).cloned())
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn write(&self, pipeline: &str, header: &[&str], rows: &[Row]) -> Result<()> {
        let mut reports = self
            .reports
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?;

        let writes = reports.get(pipeline).map(|r| r.writes).unwrap_or(0) + 1;
        reports.insert(
            pipeline.to_string(),
            CapturedReport {
                header: header.iter().map(|h| h.to_string()).collect(),
                rows: rows.to_vec(),
                writes,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Field;
    use tempfile::TempDir;

    fn rows() -> Vec<Row> {
        vec![
            Row::new(vec![Field::text("vol-1"), Field::Integer(100)]),
            Row::new(vec![Field::text("vol-2"), Field::Integer(8)]),
        ]
    }

    #[tokio::test]
    async fn test_json_sink_writes_header_keyed_records() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path().join("out"));

        sink.write("ebs-unused", &["ID", "Size (GB)"], &rows())
            .await
            .unwrap();

        let body = std::fs::read_to_string(sink.path_for("ebs-unused")).unwrap();
        let doc: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["pipeline"], "ebs-unused");
        assert_eq!(doc["rows"][0]["ID"], "vol-1");
        assert_eq!(doc["rows"][1]["Size (GB)"], 8);
    }

    #[tokio::test]
    async fn test_json_sink_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = JsonFileSink::new(dir.path());

        sink.write("p", &["ID", "Size (GB)"], &rows()).await.unwrap();
        sink.write("p", &["ID", "Size (GB)"], &[]).await.unwrap();

        let body = std::fs::read_to_string(sink.path_for("p")).unwrap();
        let doc: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["rows"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_memory_sink_counts_writes() {
        let sink = MemorySink::new();
        sink.write("p", &["ID", "Size"], &rows()).await.unwrap();

        let report = sink.report("p").unwrap();
        assert_eq!(report.writes, 1);
        assert_eq!(report.rows.len(), 2);
        assert!(sink.report("missing").is_none());
    }
}
