//! Scanner configuration

use anyhow::{Context, Result};
use scanner_lib::pipelines::{PipelineSettings, ALL_PIPELINES};
use scanner_lib::{EngineConfig, ScanError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scanner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScannerConfig {
    /// Concurrent evaluations per pipeline
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Upper bound for a single resource evaluation in seconds
    #[serde(default = "default_evaluation_timeout")]
    pub evaluation_timeout_secs: u64,

    /// Directory receiving one report file per pipeline
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Pipelines to run; empty runs all of them
    #[serde(default)]
    pub pipelines: Vec<String>,

    /// Rule thresholds and exclusion tags
    #[serde(default)]
    pub scan: PipelineSettings,
}

fn default_max_workers() -> usize {
    8
}

fn default_evaluation_timeout() -> u64 {
    60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            evaluation_timeout_secs: default_evaluation_timeout(),
            output_dir: default_output_dir(),
            pipelines: Vec::new(),
            scan: PipelineSettings::default(),
        }
    }
}

impl ScannerConfig {
    /// Load configuration from an optional file layered under `SCANNER_*` environment variables
    ///
    /// Nested keys use a double underscore, e.g. `SCANNER_SCAN__EBS_UNUSED__LOOKBACK_DAYS=14`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("SCANNER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read scanner configuration")?;

        let config: ScannerConfig = config
            .try_deserialize()
            .context("Failed to parse scanner configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.max_workers == 0 {
            return Err(ScanError::Config("max_workers must be at least 1".to_string()));
        }
        if self.evaluation_timeout_secs == 0 {
            return Err(ScanError::Config(
                "evaluation_timeout_secs must be at least 1".to_string(),
            ));
        }
        check_pipeline_names(&self.pipelines)?;
        self.scan.validate()
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_workers(self.max_workers)
            .with_evaluation_timeout(Duration::from_secs(self.evaluation_timeout_secs))
    }

    /// Pipelines selected for this run, in default order
    ///
    /// Names given on the command line take precedence over the configured set.
    pub fn selected_pipelines(&self, requested: &[String]) -> Result<Vec<String>, ScanError> {
        let wanted = if requested.is_empty() {
            &self.pipelines
        } else {
            requested
        };
        check_pipeline_names(wanted)?;

        Ok(ALL_PIPELINES
            .iter()
            .filter(|name| wanted.is_empty() || wanted.iter().any(|w| w == *name))
            .map(|name| name.to_string())
            .collect())
    }
}

fn check_pipeline_names(names: &[String]) -> Result<(), ScanError> {
    match names
        .iter()
        .find(|name| !ALL_PIPELINES.contains(&name.as_str()))
    {
        Some(unknown) => Err(ScanError::Config(format!("unknown pipeline '{unknown}'"))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let config = ScannerConfig::default();
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.evaluation_timeout_secs, 60);
        assert_eq!(config.output_dir, PathBuf::from("reports"));
        assert_eq!(config.selected_pipelines(&[]).unwrap().len(), ALL_PIPELINES.len());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
max_workers = 3
pipelines = ["ebs-unused", "nat-unused"]

[scan]
byte_units = "decimal"

[scan.ebs_unused]
lookback_days = 14
"#
        )
        .unwrap();

        let config = ScannerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.max_workers, 3);
        assert_eq!(config.evaluation_timeout_secs, 60);
        assert_eq!(config.scan.ebs_unused.lookback_days, 14);
        assert_eq!(config.scan.nat_unused.lookback_days, 30);
        assert_eq!(
            config.selected_pipelines(&[]).unwrap(),
            vec!["ebs-unused".to_string(), "nat-unused".to_string()]
        );
    }

    #[test]
    fn test_command_line_selection_wins() {
        let config = ScannerConfig {
            pipelines: vec!["ebs-unused".to_string()],
            ..Default::default()
        };
        assert_eq!(
            config.selected_pipelines(&["eip-unused".to_string()]).unwrap(),
            vec!["eip-unused".to_string()]
        );
    }

    #[test]
    fn test_unknown_requested_pipeline_rejected() {
        let config = ScannerConfig::default();
        let requested = vec!["ebs-unused".to_string(), "lambda-unused".to_string()];

        let err = config.selected_pipelines(&requested).unwrap_err();
        assert!(err.to_string().contains("lambda-unused"));
    }

    #[test]
    fn test_validation() {
        let zero_workers = ScannerConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(zero_workers.validate(), Err(ScanError::Config(_))));

        let unknown = ScannerConfig {
            pipelines: vec!["lambda-unused".to_string()],
            ..Default::default()
        };
        assert!(matches!(unknown.validate(), Err(ScanError::Config(_))));

        let mut huge_window = ScannerConfig::default();
        huge_window.scan.ec2_idle.lookback_days = 49_711;
        assert!(matches!(huge_window.validate(), Err(ScanError::Config(_))));

        assert!(ScannerConfig::default().validate().is_ok());
    }
}
