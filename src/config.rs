//! Configuration Module
//!
//! Provides TOML-based configuration for pcap-metrics.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::export::OutputFormat;
use crate::heuristics::HeuristicsConfig;
use crate::temporal::is_valid_width;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub ingest: IngestConfig,
    pub analyzer: AnalyzerConfig,
    pub detection: HeuristicsConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analyzer.top_n == 0 {
            anyhow::bail!("top_n must be greater than 0");
        }
        if self.analyzer.window_widths_secs.is_empty() {
            anyhow::bail!("window_widths_secs must list at least one width");
        }
        for width in &self.analyzer.window_widths_secs {
            if !is_valid_width(*width) {
                anyhow::bail!("window widths must be at least one microsecond, got {}", width);
            }
        }
        if !is_valid_width(self.analyzer.matrix_bucket_secs) {
            anyhow::bail!("matrix_bucket_secs must be at least one microsecond");
        }
        if !is_positive(self.detection.burst_threshold_secs) {
            anyhow::bail!("burst_threshold_secs must be positive");
        }
        if !is_positive(self.detection.gap_threshold_secs) {
            anyhow::bail!("gap_threshold_secs must be positive");
        }
        if self.detection.burst_threshold_secs >= self.detection.gap_threshold_secs {
            anyhow::bail!("burst_threshold_secs must be smaller than gap_threshold_secs");
        }
        if self.ingest.extension.is_empty() {
            anyhow::bail!("ingest extension must not be empty");
        }
        Ok(())
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Ingestion-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// File extension picked up when an input is a directory
    pub extension: String,
    /// Keep IPv6 packets (IPv4 only by default)
    pub include_ipv6: bool,
    /// Read capture files concurrently, one shard per file
    pub parallel: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extension: "pcap".to_string(),
            include_ipv6: false,
            parallel: true,
        }
    }
}

/// Analyzer-related configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Sources with more distinct destinations than this are reported as scans
    pub scan_threshold: usize,
    /// Number of sources in the most-active ranking
    pub top_n: usize,
    /// Widths of the windowed packet count series; the first is the primary
    pub window_widths_secs: Vec<f64>,
    /// Bucket width of the per-source count matrix behind burstness
    pub matrix_bucket_secs: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            scan_threshold: 50,
            top_n: 10,
            window_widths_secs: vec![10.0, 5.0, 1.0, 60.0],
            matrix_bucket_secs: 60.0,
        }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving one file per artifact
    pub directory: String,
    /// Summary format printed to stdout (text, json, jsonl)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Enable verbose logging
    pub verbose: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "metrics".to_string(),
            format: OutputFormat::Text,
            verbose: false,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.analyzer.scan_threshold, 50);
        assert_eq!(config.analyzer.top_n, 10);
        assert_eq!(config.analyzer.window_widths_secs, vec![10.0, 5.0, 1.0, 60.0]);
        assert_eq!(config.detection.burst_threshold_secs, 0.01);
        assert_eq!(config.detection.gap_threshold_secs, 5.0);
        assert_eq!(config.detection.burst_report_threshold, 10);
        assert_eq!(config.detection.gap_report_threshold, 3);
        assert!(!config.ingest.include_ipv6);
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.analyzer.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analyzer.window_widths_secs = vec![10.0, 0.0];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.analyzer.window_widths_secs.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.detection.burst_threshold_secs = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_default_config() {
        let config_str = Config::generate_default();
        assert!(config_str.contains("[ingest]"));
        assert!(config_str.contains("[analyzer]"));
        assert!(config_str.contains("[detection]"));
        assert!(config_str.contains("[output]"));

        let parsed: Config = toml::from_str(&config_str).unwrap();
        assert_eq!(parsed.analyzer, AnalyzerConfig::default());
        assert_eq!(parsed.detection, HeuristicsConfig::default());
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[ingest]
include_ipv6 = true

[analyzer]
scan_threshold = 20
window_widths_secs = [30.0]

[detection]
burst_threshold_secs = 0.005
gap_report_threshold = 1

[output]
format = "json"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.ingest.include_ipv6);
        assert_eq!(config.ingest.extension, "pcap");
        assert_eq!(config.analyzer.scan_threshold, 20);
        assert_eq!(config.analyzer.top_n, 10);
        assert_eq!(config.analyzer.window_widths_secs, vec![30.0]);
        assert_eq!(config.detection.burst_threshold_secs, 0.005);
        assert_eq!(config.detection.gap_threshold_secs, 5.0);
        assert_eq!(config.detection.gap_report_threshold, 1);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load(Path::new("/nonexistent/pcap-metrics.toml")).is_err());
    }
}
