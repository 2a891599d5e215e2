//! Export Module
//!
//! The metrics sink. Writes every artifact of a report to a directory
//! (tables and image series as CSV, text as plain files) and renders the
//! run summary as text, JSON or JSON Lines for integration with other tools.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::RankedSource;
use crate::analyzer::AnalysisReport;
use crate::distribution::Stat;
use crate::error::SinkError;
use crate::heuristics::SuspiciousSource;
use crate::report::{Artifact, ArtifactData, Series, Table};

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// Destination for artifacts.
pub trait ArtifactSink {
    fn write(&mut self, artifact: &Artifact) -> Result<(), SinkError>;
}

/// Writes each artifact to `<directory>/<name>.<csv|txt>`.
pub struct DirectorySink {
    directory: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    /// Creates the directory if needed.
    pub fn create(directory: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).map_err(|source| SinkError::Io {
            name: directory.display().to_string(),
            source,
        })?;

        Ok(Self {
            directory,
            written: Vec::new(),
        })
    }

    /// Paths written so far, in order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn path_for(&self, artifact: &Artifact) -> PathBuf {
        let extension = match artifact.data {
            ArtifactData::Text(_) => "txt",
            ArtifactData::Table(_) | ArtifactData::Image(_) => "csv",
        };
        self.directory.join(format!("{}.{}", artifact.name, extension))
    }
}

impl ArtifactSink for DirectorySink {
    fn write(&mut self, artifact: &Artifact) -> Result<(), SinkError> {
        let path = self.path_for(artifact);
        match &artifact.data {
            ArtifactData::Table(table) => write_table(&path, &artifact.name, table)?,
            ArtifactData::Image(series) => write_series(&path, &artifact.name, series)?,
            ArtifactData::Text(text) => fs::write(&path, text).map_err(|source| SinkError::Io {
                name: artifact.name.clone(),
                source,
            })?,
        }

        debug!("Wrote {} artifact '{}' to {}", artifact.kind, artifact.name, path.display());
        self.written.push(path);
        Ok(())
    }
}

fn csv_error(name: &str) -> impl Fn(csv::Error) -> SinkError + '_ {
    move |source| SinkError::Csv {
        name: name.to_string(),
        source,
    }
}

fn write_table(path: &Path, name: &str, table: &Table) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(name))?;
    writer.write_record(&table.columns).map_err(csv_error(name))?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| cell.to_string()))
            .map_err(csv_error(name))?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        name: name.to_string(),
        source,
    })
}

fn write_series(path: &Path, name: &str, series: &Series) -> Result<(), SinkError> {
    let mut writer = csv::Writer::from_path(path).map_err(csv_error(name))?;
    writer
        .write_record([&series.x_label, &series.y_label])
        .map_err(csv_error(name))?;
    for (x, y) in &series.points {
        writer
            .write_record([x.to_string(), y.to_string()])
            .map_err(csv_error(name))?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        name: name.to_string(),
        source,
    })
}

/// Sends every artifact to `sink`, stopping at the first failure.
pub fn write_all(sink: &mut dyn ArtifactSink, artifacts: &[Artifact]) -> Result<usize, SinkError> {
    for artifact in artifacts {
        sink.write(artifact)?;
    }
    info!("Wrote {} artifacts", artifacts.len());
    Ok(artifacts.len())
}

/// JSON-serializable run summary
#[derive(Serialize)]
pub struct JsonReport {
    pub version: &'static str,
    pub timestamp: String,
    pub record_count: usize,
    pub source_count: usize,
    pub duration_secs: Option<f64>,
    pub source_entropy_bits: Option<f64>,
    pub ipg_skewness: Option<f64>,
    pub ipg_excess_kurtosis: Option<f64>,
    pub mean_packet_length: Option<f64>,
    pub packet_size_skewness: Option<f64>,
    pub top_sources: Vec<JsonRanked>,
    pub horizontal_scan: Vec<JsonRanked>,
    pub suspicious_patterns: Vec<JsonSuspicious>,
}

impl From<&AnalysisReport> for JsonReport {
    fn from(report: &AnalysisReport) -> Self {
        Self {
            version: "1.0",
            timestamp: report.generated_at.to_rfc3339(),
            record_count: report.record_count(),
            source_count: report.source_count(),
            duration_secs: report.duration_secs,
            source_entropy_bits: report.entropy.entropy_bits,
            ipg_skewness: report.ipg_shape.map(|s| s.skewness),
            ipg_excess_kurtosis: report.ipg_shape.map(|s| s.excess_kurtosis),
            mean_packet_length: report.mean_length,
            packet_size_skewness: report.size_shape.map(|s| s.skewness),
            top_sources: report.top_sources.iter().map(JsonRanked::from).collect(),
            horizontal_scan: report.horizontal_scan.iter().map(JsonRanked::from).collect(),
            suspicious_patterns: report.suspicious.iter().map(JsonSuspicious::from).collect(),
        }
    }
}

/// JSON-serializable ranked source
#[derive(Serialize)]
pub struct JsonRanked {
    pub src: String,
    pub value: u64,
}

impl From<&RankedSource> for JsonRanked {
    fn from(ranked: &RankedSource) -> Self {
        Self {
            src: ranked.src.to_string(),
            value: ranked.value,
        }
    }
}

/// JSON-serializable burst/gap finding
#[derive(Serialize)]
pub struct JsonSuspicious {
    pub src: String,
    pub bursts: usize,
    pub long_gaps: usize,
}

impl From<&SuspiciousSource> for JsonSuspicious {
    fn from(s: &SuspiciousSource) -> Self {
        Self {
            src: s.src.to_string(),
            bursts: s.burst_count,
            long_gaps: s.long_gap_count,
        }
    }
}

/// Exports a report summary in the specified format
pub fn export_report(report: &AnalysisReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => export_text(report),
        OutputFormat::Json => export_json(report),
        OutputFormat::JsonLines => export_jsonl(report),
    }
}

/// Exports the summary as pretty-printed JSON
pub fn export_json(report: &AnalysisReport) -> String {
    let json_report = JsonReport::from(report);
    serde_json::to_string_pretty(&json_report)
        .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Exports the summary as JSON Lines (one finding per line)
pub fn export_jsonl(report: &AnalysisReport) -> String {
    let mut lines = Vec::new();

    // First line is the summary
    let summary = serde_json::json!({
        "type": "summary",
        "timestamp": report.generated_at.to_rfc3339(),
        "record_count": report.record_count(),
        "source_count": report.source_count(),
        "source_entropy_bits": report.entropy.entropy_bits,
        "ipg_skewness": report.ipg_shape.map(|s| s.skewness),
        "ipg_excess_kurtosis": report.ipg_shape.map(|s| s.excess_kurtosis),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for scanner in &report.horizontal_scan {
        let line = serde_json::json!({
            "type": "horizontal_scan",
            "src": scanner.src.to_string(),
            "unique_dst_count": scanner.value,
        });
        lines.push(line.to_string());
    }

    for suspicious in &report.suspicious {
        let line = serde_json::json!({
            "type": "suspicious_pattern",
            "src": suspicious.src.to_string(),
            "bursts": suspicious.burst_count,
            "long_gaps": suspicious.long_gap_count,
        });
        lines.push(line.to_string());
    }

    lines.join("\n")
}

/// Exports the summary as formatted text
pub fn export_text(report: &AnalysisReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "--- Traffic Metrics ---\nTime: {}\nRecords: {}\nSources: {}\nDuration: {}\n",
        report.generated_at.format("%Y-%m-%d %H:%M:%S"),
        report.record_count(),
        report.source_count(),
        format_duration(report.duration_secs),
    ));
    output.push_str(&format!(
        "Source entropy: {} bits\nIPG skewness: {}\nIPG excess kurtosis: {}\n",
        Stat(report.entropy.entropy_bits),
        Stat(report.ipg_shape.map(|s| s.skewness)),
        Stat(report.ipg_shape.map(|s| s.excess_kurtosis)),
    ));

    if !report.top_sources.is_empty() {
        output.push_str(&format!("\nTop {} Sources:\n", report.top_sources.len()));
        for (rank, source) in report.top_sources.iter().enumerate() {
            output.push_str(&format!("  {:>2}. {:<40} {:>10} packets\n", rank + 1, source.src, source.value));
        }
    }

    if report.horizontal_scan.is_empty() {
        output.push_str("\nHorizontal Scans: None detected\n");
    } else {
        output.push_str(&format!("\nHorizontal Scans ({}):\n", report.horizontal_scan.len()));
        for scanner in &report.horizontal_scan {
            output.push_str(&format!("  {} -> {} distinct destinations\n", scanner.src, scanner.value));
        }
    }

    if report.suspicious.is_empty() {
        output.push_str("Suspicious Patterns: None detected\n");
    } else {
        output.push_str(&format!("Suspicious Patterns ({}):\n", report.suspicious.len()));
        output.push_str(&"-".repeat(60));
        output.push('\n');
        for s in &report.suspicious {
            output.push_str(&format!(
                "  {} -> Bursts: {}, Long gaps: {}\n",
                s.src, s.burst_count, s.long_gap_count
            ));
        }
    }

    output
}

/// Formats a capture duration in a human-readable way
fn format_duration(secs: Option<f64>) -> String {
    match secs {
        Some(s) if s >= 3600.0 => format!("{:.1}h", s / 3600.0),
        Some(s) if s >= 60.0 => format!("{:.1}min", s / 60.0),
        Some(s) => format!("{:.3}s", s),
        None => "N/A".to_string(),
    }
}
