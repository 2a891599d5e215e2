//! Domain-specific error types for pcap-metrics.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while turning capture files into packet records.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Input path does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to open capture file '{}': {source}", path.display())]
    CaptureOpen {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    #[error("Failed to list directory '{}': {source}", path.display())]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported link type {linktype} in '{}'", path.display())]
    UnsupportedLinkType { path: PathBuf, linktype: i32 },

    #[error("No capture files with extension '.{extension}' found in the given inputs")]
    NoCaptureFiles { extension: String },

    #[error("Ingestion worker failed: {0}")]
    Worker(String),
}

/// Errors raised by analysis parameters.
///
/// Degenerate data (no records, zero variance) is never an error; those
/// statistics are reported as undefined instead.
#[derive(Error, Debug, PartialEq)]
pub enum AnalyzerError {
    #[error("Window width must be a positive finite number of seconds, got {0}")]
    InvalidWindowWidth(f64),

    #[error("Shard summary covers {summarized} records but the store holds {records}")]
    SummaryMismatch { records: usize, summarized: u64 },
}

/// Errors that can occur while the sink writes artifacts.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write artifact '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write table artifact '{name}': {source}")]
    Csv {
        name: String,
        #[source]
        source: csv::Error,
    },
}
