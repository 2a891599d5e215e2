//! pcap-metrics: traffic-behaviour statistics and anomaly indicators from
//! recorded packet captures.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Ingest    │────>│ RecordStore │────>│  Analyzer   │────>│   Export    │
//! │  (pcap)     │     │  (sorted)   │     │ (pure pass) │     │   (sink)    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!  one shard per file    merge + sort      AnalysisReport      CSV / TXT /
//!                                                              JSON summary
//! ```
//!
//! Only packet metadata is used: timestamp, frame length, source and
//! destination address. The output is a set of indicators, not verdicts.

pub mod aggregator;
pub mod analyzer;
pub mod config;
pub mod distribution;
pub mod error;
pub mod export;
pub mod heuristics;
pub mod ingest;
pub mod ipg;
pub mod record;
pub mod report;
pub mod temporal;

pub use analyzer::{AnalysisReport, EntityStats, TrafficAnalyzer};
pub use config::Config;
pub use record::{PacketRecord, RecordStore};
