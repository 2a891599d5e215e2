//! Named artifacts derived from an [`AnalysisReport`].
//!
//! Each artifact has a stable logical name and one of three kinds:
//! a table of rows, a freeform text summary, or an image series that a
//! plotting consumer renders. How artifacts are stored is up to the sink.

use std::fmt;

use serde::Serialize;

use crate::aggregator::RankedSource;
use crate::analyzer::AnalysisReport;
use crate::distribution::Stat;

/// Stable artifact names.
pub mod names {
    pub const IPG: &str = "ipg";
    pub const PACKETS_PER_MINUTE: &str = "packets-per-minute";
    pub const BURSTNESS: &str = "burstness";
    pub const WINDOWED_PACKET_COUNTS: &str = "windowed-packet-counts";
    pub const PACKET_SIZE_CDF: &str = "packet-size-cdf";
    pub const IPG_SHAPE: &str = "ipg-shape";
    pub const PACKET_SIZE_SHAPE: &str = "packet-size-shape";
    pub const SUSPICIOUS_IPS: &str = "suspicious-ips";
    pub const TOP_SOURCES: &str = "top-sources";
    pub const PER_IP_IPG_STATS: &str = "per-ip-ipg-stats";
    pub const ENTROPY_REPORT: &str = "entropy-report";
    pub const BYTES_PER_IP: &str = "bytes-per-ip";
    pub const PACKET_SIZE_FREQUENCY: &str = "packet-size-frequency";
    pub const SUSPICIOUS_PATTERNS: &str = "suspicious-patterns";
    pub const SOURCE_PROFILES: &str = "source-profiles";
}

/// Every artifact name with its kind, in emission order.
///
/// Additional window widths add `windowed-packet-counts-<width>` images.
pub const CATALOGUE: &[(&str, ArtifactKind)] = &[
    (names::IPG, ArtifactKind::Table),
    (names::PACKETS_PER_MINUTE, ArtifactKind::Table),
    (names::BURSTNESS, ArtifactKind::Table),
    (names::WINDOWED_PACKET_COUNTS, ArtifactKind::Image),
    (names::PACKET_SIZE_CDF, ArtifactKind::Image),
    (names::IPG_SHAPE, ArtifactKind::Text),
    (names::PACKET_SIZE_SHAPE, ArtifactKind::Text),
    (names::SUSPICIOUS_IPS, ArtifactKind::Table),
    (names::TOP_SOURCES, ArtifactKind::Table),
    (names::PER_IP_IPG_STATS, ArtifactKind::Table),
    (names::ENTROPY_REPORT, ArtifactKind::Text),
    (names::BYTES_PER_IP, ArtifactKind::Table),
    (names::PACKET_SIZE_FREQUENCY, ArtifactKind::Table),
    (names::SUSPICIOUS_PATTERNS, ArtifactKind::Text),
    (names::SOURCE_PROFILES, ArtifactKind::Table),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Table,
    Text,
    Image,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// A table cell. `Empty` marks an undefined statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Int(u64),
    Float(f64),
    Text(String),
    Empty,
}

impl From<Option<f64>> for Cell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Cell::Empty, Cell::Float)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Empty => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// An (x, y) series meant to be plotted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub x_label: String,
    pub y_label: String,
    pub points: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ArtifactData {
    Table(Table),
    Text(String),
    Image(Series),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub data: ArtifactData,
}

impl Artifact {
    fn table(name: &str, table: Table) -> Self {
        Self {
            name: name.to_string(),
            kind: ArtifactKind::Table,
            data: ArtifactData::Table(table),
        }
    }

    fn text(name: &str, text: String) -> Self {
        Self {
            name: name.to_string(),
            kind: ArtifactKind::Text,
            data: ArtifactData::Text(text),
        }
    }

    fn image(name: &str, series: Series) -> Self {
        Self {
            name: name.to_string(),
            kind: ArtifactKind::Image,
            data: ArtifactData::Image(series),
        }
    }
}

/// Name suffix for a window width: `10s`, `0.5s`.
pub fn width_label(width_secs: f64) -> String {
    format!("{}s", width_secs)
}

/// Builds every artifact of a report, in [`CATALOGUE`] order.
pub fn artifacts(report: &AnalysisReport) -> Vec<Artifact> {
    let mut out = vec![
        ipg_table(report),
        packets_per_minute(report),
        burstness_table(report),
    ];
    out.extend(window_images(report));
    out.push(cdf_image(report));
    out.push(Artifact::text(names::IPG_SHAPE, ipg_shape_text(report)));
    out.push(Artifact::text(names::PACKET_SIZE_SHAPE, size_shape_text(report)));
    out.push(ranked_table(
        names::SUSPICIOUS_IPS,
        "unique_dst_count",
        &report.horizontal_scan,
    ));
    out.push(ranked_table(names::TOP_SOURCES, "packet_count", &report.top_sources));
    out.push(per_ip_ipg(report));
    out.push(Artifact::text(names::ENTROPY_REPORT, entropy_text(report)));
    out.push(ranked_table(names::BYTES_PER_IP, "byte_total", &report.bytes_per_source));
    out.push(size_frequency(report));
    out.push(Artifact::text(names::SUSPICIOUS_PATTERNS, suspicious_text(report)));
    out.push(source_profiles(report));
    out
}

fn ipg_table(report: &AnalysisReport) -> Artifact {
    let mut table = Table::new(&["timestamp", "length", "src", "dst", "ipg"]);
    for (record, gap) in report.store.records().iter().zip(&report.global_ipg) {
        table.rows.push(vec![
            Cell::Float(record.timestamp),
            Cell::Int(u64::from(record.length)),
            Cell::Text(record.src.to_string()),
            Cell::Text(record.dst.to_string()),
            Cell::Float(*gap),
        ]);
    }
    Artifact::table(names::IPG, table)
}

fn packets_per_minute(report: &AnalysisReport) -> Artifact {
    let matrix = &report.bucket_matrix;
    let mut columns = vec!["time_bin".to_string()];
    columns.extend(matrix.sources().iter().map(|s| s.to_string()));

    let rows = matrix
        .dense_rows()
        .into_iter()
        .map(|(start, counts)| {
            std::iter::once(Cell::Float(start))
                .chain(counts.into_iter().map(Cell::Int))
                .collect()
        })
        .collect();

    Artifact::table(names::PACKETS_PER_MINUTE, Table { columns, rows })
}

fn burstness_table(report: &AnalysisReport) -> Artifact {
    let mut table = Table::new(&["src", "burstness"]);
    for (src, value) in &report.burstness {
        table
            .rows
            .push(vec![Cell::Text(src.to_string()), Cell::Float(*value)]);
    }
    Artifact::table(names::BURSTNESS, table)
}

fn window_images(report: &AnalysisReport) -> Vec<Artifact> {
    report
        .windows
        .iter()
        .enumerate()
        .map(|(i, counts)| {
            let name = if i == 0 {
                names::WINDOWED_PACKET_COUNTS.to_string()
            } else {
                format!("{}-{}", names::WINDOWED_PACKET_COUNTS, width_label(counts.width()))
            };
            let series = Series {
                x_label: "window_start".to_string(),
                y_label: format!("packets_per_{}", width_label(counts.width())),
                points: counts.iter().map(|(w, c)| (w.start(), c as f64)).collect(),
            };
            Artifact::image(&name, series)
        })
        .collect()
}

fn cdf_image(report: &AnalysisReport) -> Artifact {
    Artifact::image(
        names::PACKET_SIZE_CDF,
        Series {
            x_label: "packet_size".to_string(),
            y_label: "cdf".to_string(),
            points: report
                .size_cdf
                .iter()
                .map(|p| (f64::from(p.size), p.fraction))
                .collect(),
        },
    )
}

fn ipg_shape_text(report: &AnalysisReport) -> String {
    let skew = report.ipg_shape.map(|s| s.skewness);
    let kurt = report.ipg_shape.map(|s| s.excess_kurtosis);
    format!(
        "IPG skewness: {}\nIPG excess kurtosis: {}\n",
        Stat(skew),
        Stat(kurt)
    )
}

fn size_shape_text(report: &AnalysisReport) -> String {
    format!(
        "Mean packet length: {}\nPacket size skewness: {}\nPacket size excess kurtosis: {}\n",
        Stat(report.mean_length),
        Stat(report.size_shape.map(|s| s.skewness)),
        Stat(report.size_shape.map(|s| s.excess_kurtosis))
    )
}

fn ranked_table(name: &str, value_column: &str, ranked: &[RankedSource]) -> Artifact {
    let mut table = Table::new(&["src", value_column]);
    for entry in ranked {
        table
            .rows
            .push(vec![Cell::Text(entry.src.to_string()), Cell::Int(entry.value)]);
    }
    Artifact::table(name, table)
}

fn per_ip_ipg(report: &AnalysisReport) -> Artifact {
    let mut table = Table::new(&["src", "mean", "std"]);
    for stats in &report.per_source_ipg {
        table.rows.push(vec![
            Cell::Text(stats.src.to_string()),
            Cell::Float(stats.mean),
            Cell::Float(stats.std_dev),
        ]);
    }
    Artifact::table(names::PER_IP_IPG_STATS, table)
}

fn entropy_text(report: &AnalysisReport) -> String {
    format!(
        "Source entropy (bits): {}\nDistinct sources: {}\nMaximum entropy (bits): {}\n",
        Stat(report.entropy.entropy_bits),
        report.entropy.source_count,
        Stat(report.entropy.max_entropy_bits)
    )
}

fn size_frequency(report: &AnalysisReport) -> Artifact {
    let mut table = Table::new(&["src", "mean_length", "pps"]);
    for row in &report.size_frequency {
        table.rows.push(vec![
            Cell::Text(row.src.to_string()),
            Cell::Float(row.mean_length),
            Cell::from(row.pps),
        ]);
    }
    Artifact::table(names::PACKET_SIZE_FREQUENCY, table)
}

fn suspicious_text(report: &AnalysisReport) -> String {
    report
        .suspicious
        .iter()
        .map(|s| {
            format!(
                "{} -> Bursts: {}, Long gaps: {}\n",
                s.src, s.burst_count, s.long_gap_count
            )
        })
        .collect()
}

fn source_profiles(report: &AnalysisReport) -> Artifact {
    let mut table = Table::new(&[
        "src",
        "packet_count",
        "byte_total",
        "unique_dst_count",
        "mean_attributed_ipg",
        "std_attributed_ipg",
        "burst_count",
        "long_gap_count",
        "burstness",
    ]);
    for e in &report.entities {
        table.rows.push(vec![
            Cell::Text(e.src.to_string()),
            Cell::Int(e.packet_count),
            Cell::Int(e.byte_total),
            Cell::Int(e.unique_dst_count as u64),
            Cell::Float(e.mean_attributed_ipg),
            Cell::Float(e.std_attributed_ipg),
            Cell::Int(e.burst_count as u64),
            Cell::Int(e.long_gap_count as u64),
            Cell::Float(e.burstness),
        ]);
    }
    Artifact::table(names::SOURCE_PROFILES, table)
}
