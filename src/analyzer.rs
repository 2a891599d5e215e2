//! Batch analysis pipeline.
//!
//! Takes a sorted [`RecordStore`] and runs every feature stage over it,
//! producing one immutable [`AnalysisReport`]. Stages only read the records
//! and their own inputs; nothing computed here is mutated afterwards, and
//! re-running the analyzer recomputes everything from the records.
//!
//! ```text
//! RecordStore ─┬─> temporal      (global IPG, windows, size CDF)
//!              ├─> aggregator    (tallies, rankings, bucket matrix)
//!              ├─> ipg           (attributed per-source gaps)
//!              ├─> distribution  (IPG shape, source entropy)
//!              └─> heuristics    (bursts, long gaps)
//!                        │
//!                        v
//!                 AnalysisReport ──> report::artifacts ──> export sink
//! ```

use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator::{BucketMatrix, RankedSource, ShardSummary, SizeFrequency};
use crate::config::AnalyzerConfig;
use crate::distribution::{skewness_kurtosis, EntropyReport, Shape};
use crate::error::AnalyzerError;
use crate::heuristics::{
    gap_counts, suspicious_sources, BurstGapDetector, Detector, HeuristicsConfig, SuspiciousSource,
};
use crate::ipg::{per_source_ipg, SourceIpgStats};
use crate::record::RecordStore;
use crate::temporal::{global_ipg, size_cdf, windowed_counts, CdfPoint, WindowedCounts};

/// Everything known about one source after analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStats {
    pub src: IpAddr,
    pub packet_count: u64,
    pub byte_total: u64,
    pub unique_dst_count: usize,
    pub mean_attributed_ipg: f64,
    pub std_attributed_ipg: f64,
    pub burst_count: usize,
    pub long_gap_count: usize,
    pub burstness: f64,
}

/// Analysis results of one batch.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub store: RecordStore,
    pub duration_secs: Option<f64>,
    pub global_ipg: Vec<f64>,
    /// Zero-filled window counts, one series per configured width.
    pub windows: Vec<WindowedCounts>,
    pub size_cdf: Vec<CdfPoint>,
    pub ipg_shape: Option<Shape>,
    /// Mean packet length, `None` without records.
    pub mean_length: Option<f64>,
    pub size_shape: Option<Shape>,
    pub entropy: EntropyReport,
    pub bucket_matrix: BucketMatrix,
    pub burstness: Vec<(IpAddr, f64)>,
    pub horizontal_scan: Vec<RankedSource>,
    pub top_sources: Vec<RankedSource>,
    pub bytes_per_source: Vec<RankedSource>,
    pub size_frequency: Vec<SizeFrequency>,
    pub per_source_ipg: Vec<SourceIpgStats>,
    pub suspicious: Vec<SuspiciousSource>,
    pub entities: Vec<EntityStats>,
}

impl AnalysisReport {
    pub fn record_count(&self) -> usize {
        self.store.len()
    }

    pub fn source_count(&self) -> usize {
        self.entities.len()
    }
}

/// Runs the feature stages with a fixed configuration.
pub struct TrafficAnalyzer {
    config: AnalyzerConfig,
    detector: Box<dyn Detector>,
}

impl TrafficAnalyzer {
    pub fn new(config: AnalyzerConfig, heuristics: HeuristicsConfig) -> Self {
        Self {
            config,
            detector: Box::new(BurstGapDetector::new(heuristics)),
        }
    }

    /// Uses a custom timing detector in place of the burst/gap thresholds.
    pub fn with_detector(config: AnalyzerConfig, detector: Box<dyn Detector>) -> Self {
        Self { config, detector }
    }

    /// Analyzes a batch. Fails only on invalid window parameters; an empty
    /// store produces a report whose statistics are empty or undefined.
    pub fn analyze(&self, store: RecordStore) -> Result<AnalysisReport, AnalyzerError> {
        let summary = ShardSummary::from_shard(store.records(), 0);
        self.analyze_with_summary(store, summary)
    }

    /// Analyzes a batch whose per-source state was already built shard by
    /// shard and merged. `summary` must cover exactly the records of `store`.
    pub fn analyze_with_summary(
        &self,
        store: RecordStore,
        summary: ShardSummary,
    ) -> Result<AnalysisReport, AnalyzerError> {
        if summary.record_count() != store.len() as u64 {
            return Err(AnalyzerError::SummaryMismatch {
                records: store.len(),
                summarized: summary.record_count(),
            });
        }

        let records = store.records();
        info!("Analyzing {} records", records.len());

        let global_ipg = global_ipg(records);
        let windows = self
            .config
            .window_widths_secs
            .iter()
            .map(|&width| windowed_counts(records, width).map(|counts| counts.dense()))
            .collect::<Result<Vec<_>, _>>()?;
        let size_cdf = size_cdf(records);
        debug!("Temporal features: {} windowed series", windows.len());

        let ShardSummary { aggregate, lengths } = summary;
        let bucket_matrix = BucketMatrix::from_records(records, self.config.matrix_bucket_secs)?;
        let burstness = bucket_matrix.burstness_all();
        let horizontal_scan = aggregate.horizontal_scan(self.config.scan_threshold);
        let top_sources = aggregate.top_n(self.config.top_n);
        let bytes_per_source = aggregate.bytes_ranking();
        let duration_secs = store.duration_secs();
        let size_frequency = aggregate.size_frequency(duration_secs);
        debug!(
            "Aggregated {} sources, {} horizontal scan candidates",
            aggregate.len(),
            horizontal_scan.len()
        );

        let per_source_ipg = per_source_ipg(records);

        let ipg_shape = skewness_kurtosis(&global_ipg);
        let mean_length = lengths.mean();
        let size_shape = lengths.shape();
        let entropy = EntropyReport::from_counts(&aggregate.packet_counts());

        let counts = gap_counts(records, self.detector.as_ref());
        let suspicious: Vec<SuspiciousSource> = suspicious_sources(&counts, self.detector.as_ref());

        let entities = {
            let ipg_by_src: HashMap<IpAddr, &SourceIpgStats> =
                per_source_ipg.iter().map(|s| (s.src, s)).collect();
            let gaps_by_src: HashMap<IpAddr, _> = counts.iter().copied().collect();
            let burst_by_src: HashMap<IpAddr, f64> = burstness.iter().copied().collect();

            aggregate
                .iter()
                .map(|(src, tally)| {
                    let ipg = ipg_by_src.get(&src);
                    let gaps = gaps_by_src.get(&src).copied().unwrap_or_default();
                    EntityStats {
                        src,
                        packet_count: tally.packet_count,
                        byte_total: tally.byte_total,
                        unique_dst_count: tally.unique_dst_count(),
                        mean_attributed_ipg: ipg.map_or(0.0, |s| s.mean),
                        std_attributed_ipg: ipg.map_or(0.0, |s| s.std_dev),
                        burst_count: gaps.burst_count,
                        long_gap_count: gaps.long_gap_count,
                        burstness: burst_by_src.get(&src).copied().unwrap_or(0.0),
                    }
                })
                .collect::<Vec<_>>()
        };

        info!(
            "Analysis complete: {} sources, {} scanning, {} with suspicious timing",
            entities.len(),
            horizontal_scan.len(),
            suspicious.len()
        );

        Ok(AnalysisReport {
            generated_at: Utc::now(),
            store,
            duration_secs,
            global_ipg,
            windows,
            size_cdf,
            ipg_shape,
            mean_length,
            size_shape,
            entropy,
            bucket_matrix,
            burstness,
            horizontal_scan,
            top_sources,
            bytes_per_source,
            size_frequency,
            per_source_ipg,
            suspicious,
            entities,
        })
    }
}

impl Default for TrafficAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default(), HeuristicsConfig::default())
    }
}
