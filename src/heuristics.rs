//! Burst and long-gap heuristics.
//!
//! Unlike [`crate::ipg`], each source is judged on its own timestamps only:
//! the gaps between consecutive packets of that source, regardless of what
//! other traffic sits in between.
//!
//! # Flagging
//! - burst: gap < `burst_threshold_secs` (default 0.01 s)
//! - long gap: gap > `gap_threshold_secs` (default 5 s)
//!
//! A source is suspicious when it has more than `burst_report_threshold`
//! bursts or more than `gap_report_threshold` long gaps. Only suspicious
//! sources are reported.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::record::PacketRecord;

/// Thresholds for the burst/gap detector.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Gaps strictly below this many seconds count as bursts
    pub burst_threshold_secs: f64,
    /// Gaps strictly above this many seconds count as long gaps
    pub gap_threshold_secs: f64,
    /// Flag a source with more bursts than this
    pub burst_report_threshold: usize,
    /// Flag a source with more long gaps than this
    pub gap_report_threshold: usize,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            burst_threshold_secs: 0.01,
            gap_threshold_secs: 5.0,
            burst_report_threshold: 10,
            gap_report_threshold: 3,
        }
    }
}

/// Burst and long-gap counts of one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GapCounts {
    pub burst_count: usize,
    pub long_gap_count: usize,
}

/// A source that crossed at least one report threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuspiciousSource {
    pub src: IpAddr,
    pub burst_count: usize,
    pub long_gap_count: usize,
}

/// Trait for per-source timing heuristics.
pub trait Detector: Send + Sync {
    /// Counts anomalous gaps in one source's sorted timestamps.
    fn count(&self, timestamps: &[f64]) -> GapCounts;

    /// Whether the counts warrant reporting the source.
    fn is_suspicious(&self, counts: &GapCounts) -> bool;
}

/// Threshold-based burst/long-gap detector.
#[derive(Debug, Clone, Default)]
pub struct BurstGapDetector {
    config: HeuristicsConfig,
}

impl BurstGapDetector {
    pub fn new(config: HeuristicsConfig) -> Self {
        Self { config }
    }
}

impl Detector for BurstGapDetector {
    fn count(&self, timestamps: &[f64]) -> GapCounts {
        timestamps
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold(GapCounts::default(), |mut counts, gap| {
                if gap < self.config.burst_threshold_secs {
                    counts.burst_count += 1;
                }
                if gap > self.config.gap_threshold_secs {
                    counts.long_gap_count += 1;
                }
                counts
            })
    }

    fn is_suspicious(&self, counts: &GapCounts) -> bool {
        counts.burst_count > self.config.burst_report_threshold
            || counts.long_gap_count > self.config.gap_report_threshold
    }
}

/// Each source's own timestamps, sorted, in first-seen order.
pub fn source_timestamps(records: &[PacketRecord]) -> Vec<(IpAddr, Vec<f64>)> {
    let mut order = Vec::new();
    let mut times: HashMap<IpAddr, Vec<f64>> = HashMap::new();

    for record in records {
        times
            .entry(record.src)
            .or_insert_with(|| {
                order.push(record.src);
                Vec::new()
            })
            .push(record.timestamp);
    }

    order
        .into_iter()
        .map(|src| {
            let mut ts = times.remove(&src).unwrap_or_default();
            ts.sort_by(f64::total_cmp);
            (src, ts)
        })
        .collect()
}

/// Gap counts for every source, in first-seen order.
pub fn gap_counts(records: &[PacketRecord], detector: &dyn Detector) -> Vec<(IpAddr, GapCounts)> {
    source_timestamps(records)
        .into_iter()
        .map(|(src, ts)| (src, detector.count(&ts)))
        .collect()
}

/// Sources whose counts `detector` flags; unflagged sources are omitted.
pub fn suspicious_sources(counts: &[(IpAddr, GapCounts)], detector: &dyn Detector) -> Vec<SuspiciousSource> {
    let flagged: Vec<SuspiciousSource> = counts
        .iter()
        .filter(|(_, counts)| detector.is_suspicious(counts))
        .map(|&(src, counts)| {
            trace!(
                "Flagged {}: {} bursts, {} long gaps",
                src,
                counts.burst_count,
                counts.long_gap_count
            );
            SuspiciousSource {
                src,
                burst_count: counts.burst_count,
                long_gap_count: counts.long_gap_count,
            }
        })
        .collect();

    debug!("Burst/gap heuristics flagged {} sources", flagged.len());
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{ip, rec};

    fn flag(records: &[PacketRecord], detector: &dyn Detector) -> Vec<SuspiciousSource> {
        suspicious_sources(&gap_counts(records, detector), detector)
    }

    fn burst_train(src: &str, n: usize, start: f64) -> Vec<PacketRecord> {
        (0..n)
            .map(|i| rec(start + i as f64 * 0.001, 60, src, "10.0.0.9"))
            .collect()
    }

    #[test]
    fn test_twelve_burst_packets_are_flagged() {
        let detector = BurstGapDetector::default();
        let records = burst_train("10.0.0.1", 12, 100.0);

        let flagged = flag(&records, &detector);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].src, ip("10.0.0.1"));
        assert_eq!(flagged[0].burst_count, 11);
        assert_eq!(flagged[0].long_gap_count, 0);
    }

    #[test]
    fn test_eleven_burst_packets_are_not_flagged() {
        let detector = BurstGapDetector::default();
        let records = burst_train("10.0.0.1", 11, 100.0);

        let counts = gap_counts(&records, &detector);
        assert_eq!(counts[0].1.burst_count, 10);
        assert!(
            flag(&records, &detector).is_empty(),
            "exactly 10 bursts must not be flagged"
        );
    }

    #[test]
    fn test_long_gaps_threshold() {
        let detector = BurstGapDetector::default();

        // Four gaps of 6s -> flagged; three -> not.
        let four: Vec<PacketRecord> = (0..5).map(|i| rec(i as f64 * 6.0, 60, "10.0.0.1", "10.0.0.9")).collect();
        let three: Vec<PacketRecord> = (0..4).map(|i| rec(i as f64 * 6.0, 60, "10.0.0.2", "10.0.0.9")).collect();

        let flagged = flag(&four, &detector);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].long_gap_count, 4);
        assert!(flag(&three, &detector).is_empty());
    }

    #[test]
    fn test_gap_of_exactly_five_seconds_is_not_long() {
        let detector = BurstGapDetector::default();
        let counts = detector.count(&[0.0, 5.0, 10.0]);
        assert_eq!(counts.long_gap_count, 0);
    }

    #[test]
    fn test_gaps_ignore_interleaving() {
        let detector = BurstGapDetector::default();
        let mut records = burst_train("10.0.0.1", 12, 100.0);
        // Another source's packets between every pair of .1 packets.
        records.extend((0..12).map(|i| rec(100.0005 + i as f64 * 0.001, 60, "10.0.0.2", "10.0.0.9")));
        let store = crate::record::RecordStore::new(records);

        let flagged = flag(store.records(), &detector);
        let sources: Vec<IpAddr> = flagged.iter().map(|s| s.src).collect();
        assert_eq!(sources, vec![ip("10.0.0.1"), ip("10.0.0.2")]);
        assert!(flagged.iter().all(|s| s.burst_count == 11));
    }

    #[test]
    fn test_custom_thresholds() {
        let detector = BurstGapDetector::new(HeuristicsConfig {
            burst_threshold_secs: 0.5,
            gap_threshold_secs: 100.0,
            burst_report_threshold: 1,
            gap_report_threshold: 0,
        });

        let counts = detector.count(&[0.0, 0.1, 0.2, 1.0]);
        assert_eq!(counts, GapCounts { burst_count: 2, long_gap_count: 0 });
        assert!(detector.is_suspicious(&counts));
    }

    #[test]
    fn test_single_packet_and_empty() {
        let detector = BurstGapDetector::default();
        assert_eq!(detector.count(&[1.0]), GapCounts::default());
        assert!(flag(&[], &detector).is_empty());
    }
}
