//! Per-entity aggregation keyed by source address.
//!
//! Counts, byte totals and destination cardinality per source, the rankings
//! derived from them, and the per-minute count matrix behind the burstness
//! index.
//!
//! # Ordering
//! Sources are kept in first-seen order (position of their first record in
//! the sorted batch). Every ranking sorts by its value descending and breaks
//! ties by that order, so equal counts always rank the same way.
//!
//! # Shards
//! [`SourceAggregate`] is mergeable: aggregates built from independent
//! shards combine into the aggregate of their union. First-seen order across
//! shards is `(timestamp, shard, position)`, the same order
//! [`RecordStore::from_shards`](crate::record::RecordStore::from_shards)
//! produces, so merged rankings match whole-batch rankings.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::net::IpAddr;

use serde::Serialize;
use tracing::debug;

use crate::distribution::PowerSums;
use crate::error::AnalyzerError;
use crate::record::PacketRecord;
use crate::temporal::{is_valid_width, TimeWindow};

/// Added to the mean in the burstness denominator.
pub const BURSTNESS_EPSILON: f64 = 1e-6;

/// Running totals for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTally {
    pub packet_count: u64,
    pub byte_total: u64,
    pub destinations: HashSet<IpAddr>,
    /// Timestamp of the first record from this source.
    pub first_seen: f64,
    /// Shard that record was read from.
    pub first_shard: usize,
    /// Position of that record within its sorted shard.
    pub first_index: usize,
}

impl SourceTally {
    fn new(record: &PacketRecord, shard: usize, index: usize) -> Self {
        Self {
            packet_count: 0,
            byte_total: 0,
            destinations: HashSet::new(),
            first_seen: record.timestamp,
            first_shard: shard,
            first_index: index,
        }
    }

    fn add(&mut self, record: &PacketRecord) {
        self.packet_count += 1;
        self.byte_total += u64::from(record.length);
        self.destinations.insert(record.dst);
    }

    pub fn unique_dst_count(&self) -> usize {
        self.destinations.len()
    }

    pub fn mean_length(&self) -> f64 {
        if self.packet_count == 0 {
            return 0.0;
        }
        self.byte_total as f64 / self.packet_count as f64
    }

    /// Combines the totals of another shard's tally for the same source.
    pub fn merge(&mut self, other: &SourceTally) {
        self.packet_count += other.packet_count;
        self.byte_total += other.byte_total;
        self.destinations.extend(other.destinations.iter().copied());
        if other.arrives_before(self) {
            self.first_seen = other.first_seen;
            self.first_shard = other.first_shard;
            self.first_index = other.first_index;
        }
    }

    fn arrives_before(&self, other: &SourceTally) -> bool {
        self.arrival_cmp(other).is_lt()
    }

    fn arrival_cmp(&self, other: &SourceTally) -> Ordering {
        self.first_seen
            .total_cmp(&other.first_seen)
            .then(self.first_shard.cmp(&other.first_shard))
            .then(self.first_index.cmp(&other.first_index))
    }
}

/// A source with one ranked value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSource {
    pub src: IpAddr,
    pub value: u64,
}

/// Mean packet size and send rate of a source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SizeFrequency {
    pub src: IpAddr,
    pub mean_length: f64,
    /// Packets per second over the whole capture; `None` when the capture
    /// spans no time.
    pub pps: Option<f64>,
}

/// Per-source tallies of a batch.
#[derive(Debug, Clone, Default)]
pub struct SourceAggregate {
    order: Vec<IpAddr>,
    tallies: HashMap<IpAddr, SourceTally>,
    total_packets: u64,
}

impl SourceAggregate {
    /// Groups a sorted batch by source.
    pub fn from_records(records: &[PacketRecord]) -> Self {
        Self::from_shard(records, 0)
    }

    /// Groups the sorted records of shard number `shard` by source.
    pub fn from_shard(records: &[PacketRecord], shard: usize) -> Self {
        let mut aggregate = Self::default();

        for (index, record) in records.iter().enumerate() {
            let tally = aggregate.tallies.entry(record.src).or_insert_with(|| {
                aggregate.order.push(record.src);
                SourceTally::new(record, shard, index)
            });
            tally.add(record);
        }
        aggregate.total_packets = records.len() as u64;

        debug!(
            "Aggregated {} records into {} sources",
            aggregate.total_packets,
            aggregate.order.len()
        );
        aggregate
    }

    /// Folds another shard's aggregate into this one.
    pub fn merge(&mut self, other: &SourceAggregate) {
        for (src, tally) in &other.tallies {
            match self.tallies.get_mut(src) {
                Some(existing) => existing.merge(tally),
                None => {
                    self.tallies.insert(*src, tally.clone());
                    self.order.push(*src);
                }
            }
        }
        self.total_packets += other.total_packets;

        let tallies = &self.tallies;
        self.order
            .sort_by(|a, b| tallies[a].arrival_cmp(&tallies[b]));
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn total_packets(&self) -> u64 {
        self.total_packets
    }

    pub fn get(&self, src: &IpAddr) -> Option<&SourceTally> {
        self.tallies.get(src)
    }

    /// Sources with their tallies in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (IpAddr, &SourceTally)> + '_ {
        self.order.iter().map(move |src| (*src, &self.tallies[src]))
    }

    /// Packet counts in first-seen order, the input of the entropy estimate.
    pub fn packet_counts(&self) -> Vec<u64> {
        self.iter().map(|(_, t)| t.packet_count).collect()
    }

    /// Sources contacting strictly more than `threshold` distinct destinations,
    /// most destinations first.
    pub fn horizontal_scan(&self, threshold: usize) -> Vec<RankedSource> {
        let candidates = self
            .iter()
            .filter(|(_, t)| t.unique_dst_count() > threshold)
            .map(|(src, t)| RankedSource {
                src,
                value: t.unique_dst_count() as u64,
            })
            .collect();
        rank_descending(candidates)
    }

    /// The `n` sources with the most packets.
    pub fn top_n(&self, n: usize) -> Vec<RankedSource> {
        let mut ranked = rank_descending(
            self.iter()
                .map(|(src, t)| RankedSource {
                    src,
                    value: t.packet_count,
                })
                .collect(),
        );
        ranked.truncate(n);
        ranked
    }

    /// Every source by transmitted bytes, largest first.
    pub fn bytes_ranking(&self) -> Vec<RankedSource> {
        rank_descending(
            self.iter()
                .map(|(src, t)| RankedSource {
                    src,
                    value: t.byte_total,
                })
                .collect(),
        )
    }

    /// Mean size and rate per source for a capture lasting `duration_secs`.
    pub fn size_frequency(&self, duration_secs: Option<f64>) -> Vec<SizeFrequency> {
        let duration = duration_secs.filter(|d| *d > 0.0);

        self.iter()
            .map(|(src, t)| SizeFrequency {
                src,
                mean_length: t.mean_length(),
                pps: duration.map(|d| t.packet_count as f64 / d),
            })
            .collect()
    }
}

/// Sorts by value descending. The input is in first-seen order and the sort
/// is stable, so ties keep that order.
fn rank_descending(mut sources: Vec<RankedSource>) -> Vec<RankedSource> {
    sources.sort_by(|a, b| b.value.cmp(&a.value));
    sources
}

/// Mergeable partial state of one shard: per-source tallies and the power
/// sums of its packet lengths.
#[derive(Debug, Clone, Default)]
pub struct ShardSummary {
    pub aggregate: SourceAggregate,
    pub lengths: PowerSums,
}

impl ShardSummary {
    /// Summarizes the sorted records of shard number `shard`.
    pub fn from_shard(records: &[PacketRecord], shard: usize) -> Self {
        Self {
            aggregate: SourceAggregate::from_shard(records, shard),
            lengths: records.iter().map(|r| f64::from(r.length)).collect(),
        }
    }

    pub fn merge(&mut self, other: &ShardSummary) {
        self.aggregate.merge(&other.aggregate);
        self.lengths.merge(&other.lengths);
    }

    pub fn record_count(&self) -> u64 {
        self.aggregate.total_packets()
    }
}

/// Packet counts per (time bucket, source).
///
/// Stored sparsely; [`BucketMatrix::row`] zero-fills a source's counts over
/// every bucket in which any packet was observed.
#[derive(Debug, Clone)]
pub struct BucketMatrix {
    bucket_secs: f64,
    buckets: BTreeSet<i64>,
    sources: Vec<IpAddr>,
    counts: HashMap<IpAddr, BTreeMap<i64, u64>>,
}

impl BucketMatrix {
    pub fn from_records(records: &[PacketRecord], bucket_secs: f64) -> Result<Self, AnalyzerError> {
        if !is_valid_width(bucket_secs) {
            return Err(AnalyzerError::InvalidWindowWidth(bucket_secs));
        }

        let mut buckets = BTreeSet::new();
        let mut sources = Vec::new();
        let mut counts: HashMap<IpAddr, BTreeMap<i64, u64>> = HashMap::new();

        for record in records {
            let bucket = TimeWindow::containing(record.timestamp, bucket_secs).index;
            buckets.insert(bucket);
            let row = counts.entry(record.src).or_insert_with(|| {
                sources.push(record.src);
                BTreeMap::new()
            });
            *row.entry(bucket).or_insert(0) += 1;
        }

        Ok(Self {
            bucket_secs,
            buckets,
            sources,
            counts,
        })
    }

    /// Column order of the dense matrix (first-seen).
    pub fn sources(&self) -> &[IpAddr] {
        &self.sources
    }

    /// Start time of every observed bucket, ascending.
    pub fn bucket_starts(&self) -> Vec<f64> {
        self.buckets
            .iter()
            .map(|&index| index as f64 * self.bucket_secs)
            .collect()
    }

    /// Zero-filled counts of `src` over every observed bucket.
    pub fn row(&self, src: &IpAddr) -> Vec<u64> {
        let sparse = self.counts.get(src);
        self.buckets
            .iter()
            .map(|b| sparse.and_then(|row| row.get(b)).copied().unwrap_or(0))
            .collect()
    }

    /// Dense matrix rows: one per bucket, one column per source.
    pub fn dense_rows(&self) -> Vec<(f64, Vec<u64>)> {
        let columns: Vec<Vec<u64>> = self.sources.iter().map(|s| self.row(s)).collect();

        self.bucket_starts()
            .into_iter()
            .enumerate()
            .map(|(i, start)| (start, columns.iter().map(|col| col[i]).collect()))
            .collect()
    }

    /// Peak-to-mean ratio of every source's bucket counts, first-seen order.
    pub fn burstness_all(&self) -> Vec<(IpAddr, f64)> {
        self.sources
            .iter()
            .map(|src| (*src, burstness_index(&self.row(src))))
            .collect()
    }
}

/// `max(counts) / (mean(counts) + ε)`; 0 for an empty row.
pub fn burstness_index(counts: &[u64]) -> f64 {
    if counts.is_empty() {
        return 0.0;
    }
    let max = counts.iter().copied().max().unwrap_or(0) as f64;
    let mean = counts.iter().sum::<u64>() as f64 / counts.len() as f64;
    max / (mean + BURSTNESS_EPSILON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::{ip, rec};

    fn scan_records(src: &str, destinations: usize) -> Vec<PacketRecord> {
        (0..destinations)
            .map(|i| {
                let dst = format!("192.168.{}.{}", i / 250, i % 250 + 1);
                rec(i as f64 * 0.1, 60, src, &dst)
            })
            .collect()
    }

    #[test]
    fn test_counts_bytes_and_destinations() {
        let records = vec![
            rec(1.0, 100, "10.0.0.1", "10.0.0.9"),
            rec(2.0, 200, "10.0.0.1", "10.0.0.8"),
            rec(3.0, 300, "10.0.0.1", "10.0.0.9"),
            rec(4.0, 50, "10.0.0.2", "10.0.0.9"),
        ];

        let aggregate = SourceAggregate::from_records(&records);
        let tally = aggregate.get(&ip("10.0.0.1")).unwrap();

        assert_eq!(tally.packet_count, 3);
        assert_eq!(tally.byte_total, 600);
        assert_eq!(tally.unique_dst_count(), 2);
        assert_eq!(tally.mean_length(), 200.0);
        assert_eq!(aggregate.len(), 2);
        assert_eq!(aggregate.total_packets(), 4);
    }

    #[test]
    fn test_horizontal_scan_strict_threshold() {
        let mut records = scan_records("10.0.0.51", 51);
        records.extend(scan_records("10.0.0.50", 50));
        let records = crate::record::RecordStore::new(records);

        let aggregate = SourceAggregate::from_records(records.records());
        let scanners = aggregate.horizontal_scan(50);

        assert_eq!(scanners.len(), 1, "exactly 50 destinations must not be flagged");
        assert_eq!(scanners[0].src, ip("10.0.0.51"));
        assert_eq!(scanners[0].value, 51);
    }

    #[test]
    fn test_horizontal_scan_ranked_by_destinations() {
        let mut records = scan_records("10.0.0.1", 3);
        records.extend(scan_records("10.0.0.2", 5));
        let store = crate::record::RecordStore::new(records);

        let scanners = SourceAggregate::from_records(store.records()).horizontal_scan(1);
        let order: Vec<IpAddr> = scanners.iter().map(|s| s.src).collect();
        assert_eq!(order, vec![ip("10.0.0.2"), ip("10.0.0.1")]);
    }

    #[test]
    fn test_top_n_tie_break_first_seen() {
        let records = vec![
            rec(1.0, 60, "10.0.0.3", "10.0.0.9"),
            rec(2.0, 60, "10.0.0.1", "10.0.0.9"),
            rec(3.0, 60, "10.0.0.2", "10.0.0.9"),
            rec(4.0, 60, "10.0.0.2", "10.0.0.9"),
            rec(5.0, 60, "10.0.0.1", "10.0.0.9"),
            rec(6.0, 60, "10.0.0.3", "10.0.0.9"),
            rec(7.0, 60, "10.0.0.4", "10.0.0.9"),
        ];

        let aggregate = SourceAggregate::from_records(&records);
        let top = aggregate.top_n(3);
        let order: Vec<IpAddr> = top.iter().map(|s| s.src).collect();

        // .3, .1 and .2 all sent two packets; first-seen order decides.
        assert_eq!(order, vec![ip("10.0.0.3"), ip("10.0.0.1"), ip("10.0.0.2")]);

        // Ranking is stable across repeated runs.
        for _ in 0..10 {
            assert_eq!(SourceAggregate::from_records(&records).top_n(3), top);
        }
    }

    #[test]
    fn test_top_n_larger_than_sources() {
        let records = vec![rec(1.0, 60, "10.0.0.1", "10.0.0.9")];
        assert_eq!(SourceAggregate::from_records(&records).top_n(10).len(), 1);
    }

    #[test]
    fn test_bytes_ranking() {
        let records = vec![
            rec(1.0, 100, "10.0.0.1", "10.0.0.9"),
            rec(2.0, 900, "10.0.0.2", "10.0.0.9"),
            rec(3.0, 100, "10.0.0.3", "10.0.0.9"),
        ];

        let ranking = SourceAggregate::from_records(&records).bytes_ranking();
        let order: Vec<(IpAddr, u64)> = ranking.iter().map(|s| (s.src, s.value)).collect();
        assert_eq!(
            order,
            vec![(ip("10.0.0.2"), 900), (ip("10.0.0.1"), 100), (ip("10.0.0.3"), 100)]
        );
    }

    #[test]
    fn test_size_frequency_guards_zero_duration() {
        let records = vec![
            rec(1.0, 100, "10.0.0.1", "10.0.0.9"),
            rec(1.0, 300, "10.0.0.1", "10.0.0.9"),
        ];
        let aggregate = SourceAggregate::from_records(&records);

        let rows = aggregate.size_frequency(Some(0.0));
        assert_eq!(rows[0].mean_length, 200.0);
        assert_eq!(rows[0].pps, None);

        let rows = aggregate.size_frequency(Some(4.0));
        assert_eq!(rows[0].pps, Some(0.5));
    }

    #[test]
    fn test_merge_matches_whole_batch() {
        let records = vec![
            rec(1.0, 100, "10.0.0.1", "10.0.0.9"),
            rec(2.0, 200, "10.0.0.2", "10.0.0.8"),
            rec(3.0, 300, "10.0.0.1", "10.0.0.7"),
            rec(4.0, 400, "10.0.0.3", "10.0.0.9"),
            rec(5.0, 500, "10.0.0.2", "10.0.0.9"),
        ];
        let whole = SourceAggregate::from_records(&records);

        let mut merged = SourceAggregate::from_shard(&records[3..], 1);
        merged.merge(&SourceAggregate::from_shard(&records[..3], 0));

        assert_eq!(merged.total_packets(), whole.total_packets());
        let whole_rows: Vec<(IpAddr, u64, u64, usize)> = whole
            .iter()
            .map(|(s, t)| (s, t.packet_count, t.byte_total, t.unique_dst_count()))
            .collect();
        let merged_rows: Vec<(IpAddr, u64, u64, usize)> = merged
            .iter()
            .map(|(s, t)| (s, t.packet_count, t.byte_total, t.unique_dst_count()))
            .collect();
        assert_eq!(merged_rows, whole_rows);
    }

    fn first_seen_order(aggregate: &SourceAggregate) -> Vec<IpAddr> {
        aggregate.iter().map(|(src, _)| src).collect()
    }

    #[test]
    fn test_merge_equal_timestamps_follow_shard_order() {
        let shard_a = vec![rec(1.0, 60, "10.0.0.1", "10.0.0.9"), rec(1.0, 60, "10.0.0.2", "10.0.0.9")];
        let shard_b = vec![rec(1.0, 60, "10.0.0.3", "10.0.0.9")];

        let store = crate::record::RecordStore::from_shards(vec![shard_a.clone(), shard_b.clone()]);
        let whole = SourceAggregate::from_records(store.records());
        assert_eq!(
            first_seen_order(&whole),
            vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3")]
        );

        let mut forward = SourceAggregate::from_shard(&shard_a, 0);
        forward.merge(&SourceAggregate::from_shard(&shard_b, 1));
        assert_eq!(first_seen_order(&forward), first_seen_order(&whole));

        let mut backward = SourceAggregate::from_shard(&shard_b, 1);
        backward.merge(&SourceAggregate::from_shard(&shard_a, 0));
        assert_eq!(
            first_seen_order(&backward),
            first_seen_order(&whole),
            "merge order must not change first-seen order"
        );
    }

    #[test]
    fn test_merge_keeps_tie_break_in_rankings() {
        let shard_a = vec![rec(1.0, 60, "10.0.0.1", "10.0.0.9"), rec(1.0, 60, "10.0.0.2", "10.0.0.9")];
        let shard_b = vec![rec(1.0, 60, "10.0.0.3", "10.0.0.9")];

        let mut merged = SourceAggregate::from_shard(&shard_b, 1);
        merged.merge(&SourceAggregate::from_shard(&shard_a, 0));

        let top: Vec<IpAddr> = merged.top_n(3).iter().map(|s| s.src).collect();
        assert_eq!(top, vec![ip("10.0.0.1"), ip("10.0.0.2"), ip("10.0.0.3")]);
    }

    #[test]
    fn test_shard_summary_merge() {
        let shard_a = vec![rec(1.0, 100, "10.0.0.1", "10.0.0.9"), rec(2.0, 300, "10.0.0.2", "10.0.0.9")];
        let shard_b = vec![rec(1.5, 200, "10.0.0.1", "10.0.0.8")];

        let mut summary = ShardSummary::from_shard(&shard_a, 0);
        summary.merge(&ShardSummary::from_shard(&shard_b, 1));

        assert_eq!(summary.record_count(), 3);
        assert_eq!(summary.lengths.mean(), Some(200.0));
        let tally = summary.aggregate.get(&ip("10.0.0.1")).unwrap();
        assert_eq!(tally.packet_count, 2);
        assert_eq!(tally.unique_dst_count(), 2);
    }

    #[test]
    fn test_bucket_matrix_zero_fills() {
        let records = vec![
            rec(0.0, 60, "10.0.0.1", "10.0.0.9"),
            rec(10.0, 60, "10.0.0.1", "10.0.0.9"),
            rec(65.0, 60, "10.0.0.2", "10.0.0.9"),
            rec(200.0, 60, "10.0.0.1", "10.0.0.9"),
        ];

        let matrix = BucketMatrix::from_records(&records, 60.0).unwrap();

        assert_eq!(matrix.bucket_starts(), vec![0.0, 60.0, 180.0]);
        assert_eq!(matrix.row(&ip("10.0.0.1")), vec![2, 0, 1]);
        assert_eq!(matrix.row(&ip("10.0.0.2")), vec![0, 1, 0]);

        let dense = matrix.dense_rows();
        assert_eq!(dense.len(), 3);
        assert!(
            dense.iter().all(|(_, row)| row.len() == 2),
            "every source needs an entry in every bucket"
        );
        assert_eq!(dense[0], (0.0, vec![2, 0]));
    }

    #[test]
    fn test_burstness_constant_rate() {
        let records: Vec<PacketRecord> = (0..5)
            .flat_map(|minute| {
                (0..4).map(move |i| rec(minute as f64 * 60.0 + i as f64, 60, "10.0.0.1", "10.0.0.9"))
            })
            .collect();

        let matrix = BucketMatrix::from_records(&records, 60.0).unwrap();
        let burstness = matrix.burstness_all()[0].1;

        assert!(
            (burstness - 1.0).abs() < 1e-6,
            "constant rate should give burstness 1, got {}",
            burstness
        );
    }

    #[test]
    fn test_burstness_spike() {
        assert!((burstness_index(&[1, 1, 1, 9]) - 3.0).abs() < 1e-5);
        assert_eq!(burstness_index(&[]), 0.0);
        assert_eq!(burstness_index(&[0, 0]), 0.0);
    }

    #[test]
    fn test_bucket_matrix_empty() {
        let matrix = BucketMatrix::from_records(&[], 60.0).unwrap();
        assert!(matrix.row(&ip("10.0.0.1")).is_empty());
        assert!(matrix.burstness_all().is_empty());
        assert!(matrix.dense_rows().is_empty());
    }
}
