//! Per-source inter-packet gap statistics.
//!
//! A global gap `t[i] - t[i-1]` is attributed to the source of record `i`
//! only when record `i-1` has the same source. Gaps that follow another
//! source's packet are dropped from the series, not counted as zero, so
//! these statistics depend on how a source's traffic interleaves with the
//! rest of the capture.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;
use statrs::statistics::{Data, Distribution};

use crate::record::PacketRecord;

/// Mean and standard deviation of one source's attributed gaps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceIpgStats {
    pub src: IpAddr,
    pub mean: f64,
    /// Sample standard deviation (n - 1).
    pub std_dev: f64,
    pub gap_count: usize,
}

/// Attributed gap series of every source, in first-seen order.
///
/// Sources whose packets never directly follow one of their own still
/// appear, with an empty series.
pub fn attributed_gaps(records: &[PacketRecord]) -> Vec<(IpAddr, Vec<f64>)> {
    let mut order = Vec::new();
    let mut series: HashMap<IpAddr, Vec<f64>> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        let gaps = series.entry(record.src).or_insert_with(|| {
            order.push(record.src);
            Vec::new()
        });
        if i > 0 && records[i - 1].src == record.src {
            gaps.push(record.timestamp - records[i - 1].timestamp);
        }
    }

    order
        .into_iter()
        .map(|src| {
            let gaps = series.remove(&src).unwrap_or_default();
            (src, gaps)
        })
        .collect()
}

/// Mean/std per source over the attributed gap series.
///
/// An empty series reports mean 0 and std 0; a single gap has std 0.
pub fn per_source_ipg(records: &[PacketRecord]) -> Vec<SourceIpgStats> {
    attributed_gaps(records)
        .into_iter()
        .map(|(src, gaps)| {
            let (mean, std_dev) = mean_std(&gaps);
            SourceIpgStats {
                src,
                mean,
                std_dev,
                gap_count: gaps.len(),
            }
        })
        .collect()
}

fn mean_std(gaps: &[f64]) -> (f64, f64) {
    if gaps.is_empty() {
        return (0.0, 0.0);
    }

    let data = Data::new(gaps.to_vec());
    let mean = data.mean().unwrap_or(0.0);
    let std_dev = if gaps.len() < 2 {
        0.0
    } else {
        data.std_dev().filter(|s| s.is_finite()).unwrap_or(0.0)
    };

    (mean, std_dev)
}
