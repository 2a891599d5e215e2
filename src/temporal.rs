//! Temporal feature engine.
//!
//! Global inter-packet gaps, fixed-width window counts and the empirical
//! packet size CDF. All functions take records already ordered by
//! [`RecordStore`](crate::record::RecordStore).
//!
//! # Window assignment
//! Timestamps and widths are rounded to whole microseconds (the resolution
//! of a pcap header) before bucketing. A packet at `t` belongs to window
//! `floor(t_us / width_us)`, whose start is `index * width`. Exact window
//! boundaries therefore land in the window they start, also for widths such
//! as 0.1 s that have no exact binary representation. Windows are keyed by
//! index so that ordering and equality never depend on float comparison.
//!
//! # CDF convention
//! The size CDF is the empirical left-edge CDF: after sorting lengths
//! ascending, point `i` carries fraction `i / N`. The first point is 0 and
//! the last is `(N - 1) / N`; the curve is never normalized to reach 1.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::AnalyzerError;
use crate::record::PacketRecord;

/// Gap to the previous record for every record; the first gap is 0.
pub fn global_ipg(records: &[PacketRecord]) -> Vec<f64> {
    if records.is_empty() {
        return Vec::new();
    }

    std::iter::once(0.0)
        .chain(
            records
                .windows(2)
                .map(|pair| pair[1].timestamp - pair[0].timestamp),
        )
        .collect()
}

/// A fixed-width time bucket `[start, start + width)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub index: i64,
    pub width: f64,
}

impl TimeWindow {
    /// The window containing `timestamp`.
    pub fn containing(timestamp: f64, width: f64) -> Self {
        let width_us = to_micros(width).max(1);
        Self {
            index: to_micros(timestamp).div_euclid(width_us),
            width,
        }
    }

    pub fn start(&self) -> f64 {
        self.index as f64 * self.width
    }

    pub fn end(&self) -> f64 {
        self.start() + self.width
    }
}

fn to_micros(secs: f64) -> i64 {
    (secs * 1_000_000.0).round() as i64
}

/// Whether `width_secs` is usable as a window width: finite and at least
/// one microsecond.
pub fn is_valid_width(width_secs: f64) -> bool {
    width_secs.is_finite() && to_micros(width_secs) >= 1
}

/// Packet counts per window, ordered by window start.
///
/// Windows without packets are absent unless the counts were produced by
/// [`WindowedCounts::dense`].
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedCounts {
    width: f64,
    counts: BTreeMap<i64, u64>,
}

impl WindowedCounts {
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Number of windows held (including zero-filled ones for dense counts).
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum over all windows; equals the number of records counted.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// `(window, count)` pairs in ascending window order.
    pub fn iter(&self) -> impl Iterator<Item = (TimeWindow, u64)> + '_ {
        let width = self.width;
        self.counts
            .iter()
            .map(move |(&index, &count)| (TimeWindow { index, width }, count))
    }

    /// Zero-fills every window between the first and last observed one.
    pub fn dense(&self) -> Self {
        let mut counts = BTreeMap::new();
        if let (Some((&first, _)), Some((&last, _))) =
            (self.counts.first_key_value(), self.counts.last_key_value())
        {
            for index in first..=last {
                counts.insert(index, self.counts.get(&index).copied().unwrap_or(0));
            }
        }

        Self {
            width: self.width,
            counts,
        }
    }
}

/// Partitions records into windows of `width_secs` and counts each window.
pub fn windowed_counts(
    records: &[PacketRecord],
    width_secs: f64,
) -> Result<WindowedCounts, AnalyzerError> {
    if !is_valid_width(width_secs) {
        return Err(AnalyzerError::InvalidWindowWidth(width_secs));
    }

    let mut counts = BTreeMap::new();
    for record in records {
        let window = TimeWindow::containing(record.timestamp, width_secs);
        *counts.entry(window.index).or_insert(0) += 1;
    }

    Ok(WindowedCounts {
        width: width_secs,
        counts,
    })
}

/// One point of the empirical size CDF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CdfPoint {
    pub size: u32,
    pub fraction: f64,
}

/// Empirical left-edge CDF of packet lengths (see module docs).
pub fn size_cdf(records: &[PacketRecord]) -> Vec<CdfPoint> {
    let mut sizes: Vec<u32> = records.iter().map(|r| r.length).collect();
    sizes.sort_unstable();

    let n = sizes.len() as f64;
    sizes
        .into_iter()
        .enumerate()
        .map(|(i, size)| CdfPoint {
            size,
            fraction: i as f64 / n,
        })
        .collect()
}
