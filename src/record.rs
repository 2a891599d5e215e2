//! Packet records and the ordered record store.
//!
//! Every derived statistic assumes the records are globally sorted by
//! timestamp, with ties kept in arrival order. [`RecordStore`] is the only
//! way to hand records to the analysis stages, so that order is established
//! exactly once per batch.

use std::net::IpAddr;

use serde::Serialize;
use tracing::debug;

/// Metadata of a single captured IP packet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PacketRecord {
    /// Capture time in seconds since the Unix epoch.
    pub timestamp: f64,
    /// On-wire frame length in bytes.
    pub length: u32,
    pub src: IpAddr,
    pub dst: IpAddr,
}

impl PacketRecord {
    pub fn new(timestamp: f64, length: u32, src: IpAddr, dst: IpAddr) -> Self {
        Self {
            timestamp,
            length,
            src,
            dst,
        }
    }
}

/// Immutable, timestamp-sorted collection of packet records.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: Vec<PacketRecord>,
}

impl RecordStore {
    /// Builds a store from records in arrival order.
    pub fn new(mut records: Vec<PacketRecord>) -> Self {
        // Stable sort: equal timestamps keep their arrival order.
        records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        debug!("Record store sorted: {} records", records.len());
        Self { records }
    }

    /// Merges independently ingested shards into one globally sorted store.
    ///
    /// Arrival order across shards is shard order, then position within the
    /// shard, so ties are resolved the same way a sequential read would.
    pub fn from_shards(shards: Vec<Vec<PacketRecord>>) -> Self {
        let shard_count = shards.len();
        let records: Vec<PacketRecord> = shards.into_iter().flatten().collect();
        debug!("Merging {} shards", shard_count);
        Self::new(records)
    }

    pub fn records(&self) -> &[PacketRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<PacketRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Time between the first and last record, `None` for an empty store.
    pub fn duration_secs(&self) -> Option<f64> {
        let first = self.records.first()?;
        let last = self.records.last()?;
        Some(last.timestamp - first.timestamp)
    }
}

impl From<Vec<PacketRecord>> for RecordStore {
    fn from(records: Vec<PacketRecord>) -> Self {
        Self::new(records)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Shorthand used by the tests of every analysis module.
    pub(crate) fn rec(timestamp: f64, length: u32, src: &str, dst: &str) -> PacketRecord {
        PacketRecord::new(timestamp, length, src.parse().unwrap(), dst.parse().unwrap())
    }

    pub(crate) fn ip(addr: &str) -> IpAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn test_store_sorts_by_timestamp() {
        let store = RecordStore::new(vec![
            rec(3.0, 60, "10.0.0.1", "10.0.0.9"),
            rec(1.0, 60, "10.0.0.2", "10.0.0.9"),
            rec(2.0, 60, "10.0.0.3", "10.0.0.9"),
        ]);

        let times: Vec<f64> = store.records().iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_store_ties_keep_arrival_order() {
        let store = RecordStore::new(vec![
            rec(5.0, 100, "10.0.0.1", "10.0.0.9"),
            rec(1.0, 100, "10.0.0.9", "10.0.0.1"),
            rec(5.0, 200, "10.0.0.2", "10.0.0.9"),
            rec(5.0, 300, "10.0.0.3", "10.0.0.9"),
        ]);

        let lengths: Vec<u32> = store.records().iter().map(|r| r.length).collect();
        assert_eq!(lengths, vec![100, 100, 200, 300]);
        assert_eq!(store.records()[1].src, ip("10.0.0.1"));
    }

    #[test]
    fn test_from_shards_merges_globally() {
        let store = RecordStore::from_shards(vec![
            vec![rec(1.0, 1, "10.0.0.1", "10.0.0.9"), rec(4.0, 4, "10.0.0.1", "10.0.0.9")],
            vec![rec(2.0, 2, "10.0.0.2", "10.0.0.9"), rec(4.0, 5, "10.0.0.2", "10.0.0.9")],
        ]);

        let lengths: Vec<u32> = store.records().iter().map(|r| r.length).collect();
        assert_eq!(lengths, vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_empty_store() {
        let store = RecordStore::default();
        assert!(store.is_empty());
        assert_eq!(store.duration_secs(), None);
    }
}
