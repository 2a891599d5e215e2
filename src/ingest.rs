//! PCAP Ingestion Module
//!
//! Reads capture files into [`PacketRecord`]s. Frames that do not carry an
//! IP packet are skipped here, so the analysis stages only ever see
//! complete records. Each file is an independent shard: it is read, sorted
//! and summarized on its own worker, and the shards are then merged into one
//! globally sorted [`RecordStore`] plus one merged [`ShardSummary`].

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use etherparse::{NetSlice, SlicedPacket};
use pcap::{Capture, Linktype};
use tracing::{debug, info, trace, warn};

use crate::aggregator::ShardSummary;
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::record::{PacketRecord, RecordStore};

/// Statistics from reading capture files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestStats {
    pub packets_read: usize,
    pub records: usize,
    pub packets_skipped: usize,
}

impl IngestStats {
    fn merge(&mut self, other: &IngestStats) {
        self.packets_read += other.packets_read;
        self.records += other.records;
        self.packets_skipped += other.packets_skipped;
    }
}

/// Link layer framing of a capture file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ethernet,
    /// Bare IPv4/IPv6 packets without a link header.
    RawIp,
    /// Linux cooked capture (`tcpdump -i any`).
    LinuxSll,
}

impl LinkLayer {
    /// Framing for a pcap link type, `None` if it cannot carry IP here.
    pub fn from_linktype(linktype: Linktype) -> Option<Self> {
        match linktype {
            Linktype::ETHERNET => Some(Self::Ethernet),
            Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => Some(Self::RawIp),
            Linktype::LINUX_SLL => Some(Self::LinuxSll),
            _ => None,
        }
    }
}

/// One capture file after reading: sorted records and their partial state.
#[derive(Debug, Clone)]
pub struct Shard {
    pub records: Vec<PacketRecord>,
    pub summary: ShardSummary,
    pub stats: IngestStats,
}

/// Output of [`ingest`].
#[derive(Debug, Clone)]
pub struct Ingested {
    pub store: RecordStore,
    /// Per-shard summaries merged in shard order; covers every record.
    pub summary: ShardSummary,
    pub stats: IngestStats,
}

/// Expands inputs into capture files.
///
/// Files are taken as given; directories contribute their files with the
/// configured extension, in name order.
pub fn collect_capture_files(inputs: &[PathBuf], extension: &str) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let entries = std::fs::read_dir(input).map_err(|source| IngestError::DirectoryRead {
                path: input.clone(),
                source,
            })?;

            let mut found: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file() && has_extension(path, extension))
                .collect();
            found.sort();
            debug!("Found {} capture files in {}", found.len(), input.display());
            files.extend(found);
        } else {
            return Err(IngestError::NotFound(input.clone()));
        }
    }

    if files.is_empty() {
        return Err(IngestError::NoCaptureFiles {
            extension: extension.to_string(),
        });
    }
    Ok(files)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

/// Reads every packet of one capture file.
///
/// Fails if the file cannot be opened or uses a link type without an IP
/// decoder, rather than skipping every packet.
pub fn read_capture(path: &Path, config: &IngestConfig) -> Result<(Vec<PacketRecord>, IngestStats), IngestError> {
    info!("Processing capture file: {}", path.display());

    let mut cap = Capture::from_file(path).map_err(|source| IngestError::CaptureOpen {
        path: path.to_path_buf(),
        source,
    })?;

    let linktype = cap.get_datalink();
    let link = LinkLayer::from_linktype(linktype).ok_or_else(|| IngestError::UnsupportedLinkType {
        path: path.to_path_buf(),
        linktype: linktype.0,
    })?;
    debug!("{}: link layer {:?}", path.display(), link);

    let mut records = Vec::new();
    let mut stats = IngestStats::default();

    loop {
        let packet = match cap.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                warn!("Stopping read of {} after error: {}", path.display(), e);
                break;
            }
        };
        stats.packets_read += 1;

        let timestamp = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1_000_000.0;

        match parse_frame(packet.data, link, timestamp, packet.header.len, config.include_ipv6) {
            Some(record) => records.push(record),
            None => stats.packets_skipped += 1,
        }
    }

    stats.records = records.len();
    debug!(
        "{}: {} packets read, {} records, {} skipped",
        path.display(),
        stats.packets_read,
        stats.records,
        stats.packets_skipped
    );

    Ok((records, stats))
}

/// Extracts a record from a captured frame, `None` for non-IP frames.
pub fn parse_frame(
    data: &[u8],
    link: LinkLayer,
    timestamp: f64,
    wire_len: u32,
    include_ipv6: bool,
) -> Option<PacketRecord> {
    let sliced = match link {
        LinkLayer::Ethernet => SlicedPacket::from_ethernet(data),
        LinkLayer::RawIp => SlicedPacket::from_ip(data),
        LinkLayer::LinuxSll => SlicedPacket::from_linux_sll(data),
    }
    .ok()?;

    let (src, dst) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            (IpAddr::from(header.source()), IpAddr::from(header.destination()))
        }
        Some(NetSlice::Ipv6(ipv6)) if include_ipv6 => {
            let header = ipv6.header();
            (IpAddr::from(header.source()), IpAddr::from(header.destination()))
        }
        _ => return None,
    };

    trace!("Record: {} -> {} ({} bytes)", src, dst, wire_len);
    Some(PacketRecord::new(timestamp, wire_len, src, dst))
}

/// Reads shard number `index`: its records in timestamp order and the
/// summary of those records.
pub fn read_shard(path: &Path, index: usize, config: &IngestConfig) -> Result<Shard, IngestError> {
    let (records, stats) = read_capture(path, config)?;
    let store = RecordStore::new(records);
    let summary = ShardSummary::from_shard(store.records(), index);

    Ok(Shard {
        records: store.into_records(),
        summary,
        stats,
    })
}

/// Folds shards, given in shard order, into one store and summary.
pub fn merge_shards(shards: Vec<Shard>) -> Ingested {
    let mut summary = ShardSummary::default();
    let mut stats = IngestStats::default();
    let mut records = Vec::with_capacity(shards.len());

    for shard in shards {
        summary.merge(&shard.summary);
        stats.merge(&shard.stats);
        records.push(shard.records);
    }

    Ingested {
        store: RecordStore::from_shards(records),
        summary,
        stats,
    }
}

/// Reads all capture files and merges them into one sorted store.
///
/// Any unreadable file aborts the whole ingestion.
pub async fn ingest(files: Vec<PathBuf>, config: &IngestConfig) -> Result<Ingested, IngestError> {
    let mut shards = Vec::with_capacity(files.len());

    if config.parallel && files.len() > 1 {
        let handles: Vec<_> = files
            .into_iter()
            .enumerate()
            .map(|(index, path)| {
                let config = config.clone();
                tokio::task::spawn_blocking(move || read_shard(&path, index, &config))
            })
            .collect();

        // Awaited in input order so shard order matches a sequential read.
        for handle in handles {
            let shard = handle
                .await
                .map_err(|e| IngestError::Worker(e.to_string()))??;
            shards.push(shard);
        }
    } else {
        for (index, path) in files.iter().enumerate() {
            shards.push(read_shard(path, index, config)?);
        }
    }

    let ingested = merge_shards(shards);
    info!(
        "Ingestion complete: {} packets read, {} records, {} skipped",
        ingested.stats.packets_read, ingested.stats.records, ingested.stats.packets_skipped
    );
    if ingested.stats.records == 0 && ingested.stats.packets_read > 0 {
        warn!(
            "None of the {} packets read carried a usable IP header",
            ingested.stats.packets_read
        );
    }

    Ok(ingested)
}
