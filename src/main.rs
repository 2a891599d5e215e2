//! pcap-metrics: offline traffic statistics from packet captures.
//!
//! Reads one or more pcap files, derives timing, volume and distribution
//! statistics per capture and per source, flags burst/gap and horizontal
//! scan indicators, and writes every result as a named artifact.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pcap_metrics::config::Config;
use pcap_metrics::export::{export_report, write_all, DirectorySink, OutputFormat};
use pcap_metrics::ingest::{collect_capture_files, ingest};
use pcap_metrics::report::{self, CATALOGUE};
use pcap_metrics::TrafficAnalyzer;

/// pcap-metrics: traffic-behaviour statistics and anomaly indicators.
#[derive(Parser, Debug)]
#[command(name = "pcap-metrics")]
#[command(version)]
#[command(about = "Derive traffic statistics and anomaly indicators from packet captures")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze capture files and write every artifact.
    Analyze(AnalyzeArgs),

    /// Print the default configuration file.
    GenerateConfig,

    /// List artifact names and kinds.
    Artifacts,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Capture files or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the artifacts.
    #[arg(short = 'd', long)]
    output_dir: Option<PathBuf>,

    /// Summary format: text, json, jsonl.
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Distinct destinations above which a source is a horizontal scan.
    #[arg(long)]
    scan_threshold: Option<usize>,

    /// Number of sources in the most-active ranking.
    #[arg(long)]
    top_n: Option<usize>,

    /// Gaps below this many seconds count as bursts.
    #[arg(long)]
    burst_threshold: Option<f64>,

    /// Gaps above this many seconds count as long gaps.
    #[arg(long)]
    gap_threshold: Option<f64>,

    /// Flag a source with more bursts than this.
    #[arg(long)]
    burst_report_threshold: Option<usize>,

    /// Flag a source with more long gaps than this.
    #[arg(long)]
    gap_report_threshold: Option<usize>,

    /// Keep IPv6 packets.
    #[arg(long)]
    ipv6: bool,

    /// Print the summary only, without writing artifacts.
    #[arg(long)]
    no_write: bool,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long)]
    verbose: bool,
}

impl AnalyzeArgs {
    /// Configuration file (or defaults) with command-line overrides applied.
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(dir) = &self.output_dir {
            config.output.directory = dir.display().to_string();
        }
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(threshold) = self.scan_threshold {
            config.analyzer.scan_threshold = threshold;
        }
        if let Some(n) = self.top_n {
            config.analyzer.top_n = n;
        }
        if let Some(secs) = self.burst_threshold {
            config.detection.burst_threshold_secs = secs;
        }
        if let Some(secs) = self.gap_threshold {
            config.detection.gap_threshold_secs = secs;
        }
        if let Some(count) = self.burst_report_threshold {
            config.detection.burst_report_threshold = count;
        }
        if let Some(count) = self.gap_report_threshold {
            config.detection.gap_report_threshold = count;
        }
        config.ingest.include_ipv6 |= self.ipv6;
        config.output.verbose |= self.verbose;

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze(args) => {
            let config = args.config()?;

            init_logging(config.output.verbose)?;
            config.validate()?;

            run_analysis(args.inputs, config, !args.no_write).await
        }

        Commands::GenerateConfig => {
            print!("{}", Config::generate_default());
            Ok(())
        }

        Commands::Artifacts => {
            println!("Artifacts:\n");
            for (name, kind) in CATALOGUE {
                println!("  {:<28} {}", name, kind);
            }
            println!(
                "  {:<28} image (one per additional window width)",
                "windowed-packet-counts-<w>"
            );
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) -> Result<()> {
    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn run_analysis(inputs: Vec<PathBuf>, config: Config, write_artifacts: bool) -> Result<()> {
    let files = collect_capture_files(&inputs, &config.ingest.extension)?;
    info!("Reading {} capture files", files.len());

    let ingested = ingest(files, &config.ingest)
        .await
        .context("Failed to ingest capture files")?;
    if ingested.stats.packets_skipped > 0 {
        info!(
            "Skipped {} of {} packets (non-IP{})",
            ingested.stats.packets_skipped,
            ingested.stats.packets_read,
            if config.ingest.include_ipv6 { "" } else { " or IPv6" }
        );
    }

    let analyzer = TrafficAnalyzer::new(config.analyzer.clone(), config.detection.clone());
    let analysis = analyzer.analyze_with_summary(ingested.store, ingested.summary)?;

    if write_artifacts {
        let artifacts = report::artifacts(&analysis);
        let mut sink = DirectorySink::create(&config.output.directory)?;
        write_all(&mut sink, &artifacts).context("Failed to write artifacts")?;
        info!(
            "{} artifacts written to {}",
            sink.written().len(),
            config.output.directory
        );
    }

    println!("{}", export_report(&analysis, config.output.format));
    Ok(())
}
