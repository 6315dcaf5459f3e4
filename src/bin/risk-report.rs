//! Runs the risk pipeline over a JSON-lines event file and prints the
//! ranked table plus the run diagnostics.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use access_sentry::{PipelineConfig, RawLogEvent, RiskPipeline};

#[derive(Parser, Debug)]
#[command(
    name = "risk-report",
    about = "Rank users by behavioral risk from an access-log window"
)]
struct Args {
    /// JSON-lines event file; reads stdin when omitted.
    input: Option<PathBuf>,

    /// Significance level for outlier bounds, in (0, 1).
    #[arg(long, default_value_t = 0.95)]
    alpha: f64,

    /// Weight of the anomaly component.
    #[arg(long, default_value_t = 0.4)]
    anomaly_weight: f64,

    /// Weight of the failure-rate component.
    #[arg(long, default_value_t = 0.3)]
    failure_weight: f64,

    /// Weight of the resource-diversity component.
    #[arg(long, default_value_t = 0.3)]
    resource_weight: f64,

    /// Minimum buckets per user before anomaly detection is attempted.
    #[arg(long, default_value_t = 4)]
    min_buckets: usize,

    /// Number of most-frequent resources kept per user baseline.
    #[arg(long, default_value_t = 5)]
    top_k: usize,

    /// UTC offset, in whole hours, for hour-of-day bucketing.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset: i8,

    /// Emit the report as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = PipelineConfig {
        alpha: args.alpha,
        anomaly_weight: args.anomaly_weight,
        failure_weight: args.failure_weight,
        resource_weight: args.resource_weight,
        min_buckets_for_detection: args.min_buckets,
        top_k_resources: args.top_k,
        utc_offset_hours: args.utc_offset,
    };
    let pipeline = RiskPipeline::new(config).context("invalid configuration")?;

    let reader: Box<dyn Read> = match &args.input {
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("cannot open {}", path.display()))?,
        ),
        None => Box::new(io::stdin()),
    };

    let mut events = Vec::new();
    let mut undecodable = 0u64;
    for (line_number, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.context("failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawLogEvent>(&line) {
            Ok(event) => events.push(event),
            Err(error) => {
                debug!(line = line_number + 1, %error, "skipping undecodable line");
                undecodable += 1;
            }
        }
    }

    let report = pipeline.run(&events);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{:>4}  {:<24} {:>4}  {:>8}  {:>8}  {:>10}  {:>8}",
        "rank", "user", "hour", "anomaly", "failure", "resources", "risk"
    );
    for row in &report.scores {
        println!(
            "{:>4}  {:<24} {:>4}  {:>8.3}  {:>8.3}  {:>10.3}  {:>8.4}",
            row.rank,
            row.user_id,
            row.hour,
            row.anomaly_score,
            row.failure_rate,
            row.unique_resources_score,
            row.risk_score
        );
    }

    let d = &report.diagnostics;
    println!();
    println!(
        "events: {} ingested, {} dropped, {} undecodable lines",
        d.events_ingested, d.events_dropped, undecodable
    );
    println!(
        "users: {} profiled, {} not evaluated (below bucket minimum)",
        d.users_profiled, d.users_not_evaluated
    );
    println!(
        "buckets: {} materialized, {} anomalous, {} rows on pattern defaults",
        d.buckets_materialized, d.anomalies_flagged, d.missing_pattern_defaults
    );

    Ok(())
}
