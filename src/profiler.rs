//! Per-user behavioral baselines over the full analysis window.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::FixedOffset;
use serde::Serialize;

use crate::event::{local_hour, RawLogEvent};

/// A user's behavioral baseline for one window.
///
/// Computed wholesale per window; the next window replaces it instead of
/// mutating it incrementally.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserPattern {
    pub user_id: String,
    /// Distinct hours-of-day with at least one event, ascending.
    pub typical_hours: Vec<u8>,
    /// Most-frequently-accessed resources, highest count first.
    pub common_resources: Vec<String>,
    /// Fraction of the user's events with status `FAILED`.
    pub failure_rate: f64,
}

#[derive(Default)]
struct PatternAccumulator {
    hours: BTreeSet<u8>,
    resource_counts: HashMap<String, u64>,
    total_events: u64,
    failed_events: u64,
}

/// Build a baseline for every user present in the window.
///
/// Runs over the raw events, independently of the anomaly pass: a user too
/// sparse for detection still gets a pattern. Malformed records are skipped
/// the same way the aggregator skips them.
pub fn profile(
    events: &[RawLogEvent],
    offset: FixedOffset,
    top_k: usize,
) -> BTreeMap<String, UserPattern> {
    let mut accumulators: BTreeMap<String, PatternAccumulator> = BTreeMap::new();

    for event in events {
        if event.is_malformed() {
            continue;
        }
        let Some(instant) = event.parse_timestamp() else {
            continue;
        };

        let accumulator = accumulators.entry(event.user_id.clone()).or_default();
        accumulator.hours.insert(local_hour(instant, offset));
        *accumulator
            .resource_counts
            .entry(event.resource_id.clone())
            .or_insert(0) += 1;
        accumulator.total_events += 1;
        if event.is_failed() {
            accumulator.failed_events += 1;
        }
    }

    accumulators
        .into_iter()
        .map(|(user_id, accumulator)| {
            let failure_rate = if accumulator.total_events > 0 {
                accumulator.failed_events as f64 / accumulator.total_events as f64
            } else {
                0.0
            };
            let pattern = UserPattern {
                user_id: user_id.clone(),
                typical_hours: accumulator.hours.into_iter().collect(),
                common_resources: top_resources(accumulator.resource_counts, top_k),
                failure_rate,
            };
            (user_id, pattern)
        })
        .collect()
}

/// The `top_k` most-accessed resources.
///
/// Ties are broken by resource id ascending so that repeated runs over the
/// same window produce the same list regardless of hash iteration order.
fn top_resources(counts: HashMap<String, u64>, top_k: usize) -> Vec<String> {
    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_k);
    ranked.into_iter().map(|(resource, _)| resource).collect()
}
