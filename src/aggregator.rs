//! Feature aggregation: raw events to per-(user, hour) behavioral buckets.

use std::collections::{BTreeMap, BTreeSet};

use chrono::FixedOffset;
use serde::Serialize;
use tracing::debug;

use crate::event::{local_hour, RawLogEvent};

/// Grouping key for one user during one hour-of-day within the window.
///
/// `BTreeMap` ordering over this key (user id, then hour) gives every
/// downstream stage a deterministic iteration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct BucketKey {
    pub user_id: String,
    pub hour: u8,
}

/// Behavioral counters for one bucket.
///
/// Invariants, enforced by construction: `failed_attempts <= access_count`
/// and `unique_resources <= access_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub access_count: u64,
    pub unique_resources: u64,
    pub failed_attempts: u64,
}

#[derive(Default)]
struct BucketAccumulator {
    access_count: u64,
    failed_attempts: u64,
    resources: BTreeSet<String>,
}

/// Group a window of events into buckets.
///
/// Events with an unparseable timestamp or a missing user id are dropped
/// and counted in the returned tally; they never abort the batch. Pure
/// apart from debug-level drop logging.
pub fn aggregate(
    events: &[RawLogEvent],
    offset: FixedOffset,
) -> (BTreeMap<BucketKey, Bucket>, u64) {
    let mut accumulators: BTreeMap<BucketKey, BucketAccumulator> = BTreeMap::new();
    let mut dropped = 0u64;

    for event in events {
        if event.is_malformed() {
            debug!(resource = %event.resource_id, "dropping event without user id");
            dropped += 1;
            continue;
        }
        let Some(instant) = event.parse_timestamp() else {
            debug!(
                user = %event.user_id,
                timestamp = %event.timestamp,
                "dropping event with unparseable timestamp"
            );
            dropped += 1;
            continue;
        };

        let key = BucketKey {
            user_id: event.user_id.clone(),
            hour: local_hour(instant, offset),
        };
        let accumulator = accumulators.entry(key).or_default();
        accumulator.access_count += 1;
        if event.is_failed() {
            accumulator.failed_attempts += 1;
        }
        accumulator.resources.insert(event.resource_id.clone());
    }

    let buckets = accumulators
        .into_iter()
        .map(|(key, accumulator)| {
            (
                key,
                Bucket {
                    access_count: accumulator.access_count,
                    unique_resources: accumulator.resources.len() as u64,
                    failed_attempts: accumulator.failed_attempts,
                },
            )
        })
        .collect();

    (buckets, dropped)
}
