//! Composite risk scoring: joining detector output with user baselines.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use crate::aggregator::{Bucket, BucketKey};
use crate::config::PipelineConfig;
use crate::detector::AnomalyRecord;
use crate::profiler::UserPattern;

/// One row of the ranked risk table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScore {
    pub user_id: String,
    pub hour: u8,
    pub anomaly_score: f64,
    pub failure_rate: f64,
    pub unique_resources_score: f64,
    pub risk_score: f64,
    /// 1-based, contiguous, assigned after the deterministic sort.
    pub rank: u32,
}

/// Join anomaly records with user patterns and rank the result.
///
/// Left join: every anomaly record produces a row even if no pattern exists
/// for the user, in which case the pattern-derived components default to
/// zero and the fallback is counted (second return value) and logged.
pub fn score(
    anomalies: &[AnomalyRecord],
    patterns: &BTreeMap<String, UserPattern>,
    buckets: &BTreeMap<BucketKey, Bucket>,
    config: &PipelineConfig,
) -> (Vec<RiskScore>, u64) {
    // Cross-partition reduction: resource diversity is normalized against
    // the largest bucket in the whole window, for any user.
    let max_unique_resources = buckets
        .values()
        .map(|bucket| bucket.unique_resources)
        .max()
        .unwrap_or(0);

    let mut missing_pattern_defaults = 0u64;
    let mut scores: Vec<RiskScore> = anomalies
        .iter()
        .map(|record| {
            let failure_rate = match patterns.get(&record.user_id) {
                Some(pattern) => pattern.failure_rate,
                None => {
                    warn!(
                        user = %record.user_id,
                        "no behavioral pattern for scored user; defaulting components to 0"
                    );
                    missing_pattern_defaults += 1;
                    0.0
                }
            };

            let unique_resources = buckets
                .get(&BucketKey {
                    user_id: record.user_id.clone(),
                    hour: record.hour,
                })
                .map_or(0, |bucket| bucket.unique_resources);
            let unique_resources_score = if max_unique_resources > 0 {
                unique_resources as f64 / max_unique_resources as f64
            } else {
                0.0
            };

            let risk_score = config.anomaly_weight * record.anomaly_score
                + config.failure_weight * failure_rate
                + config.resource_weight * unique_resources_score;

            RiskScore {
                user_id: record.user_id.clone(),
                hour: record.hour,
                anomaly_score: record.anomaly_score,
                failure_rate,
                unique_resources_score,
                risk_score,
                rank: 0,
            }
        })
        .collect();

    // Descending by score; ties resolved by (user_id asc, hour asc) so the
    // ranking is a strict total order and identical across runs.
    scores.sort_by(|a, b| {
        b.risk_score
            .total_cmp(&a.risk_score)
            .then_with(|| a.user_id.cmp(&b.user_id))
            .then_with(|| a.hour.cmp(&b.hour))
    });
    for (index, row) in scores.iter_mut().enumerate() {
        row.rank = index as u32 + 1;
    }

    (scores, missing_pattern_defaults)
}
