use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Configuration for a pipeline run.
///
/// Validated once at pipeline construction; an invalid configuration is
/// rejected before any data is touched so that silently clamped weights can
/// never produce a misleading ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Significance level for outlier bounds. Values closer to 1 tighten
    /// the bounds and make detection more sensitive.
    pub alpha: f64,
    /// Weight of the anomaly score in the composite risk score.
    pub anomaly_weight: f64,
    /// Weight of the user's historical failure rate.
    pub failure_weight: f64,
    /// Weight of the bucket's resource-diversity score.
    pub resource_weight: f64,
    /// Minimum number of buckets a user needs before anomaly detection is
    /// attempted. Users below this are excluded, not flagged.
    pub min_buckets_for_detection: usize,
    /// Number of most-frequent resources kept in each user's baseline.
    pub top_k_resources: usize,
    /// Fixed UTC offset, in whole hours, used to extract the hour-of-day.
    pub utc_offset_hours: i8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            alpha: 0.95,
            anomaly_weight: 0.4,
            failure_weight: 0.3,
            resource_weight: 0.3,
            min_buckets_for_detection: 4,
            top_k_resources: 5,
            utc_offset_hours: 0,
        }
    }
}

impl PipelineConfig {
    /// Configuration tuned for high-sensitivity environments: tighter
    /// outlier bounds and more weight on the anomaly signal.
    pub fn high_sensitivity() -> Self {
        Self {
            alpha: 0.99,
            anomaly_weight: 0.5,
            failure_weight: 0.25,
            resource_weight: 0.25,
            ..Self::default()
        }
    }

    /// Configuration for development and testing: small windows still
    /// produce detector output.
    pub fn development() -> Self {
        Self {
            min_buckets_for_detection: 2,
            ..Self::default()
        }
    }

    /// Validate the configuration, failing fast on anything that would
    /// distort scores.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, value) in [
            ("anomaly_weight", self.anomaly_weight),
            ("failure_weight", self.failure_weight),
            ("resource_weight", self.resource_weight),
        ] {
            if !(0.0..=1.0).contains(&value) || !value.is_finite() {
                return Err(PipelineError::WeightOutOfRange { name, value });
            }
        }

        let sum = self.anomaly_weight + self.failure_weight + self.resource_weight;
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(PipelineError::InvalidWeights { sum });
        }

        if !self.alpha.is_finite() || self.alpha <= 0.0 || self.alpha >= 1.0 {
            return Err(PipelineError::InvalidAlpha { alpha: self.alpha });
        }

        if self.min_buckets_for_detection == 0 {
            return Err(PipelineError::InvalidMinBuckets);
        }

        if self.top_k_resources == 0 {
            return Err(PipelineError::InvalidTopK);
        }

        if self.utc_offset_hours.abs() > 14 {
            return Err(PipelineError::InvalidTimezone {
                hours: self.utc_offset_hours,
            });
        }

        Ok(())
    }

    /// The configured timezone as a chrono offset.
    pub(crate) fn tz_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(i32::from(self.utc_offset_hours) * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }
}
