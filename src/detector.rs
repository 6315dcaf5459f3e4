//! Statistical anomaly detection on per-user bucket series.
//!
//! Each user's chronological `access_count` series is reduced to a residual
//! component (seasonal decomposition when the series is long enough, the raw
//! series otherwise) and screened with interquartile-range outlier bounds.
//! The IQR rule is robust to the heavy-tailed, bursty distributions access
//! logs actually have, where a mean/stddev rule would let a single burst
//! inflate its own threshold.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::aggregator::{Bucket, BucketKey};
use crate::config::PipelineConfig;

/// Hour-of-day periodicity used by the seasonal decomposition.
const SEASONAL_PERIOD: usize = 24;

/// Metric the detector currently evaluates.
const METRIC_ACCESS_COUNT: &str = "access_count";

/// One detector verdict for one metric of one bucket.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyRecord {
    pub user_id: String,
    pub hour: u8,
    pub metric_name: &'static str,
    pub observed_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// 0 inside the bounds, scaling with distance beyond them, capped at 1.
    pub anomaly_score: f64,
    pub is_anomaly: bool,
}

/// IQR-based outlier detector over seasonal residuals.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    iqr_multiplier: f64,
    min_buckets: usize,
}

impl AnomalyDetector {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            iqr_multiplier: Self::iqr_multiplier(config.alpha),
            min_buckets: config.min_buckets_for_detection,
        }
    }

    /// Map the significance level `alpha` onto the IQR fence multiplier.
    ///
    /// `k = 30 * (1 - alpha)`: monotone decreasing, with `alpha = 0.95`
    /// giving the conventional Tukey fence `k = 1.5` and `alpha -> 1`
    /// collapsing the fences onto the quartiles (maximum sensitivity).
    fn iqr_multiplier(alpha: f64) -> f64 {
        30.0 * (1.0 - alpha)
    }

    /// Evaluate every user's bucket series.
    ///
    /// Returns the anomaly records (ordered by user id, then hour) and the
    /// number of users excluded for having fewer than the configured
    /// minimum bucket count. Users are independent, so the evaluation fans
    /// out across a rayon pool; the merge keeps the input's deterministic
    /// user order.
    pub fn detect(&self, buckets: &BTreeMap<BucketKey, Bucket>) -> (Vec<AnomalyRecord>, u64) {
        // BTreeMap order means each user's hours arrive ascending, which
        // is the chronological bucket sequence within a window.
        let mut grouped: BTreeMap<&str, Vec<(u8, f64)>> = BTreeMap::new();
        for (key, bucket) in buckets {
            grouped
                .entry(key.user_id.as_str())
                .or_default()
                .push((key.hour, bucket.access_count as f64));
        }
        let series_by_user: Vec<(&str, Vec<(u8, f64)>)> = grouped.into_iter().collect();

        let per_user: Vec<Option<Vec<AnomalyRecord>>> = series_by_user
            .par_iter()
            .map(|(user, series)| {
                if series.len() < self.min_buckets {
                    debug!(
                        user = %user,
                        buckets = series.len(),
                        "user not evaluated: below minimum bucket count"
                    );
                    return None;
                }
                Some(self.evaluate_user(user, series))
            })
            .collect();

        let excluded = per_user.iter().filter(|records| records.is_none()).count() as u64;
        let records = per_user.into_iter().flatten().flatten().collect();
        (records, excluded)
    }

    fn evaluate_user(&self, user: &str, series: &[(u8, f64)]) -> Vec<AnomalyRecord> {
        let values: Vec<f64> = series.iter().map(|(_, value)| *value).collect();
        let residuals = residual_component(&values);

        let mut sorted = residuals.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        let lower = q1 - self.iqr_multiplier * iqr;
        let upper = q3 + self.iqr_multiplier * iqr;

        series
            .iter()
            .zip(residuals.iter())
            .map(|(&(hour, observed), &residual)| {
                // Zero IQR means the user's residuals have no spread at
                // all; with no historical variance there is nothing to
                // flag, and the score stays 0 rather than dividing by zero.
                let distance = if residual > upper {
                    residual - upper
                } else if residual < lower {
                    lower - residual
                } else {
                    0.0
                };
                let anomaly_score = if iqr > 0.0 && distance > 0.0 {
                    (distance / iqr).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let is_anomaly = anomaly_score > 0.0;
                if is_anomaly {
                    debug!(
                        user = %user,
                        hour,
                        observed,
                        "bucket flagged as anomalous"
                    );
                }

                // The bounds are computed in residual space; shift them by
                // the fitted component so they are reported on the same
                // scale as the observed value.
                let fitted = observed - residual;
                AnomalyRecord {
                    user_id: user.to_string(),
                    hour,
                    metric_name: METRIC_ACCESS_COUNT,
                    observed_value: observed,
                    lower_bound: fitted + lower,
                    upper_bound: fitted + upper,
                    anomaly_score,
                    is_anomaly,
                }
            })
            .collect()
    }
}

/// Residual component of a chronological series.
///
/// With at least two full seasonal periods the series is decomposed into
/// trend (centered moving average) + seasonal (per-phase means of the
/// detrended series) + residual. Shorter series skip the decomposition and
/// are used as the residual directly.
fn residual_component(values: &[f64]) -> Vec<f64> {
    if values.len() < 2 * SEASONAL_PERIOD {
        return values.to_vec();
    }

    let trend = moving_average_trend(values, SEASONAL_PERIOD);
    let detrended: Vec<f64> = values
        .iter()
        .zip(trend.iter())
        .map(|(value, trend)| value - trend)
        .collect();
    let seasonal = seasonal_means(&detrended, SEASONAL_PERIOD);

    values
        .iter()
        .zip(trend.iter())
        .enumerate()
        .map(|(i, (value, trend))| value - trend - seasonal[i % SEASONAL_PERIOD])
        .collect()
}

/// Centered moving-average trend with a window of one seasonal period.
/// Near the edges the window shrinks to whatever is available.
fn moving_average_trend(values: &[f64], period: usize) -> Vec<f64> {
    let half = period / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            let window = &values[start..end];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}

/// Per-phase means of a detrended series, centered so the seasonal
/// component sums to zero over one period.
fn seasonal_means(detrended: &[f64], period: usize) -> Vec<f64> {
    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, value) in detrended.iter().enumerate() {
        sums[i % period] += value;
        counts[i % period] += 1;
    }
    let mut means: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
        .collect();

    let grand_mean = means.iter().sum::<f64>() / period as f64;
    for mean in &mut means {
        *mean -= grand_mean;
    }
    means
}

/// Linear-interpolation quantile of an ascending-sorted slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let position = q * (sorted.len() - 1) as f64;
    let low = position.floor() as usize;
    let high = position.ceil() as usize;
    if low == high {
        sorted[low]
    } else {
        let fraction = position - low as f64;
        sorted[low] * (1.0 - fraction) + sorted[high] * fraction
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(access_count: u64) -> Bucket {
        Bucket {
            access_count,
            unique_resources: 1,
            failed_attempts: 0,
        }
    }

    fn buckets_for(user: &str, counts: &[u64]) -> BTreeMap<BucketKey, Bucket> {
        counts
            .iter()
            .enumerate()
            .map(|(hour, &count)| {
                (
                    BucketKey {
                        user_id: user.to_string(),
                        hour: hour as u8,
                    },
                    bucket(count),
                )
            })
            .collect()
    }

    #[test]
    fn alpha_maps_to_conventional_fence() {
        assert!((AnomalyDetector::iqr_multiplier(0.95) - 1.5).abs() < 1e-12);
        assert!(AnomalyDetector::iqr_multiplier(0.999) < 0.1);
        // Monotone: more significance, tighter fences.
        assert!(AnomalyDetector::iqr_multiplier(0.9) > AnomalyDetector::iqr_multiplier(0.95));
    }

    #[test]
    fn flags_burst_bucket_only() {
        let detector = AnomalyDetector::new(&PipelineConfig::default());
        let buckets = buckets_for("u1", &[10, 11, 9, 10, 200]);
        let (records, excluded) = detector.detect(&buckets);

        assert_eq!(excluded, 0);
        assert_eq!(records.len(), 5);
        for record in &records[..4] {
            assert!(!record.is_anomaly, "hour {} wrongly flagged", record.hour);
            assert_eq!(record.anomaly_score, 0.0);
        }
        let burst = &records[4];
        assert!(burst.is_anomaly);
        assert!(burst.anomaly_score > 0.0);
        assert_eq!(burst.observed_value, 200.0);
    }

    #[test]
    fn users_below_minimum_emit_nothing() {
        let detector = AnomalyDetector::new(&PipelineConfig::default());
        let buckets = buckets_for("sparse", &[5, 1000, 3]);
        let (records, excluded) = detector.detect(&buckets);
        assert!(records.is_empty());
        assert_eq!(excluded, 1);
    }

    #[test]
    fn constant_series_has_zero_iqr_and_no_anomalies() {
        let detector = AnomalyDetector::new(&PipelineConfig::default());
        let buckets = buckets_for("steady", &[7, 7, 7, 7, 7, 7]);
        let (records, _) = detector.detect(&buckets);
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|record| !record.is_anomaly));
        assert!(records.iter().all(|record| record.anomaly_score == 0.0));
    }

    #[test]
    fn anomaly_score_is_capped_at_one() {
        let detector = AnomalyDetector::new(&PipelineConfig::default());
        let buckets = buckets_for("u", &[10, 11, 9, 10, 1_000_000]);
        let (records, _) = detector.detect(&buckets);
        let burst = records.iter().find(|record| record.is_anomaly).unwrap();
        assert_eq!(burst.anomaly_score, 1.0);
    }

    #[test]
    fn quantiles_interpolate_linearly() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&sorted, 0.25) - 1.75).abs() < 1e-12);
        assert!((quantile(&sorted, 0.5) - 2.5).abs() < 1e-12);
        assert!((quantile(&sorted, 0.75) - 3.25).abs() < 1e-12);
        assert_eq!(quantile(&sorted, 0.0), 1.0);
        assert_eq!(quantile(&sorted, 1.0), 4.0);
    }

    #[test]
    fn seasonal_decomposition_absorbs_pure_seasonality() {
        // Three full days of the same daily shape: residuals should be
        // near zero everywhere once the seasonal component is removed.
        let daily: Vec<f64> = (0..24).map(|h| 10.0 + (h % 12) as f64).collect();
        let values: Vec<f64> = daily.iter().cycle().take(72).copied().collect();

        let residuals = residual_component(&values);
        assert_eq!(residuals.len(), 72);
        // The shrinking-window edges wobble; the interior should be flat.
        for residual in &residuals[24..48] {
            assert!(residual.abs() < 2.0, "residual {residual} too large");
        }
    }

    #[test]
    fn short_series_is_its_own_residual() {
        let values = [3.0, 4.0, 5.0];
        assert_eq!(residual_component(&values), values.to_vec());
    }

    #[test]
    fn multiple_users_keep_deterministic_order() {
        let mut buckets = buckets_for("alice", &[10, 10, 10, 50]);
        buckets.extend(buckets_for("bob", &[4, 4, 4, 4]));
        let detector = AnomalyDetector::new(&PipelineConfig::default());
        let (records, _) = detector.detect(&buckets);

        let order: Vec<(&str, u8)> = records
            .iter()
            .map(|record| (record.user_id.as_str(), record.hour))
            .collect();
        let mut expected = order.clone();
        expected.sort();
        assert_eq!(order, expected);
    }
}
