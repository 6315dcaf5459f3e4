//! Pipeline orchestration and run diagnostics.

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregator;
use crate::config::PipelineConfig;
use crate::detector::AnomalyDetector;
use crate::error::PipelineError;
use crate::event::RawLogEvent;
use crate::profiler;
use crate::scoring::{self, RiskScore};

/// Counters for everything a run absorbed instead of failing on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Events handed to the pipeline, malformed or not.
    pub events_ingested: u64,
    /// Events dropped for an unparseable timestamp or missing user id.
    pub events_dropped: u64,
    pub buckets_materialized: u64,
    pub users_profiled: u64,
    /// Users excluded from detection for having too few buckets.
    pub users_not_evaluated: u64,
    pub anomalies_flagged: u64,
    /// Scored rows that fell back to zeroed pattern components.
    pub missing_pattern_defaults: u64,
}

/// Result of one completed run: the ranked table plus diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RiskReport {
    pub scores: Vec<RiskScore>,
    pub diagnostics: Diagnostics,
}

/// The four-stage batch pipeline.
///
/// Construction validates the configuration and fails fast; a constructed
/// pipeline can no longer fail, only absorb per-record problems into the
/// report's diagnostics. Runs are stateless: each window is recomputed
/// wholesale, and identical input plus identical configuration produces
/// identical output.
pub struct RiskPipeline {
    config: PipelineConfig,
    detector: AnomalyDetector,
}

impl RiskPipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let detector = AnomalyDetector::new(&config);
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline over one analysis window.
    pub fn run(&self, events: &[RawLogEvent]) -> RiskReport {
        let offset = self.config.tz_offset();

        let (buckets, events_dropped) = aggregator::aggregate(events, offset);
        debug!(
            buckets = buckets.len(),
            dropped = events_dropped,
            "feature aggregation complete"
        );

        let (anomalies, users_not_evaluated) = self.detector.detect(&buckets);
        let anomalies_flagged = anomalies
            .iter()
            .filter(|record| record.is_anomaly)
            .count() as u64;

        // The profiler runs over the raw events, not the detector output:
        // users too sparse for detection still get a baseline.
        let patterns = profiler::profile(events, offset, self.config.top_k_resources);

        let (scores, missing_pattern_defaults) =
            scoring::score(&anomalies, &patterns, &buckets, &self.config);

        let diagnostics = Diagnostics {
            events_ingested: events.len() as u64,
            events_dropped,
            buckets_materialized: buckets.len() as u64,
            users_profiled: patterns.len() as u64,
            users_not_evaluated,
            anomalies_flagged,
            missing_pattern_defaults,
        };

        info!(
            events = diagnostics.events_ingested,
            dropped = diagnostics.events_dropped,
            users = diagnostics.users_profiled,
            anomalies = diagnostics.anomalies_flagged,
            scored = scores.len(),
            "risk pipeline run complete"
        );

        RiskReport {
            scores,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_fails_before_any_processing() {
        let config = PipelineConfig {
            anomaly_weight: 0.5,
            failure_weight: 0.3,
            resource_weight: 0.3,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            RiskPipeline::new(config),
            Err(PipelineError::InvalidWeights { .. })
        ));
    }

    #[test]
    fn empty_window_yields_empty_report() {
        let pipeline = RiskPipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline.run(&[]);
        assert!(report.scores.is_empty());
        assert_eq!(report.diagnostics, Diagnostics::default());
    }
}
