use thiserror::Error;

/// Fatal pipeline errors.
///
/// Everything here is raised before any event is processed; per-record
/// problems (unparseable timestamps, missing fields) are absorbed into
/// [`crate::Diagnostics`] instead and never abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("scoring weights must sum to 1.0, got {sum:.6}")]
    InvalidWeights { sum: f64 },

    #[error("scoring weight `{name}` must lie within [0, 1], got {value}")]
    WeightOutOfRange { name: &'static str, value: f64 },

    #[error("alpha must lie in the open interval (0, 1), got {alpha}")]
    InvalidAlpha { alpha: f64 },

    #[error("min_buckets_for_detection must be at least 1")]
    InvalidMinBuckets,

    #[error("top_k_resources must be at least 1")]
    InvalidTopK,

    #[error("utc_offset_hours must lie within [-14, 14], got {hours}")]
    InvalidTimezone { hours: i8 },
}
