//! Behavioral anomaly detection and risk scoring over access-log windows.
//!
//! The crate turns a bounded window of per-user access-log events into a
//! ranked table of user-hours that warrant security review. Four stages are
//! wired into a pure batch pipeline:
//!
//! 1. [`aggregator`] groups events into `(user, hour-of-day)` buckets with
//!    behavioral counters.
//! 2. [`detector`] flags buckets whose access volume is statistically
//!    unusual for that user, using seasonal decomposition and IQR bounds.
//! 3. [`profiler`] builds each user's behavioral baseline (typical hours,
//!    common resources, failure rate) independently of the detector.
//! 4. [`scoring`] joins detector and profiler output into a normalized,
//!    weighted, deterministically ranked risk score.
//!
//! The pipeline holds no state between runs: re-running it on an unchanged
//! window with an unchanged [`PipelineConfig`] yields identical output.
//!
//! ```
//! use access_sentry::{PipelineConfig, RiskPipeline, RawLogEvent};
//!
//! let events = vec![RawLogEvent {
//!     timestamp: "2024-03-01T09:12:00Z".into(),
//!     user_id: "alice".into(),
//!     resource_id: "/billing/export".into(),
//!     status: "OK".into(),
//!     source_ip: "10.0.0.7".into(),
//! }];
//!
//! let pipeline = RiskPipeline::new(PipelineConfig::default()).unwrap();
//! let report = pipeline.run(&events);
//! assert_eq!(report.diagnostics.events_ingested, 1);
//! ```

pub mod aggregator;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod pipeline;
pub mod profiler;
pub mod scoring;

pub use aggregator::{Bucket, BucketKey};
pub use config::PipelineConfig;
pub use detector::{AnomalyDetector, AnomalyRecord};
pub use error::PipelineError;
pub use event::RawLogEvent;
pub use pipeline::{Diagnostics, RiskPipeline, RiskReport};
pub use profiler::UserPattern;
pub use scoring::RiskScore;
