//! # telemetry-rs
//!
//! Consolidation, anomaly detection and summarization for industrial sensor telemetry.
//!
//! Batches of readings from an unreliable acquisition source are merged into one
//! ordered, deduplicated dataset ([`consolidate`]), optionally scored for anomalies
//! on a single sensor ([`detect`]), and reduced to per-group statistics
//! ([`summarize`]), optionally bucketed by fixed time windows.

pub mod analytics;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod simulator;

pub use analytics::{detect, summarize, AnnotatedDataset, DetectionMethod, SummaryMap};
pub use error::{Error, Result};
pub use ingest::{consolidate, consolidate_records, Batch, ConsolidatedDataset, Quality, Reading};
pub use pipeline::{Pipeline, PipelineReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::UnknownSensor("test".to_string());
        assert!(err.to_string().contains("test"));
    }
}
