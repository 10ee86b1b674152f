//! Analytics Module
//!
//! 異常検知・統計集計システム

pub mod anomaly;
pub mod stats;
pub mod summary;

pub use anomaly::{detect, AnnotatedDataset, AnomalyDetector, DetectionMethod};
pub use stats::ValueStats;
pub use summary::{summarize, summarize_by, Column, SummaryMap, SummaryRecord, SummarySource, TimeWindow};
