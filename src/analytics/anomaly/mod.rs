//! Anomaly Detection Module
//!
//! 異常検知システム

mod detector;
mod types;

pub use detector::{
    detect, rolling_window_size, AnomalyDetector, DEFAULT_THRESHOLD, MAX_ROLLING_WINDOW,
    MIN_ROLLING_WINDOW,
};
pub use types::{AnnotatedDataset, AnnotatedReading, Annotation, DetectionMethod, PointScore};
