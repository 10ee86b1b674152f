//! Error types for the telemetry pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for consolidation, detection and summarization
#[derive(Debug, Error)]
pub enum Error {
    /// Structurally malformed, empty, or missing required fields
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested sensor has no records in the dataset
    #[error("Sensor '{0}' not found in data")]
    UnknownSensor(String),

    /// Detection method is not one of zscore, iqr, rolling
    #[error("Method '{0}' not supported. Use 'zscore', 'iqr', or 'rolling'")]
    UnknownMethod(String),

    /// Too few non-missing points for the chosen method
    #[error(
        "Insufficient data for {method} method on sensor '{sensor}': required {required}, got {got}"
    )]
    InsufficientData {
        sensor: String,
        method: String,
        required: usize,
        got: usize,
    },

    /// Group-by column does not exist on the dataset
    #[error("Column '{0}' not found in data")]
    UnknownColumn(String),

    /// Time-windowed aggregation requested on data without timestamps
    #[error("Data must contain 'timestamp' column for time-based aggregation")]
    MissingTimestamp,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Short machine-readable category name
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::UnknownSensor(_) => "unknown_sensor",
            Error::UnknownMethod(_) => "unknown_method",
            Error::InsufficientData { .. } => "insufficient_data",
            Error::UnknownColumn(_) => "unknown_column",
            Error::MissingTimestamp => "missing_timestamp",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_sensor_display() {
        let err = Error::UnknownSensor("nonexistent".to_string());
        assert_eq!(err.to_string(), "Sensor 'nonexistent' not found in data");
        assert_eq!(err.kind(), "unknown_sensor");
    }

    #[test]
    fn test_insufficient_data_display() {
        let err = Error::InsufficientData {
            sensor: "temperature".to_string(),
            method: "rolling".to_string(),
            required: 5,
            got: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data for rolling method on sensor 'temperature': required 5, got 3"
        );
    }

    #[test]
    fn test_missing_timestamp_display() {
        assert!(Error::MissingTimestamp
            .to_string()
            .contains("must contain 'timestamp' column"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
