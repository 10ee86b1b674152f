use serde::{Deserialize, Serialize};

use crate::analytics::anomaly::{DetectionMethod, DEFAULT_THRESHOLD};
use crate::analytics::summary::{Column, TimeWindow, DEFAULT_GROUP_BY};
use crate::error::{Error, Result};
use crate::logging::LogConfig;

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ingestion settings
    pub ingest: IngestConfig,

    /// Anomaly detection settings; detection is skipped when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionConfig>,

    /// Summary settings
    pub summary: SummaryConfig,

    /// Logging configuration
    pub logging: LogConfig,
}

/// Ingestion configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Remove exact duplicates and repeated (timestamp, sensor_id) readings, first wins
    pub validate: bool,
}

/// Anomaly detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Sensor to evaluate
    pub sensor_id: String,

    /// Detection method (zscore, iqr, rolling)
    #[serde(default = "default_method")]
    pub method: String,

    /// Sensitivity threshold
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

/// Summary configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Field to group by
    pub group_by: String,

    /// Optional bucket width such as "5m" or "1h"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<String>,
}

fn default_method() -> String {
    DetectionMethod::ZScore.as_str().to_string()
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { validate: true }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            group_by: DEFAULT_GROUP_BY.to_string(),
            time_window: None,
        }
    }
}

impl DetectionConfig {
    /// Create a detection config with the default method and threshold
    pub fn for_sensor(sensor_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            method: default_method(),
            threshold: default_threshold(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings that would only fail once data is processed
    pub fn validate(&self) -> Result<()> {
        if let Some(detection) = &self.detection {
            if detection.sensor_id.trim().is_empty() {
                return Err(Error::Config(
                    "detection.sensor_id must not be empty".to_string(),
                ));
            }
            detection
                .method
                .parse::<DetectionMethod>()
                .map_err(|e| Error::Config(e.to_string()))?;
            if !detection.threshold.is_finite() || detection.threshold < 0.0 {
                return Err(Error::Config(format!(
                    "detection.threshold must be a finite non-negative number, got {}",
                    detection.threshold
                )));
            }
        }

        self.summary
            .group_by
            .parse::<Column>()
            .map_err(|e| Error::Config(e.to_string()))?;

        if let Some(window) = &self.summary.time_window {
            window
                .parse::<TimeWindow>()
                .map_err(|e| Error::Config(e.to_string()))?;
        }

        Ok(())
    }

    /// Render an annotated example configuration file
    pub fn sample_toml() -> Result<String> {
        let sample = PipelineConfig {
            detection: Some(DetectionConfig::for_sensor("temperature")),
            summary: SummaryConfig {
                group_by: DEFAULT_GROUP_BY.to_string(),
                time_window: Some("5m".to_string()),
            },
            ..PipelineConfig::default()
        };

        let body = toml::to_string_pretty(&sample)
            .map_err(|e| Error::Config(format!("Failed to render sample config: {}", e)))?;

        Ok(format!(
            r#"# telemetry-rs configuration
#
# このファイルを telemetry.toml として保存してください
# 環境変数での上書きも可能です (例: TELEMETRY_SUMMARY__TIME_WINDOW=1h)
#
# [detection] を削除すると異常検知をスキップします
# method = zscore | iqr | rolling
# time_window = 30s, 5m, 1h, 1d など

{}"#,
            body
        ))
    }
}
