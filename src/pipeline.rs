//! Pipeline Runner
//!
//! 統合 → 異常検知（任意） → 集計 を設定に従って実行する。

use serde::Serialize;
use tracing::info;

use crate::analytics::anomaly::{AnomalyDetector, DetectionMethod};
use crate::analytics::summary::{summarize_by, Column, SummaryMap, TimeWindow};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::ingest::{consolidate, consolidate_records, Batch, ConsolidatedDataset};

/// 異常検知ステージの設定（解決済み）
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionStage {
    pub sensor_id: String,
    pub detector: AnomalyDetector,
}

/// 実行結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    /// 統合後の行数
    pub dataset_rows: usize,
    /// 異常と判定された行数（検知を実行した場合のみ）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anomalies_flagged: Option<usize>,
    pub summary: SummaryMap,
}

/// 設定済みパイプライン
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    validate: bool,
    detection: Option<DetectionStage>,
    group_by: Column,
    time_window: Option<TimeWindow>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            validate: true,
            detection: None,
            group_by: Column::SensorId,
            time_window: None,
        }
    }
}

impl Pipeline {
    /// 設定からパイプラインを構築（文字列設定はここで解決する）
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let detection = match &config.detection {
            Some(detection) => {
                let method: DetectionMethod = detection.method.parse()?;
                Some(DetectionStage {
                    sensor_id: detection.sensor_id.clone(),
                    detector: AnomalyDetector::new(method, detection.threshold),
                })
            }
            None => None,
        };

        let time_window = config
            .summary
            .time_window
            .as_deref()
            .map(str::parse::<TimeWindow>)
            .transpose()?;

        Ok(Self {
            validate: config.ingest.validate,
            detection,
            group_by: config.summary.group_by.parse()?,
            time_window,
        })
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_detection(mut self, sensor_id: impl Into<String>, detector: AnomalyDetector) -> Self {
        self.detection = Some(DetectionStage {
            sensor_id: sensor_id.into(),
            detector,
        });
        self
    }

    pub fn with_group_by(mut self, column: Column) -> Self {
        self.group_by = column;
        self
    }

    pub fn with_time_window(mut self, window: Option<TimeWindow>) -> Self {
        self.time_window = window;
        self
    }

    pub fn detection(&self) -> Option<&DetectionStage> {
        self.detection.as_ref()
    }

    /// 型付きバッチを処理
    pub fn run(&self, batches: &[Batch]) -> Result<PipelineReport> {
        let dataset = consolidate(batches, self.validate)?;
        self.process(dataset)
    }

    /// JSON 形式の生バッチを処理
    pub fn run_records(&self, batches: &[serde_json::Value]) -> Result<PipelineReport> {
        let dataset = consolidate_records(batches, self.validate)?;
        self.process(dataset)
    }

    fn process(&self, dataset: ConsolidatedDataset) -> Result<PipelineReport> {
        let dataset_rows = dataset.len();
        info!(rows = dataset_rows, "統合完了");

        let report = match &self.detection {
            Some(stage) => {
                let annotated = stage.detector.detect(&dataset, &stage.sensor_id)?;
                let flagged = annotated.anomaly_count();
                info!(
                    sensor = %stage.sensor_id,
                    method = %stage.detector.method(),
                    flagged,
                    "異常検知完了"
                );
                PipelineReport {
                    dataset_rows,
                    anomalies_flagged: Some(flagged),
                    summary: summarize_by(&annotated, self.group_by, self.time_window)?,
                }
            }
            None => PipelineReport {
                dataset_rows,
                anomalies_flagged: None,
                summary: summarize_by(&dataset, self.group_by, self.time_window)?,
            },
        };

        info!(entries = report.summary.len(), "集計完了");
        Ok(report)
    }
}
