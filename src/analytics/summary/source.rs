//! Summary sources
//!
//! 集計対象データセットの列と行へのアクセスを抽象化する。

use chrono::SecondsFormat;
use std::fmt;
use std::str::FromStr;

use crate::analytics::anomaly::{AnnotatedDataset, Annotation};
use crate::error::{Error, Result};
use crate::ingest::{ConsolidatedDataset, Reading};

/// データセットの列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Timestamp,
    SensorId,
    Value,
    Unit,
    Quality,
    IsAnomaly,
    AnomalyScore,
    DetectionMethod,
}

impl Column {
    /// 統合済みデータセットの列
    pub const READING_COLUMNS: [Column; 5] = [
        Column::Timestamp,
        Column::SensorId,
        Column::Value,
        Column::Unit,
        Column::Quality,
    ];

    /// 検知結果付きデータセットの列
    pub const ANNOTATED_COLUMNS: [Column; 8] = [
        Column::Timestamp,
        Column::SensorId,
        Column::Value,
        Column::Unit,
        Column::Quality,
        Column::IsAnomaly,
        Column::AnomalyScore,
        Column::DetectionMethod,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Column::Timestamp => "timestamp",
            Column::SensorId => "sensor_id",
            Column::Value => "value",
            Column::Unit => "unit",
            Column::Quality => "quality",
            Column::IsAnomaly => "is_anomaly",
            Column::AnomalyScore => "anomaly_score",
            Column::DetectionMethod => "detection_method",
        }
    }

    /// 行からグループキーを取り出す（値が欠損なら None）
    pub fn key(&self, row: &RowView<'_>) -> Option<String> {
        let reading = row.reading;
        match self {
            Column::Timestamp => Some(
                reading
                    .timestamp
                    .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            ),
            Column::SensorId => Some(reading.sensor_id.clone()),
            // -0.0 と 0.0 は同じキー
            Column::Value => reading
                .value
                .map(|v| (if v == 0.0 { 0.0f64 } else { v }).to_string()),
            Column::Unit => Some(reading.unit.clone()),
            Column::Quality => Some(reading.quality.as_str().to_string()),
            Column::IsAnomaly => row.annotation.map(|a| a.is_anomaly.to_string()),
            Column::AnomalyScore => row.annotation.map(|a| a.anomaly_score.to_string()),
            Column::DetectionMethod => row.annotation.map(|a| a.detection_method.clone()),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "timestamp" => Ok(Column::Timestamp),
            "sensor_id" | "sensor" => Ok(Column::SensorId),
            "value" => Ok(Column::Value),
            "unit" => Ok(Column::Unit),
            "quality" => Ok(Column::Quality),
            "is_anomaly" => Ok(Column::IsAnomaly),
            "anomaly_score" => Ok(Column::AnomalyScore),
            "detection_method" => Ok(Column::DetectionMethod),
            other => Err(Error::UnknownColumn(other.to_string())),
        }
    }
}

/// 1行分のビュー
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub reading: &'a Reading,
    /// 検知結果（未検知のデータセットでは None）
    pub annotation: Option<&'a Annotation>,
}

impl RowView<'_> {
    /// 異常フラグ（検知結果がなければ false）
    pub fn is_anomaly(&self) -> bool {
        self.annotation.is_some_and(|a| a.is_anomaly)
    }
}

/// 集計可能なデータセット
///
/// 検知結果の有無は列の有無として公開する。
pub trait SummarySource {
    /// 存在する列
    fn columns(&self) -> &[Column];

    fn len(&self) -> usize;

    /// 指定行のビュー（`index < len()`）
    fn row(&self, index: usize) -> RowView<'_>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn has_column(&self, column: Column) -> bool {
        self.columns().contains(&column)
    }

    fn has_anomaly_annotations(&self) -> bool {
        self.has_column(Column::IsAnomaly)
    }
}

impl SummarySource for ConsolidatedDataset {
    fn columns(&self) -> &[Column] {
        &Column::READING_COLUMNS
    }

    fn len(&self) -> usize {
        self.readings().len()
    }

    fn row(&self, index: usize) -> RowView<'_> {
        RowView {
            reading: &self.readings()[index],
            annotation: None,
        }
    }
}

impl SummarySource for AnnotatedDataset {
    fn columns(&self) -> &[Column] {
        &Column::ANNOTATED_COLUMNS
    }

    fn len(&self) -> usize {
        self.rows().len()
    }

    fn row(&self, index: usize) -> RowView<'_> {
        let row = &self.rows()[index];
        RowView {
            reading: &row.reading,
            annotation: Some(&row.annotation),
        }
    }
}
