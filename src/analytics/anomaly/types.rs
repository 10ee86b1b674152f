//! Anomaly Detection Types
//!
//! 異常検知用の型定義

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ingest::Reading;

/// 異常検知アルゴリズム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Z-スコア法
    ZScore,
    /// IQR法（四分位範囲）
    Iqr,
    /// 中心化移動統計法
    Rolling,
}

impl DetectionMethod {
    /// 手法名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::ZScore => "zscore",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::Rolling => "rolling",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zscore" => Ok(DetectionMethod::ZScore),
            "iqr" => Ok(DetectionMethod::Iqr),
            "rolling" => Ok(DetectionMethod::Rolling),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

/// 1点分のスコア
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointScore {
    /// 異常度（0以上、0は正常または判定不能）
    pub score: f64,
    /// 異常フラグ
    pub is_anomaly: bool,
}

impl PointScore {
    pub(crate) fn new(score: f64, is_anomaly: bool) -> Self {
        Self { score, is_anomaly }
    }
}

/// レコードごとの検知結果
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Annotation {
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    /// 対象外センサーの行では空文字列
    pub detection_method: String,
}

impl Annotation {
    pub(crate) fn scored(point: PointScore, method: DetectionMethod) -> Self {
        Self {
            is_anomaly: point.is_anomaly,
            anomaly_score: point.score,
            detection_method: method.as_str().to_string(),
        }
    }
}

/// 検知結果付きの読み取り値
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedReading {
    #[serde(flatten)]
    pub reading: Reading,
    #[serde(flatten)]
    pub annotation: Annotation,
}

/// 検知結果付きデータセット
///
/// 入力データセットの全行（全センサー）を同じ順序で保持する。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnnotatedDataset {
    rows: Vec<AnnotatedReading>,
}

impl AnnotatedDataset {
    pub(crate) fn from_rows(rows: Vec<AnnotatedReading>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[AnnotatedReading] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AnnotatedReading> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 異常と判定された行
    pub fn anomalies(&self) -> impl Iterator<Item = &AnnotatedReading> {
        self.rows.iter().filter(|row| row.annotation.is_anomaly)
    }

    /// 異常行数
    pub fn anomaly_count(&self) -> usize {
        self.anomalies().count()
    }

    /// 指定センサーの行
    pub fn sensor_rows<'a>(
        &'a self,
        sensor_id: &'a str,
    ) -> impl Iterator<Item = &'a AnnotatedReading> + 'a {
        self.rows
            .iter()
            .filter(move |row| row.reading.sensor_id == sensor_id)
    }
}

impl<'a> IntoIterator for &'a AnnotatedDataset {
    type Item = &'a AnnotatedReading;
    type IntoIter = std::slice::Iter<'a, AnnotatedReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
