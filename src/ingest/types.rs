//! Ingestion Types
//!
//! センサーテレメトリの型定義

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// データ品質フラグ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Quality {
    /// 正常
    Good,
    /// 異常（センサー障害など）
    Bad,
    /// 不確実
    Uncertain,
}

impl Quality {
    /// 全品質フラグ（集計時の列挙順）
    pub const ALL: [Quality; 3] = [Quality::Good, Quality::Bad, Quality::Uncertain];

    /// フラグ名を取得
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "GOOD",
            Quality::Bad => "BAD",
            Quality::Uncertain => "UNCERTAIN",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "GOOD" => Ok(Quality::Good),
            "BAD" => Ok(Quality::Bad),
            "UNCERTAIN" => Ok(Quality::Uncertain),
            other => Err(Error::InvalidInput(format!(
                "Unknown quality flag '{}': expected GOOD, BAD or UNCERTAIN",
                other
            ))),
        }
    }
}

/// センサー読み取り値
///
/// `value` が `None` の場合は「計測なし」を表し、0.0 とは区別される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// 計測時刻
    pub timestamp: DateTime<Utc>,
    /// センサー識別子
    #[serde(alias = "sensor")]
    pub sensor_id: String,
    /// 計測値（欠損時は None）
    pub value: Option<f64>,
    /// 単位
    pub unit: String,
    /// 品質フラグ
    pub quality: Quality,
}

impl Reading {
    /// 新しい読み取り値を作成
    pub fn new(
        timestamp: DateTime<Utc>,
        sensor_id: impl Into<String>,
        value: Option<f64>,
        unit: impl Into<String>,
        quality: Quality,
    ) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.into(),
            value,
            unit: unit.into(),
            quality,
        }
    }

    /// 計測値が欠損しているか
    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }
}

/// 1回の取得試行で得られた読み取り値の列
///
/// 空であることも、重複や時刻の逆転を含むこともある。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch(Vec<Reading>);

impl Batch {
    /// 新しいバッチを作成
    pub fn new(readings: Vec<Reading>) -> Self {
        Self(readings)
    }

    /// 読み取り値を追加
    pub fn push(&mut self, reading: Reading) {
        self.0.push(reading);
    }

    pub fn readings(&self) -> &[Reading] {
        &self.0
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Reading>> for Batch {
    fn from(readings: Vec<Reading>) -> Self {
        Self(readings)
    }
}

impl FromIterator<Reading> for Batch {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// 統合済みデータセット
///
/// 検証付きで統合された場合、完全一致の重複がなく、(timestamp, sensor_id)
/// ごとに高々1件で、時刻は非減少順に並ぶ。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConsolidatedDataset {
    readings: Vec<Reading>,
}

impl ConsolidatedDataset {
    pub(crate) fn from_readings(readings: Vec<Reading>) -> Self {
        Self { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn into_readings(self) -> Vec<Reading> {
        self.readings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Reading> {
        self.readings.iter()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// センサーIDを初出順に取得
    pub fn sensor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for reading in &self.readings {
            if !ids.contains(&reading.sensor_id.as_str()) {
                ids.push(&reading.sensor_id);
            }
        }
        ids
    }

    /// 指定センサーのレコードが存在するか
    pub fn contains_sensor(&self, sensor_id: &str) -> bool {
        self.readings.iter().any(|r| r.sensor_id == sensor_id)
    }
}

impl<'a> IntoIterator for &'a ConsolidatedDataset {
    type Item = &'a Reading;
    type IntoIter = std::slice::Iter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.iter()
    }
}

impl From<ConsolidatedDataset> for Batch {
    fn from(dataset: ConsolidatedDataset) -> Self {
        Batch(dataset.readings)
    }
}
