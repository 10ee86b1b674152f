//! Summary Types
//!
//! 集計結果の型定義

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::analytics::stats::ValueStats;

/// グループごとの集計結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// 有効値（非欠損）の件数
    pub count: usize,
    /// 欠損値の件数
    pub null_count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    /// 有効値がなければ 0
    pub median: f64,
    pub good_quality_pct: f64,
    pub bad_quality_pct: f64,
    pub uncertain_quality_pct: f64,
    /// 検知結果付きデータセットの場合のみ（0.0-1.0）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_rate: Option<f64>,
}

impl SummaryRecord {
    pub(crate) fn new(
        stats: ValueStats,
        null_count: usize,
        quality_pct: [f64; 3],
        anomaly_rate: Option<f64>,
    ) -> Self {
        let [good_quality_pct, bad_quality_pct, uncertain_quality_pct] = quality_pct;
        Self {
            count: stats.count,
            null_count,
            mean: stats.mean,
            std: stats.std,
            min: stats.min,
            max: stats.max,
            median: stats.median,
            good_quality_pct,
            bad_quality_pct,
            uncertain_quality_pct,
            anomaly_rate,
        }
    }

    /// グループの総行数
    pub fn total_rows(&self) -> usize {
        self.count + self.null_count
    }
}

/// 初出順を保つグループキー→集計結果のマップ
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupedSummary {
    entries: Vec<(String, SummaryRecord)>,
}

impl GroupedSummary {
    pub(crate) fn from_entries(entries: Vec<(String, SummaryRecord)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&SummaryRecord> {
        self.entries
            .iter()
            .find(|(group, _)| group == key)
            .map(|(_, record)| record)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryRecord)> {
        self.entries
            .iter()
            .map(|(key, record)| (key.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for GroupedSummary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, record) in &self.entries {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

/// 集計結果
///
/// 時間窓なしならグループ→集計、時間窓ありならバケット開始時刻→グループ→集計。
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryMap {
    Grouped(GroupedSummary),
    /// バケット開始時刻の昇順
    Windowed(Vec<(DateTime<Utc>, GroupedSummary)>),
}

impl SummaryMap {
    pub fn as_grouped(&self) -> Option<&GroupedSummary> {
        match self {
            SummaryMap::Grouped(groups) => Some(groups),
            SummaryMap::Windowed(_) => None,
        }
    }

    pub fn as_windowed(&self) -> Option<&[(DateTime<Utc>, GroupedSummary)]> {
        match self {
            SummaryMap::Grouped(_) => None,
            SummaryMap::Windowed(buckets) => Some(buckets),
        }
    }

    /// 時間窓なし集計のグループを取得
    pub fn get(&self, key: &str) -> Option<&SummaryRecord> {
        self.as_grouped().and_then(|groups| groups.get(key))
    }

    /// 指定バケットのグループを取得
    pub fn bucket(&self, start: DateTime<Utc>) -> Option<&GroupedSummary> {
        self.as_windowed()?
            .iter()
            .find(|(bucket, _)| *bucket == start)
            .map(|(_, groups)| groups)
    }

    /// トップレベルのエントリ数（グループ数またはバケット数）
    pub fn len(&self) -> usize {
        match self {
            SummaryMap::Grouped(groups) => groups.len(),
            SummaryMap::Windowed(buckets) => buckets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for SummaryMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SummaryMap::Grouped(groups) => groups.serialize(serializer),
            SummaryMap::Windowed(buckets) => {
                let mut map = serializer.serialize_map(Some(buckets.len()))?;
                for (start, groups) in buckets {
                    map.serialize_entry(
                        &start.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                        groups,
                    )?;
                }
                map.end()
            }
        }
    }
}
