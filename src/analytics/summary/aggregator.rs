//! Summary Aggregator
//!
//! グループ別・時間窓別の集計

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use super::source::{Column, RowView, SummarySource};
use super::types::{GroupedSummary, SummaryMap, SummaryRecord};
use super::window::TimeWindow;
use crate::analytics::stats::ValueStats;
use crate::error::{Error, Result};
use crate::ingest::Quality;

/// 既定のグループ化列
pub const DEFAULT_GROUP_BY: &str = "sensor_id";

/// 初出順を保つグループ化（キー→行インデックス列）
struct Grouping<K> {
    order: Vec<(K, Vec<usize>)>,
    index: HashMap<K, usize>,
}

impl<K: Clone + Eq + std::hash::Hash> Grouping<K> {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, key: K, row: usize) {
        match self.index.get(&key) {
            Some(&slot) => self.order[slot].1.push(row),
            None => {
                self.index.insert(key.clone(), self.order.len());
                self.order.push((key, vec![row]));
            }
        }
    }

    fn into_groups(self) -> Vec<(K, Vec<usize>)> {
        self.order
    }
}

/// 列名と時間窓文字列を指定して集計
///
/// 検証順: 空データ → 列の存在 → タイムスタンプ列 → 時間窓の書式。
pub fn summarize<S>(dataset: &S, group_by: &str, time_window: Option<&str>) -> Result<SummaryMap>
where
    S: SummarySource + ?Sized,
{
    if dataset.is_empty() {
        return Err(Error::InvalidInput("Data cannot be empty".to_string()));
    }

    let column: Column = group_by.parse()?;
    if !dataset.has_column(column) {
        return Err(Error::UnknownColumn(group_by.to_string()));
    }

    let window = match time_window {
        Some(raw) => {
            if !dataset.has_column(Column::Timestamp) {
                return Err(Error::MissingTimestamp);
            }
            Some(raw.parse::<TimeWindow>()?)
        }
        None => None,
    };

    summarize_by(dataset, column, window)
}

/// 型付きの列と時間窓で集計
pub fn summarize_by<S>(dataset: &S, column: Column, window: Option<TimeWindow>) -> Result<SummaryMap>
where
    S: SummarySource + ?Sized,
{
    if dataset.is_empty() {
        return Err(Error::InvalidInput("Data cannot be empty".to_string()));
    }
    if !dataset.has_column(column) {
        return Err(Error::UnknownColumn(column.name().to_string()));
    }

    let with_anomalies = dataset.has_anomaly_annotations();
    let all_rows: Vec<usize> = (0..dataset.len()).collect();

    let summary = match window {
        None => SummaryMap::Grouped(summarize_rows(dataset, &all_rows, column, with_anomalies)),
        Some(window) => {
            if !dataset.has_column(Column::Timestamp) {
                return Err(Error::MissingTimestamp);
            }

            let mut buckets: Grouping<DateTime<Utc>> = Grouping::new();
            for row in all_rows {
                let start = window.bucket_start(dataset.row(row).reading.timestamp)?;
                buckets.push(start, row);
            }

            let mut buckets = buckets.into_groups();
            buckets.sort_by_key(|(start, _)| *start);

            SummaryMap::Windowed(
                buckets
                    .into_iter()
                    .map(|(start, rows)| {
                        (start, summarize_rows(dataset, &rows, column, with_anomalies))
                    })
                    .collect(),
            )
        }
    };

    debug!(
        group_by = %column,
        window = ?window.map(|w| w.to_string()),
        rows = dataset.len(),
        entries = summary.len(),
        "集計完了"
    );

    Ok(summary)
}

fn summarize_rows<S>(dataset: &S, rows: &[usize], column: Column, with_anomalies: bool) -> GroupedSummary
where
    S: SummarySource + ?Sized,
{
    let mut groups: Grouping<String> = Grouping::new();
    for &row in rows {
        if let Some(key) = column.key(&dataset.row(row)) {
            groups.push(key, row);
        }
    }

    GroupedSummary::from_entries(
        groups
            .into_groups()
            .into_iter()
            .map(|(key, members)| {
                let views: Vec<RowView<'_>> = members.iter().map(|&i| dataset.row(i)).collect();
                (key, summarize_group(&views, with_anomalies))
            })
            .collect(),
    )
}

/// 1グループ分の統計を計算（非有限値は欠損として数える）
fn summarize_group(rows: &[RowView<'_>], with_anomalies: bool) -> SummaryRecord {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.reading.value)
        .filter(|v| v.is_finite())
        .collect();
    let null_count = rows.len() - values.len();

    let total = rows.len() as f64;
    let quality_pct = Quality::ALL.map(|quality| {
        let matching = rows.iter().filter(|row| row.reading.quality == quality).count();
        matching as f64 / total * 100.0
    });

    let anomaly_rate = with_anomalies.then(|| {
        let flagged = rows.iter().filter(|row| row.is_anomaly()).count();
        flagged as f64 / total
    });

    SummaryRecord::new(
        ValueStats::from_values(&values),
        null_count,
        quality_pct,
        anomaly_rate,
    )
}
