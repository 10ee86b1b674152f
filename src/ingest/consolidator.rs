//! Batch Consolidation
//!
//! 複数バッチの統合・重複排除・時刻順ソート

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::hash::Hash;
use tracing::debug;

use super::types::{Batch, ConsolidatedDataset, Quality, Reading};
use crate::error::{Error, Result};

pub(crate) const EMPTY_BATCH_LIST: &str = "data_batches cannot be empty";
pub(crate) const ALL_BATCHES_EMPTY: &str = "All data batches are empty";

/// 完全一致判定用のレコード識別子
///
/// 欠損値同士は等しいものとして扱う。
#[derive(PartialEq, Eq, Hash)]
struct RecordIdentity<'a> {
    timestamp: DateTime<Utc>,
    sensor_id: &'a str,
    value: Option<u64>,
    unit: &'a str,
    quality: Quality,
}

impl<'a> RecordIdentity<'a> {
    fn of(reading: &'a Reading) -> Self {
        Self {
            timestamp: reading.timestamp,
            sensor_id: &reading.sensor_id,
            value: reading.value.map(f64::to_bits),
            unit: &reading.unit,
            quality: reading.quality,
        }
    }
}

/// バッチを統合してデータセットを作成
///
/// 空バッチは破棄され、残りはバッチ順・バッチ内順を保って連結される。
/// `validate` が真の場合、完全一致の重複と (timestamp, sensor_id) の重複を
/// 先勝ちで除去してから安定ソートする。偽の場合はソートのみ行う。
/// 品質フラグによる除外は行わない。
pub fn consolidate(batches: &[Batch], validate: bool) -> Result<ConsolidatedDataset> {
    if batches.is_empty() {
        return Err(Error::InvalidInput(EMPTY_BATCH_LIST.to_string()));
    }

    let non_empty: Vec<&Batch> = batches.iter().filter(|b| !b.is_empty()).collect();
    if non_empty.is_empty() {
        return Err(Error::InvalidInput(ALL_BATCHES_EMPTY.to_string()));
    }

    let mut merged: Vec<Reading> = non_empty
        .iter()
        .flat_map(|batch| batch.readings().iter().cloned())
        .collect();
    let merged_len = merged.len();

    if validate {
        let keep = first_occurrences(&merged, RecordIdentity::of);
        merged = retain_marked(merged, keep);
        let exact_removed = merged_len - merged.len();

        let keep = first_occurrences(&merged, |r| (r.timestamp, r.sensor_id.as_str()));
        let before_key_dedup = merged.len();
        merged = retain_marked(merged, keep);

        debug!(
            batches = batches.len(),
            skipped_empty = batches.len() - non_empty.len(),
            exact_duplicates = exact_removed,
            key_duplicates = before_key_dedup - merged.len(),
            "バッチ統合: 重複を除去"
        );
    }

    // sort_by_key は安定ソート
    merged.sort_by_key(|r| r.timestamp);

    debug!(
        input_records = merged_len,
        output_records = merged.len(),
        validate,
        "バッチ統合完了"
    );

    Ok(ConsolidatedDataset::from_readings(merged))
}

/// 各レコードがそのキーの初出かどうかを返す
fn first_occurrences<'a, K, F>(readings: &'a [Reading], key: F) -> Vec<bool>
where
    K: Hash + Eq,
    F: Fn(&'a Reading) -> K,
{
    let mut seen = HashSet::with_capacity(readings.len());
    readings.iter().map(|r| seen.insert(key(r))).collect()
}

fn retain_marked(readings: Vec<Reading>, keep: Vec<bool>) -> Vec<Reading> {
    readings
        .into_iter()
        .zip(keep)
        .filter_map(|(reading, keep)| keep.then_some(reading))
        .collect()
}
