//! Raw record decoding
//!
//! JSON で受け取った未検証バッチを型付きバッチへ変換する。

use serde_json::{Map, Value};
use tracing::debug;

use super::consolidator::{consolidate, ALL_BATCHES_EMPTY, EMPTY_BATCH_LIST};
use super::types::{Batch, ConsolidatedDataset, Reading};
use crate::error::{Error, Result};

/// 全レコードに必須のフィールド
pub const REQUIRED_FIELDS: [&str; 5] = ["timestamp", "sensor_id", "value", "unit", "quality"];

/// JSON バッチ列を検証・デコードして統合する
///
/// 各バッチはレコードオブジェクトの配列でなければならない。空配列は破棄され、
/// 残ったバッチの全レコードが必須フィールドを持つ必要がある（`value: null` は
/// 欠損値として有効）。
pub fn consolidate_records(batches: &[Value], validate: bool) -> Result<ConsolidatedDataset> {
    if batches.is_empty() {
        return Err(Error::InvalidInput(EMPTY_BATCH_LIST.to_string()));
    }

    let shaped = batches
        .iter()
        .enumerate()
        .map(|(index, batch)| record_objects(batch, index))
        .collect::<Result<Vec<_>>>()?;

    if shaped.iter().all(|records| records.is_empty()) {
        return Err(Error::InvalidInput(ALL_BATCHES_EMPTY.to_string()));
    }

    let decoded = shaped
        .iter()
        .enumerate()
        .filter(|(_, records)| !records.is_empty())
        .map(|(index, records)| decode_records(records, index))
        .collect::<Result<Vec<Batch>>>()?;

    debug!(
        received = batches.len(),
        decoded = decoded.len(),
        "JSONバッチをデコード"
    );

    consolidate(&decoded, validate)
}

/// 単一の JSON バッチを型付きバッチへ変換する
pub fn decode_batch(batch: &Value) -> Result<Batch> {
    let records = record_objects(batch, 0)?;
    decode_records(&records, 0)
}

/// バッチがオブジェクト配列であることを確認する
fn record_objects(batch: &Value, index: usize) -> Result<Vec<&Map<String, Value>>> {
    let items = batch.as_array().ok_or_else(|| {
        Error::InvalidInput(format!(
            "Batch {} is not a sequence of reading records",
            index
        ))
    })?;

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            item.as_object().ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Batch {} record {} is not a reading record",
                    index, position
                ))
            })
        })
        .collect()
}

fn decode_records(records: &[&Map<String, Value>], index: usize) -> Result<Batch> {
    let mut missing: Vec<&str> = Vec::new();
    for record in records {
        for field in missing_fields(record) {
            if !missing.contains(&field) {
                missing.push(field);
            }
        }
    }
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Missing required fields in batch {}: {:?}",
            index, missing
        )));
    }

    records
        .iter()
        .enumerate()
        .map(|(position, record)| {
            serde_json::from_value::<Reading>(Value::Object((*record).clone())).map_err(|e| {
                Error::InvalidInput(format!(
                    "Batch {} record {} could not be decoded: {}",
                    index, position, e
                ))
            })
        })
        .collect()
}

fn missing_fields(record: &Map<String, Value>) -> Vec<&'static str> {
    REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| match *field {
            "sensor_id" => !record.contains_key("sensor_id") && !record.contains_key("sensor"),
            other => !record.contains_key(other),
        })
        .collect()
}
