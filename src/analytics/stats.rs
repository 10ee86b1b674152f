//! 統計ヘルパー
//!
//! 検知器と集計器が共有する記述統計。欠損値はここに渡す前に除外しておくこと。

use serde::{Deserialize, Serialize};

/// 算術平均（空なら None）
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// 標本標準偏差（n-1、2点未満なら None）
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(variance.sqrt())
}

/// 昇順ソート済みの値から線形補間で分位点を計算
///
/// 位置 `q * (n - 1)` の前後2点を補間する。
pub fn quantile_sorted(sorted_values: &[f64], q: f64) -> Option<f64> {
    if sorted_values.is_empty() {
        return None;
    }

    let position = q.clamp(0.0, 1.0) * (sorted_values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted_values[lower] + (sorted_values[upper] - sorted_values[lower]) * fraction)
}

/// 値をソートしたコピーを返す
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// 値の記述統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueStats {
    /// サンプル数
    pub count: usize,
    pub mean: f64,
    /// 標本標準偏差
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

impl ValueStats {
    /// 値のリストから統計を計算
    ///
    /// 値がない場合はすべて 0、1点のみの場合の標準偏差は 0 とする。
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let sorted = sorted(values);
        let count = sorted.len();

        Self {
            count,
            mean: mean(&sorted).unwrap_or(0.0),
            std: sample_std(&sorted).unwrap_or(0.0),
            min: sorted[0],
            max: sorted[count - 1],
            median: quantile_sorted(&sorted, 0.5).unwrap_or(0.0),
        }
    }
}

impl Default for ValueStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
            median: 0.0,
        }
    }
}
