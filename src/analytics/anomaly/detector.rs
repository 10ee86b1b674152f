//! Anomaly Detector Implementation
//!
//! 異常検知器の実装

use tracing::{debug, info};

use super::types::{AnnotatedDataset, AnnotatedReading, Annotation, DetectionMethod, PointScore};
use crate::analytics::stats;
use crate::error::{Error, Result};
use crate::ingest::ConsolidatedDataset;

/// 移動統計ウィンドウの下限
pub const MIN_ROLLING_WINDOW: usize = 5;
/// 移動統計ウィンドウの上限
pub const MAX_ROLLING_WINDOW: usize = 20;

/// 既定の閾値
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// 統計量計算に必要な最小有効値数
const MIN_VALID_POINTS: usize = 2;

/// 有効値数から移動統計ウィンドウ幅を決定
pub fn rolling_window_size(valid_count: usize) -> usize {
    (valid_count / 10).clamp(MIN_ROLLING_WINDOW, MAX_ROLLING_WINDOW)
}

/// 異常検知器
#[derive(Debug, Clone, PartialEq)]
pub struct AnomalyDetector {
    /// 検知アルゴリズム
    method: DetectionMethod,
    /// 感度（手法ごとに解釈が異なる）
    threshold: f64,
}

impl AnomalyDetector {
    /// 新しい異常検知器を作成
    pub fn new(method: DetectionMethod, threshold: f64) -> Self {
        Self { method, threshold }
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// データセット中の1センサーを評価し、全行に検知結果を付与する
    ///
    /// 対象外センサーの行は既定値（非異常・スコア0・手法名空）になる。
    pub fn detect(&self, dataset: &ConsolidatedDataset, sensor_id: &str) -> Result<AnnotatedDataset> {
        if !dataset.contains_sensor(sensor_id) {
            return Err(Error::UnknownSensor(sensor_id.to_string()));
        }

        let series: Vec<Option<f64>> = dataset
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .map(|r| r.value)
            .collect();

        let scores = self.score_series(sensor_id, &series)?;
        let mut scores = scores.into_iter();

        let rows: Vec<AnnotatedReading> = dataset
            .iter()
            .map(|reading| {
                let annotation = if reading.sensor_id == sensor_id {
                    let point = scores.next().unwrap_or_default();
                    Annotation::scored(point, self.method)
                } else {
                    Annotation::default()
                };
                AnnotatedReading {
                    reading: reading.clone(),
                    annotation,
                }
            })
            .collect();

        let annotated = AnnotatedDataset::from_rows(rows);
        info!(
            sensor = sensor_id,
            method = %self.method,
            threshold = self.threshold,
            points = series.len(),
            anomalies = annotated.anomaly_count(),
            "異常検知完了"
        );

        Ok(annotated)
    }

    /// 時系列（欠損を含む）をスコアリング
    ///
    /// 戻り値は入力と同じ長さで、欠損値の位置は常にスコア0・非異常。
    /// 非有限値（NaN・無限大）は欠損として扱う。
    pub fn score_series(&self, sensor_id: &str, series: &[Option<f64>]) -> Result<Vec<PointScore>> {
        let series: Vec<Option<f64>> = series.iter().map(|v| v.filter(|x| x.is_finite())).collect();
        let valid: Vec<f64> = series.iter().flatten().copied().collect();

        if valid.len() < MIN_VALID_POINTS {
            return Err(self.insufficient(sensor_id, MIN_VALID_POINTS, valid.len()));
        }

        match self.method {
            DetectionMethod::ZScore => Ok(self.detect_zscore(&series, &valid)),
            DetectionMethod::Iqr => Ok(self.detect_iqr(&series, &valid)),
            DetectionMethod::Rolling => {
                let window = rolling_window_size(valid.len());
                if valid.len() < window {
                    return Err(self.insufficient(sensor_id, window, valid.len()));
                }
                Ok(self.detect_rolling(&series, &valid, window))
            }
        }
    }

    fn insufficient(&self, sensor_id: &str, required: usize, got: usize) -> Error {
        Error::InsufficientData {
            sensor: sensor_id.to_string(),
            method: self.method.as_str().to_string(),
            required,
            got,
        }
    }

    /// Z-スコア法による異常検知
    fn detect_zscore(&self, series: &[Option<f64>], valid: &[f64]) -> Vec<PointScore> {
        let mean = stats::mean(valid).unwrap_or(0.0);
        let std_dev = stats::sample_std(valid).unwrap_or(0.0);

        if std_dev < f64::EPSILON {
            debug!("分散ゼロ: 全スコアを0とする");
            return vec![PointScore::default(); series.len()];
        }

        series
            .iter()
            .map(|value| match value {
                Some(x) => {
                    let z_score = (x - mean).abs() / std_dev;
                    PointScore::new(z_score, z_score > self.threshold)
                }
                None => PointScore::default(),
            })
            .collect()
    }

    /// IQR法による異常検知
    fn detect_iqr(&self, series: &[Option<f64>], valid: &[f64]) -> Vec<PointScore> {
        let sorted = stats::sorted(valid);
        let q1 = stats::quantile_sorted(&sorted, 0.25).unwrap_or(0.0);
        let q3 = stats::quantile_sorted(&sorted, 0.75).unwrap_or(0.0);
        let iqr = q3 - q1;

        if iqr < f64::EPSILON {
            debug!("IQRゼロ: 全スコアを0とする");
            return vec![PointScore::default(); series.len()];
        }

        let lower_bound = q1 - self.threshold * iqr;
        let upper_bound = q3 + self.threshold * iqr;

        series
            .iter()
            .map(|value| match *value {
                Some(x) => {
                    let distance = (lower_bound - x).max(0.0) + (x - upper_bound).max(0.0);
                    PointScore::new(distance / iqr, x < lower_bound || x > upper_bound)
                }
                None => PointScore::default(),
            })
            .collect()
    }

    /// 中心化移動平均・移動標準偏差による異常検知
    ///
    /// 端点ではウィンドウを縮めて計算する。局所標準偏差が0または未定義の場合は
    /// 全体の標準偏差、それも0なら1.0で代用する。
    fn detect_rolling(&self, series: &[Option<f64>], valid: &[f64], window: usize) -> Vec<PointScore> {
        let fallback_std = stats::sample_std(valid)
            .filter(|s| *s >= f64::EPSILON)
            .unwrap_or(1.0);
        let len = series.len();
        let trailing = (window - 1) / 2;

        series
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let Some(x) = value else {
                    return PointScore::default();
                };

                let end = (i + 1 + trailing).min(len);
                let start = (i + 1 + trailing).saturating_sub(window);
                let local: Vec<f64> = series[start..end].iter().flatten().copied().collect();

                let local_mean = stats::mean(&local).unwrap_or(*x);
                let local_std = stats::sample_std(&local)
                    .filter(|s| *s >= f64::EPSILON)
                    .unwrap_or(fallback_std);

                let score = (x - local_mean).abs() / local_std;
                PointScore::new(score, score > self.threshold)
            })
            .collect()
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DetectionMethod::ZScore, DEFAULT_THRESHOLD)
    }
}

/// 手法名を指定して異常検知を実行
///
/// センサーの存在を先に確認し、その後に手法名を解決する。
pub fn detect(
    dataset: &ConsolidatedDataset,
    sensor_id: &str,
    method: &str,
    threshold: f64,
) -> Result<AnnotatedDataset> {
    if !dataset.contains_sensor(sensor_id) {
        return Err(Error::UnknownSensor(sensor_id.to_string()));
    }
    let method: DetectionMethod = method.parse()?;
    AnomalyDetector::new(method, threshold).detect(dataset, sensor_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{consolidate, Batch, Quality, Reading};
    use chrono::{Duration, TimeZone, Utc};

    fn dataset(sensor: &str, values: &[Option<f64>]) -> ConsolidatedDataset {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let batch: Batch = values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let quality = if v.is_some() { Quality::Good } else { Quality::Bad };
                Reading::new(start + Duration::seconds(i as i64), sensor, *v, "°C", quality)
            })
            .collect();
        consolidate(&[batch], true).unwrap()
    }

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn test_window_size_clamped() {
        assert_eq!(rolling_window_size(3), 5);
        assert_eq!(rolling_window_size(60), 6);
        assert_eq!(rolling_window_size(1000), 20);
    }

    #[test]
    fn test_zscore_zero_variance() {
        let data = dataset("temperature", &some(&[65.0; 10]));
        let result = detect(&data, "temperature", "zscore", 3.0).unwrap();

        assert_eq!(result.anomaly_count(), 0);
        assert!(result.iter().all(|r| r.annotation.anomaly_score == 0.0));
    }

    #[test]
    fn test_zscore_flags_outlier() {
        let values = [
            65.0, 66.0, 64.5, 65.5, 66.5, 65.0, 150.0, 66.0, 65.5, 64.0, 66.0, 65.0, 65.5, 66.5,
            64.5,
        ];
        let data = dataset("temperature", &some(&values));
        let result = detect(&data, "temperature", "zscore", 2.0).unwrap();

        let flagged: Vec<f64> = result.anomalies().filter_map(|r| r.reading.value).collect();
        assert_eq!(flagged, vec![150.0]);
    }

    #[test]
    fn test_zscore_exact_scores() {
        // mean 2.5, sample std sqrt(5/3)
        let data = dataset("s", &some(&[1.0, 2.0, 3.0, 4.0]));
        let result = detect(&data, "s", "zscore", 3.0).unwrap();
        let std = (5.0f64 / 3.0).sqrt();

        let first = result.rows()[0].annotation.anomaly_score;
        assert!((first - 1.5 / std).abs() < 1e-12);
    }

    #[test]
    fn test_missing_values_score_zero() {
        let data = dataset("s", &[Some(1.0), None, Some(2.0), Some(3.0), None]);
        let result = detect(&data, "s", "zscore", 0.1).unwrap();

        for row in result.iter().filter(|r| r.reading.value.is_none()) {
            assert_eq!(row.annotation.anomaly_score, 0.0);
            assert!(!row.annotation.is_anomaly);
            assert_eq!(row.annotation.detection_method, "zscore");
        }
    }

    #[test]
    fn test_other_sensors_keep_default_annotation() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let batch: Batch = [65.0, 66.0, 64.5, 150.0, 65.5]
            .iter()
            .enumerate()
            .flat_map(|(i, v)| {
                let at = start + Duration::seconds(i as i64);
                [
                    Reading::new(at, "temperature", Some(*v), "°C", Quality::Good),
                    Reading::new(at, "pressure", Some(1000.0 * *v), "kPa", Quality::Good),
                ]
            })
            .collect();
        let data = consolidate(&[batch], true).unwrap();
        let result = detect(&data, "temperature", "zscore", 1.0).unwrap();

        assert_eq!(result.len(), 10);
        for row in result.iter().filter(|r| r.reading.sensor_id == "pressure") {
            assert!(!row.annotation.is_anomaly);
            assert_eq!(row.annotation.anomaly_score, 0.0);
            assert_eq!(row.annotation.detection_method, "");
        }
        for row in result.iter().filter(|r| r.reading.sensor_id == "temperature") {
            assert_eq!(row.annotation.detection_method, "zscore");
        }
        assert_eq!(result.anomaly_count(), 1);
    }

    #[test]
    fn test_non_finite_values_treated_as_missing() {
        let values = [
            Some(1.0),
            Some(f64::NAN),
            Some(2.0),
            Some(f64::INFINITY),
            Some(3.0),
            Some(4.0),
            Some(5.0),
            Some(6.0),
        ];
        let data = dataset("s", &values);

        for method in ["zscore", "iqr", "rolling"] {
            let result = detect(&data, "s", method, 1.0).unwrap();
            assert!(result.iter().all(|r| r.annotation.anomaly_score.is_finite()));
            for i in [1, 3] {
                assert_eq!(result.rows()[i].annotation.anomaly_score, 0.0);
                assert!(!result.rows()[i].annotation.is_anomaly);
            }
        }

        // 有効値は 1..=6 のみ: mean 3.5, sample std sqrt(3.5)
        let result = detect(&data, "s", "zscore", 3.0).unwrap();
        let std = 3.5f64.sqrt();
        assert!((result.rows()[0].annotation.anomaly_score - 2.5 / std).abs() < 1e-12);
    }

    #[test]
    fn test_only_non_finite_values_insufficient() {
        let data = dataset("s", &[Some(f64::NAN), Some(1.0), Some(f64::NEG_INFINITY)]);
        let err = detect(&data, "s", "zscore", 3.0).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 2, got: 1, .. }));
    }

    #[test]
    fn test_insufficient_valid_points() {
        let data = dataset("s", &[None, None, Some(65.0), None, None]);
        let err = detect(&data, "s", "zscore", 3.0).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 2, got: 1, .. }));
    }

    #[test]
    fn test_iqr_bounds_and_score() {
        // Q1 = 3.25, Q3 = 7.75, IQR = 4.5 -> upper = 14.5 at threshold 1.5
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 23.5];
        let data = dataset("s", &some(&values));
        let result = detect(&data, "s", "iqr", 1.5).unwrap();

        let last = &result.rows()[9].annotation;
        assert!(last.is_anomaly);
        assert!((last.anomaly_score - 2.0).abs() < 1e-12);
        assert_eq!(result.anomaly_count(), 1);
        assert_eq!(result.rows()[0].annotation.anomaly_score, 0.0);
    }

    #[test]
    fn test_iqr_zero_range() {
        let data = dataset("s", &some(&[5.0, 5.0, 5.0, 5.0, 100.0]));
        let result = detect(&data, "s", "iqr", 1.5).unwrap();
        assert_eq!(result.anomaly_count(), 0);
        assert!(result.iter().all(|r| r.annotation.anomaly_score == 0.0));
    }

    #[test]
    fn test_rolling_insufficient_for_window() {
        let data = dataset("temperature", &some(&[65.0, 66.0, 67.0]));
        let err = detect(&data, "temperature", "rolling", 3.0).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { required: 5, got: 3, .. }));
    }

    #[test]
    fn test_rolling_flags_spike() {
        let mut values = vec![10.0, 10.5, 9.5, 10.2, 9.8, 10.1, 9.9, 10.3, 9.7, 10.0];
        values.extend([10.4, 9.6, 10.0, 50.0, 10.1, 9.9, 10.2, 9.8, 10.0, 10.1]);
        let data = dataset("s", &some(&values));
        let result = detect(&data, "s", "rolling", 1.5).unwrap();

        let spike = &result.rows()[13].annotation;
        assert!(spike.is_anomaly);
        assert_eq!(spike.detection_method, "rolling");
        assert!(result.iter().all(|r| r.annotation.anomaly_score >= 0.0));
    }

    #[test]
    fn test_rolling_constant_series_uses_unit_std() {
        let data = dataset("s", &some(&[4.0; 6]));
        let result = detect(&data, "s", "rolling", 3.0).unwrap();
        assert_eq!(result.anomaly_count(), 0);
        assert!(result.iter().all(|r| r.annotation.anomaly_score == 0.0));
    }

    #[test]
    fn test_unknown_sensor_checked_before_method() {
        let data = dataset("temperature", &some(&[1.0, 2.0]));
        assert!(matches!(
            detect(&data, "nonexistent", "bogus", 3.0),
            Err(Error::UnknownSensor(_))
        ));
        assert!(matches!(
            detect(&data, "temperature", "bogus", 3.0),
            Err(Error::UnknownMethod(_))
        ));
    }
}
