//! Telemetry Simulator
//!
//! 産業用センサーの取得データを模擬する。欠損値・スパイク・重複・順序入れ替え・
//! タイムスタンプの揺らぎ・接続断を意図的に発生させる。

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ingest::{Batch, Quality, Reading};

/// 欠損値の発生確率
const MISSING_RATE: f64 = 0.03;
/// スパイクの発生確率
const SPIKE_RATE: f64 = 0.01;
/// スパイクの大きさ（分散の倍数）
const SPIKE_MAGNITUDE: f64 = 10.0;
/// 重複レコードの発生確率
const DUPLICATE_RATE: f64 = 0.005;
/// タイムスタンプ揺らぎ（取得間隔に対する割合）
const JITTER_RATIO: f64 = 0.1;
/// 接続断の既定発生確率
pub const DEFAULT_DROPOUT_RATE: f64 = 0.07;

/// 取得失敗（接続断）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Simulated connection dropout at read #{read}")]
pub struct AcquisitionError {
    /// 失敗した読み取り番号
    pub read: u64,
}

/// センサープロファイル
#[derive(Debug, Clone, PartialEq)]
pub struct SensorProfile {
    pub name: &'static str,
    pub baseline: f64,
    pub variance: f64,
    pub unit: &'static str,
}

/// 模擬対象のセンサー群
pub const SENSORS: [SensorProfile; 4] = [
    SensorProfile {
        name: "temperature",
        baseline: 65.0,
        variance: 2.5,
        unit: "°C",
    },
    SensorProfile {
        name: "pressure",
        baseline: 101.3,
        variance: 1.2,
        unit: "kPa",
    },
    SensorProfile {
        name: "vibration",
        baseline: 0.5,
        variance: 0.15,
        unit: "mm/s",
    },
    SensorProfile {
        name: "flow_rate",
        baseline: 15.2,
        variance: 0.8,
        unit: "L/min",
    },
];

/// 不安定な取得元を模擬するシミュレータ
#[derive(Debug, Clone)]
pub struct TelemetrySimulator {
    rng: StdRng,
    dropout_rate: f64,
    start_time: DateTime<Utc>,
    read_count: u64,
}

impl TelemetrySimulator {
    /// シード指定で作成（同じシード・開始時刻なら同じデータを生成）
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            dropout_rate: DEFAULT_DROPOUT_RATE,
            start_time: Utc::now(),
            read_count: 0,
        }
    }

    /// 接続断の発生確率を設定（0.0-1.0 に丸める）
    pub fn with_dropout_rate(mut self, rate: f64) -> Self {
        self.dropout_rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        self
    }

    /// 各バッチの基準時刻を設定
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn dropout_rate(&self) -> f64 {
        self.dropout_rate
    }

    /// 成功した読み取り回数
    pub fn read_count(&self) -> u64 {
        self.read_count
    }

    /// 1バッチ分のセンサー値を読み取る
    ///
    /// `duration_seconds / interval_seconds` 時点 × 全センサーのレコードを生成する。
    pub fn read_sensors(
        &mut self,
        duration_seconds: u32,
        interval_seconds: f64,
    ) -> Result<Batch, AcquisitionError> {
        if self.rng.gen::<f64>() < self.dropout_rate {
            return Err(AcquisitionError {
                read: self.read_count,
            });
        }

        let num_readings = if interval_seconds > 0.0 {
            (f64::from(duration_seconds) / interval_seconds) as usize
        } else {
            0
        };

        let mut records: Vec<Reading> = Vec::with_capacity(num_readings * SENSORS.len());
        for i in 0..num_readings {
            let offset = i as f64 * interval_seconds;
            let jitter = self
                .rng
                .gen_range(-interval_seconds * JITTER_RATIO..=interval_seconds * JITTER_RATIO);
            let timestamp = self.start_time + micros(offset + jitter);

            for sensor in &SENSORS {
                let (value, quality) = self.sample_value(sensor);
                records.push(Reading::new(timestamp, sensor.name, value, sensor.unit, quality));

                if self.rng.gen::<f64>() < DUPLICATE_RATE {
                    let duplicate = records[records.len() - 1].clone();
                    records.push(duplicate);
                }
            }
        }

        self.read_count += 1;
        self.swap_some(&mut records);

        debug!(
            read = self.read_count,
            records = records.len(),
            "センサー読み取り完了"
        );

        Ok(Batch::new(records))
    }

    /// 複数バッチを読み取り、失敗したバッチは除外する
    pub fn batches(
        &mut self,
        num_batches: usize,
        batch_duration: u32,
        batch_interval: f64,
    ) -> Vec<Batch> {
        let mut batches = Vec::with_capacity(num_batches);
        for i in 0..num_batches {
            match self.read_sensors(batch_duration, batch_interval) {
                Ok(batch) => batches.push(batch),
                Err(e) => {
                    warn!("バッチ {}/{} 取得失敗: {}", i + 1, num_batches, e);
                }
            }
        }
        batches
    }

    fn sample_value(&mut self, sensor: &SensorProfile) -> (Option<f64>, Quality) {
        if self.rng.gen::<f64>() < MISSING_RATE {
            (None, Quality::Bad)
        } else if self.rng.gen::<f64>() < SPIKE_RATE {
            let sign = if self.rng.gen::<bool>() { 1.0 } else { -1.0 };
            let value = sensor.baseline + sign * sensor.variance * SPIKE_MAGNITUDE;
            (Some(value), Quality::Uncertain)
        } else {
            let noise: f64 = self.rng.sample(StandardNormal);
            let value = sensor.baseline + noise * sensor.variance;
            (Some(value), Quality::Good)
        }
    }

    /// 到着順の乱れを模擬して一部のレコードを入れ替える
    fn swap_some(&mut self, records: &mut [Reading]) {
        if records.len() <= 10 {
            return;
        }
        let max_swaps = (records.len() / 10).min(5);
        let amount = self.rng.gen_range(1..=max_swaps);
        let picked = index::sample(&mut self.rng, records.len(), amount).into_vec();
        for pair in picked.chunks_exact(2) {
            records.swap(pair[0], pair[1]);
        }
    }
}

fn micros(seconds: f64) -> Duration {
    Duration::microseconds((seconds * 1_000_000.0).round() as i64)
}
