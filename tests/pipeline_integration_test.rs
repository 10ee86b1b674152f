//! パイプライン全体の統合テスト

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::io::Write;
use telemetry_rs::analytics::summary::SummarySource;
use telemetry_rs::config::ConfigLoader;
use telemetry_rs::simulator::{TelemetrySimulator, SENSORS};
use telemetry_rs::{
    consolidate, detect, summarize, Batch, Pipeline, Quality, Reading, SummaryMap,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn simulated_batches(seed: u64, count: usize) -> Vec<Batch> {
    TelemetrySimulator::new(seed)
        .with_dropout_rate(0.0)
        .with_start_time(start())
        .batches(count, 30, 1.0)
}

fn temperature_batch(values: &[f64]) -> Batch {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            Reading::new(start() + Duration::seconds(i as i64), "temperature", Some(*v), "°C", Quality::Good)
        })
        .collect()
}

#[test]
fn test_consolidated_timestamps_non_decreasing() {
    let batches = simulated_batches(11, 4);
    let dataset = consolidate(&batches, true).unwrap();

    assert!(!dataset.is_empty());
    assert!(dataset
        .readings()
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[test]
fn test_consolidation_removes_simulated_duplicates() {
    let batches = simulated_batches(5, 3);
    let total: usize = batches.iter().map(Batch::len).sum();
    let dataset = consolidate(&batches, true).unwrap();

    assert!(dataset.len() <= total);
    let mut keys: Vec<_> = dataset
        .iter()
        .map(|r| (r.timestamp, r.sensor_id.clone()))
        .collect();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), dataset.len());
}

#[test]
fn test_dedup_idempotence() {
    let batches = simulated_batches(21, 1);
    let once = consolidate(&batches, true).unwrap();
    let twice = consolidate(&[Batch::from(once.clone())], true).unwrap();

    assert_eq!(once, twice);
}

#[test]
fn test_bad_quality_rows_retained() {
    let batches = simulated_batches(8, 3);
    let bad_in: usize = batches
        .iter()
        .flat_map(|b| b.readings())
        .filter(|r| r.quality == Quality::Bad)
        .count();
    let dataset = consolidate(&batches, false).unwrap();
    let bad_out = dataset.iter().filter(|r| r.quality == Quality::Bad).count();

    assert_eq!(bad_in, bad_out);
}

#[test]
fn test_outlier_scenario() {
    let values = [
        65.0, 66.0, 64.5, 65.5, 66.5, 65.0, 150.0, 66.0, 65.5, 64.0, 66.0, 65.0, 65.5, 66.5, 64.5,
    ];
    let dataset = consolidate(&[temperature_batch(&values)], true).unwrap();
    let annotated = detect(&dataset, "temperature", "zscore", 2.0).unwrap();

    let flagged: Vec<_> = annotated.anomalies().collect();
    assert!(!flagged.is_empty());
    assert!(flagged.iter().all(|row| row.reading.value.unwrap() > 100.0));
}

#[test]
fn test_zero_variance_input() {
    let dataset = consolidate(&[temperature_batch(&[42.0; 10])], true).unwrap();
    let annotated = detect(&dataset, "temperature", "zscore", 3.0).unwrap();

    assert!(annotated
        .iter()
        .all(|row| row.annotation.anomaly_score == 0.0 && !row.annotation.is_anomaly));
}

#[test]
fn test_detect_then_summarize_simulated_data() {
    let batches = simulated_batches(42, 3);
    let dataset = consolidate(&batches, true).unwrap();

    for method in ["zscore", "iqr", "rolling"] {
        let annotated = detect(&dataset, "temperature", method, 3.0).unwrap();
        assert_eq!(annotated.len(), dataset.len());

        let summary = summarize(&annotated, "sensor_id", None).unwrap();
        for sensor in &SENSORS {
            let record = summary.get(sensor.name).unwrap();
            let rate = record.anomaly_rate.unwrap();
            assert!((0.0..=1.0).contains(&rate));
            let pct = record.good_quality_pct + record.bad_quality_pct + record.uncertain_quality_pct;
            assert!((pct - 100.0).abs() < 1e-9);
        }
        // 対象外センサーは異常なし
        assert_eq!(summary.get("pressure").unwrap().anomaly_rate, Some(0.0));
    }
}

#[test]
fn test_summary_counts_cover_all_rows() {
    let dataset = consolidate(&simulated_batches(3, 2), true).unwrap();
    let summary = summarize(&dataset, "sensor", None).unwrap();

    let grouped = summary.as_grouped().unwrap();
    let rows: usize = grouped.iter().map(|(_, r)| r.total_rows()).sum();
    assert_eq!(rows, dataset.len());
    assert_eq!(grouped.len(), SENSORS.len());
}

#[test]
fn test_windowed_summary_buckets() {
    let dataset = consolidate(&simulated_batches(13, 1), true).unwrap();
    let summary = summarize(&dataset, "sensor_id", Some("10s")).unwrap();

    let SummaryMap::Windowed(buckets) = &summary else {
        panic!("expected windowed summary");
    };
    assert!(buckets.windows(2).all(|pair| pair[0].0 < pair[1].0));
    for (bucket, _) in buckets {
        assert_eq!(bucket.timestamp() % 10, 0);
        assert_eq!(bucket.timestamp_subsec_micros(), 0);
    }
    let rows: usize = buckets
        .iter()
        .flat_map(|(_, groups)| groups.iter().map(|(_, r)| r.total_rows()))
        .sum();
    assert_eq!(rows, dataset.len());
}

#[test]
fn test_summary_json_shape() {
    let dataset = consolidate(&[temperature_batch(&[1.0, 2.0, 3.0])], true).unwrap();
    assert!(!dataset.has_anomaly_annotations());

    let summary = summarize(&dataset, "sensor_id", Some("1h")).unwrap();
    let json = serde_json::to_value(&summary).unwrap();
    let record = &json["2025-01-01T00:00:00Z"]["temperature"];

    assert_eq!(record["count"], 3);
    assert_eq!(record["median"], 2.0);
    assert!(record.get("anomaly_rate").is_none());
}

#[test]
fn test_pipeline_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
        [detection]
        sensor_id = "temperature"
        method = "iqr"
        threshold = 1.5

        [summary]
        group_by = "quality"
        "#
    )
    .unwrap();

    let config = ConfigLoader::new()
        .load_from_file(Some(file.path()))
        .build()
        .unwrap();
    let report = Pipeline::from_config(&config)
        .unwrap()
        .run(&simulated_batches(99, 2))
        .unwrap();

    assert!(report.anomalies_flagged.is_some());
    assert!(report.summary.get("GOOD").is_some());
    assert!(report.dataset_rows > 0);
}

#[test]
fn test_pipeline_on_raw_json_batches() {
    let batches = simulated_batches(17, 2);
    let raw: Vec<serde_json::Value> = batches
        .iter()
        .map(|b| serde_json::to_value(b).unwrap())
        .collect();

    let typed = Pipeline::default().run(&batches).unwrap();
    let decoded = Pipeline::default().run_records(&raw).unwrap();

    assert_eq!(typed.dataset_rows, decoded.dataset_rows);
    let typed = typed.summary.as_grouped().unwrap();
    let decoded = decoded.summary.as_grouped().unwrap();
    assert!(typed.keys().eq(decoded.keys()));
    for (sensor, record) in typed.iter() {
        let other = decoded.get(sensor).unwrap();
        assert_eq!(record.count, other.count);
        assert_eq!(record.null_count, other.null_count);
        assert!((record.mean - other.mean).abs() < 1e-9);
    }
}
