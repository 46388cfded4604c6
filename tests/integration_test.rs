use std::fs;
use std::path::Path;

use weight_forecast::config::{ForecastConfig, ModelConfig};
use weight_forecast::pipeline;
use weight_forecast::persistence::PersistentModel;
use weight_forecast::WeightForecaster;
use tempfile::tempdir;

/// Writes a subject with a slow weight drift driven by calorie surplus.
fn write_subject(dir: &Path, name: &str, days: usize, start_weight: f64, age: f64, sex: f64) {
    let mut contents = String::from("date,age,sex,BMI,weight,consumed_cal,steps\n");
    let mut weight = start_weight;
    for day in 0..days {
        let calories = 2200.0 + 300.0 * ((day as f64) * 0.3).sin();
        weight += (calories - 2200.0) / 7700.0;
        let bmi = weight / (1.75 * 1.75);
        contents.push_str(&format!("day{},{},{},{:.3},{:.3},{:.1},{}\n",
                                   day, age, sex, bmi, weight, calories, 5000 + day));
    }
    fs::write(dir.join(format!("{}.csv", name)), contents).unwrap();
}

fn small_config(root: &Path) -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.data.dir = root.join("csv");
    config.model = ModelConfig {
        hidden_size: 6,
        num_layers: 2,
        dense_size: 8,
        dropout: 0.3,
    };
    config.training.epochs = 3;
    config.training.batch_size = 16;
    config.training.seed = Some(7);
    config.output.checkpoint = root.join("models/modelv1.weights.bin");
    config.output.curves_png = root.join("models/model_ver.png");
    config.output.forecast_png = root.join("models/forecast.png");
    config
}

#[test]
fn test_pipeline_end_to_end() {
    let root = tempdir().unwrap();
    let csv_dir = root.path().join("csv");
    fs::create_dir_all(&csv_dir).unwrap();
    write_subject(&csv_dir, "subject_a", 120, 72.0, 31.0, 1.0);
    write_subject(&csv_dir, "subject_b", 110, 58.0, 45.0, 0.0);
    write_subject(&csv_dir, "subject_short", 60, 80.0, 25.0, 1.0);

    let config = small_config(root.path());
    let report = pipeline::run(&config).unwrap();

    // 23 + 13 windows, the short subject contributes none
    assert!(!report.history.epochs.is_empty());
    assert!(report.history.epochs.len() <= 3);
    assert_eq!(report.history.val_loss().len(), report.history.epochs.len());

    assert_eq!(report.predictions.len(), 90);
    assert!(report.predictions.iter().all(|w| w.is_finite()));
    let lines = report.prediction_lines();
    assert!(lines[0].starts_with("Day 1: "));
    assert!(lines[89].ends_with(" kg"));

    // the checkpoint is written on the first epoch and is loadable
    assert!(report.checkpoint.exists());
    let (model, metadata, scaler) = WeightForecaster::load(&report.checkpoint).unwrap();
    assert_eq!(model.n_features(), 5);
    assert_eq!(model.forecast_steps(), 90);
    assert_eq!(metadata.hidden_size, 6);
    assert_eq!(scaler.and_then(|s| s.n_features()), Some(5));
}

#[test]
fn test_pipeline_without_enough_history() {
    let root = tempdir().unwrap();
    let csv_dir = root.path().join("csv");
    fs::create_dir_all(&csv_dir).unwrap();
    write_subject(&csv_dir, "only_short", 97, 70.0, 30.0, 0.0);

    let result = pipeline::run(&small_config(root.path()));
    assert!(matches!(result, Err(weight_forecast::ForecastError::NotEnoughData(_))));
}

#[test]
fn test_pipeline_missing_directory() {
    let root = tempdir().unwrap();
    let result = pipeline::run(&small_config(root.path()));
    assert!(matches!(result, Err(weight_forecast::ForecastError::Io(_))));
}
