use ndarray::Array2;
use tempfile::tempdir;
use weight_forecast::config::ModelConfig;
use weight_forecast::training::CheckpointConfig;
use weight_forecast::*;

fn model(forecast_steps: usize) -> WeightForecaster {
    let config = ModelConfig {
        hidden_size: 4,
        num_layers: 1,
        dense_size: 6,
        dropout: 0.0,
    };
    WeightForecaster::new(3, 5, forecast_steps, &config)
}

fn dataset() -> WindowSet {
    let series = Array2::from_shape_fn((40, 3), |(t, f)| {
        0.5 + 0.4 * ((t as f64) * 0.2 + f as f64).sin()
    });
    create_multi_step_sequences(&series, 5, 4, 1).unwrap()
}

/// With a zero learning rate the validation loss never moves, so only the
/// first epoch counts as an improvement.
#[test]
fn test_early_stopping_after_patience() {
    let (train, validation) = dataset().split_validation(0.25);

    let config = TrainingConfig {
        epochs: 50,
        batch_size: 8,
        early_stopping: Some(EarlyStoppingConfig {
            patience: 3,
            min_delta: 0.0,
            restore_best_weights: true,
            monitor: EarlyStoppingMetric::ValidationLoss,
        }),
        seed: Some(1),
        ..TrainingConfig::default()
    };
    let mut trainer = create_forecast_trainer(model(4), 0.0).with_config(config);
    let history = trainer.train(&train, Some(&validation)).unwrap();

    assert_eq!(history.epochs.len(), 4);
    assert_eq!(history.best_epoch, Some(0));
    assert_eq!(history.stopped_epoch, Some(3));
    assert!(history.val_loss().iter().all(|l| (l - history.val_loss()[0]).abs() < 1e-12));
}

#[test]
fn test_min_delta_blocks_small_improvements() {
    let mut stopper = EarlyStopper::new(EarlyStoppingConfig {
        patience: 2,
        min_delta: 0.1,
        restore_best_weights: false,
        monitor: EarlyStoppingMetric::TrainLoss,
    });
    let snapshot = model(2);

    assert!(!stopper.update(0, 1.0, &snapshot));
    // 0.95 is better but not by more than min_delta
    assert!(!stopper.update(1, 0.95, &snapshot));
    assert!(stopper.update(2, 0.92, &snapshot));

    assert_eq!(stopper.best_score(), 1.0);
    assert_eq!(stopper.best_epoch(), Some(0));
    assert_eq!(stopper.stopped_epoch(), Some(2));
    assert!(stopper.take_best_weights().is_none());
}

#[test]
fn test_best_weights_are_kept() {
    let mut stopper = EarlyStopper::new(EarlyStoppingConfig {
        patience: 2,
        min_delta: 0.0,
        restore_best_weights: true,
        monitor: EarlyStoppingMetric::ValidationLoss,
    });
    let window = Array2::from_elem((5, 3), 0.3);
    let mut first = model(2);
    let mut second = model(2);
    let mut third = model(2);
    first.eval();
    second.eval();
    third.eval();

    assert!(!stopper.update(0, 0.8, &first));
    assert!(!stopper.update(1, 0.4, &second));
    assert!(!stopper.update(2, 0.6, &third));
    assert!(stopper.update(3, 0.5, &third));

    let mut best = stopper.take_best_weights().unwrap();
    assert_eq!(
        best.predict_window(window.view()),
        second.predict_window(window.view())
    );
    assert_eq!(stopper.best_epoch(), Some(1));
}

/// Training pulls the output towards 10 while validation wants 0, so every
/// epoch after the first is worse and the first epoch's weights must come back.
#[test]
fn test_trainer_restores_best_epoch_weights() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("best.bin");
    let (mut train, mut validation) = dataset().split_validation(0.25);
    train.targets.fill(10.0);
    validation.targets.fill(0.0);

    let config = TrainingConfig {
        epochs: 20,
        batch_size: 4,
        early_stopping: Some(EarlyStoppingConfig {
            patience: 3,
            min_delta: 0.0,
            restore_best_weights: true,
            monitor: EarlyStoppingMetric::ValidationLoss,
        }),
        checkpoint: Some(CheckpointConfig {
            path: path.clone(),
            model_name: "restore-test".to_string(),
            monitor: EarlyStoppingMetric::ValidationLoss,
            scaler: None,
        }),
        seed: Some(5),
        ..TrainingConfig::default()
    };
    let mut trainer = create_forecast_trainer(model(4), 0.05).with_config(config);
    trainer.train(&train, Some(&validation)).unwrap();

    let val_loss = trainer.history.val_loss();
    assert_eq!(trainer.history.best_epoch, Some(0));
    assert_eq!(trainer.history.stopped_epoch, Some(3));
    assert!(val_loss[3] > val_loss[0]);

    // the restored model scores exactly what the best epoch scored
    let restored = trainer.evaluate(&validation);
    assert_eq!(restored.loss, val_loss[0]);

    // and matches the snapshot written at that epoch
    let (mut snapshot, metadata, _) = WeightForecaster::load(&path).unwrap();
    assert_eq!(metadata.epoch, 0);
    let window = validation.input(0).to_owned();
    assert_eq!(
        trainer.model.predict_window(window.view()),
        snapshot.predict_window(window.view())
    );
}

#[test]
fn test_without_early_stopping_runs_all_epochs() {
    let data = dataset();
    let config = TrainingConfig {
        epochs: 4,
        batch_size: 16,
        early_stopping: None,
        seed: Some(3),
        ..TrainingConfig::default()
    };
    let mut trainer = create_forecast_trainer(model(4), 0.01).with_config(config);
    trainer.train(&data, None).unwrap();

    let history = &trainer.history;
    assert_eq!(history.epochs.len(), 4);
    assert!(history.stopped_epoch.is_none());
    assert!(history.val_loss().is_empty());
    assert!(history.loss().iter().all(|l| l.is_finite()));
    assert_eq!(trainer.get_latest_metrics().map(|m| m.epoch), Some(3));
}

#[test]
fn test_checkpoint_tracks_lowest_train_loss() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("models/best.bin");
    let config = TrainingConfig {
        epochs: 5,
        batch_size: 8,
        early_stopping: None,
        checkpoint: Some(CheckpointConfig {
            path: path.clone(),
            model_name: "checkpoint-test".to_string(),
            monitor: EarlyStoppingMetric::TrainLoss,
            scaler: None,
        }),
        seed: Some(11),
        ..TrainingConfig::default()
    };
    let mut trainer = create_forecast_trainer(model(4), 0.01).with_config(config);
    let losses = trainer.train(&dataset(), None).unwrap().loss();

    let (best_epoch, best_loss) = losses
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |acc, (i, &l)| if l < acc.1 { (i, l) } else { acc });

    let (_, metadata, scaler) = WeightForecaster::load(&path).unwrap();
    assert_eq!(metadata.model_name, "checkpoint-test");
    assert_eq!(metadata.epoch, best_epoch);
    assert_eq!(metadata.monitored_loss, Some(best_loss));
    assert!(scaler.is_none());
}

#[test]
fn test_empty_training_set_is_an_error() {
    let mut trainer = create_forecast_trainer(model(4), 0.01);
    let empty = WindowSet::empty(5, 3, 4);
    assert!(trainer.train(&empty, None).is_err());
}
