//! End-to-end tests of the library pipeline
//!
//! Preprocess a synthetic customer table, train both families, and serve
//! predictions from the persisted artifact pairs.

mod common;

use approx::assert_relative_eq;
use rchurn::data::preprocess;
use rchurn::model::{BoostedTrees, LogisticModel, TreeNode};
use rchurn::persistence::TrainingInfo;
use rchurn::schema::FEATURE_COUNT;
use rchurn::{
    ArtifactPair, ChurnError, ChurnLabel, CustomerRecord, InferenceService, ModelFamily,
    PipelineConfig, StandardScaler, TrainedClassifier, Trainer,
};
use std::path::Path;
use tempfile::TempDir;

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn quick_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.gradient_boosting.n_estimators = 25;
    config.gradient_boosting.max_depth = 3;
    config
}

/// Raw table preprocessed into `<dir>/processed`
fn prepared_workspace(rows: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("telco.csv");
    common::write_telco_csv(&raw, rows, 50);
    preprocess::run(&raw, dir.path().join("processed"), &PipelineConfig::default().preprocess)
        .unwrap();
    dir
}

/// Scaler centring tenure and monthly charges, identity elsewhere
fn reference_scaler() -> StandardScaler {
    let mut means = vec![0.0; FEATURE_COUNT];
    let mut scales = vec![1.0; FEATURE_COUNT];
    means[4] = 32.0;
    scales[4] = 24.0;
    means[17] = 64.76;
    scales[17] = 30.0;
    StandardScaler {
        means,
        scales,
        n_samples_seen: 1000,
    }
}

fn reference_logistic() -> ArtifactPair {
    let mut coefficients = vec![0.0; FEATURE_COUNT];
    coefficients[4] = -0.8;
    coefficients[14] = -1.0;
    coefficients[17] = 0.5;
    let model = TrainedClassifier::Logistic(LogisticModel {
        coefficients,
        intercept: -0.3,
        n_iterations: 7,
        converged: true,
    });
    ArtifactPair::new(reference_scaler(), model, TrainingInfo::default()).unwrap()
}

fn leaf(value: f64) -> Box<TreeNode> {
    Box::new(TreeNode::Leaf { value })
}

fn reference_boosted() -> ArtifactPair {
    let model = TrainedClassifier::GradientBoosted(BoostedTrees {
        base_score: -1.0,
        learning_rate: 0.1,
        n_features: FEATURE_COUNT,
        trees: vec![
            TreeNode::Split {
                feature: 14,
                threshold: 0.5,
                left: leaf(0.4),
                right: leaf(-0.6),
            },
            TreeNode::Split {
                feature: 4,
                threshold: 0.0,
                left: leaf(0.3),
                right: leaf(-0.2),
            },
        ],
    });
    ArtifactPair::new(reference_scaler(), model, TrainingInfo::default()).unwrap()
}

#[test]
fn test_reference_logistic_pair_matches_hand_computation() {
    let dir = TempDir::new().unwrap();
    reference_logistic().persist(dir.path()).unwrap();
    let service = InferenceService::load(dir.path(), ModelFamily::Logistic).unwrap();

    let prediction = service.predict(&CustomerRecord::sample()).unwrap();
    let tenure = (12.0 - 32.0) / 24.0;
    let monthly = (70.35 - 64.76) / 30.0;
    let expected = sigmoid(-0.3 - 0.8 * tenure + 0.5 * monthly);

    assert_relative_eq!(prediction.probability, expected, epsilon = 1e-12);
    assert_eq!(prediction.label, ChurnLabel::Churn);

    let response = service.predict_json(&common::sample_request()).unwrap();
    assert_eq!(response.prediction, ChurnLabel::Churn);
    assert_relative_eq!(
        response.churn_probability,
        (expected * 1e4).round() / 1e4,
        epsilon = 1e-12
    );
}

#[test]
fn test_reference_boosted_pair_matches_hand_computation() {
    let dir = TempDir::new().unwrap();
    reference_boosted().persist(dir.path()).unwrap();
    let service = InferenceService::load(dir.path(), ModelFamily::GradientBoosted).unwrap();

    // Month-to-month goes left in the first tree, tenure below the mean left in the second
    let prediction = service.predict(&CustomerRecord::sample()).unwrap();
    assert_relative_eq!(prediction.probability, sigmoid(-1.0 + 0.4 + 0.3), epsilon = 1e-12);
    assert_eq!(prediction.label, ChurnLabel::NoChurn);
}

#[test]
fn test_invalid_request_lists_every_offending_field() {
    let service = InferenceService::from_pair(reference_logistic());
    let mut request = common::sample_request();
    let body = request.as_object_mut().unwrap();
    body.remove("Contract");
    body.insert("tenure".to_string(), serde_json::json!(-4));

    let err = service.predict_json(&request).unwrap_err();
    let offending = err.offending_fields();
    assert!(offending.contains(&"Contract"));
    assert!(offending.contains(&"tenure"));
    assert_eq!(service.stats().rejected, 1);
    assert_eq!(service.stats().predictions, 0);
}

#[test]
fn test_end_to_end_both_families() {
    let ws = prepared_workspace(300);
    let data_dir = ws.path().join("processed");
    let artifact_dir = ws.path().join("artifacts");

    for family in [ModelFamily::Logistic, ModelFamily::GradientBoosted] {
        let report = Trainer::new(family, quick_config())
            .unwrap()
            .run(&data_dir, &artifact_dir)
            .unwrap();
        assert_eq!(report.family, family);
        assert_eq!(report.evaluation.confusion.total(), report.test_rows);
        assert!(report.scaler_path.exists());
        assert!(report.model_path.exists());

        let service = InferenceService::load(&artifact_dir, family).unwrap();
        assert_eq!(service.current().metadata.pair_id, report.pair_id);

        let response = service.predict_json(&common::sample_request()).unwrap();
        assert!((0.0..=1.0).contains(&response.churn_probability));
    }

    // Each family keeps its own pair
    for file in ["scaler.json", "logistic_model.json", "xgb_scaler.json", "xgb_model.json"] {
        assert!(artifact_dir.join(file).exists(), "{file}");
    }
}

#[test]
fn test_oversampling_leaves_test_partition_untouched() {
    let ws = prepared_workspace(300);
    let data_dir = ws.path().join("processed");
    let y_test_before = std::fs::read_to_string(data_dir.join(preprocess::Y_TEST_FILE)).unwrap();
    let (train, test) = preprocess::load_split(&data_dir).unwrap();
    let (retained, churned) = train.class_counts();

    let report = Trainer::new(ModelFamily::Logistic, quick_config())
        .unwrap()
        .run(&data_dir, ws.path().join("artifacts"))
        .unwrap();

    assert_eq!(report.training_rows, train.len());
    assert_eq!(report.synthetic_rows, retained - churned);
    assert_eq!(report.test_rows, test.len());
    assert_eq!(
        std::fs::read_to_string(data_dir.join(preprocess::Y_TEST_FILE)).unwrap(),
        y_test_before
    );
}

#[test]
fn test_training_is_deterministic_for_a_fixed_seed() {
    let ws = prepared_workspace(240);
    let (train, _) = preprocess::load_split(ws.path().join("processed")).unwrap();

    for family in [ModelFamily::Logistic, ModelFamily::GradientBoosted] {
        let trainer = Trainer::new(family, quick_config()).unwrap();
        let first = trainer.fit(&train).unwrap();
        let second = trainer.fit(&train).unwrap();
        assert_eq!(
            serde_json::to_value(&first.model).unwrap(),
            serde_json::to_value(&second.model).unwrap(),
            "{family}"
        );
        assert_eq!(first.scaler, second.scaler);
        assert_ne!(first.metadata.pair_id, second.metadata.pair_id);
    }
}

fn read_split_files(dir: &Path) -> Vec<String> {
    [
        preprocess::X_TRAIN_FILE,
        preprocess::X_TEST_FILE,
        preprocess::Y_TRAIN_FILE,
        preprocess::Y_TEST_FILE,
    ]
    .iter()
    .map(|name| std::fs::read_to_string(dir.join(name)).unwrap())
    .collect()
}

#[test]
fn test_preprocessing_split_is_reproducible() {
    let dir = TempDir::new().unwrap();
    let raw = dir.path().join("telco.csv");
    common::write_telco_csv(&raw, 200, 0);

    let mut config = PipelineConfig::default().preprocess;
    preprocess::run(&raw, dir.path().join("a"), &config).unwrap();
    preprocess::run(&raw, dir.path().join("b"), &config).unwrap();
    config.seed = 7;
    let report = preprocess::run(&raw, dir.path().join("c"), &config).unwrap();

    let a = read_split_files(&dir.path().join("a"));
    assert_eq!(a, read_split_files(&dir.path().join("b")));
    assert_ne!(a, read_split_files(&dir.path().join("c")));
    assert_eq!(report.test_rows, 40);
    assert_eq!(report.train_rows, 160);
}

#[test]
fn test_mismatched_pair_is_rejected_on_load() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    reference_logistic().persist(first.path()).unwrap();
    reference_logistic().persist(second.path()).unwrap();

    std::fs::copy(
        second.path().join("logistic_model.json"),
        first.path().join("logistic_model.json"),
    )
    .unwrap();

    match InferenceService::load(first.path(), ModelFamily::Logistic) {
        Err(ChurnError::ArtifactLoad { .. }) => {}
        other => panic!("expected an artifact load error, got {other:?}"),
    }
}

#[test]
fn test_concurrent_predictions_during_swaps() {
    let logistic = reference_logistic();
    let mut alternative = reference_logistic();
    if let TrainedClassifier::Logistic(model) = &mut alternative.model {
        model.intercept = -3.0;
    }

    let record = CustomerRecord::sample();
    let expected_a = InferenceService::from_pair(logistic.clone())
        .predict(&record)
        .unwrap()
        .probability;
    let expected_b = InferenceService::from_pair(alternative.clone())
        .predict(&record)
        .unwrap()
        .probability;
    assert_ne!(expected_a, expected_b);

    let service = InferenceService::from_pair(logistic.clone());
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let p = service.predict(&record).unwrap().probability;
                    assert!(p == expected_a || p == expected_b, "torn prediction {p}");
                }
            });
        }
        for i in 0..50 {
            let next = if i % 2 == 0 {
                alternative.clone()
            } else {
                logistic.clone()
            };
            service.swap(next);
        }
    });

    let stats = service.stats();
    assert_eq!(stats.predictions, 800);
    assert_eq!(stats.swaps, 50);
}
