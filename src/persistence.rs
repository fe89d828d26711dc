//! Artifact serialization and persistence
//!
//! A training run produces two files per model family: the fitted scaler and
//! the fitted classifier. Both carry the same metadata block, including a
//! `pair_id` unique to the run, so the loader can refuse a scaler and model
//! that did not come from the same training run.

use crate::core::{ChurnError, Classifier, ModelFamily, Result};
use crate::model::TrainedClassifier;
use crate::schema::{self, FEATURE_COUNT, SCHEMA_VERSION};
use crate::utils::fs::StagedFiles;
use crate::utils::scaling::StandardScaler;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Metadata stored in both files of an artifact pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Library version used to create the artifact
    pub library_version: String,
    pub schema_version: u32,
    pub schema_fingerprint: String,
    pub family: ModelFamily,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    /// Shared by the scaler and model of one training run
    pub pair_id: String,
}

impl ArtifactMetadata {
    /// Fresh metadata for a new training run
    pub fn new(family: ModelFamily) -> Self {
        let now = chrono::Utc::now();
        Self {
            library_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: SCHEMA_VERSION,
            schema_fingerprint: schema::fingerprint(),
            family,
            created_at: now.to_rfc3339(),
            pair_id: format!(
                "{}-{:016x}",
                now.format("%Y%m%dT%H%M%S%.6fZ"),
                rand::random::<u64>()
            ),
        }
    }
}

/// Training parameters and sizes, kept for reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingInfo {
    /// Training rows before oversampling
    pub training_rows: usize,
    /// Synthetic rows added by oversampling
    pub synthetic_rows: usize,
    /// Hyperparameters of the fitted family
    pub hyperparameters: serde_json::Value,
}

/// On-disk form of the scaler file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerArtifact {
    pub metadata: ArtifactMetadata,
    pub scaler: StandardScaler,
}

/// On-disk form of the model file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub metadata: ArtifactMetadata,
    pub model: TrainedClassifier,
    #[serde(default)]
    pub training: TrainingInfo,
}

/// A scaler and classifier known to belong together
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPair {
    pub metadata: ArtifactMetadata,
    pub scaler: StandardScaler,
    pub model: TrainedClassifier,
    pub training: TrainingInfo,
}

fn check_shape(scaler: &StandardScaler, model: &TrainedClassifier) -> std::result::Result<(), String> {
    if scaler.n_features() != FEATURE_COUNT || scaler.scales.len() != FEATURE_COUNT {
        return Err(format!(
            "scaler has {} features, schema has {FEATURE_COUNT}",
            scaler.n_features()
        ));
    }
    if scaler.scales.iter().any(|s| !s.is_finite() || *s <= 0.0)
        || scaler.means.iter().any(|m| !m.is_finite())
    {
        return Err("scaler holds non-finite or non-positive parameters".to_string());
    }
    if model.n_features() != FEATURE_COUNT {
        return Err(format!(
            "model has {} features, schema has {FEATURE_COUNT}",
            model.n_features()
        ));
    }
    if !model.is_finite() {
        return Err("model holds non-finite parameters".to_string());
    }
    if let TrainedClassifier::GradientBoosted(trees) = model {
        if let Some(feature) = trees.max_split_feature().filter(|&f| f >= FEATURE_COUNT) {
            return Err(format!(
                "tree splits on feature {feature}, schema has {FEATURE_COUNT}"
            ));
        }
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| ChurnError::artifact(path, e.to_string()))?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| ChurnError::artifact(path, format!("corrupt artifact: {e}")))
}

impl ArtifactPair {
    /// Pair a freshly fitted scaler and model under new metadata
    pub fn new(
        scaler: StandardScaler,
        model: TrainedClassifier,
        training: TrainingInfo,
    ) -> Result<Self> {
        check_shape(&scaler, &model).map_err(ChurnError::Training)?;
        Ok(Self {
            metadata: ArtifactMetadata::new(model.family()),
            scaler,
            model,
            training,
        })
    }

    pub fn family(&self) -> ModelFamily {
        self.metadata.family
    }

    /// Paths of the scaler and model files of `family` inside `dir`
    pub fn paths(dir: &Path, family: ModelFamily) -> (PathBuf, PathBuf) {
        (
            dir.join(family.scaler_file_name()),
            dir.join(family.model_file_name()),
        )
    }

    /// Write both files; neither replaces its predecessor unless both were written
    pub fn persist<P: AsRef<Path>>(&self, dir: P) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let (scaler_path, model_path) = Self::paths(dir, self.family());

        let scaler_file = ScalerArtifact {
            metadata: self.metadata.clone(),
            scaler: self.scaler.clone(),
        };
        let model_file = ModelArtifact {
            metadata: self.metadata.clone(),
            model: self.model.clone(),
            training: self.training.clone(),
        };

        let mut staged = StagedFiles::new();
        staged.stage(scaler_path.clone(), |w| {
            serde_json::to_writer_pretty(w, &scaler_file)
                .map_err(|e| ChurnError::SerializationError(e.to_string()))
        })?;
        staged.stage(model_path.clone(), |w| {
            serde_json::to_writer_pretty(w, &model_file)
                .map_err(|e| ChurnError::SerializationError(e.to_string()))
        })?;
        staged.commit()?;

        Ok((scaler_path, model_path))
    }

    /// Load and cross-check the artifact pair of `family` from `dir`
    ///
    /// Every failure is an [`ChurnError::ArtifactLoad`] naming the offending file.
    pub fn load<P: AsRef<Path>>(dir: P, family: ModelFamily) -> Result<Self> {
        let (scaler_path, model_path) = Self::paths(dir.as_ref(), family);
        let scaler_file: ScalerArtifact = read_json(&scaler_path)?;
        let model_file: ModelArtifact = read_json(&model_path)?;

        for (path, metadata) in [
            (&scaler_path, &scaler_file.metadata),
            (&model_path, &model_file.metadata),
        ] {
            if metadata.family != family {
                return Err(ChurnError::artifact(
                    path,
                    format!("artifact is for family {}, expected {family}", metadata.family),
                ));
            }
            if metadata.schema_version != SCHEMA_VERSION
                || metadata.schema_fingerprint != schema::fingerprint()
            {
                return Err(ChurnError::artifact(
                    path,
                    format!(
                        "feature schema mismatch (artifact schema v{}, library schema v{SCHEMA_VERSION})",
                        metadata.schema_version
                    ),
                ));
            }
        }

        if scaler_file.metadata.pair_id != model_file.metadata.pair_id {
            return Err(ChurnError::artifact(
                &model_path,
                format!(
                    "model pair id {} does not match scaler pair id {}",
                    model_file.metadata.pair_id, scaler_file.metadata.pair_id
                ),
            ));
        }
        if model_file.model.family() != family {
            return Err(ChurnError::artifact(
                &model_path,
                format!("file holds a {} classifier", model_file.model.family()),
            ));
        }
        check_shape(&scaler_file.scaler, &model_file.model)
            .map_err(|reason| ChurnError::artifact(&model_path, reason))?;

        Ok(Self {
            metadata: model_file.metadata,
            scaler: scaler_file.scaler,
            model: model_file.model,
            training: model_file.training,
        })
    }

    /// Print artifact summary
    pub fn print_summary(&self) {
        println!("=== Churn Model Summary ===");
        println!("Family: {}", self.family());
        println!("Model: {}", self.model.summary());
        println!("Pair ID: {}", self.metadata.pair_id);
        println!("Library Version: {}", self.metadata.library_version);
        println!("Schema Version: {}", self.metadata.schema_version);
        println!("Created: {}", self.metadata.created_at);
        println!(
            "Training Rows: {} (+{} synthetic)",
            self.training.training_rows, self.training.synthetic_rows
        );
        println!("Scaler fitted on {} rows", self.scaler.n_samples_seen);
        if let TrainedClassifier::GradientBoosted(trees) = &self.model {
            let mut counts: Vec<(usize, &'static str)> = trees
                .split_counts()
                .into_iter()
                .zip(schema::field_names())
                .filter(|(count, _)| *count > 0)
                .collect();
            counts.sort_by(|a, b| b.0.cmp(&a.0));
            println!("Most used split features:");
            for (count, name) in counts.iter().take(5) {
                println!("  {name}: {count}");
            }
        }
        if !self.training.hyperparameters.is_null() {
            println!("Hyperparameters: {}", self.training.hyperparameters);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoostedTrees, LogisticModel, TreeNode};
    use tempfile::TempDir;

    fn toy_pair() -> ArtifactPair {
        let scaler = StandardScaler {
            means: vec![0.0; FEATURE_COUNT],
            scales: vec![1.0; FEATURE_COUNT],
            n_samples_seen: 10,
        };
        let mut coefficients = vec![0.0; FEATURE_COUNT];
        coefficients[4] = -0.05;
        let model = TrainedClassifier::Logistic(LogisticModel {
            coefficients,
            intercept: 0.1,
            n_iterations: 3,
            converged: true,
        });
        ArtifactPair::new(scaler, model, TrainingInfo::default()).unwrap()
    }

    #[test]
    fn test_persist_and_load() -> Result<()> {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let pair = toy_pair();
        let (scaler_path, model_path) = pair.persist(dir.path())?;
        assert!(scaler_path.ends_with("scaler.json"));
        assert!(model_path.ends_with("logistic_model.json"));

        let loaded = ArtifactPair::load(dir.path(), ModelFamily::Logistic)?;
        assert_eq!(loaded, pair);
        Ok(())
    }

    #[test]
    fn test_missing_artifact_names_the_file() {
        let dir = TempDir::new().unwrap();
        match ArtifactPair::load(dir.path(), ModelFamily::GradientBoosted) {
            Err(ChurnError::ArtifactLoad { path, .. }) => {
                assert!(path.ends_with("xgb_scaler.json"))
            }
            other => panic!("expected artifact error, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_pair_is_rejected() {
        let dir = TempDir::new().unwrap();
        toy_pair().persist(dir.path()).unwrap();

        // Second run overwrites only the scaler
        let newer = toy_pair();
        let scaler_file = ScalerArtifact {
            metadata: newer.metadata.clone(),
            scaler: newer.scaler.clone(),
        };
        std::fs::write(
            dir.path().join("scaler.json"),
            serde_json::to_string_pretty(&scaler_file).unwrap(),
        )
        .unwrap();

        let err = ArtifactPair::load(dir.path(), ModelFamily::Logistic).unwrap_err();
        assert!(err.to_string().contains("pair id"), "{err}");
    }

    #[test]
    fn test_corrupt_or_foreign_schema_is_rejected() {
        let dir = TempDir::new().unwrap();
        let pair = toy_pair();
        pair.persist(dir.path()).unwrap();

        std::fs::write(dir.path().join("logistic_model.json"), "{ not json").unwrap();
        assert!(matches!(
            ArtifactPair::load(dir.path(), ModelFamily::Logistic),
            Err(ChurnError::ArtifactLoad { .. })
        ));

        let mut foreign = pair.clone();
        foreign.metadata.schema_fingerprint = "v1/other".to_string();
        foreign.persist(dir.path()).unwrap();
        let err = ArtifactPair::load(dir.path(), ModelFamily::Logistic).unwrap_err();
        assert!(err.to_string().contains("schema"), "{err}");
    }

    #[test]
    fn test_wrong_width_model_is_rejected() {
        let scaler = StandardScaler {
            means: vec![0.0; 3],
            scales: vec![1.0; 3],
            n_samples_seen: 1,
        };
        let model = TrainedClassifier::Logistic(LogisticModel {
            coefficients: vec![0.0; 3],
            intercept: 0.0,
            n_iterations: 1,
            converged: true,
        });
        assert!(ArtifactPair::new(scaler, model, TrainingInfo::default()).is_err());
    }

    fn split_on(feature: usize, threshold: f64) -> TrainedClassifier {
        TrainedClassifier::GradientBoosted(BoostedTrees {
            base_score: 0.0,
            learning_rate: 0.1,
            n_features: FEATURE_COUNT,
            trees: vec![TreeNode::Split {
                feature,
                threshold,
                left: Box::new(TreeNode::Leaf { value: 0.2 }),
                right: Box::new(TreeNode::Leaf { value: -0.2 }),
            }],
        })
    }

    #[test]
    fn test_tree_with_out_of_range_split_is_rejected() {
        let dir = TempDir::new().unwrap();
        let pair = ArtifactPair::new(toy_pair().scaler, split_on(4, 0.5), TrainingInfo::default())
            .unwrap();
        pair.persist(dir.path()).unwrap();

        // Same metadata, but a split reading past the end of the feature vector
        let corrupt = ModelArtifact {
            metadata: pair.metadata.clone(),
            model: split_on(99, 0.5),
            training: TrainingInfo::default(),
        };
        std::fs::write(
            dir.path().join("xgb_model.json"),
            serde_json::to_string_pretty(&corrupt).unwrap(),
        )
        .unwrap();

        match ArtifactPair::load(dir.path(), ModelFamily::GradientBoosted) {
            Err(ChurnError::ArtifactLoad { path, reason }) => {
                assert!(path.ends_with("xgb_model.json"));
                assert!(reason.contains("feature 99"), "{reason}");
            }
            other => panic!("expected artifact error, got {other:?}"),
        }
        assert!(
            ArtifactPair::new(toy_pair().scaler, split_on(99, 0.5), TrainingInfo::default())
                .is_err()
        );
    }

    #[test]
    fn test_tree_with_infinite_threshold_is_rejected() {
        let result = ArtifactPair::new(
            toy_pair().scaler,
            split_on(4, f64::INFINITY),
            TrainingInfo::default(),
        );
        assert!(matches!(result, Err(ChurnError::Training(_))));
    }

    #[test]
    fn test_pair_ids_are_unique() {
        let a = ArtifactMetadata::new(ModelFamily::Logistic);
        let b = ArtifactMetadata::new(ModelFamily::Logistic);
        assert_ne!(a.pair_id, b.pair_id);
    }
}
