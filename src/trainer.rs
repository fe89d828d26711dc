//! Training stage: processed splits -> evaluated, persisted artifact pair

use crate::config::PipelineConfig;
use crate::core::{ChurnError, Classifier, Dataset, ModelFamily, Result, DECISION_THRESHOLD};
use crate::data::preprocess;
use crate::metrics::EvaluationReport;
use crate::model::TrainedClassifier;
use crate::persistence::{ArtifactPair, TrainingInfo};
use crate::sampling::Smote;
use crate::utils::scaling::StandardScaler;
use log::info;
use std::path::{Path, PathBuf};

/// Summary of a complete training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub family: ModelFamily,
    pub pair_id: String,
    pub training_rows: usize,
    pub synthetic_rows: usize,
    pub test_rows: usize,
    pub evaluation: EvaluationReport,
    pub scaler_path: PathBuf,
    pub model_path: PathBuf,
}

/// Fits one model family with a fixed configuration
#[derive(Debug, Clone)]
pub struct Trainer {
    family: ModelFamily,
    config: PipelineConfig,
}

impl Trainer {
    pub fn new(family: ModelFamily, config: PipelineConfig) -> Result<Self> {
        config.validate_for(family)?;
        Ok(Self { family, config })
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the processed training and test partitions
    pub fn load_split<P: AsRef<Path>>(&self, dir: P) -> Result<(Dataset, Dataset)> {
        preprocess::load_split(dir)
    }

    /// Oversample the minority class of the training partition, if enabled
    pub fn balance(&self, train: &Dataset) -> Result<Dataset> {
        if !self.config.balance.enabled {
            info!("Class balancing disabled");
            return Ok(train.clone());
        }
        Smote::from_config(&self.config.balance).balance(train)
    }

    pub fn fit_scaler(&self, rows: &[Vec<f64>]) -> Result<StandardScaler> {
        StandardScaler::fit(rows)
    }

    /// Fit the configured family on already scaled rows
    pub fn fit_classifier(&self, scaled: &[Vec<f64>], labels: &[u8]) -> Result<TrainedClassifier> {
        let model = TrainedClassifier::fit(self.family, scaled, labels, &self.config)?;
        if !model.is_finite() {
            return Err(ChurnError::Training(format!(
                "{} fit produced non-finite parameters",
                self.family
            )));
        }
        info!("Fitted {}", model.summary());
        Ok(model)
    }

    /// Fit scaler and classifier on the training partition
    pub fn fit(&self, train: &Dataset) -> Result<ArtifactPair> {
        if train.is_empty() {
            return Err(ChurnError::EmptyDataset);
        }
        let (retained, churned) = train.class_counts();
        if retained == 0 || churned == 0 {
            return Err(ChurnError::Training(
                "training labels contain a single class".to_string(),
            ));
        }

        let balanced = self.balance(train)?;
        let scaler = self.fit_scaler(&balanced.features)?;
        let scaled = scaler.transform(&balanced.features)?;
        let model = self.fit_classifier(&scaled, &balanced.labels)?;

        let hyperparameters = match self.family {
            ModelFamily::Logistic => serde_json::to_value(&self.config.logistic),
            ModelFamily::GradientBoosted => serde_json::to_value(&self.config.gradient_boosting),
        }
        .map_err(|e| ChurnError::SerializationError(e.to_string()))?;

        ArtifactPair::new(
            scaler,
            model,
            TrainingInfo {
                training_rows: train.len(),
                synthetic_rows: balanced.len() - train.len(),
                hyperparameters,
            },
        )
    }

    /// Run the whole training stage: load, balance, scale, fit, evaluate, persist
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        data_dir: P,
        artifact_dir: Q,
    ) -> Result<TrainingReport> {
        info!(
            "Training {} model from {}",
            self.family,
            data_dir.as_ref().display()
        );
        let (train, test) = self.load_split(data_dir)?;
        let pair = self.fit(&train)?;

        let evaluation = evaluate(&pair, &test)?;
        info!(
            "Test accuracy {:.4}, churn recall {:.4}, ROC AUC {}",
            evaluation.accuracy,
            evaluation.churned.recall,
            evaluation
                .roc_auc
                .map(|auc| format!("{auc:.4}"))
                .unwrap_or_else(|| "undefined".to_string())
        );

        let (scaler_path, model_path) = pair.persist(&artifact_dir)?;
        info!(
            "Saved artifact pair {} to {}",
            pair.metadata.pair_id,
            artifact_dir.as_ref().display()
        );

        Ok(TrainingReport {
            family: self.family,
            pair_id: pair.metadata.pair_id.clone(),
            training_rows: pair.training.training_rows,
            synthetic_rows: pair.training.synthetic_rows,
            test_rows: test.len(),
            evaluation,
            scaler_path,
            model_path,
        })
    }
}

/// Evaluate an artifact pair on an unscaled, labelled partition
pub fn evaluate(pair: &ArtifactPair, test: &Dataset) -> Result<EvaluationReport> {
    let scaled = pair.scaler.transform(&test.features)?;
    let probabilities = pair.model.predict_proba_batch(&scaled);
    EvaluationReport::from_probabilities(&test.labels, &probabilities, DECISION_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FEATURE_COUNT;

    /// Rows whose churn label follows tenure and monthly charges
    fn synthetic(n: usize, offset: usize) -> Dataset {
        let mut features = Vec::with_capacity(n);
        let mut labels = Vec::with_capacity(n);
        for i in 0..n {
            let k = i + offset;
            let mut row = vec![0.0; FEATURE_COUNT];
            row[0] = (k % 2) as f64;
            row[4] = ((k * 7) % 72) as f64;
            row[14] = (k % 3) as f64;
            row[17] = 20.0 + ((k * 13) % 100) as f64;
            row[18] = row[4] * row[17];
            let churn = row[4] < 12.0 && row[17] > 50.0;
            features.push(row);
            labels.push(u8::from(churn));
        }
        Dataset::new(features, labels).unwrap()
    }

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.gradient_boosting.n_estimators = 20;
        config
    }

    #[test]
    fn test_fit_balances_only_the_training_rows() {
        let train = synthetic(120, 0);
        let (retained, churned) = train.class_counts();
        assert!(churned > 0 && churned < retained);

        let trainer = Trainer::new(ModelFamily::Logistic, quick_config()).unwrap();
        let pair = trainer.fit(&train).unwrap();
        assert_eq!(pair.training.training_rows, 120);
        assert_eq!(pair.training.synthetic_rows, retained - churned);
        assert_eq!(pair.scaler.n_samples_seen, 2 * retained);
    }

    #[test]
    fn test_fit_without_balancing() {
        let mut config = quick_config();
        config.balance.enabled = false;
        let trainer = Trainer::new(ModelFamily::GradientBoosted, config).unwrap();
        let pair = trainer.fit(&synthetic(80, 0)).unwrap();
        assert_eq!(pair.training.synthetic_rows, 0);
        assert_eq!(pair.scaler.n_samples_seen, 80);
        assert_eq!(pair.family(), ModelFamily::GradientBoosted);
    }

    #[test]
    fn test_both_families_beat_chance_on_held_out_rows() {
        let train = synthetic(300, 0);
        let test = synthetic(100, 300);
        for family in [ModelFamily::Logistic, ModelFamily::GradientBoosted] {
            let trainer = Trainer::new(family, quick_config()).unwrap();
            let pair = trainer.fit(&train).unwrap();
            let report = evaluate(&pair, &test).unwrap();
            assert_eq!(report.confusion.total(), 100);
            assert!(report.roc_auc.unwrap() > 0.7, "{family}: {report}");
        }
    }

    #[test]
    fn test_single_class_training_fails_before_writing() {
        let data = Dataset::new(vec![vec![1.0; FEATURE_COUNT]; 4], vec![0; 4]).unwrap();
        let trainer = Trainer::new(ModelFamily::Logistic, quick_config()).unwrap();
        assert!(matches!(trainer.fit(&data), Err(ChurnError::Training(_))));
        assert!(matches!(
            trainer.fit(&Dataset::default()),
            Err(ChurnError::EmptyDataset)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.logistic.c = -1.0;
        assert!(Trainer::new(ModelFamily::Logistic, config.clone()).is_err());
        // Only the sections the family uses are checked
        assert!(Trainer::new(ModelFamily::GradientBoosted, config).is_ok());
    }
}
