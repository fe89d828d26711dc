//! Customer churn prediction pipeline
//!
//! Preprocesses a raw customer table into encoded train/test splits, trains
//! a logistic regression or gradient-boosted tree classifier on them, and
//! serves single-record predictions from the persisted (scaler, model) pair.
//!
//! ```rust,no_run
//! use rchurn::{CustomerRecord, InferenceService, ModelFamily};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = InferenceService::load("artifacts", ModelFamily::Logistic)?;
//! let prediction = service.predict(&CustomerRecord::sample())?;
//! println!("{} ({:.4})", prediction.label, prediction.probability);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod core;
pub mod data;
pub mod inference;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod record;
pub mod sampling;
pub mod schema;
pub mod trainer;
pub mod utils;

// Re-export main types for convenience
pub use crate::config::PipelineConfig;
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{ChurnError, Result};
pub use crate::inference::InferenceService;
pub use crate::metrics::EvaluationReport;
pub use crate::model::TrainedClassifier;
pub use crate::persistence::ArtifactPair;
pub use crate::record::CustomerRecord;
pub use crate::trainer::{Trainer, TrainingReport};
pub use crate::utils::scaling::StandardScaler;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
