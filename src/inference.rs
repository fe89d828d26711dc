//! Single-record churn inference over a persisted artifact pair
//!
//! The service owns the active pair behind `RwLock<Arc<_>>`. A prediction
//! holds the read lock only long enough to clone the `Arc`, then scores
//! against that immutable snapshot, so a concurrent swap never changes a
//! prediction already in flight.

use crate::core::{Classifier, ChurnPrediction, ModelFamily, PredictionResponse, Result};
use crate::persistence::ArtifactPair;
use crate::record::CustomerRecord;
use log::{debug, info};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Counters of served requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceStats {
    pub predictions: u64,
    pub rejected: u64,
    pub swaps: u64,
}

/// Explicitly constructed inference service
#[derive(Debug)]
pub struct InferenceService {
    pair: RwLock<Arc<ArtifactPair>>,
    source: Option<PathBuf>,
    predictions: AtomicU64,
    rejected: AtomicU64,
    swaps: AtomicU64,
}

impl InferenceService {
    /// Load the artifact pair of `family` from `dir`
    pub fn load<P: AsRef<Path>>(dir: P, family: ModelFamily) -> Result<Self> {
        let dir = dir.as_ref();
        let pair = ArtifactPair::load(dir, family)?;
        info!(
            "Loaded {} artifact pair {} from {}",
            family,
            pair.metadata.pair_id,
            dir.display()
        );
        let mut service = Self::from_pair(pair);
        service.source = Some(dir.to_path_buf());
        Ok(service)
    }

    /// Serve an in-memory pair
    pub fn from_pair(pair: ArtifactPair) -> Self {
        Self {
            pair: RwLock::new(Arc::new(pair)),
            source: None,
            predictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            swaps: AtomicU64::new(0),
        }
    }

    /// Snapshot of the active pair
    pub fn current(&self) -> Arc<ArtifactPair> {
        // The guarded value is a single Arc, so a poisoned lock still holds a whole pair
        let guard = self.pair.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn family(&self) -> ModelFamily {
        self.current().family()
    }

    /// Score a validated record
    pub fn predict(&self, record: &CustomerRecord) -> Result<ChurnPrediction> {
        let pair = self.current();
        let scaled = pair.scaler.transform_row(record.values())?;
        let prediction = pair.model.predict(&scaled);
        self.predictions.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Predicted {} (p={}) with pair {}",
            prediction.label, prediction.probability, pair.metadata.pair_id
        );
        Ok(prediction)
    }

    /// Validate a JSON request body and answer in response form
    pub fn predict_json(&self, request: &Value) -> Result<PredictionResponse> {
        let record = CustomerRecord::from_json(request).map_err(|e| {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            e
        })?;
        Ok(self.predict(&record)?.to_response())
    }

    /// Replace the active pair with an already loaded one
    ///
    /// Returns the pair that was active before.
    pub fn swap(&self, pair: ArtifactPair) -> Arc<ArtifactPair> {
        let next = Arc::new(pair);
        let mut guard = self.pair.write().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);
        self.swaps.fetch_add(1, Ordering::Relaxed);
        info!(
            "Swapped artifact pair {} -> {}",
            previous.metadata.pair_id,
            self.current().metadata.pair_id
        );
        previous
    }

    /// Load the pair from `dir` and swap it in; on failure the active pair is kept
    pub fn reload_from<P: AsRef<Path>>(&self, dir: P) -> Result<Arc<ArtifactPair>> {
        let pair = ArtifactPair::load(dir, self.family())?;
        Ok(self.swap(pair))
    }

    /// Reload from the directory the service was loaded from
    pub fn reload(&self) -> Result<Arc<ArtifactPair>> {
        match &self.source {
            Some(dir) => self.reload_from(dir),
            None => Err(crate::core::ChurnError::InvalidParameter(
                "service was not loaded from a directory".to_string(),
            )),
        }
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            predictions: self.predictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
        }
    }
}
