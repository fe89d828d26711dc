//! Append-only audit log of served predictions
//!
//! One CSV row per prediction: timestamp, model family, label, probability
//! and the 19 raw input values in schema order.

use crate::core::{ChurnPrediction, ModelFamily, Result};
use crate::record::CustomerRecord;
use crate::schema;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Leading columns before the feature columns
pub const AUDIT_COLUMNS: [&str; 4] = ["timestamp", "model_family", "prediction", "churn_probability"];

/// One served prediction
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub family: ModelFamily,
    pub prediction: ChurnPrediction,
    pub record: CustomerRecord,
}

impl AuditEntry {
    pub fn new(family: ModelFamily, prediction: ChurnPrediction, record: CustomerRecord) -> Self {
        Self {
            timestamp: Utc::now(),
            family,
            prediction,
            record,
        }
    }

    fn to_csv_row(&self) -> String {
        let response = self.prediction.to_response();
        let mut cells = vec![
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.family.to_string(),
            response.prediction.to_string(),
            response.churn_probability.to_string(),
        ];
        cells.extend(self.record.values().iter().map(|v| v.to_string()));
        cells.join(",")
    }
}

/// CSV header line of the audit log
pub fn header() -> String {
    AUDIT_COLUMNS
        .iter()
        .copied()
        .chain(schema::field_names())
        .collect::<Vec<_>>()
        .join(",")
}

/// Audit log file, created with a header on first append
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a single write
    pub fn append(&self, entry: &AuditEntry) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let mut text = String::new();
        if file.metadata()?.len() == 0 {
            text.push_str(&header());
            text.push('\n');
        }
        text.push_str(&entry.to_csv_row());
        text.push('\n');

        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
