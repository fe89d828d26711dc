//! Error types for the churn pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single request field was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    /// Field is absent from the request
    Missing,
    /// Field is not part of the schema
    Unknown,
    /// Field appears more than once
    Duplicate,
    /// Value has the wrong JSON type (e.g. a string for a code)
    WrongType,
    /// Value lies outside the field's declared domain
    OutOfDomain(String),
}

/// A single offending field in a rejected record
#[derive(Debug, Clone, PartialEq)]
pub struct FieldIssue {
    pub field: String,
    pub kind: IssueKind,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{}: missing", self.field),
            IssueKind::Unknown => write!(f, "{}: not a schema field", self.field),
            IssueKind::Duplicate => write!(f, "{}: given more than once", self.field),
            IssueKind::WrongType => write!(f, "{}: expected a number", self.field),
            IssueKind::OutOfDomain(detail) => write!(f, "{}: {}", self.field, detail),
        }
    }
}

fn join_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Data load error: {0}")]
    DataLoad(String),

    #[error("Encoding mismatch: value {value:?} is not a known category of {field}")]
    EncodingMismatch { field: String, value: String },

    #[error("Invalid record: {}", join_issues(.0))]
    Validation(Vec<FieldIssue>),

    #[error("Failed to load artifact {}: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ChurnError {
    /// Fields named by a validation failure, in the order they were found
    pub fn offending_fields(&self) -> Vec<&str> {
        match self {
            ChurnError::Validation(issues) => issues.iter().map(|i| i.field.as_str()).collect(),
            ChurnError::EncodingMismatch { field, .. } => vec![field.as_str()],
            _ => Vec::new(),
        }
    }

    pub(crate) fn artifact(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ChurnError::ArtifactLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChurnError>;
