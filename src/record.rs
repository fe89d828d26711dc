//! Validated customer records
//!
//! A [`CustomerRecord`] can only be built through a validating constructor,
//! so every record that reaches the inference service already conforms to
//! the schema.

use crate::core::{ChurnError, FieldIssue, IssueKind, Result};
use crate::schema::{self, FEATURE_COUNT};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// One customer's 19 model inputs, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRecord {
    values: [f64; FEATURE_COUNT],
}

impl CustomerRecord {
    /// Build a record from `(field name, value)` pairs
    ///
    /// Every schema field must appear exactly once and lie in its domain;
    /// a repeated field is reported and its first value kept.
    /// All problems are collected and reported together.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, f64)>,
    {
        let mut values = [f64::NAN; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];
        let mut issues = Vec::new();

        for (name, value) in pairs {
            match schema::index_of(name) {
                Some(idx) if seen[idx] => {
                    issues.push(FieldIssue::new(name, IssueKind::Duplicate));
                }
                Some(idx) => {
                    seen[idx] = true;
                    values[idx] = value;
                }
                None => issues.push(FieldIssue::new(name, IssueKind::Unknown)),
            }
        }

        Self::check(values, &seen, issues)
    }

    /// Build a record from a JSON object of numeric codes and charges
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            ChurnError::Validation(vec![FieldIssue::new(
                "<record>",
                IssueKind::OutOfDomain("expected a JSON object".to_string()),
            )])
        })?;
        Self::from_json_map(object)
    }

    /// Build a record from an already-parsed JSON map
    pub fn from_json_map(object: &Map<String, Value>) -> Result<Self> {
        let mut values = [f64::NAN; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];
        let mut issues = Vec::new();

        for (name, raw) in object {
            let Some(idx) = schema::index_of(name) else {
                issues.push(FieldIssue::new(name.as_str(), IssueKind::Unknown));
                continue;
            };
            seen[idx] = true;
            match raw.as_f64() {
                Some(v) => values[idx] = v,
                None => issues.push(FieldIssue::new(name.as_str(), IssueKind::WrongType)),
            }
        }

        // Wrong-type fields were already reported; don't report them again as out of domain
        for issue in &issues {
            if let Some(idx) = schema::index_of(&issue.field) {
                values[idx] = 0.0;
            }
        }

        Self::check(values, &seen, issues)
    }

    /// Build a record from raw category labels as they appear in the source data
    ///
    /// Categorical fields are encoded through the schema table; an unknown
    /// category is an [`ChurnError::EncodingMismatch`], never a silent default.
    pub fn from_categories(raw: &HashMap<String, String>) -> Result<Self> {
        let mut values = [f64::NAN; FEATURE_COUNT];
        let mut seen = [false; FEATURE_COUNT];
        let mut issues = Vec::new();

        for (name, cell) in raw {
            match schema::index_of(name) {
                Some(idx) => {
                    seen[idx] = true;
                    values[idx] = schema::fields()[idx].encode(cell)?;
                }
                None => issues.push(FieldIssue::new(name.as_str(), IssueKind::Unknown)),
            }
        }

        Self::check(values, &seen, issues)
    }

    fn check(
        values: [f64; FEATURE_COUNT],
        seen: &[bool; FEATURE_COUNT],
        mut issues: Vec<FieldIssue>,
    ) -> Result<Self> {
        for (idx, field) in schema::fields().iter().enumerate() {
            if !seen[idx] {
                issues.push(FieldIssue::new(field.name, IssueKind::Missing));
            } else if !field.accepts(values[idx]) {
                issues.push(FieldIssue::new(
                    field.name,
                    IssueKind::OutOfDomain(format!(
                        "value {} outside domain ({})",
                        values[idx],
                        field.domain.describe()
                    )),
                ));
            }
        }

        if issues.is_empty() {
            Ok(Self { values })
        } else {
            Err(ChurnError::Validation(issues))
        }
    }

    /// Raw (unscaled) feature vector in schema order
    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Value of a single field by name
    pub fn get(&self, name: &str) -> Option<f64> {
        schema::index_of(name).map(|idx| self.values[idx])
    }

    /// The sample customer used by the CLI `--sample` flag and the tests
    pub fn sample() -> Self {
        Self {
            values: [
                1.0, 0.0, 1.0, 0.0, 12.0, 1.0, 0.0, 2.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0,
                2.0, 70.35, 845.5,
            ],
        }
    }
}

impl Serialize for CustomerRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_COUNT))?;
        for (field, &value) in schema::fields().iter().zip(self.values.iter()) {
            if matches!(field.domain, schema::Domain::Continuous) {
                map.serialize_entry(field.name, &value)?;
            } else {
                map.serialize_entry(field.name, &(value as u64))?;
            }
        }
        map.end()
    }
}
