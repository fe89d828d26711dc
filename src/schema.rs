//! Canonical feature schema
//!
//! The ordered list of the 19 model inputs, their value domains and the
//! category-to-code table. Preprocessing, training, artifact loading and
//! inference all read this table; codes are never derived from data.

use crate::core::{ChurnError, Result};
use std::fmt;

/// Bumped whenever a field, its order, or an encoding changes
pub const SCHEMA_VERSION: u32 = 1;

/// Number of model input features
pub const FEATURE_COUNT: usize = 19;

/// Unique customer identifier column dropped during cleaning
pub const ID_COLUMN: &str = "customerID";

/// Raw churn label column
pub const LABEL_COLUMN: &str = "Churn";

/// Raw label values for churned / retained customers
pub const LABEL_POSITIVE: &str = "Yes";
pub const LABEL_NEGATIVE: &str = "No";

/// Columns whose raw text is coerced to numbers, unparsable text counting as missing
pub const CHARGE_COLUMNS: [&str; 2] = ["MonthlyCharges", "TotalCharges"];

const NO_YES: &[&str] = &["No", "Yes"];
const INTERNET_ADDON: &[&str] = &["No", "No internet service", "Yes"];

/// Value domain of a schema field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    /// Code `i` in `0..labels.len()` stands for `labels[i]`
    Categorical(&'static [&'static str]),
    /// Non-negative integer
    Count,
    /// Finite, non-negative real number
    Continuous,
}

impl Domain {
    /// Whether a numeric value lies inside the domain
    pub fn accepts(&self, value: f64) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        match self {
            Domain::Categorical(labels) => value.fract() == 0.0 && (value as usize) < labels.len(),
            Domain::Count => value.fract() == 0.0,
            Domain::Continuous => true,
        }
    }

    /// Human-readable description used in validation messages
    pub fn describe(&self) -> String {
        match self {
            Domain::Categorical(labels) if labels.len() == 2 => "binary code 0 or 1".to_string(),
            Domain::Categorical(labels) => format!("integer code in 0..={}", labels.len() - 1),
            Domain::Count => "non-negative integer".to_string(),
            Domain::Continuous => "finite non-negative number".to_string(),
        }
    }

    fn signature(&self) -> String {
        match self {
            Domain::Categorical(labels) => format!("cat[{}]", labels.join("|")),
            Domain::Count => "count".to_string(),
            Domain::Continuous => "cont".to_string(),
        }
    }
}

/// A named, typed model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub domain: Domain,
}

impl Field {
    const fn categorical(name: &'static str, labels: &'static [&'static str]) -> Self {
        Self {
            name,
            domain: Domain::Categorical(labels),
        }
    }

    const fn count(name: &'static str) -> Self {
        Self {
            name,
            domain: Domain::Count,
        }
    }

    const fn continuous(name: &'static str) -> Self {
        Self {
            name,
            domain: Domain::Continuous,
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.domain, Domain::Categorical(_))
    }

    /// Category labels, empty for numeric fields
    pub fn categories(&self) -> &'static [&'static str] {
        match self.domain {
            Domain::Categorical(labels) => labels,
            _ => &[],
        }
    }

    /// Encode a raw cell into the numeric value used by the model
    pub fn encode(&self, raw: &str) -> Result<f64> {
        let raw = raw.trim();
        let mismatch = || ChurnError::EncodingMismatch {
            field: self.name.to_string(),
            value: raw.to_string(),
        };

        match self.domain {
            Domain::Categorical(labels) => labels
                .iter()
                .position(|&label| label == raw)
                .map(|code| code as f64)
                .ok_or_else(mismatch),
            Domain::Count => raw
                .parse::<u64>()
                .map(|v| v as f64)
                .map_err(|_| mismatch()),
            Domain::Continuous => match raw.parse::<f64>() {
                Ok(v) if self.domain.accepts(v) => Ok(v),
                _ => Err(mismatch()),
            },
        }
    }

    /// Category label for a code, `None` for numeric fields or unknown codes
    pub fn decode(&self, code: usize) -> Option<&'static str> {
        self.categories().get(code).copied()
    }

    pub fn accepts(&self, value: f64) -> bool {
        self.domain.accepts(value)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.domain.describe())
    }
}

static FIELDS: [Field; FEATURE_COUNT] = [
    Field::categorical("gender", &["Female", "Male"]),
    Field::categorical("SeniorCitizen", &["0", "1"]),
    Field::categorical("Partner", NO_YES),
    Field::categorical("Dependents", NO_YES),
    Field::count("tenure"),
    Field::categorical("PhoneService", NO_YES),
    Field::categorical("MultipleLines", &["No", "No phone service", "Yes"]),
    Field::categorical("InternetService", &["DSL", "Fiber optic", "No"]),
    Field::categorical("OnlineSecurity", INTERNET_ADDON),
    Field::categorical("OnlineBackup", INTERNET_ADDON),
    Field::categorical("DeviceProtection", INTERNET_ADDON),
    Field::categorical("TechSupport", INTERNET_ADDON),
    Field::categorical("StreamingTV", INTERNET_ADDON),
    Field::categorical("StreamingMovies", INTERNET_ADDON),
    Field::categorical(
        "Contract",
        &["Month-to-month", "One year", "Two year"],
    ),
    Field::categorical("PaperlessBilling", NO_YES),
    Field::categorical(
        "PaymentMethod",
        &[
            "Bank transfer (automatic)",
            "Credit card (automatic)",
            "Electronic check",
            "Mailed check",
        ],
    ),
    Field::continuous("MonthlyCharges"),
    Field::continuous("TotalCharges"),
];

/// All fields in model input order
pub fn fields() -> &'static [Field] {
    &FIELDS
}

/// Field names in model input order
pub fn field_names() -> impl Iterator<Item = &'static str> {
    FIELDS.iter().map(|f| f.name)
}

/// Position of a field in the input vector
pub fn index_of(name: &str) -> Option<usize> {
    FIELDS.iter().position(|f| f.name == name)
}

/// Look up a field by name
pub fn field(name: &str) -> Option<&'static Field> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Stable signature of field order and encodings, stored in every artifact
pub fn fingerprint() -> String {
    let body = FIELDS
        .iter()
        .map(|f| format!("{}:{}", f.name, f.domain.signature()))
        .collect::<Vec<_>>()
        .join(",");
    format!("v{SCHEMA_VERSION}/{body}")
}

/// Encode a raw label cell ("Yes"/"No") into 1/0
pub fn encode_label(raw: &str) -> Result<u8> {
    match raw.trim() {
        LABEL_POSITIVE => Ok(1),
        LABEL_NEGATIVE => Ok(0),
        other => Err(ChurnError::EncodingMismatch {
            field: LABEL_COLUMN.to_string(),
            value: other.to_string(),
        }),
    }
}
