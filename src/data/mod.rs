//! Data loading and preprocessing
//!
//! This module turns the raw customer CSV into the processed train/test
//! files the trainer consumes, and reads those files back.

pub mod csv;
pub mod preprocess;

pub use self::csv::RawTable;
pub use self::preprocess::{CleanReport, PreprocessReport};
