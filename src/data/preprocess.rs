//! Raw customer table -> processed train/test splits

use crate::config::PreprocessConfig;
use crate::core::{ChurnError, Dataset, Result};
use crate::data::csv::{self, RawTable};
use crate::schema;
use crate::utils::fs::StagedFiles;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::path::{Path, PathBuf};

/// Processed file names inside an output directory
pub const X_TRAIN_FILE: &str = "X_train.csv";
pub const X_TEST_FILE: &str = "X_test.csv";
pub const Y_TRAIN_FILE: &str = "y_train.csv";
pub const Y_TEST_FILE: &str = "y_test.csv";

/// Outcome of the cleaning step
#[derive(Debug, Clone, PartialEq)]
pub struct CleanReport {
    pub rows_kept: usize,
    /// 1-based source row numbers of the dropped rows, ascending
    pub dropped_rows: Vec<usize>,
}

impl CleanReport {
    pub fn rows_dropped(&self) -> usize {
        self.dropped_rows.len()
    }
}

/// Summary of a complete preprocessing run
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessReport {
    pub rows_read: usize,
    pub rows_dropped: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub train_churn_rate: f64,
    pub test_churn_rate: f64,
    pub output_dir: PathBuf,
}

/// Load a raw customer CSV
pub fn load<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let table = RawTable::from_file(path)?;
    if table.is_empty() {
        return Err(ChurnError::EmptyDataset);
    }
    Ok(table)
}

/// Drop the identifier column, coerce charges to numbers, drop incomplete rows
///
/// A charge cell that does not parse as a number counts as missing. Rows with
/// any missing cell are dropped; the same input always drops the same rows.
pub fn clean(mut table: RawTable) -> Result<(RawTable, CleanReport)> {
    if !table.drop_column(schema::ID_COLUMN) {
        warn!("Column {} not present, nothing to drop", schema::ID_COLUMN);
    }

    let charge_columns: Vec<usize> = schema::CHARGE_COLUMNS
        .iter()
        .filter_map(|name| table.column_index(name))
        .collect();

    let mut kept_rows = Vec::with_capacity(table.rows.len());
    let mut kept_numbers = Vec::with_capacity(table.rows.len());
    let mut dropped_rows = Vec::new();

    for (mut row, number) in table.rows.into_iter().zip(table.row_numbers) {
        for &col in &charge_columns {
            if row[col].parse::<f64>().map(|v| !v.is_finite()).unwrap_or(true) {
                row[col].clear();
            }
        }

        if row.iter().any(|cell| cell.is_empty()) {
            dropped_rows.push(number);
        } else {
            kept_rows.push(row);
            kept_numbers.push(number);
        }
    }

    if !dropped_rows.is_empty() {
        info!(
            "Dropped {} rows with missing values (first: row {})",
            dropped_rows.len(),
            dropped_rows[0]
        );
    }

    let report = CleanReport {
        rows_kept: kept_rows.len(),
        dropped_rows,
    };

    Ok((
        RawTable {
            headers: table.headers,
            rows: kept_rows,
            row_numbers: kept_numbers,
        },
        report,
    ))
}

/// Encode labels and every schema field into a numeric dataset in schema order
pub fn encode(table: &RawTable) -> Result<Dataset> {
    let label_col = table.column_index(schema::LABEL_COLUMN).ok_or_else(|| {
        ChurnError::DataLoad(format!("missing label column {}", schema::LABEL_COLUMN))
    })?;

    let mut columns = Vec::with_capacity(schema::FEATURE_COUNT);
    for field in schema::fields() {
        let idx = table
            .column_index(field.name)
            .ok_or_else(|| ChurnError::DataLoad(format!("missing feature column {}", field.name)))?;
        columns.push((field, idx));
    }

    let extra: Vec<&String> = table
        .headers
        .iter()
        .filter(|h| h.as_str() != schema::LABEL_COLUMN && schema::index_of(h).is_none())
        .collect();
    if !extra.is_empty() {
        warn!("Ignoring columns outside the feature schema: {extra:?}");
    }

    let mut features = Vec::with_capacity(table.len());
    let mut labels = Vec::with_capacity(table.len());

    for row in &table.rows {
        let encoded = columns
            .iter()
            .map(|(field, idx)| field.encode(&row[*idx]))
            .collect::<Result<Vec<f64>>>()?;
        features.push(encoded);
        labels.push(schema::encode_label(&row[label_col])?);
    }

    Dataset::new(features, labels)
}

/// Seeded, non-stratified train/test partition
///
/// The first `ceil(n * test_fraction)` rows of a seeded permutation form the
/// test partition, the rest the training partition.
pub fn split(data: &Dataset, test_fraction: f64, seed: u64) -> Result<(Dataset, Dataset)> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ChurnError::InvalidParameter(format!(
            "Test fraction must be between 0 and 1, got: {test_fraction}"
        )));
    }

    let n = data.len();
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(ChurnError::InvalidParameter(format!(
            "Cannot split {n} rows with test fraction {test_fraction}: a partition would be empty"
        )));
    }

    let mut permutation: Vec<usize> = (0..n).collect();
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let (test_idx, train_idx) = permutation.split_at(n_test);
    Ok((data.select(train_idx), data.select(test_idx)))
}

/// Write the four processed files; nothing is left in place unless all succeed
pub fn save<P: AsRef<Path>>(train: &Dataset, test: &Dataset, output_dir: P) -> Result<()> {
    let dir = output_dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut staged = StagedFiles::new();
    staged.stage(dir.join(X_TRAIN_FILE), |w| csv::write_features(w, &train.features))?;
    staged.stage(dir.join(X_TEST_FILE), |w| csv::write_features(w, &test.features))?;
    staged.stage(dir.join(Y_TRAIN_FILE), |w| csv::write_labels(w, &train.labels))?;
    staged.stage(dir.join(Y_TEST_FILE), |w| csv::write_labels(w, &test.labels))?;
    staged.commit()
}

/// Load the four processed files written by [`save`]
pub fn load_split<P: AsRef<Path>>(dir: P) -> Result<(Dataset, Dataset)> {
    let dir = dir.as_ref();
    let train = Dataset::new(
        csv::read_features(dir.join(X_TRAIN_FILE))?,
        csv::read_labels(dir.join(Y_TRAIN_FILE))?,
    )
    .map_err(|e| ChurnError::DataLoad(format!("training split: {e}")))?;
    let test = Dataset::new(
        csv::read_features(dir.join(X_TEST_FILE))?,
        csv::read_labels(dir.join(Y_TEST_FILE))?,
    )
    .map_err(|e| ChurnError::DataLoad(format!("test split: {e}")))?;
    Ok((train, test))
}

/// Run the whole preprocessing stage: load, clean, encode, split, save
pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output_dir: Q,
    config: &PreprocessConfig,
) -> Result<PreprocessReport> {
    let input = input.as_ref();
    info!("Loading raw data from {}", input.display());
    let raw = load(input)?;
    let rows_read = raw.len();

    let (cleaned, clean_report) = clean(raw)?;
    if cleaned.is_empty() {
        return Err(ChurnError::EmptyDataset);
    }

    let encoded = encode(&cleaned)?;
    let (train, test) = split(&encoded, config.test_fraction, config.seed)?;
    save(&train, &test, &output_dir)?;

    let report = PreprocessReport {
        rows_read,
        rows_dropped: clean_report.rows_dropped(),
        train_rows: train.len(),
        test_rows: test.len(),
        train_churn_rate: train.churn_rate(),
        test_churn_rate: test.churn_rate(),
        output_dir: output_dir.as_ref().to_path_buf(),
    };

    info!(
        "Preprocessing complete: {} rows read, {} dropped, {} train / {} test",
        report.rows_read, report.rows_dropped, report.train_rows, report.test_rows
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    const HEADER: &str = "customerID,gender,SeniorCitizen,Partner,Dependents,tenure,PhoneService,MultipleLines,InternetService,OnlineSecurity,OnlineBackup,DeviceProtection,TechSupport,StreamingTV,StreamingMovies,Contract,PaperlessBilling,PaymentMethod,MonthlyCharges,TotalCharges,Churn";

    fn raw(rows: &[&str]) -> RawTable {
        let text = format!("{HEADER}\n{}\n", rows.join("\n"));
        RawTable::from_reader(Cursor::new(text)).unwrap()
    }

    const ROW_A: &str = "7590-VHVEG,Female,0,Yes,No,1,No,No phone service,DSL,No,Yes,No,No,No,No,Month-to-month,Yes,Electronic check,29.85,29.85,No";
    const ROW_B: &str = "5575-GNVDE,Male,0,No,No,34,Yes,No,DSL,Yes,No,Yes,No,No,No,One year,No,Mailed check,56.95,1889.5,No";
    const ROW_BLANK: &str = "4472-LVYGI,Female,0,Yes,Yes,0,No,No phone service,DSL,Yes,No,Yes,Yes,Yes,No,Two year,Yes,Bank transfer (automatic),52.55, ,No";
    const ROW_C: &str = "9237-HQITU,Female,0,No,No,2,Yes,No,Fiber optic,No,No,No,No,No,No,Month-to-month,Yes,Electronic check,70.7,151.65,Yes";

    #[test]
    fn test_clean_drops_blank_charges_reproducibly() {
        let (cleaned, report) = clean(raw(&[ROW_A, ROW_BLANK, ROW_B])).unwrap();
        assert_eq!(report.rows_kept, 2);
        assert_eq!(report.dropped_rows, vec![2]);
        assert_eq!(cleaned.column_index(schema::ID_COLUMN), None);

        let (_, again) = clean(raw(&[ROW_A, ROW_BLANK, ROW_B])).unwrap();
        assert_eq!(again, report);
    }

    #[test]
    fn test_encode_uses_schema_order_and_codes() {
        let (cleaned, _) = clean(raw(&[ROW_A, ROW_C])).unwrap();
        let data = encode(&cleaned).unwrap();

        assert_eq!(data.labels, vec![0, 1]);
        assert_eq!(data.dim(), schema::FEATURE_COUNT);
        // Female=0, tenure 2, Fiber optic=1, Electronic check=2
        let row = &data.features[1];
        assert_eq!(row[0], 0.0);
        assert_eq!(row[4], 2.0);
        assert_eq!(row[7], 1.0);
        assert_eq!(row[16], 2.0);
        assert_eq!(row[17], 70.7);
        assert_eq!(row[18], 151.65);
    }

    #[test]
    fn test_encode_rejects_unknown_category() {
        let bad = ROW_A.replace("Month-to-month", "Weekly");
        let (cleaned, _) = clean(raw(&[&bad])).unwrap();
        match encode(&cleaned) {
            Err(ChurnError::EncodingMismatch { field, value }) => {
                assert_eq!(field, "Contract");
                assert_eq!(value, "Weekly");
            }
            other => panic!("expected encoding mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_is_independent_of_column_order() {
        // Same row with gender and SeniorCitizen swapped in the header and cells
        let header = HEADER.replacen("gender,SeniorCitizen", "SeniorCitizen,gender", 1);
        let row = ROW_C.replacen("Female,0", "0,Female", 1);
        let swapped = RawTable::from_reader(Cursor::new(format!("{header}\n{row}\n"))).unwrap();

        let a = encode(&clean(raw(&[ROW_C])).unwrap().0).unwrap();
        let b = encode(&clean(swapped).unwrap().0).unwrap();
        assert_eq!(a, b);
    }

    fn synthetic(n: usize) -> Dataset {
        Dataset::new(
            (0..n).map(|i| vec![i as f64]).collect(),
            (0..n).map(|i| (i % 3 == 0) as u8).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_split_sizes_and_reproducibility() {
        let data = synthetic(101);
        let (train, test) = split(&data, 0.2, 42).unwrap();
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);

        let (train2, test2) = split(&data, 0.2, 42).unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);

        let (_, other_test) = split(&data, 0.2, 7).unwrap();
        assert_ne!(test, other_test);
    }

    #[test]
    fn test_split_is_a_partition() {
        let data = synthetic(50);
        let (train, test) = split(&data, 0.2, 1).unwrap();
        let mut all: Vec<f64> = train
            .features
            .iter()
            .chain(test.features.iter())
            .map(|r| r[0])
            .collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, (0..50).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_rejects_bad_fraction() {
        let data = synthetic(10);
        assert!(split(&data, 0.0, 1).is_err());
        assert!(split(&data, 1.0, 1).is_err());
        assert!(split(&synthetic(1), 0.2, 1).is_err());
    }

    #[test]
    fn test_save_and_load_split() {
        let dir = TempDir::new().unwrap();
        let (cleaned, _) = clean(raw(&[ROW_A, ROW_B, ROW_C, ROW_A, ROW_C])).unwrap();
        let data = encode(&cleaned).unwrap();
        let (train, test) = split(&data, 0.2, 42).unwrap();

        save(&train, &test, dir.path()).unwrap();
        for name in [X_TRAIN_FILE, X_TEST_FILE, Y_TRAIN_FILE, Y_TEST_FILE] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }

        let (train2, test2) = load_split(dir.path()).unwrap();
        assert_eq!(train, train2);
        assert_eq!(test, test2);
    }

    #[test]
    fn test_run_on_missing_file_fails_without_output() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("processed");
        let result = run(
            dir.path().join("nope.csv"),
            &out,
            &PreprocessConfig::default(),
        );
        assert!(matches!(result, Err(ChurnError::DataLoad(_))));
        assert!(!out.join(X_TRAIN_FILE).exists());
    }
}
