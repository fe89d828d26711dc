//! CSV reading and writing
//!
//! Supports:
//! - raw customer tables (header row, text cells, optional double quotes)
//! - processed feature files (header = schema field names, numeric cells)
//! - processed label files (single 0/1 column, optional header)

use crate::core::{ChurnError, Result};
use crate::schema;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// A raw table of text cells as read from disk
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// 1-based data row number (excluding the header) of each row in the source
    pub row_numbers: Vec<usize>,
}

impl RawTable {
    /// Load a table from a CSV file with a header row
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ChurnError::DataLoad(format!("cannot open {}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file))
    }

    /// Load a table from any buffered reader
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut lines = reader.lines();

        let header_line = loop {
            match lines.next() {
                Some(line) => {
                    let line = line.map_err(|e| ChurnError::DataLoad(e.to_string()))?;
                    if !line.trim().is_empty() {
                        break line;
                    }
                }
                None => return Err(ChurnError::DataLoad("file is empty".to_string())),
            }
        };

        let headers = split_line(header_line.trim_start_matches('\u{feff}'));
        let mut rows = Vec::new();
        let mut row_numbers = Vec::new();

        for (i, line) in lines.enumerate() {
            let line = line.map_err(|e| ChurnError::DataLoad(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let cells = split_line(&line);
            if cells.len() != headers.len() {
                return Err(ChurnError::DataLoad(format!(
                    "row {} has {} cells, header has {}",
                    i + 1,
                    cells.len(),
                    headers.len()
                )));
            }
            rows.push(cells);
            row_numbers.push(i + 1);
        }

        Ok(RawTable {
            headers,
            rows,
            row_numbers,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by header name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Remove a column, returning whether it existed
    pub fn drop_column(&mut self, name: &str) -> bool {
        match self.column_index(name) {
            Some(idx) => {
                self.headers.remove(idx);
                for row in &mut self.rows {
                    row.remove(idx);
                }
                true
            }
            None => false,
        }
    }
}

/// Split one CSV line into trimmed cells, honouring double-quoted cells
fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Write a feature matrix with the schema header
pub fn write_features<W: Write>(mut writer: W, rows: &[Vec<f64>]) -> Result<()> {
    let header: Vec<&str> = schema::field_names().collect();
    writeln!(writer, "{}", header.join(","))?;
    for row in rows {
        let cells: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", cells.join(","))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write a label vector as a single `Churn` column
pub fn write_labels<W: Write>(mut writer: W, labels: &[u8]) -> Result<()> {
    writeln!(writer, "{}", schema::LABEL_COLUMN)?;
    for label in labels {
        writeln!(writer, "{label}")?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a processed feature file, checking its header against the schema
pub fn read_features<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let path = path.as_ref();
    let table = RawTable::from_file(path)?;

    let expected: Vec<&str> = schema::field_names().collect();
    if table.headers != expected {
        return Err(ChurnError::DataLoad(format!(
            "{}: header does not match the feature schema (expected {} columns starting with {:?}, got {:?})",
            path.display(),
            expected.len(),
            expected[0],
            table.headers
        )));
    }

    table
        .rows
        .iter()
        .zip(table.row_numbers.iter())
        .map(|(row, line)| {
            row.iter()
                .enumerate()
                .map(|(col, cell)| {
                    cell.parse::<f64>().map_err(|_| {
                        ChurnError::DataLoad(format!(
                            "{}: invalid value {cell:?} in row {line}, column {}",
                            path.display(),
                            expected[col]
                        ))
                    })
                })
                .collect()
        })
        .collect()
}

/// Read a processed label file; a non-numeric first line is treated as a header
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| ChurnError::DataLoad(format!("cannot open {}: {e}", path.display())))?;

    let mut labels = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| ChurnError::DataLoad(e.to_string()))?;
        let cell = line.trim();
        if cell.is_empty() {
            continue;
        }
        match cell.parse::<f64>() {
            Ok(v) if v == 0.0 || v == 1.0 => labels.push(v as u8),
            Ok(v) => {
                return Err(ChurnError::DataLoad(format!(
                    "{}: invalid label {v} on line {}, expected 0 or 1",
                    path.display(),
                    i + 1
                )))
            }
            Err(_) if i == 0 => continue,
            Err(_) => {
                return Err(ChurnError::DataLoad(format!(
                    "{}: invalid label {cell:?} on line {}",
                    path.display(),
                    i + 1
                )))
            }
        }
    }
    Ok(labels)
}
