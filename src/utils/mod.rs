//! Utility functions for the churn pipeline

/// Feature scaling utilities
pub mod scaling {
    use crate::core::{ChurnError, Result};
    use serde::{Deserialize, Serialize};

    /// Per-feature standardization statistics: `(x - mean) / scale`
    ///
    /// `scale` is the population standard deviation of the training data, or
    /// 1.0 for constant features so they map to 0 instead of dividing by zero.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct StandardScaler {
        pub means: Vec<f64>,
        pub scales: Vec<f64>,
        pub n_samples_seen: usize,
    }

    impl StandardScaler {
        /// Compute scaling parameters from training rows
        pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
            let n_features = match rows.first() {
                Some(row) => row.len(),
                None => return Err(ChurnError::EmptyDataset),
            };

            let n = rows.len() as f64;
            let mut means = vec![0.0; n_features];
            for row in rows {
                if row.len() != n_features {
                    return Err(ChurnError::DimensionMismatch {
                        expected: n_features,
                        actual: row.len(),
                    });
                }
                for (m, &v) in means.iter_mut().zip(row) {
                    *m += v;
                }
            }
            for m in &mut means {
                *m /= n;
            }

            let mut variances = vec![0.0; n_features];
            for row in rows {
                for ((var, &v), &m) in variances.iter_mut().zip(row).zip(&means) {
                    *var += (v - m).powi(2);
                }
            }

            let scales: Vec<f64> = variances
                .into_iter()
                .map(|var| {
                    let std = (var / n).sqrt();
                    if std < 1e-12 {
                        1.0
                    } else {
                        std
                    }
                })
                .collect();

            if means.iter().chain(scales.iter()).any(|v| !v.is_finite()) {
                return Err(ChurnError::Training(
                    "training features contain non-finite values".to_string(),
                ));
            }

            Ok(Self {
                means,
                scales,
                n_samples_seen: rows.len(),
            })
        }

        pub fn n_features(&self) -> usize {
            self.means.len()
        }

        /// Transform a single row using fitted parameters
        pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
            if row.len() != self.n_features() {
                return Err(ChurnError::DimensionMismatch {
                    expected: self.n_features(),
                    actual: row.len(),
                });
            }
            Ok(row
                .iter()
                .zip(self.means.iter().zip(&self.scales))
                .map(|(&v, (&mean, &scale))| (v - mean) / scale)
                .collect())
        }

        /// Transform multiple rows
        pub fn transform(&self, rows: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
            rows.iter().map(|row| self.transform_row(row)).collect()
        }
    }

    /// Convenience function: fit and transform in one step
    pub fn fit_transform(rows: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, StandardScaler)> {
        let scaler = StandardScaler::fit(rows)?;
        let transformed = scaler.transform(rows)?;
        Ok((transformed, scaler))
    }
}

/// Crash-safe file output
pub mod fs {
    use crate::core::Result;
    use log::warn;
    use std::fs::{self, File};
    use std::io::{BufWriter, Write};
    use std::path::{Path, PathBuf};
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Sibling temp path that is unique per process and call
    pub fn temp_path_for(path: &Path) -> PathBuf {
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.tmp-{}-{nonce}", std::process::id()))
    }

    /// A group of files written to temp paths and renamed into place together
    ///
    /// Nothing reaches its final path until [`StagedFiles::commit`]; dropping
    /// an uncommitted group removes its temp files. A commit that fails part
    /// way restores the files it already replaced, so the group lands whole or
    /// not at all. A process crash mid-commit is not covered; artifact pairs
    /// catch that case through their shared pair id.
    #[derive(Debug, Default)]
    pub struct StagedFiles {
        pending: Vec<(PathBuf, PathBuf)>,
    }

    impl StagedFiles {
        pub fn new() -> Self {
            Self::default()
        }

        /// Write one file's contents to a temp path next to `path`
        pub fn stage<F>(&mut self, path: PathBuf, write: F) -> Result<()>
        where
            F: FnOnce(&mut BufWriter<File>) -> Result<()>,
        {
            let tmp = temp_path_for(&path);
            let result = File::create(&tmp).map_err(Into::into).and_then(|file| {
                let mut writer = BufWriter::new(file);
                write(&mut writer)?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
                Ok(())
            });

            match result {
                Ok(()) => {
                    self.pending.push((tmp, path));
                    Ok(())
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp);
                    Err(e)
                }
            }
        }

        /// Rename every staged file to its final path, in staging order
        ///
        /// If any rename fails, files renamed earlier in this commit get their
        /// previous contents back (or are removed if they did not exist).
        pub fn commit(mut self) -> Result<()> {
            let mut remaining = std::mem::take(&mut self.pending).into_iter();
            let mut committed: Vec<(PathBuf, Option<PathBuf>)> = Vec::new();

            while let Some((tmp, path)) = remaining.next() {
                if let Err(e) = replace(&tmp, &path, &mut committed) {
                    let _ = fs::remove_file(&tmp);
                    for (tmp, _) in remaining.by_ref() {
                        let _ = fs::remove_file(tmp);
                    }
                    rollback(committed);
                    return Err(e);
                }
            }

            for backup in committed.into_iter().filter_map(|(_, backup)| backup) {
                let _ = fs::remove_file(backup);
            }
            Ok(())
        }
    }

    /// Sibling path holding the previous contents of `path` during a commit
    fn backup_path_for(path: &Path) -> PathBuf {
        let tmp = temp_path_for(path);
        let name = tmp
            .file_name()
            .map(|n| n.to_string_lossy().replacen(".tmp-", ".bak-", 1))
            .unwrap_or_default();
        tmp.with_file_name(name)
    }

    /// Move `tmp` over `path`, keeping a backup of an existing file first
    fn replace(
        tmp: &Path,
        path: &Path,
        committed: &mut Vec<(PathBuf, Option<PathBuf>)>,
    ) -> Result<()> {
        let backup = if path.is_file() {
            let backup = backup_path_for(path);
            fs::hard_link(path, &backup).or_else(|_| fs::copy(path, &backup).map(|_| ()))?;
            Some(backup)
        } else {
            None
        };

        if let Err(e) = fs::rename(tmp, path) {
            if let Some(backup) = backup {
                let _ = fs::remove_file(backup);
            }
            return Err(e.into());
        }
        committed.push((path.to_path_buf(), backup));
        Ok(())
    }

    /// Undo the renames of a failed commit, newest first
    fn rollback(committed: Vec<(PathBuf, Option<PathBuf>)>) {
        for (path, backup) in committed.into_iter().rev() {
            let restored = match backup {
                Some(backup) => fs::rename(&backup, &path),
                None => fs::remove_file(&path),
            };
            if let Err(e) = restored {
                warn!("Could not roll back {}: {e}", path.display());
            }
        }
    }

    impl Drop for StagedFiles {
        fn drop(&mut self) {
            for (tmp, _) in &self.pending {
                let _ = fs::remove_file(tmp);
            }
        }
    }
}
