// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Validate-then-copy mirror of the vault folder.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use super::vault_folder::{gunzip, list_store_files_in, remove_if_exists, write_atomic, StoreFile};
use super::{StoreError, VaultFolder};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub copied: usize,
    /// Mirrored files whose source no longer exists, removed from the backup.
    pub pruned: usize,
    /// Compressed files that failed validation and were not copied.
    pub corrupt: Vec<PathBuf>,
    /// Files that could not be read or written.
    pub failed: Vec<PathBuf>,
}

impl BackupReport {
    pub fn is_clean(&self) -> bool {
        self.corrupt.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub checked: usize,
    pub corrupt: Vec<PathBuf>,
    pub unreadable: Vec<PathBuf>,
}

enum FileOutcome {
    Copied,
    Corrupt(PathBuf),
    Failed(PathBuf),
}

enum Validation {
    Valid(Vec<u8>),
    Corrupt,
}

impl VaultFolder {
    /// Copies every valid store file into `backup_dir` and drops mirrored files whose source is
    /// gone, so a restore never brings back a consumed overflow buffer.
    ///
    /// Per-file problems are logged and reported; only failing to create `backup_dir` or to
    /// list either folder is an error.
    pub fn backup(&self, backup_dir: &Path) -> Result<BackupReport, StoreError> {
        fs::create_dir_all(backup_dir).map_err(|source| StoreError::Io {
            path: backup_dir.to_path_buf(),
            source,
        })?;
        let files = self.list_store_files()?;

        let outcomes = files
            .par_iter()
            .map(|(path, file)| self.backup_file(backup_dir, path, file))
            .collect::<Vec<_>>();

        let mut report = BackupReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Copied => report.copied += 1,
                FileOutcome::Corrupt(path) => report.corrupt.push(path),
                FileOutcome::Failed(path) => report.failed.push(path),
            }
        }
        for (path, file) in list_store_files_in(backup_dir)? {
            match self.prune_backup_file(&path, &file) {
                Ok(true) => report.pruned += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(path = ?path, error = %err, "cannot prune backup file");
                    report.failed.push(path);
                }
            }
        }
        tracing::info!(
            copied = report.copied,
            pruned = report.pruned,
            corrupt = report.corrupt.len(),
            failed = report.failed.len(),
            backup_dir = ?backup_dir,
            "backup finished"
        );
        Ok(report)
    }

    /// Validation pass only: lists compressed files that do not fully decompress.
    pub fn verify(&self) -> Result<VerifyReport, StoreError> {
        let files = self.list_store_files()?;
        let results = files
            .par_iter()
            .map(|(path, file)| {
                let result = self.with_user_lock(file.user(), || validate(path, file));
                (path, result)
            })
            .collect::<Vec<_>>();

        let mut report = VerifyReport {
            checked: results.len(),
            ..VerifyReport::default()
        };
        for (path, result) in results {
            match result {
                Ok(Validation::Valid(_)) => {}
                Ok(Validation::Corrupt) => report.corrupt.push(path.clone()),
                Err(err) => {
                    tracing::warn!(error = %err, "cannot read store file");
                    report.unreadable.push(path.clone());
                }
            }
        }
        Ok(report)
    }

    fn backup_file(&self, backup_dir: &Path, path: &Path, file: &StoreFile) -> FileOutcome {
        let Some(name) = path.file_name() else {
            return FileOutcome::Failed(path.to_path_buf());
        };
        let target = backup_dir.join(name);
        self.with_user_lock(file.user(), || match validate(path, file) {
            Ok(Validation::Valid(bytes)) => {
                match write_atomic(backup_dir, &target, &bytes, self.durability()) {
                    Ok(()) => FileOutcome::Copied,
                    Err(err) => {
                        tracing::error!(path = ?path, error = %err, "cannot back up store file");
                        FileOutcome::Failed(path.to_path_buf())
                    }
                }
            }
            Ok(Validation::Corrupt) => {
                tracing::warn!(path = ?path, "skipping corrupt store file during backup");
                FileOutcome::Corrupt(path.to_path_buf())
            }
            Err(err) => {
                tracing::error!(path = ?path, error = %err, "cannot read store file for backup");
                FileOutcome::Failed(path.to_path_buf())
            }
        })
    }

    /// Removes the backup copy at `path` if the folder no longer has the file it mirrors.
    fn prune_backup_file(&self, path: &Path, file: &StoreFile) -> Result<bool, StoreError> {
        let Some(name) = path.file_name() else {
            return Ok(false);
        };
        let source = self.root().join(name);
        self.with_user_lock(file.user(), || {
            if source.exists() {
                return Ok(false);
            }
            let removed = remove_if_exists(path)?;
            if removed {
                tracing::debug!(path = ?path, "pruned backup of a removed store file");
            }
            Ok(removed)
        })
    }
}

/// Reads `path`; compressed files must decompress completely to be valid.
fn validate(path: &Path, file: &StoreFile) -> Result<Validation, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if file.is_compressed() && gunzip(&bytes).is_err() {
        return Ok(Validation::Corrupt);
    }
    Ok(Validation::Valid(bytes))
}
