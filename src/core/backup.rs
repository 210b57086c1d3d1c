//! Copy-before-overwrite backups.
//!
//! Every backup is a flat file `<stem>_<YYYYMMDD_HHMMSS><suffix>.backup` in a
//! single directory. A failed backup is reported but never blocks the write
//! that follows it. Backups are never pruned.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Default backup directory, relative to the working directory.
pub const BACKUP_DIR: &str = ".aicode_backups";

const BACKUP_EXT: &str = "backup";

#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self { enabled: true, dir: PathBuf::from(BACKUP_DIR) }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("could not create backup directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not read {} for backup: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not write backup {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What happened when a backup was requested.
#[derive(Debug)]
pub enum BackupOutcome {
    /// Backups are switched off in configuration.
    Disabled,
    /// Nothing to back up: the target does not exist yet.
    Missing,
    Created(PathBuf),
    /// Warning only; the caller proceeds with its overwrite.
    Failed(BackupError),
}

impl BackupOutcome {
    pub fn created(&self) -> Option<&Path> {
        match self {
            BackupOutcome::Created(p) => Some(p),
            _ => None,
        }
    }
}

/// One file in the backup directory.
#[derive(Debug, Clone, Serialize)]
pub struct BackupEntry {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: DateTime<Local>,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    config: BackupConfig,
}

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.config.dir
    }

    /// Create the backup directory up front when backups are on.
    pub fn ensure_dir(&self) -> Result<(), BackupError> {
        if !self.config.enabled {
            return Ok(());
        }
        fs::create_dir_all(&self.config.dir).map_err(|source| BackupError::CreateDir {
            path: self.config.dir.clone(),
            source,
        })
    }

    /// Copy the current text of `path` aside before it gets overwritten.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn backup_if_exists(&self, path: &Path) -> BackupOutcome {
        if !self.config.enabled {
            return BackupOutcome::Disabled;
        }
        if !path.exists() {
            return BackupOutcome::Missing;
        }

        match self.copy_aside(path) {
            Ok(target) => {
                info!(backup = %target.display(), "backup created");
                BackupOutcome::Created(target)
            }
            Err(e) => {
                warn!("{e}");
                BackupOutcome::Failed(e)
            }
        }
    }

    fn copy_aside(&self, path: &Path) -> Result<PathBuf, BackupError> {
        let text = fs::read_to_string(path)
            .map_err(|source| BackupError::Read { path: path.to_path_buf(), source })?;
        self.ensure_dir()?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        // Two backups of one file within the same second get a counter
        // instead of clobbering each other.
        let mut n = 0u32;
        loop {
            let target = self.config.dir.join(backup_name(path, &stamp, n));
            match OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(mut f) => {
                    f.write_all(text.as_bytes())
                        .and_then(|_| f.sync_all())
                        .map_err(|source| BackupError::Write { path: target.clone(), source })?;
                    return Ok(target);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(source) => return Err(BackupError::Write { path: target, source }),
            }
        }
    }

    /// Backups on disk, newest first. A missing directory lists as empty.
    pub fn list(&self) -> io::Result<Vec<BackupEntry>> {
        let rd = match fs::read_dir(&self.config.dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut out = Vec::new();
        for entry in rd {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXT) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            out.push(BackupEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                size_bytes: meta.len(),
                modified: meta.modified().map(DateTime::<Local>::from).unwrap_or_else(|_| Local::now()),
            });
        }

        out.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
        Ok(out)
    }
}

/// `<stem>_<stamp><suffix>.backup`, with `-<n>` before `.backup` for n > 0.
fn backup_name(path: &Path, stamp: &str, n: u32) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    if n == 0 {
        format!("{stem}_{stamp}{suffix}.{BACKUP_EXT}")
    } else {
        format!("{stem}_{stamp}{suffix}-{n}.{BACKUP_EXT}")
    }
}
