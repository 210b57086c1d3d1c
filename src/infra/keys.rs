//! API keys gathered from the environment and a local `.env` file.
//!
//! Keys added during a session are written back to `.env` as a single
//! comma-separated `GROQ_API_KEYS` entry; every other line of the file is kept.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::infra::io::{read_optional, write_atomic};

pub const ENV_FILE: &str = ".env";
pub const KEYS_VAR: &str = "GROQ_API_KEYS";
pub const KEY_VAR: &str = "GROQ_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: dotenvy::Error },
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("API keys cannot contain whitespace, commas or quotes")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAdded {
    Added,
    Exists,
}

/// Known keys plus the one requests currently use.
#[derive(Debug, Clone)]
pub struct KeyRing {
    env_file: PathBuf,
    keys: Vec<String>,
    active: Option<String>,
    /// Given on the command line or in config; counted but never written out.
    transient: Option<String>,
}

impl KeyRing {
    /// Process environment first, then `env_file`, per variable.
    pub fn load(env_file: impl Into<PathBuf>) -> Result<Self, KeyError> {
        let env_file = env_file.into();
        let file_vars = read_env_file(&env_file)?;
        Ok(Self::from_lookup(env_file, |name| {
            std::env::var(name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(&file_vars, name))
        }))
    }

    /// Keys stored in `env_file` only.
    pub fn from_file(env_file: impl Into<PathBuf>) -> Result<Self, KeyError> {
        let env_file = env_file.into();
        let file_vars = read_env_file(&env_file)?;
        Ok(Self::from_lookup(env_file, |name| lookup(&file_vars, name)))
    }

    fn from_lookup(env_file: PathBuf, get: impl Fn(&str) -> Option<String>) -> Self {
        let mut keys = get(KEYS_VAR).map(|v| split_keys(&v)).unwrap_or_default();
        if keys.is_empty() {
            keys = get(KEY_VAR).map(|v| split_keys(&v)).unwrap_or_default();
        }
        let active = keys.first().cloned();
        debug!(count = keys.len(), "api keys loaded");
        Self { env_file, keys, active, transient: None }
    }

    /// Make a command-line or config key the active one for this run.
    pub fn with_preferred(mut self, key: Option<String>) -> Self {
        let Some(key) = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty()) else {
            return self;
        };
        if !self.keys.contains(&key) {
            self.keys.insert(0, key.clone());
            self.transient = Some(key.clone());
        }
        self.active = Some(key);
        self
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Remember `key`, make it active and write the list back to `.env`.
    /// A key already known is only activated.
    #[instrument(skip_all)]
    pub fn add(&mut self, key: &str) -> Result<KeyAdded, KeyError> {
        let key = key.trim();
        if key.is_empty() || key.contains(|c: char| c.is_whitespace() || matches!(c, ',' | '\'' | '"')) {
            return Err(KeyError::Invalid);
        }

        self.active = Some(key.to_string());
        if self.keys.iter().any(|k| k == key) {
            return Ok(KeyAdded::Exists);
        }
        self.keys.push(key.to_string());
        self.persist()?;
        Ok(KeyAdded::Added)
    }

    fn persist(&self) -> Result<(), KeyError> {
        let stored: Vec<&str> = self
            .keys
            .iter()
            .filter(|k| self.transient.as_ref() != Some(*k))
            .map(String::as_str)
            .collect();
        let entry = format!("{KEYS_VAR}='{}'", stored.join(","));

        let write_err = |source| KeyError::Write { path: self.env_file.clone(), source };
        let existing = read_optional(&self.env_file).map_err(write_err)?.unwrap_or_default();
        let updated = replace_entry(&existing, &entry);
        write_atomic(&self.env_file, updated.as_bytes()).map_err(write_err)?;
        debug!(path = %self.env_file.display(), count = stored.len(), "api keys saved");
        Ok(())
    }
}

fn read_env_file(path: &Path) -> Result<Vec<(String, String)>, KeyError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let read_err = |source| KeyError::Read { path: path.to_path_buf(), source };
    dotenvy::from_path_iter(path)
        .map_err(read_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)
}

fn lookup(vars: &[(String, String)], name: &str) -> Option<String> {
    vars.iter()
        .rev()
        .find(|(k, v)| k == name && !v.trim().is_empty())
        .map(|(_, v)| v.clone())
}

fn split_keys(raw: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for k in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
        if !keys.iter().any(|known| known == k) {
            keys.push(k.to_string());
        }
    }
    keys
}

/// Swap the first `GROQ_API_KEYS=` line for `entry`, drop later ones, or
/// append when absent.
fn replace_entry(existing: &str, entry: &str) -> String {
    let is_keys_line = |line: &str| {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").unwrap_or(line).trim_start();
        line.strip_prefix(KEYS_VAR)
            .is_some_and(|rest| rest.trim_start().starts_with('='))
    };

    let mut out = String::with_capacity(existing.len() + entry.len() + 1);
    let mut written = false;
    for line in existing.lines() {
        if is_keys_line(line) {
            if !written {
                out.push_str(entry);
                out.push('\n');
                written = true;
            }
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    if !written {
        out.push_str(entry);
        out.push('\n');
    }
    out
}
