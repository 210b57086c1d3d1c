//! License and free-trial bookkeeping.
//!
//! Two files back the state: the raw license token and a small JSON counter of
//! prompts spent on the free trial. Neither file is trusted for anything but
//! convenience; failures reading or writing them degrade to the safe defaults
//! and are queued as [`PersistWarning`]s instead of aborting the caller.

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument, warn};

use crate::core::token::{TokenCodec, TokenError, embedded_secret};
use crate::infra::clock::Clock;
use crate::infra::io::{read_optional, remove_if_exists, write_atomic};

/// Prompts granted before a license is required.
pub const FREE_QUOTA: u32 = 5;
pub const LICENSE_FILE: &str = ".aicode_license";
pub const USAGE_FILE: &str = ".aicode_usage.json";

/// Where entitlement state lives and which key verifies tokens.
#[derive(Debug, Clone)]
pub struct LicenseConfig {
    pub secret: Vec<u8>,
    pub license_path: PathBuf,
    pub usage_path: PathBuf,
    pub free_quota: u32,
}

impl LicenseConfig {
    /// Embedded secret with both state files under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            secret: embedded_secret().to_vec(),
            license_path: dir.join(LICENSE_FILE),
            usage_path: dir.join(USAGE_FILE),
            free_quota: FREE_QUOTA,
        }
    }

    /// The reset password is the tail of the secret read as text.
    fn admin_password(&self) -> &[u8] {
        &self.secret[self.secret.len().saturating_sub(4)..]
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self::in_dir(Path::new("."))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    Unlicensed { free_remaining: u32 },
    Licensed { expiration: NaiveDate },
}

/// Answer to "may I spend one gated action?"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consume {
    Permitted,
    RequiresToken,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistWarning {
    #[error("could not read license file {}: {source}", path.display())]
    LicenseRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("discarded license file {}: {reason}", path.display())]
    LicenseDiscarded { path: PathBuf, reason: TokenError },
    #[error("could not read usage file {}: {source}", path.display())]
    UsageRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("usage file {} is unreadable: {source}", path.display())]
    UsageParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not save usage file {}: {source}", path.display())]
    UsageWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("could not remove {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("could not save license file {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageRecord {
    #[serde(default)]
    prompts_used: u32,
}

pub struct EntitlementState {
    config: LicenseConfig,
    codec: TokenCodec,
    clock: Box<dyn Clock>,
    state: Entitlement,
    warnings: Vec<PersistWarning>,
}

impl std::fmt::Debug for EntitlementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitlementState")
            .field("state", &self.state)
            .field("license_path", &self.config.license_path)
            .field("usage_path", &self.config.usage_path)
            .finish_non_exhaustive()
    }
}

impl EntitlementState {
    /// Read both state files and settle on licensed or free-trial.
    pub fn load(config: LicenseConfig, clock: Box<dyn Clock>) -> Self {
        let codec = TokenCodec::new(&config.secret);
        let mut me = Self {
            state: Entitlement::Unlicensed { free_remaining: config.free_quota },
            config,
            codec,
            clock,
            warnings: Vec::new(),
        };
        me.initialize();
        me
    }

    #[instrument(skip(self), fields(license = %self.config.license_path.display()))]
    fn initialize(&mut self) {
        if let Some(expiration) = self.load_license() {
            self.state = Entitlement::Licensed { expiration };
            // A license supersedes the free-trial counter
            let usage = self.config.usage_path.clone();
            self.remove_noting(&usage);
            return;
        }

        let free_remaining = self.load_usage();
        debug!(free_remaining, "free trial");
        self.state = Entitlement::Unlicensed { free_remaining };
    }

    fn load_license(&mut self) -> Option<NaiveDate> {
        let path = self.config.license_path.clone();
        let token = match read_optional(&path) {
            Ok(Some(t)) => t,
            Ok(None) => return None,
            Err(source) => {
                self.note(PersistWarning::LicenseRead { path, source });
                return None;
            }
        };

        match self.codec.verify(&token, self.clock.today()) {
            Ok(expiration) => {
                info!(%expiration, "license active");
                Some(expiration)
            }
            Err(reason) => {
                self.remove_noting(&path);
                self.note(PersistWarning::LicenseDiscarded { path, reason });
                None
            }
        }
    }

    fn load_usage(&mut self) -> u32 {
        let quota = self.config.free_quota;
        let path = self.config.usage_path.clone();

        let text = match read_optional(&path) {
            Ok(Some(t)) => t,
            Ok(None) => return quota,
            Err(source) => {
                self.note(PersistWarning::UsageRead { path, source });
                return quota;
            }
        };

        match serde_json::from_str::<UsageRecord>(&text) {
            Ok(record) => quota.saturating_sub(record.prompts_used),
            Err(source) => {
                self.note(PersistWarning::UsageParse { path, source });
                quota
            }
        }
    }

    fn save_usage(&mut self, free_remaining: u32) {
        let record = UsageRecord {
            prompts_used: self.config.free_quota.saturating_sub(free_remaining),
        };
        // Serializing a single integer field cannot fail
        let body = serde_json::to_string(&record).unwrap_or_default();
        if let Err(source) = write_atomic(&self.config.usage_path, body.as_bytes()) {
            let path = self.config.usage_path.clone();
            self.note(PersistWarning::UsageWrite { path, source });
        }
    }

    fn remove_noting(&mut self, path: &Path) {
        if let Err(source) = remove_if_exists(path) {
            self.note(PersistWarning::Remove { path: path.to_path_buf(), source });
        }
    }

    fn note(&mut self, w: PersistWarning) {
        warn!("{w}");
        self.warnings.push(w);
    }

    pub fn entitlement(&self) -> Entitlement {
        self.state
    }

    pub fn is_licensed(&self) -> bool {
        matches!(self.state, Entitlement::Licensed { .. })
    }

    pub fn expiration(&self) -> Option<NaiveDate> {
        match self.state {
            Entitlement::Licensed { expiration } => Some(expiration),
            Entitlement::Unlicensed { .. } => None,
        }
    }

    /// Free prompts left; `None` while licensed.
    pub fn free_remaining(&self) -> Option<u32> {
        match self.state {
            Entitlement::Unlicensed { free_remaining } => Some(free_remaining),
            Entitlement::Licensed { .. } => None,
        }
    }

    pub fn days_remaining(&self) -> Option<i64> {
        self.expiration()
            .map(|e| (e - self.clock.today()).num_days())
    }

    /// Drain warnings accumulated since the last call.
    pub fn take_warnings(&mut self) -> Vec<PersistWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Spend one gated action if the license or the free trial allows it.
    pub fn try_consume(&mut self) -> Consume {
        match self.state {
            Entitlement::Licensed { .. } => Consume::Permitted,
            Entitlement::Unlicensed { free_remaining: 0 } => Consume::RequiresToken,
            Entitlement::Unlicensed { free_remaining } => {
                let left = free_remaining - 1;
                self.state = Entitlement::Unlicensed { free_remaining: left };
                self.save_usage(left);
                debug!(left, "free prompt spent");
                Consume::Permitted
            }
        }
    }

    /// Activate a license token. On any failure the state is left as it was.
    #[instrument(skip_all)]
    pub fn redeem(&mut self, token: &str) -> Result<NaiveDate, RedeemError> {
        let token = token.trim();
        let expiration = self.codec.verify(token, self.clock.today())?;

        let path = &self.config.license_path;
        write_atomic(path, token.as_bytes())
            .map_err(|source| RedeemError::Persist { path: path.clone(), source })?;

        self.state = Entitlement::Licensed { expiration };
        let usage = self.config.usage_path.clone();
        self.remove_noting(&usage);
        info!(%expiration, "license activated");
        Ok(expiration)
    }

    /// Administrative wipe of both state files. The comparison is
    /// constant-time, but the password is derived from the embedded secret
    /// and therefore recoverable from the binary.
    pub fn reset(&mut self, password: &str) -> bool {
        let ok: bool = password
            .as_bytes()
            .ct_eq(self.config.admin_password())
            .into();
        if !ok {
            warn!("reset rejected: wrong password");
            return false;
        }

        let license = self.config.license_path.clone();
        let usage = self.config.usage_path.clone();
        self.remove_noting(&license);
        self.remove_noting(&usage);
        self.initialize();
        info!("entitlement state reset");
        true
    }
}
