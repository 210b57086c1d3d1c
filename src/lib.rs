//! **aicode** - AI code assistant with a metered free trial, offline license
//! tokens and a guarded single-file workspace.
//!
//! Model output only reaches the disk through [`core::store::FileStore`], which
//! confines writes to the working directory, refuses executable file types,
//! backs files up before overwriting them and strips markdown fences.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Entitlement and safe file mutation
pub mod core {
    /// HMAC-signed expiry-date license tokens
    pub mod token;
    pub use token::{TokenCodec, TokenError};

    /// Free-trial counter and license state machine
    pub mod entitlement;
    pub use entitlement::{Consume, Entitlement, EntitlementState, LicenseConfig};

    /// Path, filename and size checks
    pub mod guard;
    pub use guard::{PathGuard, check_size, validate_filename};

    /// Timestamped copy-before-overwrite backups
    pub mod backup;
    pub use backup::{BackupConfig, BackupManager, BackupOutcome};

    /// Fenced code extraction from model replies
    pub mod fence;
    pub use fence::extract_code;

    /// Working set with guarded load/save
    pub mod store;
    pub use store::{FileStore, SaveRequest, StoreConfig, StoreError};
}

/// Interactive session and subcommand runners
pub mod app {
    pub mod command;
    pub use command::Command;

    /// Request text for chat, create and modify
    pub mod templates;

    pub mod repl;
    pub use repl::Session;

    pub mod run;
}

/// Infrastructure - configuration, I/O, terminal and model plumbing
pub mod infra {
    /// Layered configuration (file, AICODE_* env, flags)
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Atomic writes and tolerant reads
    pub mod io;
    pub use io::write_atomic;

    /// Injectable "today"
    pub mod clock;

    /// Synchronous user questions
    pub mod prompt;
    pub use prompt::{ConsolePrompter, Prompter};

    /// Styled stdout output
    pub mod console;

    /// tracing-subscriber setup
    pub mod logging;

    /// API keys from the environment and `.env`
    pub mod keys;
    pub use keys::KeyRing;

    /// Chat-completions HTTP client
    pub mod client;
    pub use client::{ChatClient, ModelClient};
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, load_config};
