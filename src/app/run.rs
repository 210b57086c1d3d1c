//! One-shot subcommands and the wiring for the interactive session.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tabled::{Table, Tabled};

use crate::app::repl::Session;
use crate::cli::{AppContext, BackupsArgs, ExtractArgs, RedeemArgs, ResetArgs, StatusArgs};
use crate::core::backup::BackupManager;
use crate::core::entitlement::{EntitlementState, LicenseConfig};
use crate::core::fence::extract_code;
use crate::core::guard::PathGuard;
use crate::core::store::FileStore;
use crate::infra::client::ChatClient;
use crate::infra::clock::SystemClock;
use crate::infra::config::Config;
use crate::infra::console::Printer;
use crate::infra::keys::{ENV_FILE, KeyRing};
use crate::infra::prompt::{ConsolePrompter, Prompter};

fn entitlement() -> EntitlementState {
    EntitlementState::load(LicenseConfig::default(), Box::new(SystemClock))
}

fn key_ring(cfg: &Config) -> Result<KeyRing> {
    let ring = KeyRing::load(ENV_FILE).context("Failed to read API keys")?;
    Ok(ring.with_preferred(cfg.model.api_key.clone()))
}

fn flush_warnings(state: &mut EntitlementState, printer: &Printer) {
    for w in state.take_warnings() {
        printer.warn(w);
    }
}

pub fn chat(cfg: &Config, ctx: &AppContext) -> Result<()> {
    let printer = Printer::new(ctx);
    let guard = PathGuard::current_dir().context("Failed to resolve working directory")?;
    let store = FileStore::new(guard, cfg.store_config());
    if let Err(e) = store.backups().ensure_dir() {
        printer.warn(e);
    }
    let client = ChatClient::new(cfg.model.clone()).context("Failed to build HTTP client")?;

    let mut session = Session::new(
        entitlement(),
        store,
        Box::new(client),
        key_ring(cfg)?,
        Box::new(ConsolePrompter),
        printer,
    );
    session.run()
}

#[derive(Debug, Serialize)]
struct StatusReport {
    licensed: bool,
    expiration: Option<NaiveDate>,
    days_remaining: Option<i64>,
    free_remaining: Option<u32>,
    model: String,
    api_keys: usize,
    max_file_size: u64,
    backups_enabled: bool,
    backup_dir: PathBuf,
}

pub fn status(args: StatusArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let printer = Printer::new(ctx);
    let mut state = entitlement();
    flush_warnings(&mut state, &printer);

    let store = cfg.store_config();
    let report = StatusReport {
        licensed: state.is_licensed(),
        expiration: state.expiration(),
        days_remaining: state.days_remaining(),
        free_remaining: state.free_remaining(),
        model: cfg.model.name.clone(),
        api_keys: key_ring(cfg)?.len(),
        max_file_size: store.max_file_size,
        backups_enabled: store.backup.enabled,
        backup_dir: store.backup.dir,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match (report.expiration, report.days_remaining) {
        (Some(exp), Some(days)) => println!("License: valid until {exp} ({days} days)"),
        _ => println!(
            "License: none ({} free prompts left)",
            report.free_remaining.unwrap_or(0)
        ),
    }
    println!("Model: {}", report.model);
    println!("API keys: {}", report.api_keys);
    println!("Max file size: {} bytes", report.max_file_size);
    if report.backups_enabled {
        println!("Backups: {}", report.backup_dir.display());
    } else {
        println!("Backups: disabled");
    }
    Ok(())
}

pub fn redeem(args: RedeemArgs, ctx: &AppContext) -> Result<()> {
    let printer = Printer::new(ctx);
    let mut state = entitlement();
    let result = state.redeem(&args.token);
    flush_warnings(&mut state, &printer);

    let expiration = result.context("License token rejected")?;
    printer.success(format!("License activated until {expiration}"));
    Ok(())
}

pub fn reset(args: ResetArgs, ctx: &AppContext) -> Result<()> {
    reset_with(args, ctx, &mut ConsolePrompter)
}

fn reset_with(args: ResetArgs, ctx: &AppContext, prompter: &mut dyn Prompter) -> Result<()> {
    let printer = Printer::new(ctx);
    let password = match args.password {
        Some(p) => p,
        None => prompter
            .ask_secret("Admin password")
            .context("Failed to read password")?
            .unwrap_or_default(),
    };
    if password.is_empty() {
        anyhow::bail!("Password required");
    }

    let mut state = entitlement();
    let ok = state.reset(&password);
    flush_warnings(&mut state, &printer);
    if !ok {
        anyhow::bail!("Invalid admin password");
    }
    printer.success("License and usage reset");
    Ok(())
}

#[derive(Tabled)]
struct BackupRow {
    name: String,
    size: String,
    modified: String,
}

pub fn backups(args: BackupsArgs, cfg: &Config, ctx: &AppContext) -> Result<()> {
    let printer = Printer::new(ctx);
    let manager = BackupManager::new(cfg.store_config().backup);
    let entries = manager
        .list()
        .with_context(|| format!("Failed to list {}", manager.dir().display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        printer.line(format!("No backups in {}", manager.dir().display()));
        return Ok(());
    }

    let rows: Vec<BackupRow> = entries
        .iter()
        .map(|e| BackupRow {
            name: e.name.clone(),
            size: format!("{} B", e.size_bytes),
            modified: e.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

pub fn extract(args: ExtractArgs, _ctx: &AppContext) -> Result<()> {
    let text = match &args.file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    println!("{}", extract_code(&text));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::prompt::ScriptedPrompter;

    #[test]
    fn reset_without_password_fails_early() {
        let ctx = AppContext { quiet: true, no_color: true, verbose: false };
        let mut p = ScriptedPrompter::default();
        let err = reset_with(ResetArgs { password: None }, &ctx, &mut p).unwrap_err();
        assert!(err.to_string().contains("Password required"));
        assert_eq!(p.asked, ["Admin password"]);
    }
}
