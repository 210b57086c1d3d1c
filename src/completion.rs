//! Shell completion scripts for `aicode`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::{Generator, Shell as CompletionShell};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};
use crate::infra::io::write_atomic;

const BIN_NAME: &str = "aicode";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// The completion script for `shell`, as the shell expects to source it.
pub fn render(shell: Shell) -> Vec<u8> {
    let mut script = Vec::new();
    let mut cmd = Cli::command();
    clap_complete::generate(CompletionShell::from(shell), &mut cmd, BIN_NAME, &mut script);
    script
}

/// File name the shell looks for, e.g. `_aicode` for zsh.
pub fn file_name(shell: Shell) -> String {
    CompletionShell::from(shell).file_name(BIN_NAME)
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let script = render(args.shell);

    if args.stdout {
        use std::io::Write;
        std::io::stdout().write_all(&script).context("write completion to stdout")?;
        return Ok(());
    }

    let dir: PathBuf = args
        .out_dir
        .ok_or_else(|| anyhow::anyhow!("--out-dir is required unless --stdout is set"))?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("create {}", dir.display()))?;

    let path = dir.join(file_name(args.shell));
    write_atomic(&path, &script).with_context(|| format!("write {}", path.display()))?;

    if !ctx.quiet {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scripts_know_the_subcommands() {
        let bash = String::from_utf8(render(Shell::Bash)).unwrap();
        for sub in ["redeem", "backups", "extract"] {
            assert!(bash.contains(sub), "{sub} missing from bash completion");
        }
        assert_eq!(file_name(Shell::Zsh), "_aicode");
    }

    #[test]
    fn out_dir_gets_one_file() {
        let tmp = TempDir::new().unwrap();
        let ctx = AppContext { quiet: true, no_color: true, verbose: false };
        let args = CompletionsArgs {
            shell: Shell::Fish,
            out_dir: Some(tmp.path().join("completions")),
            stdout: false,
        };
        run(args, &ctx).unwrap();

        let written = tmp.path().join("completions").join("aicode.fish");
        assert_eq!(std::fs::read(written).unwrap(), render(Shell::Fish));
    }
}
