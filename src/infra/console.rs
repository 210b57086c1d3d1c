//! Styled terminal output for the session and subcommands.

use std::fmt::Display;

use owo_colors::OwoColorize;

use crate::cli::AppContext;

/// Stdout printer honouring `--quiet` and `--no-color`. Errors go to stderr
/// and are printed even when quiet.
#[derive(Debug, Clone, Copy)]
pub struct Printer {
    color: bool,
    quiet: bool,
}

impl Printer {
    pub fn new(ctx: &AppContext) -> Self {
        Self { color: !ctx.no_color && console::colors_enabled(), quiet: ctx.quiet }
    }

    /// No color, nothing suppressed.
    pub fn plain() -> Self {
        Self { color: false, quiet: false }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn line(&self, msg: impl Display) {
        if !self.quiet {
            println!("{msg}");
        }
    }

    pub fn info(&self, msg: impl Display) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{}", msg.blue());
        } else {
            println!("{msg}");
        }
    }

    pub fn success(&self, msg: impl Display) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{} {}", "✓".green(), msg.green().bold());
        } else {
            println!("✓ {msg}");
        }
    }

    pub fn warn(&self, msg: impl Display) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{}", msg.yellow());
        } else {
            println!("{msg}");
        }
    }

    pub fn error(&self, msg: impl Display) {
        if self.color {
            eprintln!("{} {}", "error:".red().bold(), msg.red());
        } else {
            eprintln!("error: {msg}");
        }
    }

    /// Bold heading followed by an indented body.
    pub fn panel(&self, title: &str, body: impl Display) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{}", format!("── {title} ──").cyan().bold());
        } else {
            println!("── {title} ──");
        }
        for line in body.to_string().lines() {
            println!("  {line}");
        }
    }

    /// Model output, shown in green. Printed even when quiet.
    pub fn reply(&self, text: &str) {
        if self.color {
            println!("{}", text.green());
        } else {
            println!("{text}");
        }
    }

    pub fn status(&self, line: &str) {
        if self.quiet {
            return;
        }
        if self.color {
            println!("{}", line.green().bold());
        } else {
            println!("{line}");
        }
    }
}
