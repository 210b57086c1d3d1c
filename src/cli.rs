use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub verbose: bool,  // global --verbose
}

#[derive(Parser)]
#[command(name = "aicode")]
#[command(about = "AI code assistant with a free trial, license tokens and guarded file edits")]
#[command(version, long_about = None)]
pub struct Cli {
    /// Defaults to `chat`
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress spinners and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Debug logging to stderr (AICODE_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Do not back up files before overwriting them
    #[arg(long, global = true)]
    pub no_backup: bool,

    /// Largest file `load` accepts, in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    pub max_file_size: Option<u64>,
    /// API key for this run (else GROQ_API_KEYS / GROQ_API_KEY, env or .env)
    /// API key for the chat endpoint (else GROQ_API_KEY)
    #[arg(long, global = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Model name
    #[arg(long, global = true, value_name = "NAME")]
    pub model: Option<String>,
}

impl Cli {
    pub fn context(&self) -> AppContext {
        AppContext { quiet: self.quiet, no_color: self.no_color, verbose: self.verbose }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Interactive session (default)
    Chat,

    /// Show license state and settings
    Status(StatusArgs),

    /// Activate a license token
    Redeem(RedeemArgs),

    /// Administrative reset of license and usage files
    Reset(ResetArgs),

    /// List file backups, newest first
    Backups(BackupsArgs),

    /// Print the code inside the first markdown fence of a file or stdin
    Extract(ExtractArgs),

    /// Initialize an aicode.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RedeemArgs {
    /// License token
    pub token: String,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Admin password; asked for (masked) when omitted
    #[arg(long)]
    pub password: Option<String>,
}

#[derive(Debug, Args)]
pub struct BackupsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input file; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long, conflicts_with = "stdout")]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
