use aicode::app::run;
use aicode::cli::{Cli, Commands};
use aicode::infra::{config, keys, logging};
use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build a context once, pass everywhere
    let ctx = cli.context();
    logging::init(&ctx);

    // A local .env may carry AICODE_* settings as well as API keys
    match dotenvy::from_path(keys::ENV_FILE) {
        Err(e) if !e.not_found() => tracing::warn!("ignoring {}: {e}", keys::ENV_FILE),
        _ => {}
    }

    let mut cfg = config::load_config()?;
    cfg.apply_cli(&cli);

    match cli.command {
        None | Some(Commands::Chat) => run::chat(&cfg, &ctx),
        Some(Commands::Status(args)) => run::status(args, &cfg, &ctx),
        Some(Commands::Redeem(args)) => run::redeem(args, &ctx),
        Some(Commands::Reset(args)) => run::reset(args, &ctx),
        Some(Commands::Backups(args)) => run::backups(args, &cfg, &ctx),
        Some(Commands::Extract(args)) => run::extract(args, &ctx),
        Some(Commands::Init(args)) => config::init(args, &ctx),
        Some(Commands::Completions(args)) => aicode::completion::run(args, &ctx),
    }
}
