use aicode::cli::{Cli, Commands, CompletionsArgs, ResetArgs, Shell};
use clap::Parser;

#[test]
fn no_subcommand_means_chat() {
    let cli = Cli::parse_from(["aicode", "--no-backup", "--model", "gemma"]);
    assert!(cli.command.is_none());
    assert!(cli.no_backup);
    assert_eq!(cli.model.as_deref(), Some("gemma"));
}

#[test]
fn global_flags_after_subcommand() {
    let cli = Cli::parse_from(["aicode", "status", "--json", "--quiet", "--no-color"]);
    let ctx = cli.context();
    assert!(ctx.quiet);
    assert!(ctx.no_color);
    assert!(!ctx.verbose);
    match cli.command {
        Some(Commands::Status(args)) => assert!(args.json),
        _ => panic!("expected Status command"),
    }
}

#[test]
fn reset_password_is_optional() {
    let cli = Cli::parse_from(["aicode", "reset"]);
    assert!(matches!(cli.command, Some(Commands::Reset(ResetArgs { password: None }))));

    let cli = Cli::parse_from(["aicode", "reset", "--password", "pw"]);
    match cli.command {
        Some(Commands::Reset(ResetArgs { password })) => assert_eq!(password.as_deref(), Some("pw")),
        _ => panic!("expected Reset command"),
    }
}

#[test]
fn redeem_requires_token() {
    assert!(Cli::try_parse_from(["aicode", "redeem"]).is_err());
}

#[test]
fn completions_out_dir_conflicts_with_stdout() {
    assert!(
        Cli::try_parse_from(["aicode", "completions", "bash", "--stdout", "--out-dir", "x"])
            .is_err()
    );
    let cli = Cli::parse_from(["aicode", "completions", "zsh", "--stdout"]);
    assert!(matches!(
        cli.command,
        Some(Commands::Completions(CompletionsArgs { shell: Shell::Zsh, stdout: true, .. }))
    ));
}
