//! Diagnostic logging to stderr. User-facing output goes through
//! [`Printer`](crate::infra::console::Printer) instead.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::AppContext;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "AICODE_LOG";

/// `AICODE_LOG` wins; otherwise `warn`, or `debug` with `--verbose`.
pub fn init(ctx: &AppContext) {
    let default = if ctx.verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(ctx.verbose)
        .with_ansi(!ctx.no_color)
        .try_init();
}
