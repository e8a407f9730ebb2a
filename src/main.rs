mod config;
mod detector;
mod mux;
mod runner;
mod session;
mod signals;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use config::{SupervisorConfig, Tuning};
use session::RunOutcome;

/// Supervise a command: watch its combined stdout/stderr for a literal
/// error pattern and restart the command when the pattern repeats
/// COUNT_LIMIT or more times within WINDOW.
#[derive(Parser, Debug)]
#[command(name = "respawn", version, about)]
pub struct Cli {
    /// Literal substring that marks an error line in the child's output
    pattern: String,

    /// Matches within the window that trigger a restart (e.g. 10, 100, 1000)
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    count_limit: u32,

    /// Sliding time window, e.g. "10s", "1m", "1h"
    #[arg(value_parser = parse_window)]
    window: Duration,

    /// Command to supervise (no shell interpretation)
    command: String,

    /// Arguments passed to the command
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Tuning file path
    #[arg(short, long, default_value = "respawn.toml")]
    config: PathBuf,

    /// Pause between restarts (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    restart_delay: Option<Duration>,

    /// Stop after this many restarts (overrides config; default unlimited)
    #[arg(long)]
    max_restarts: Option<u32>,

    /// Validate arguments, print resolved settings, and exit
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-line matches, forwarded signals)
    #[arg(short, long)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn parse_window(s: &str) -> Result<Duration, String> {
    let window = humantime::parse_duration(s).map_err(|e| format!("{e}\nExample: 10s, 1m, 1h"))?;
    if window.is_zero() {
        return Err("window must be greater than zero".to_string());
    }
    Ok(window)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let mut tuning = match Tuning::load(&cli.config) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            std::process::exit(2);
        }
    };
    if let Some(delay) = cli.restart_delay {
        tuning.restart_delay = delay;
    }
    if cli.max_restarts.is_some() {
        tuning.max_restarts = cli.max_restarts;
    }

    let config = SupervisorConfig {
        pattern: cli.pattern,
        count_limit: cli.count_limit,
        window: cli.window,
        command: cli.command,
        args: cli.args,
        tuning,
    };

    if cli.dry_run {
        println!("respawn v{}", env!("CARGO_PKG_VERSION"));
        println!("{config:#?}");
        println!("Dry run mode — arguments validated, not running.");
        return;
    }

    let exit_grace = config.tuning.exit_grace;
    let code = match runner::run(&config).await {
        Ok(summary) => {
            tracing::info!(
                restarts = summary.restarts,
                outcome = ?summary.outcome,
                "supervisor stopped"
            );
            match summary.outcome {
                // Mirror the child's own exit code on a clean exit.
                RunOutcome::Exited {
                    exit_code: Some(code),
                } => code,
                // Child killed by a signal, or restart limit exhausted.
                RunOutcome::Exited { exit_code: None } | RunOutcome::TooManyErrors => 1,
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "supervisor failed");
            1
        }
    };

    // Let final log lines flush before the process goes away.
    tokio::time::sleep(exit_grace).await;
    std::process::exit(code);
}
