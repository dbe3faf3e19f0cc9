//! fleet-check - Self-test every configured publisher

use clap::Parser;
use libbotfleet::{Config, Fleet, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleet-check")]
#[command(version)]
#[command(about = "Self-test every configured publisher")]
#[command(long_about = "\
fleet-check - Self-test every configured publisher

DESCRIPTION:
    fleet-check probes each bot's publishers without publishing
    anything: a file publisher proves its output path is writable, a
    network publisher would verify reachability. Use it after changing
    configuration and before trusting a cron-driven fleet.

USAGE EXAMPLES:
    # Check the whole fleet
    fleet-check

    # Check one bot
    fleet-check --bot ama

EXIT CODES:
    0 - Every publisher passed
    1 - Operation failed
    2 - At least one publisher failed its self-test
    3 - Invalid input (unknown bot)
")]
struct Cli {
    /// Restrict the check to the named bots (repeatable)
    #[arg(short, long)]
    bot: Vec<String>,

    /// Path to the configuration file
    #[arg(short, long, env = "BOTFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libbotfleet::logging::init_cli(cli.verbose);

    match run(cli).await {
        Ok(failures) if failures > 0 => std::process::exit(2),
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<usize> {
    let config = load_config(cli.config.as_ref())?;
    let fleet = Fleet::open(&config).await?;

    let report = fleet.self_test(&cli.bot).await?;
    for (bot, service, error) in &report.failures {
        println!("{} / {}: FAIL ({})", bot, service, error);
    }
    println!(
        "{} publishers checked, {} failed",
        report.checked,
        report.failures.len()
    );

    Ok(report.failures.len())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Config::load(),
    }
}
