//! fleet-republish - Retry failed deliveries

use clap::Parser;
use libbotfleet::{Config, Fleet, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleet-republish")]
#[command(version)]
#[command(about = "Retry failed deliveries without regenerating content")]
#[command(long_about = "\
fleet-republish - Retry failed deliveries

DESCRIPTION:
    fleet-republish scans each bot's posts for publications whose last
    delivery attempt failed and retries them against the currently
    configured publisher for that service. Publications for services a
    bot no longer configures are left untouched. Each bot's retries
    commit together once that bot is done.

USAGE EXAMPLES:
    # Retry failures across the fleet
    fleet-republish

    # Retry at most 3 posts for one bot
    fleet-republish --bot ama --limit 3

EXIT CODES:
    0 - Success (including nothing to retry)
    1 - Operation failed
    2 - At least one retry failed again
")]
struct Cli {
    /// Restrict the run to the named bots (repeatable)
    #[arg(short, long)]
    bot: Vec<String>,

    /// Maximum number of distinct posts to retry per bot
    #[arg(short, long, default_value_t = 10)]
    limit: usize,

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
        Ok(still_failing) if still_failing > 0 => std::process::exit(2),
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

    let report = fleet.run_republish(&cli.bot, cli.limit).await?;
    println!(
        "{} attempted, {} delivered, {} still failing, {} abandoned",
        report.attempted, report.delivered, report.still_failing, report.abandoned
    );

    Ok(report.still_failing)
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Config::load(),
    }
}
