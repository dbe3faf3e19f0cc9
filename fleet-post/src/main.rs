//! fleet-post - Run the posting batch across the bot fleet

use clap::Parser;
use libbotfleet::{BotAction, Config, Fleet, PostOptions, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleet-post")]
#[command(version)]
#[command(about = "Run the posting batch across the bot fleet")]
#[command(long_about = "\
fleet-post - Run the posting batch across the bot fleet

DESCRIPTION:
    fleet-post walks every configured bot, asks its scheduler whether a
    post is due, pulls content from the scheduled queue, the backlog, or
    the bot's generator, and delivers it to each configured publisher.
    All bots commit together at the end of the run.

USAGE EXAMPLES:
    # Run the whole fleet
    fleet-post

    # Run one bot, even if it is not due
    fleet-post --bot ama --force

    # Run a subset of the fleet
    fleet-post --bot ama --bot quizbot

    # See what would be posted without delivering anything
    fleet-post --dry-run

CONFIGURATION:
    Configuration file: ~/.config/botfleet/config.toml
    Override with BOTFLEET_CONFIG or --config.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - One or more deliveries failed (recorded for republication)
    3 - Invalid post aborted the run; nothing was committed
")]
struct Cli {
    /// Restrict the run to the named bots (repeatable)
    #[arg(short, long)]
    bot: Vec<String>,

    /// Print what would be posted without delivering or committing
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Post even if the scheduler says the bot is not due
    #[arg(short, long)]
    force: bool,

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
        Ok(delivery_failures) if delivery_failures > 0 => std::process::exit(2),
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

    let report = fleet
        .run_post(&PostOptions {
            bots: &cli.bot,
            dry_run: cli.dry_run,
            force: cli.force,
        })
        .await?;

    for outcome in &report.outcomes {
        match &outcome.action {
            BotAction::Posted {
                delivered,
                failed,
                receipts,
                ..
            } => {
                println!(
                    "{}: posted ({} delivered, {} failed)",
                    outcome.bot_name, delivered, failed
                );
                for receipt in receipts {
                    println!("  {}", receipt);
                }
            }
            BotAction::WouldPost { content } => {
                println!("{}", outcome.bot_name);
                println!("{}", content);
                println!("{}", "-".repeat(80));
            }
            BotAction::NotDue { .. } => {
                println!("{}: not due", outcome.bot_name);
            }
            BotAction::Skipped { reason } => {
                eprintln!("{}: skipped: {}", outcome.bot_name, reason);
            }
        }
    }

    Ok(report.delivery_failures())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Config::load(),
    }
}
