//! fleet-backlog - Manage a bot's backlog queue

use clap::{Parser, Subcommand};
use libbotfleet::{Config, Fleet, Result};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Pause before a destructive clear, unless --force is given.
const CLEAR_DELAY: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "fleet-backlog")]
#[command(version)]
#[command(about = "Manage a bot's backlog queue")]
#[command(long_about = "\
fleet-backlog - Manage a bot's backlog queue

DESCRIPTION:
    The backlog is a FIFO queue of pre-generated content a bot drains
    before it generates anything new. fleet-backlog shows, loads, and
    clears it. Loading reads one entry per non-empty line; beyond the
    per-bot cap the oldest entries are evicted.

USAGE EXAMPLES:
    # Show the next entries
    fleet-backlog show ama

    # Load entries from a file (or stdin)
    fleet-backlog load ama entries.txt
    some-generator | fleet-backlog load ama

    # Clear the backlog (pauses 10s unless --force)
    fleet-backlog clear ama --force

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input (unknown bot)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "BOTFLEET_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the backlog in FIFO order
    Show {
        /// Bot whose backlog to show
        bot: String,

        /// Maximum entries to print
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Load entries, one per non-empty line
    Load {
        /// Bot whose backlog to load
        bot: String,

        /// File to read from (stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Remove every entry
    Clear {
        /// Bot whose backlog to clear
        bot: String,

        /// Skip the safety pause
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libbotfleet::logging::init_cli(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;
    let fleet = Fleet::open(&config).await?;

    match cli.command {
        Commands::Show { bot, limit } => {
            let count = fleet.db().backlog_count(&bot).await?;
            println!("{}: {} entries", bot, count);
            for entry in fleet.db().backlog_peek(&bot, limit).await? {
                println!("  {}", entry.content);
            }
        }
        Commands::Load { bot, file } => {
            let raw = read_input(file.as_ref())?;
            let (loaded, evicted) = fleet.load_backlog(&bot, &raw).await?;
            println!("{}: loaded {} entries", bot, loaded);
            if evicted > 0 {
                println!("{}: evicted {} oldest entries (backlog full)", bot, evicted);
            }
        }
        Commands::Clear { bot, force } => {
            if !force {
                eprintln!(
                    "Clearing the backlog of {} in {}s. Ctrl-C to cancel.",
                    bot,
                    CLEAR_DELAY.as_secs()
                );
                tokio::time::sleep(CLEAR_DELAY).await;
            }
            let removed = fleet.clear_backlog(&bot).await?;
            println!("{}: removed {} entries", bot, removed);
        }
    }

    Ok(())
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| libbotfleet::BotfleetError::InvalidInput(e.to_string())),
        None => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|e| libbotfleet::BotfleetError::InvalidInput(e.to_string()))?;
            Ok(raw)
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Config::load(),
    }
}
