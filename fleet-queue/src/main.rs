//! fleet-queue - Manage a bot's scheduled posts

use clap::{Parser, Subcommand};
use libbotfleet::scheduling::parse_schedule;
use libbotfleet::{Config, Fleet, Result};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

/// Pause before a destructive clear, unless --force is given.
const CLEAR_DELAY: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "fleet-queue")]
#[command(version)]
#[command(about = "Manage a bot's scheduled posts")]
#[command(long_about = "\
fleet-queue - Manage a bot's scheduled posts

DESCRIPTION:
    Scheduled posts carry an optional explicit publish time and take
    priority over the backlog once due. fleet-queue shows, loads, and
    clears them. Loading reads one entry per non-empty line; --at
    accepts durations (\"2h\"), natural language (\"tomorrow 3pm\"), and
    random intervals (\"random:1h-2h\"). A line may also carry its own
    time as an RFC 3339 prefix separated by a tab, which wins over
    --at. Without either, the entries post whenever nothing timed is
    due.

USAGE EXAMPLES:
    # Show the queue
    fleet-queue show ama

    # Queue entries for tomorrow morning
    fleet-queue load ama posts.txt --at \"tomorrow 9am\"

    # Clear the queue (pauses 10s unless --force)
    fleet-queue clear ama --force

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input (unknown bot, bad time format)
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
    /// Show scheduled posts, soonest first
    Show {
        /// Bot whose queue to show
        bot: String,
    },

    /// Load entries, one per non-empty line; a line may prefix its own
    /// publish time ("2025-11-20T15:00:00Z<TAB>content")
    Load {
        /// Bot whose queue to load
        bot: String,

        /// File to read from (stdin if not provided)
        file: Option<PathBuf>,

        /// When to publish (e.g. "2h", "tomorrow 3pm", "random:1h-2h")
        #[arg(short, long)]
        at: Option<String>,
    },

    /// Remove every entry
    Clear {
        /// Bot whose queue to clear
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
        Commands::Show { bot } => {
            let entries = fleet.db().scheduled_list(&bot).await?;
            println!("{}: {} entries", bot, entries.len());
            let now = chrono::Utc::now().timestamp();
            for entry in entries {
                let when = match entry.publish_at {
                    Some(ts) if ts <= now => "due".to_string(),
                    Some(ts) => format!("at {}", format_timestamp(ts)),
                    None => "untimed".to_string(),
                };
                println!("  {} | {}", when, entry.content);
            }
        }
        Commands::Load { bot, file, at } => {
            let raw = read_input(file.as_ref())?;
            let publish_at = match at.as_deref() {
                Some(expr) => Some(parse_schedule(expr, None)?.timestamp()),
                None => None,
            };
            let loaded = fleet.load_scheduled(&bot, &raw, publish_at).await?;
            println!("{}: queued {} entries", bot, loaded);
        }
        Commands::Clear { bot, force } => {
            if !force {
                eprintln!(
                    "Clearing the scheduled queue of {} in {}s. Ctrl-C to cancel.",
                    bot,
                    CLEAR_DELAY.as_secs()
                );
                tokio::time::sleep(CLEAR_DELAY).await;
            }
            let removed = fleet.clear_scheduled(&bot).await?;
            println!("{}: removed {} entries", bot, removed);
        }
    }

    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
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
