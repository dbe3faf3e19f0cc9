//! fleet-state - Inspect and change a bot's generator state

use clap::{Parser, Subcommand};
use libbotfleet::{Config, Fleet, Result};
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleet-state")]
#[command(version)]
#[command(about = "Inspect and change a bot's generator state")]
#[command(long_about = "\
fleet-state - Inspect and change a bot's generator state

DESCRIPTION:
    Each bot stores an opaque state payload its generator draws from.
    fleet-state shows the stored payload, replaces it after the
    generator validates it, or asks the generator to refresh it. A
    refresh only runs when the state is stale, unless forced; either
    way the resulting state is printed.

USAGE EXAMPLES:
    # Show stored state
    fleet-state show ama

    # Replace state from a file (or stdin)
    fleet-state set ama potentials.json

    # Refresh even if the state is fresh
    fleet-state refresh ama --force

EXIT CODES:
    0 - Success
    1 - Operation failed (including a rejected state payload)
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
    /// Print the stored state payload
    Show {
        /// Bot whose state to show
        bot: String,
    },

    /// Validate and store a new state payload
    Set {
        /// Bot whose state to replace
        bot: String,

        /// File to read from (stdin if not provided)
        file: Option<PathBuf>,
    },

    /// Run the generator's state refresh routine
    Refresh {
        /// Bot whose state to refresh
        bot: String,

        /// Refresh even if the state is not stale
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
        Commands::Show { bot } => match fleet.show_state(&bot).await? {
            Some(state) => println!("{}", state),
            None => eprintln!("{}: no stored state", bot),
        },
        Commands::Set { bot, file } => {
            let payload = read_input(file.as_ref())?;
            fleet.set_state(&bot, payload.trim_end()).await?;
            println!("{}: state stored", bot);
        }
        Commands::Refresh { bot, force } => match fleet.refresh_state(&bot, force).await? {
            Some(state) => println!("{}", state),
            None => eprintln!("{}: no stored state", bot),
        },
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
