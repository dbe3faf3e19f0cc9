//! fleet-dashboard - Show the state of every bot

use clap::Parser;
use libbotfleet::orchestrator::BotDashboard;
use libbotfleet::{BotfleetError, Config, Fleet, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fleet-dashboard")]
#[command(version)]
#[command(about = "Show the state of every bot")]
#[command(long_about = "\
fleet-dashboard - Show the state of every bot

DESCRIPTION:
    fleet-dashboard prints a read-only summary per bot: the most recent
    post and the delivery status of each of its publications, the sizes
    and next items of the backlog and scheduled queues, and when the
    bot will next post (ASAP if it is overdue or unscheduled).

USAGE EXAMPLES:
    # Summarize the whole fleet
    fleet-dashboard

    # One bot, as JSON
    fleet-dashboard --bot ama --format json

EXIT CODES:
    0 - Success
    1 - Operation failed
    3 - Invalid input (unknown bot, bad format)
")]
struct Cli {
    /// Restrict the summary to the named bots (repeatable)
    #[arg(short, long)]
    bot: Vec<String>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: String,

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

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.format != "text" && cli.format != "json" {
        return Err(BotfleetError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            cli.format
        )));
    }

    let config = load_config(cli.config.as_ref())?;
    let fleet = Fleet::open(&config).await?;
    let summaries = fleet.dashboard(&cli.bot).await?;

    if cli.format == "json" {
        output_json(&summaries);
    } else {
        output_text(&summaries);
    }

    Ok(())
}

fn output_json(summaries: &[BotDashboard]) {
    let json: Vec<serde_json::Value> = summaries
        .iter()
        .map(|dash| {
            serde_json::json!({
                "bot": dash.bot_name,
                "latest_post": dash.latest_post.as_ref().map(|latest| serde_json::json!({
                    "id": latest.post.id,
                    "content": latest.post.content,
                    "created_at": latest.post.created_at,
                    "publications": latest.publications.iter().map(|p| serde_json::json!({
                        "service": p.service,
                        "status": p.status().to_string(),
                        "error": p.error,
                        "external_id": p.external_id,
                    })).collect::<Vec<_>>(),
                })),
                "backlog_count": dash.backlog_count,
                "next_backlog": dash.next_backlog,
                "scheduled_count": dash.scheduled_count,
                "next_scheduled": dash.next_scheduled.as_ref().map(|s| serde_json::json!({
                    "content": s.content,
                    "publish_at": s.publish_at,
                })),
                "next_post_time": dash.next_post_time,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json).unwrap());
}

fn output_text(summaries: &[BotDashboard]) {
    let now = chrono::Utc::now().timestamp();

    for dash in summaries {
        println!("{}", dash.bot_name);

        match &dash.latest_post {
            Some(latest) => {
                println!(
                    "  last post: {} | {}",
                    format_time_ago(now, latest.post.created_at),
                    truncate_content(&latest.post.content, 50)
                );
                for publication in &latest.publications {
                    match &publication.error {
                        Some(error) => {
                            println!("    {}: failed ({})", publication.service, error)
                        }
                        None => println!("    {}: {}", publication.service, publication.status()),
                    }
                }
            }
            None => println!("  last post: never"),
        }

        print!("  backlog: {} entries", dash.backlog_count);
        match &dash.next_backlog {
            Some(next) => println!(", next: {}", truncate_content(next, 50)),
            None => println!(),
        }

        print!("  scheduled: {} entries", dash.scheduled_count);
        match &dash.next_scheduled {
            Some(next) => {
                let when = next
                    .publish_at
                    .map(|ts| format_time_until(now, ts))
                    .unwrap_or_else(|| "untimed".to_string());
                println!(", next: {} | {}", when, truncate_content(&next.content, 50));
            }
            None => println!(),
        }

        let next_post = match dash.next_post_time {
            Some(ts) if ts > now => format_time_until(now, ts),
            _ => "ASAP".to_string(),
        };
        println!("  next post: {}", next_post);
        println!();
    }
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

/// Format time until a timestamp in human-readable form
fn format_time_until(now: i64, at: i64) -> String {
    let diff = at - now;
    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Format time since a timestamp in human-readable form
fn format_time_ago(now: i64, at: i64) -> String {
    let diff = now - at;
    if diff < 0 {
        return "in the future".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("{} minute{} ago", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "<1 minute ago".to_string()
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from_path(p),
        None => Config::load(),
    }
}
