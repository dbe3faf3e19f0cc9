//! Interval policies and time parsing
//!
//! Two concerns live here: the per-bot posting interval (when is a bot
//! next allowed to post) and parsing of human-readable time expressions
//! for queueing content at an explicit time.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{BotfleetError, Result};

const MIN_RANDOM_SECONDS: i64 = 30;
const MAX_RANDOM_SECONDS: i64 = 30 * 24 * 3600; // 30 days

/// How often a bot is allowed to post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPolicy {
    /// Post on every batch run; `next_post_time` stays unset.
    Asap,
    /// Fixed spacing between posts, in seconds.
    Every(i64),
    /// Uniformly random spacing between `min` and `max` seconds.
    Random { min: i64, max: i64 },
}

impl IntervalPolicy {
    /// Parse an interval string from bot configuration.
    ///
    /// Accepts "asap", a duration like "60m" or "1d", or
    /// "random:MIN-MAX".
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() || input.eq_ignore_ascii_case("asap") {
            return Ok(IntervalPolicy::Asap);
        }

        if let Some(range_part) = input.strip_prefix("random:") {
            let (min_str, max_str) = parse_random_range(range_part)?;
            let min = parse_duration(min_str)?.num_seconds();
            let max = parse_duration(max_str)?.num_seconds();
            validate_random_range(min, max)?;
            return Ok(IntervalPolicy::Random { min, max });
        }

        let duration = parse_duration(input)?;
        Ok(IntervalPolicy::Every(duration.num_seconds()))
    }

    /// Compute the next allowed post time after a post at `now`.
    /// Returns None for Asap, which renders as an always-ready bot.
    pub fn next_post_time(&self, now: i64) -> Option<i64> {
        match self {
            IntervalPolicy::Asap => None,
            IntervalPolicy::Every(seconds) => Some(now + seconds),
            IntervalPolicy::Random { min, max } => {
                Some(now + rand::thread_rng().gen_range(*min..=*max))
            }
        }
    }
}

/// A bot is ready when it has no scheduling cursor or the cursor has
/// passed.
pub fn is_ready(next_post_time: Option<i64>, now: i64) -> bool {
    match next_post_time {
        None => true,
        Some(t) => t <= now,
    }
}

/// Parse a schedule string into a DateTime
///
/// Supports multiple formats:
/// - Relative durations: "1h", "30m", "2d"
/// - Natural language: "tomorrow", "next monday 10am"
/// - Random intervals: "random:10m-20m"
///
/// # Errors
///
/// Returns an error if the time format is invalid or cannot be parsed.
pub fn parse_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    if input.is_empty() {
        return Err(BotfleetError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    if input.starts_with("random:") {
        return parse_random_schedule(input, last_scheduled);
    }

    if let Ok(duration) = parse_duration(input) {
        return Ok(Utc::now() + duration);
    }

    if let Ok(dt) = parse_natural_language(input) {
        return Ok(dt);
    }

    Err(BotfleetError::InvalidInput(format!(
        "Could not parse schedule string: {}",
        input
    )))
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    if let Ok(std_duration) = humantime::parse_duration(input) {
        let seconds = std_duration.as_secs() as i64;
        return Duration::try_seconds(seconds)
            .ok_or_else(|| BotfleetError::InvalidInput("Duration out of range".to_string()));
    }

    Err(BotfleetError::InvalidInput(format!(
        "Could not parse duration: {}",
        input
    )))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, Utc::now(), chrono_english::Dialect::Us)
        .map_err(|e| BotfleetError::InvalidInput(format!("Could not parse time: {}", e)))
}

/// Parse random schedule format: "random:MIN-MAX"
fn parse_random_schedule(input: &str, last_scheduled: Option<i64>) -> Result<DateTime<Utc>> {
    let range_part = input
        .strip_prefix("random:")
        .ok_or_else(|| BotfleetError::InvalidInput("Invalid random format".to_string()))?;

    let (min_str, max_str) = parse_random_range(range_part)?;
    let min_secs = parse_duration(min_str)?.num_seconds();
    let max_secs = parse_duration(max_str)?.num_seconds();

    validate_random_range(min_secs, max_secs)?;

    let base_time = match last_scheduled {
        Some(timestamp) => DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now),
        None => Utc::now(),
    };
    let random_secs = rand::thread_rng().gen_range(min_secs..=max_secs);

    Ok(base_time + Duration::try_seconds(random_secs).unwrap_or_else(Duration::zero))
}

/// Split "MIN-MAX" into (MIN, MAX)
fn parse_random_range(range: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = range.split('-').collect();
    if parts.len() != 2 {
        return Err(BotfleetError::InvalidInput(
            "Random format must be MIN-MAX".to_string(),
        ));
    }
    Ok((parts[0], parts[1]))
}

/// Validate random range constraints
fn validate_random_range(min_secs: i64, max_secs: i64) -> Result<()> {
    if min_secs < MIN_RANDOM_SECONDS {
        return Err(BotfleetError::InvalidInput(format!(
            "Minimum random interval must be at least {} seconds",
            MIN_RANDOM_SECONDS
        )));
    }

    if max_secs > MAX_RANDOM_SECONDS {
        return Err(BotfleetError::InvalidInput(format!(
            "Maximum random interval must be less than {} days",
            MAX_RANDOM_SECONDS / (24 * 3600)
        )));
    }

    if min_secs >= max_secs {
        return Err(BotfleetError::InvalidInput(
            "Minimum must be less than maximum".to_string(),
        ));
    }

    Ok(())
}
