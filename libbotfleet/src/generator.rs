//! Content generators
//!
//! A generator turns a bot's stored state into one new piece of
//! content. Implementations are looked up by the `implementation` key
//! in bot configuration.

use rand::distributions::{Distribution, WeightedIndex};
use serde::{Deserialize, Serialize};

use crate::error::{BotfleetError, ConfigError, Result};
use crate::recency::RecencyFilter;

/// Candidates drawn before a generation attempt gives up.
const MAX_DRAWS: usize = 20;

/// Hard cap on generated content length, in characters.
pub const MAX_CONTENT_CHARS: usize = 140;

/// Everything a generator may consult while producing content.
pub struct GenerationContext<'a> {
    pub bot_name: &'a str,
    /// Opaque state payload from the bot row, if any.
    pub state: Option<&'a str>,
    pub recency: &'a RecencyFilter,
}

pub trait ContentGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Produce one new piece of content, or fail for this run.
    fn generate(&self, ctx: &GenerationContext) -> Result<String>;

    /// Reject a state payload before it is stored.
    fn validate_state(&self, _payload: &str) -> Result<()> {
        Ok(())
    }

    /// Produce a fresh state payload from the current one.
    fn refresh_state(&self, _current: Option<&str>) -> Result<String> {
        Err(BotfleetError::Generation(format!(
            "{} has no state refresh routine",
            self.name()
        )))
    }
}

/// Look up a generator implementation by its configuration key.
pub fn create_generator(implementation: &str) -> Result<Box<dyn ContentGenerator>> {
    match implementation {
        "potentials" => Ok(Box::new(PotentialsGenerator)),
        "static" => Ok(Box::new(StaticGenerator)),
        other => Err(ConfigError::Unknown {
            kind: "generator implementation",
            name: other.to_string(),
        }
        .into()),
    }
}

/// One entry in a potentials state payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Potential {
    pub content: String,
    pub score: f64,
}

/// Draws from a stored pool of scored candidates.
///
/// State is a JSON array of `{content, score}` objects. Higher scores
/// are drawn proportionally more often. A drawn candidate must pass the
/// content checks and the recency filter; after [`MAX_DRAWS`] rejected
/// draws the whole attempt fails.
pub struct PotentialsGenerator;

impl PotentialsGenerator {
    fn parse_state(state: &str) -> Result<Vec<Potential>> {
        let potentials: Vec<Potential> = serde_json::from_str(state)
            .map_err(|e| BotfleetError::State(format!("unreadable potentials: {}", e)))?;

        if potentials.is_empty() {
            return Err(BotfleetError::State("empty potentials list".to_string()));
        }
        if potentials.iter().any(|p| p.score < 0.0) {
            return Err(BotfleetError::State("negative score".to_string()));
        }
        Ok(potentials)
    }
}

impl ContentGenerator for PotentialsGenerator {
    fn name(&self) -> &'static str {
        "potentials"
    }

    fn generate(&self, ctx: &GenerationContext) -> Result<String> {
        let state = ctx.state.ok_or_else(|| {
            BotfleetError::Generation(format!("bot {} has no stored state", ctx.bot_name))
        })?;
        let potentials = Self::parse_state(state)?;

        let weights: Vec<f64> = potentials.iter().map(|p| p.score).collect();
        let dist = WeightedIndex::new(&weights)
            .map_err(|e| BotfleetError::State(format!("unusable scores: {}", e)))?;

        let mut rng = rand::thread_rng();
        for _ in 0..MAX_DRAWS {
            let candidate = &potentials[dist.sample(&mut rng)].content;
            if candidate_ok(candidate) && ctx.recency.acceptable(candidate) {
                return Ok(candidate.clone());
            }
        }

        Err(BotfleetError::Generation(format!(
            "no acceptable candidate for {} after {} draws",
            ctx.bot_name, MAX_DRAWS
        )))
    }

    fn validate_state(&self, payload: &str) -> Result<()> {
        Self::parse_state(payload).map(|_| ())
    }

    /// No external candidate source is wired in, so a refresh validates
    /// the stored pool and hands it back unchanged.
    fn refresh_state(&self, current: Option<&str>) -> Result<String> {
        let current = current.ok_or_else(|| {
            BotfleetError::Generation("nothing to refresh: no stored state".to_string())
        })?;
        Self::parse_state(current)?;
        Ok(current.to_string())
    }
}

/// Generates nothing. Used by bots fed entirely through their backlog
/// and scheduled queues.
pub struct StaticGenerator;

impl ContentGenerator for StaticGenerator {
    fn name(&self) -> &'static str {
        "static"
    }

    fn generate(&self, ctx: &GenerationContext) -> Result<String> {
        Err(BotfleetError::Generation(format!(
            "bot {} posts only from its queues",
            ctx.bot_name
        )))
    }
}

/// Structural checks a drawn candidate must pass.
fn candidate_ok(content: &str) -> bool {
    let trimmed = content.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_CONTENT_CHARS
        && !trimmed.contains('\n')
        && !has_bad_end(trimmed)
}

/// Ends on a dangling article, e.g. "pick a." or "behold the."
///
/// The article must be its own word; "pizza." is fine.
fn has_bad_end(content: &str) -> bool {
    let trimmed = content.trim_end();
    let stripped = match trimmed.strip_suffix('.') {
        Some(s) => s,
        None => return false,
    };
    let last_word = stripped
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or("");
    matches!(last_word.to_lowercase().as_str(), "a" | "an" | "the")
}
