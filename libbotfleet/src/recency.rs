//! Recency filtering for generated content
//!
//! Keeps a bot from repeating itself: exact content matches are blocked
//! for a year, distinctive vocabulary for a week. The filter is loaded
//! before its bot posts, so a run that never commits leaves it
//! untouched.

use std::collections::HashSet;

use sqlx::sqlite::SqliteConnection;

use crate::config::BotConfig;
use crate::db::Database;
use crate::error::Result;

/// Window for exact content repeats.
pub const POST_WINDOW_SECS: i64 = 365 * 24 * 3600;

/// Window for significant word reuse.
pub const WORD_WINDOW_SECS: i64 = 7 * 24 * 3600;

/// Words too common to ever count as distinctive.
const STOPLIST: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can",
    "had", "has", "have", "her", "him", "his", "its", "our", "out", "she",
    "was", "who", "why", "will", "with", "this", "that", "then", "than",
    "them", "they", "there", "their", "what", "when", "where", "which",
    "your", "just", "like", "been", "being", "because", "about", "into",
    "over", "after", "before", "only", "some", "such", "very", "also",
    "how", "too", "get", "got", "one", "two", "ask", "did", "does", "don't",
    "i'm", "it's", "anything", "something", "here", "now", "ama",
];

/// What committed history says about a bot's recent output.
pub struct RecencyFilter {
    recent_contents: HashSet<String>,
    recent_words: HashSet<String>,
    stoplist: HashSet<String>,
}

impl RecencyFilter {
    /// Load the filter for a bot. Runs on the batch transaction's
    /// connection so a one-connection database stays serviceable
    /// mid-run.
    pub async fn load(
        db: &Database,
        conn: &mut SqliteConnection,
        bot: &BotConfig,
        now: i64,
    ) -> Result<Self> {
        let mut stoplist: HashSet<String> =
            STOPLIST.iter().map(|w| w.to_string()).collect();
        stoplist.insert(bot.name.to_lowercase());
        for word in &bot.allowed_words {
            stoplist.insert(word.to_lowercase());
        }

        let year_posts = db
            .recent_posts_on(conn, &bot.name, now - POST_WINDOW_SECS)
            .await?;
        let recent_contents: HashSet<String> =
            year_posts.iter().map(|p| p.content.clone()).collect();

        let word_cutoff = now - WORD_WINDOW_SECS;
        let mut recent_words = HashSet::new();
        for post in year_posts.iter().filter(|p| p.created_at >= word_cutoff) {
            recent_words.extend(significant_words(&post.content, &stoplist));
        }

        Ok(Self {
            recent_contents,
            recent_words,
            stoplist,
        })
    }

    #[cfg(test)]
    pub fn from_parts(
        recent_contents: HashSet<String>,
        recent_words: HashSet<String>,
        stoplist: HashSet<String>,
    ) -> Self {
        Self {
            recent_contents,
            recent_words,
            stoplist,
        }
    }

    /// Exact repeat of something posted within the year window.
    pub fn is_repeat(&self, content: &str) -> bool {
        self.recent_contents.contains(content)
    }

    /// Significant words of `content` already used within the week
    /// window.
    pub fn reused_words(&self, content: &str) -> Vec<String> {
        let mut words: Vec<String> = significant_words(content, &self.stoplist)
            .into_iter()
            .filter(|w| self.recent_words.contains(w))
            .collect();
        words.sort();
        words
    }

    /// A candidate passes when it is neither an exact repeat nor reuses
    /// any recent vocabulary.
    pub fn acceptable(&self, content: &str) -> bool {
        !self.is_repeat(content) && self.reused_words(content).is_empty()
    }
}

/// Extract the distinctive vocabulary of a piece of content.
///
/// Tokens are lowercased and stripped of outer punctuation; inner
/// apostrophes survive ("don't", "cat's"). Anything shorter than three
/// characters or on the stoplist is discarded.
pub fn significant_words(content: &str, stoplist: &HashSet<String>) -> HashSet<String> {
    content
        .split_whitespace()
        .filter_map(|token| {
            let trimmed = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if trimmed.chars().count() >= 3 && !stoplist.contains(&trimmed) {
                Some(trimmed)
            } else {
                None
            }
        })
        .collect()
}
