//! Core types for Botfleet

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One committed unit of generated content belonging to a bot.
///
/// Immutable once created; delivery history lives on its publications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub bot_name: String,
    pub content: String,
    pub created_at: i64,
}

impl Post {
    pub fn new(bot_name: &str, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            bot_name: bot_name.to_string(),
            content,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublicationStatus {
    /// No delivery attempt has completed yet.
    Pending,
    /// The most recent attempt succeeded. Terminal.
    Delivered,
    /// The most recent attempt failed; eligible for republication.
    Failed,
}

impl std::fmt::Display for PublicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivered => write!(f, "delivered"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The record of one post's delivery attempts to one service.
///
/// Invariant: `error` is non-null iff the most recent attempt did not
/// succeed. `first_attempt` is fixed at creation; retries only advance
/// `most_recent_attempt`. A delivered publication always carries the
/// service receipt in `external_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: Option<i64>,
    pub post_id: String,
    pub service: String,
    pub first_attempt: i64,
    pub most_recent_attempt: i64,
    pub error: Option<String>,
    pub external_id: Option<String>,
}

impl Publication {
    pub fn new_pending(post_id: &str, service: &str) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: None,
            post_id: post_id.to_string(),
            service: service.to_string(),
            first_attempt: now,
            most_recent_attempt: now,
            error: None,
            external_id: None,
        }
    }

    pub fn mark_delivered(&mut self, external_id: String) {
        self.most_recent_attempt = chrono::Utc::now().timestamp();
        self.external_id = Some(external_id);
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.most_recent_attempt = chrono::Utc::now().timestamp();
        self.error = Some(error);
    }

    pub fn status(&self) -> PublicationStatus {
        if self.error.is_some() {
            PublicationStatus::Failed
        } else if self.external_id.is_some() {
            PublicationStatus::Delivered
        } else {
            PublicationStatus::Pending
        }
    }
}

/// Untimed FIFO entry awaiting promotion to a post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacklogEntry {
    pub id: i64,
    pub bot_name: String,
    pub content: String,
}

/// Content queued with an optional explicit publish time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub id: i64,
    pub bot_name: String,
    pub content: String,
    pub publish_at: Option<i64>,
}

/// Persistent per-bot row: opaque generator state plus the scheduling
/// cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotRow {
    pub name: String,
    pub state: Option<String>,
    pub state_updated_at: Option<i64>,
    pub next_post_time: Option<i64>,
}
