//! Publisher abstraction and implementations
//!
//! A publisher delivers a committed post to one external service and
//! returns a service receipt. Implementations are looked up by the
//! `kind` key in publisher configuration, defaulting to the service
//! name.

use async_trait::async_trait;

use crate::config::{BotConfig, PublisherConfig};
use crate::error::{ConfigError, Result};
use crate::types::{Post, Publication, PublicationStatus};

pub mod console;
pub mod file;

// Mock publisher is available for all builds to support integration tests
pub mod mock;

/// Publisher trait for delivering posts to external services
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Service identifier this publisher delivers to. Matches the
    /// `service` column on publications.
    fn service(&self) -> &str;

    /// Deliver a post and return the service receipt.
    ///
    /// # Errors
    ///
    /// Returns `PublisherError::Delivery` when the service rejects the
    /// post, or `PublisherError::Io` on transport problems. Either way
    /// the failure is recorded on the publication, never propagated as
    /// a run abort.
    async fn deliver(&self, post: &Post) -> Result<String>;

    /// Cheap health probe used by `fleet-check`. Must not publish
    /// anything.
    async fn self_test(&self) -> Result<()>;

    /// One confirmation line for a recorded publication, printed after
    /// a posting run.
    fn display(&self, publication: &Publication) -> String {
        match publication.status() {
            PublicationStatus::Delivered => format!(
                "{}: delivered ({})",
                publication.service,
                publication.external_id.as_deref().unwrap_or("no receipt")
            ),
            PublicationStatus::Failed => format!(
                "{}: failed ({})",
                publication.service,
                publication.error.as_deref().unwrap_or("unknown error")
            ),
            PublicationStatus::Pending => format!("{}: pending", publication.service),
        }
    }
}

/// Build one publisher from its configuration.
pub fn create_publisher(config: &PublisherConfig) -> Result<Box<dyn Publisher>> {
    match config.kind() {
        "file" => {
            let path = config.path.as_deref().ok_or_else(|| {
                ConfigError::MissingField(format!("publishers.{}.path", config.service))
            })?;
            Ok(Box::new(file::FilePublisher::new(&config.service, path)))
        }
        "console" => Ok(Box::new(console::ConsolePublisher::new(&config.service))),
        "mock" => Ok(Box::new(mock::MockPublisher::success(&config.service))),
        other => Err(ConfigError::Unknown {
            kind: "publisher",
            name: other.to_string(),
        }
        .into()),
    }
}

/// Build every publisher a bot is configured with, in configuration
/// order.
pub fn create_publishers(bot: &BotConfig) -> Result<Vec<Box<dyn Publisher>>> {
    bot.publishers.iter().map(create_publisher).collect()
}
