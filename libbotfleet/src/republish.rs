//! Republication engine
//!
//! Retries previously failed publications without regenerating content.
//! Each publication is retried independently; one retry failing never
//! blocks the rest. A publication whose service the bot no longer
//! configures is abandoned untouched.

use sqlx::sqlite::SqliteConnection;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::publishers::Publisher;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepublishReport {
    /// Retries actually attempted.
    pub attempted: usize,
    /// Retries that ended in delivery.
    pub delivered: usize,
    /// Retries that failed again.
    pub still_failing: usize,
    /// Failed publications left untouched because their service is no
    /// longer configured.
    pub abandoned: usize,
}

impl RepublishReport {
    pub fn merge(&mut self, other: &RepublishReport) {
        self.attempted += other.attempted;
        self.delivered += other.delivered;
        self.still_failing += other.still_failing;
        self.abandoned += other.abandoned;
    }
}

/// Retry every failed publication of a bot, bounded by `limit` distinct
/// posts. Reads and mutations both go through `conn`; the caller owns
/// the commit.
pub async fn republish_bot(
    db: &Database,
    conn: &mut SqliteConnection,
    bot_name: &str,
    publishers: &[Box<dyn Publisher>],
    limit: usize,
) -> Result<RepublishReport> {
    let mut report = RepublishReport::default();

    for post_id in db.failed_post_ids_on(conn, bot_name, limit).await? {
        let post = match db.get_post_on(conn, &post_id).await? {
            Some(post) => post,
            None => continue,
        };

        for mut publication in db.failed_publications_for_post_on(conn, &post_id).await? {
            let publisher = match publishers.iter().find(|p| p.service() == publication.service) {
                Some(publisher) => publisher,
                None => {
                    debug!(
                        bot = bot_name,
                        service = %publication.service,
                        "abandoning publication for unconfigured service"
                    );
                    report.abandoned += 1;
                    continue;
                }
            };

            report.attempted += 1;
            match publisher.deliver(&post).await {
                Ok(external_id) => {
                    info!(
                        bot = bot_name,
                        service = %publication.service,
                        external_id = %external_id,
                        "republished"
                    );
                    publication.mark_delivered(external_id);
                    report.delivered += 1;
                }
                Err(e) => {
                    warn!(
                        bot = bot_name,
                        service = %publication.service,
                        error = %e,
                        "republish attempt failed"
                    );
                    publication.mark_failed(e.to_string());
                    report.still_failing += 1;
                }
            }
            db.update_publication(conn, &publication).await?;
        }
    }

    Ok(report)
}
