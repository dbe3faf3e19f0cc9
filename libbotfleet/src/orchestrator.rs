//! Bot orchestrator
//!
//! Composes the scheduler, queues, recency filter, generators, and
//! publishers into the batch entry points the CLIs invoke. A batch run
//! stages every mutation in one transaction: a crash or an invalid post
//! mid-run leaves no bot half-committed.

use futures::future::join_all;
use sqlx::sqlite::SqliteConnection;
use tracing::{info, warn};

use crate::config::{BotConfig, Config};
use crate::db::{Database, PostWithPublications};
use crate::error::{BotfleetError, Result};
use crate::generator::{create_generator, ContentGenerator, GenerationContext};
use crate::publishers::{create_publishers, Publisher};
use crate::recency::RecencyFilter;
use crate::republish::{republish_bot, RepublishReport};
use crate::scheduling::{is_ready, IntervalPolicy};
use crate::types::{Post, Publication, ScheduledPost};

/// Backlog entries kept per bot; loading beyond this evicts the oldest.
pub const BACKLOG_MAX: usize = 1000;

/// Longest content that may be committed as a post.
pub const MAX_POST_CHARS: usize = 500;

/// Age at which a bot's generator state is considered stale.
const STATE_TTL_SECS: i64 = 24 * 3600;

/// One configured bot, fully wired.
pub struct BotRuntime {
    pub config: BotConfig,
    pub policy: IntervalPolicy,
    pub generator: Box<dyn ContentGenerator>,
    pub publishers: Vec<Box<dyn Publisher>>,
}

impl BotRuntime {
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        Ok(Self {
            policy: IntervalPolicy::parse(&config.interval)?,
            generator: create_generator(&config.implementation)?,
            publishers: create_publishers(config)?,
            config: config.clone(),
        })
    }

    /// Assemble a runtime from pre-built parts, bypassing the
    /// registries. Meant for tests wiring in mocks.
    pub fn new(
        config: BotConfig,
        policy: IntervalPolicy,
        generator: Box<dyn ContentGenerator>,
        publishers: Vec<Box<dyn Publisher>>,
    ) -> Self {
        Self {
            config,
            policy,
            generator,
            publishers,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// What one bot did during a posting run.
#[derive(Debug)]
pub enum BotAction {
    Posted {
        post_id: String,
        content: String,
        delivered: usize,
        failed: usize,
        /// One confirmation line per publication, publisher-rendered.
        receipts: Vec<String>,
    },
    /// Dry run: everything happened except delivery and commit.
    WouldPost { content: String },
    NotDue { next_post_time: i64 },
    Skipped { reason: String },
}

#[derive(Debug)]
pub struct BotOutcome {
    pub bot_name: String,
    pub action: BotAction,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<BotOutcome>,
}

impl RunReport {
    /// Delivery failures recorded across the whole run.
    pub fn delivery_failures(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o.action {
                BotAction::Posted { failed, .. } => failed,
                _ => 0,
            })
            .sum()
    }
}

pub struct PostOptions<'a> {
    /// Restrict the run to these bots; empty means the whole fleet.
    pub bots: &'a [String],
    /// Perform every step except delivery and the final commit.
    pub dry_run: bool,
    /// Bypass the scheduler gate.
    pub force: bool,
}

/// Read-only per-bot summary for the dashboard.
#[derive(Debug)]
pub struct BotDashboard {
    pub bot_name: String,
    pub latest_post: Option<PostWithPublications>,
    pub backlog_count: i64,
    pub next_backlog: Option<String>,
    pub scheduled_count: i64,
    pub next_scheduled: Option<ScheduledPost>,
    pub next_post_time: Option<i64>,
}

#[derive(Debug, Default)]
pub struct SelfTestReport {
    pub checked: usize,
    /// (bot, service, error) per failing publisher.
    pub failures: Vec<(String, String, String)>,
}

/// The whole configured fleet plus its shared database.
pub struct Fleet {
    db: Database,
    bots: Vec<BotRuntime>,
}

impl Fleet {
    /// Open the database and wire every configured bot.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        let bots = config
            .bots
            .iter()
            .map(BotRuntime::from_config)
            .collect::<Result<Vec<_>>>()?;
        Self::from_parts(db, bots).await
    }

    /// Assemble a fleet from pre-built parts and ensure bot rows exist.
    pub async fn from_parts(db: Database, bots: Vec<BotRuntime>) -> Result<Self> {
        let mut tx = db.begin().await?;
        for bot in &bots {
            db.ensure_bot(&mut tx, bot.name()).await?;
        }
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(Self { db, bots })
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn bots(&self) -> &[BotRuntime] {
        &self.bots
    }

    /// Bots named in `only`, in configuration order; every name must
    /// match. An empty filter selects the whole fleet.
    fn select(&self, only: &[String]) -> Result<Vec<&BotRuntime>> {
        if only.is_empty() {
            return Ok(self.bots.iter().collect());
        }
        for name in only {
            if !self.bots.iter().any(|b| b.name() == name.as_str()) {
                return Err(BotfleetError::InvalidInput(format!(
                    "Unknown bot: {}",
                    name
                )));
            }
        }
        Ok(self
            .bots
            .iter()
            .filter(|b| only.iter().any(|name| name.as_str() == b.name()))
            .collect())
    }

    /// Run the posting batch over the selected bots.
    ///
    /// One bot's failure is logged and skipped; an invalid post aborts
    /// the whole run with nothing committed.
    pub async fn run_post(&self, opts: &PostOptions<'_>) -> Result<RunReport> {
        let selected = self.select(opts.bots)?;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.db.begin().await?;
        let mut report = RunReport::default();

        for bot in selected {
            let action = match self.process_bot(&mut tx, bot, now, opts).await {
                Ok(action) => action,
                Err(e) if e.aborts_run() => return Err(e),
                Err(e) => {
                    warn!(bot = bot.name(), error = %e, "bot produced nothing this run");
                    BotAction::Skipped {
                        reason: e.to_string(),
                    }
                }
            };
            report.outcomes.push(BotOutcome {
                bot_name: bot.name().to_string(),
                action,
            });
        }

        if opts.dry_run {
            tx.rollback()
                .await
                .map_err(crate::error::DbError::SqlxError)?;
        } else {
            tx.commit()
                .await
                .map_err(crate::error::DbError::SqlxError)?;
        }

        Ok(report)
    }

    async fn process_bot(
        &self,
        conn: &mut SqliteConnection,
        bot: &BotRuntime,
        now: i64,
        opts: &PostOptions<'_>,
    ) -> Result<BotAction> {
        let row = self.db.get_bot_on(conn, bot.name()).await?;
        let next_post_time = row.as_ref().and_then(|r| r.next_post_time);

        if !opts.force && !is_ready(next_post_time, now) {
            return Ok(BotAction::NotDue {
                next_post_time: next_post_time.unwrap_or(now),
            });
        }

        let content = self.next_content(conn, bot, now).await?;
        validate_post_content(&content)?;

        let post = Post::new(bot.name(), content);
        self.db.create_post(conn, &post).await?;
        self.db
            .set_next_post_time(conn, bot.name(), bot.policy.next_post_time(now))
            .await?;

        if opts.dry_run {
            return Ok(BotAction::WouldPost {
                content: post.content,
            });
        }

        let (delivered, failed, receipts) = self.deliver_post(conn, bot, &post).await?;
        info!(
            bot = bot.name(),
            post_id = %post.id,
            delivered,
            failed,
            "posted"
        );

        Ok(BotAction::Posted {
            post_id: post.id,
            content: post.content,
            delivered,
            failed,
            receipts,
        })
    }

    /// Resolve the next content to post: earliest due scheduled entry,
    /// then oldest backlog entry, then generation.
    async fn next_content(
        &self,
        conn: &mut SqliteConnection,
        bot: &BotRuntime,
        now: i64,
    ) -> Result<String> {
        if let Some(entry) = self.db.scheduled_pop_due(conn, bot.name(), now).await? {
            return Ok(entry.content);
        }
        if let Some(entry) = self.db.backlog_pop(conn, bot.name()).await? {
            return Ok(entry.content);
        }

        let recency = RecencyFilter::load(&self.db, conn, &bot.config, now).await?;
        let row = self.db.get_bot_on(conn, bot.name()).await?;
        let ctx = GenerationContext {
            bot_name: bot.name(),
            state: row.as_ref().and_then(|r| r.state.as_deref()),
            recency: &recency,
        };
        bot.generator.generate(&ctx)
    }

    /// Deliver to every configured publisher concurrently, recording a
    /// publication per service. Delivery failures are recorded, never
    /// propagated.
    async fn deliver_post(
        &self,
        conn: &mut SqliteConnection,
        bot: &BotRuntime,
        post: &Post,
    ) -> Result<(usize, usize, Vec<String>)> {
        let attempts = join_all(bot.publishers.iter().map(|publisher| async move {
            let outcome = publisher.deliver(post).await;
            (publisher, outcome)
        }))
        .await;

        let mut delivered = 0;
        let mut failed = 0;
        let mut receipts = Vec::with_capacity(attempts.len());
        for (publisher, outcome) in attempts {
            let mut publication = Publication::new_pending(&post.id, publisher.service());
            match outcome {
                Ok(external_id) => {
                    publication.mark_delivered(external_id);
                    delivered += 1;
                }
                Err(e) => {
                    warn!(
                        bot = bot.name(),
                        service = publisher.service(),
                        error = %e,
                        "delivery failed"
                    );
                    publication.mark_failed(e.to_string());
                    failed += 1;
                }
            }
            receipts.push(publisher.display(&publication));
            self.db.create_publication(conn, &publication).await?;
        }

        Ok((delivered, failed, receipts))
    }

    /// Retry failed publications. Commits per bot, so one bot's
    /// completed retries survive a later bot's crash.
    pub async fn run_republish(
        &self,
        only: &[String],
        limit: usize,
    ) -> Result<RepublishReport> {
        let selected = self.select(only)?;
        let mut total = RepublishReport::default();

        for bot in selected {
            let mut tx = self.db.begin().await?;
            match republish_bot(&self.db, &mut tx, bot.name(), &bot.publishers, limit).await {
                Ok(report) => {
                    tx.commit()
                        .await
                        .map_err(crate::error::DbError::SqlxError)?;
                    total.merge(&report);
                }
                Err(e) => {
                    warn!(bot = bot.name(), error = %e, "republish failed for bot");
                }
            }
        }

        Ok(total)
    }

    /// Read-only summaries for the selected bots.
    pub async fn dashboard(&self, only: &[String]) -> Result<Vec<BotDashboard>> {
        let selected = self.select(only)?;
        let mut summaries = Vec::with_capacity(selected.len());

        for bot in selected {
            let row = self.db.get_bot(bot.name()).await?;
            let scheduled = self.db.scheduled_list(bot.name()).await?;
            summaries.push(BotDashboard {
                bot_name: bot.name().to_string(),
                latest_post: self.db.latest_post(bot.name()).await?,
                backlog_count: self.db.backlog_count(bot.name()).await?,
                next_backlog: self
                    .db
                    .backlog_peek(bot.name(), 1)
                    .await?
                    .into_iter()
                    .next()
                    .map(|e| e.content),
                scheduled_count: scheduled.len() as i64,
                next_scheduled: scheduled.into_iter().next(),
                next_post_time: row.and_then(|r| r.next_post_time),
            });
        }

        Ok(summaries)
    }

    // ------------------------------------------------------------------
    // Generator state
    // ------------------------------------------------------------------

    pub async fn show_state(&self, bot_name: &str) -> Result<Option<String>> {
        self.runtime(bot_name)?;
        Ok(self.db.get_bot(bot_name).await?.and_then(|r| r.state))
    }

    /// Validate and store an externally supplied state payload.
    pub async fn set_state(&self, bot_name: &str, payload: &str) -> Result<()> {
        let bot = self.runtime(bot_name)?;
        bot.generator.validate_state(payload)?;

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.db.begin().await?;
        self.db.set_bot_state(&mut tx, bot_name, Some(payload)).await?;
        self.db.touch_state_updated(&mut tx, bot_name, now).await?;
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;
        Ok(())
    }

    /// Refresh generator state if stale (or unconditionally with
    /// `force`), then report whatever state the bot ends up with.
    pub async fn refresh_state(&self, bot_name: &str, force: bool) -> Result<Option<String>> {
        let bot = self.runtime(bot_name)?;
        let now = chrono::Utc::now().timestamp();
        let row = self.db.get_bot(bot_name).await?;
        let current = row.as_ref().and_then(|r| r.state.as_deref());
        let updated_at = row.as_ref().and_then(|r| r.state_updated_at);

        let stale = match updated_at {
            None => true,
            Some(at) => now - at >= STATE_TTL_SECS,
        };
        if !force && !stale {
            return Ok(current.map(|s| s.to_string()));
        }

        let fresh = bot.generator.refresh_state(current)?;
        let mut tx = self.db.begin().await?;
        self.db
            .set_bot_state(&mut tx, bot_name, Some(&fresh))
            .await?;
        self.db.touch_state_updated(&mut tx, bot_name, now).await?;
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        Ok(Some(fresh))
    }

    // ------------------------------------------------------------------
    // Backlog and scheduled queues
    // ------------------------------------------------------------------

    /// Load one backlog entry per non-empty line. Returns entries
    /// loaded and oldest entries evicted to stay within [`BACKLOG_MAX`].
    pub async fn load_backlog(&self, bot_name: &str, raw_text: &str) -> Result<(usize, u64)> {
        self.runtime(bot_name)?;
        let entries: Vec<&str> = raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut tx = self.db.begin().await?;
        for entry in &entries {
            self.db.backlog_push(&mut tx, bot_name, entry).await?;
        }
        let evicted = self.db.backlog_trim(&mut tx, bot_name, BACKLOG_MAX).await?;
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;

        if evicted > 0 {
            warn!(bot = bot_name, evicted, "backlog full, dropped oldest entries");
        }
        Ok((entries.len(), evicted))
    }

    pub async fn clear_backlog(&self, bot_name: &str) -> Result<u64> {
        self.runtime(bot_name)?;
        let mut tx = self.db.begin().await?;
        let removed = self.db.backlog_clear(&mut tx, bot_name).await?;
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;
        Ok(removed)
    }

    /// Queue one scheduled entry per non-empty line. A line may carry
    /// its own publish time as an RFC 3339 prefix separated by a tab
    /// (`2025-11-20T15:00:00Z<TAB>content`); other lines share the
    /// `publish_at` default.
    pub async fn load_scheduled(
        &self,
        bot_name: &str,
        raw_text: &str,
        publish_at: Option<i64>,
    ) -> Result<usize> {
        self.runtime(bot_name)?;

        let mut tx = self.db.begin().await?;
        let mut loaded = 0;
        for line in raw_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (content, at) = split_timed_line(line, publish_at);
            if content.is_empty() {
                continue;
            }
            self.db.scheduled_push(&mut tx, bot_name, content, at).await?;
            loaded += 1;
        }
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;
        Ok(loaded)
    }

    pub async fn clear_scheduled(&self, bot_name: &str) -> Result<u64> {
        self.runtime(bot_name)?;
        let mut tx = self.db.begin().await?;
        let removed = self.db.scheduled_clear(&mut tx, bot_name).await?;
        tx.commit()
            .await
            .map_err(crate::error::DbError::SqlxError)?;
        Ok(removed)
    }

    /// Probe every publisher of the selected bots without publishing.
    pub async fn self_test(&self, only: &[String]) -> Result<SelfTestReport> {
        let selected = self.select(only)?;
        let mut report = SelfTestReport::default();

        for bot in selected {
            for publisher in &bot.publishers {
                report.checked += 1;
                if let Err(e) = publisher.self_test().await {
                    report.failures.push((
                        bot.name().to_string(),
                        publisher.service().to_string(),
                        e.to_string(),
                    ));
                }
            }
        }

        Ok(report)
    }

    fn runtime(&self, bot_name: &str) -> Result<&BotRuntime> {
        self.bots
            .iter()
            .find(|b| b.name() == bot_name)
            .ok_or_else(|| BotfleetError::InvalidInput(format!("Unknown bot: {}", bot_name)))
    }
}

/// Hard constraints content must meet before it may be committed.
fn validate_post_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(BotfleetError::InvalidPost(
            "content is empty".to_string(),
        ));
    }
    let chars = content.chars().count();
    if chars > MAX_POST_CHARS {
        return Err(BotfleetError::InvalidPost(format!(
            "content is {} chars, limit is {}",
            chars, MAX_POST_CHARS
        )));
    }
    Ok(())
}

/// Split an optional RFC 3339 publish-time prefix off a queue line. A
/// tab separates the timestamp from the content; a line whose prefix
/// does not parse is plain content.
fn split_timed_line(line: &str, default: Option<i64>) -> (&str, Option<i64>) {
    if let Some((prefix, rest)) = line.split_once('\t') {
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(prefix.trim()) {
            return (rest.trim(), Some(dt.timestamp()));
        }
    }
    (line, default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publishers::mock::MockPublisher;
    use tempfile::TempDir;

    fn bot_config(name: &str) -> BotConfig {
        BotConfig {
            name: name.to_string(),
            implementation: "static".to_string(),
            interval: "asap".to_string(),
            publishers: vec![],
            allowed_words: vec![],
        }
    }

    fn static_runtime(name: &str, publishers: Vec<Box<dyn Publisher>>) -> BotRuntime {
        BotRuntime::new(
            bot_config(name),
            IntervalPolicy::Asap,
            Box::new(crate::generator::StaticGenerator),
            publishers,
        )
    }

    async fn fleet_with(dir: &TempDir, bots: Vec<BotRuntime>) -> Fleet {
        let path = dir.path().join("fleet.db");
        let db = Database::new(path.to_str().unwrap()).await.unwrap();
        Fleet::from_parts(db, bots).await.unwrap()
    }

    #[tokio::test]
    async fn test_unknown_bot_filter_is_invalid_input() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(&dir, vec![static_runtime("ama", vec![])]).await;

        let result = fleet
            .run_post(&PostOptions {
                bots: &["nobody".to_string()],
                dry_run: false,
                force: false,
            })
            .await;
        assert!(matches!(result, Err(BotfleetError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_backlog_post_delivers_and_commits() {
        let dir = TempDir::new().unwrap();
        let publisher = MockPublisher::success("mock");
        let (_, delivered_handle) = publisher.handles();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime("ama", vec![Box::new(publisher)])],
        )
        .await;

        fleet.load_backlog("ama", "from the backlog\n").await.unwrap();
        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        assert!(matches!(
            report.outcomes[0].action,
            BotAction::Posted { delivered: 1, failed: 0, .. }
        ));
        assert_eq!(
            delivered_handle.lock().unwrap().as_slice(),
            ["from the backlog"]
        );
        assert_eq!(fleet.db().backlog_count("ama").await.unwrap(), 0);

        let latest = fleet.db().latest_post("ama").await.unwrap().unwrap();
        assert_eq!(latest.post.content, "from the backlog");
        assert_eq!(latest.publications.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_commits_nothing_and_delivers_nothing() {
        let dir = TempDir::new().unwrap();
        let publisher = MockPublisher::success("mock");
        let (calls, _) = publisher.handles();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime("ama", vec![Box::new(publisher)])],
        )
        .await;

        fleet.load_backlog("ama", "kept safe\n").await.unwrap();
        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: true,
                force: false,
            })
            .await
            .unwrap();

        assert!(matches!(
            report.outcomes[0].action,
            BotAction::WouldPost { .. }
        ));
        assert_eq!(*calls.lock().unwrap(), 0);
        // Rolled back: the backlog entry is still there, no post exists.
        assert_eq!(fleet.db().backlog_count("ama").await.unwrap(), 1);
        assert!(fleet.db().latest_post("ama").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scheduler_gate_and_force() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime("ama", vec![Box::new(MockPublisher::success("mock"))])],
        )
        .await;

        // Push next_post_time into the future.
        let future = chrono::Utc::now().timestamp() + 3600;
        let mut tx = fleet.db().begin().await.unwrap();
        fleet
            .db()
            .set_next_post_time(&mut tx, "ama", Some(future))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        fleet.load_backlog("ama", "waiting\n").await.unwrap();

        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();
        assert!(matches!(report.outcomes[0].action, BotAction::NotDue { .. }));

        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: true,
            })
            .await
            .unwrap();
        assert!(matches!(report.outcomes[0].action, BotAction::Posted { .. }));
    }

    #[tokio::test]
    async fn test_generation_failure_skips_bot_but_not_run() {
        let dir = TempDir::new().unwrap();
        // First bot has nothing to post; second has a backlog entry.
        let fleet = fleet_with(
            &dir,
            vec![
                static_runtime("empty", vec![]),
                static_runtime("stocked", vec![Box::new(MockPublisher::success("mock"))]),
            ],
        )
        .await;
        fleet.load_backlog("stocked", "still posts\n").await.unwrap();

        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        assert!(matches!(report.outcomes[0].action, BotAction::Skipped { .. }));
        assert!(matches!(report.outcomes[1].action, BotAction::Posted { .. }));
    }

    #[tokio::test]
    async fn test_invalid_post_aborts_whole_run() {
        let dir = TempDir::new().unwrap();
        let healthy = MockPublisher::success("mock");
        let (calls, _) = healthy.handles();
        let fleet = fleet_with(
            &dir,
            vec![
                static_runtime("first", vec![Box::new(MockPublisher::success("mock"))]),
                static_runtime("second", vec![Box::new(healthy)]),
            ],
        )
        .await;

        fleet.load_backlog("first", "a fine post\n").await.unwrap();
        // Whitespace-only content survives line loading only via the
        // scheduled queue.
        let mut tx = fleet.db().begin().await.unwrap();
        fleet
            .db()
            .scheduled_push(&mut tx, "second", "   ", None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let result = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await;
        assert!(matches!(result, Err(BotfleetError::InvalidPost(_))));

        // Nothing from the run was committed, not even the first bot.
        assert!(fleet.db().latest_post("first").await.unwrap().is_none());
        assert_eq!(fleet.db().backlog_count("first").await.unwrap(), 1);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_delivery_commits_with_failure_recorded() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime(
                "ama",
                vec![
                    Box::new(MockPublisher::success("a")),
                    Box::new(MockPublisher::delivery_failure("b", "relay down")),
                ],
            )],
        )
        .await;

        fleet.load_backlog("ama", "mixed luck\n").await.unwrap();
        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        assert!(matches!(
            report.outcomes[0].action,
            BotAction::Posted { delivered: 1, failed: 1, .. }
        ));
        assert_eq!(report.delivery_failures(), 1);

        let latest = fleet.db().latest_post("ama").await.unwrap().unwrap();
        let statuses: Vec<String> = latest
            .publications
            .iter()
            .map(|p| format!("{}:{}", p.service, p.status()))
            .collect();
        assert_eq!(statuses, vec!["a:delivered", "b:failed"]);
    }

    #[tokio::test]
    async fn test_fixed_interval_advances_cursor() {
        let dir = TempDir::new().unwrap();
        let mut runtime = static_runtime("ama", vec![Box::new(MockPublisher::success("mock"))]);
        runtime.policy = IntervalPolicy::Every(3600);
        let fleet = fleet_with(&dir, vec![runtime]).await;

        fleet.load_backlog("ama", "on the hour\n").await.unwrap();
        let before = chrono::Utc::now().timestamp();
        fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        let row = fleet.db().get_bot("ama").await.unwrap().unwrap();
        let next = row.next_post_time.unwrap();
        assert!(next >= before + 3600 && next <= before + 3610);
    }

    #[tokio::test]
    async fn test_scheduled_beats_backlog() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime("ama", vec![Box::new(MockPublisher::success("mock"))])],
        )
        .await;

        fleet.load_backlog("ama", "backlog entry\n").await.unwrap();
        fleet
            .load_scheduled("ama", "scheduled entry\n", Some(chrono::Utc::now().timestamp() - 60))
            .await
            .unwrap();

        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        match &report.outcomes[0].action {
            BotAction::Posted { content, .. } => assert_eq!(content, "scheduled entry"),
            other => panic!("unexpected action: {:?}", other),
        }
        assert_eq!(fleet.db().backlog_count("ama").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_state_validates_through_generator() {
        let dir = TempDir::new().unwrap();
        let mut config = bot_config("ama");
        config.implementation = "potentials".to_string();
        let runtime = BotRuntime::new(
            config,
            IntervalPolicy::Asap,
            Box::new(crate::generator::PotentialsGenerator),
            vec![],
        );
        let fleet = fleet_with(&dir, vec![runtime]).await;

        assert!(fleet.set_state("ama", "not json").await.is_err());
        assert_eq!(fleet.show_state("ama").await.unwrap(), None);

        let payload = r#"[{"content": "a thought", "score": 2.0}]"#;
        fleet.set_state("ama", payload).await.unwrap();
        assert_eq!(fleet.show_state("ama").await.unwrap().as_deref(), Some(payload));
    }

    #[tokio::test]
    async fn test_self_test_reports_unhealthy_publisher() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime(
                "ama",
                vec![
                    Box::new(MockPublisher::success("good")),
                    Box::new(MockPublisher::unhealthy("bad")),
                ],
            )],
        )
        .await;

        let report = fleet.self_test(&[]).await.unwrap();
        assert_eq!(report.checked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].1, "bad");
    }

    #[tokio::test]
    async fn test_dashboard_summarizes_queues() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(&dir, vec![static_runtime("ama", vec![])]).await;

        fleet.load_backlog("ama", "one\ntwo\n").await.unwrap();
        fleet.load_scheduled("ama", "timed", Some(12345)).await.unwrap();

        let summaries = fleet.dashboard(&[]).await.unwrap();
        assert_eq!(summaries.len(), 1);
        let dash = &summaries[0];
        assert_eq!(dash.backlog_count, 2);
        assert_eq!(dash.next_backlog.as_deref(), Some("one"));
        assert_eq!(dash.scheduled_count, 1);
        assert_eq!(dash.next_scheduled.as_ref().unwrap().publish_at, Some(12345));
        assert!(dash.latest_post.is_none());
        assert_eq!(dash.next_post_time, None);
    }

    #[tokio::test]
    async fn test_overlong_content_aborts_whole_run() {
        let dir = TempDir::new().unwrap();
        let publisher = MockPublisher::success("mock");
        let (calls, _) = publisher.handles();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime("ama", vec![Box::new(publisher)])],
        )
        .await;

        let oversized = "x".repeat(MAX_POST_CHARS + 100);
        fleet
            .load_backlog("ama", &format!("{}\n", oversized))
            .await
            .unwrap();

        let result = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await;
        assert!(matches!(result, Err(BotfleetError::InvalidPost(_))));

        // Nothing committed or delivered; the entry stays queued.
        assert!(fleet.db().latest_post("ama").await.unwrap().is_none());
        assert_eq!(fleet.db().backlog_count("ama").await.unwrap(), 1);
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_posted_reports_publication_receipts() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![static_runtime(
                "ama",
                vec![
                    Box::new(MockPublisher::success("a")),
                    Box::new(MockPublisher::delivery_failure("b", "relay down")),
                ],
            )],
        )
        .await;

        fleet.load_backlog("ama", "receipted\n").await.unwrap();
        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        match &report.outcomes[0].action {
            BotAction::Posted { receipts, .. } => {
                assert_eq!(receipts.len(), 2);
                assert!(receipts[0].starts_with("a: delivered ("));
                assert!(receipts[1].starts_with("b: failed ("));
                assert!(receipts[1].contains("relay down"));
            }
            other => panic!("unexpected action: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bot_filter_selects_multiple_bots() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(
            &dir,
            vec![
                static_runtime("a", vec![Box::new(MockPublisher::success("mock"))]),
                static_runtime("b", vec![Box::new(MockPublisher::success("mock"))]),
                static_runtime("c", vec![Box::new(MockPublisher::success("mock"))]),
            ],
        )
        .await;
        for name in ["a", "b", "c"] {
            fleet.load_backlog(name, "queued\n").await.unwrap();
        }

        let filter = vec!["a".to_string(), "c".to_string()];
        let report = fleet
            .run_post(&PostOptions {
                bots: &filter,
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();

        let names: Vec<&str> = report
            .outcomes
            .iter()
            .map(|o| o.bot_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        // The unselected bot kept its backlog.
        assert_eq!(fleet.db().backlog_count("b").await.unwrap(), 1);

        // One unknown name rejects the whole filter.
        let filter = vec!["a".to_string(), "nobody".to_string()];
        let result = fleet
            .run_post(&PostOptions {
                bots: &filter,
                dry_run: false,
                force: false,
            })
            .await;
        assert!(matches!(result, Err(BotfleetError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_scheduled_load_parses_timestamp_prefix() {
        let dir = TempDir::new().unwrap();
        let fleet = fleet_with(&dir, vec![static_runtime("ama", vec![])]).await;

        let default_at = 9_999_999;
        let loaded = fleet
            .load_scheduled(
                "ama",
                "2025-11-20T15:00:00Z\ttimed entry\nplain entry\nnot a time\tstill one entry\n",
                Some(default_at),
            )
            .await
            .unwrap();
        assert_eq!(loaded, 3);

        let expected = chrono::DateTime::parse_from_rfc3339("2025-11-20T15:00:00Z")
            .unwrap()
            .timestamp();
        let list = fleet.db().scheduled_list("ama").await.unwrap();

        let timed = list.iter().find(|e| e.content == "timed entry").unwrap();
        assert_eq!(timed.publish_at, Some(expected));

        // The per-line prefix wins over the shared default.
        let plain = list.iter().find(|e| e.content == "plain entry").unwrap();
        assert_eq!(plain.publish_at, Some(default_at));

        // A tab without a parseable timestamp leaves the line intact.
        let tabbed = list
            .iter()
            .find(|e| e.content == "not a time\tstill one entry")
            .unwrap();
        assert_eq!(tabbed.publish_at, Some(default_at));
    }

    #[tokio::test]
    async fn test_in_memory_database_serves_a_full_run() {
        let db = Database::new(":memory:").await.unwrap();
        let mut config = bot_config("ama");
        config.implementation = "potentials".to_string();
        let runtime = BotRuntime::new(
            config,
            IntervalPolicy::Asap,
            Box::new(crate::generator::PotentialsGenerator),
            vec![Box::new(MockPublisher::delivery_failure("mock", "down"))],
        );
        let fleet = Fleet::from_parts(db, vec![runtime]).await.unwrap();
        fleet
            .set_state("ama", r#"[{"content": "memory resident", "score": 1.0}]"#)
            .await
            .unwrap();

        // Generation reads bot state and recency history while the run
        // transaction holds the database's only connection.
        let report = fleet
            .run_post(&PostOptions {
                bots: &[],
                dry_run: false,
                force: false,
            })
            .await
            .unwrap();
        assert!(matches!(
            report.outcomes[0].action,
            BotAction::Posted { failed: 1, .. }
        ));

        // Republication scans failures inside its own transaction.
        let report = fleet.run_republish(&[], 10).await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.still_failing, 1);
    }
}
