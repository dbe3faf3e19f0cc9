//! Database operations for Botfleet
//!
//! Reads run against the connection pool and therefore see committed
//! state only. Writes take an explicit connection so a batch run can
//! stage every mutation in one transaction and commit (or drop) it as
//! a whole. Reads that happen while that transaction is open use the
//! `_on` variants, which run on the transaction's own connection; an
//! in-memory database has exactly one connection, so a pool read
//! mid-run would never be served.

use sqlx::sqlite::{SqliteConnection, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;

use crate::error::{DbError, Result};
use crate::types::{BacklogEntry, BotRow, Post, Publication, ScheduledPost};

/// A post with all its publications
#[derive(Debug, Clone)]
pub struct PostWithPublications {
    pub post: Post,
    pub publications: Vec<Publication>,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == ":memory:" {
            // A shared pool would hand each connection its own empty
            // in-memory database.
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            // mode=rwc creates the database file if it doesn't exist.
            let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));
            SqlitePool::connect(&db_url)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin the one transaction covering a batch run.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(|e| DbError::SqlxError(e).into())
    }

    // ------------------------------------------------------------------
    // Bots
    // ------------------------------------------------------------------

    /// Create the bot row if it doesn't exist yet.
    pub async fn ensure_bot(&self, conn: &mut SqliteConnection, name: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO bots (name) VALUES (?)")
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn get_bot(&self, name: &str) -> Result<Option<BotRow>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.get_bot_on(&mut conn, name).await
    }

    pub async fn get_bot_on(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
    ) -> Result<Option<BotRow>> {
        let row = sqlx::query(
            "SELECT name, state, state_updated_at, next_post_time FROM bots WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| BotRow {
            name: r.get("name"),
            state: r.get("state"),
            state_updated_at: r.get("state_updated_at"),
            next_post_time: r.get("next_post_time"),
        }))
    }

    pub async fn set_next_post_time(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        next_post_time: Option<i64>,
    ) -> Result<()> {
        sqlx::query("UPDATE bots SET next_post_time = ? WHERE name = ?")
            .bind(next_post_time)
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn set_bot_state(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        state: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE bots SET state = ? WHERE name = ?")
            .bind(state)
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Record when the generator state was last refreshed.
    pub async fn touch_state_updated(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        at: i64,
    ) -> Result<()> {
        sqlx::query("UPDATE bots SET state_updated_at = ? WHERE name = ?")
            .bind(at)
            .bind(name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts and publications
    // ------------------------------------------------------------------

    pub async fn create_post(&self, conn: &mut SqliteConnection, post: &Post) -> Result<()> {
        sqlx::query(
            "INSERT INTO posts (id, bot_name, content, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(&post.bot_name)
        .bind(&post.content)
        .bind(post.created_at)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.get_post_on(&mut conn, post_id).await
    }

    pub async fn get_post_on(
        &self,
        conn: &mut SqliteConnection,
        post_id: &str,
    ) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT id, bot_name, content, created_at FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(row.map(|r| Post {
            id: r.get("id"),
            bot_name: r.get("bot_name"),
            content: r.get("content"),
            created_at: r.get("created_at"),
        }))
    }

    pub async fn create_publication(
        &self,
        conn: &mut SqliteConnection,
        publication: &Publication,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO publications
                (post_id, service, first_attempt, most_recent_attempt, error, external_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&publication.post_id)
        .bind(&publication.service)
        .bind(publication.first_attempt)
        .bind(publication.most_recent_attempt)
        .bind(&publication.error)
        .bind(&publication.external_id)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.last_insert_rowid())
    }

    /// Update a retried publication. `first_attempt` is deliberately not
    /// in the column list.
    pub async fn update_publication(
        &self,
        conn: &mut SqliteConnection,
        publication: &Publication,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE publications
            SET most_recent_attempt = ?, error = ?, external_id = ?
            WHERE id = ?
            "#,
        )
        .bind(publication.most_recent_attempt)
        .bind(&publication.error)
        .bind(&publication.external_id)
        .bind(publication.id)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn publications_for_post(&self, post_id: &str) -> Result<Vec<Publication>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, service, first_attempt, most_recent_attempt, error, external_id
            FROM publications WHERE post_id = ? ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(publication_from_row).collect())
    }

    /// Most recent post for a bot, with its publications.
    pub async fn latest_post(&self, bot_name: &str) -> Result<Option<PostWithPublications>> {
        let row = sqlx::query(
            r#"
            SELECT id, bot_name, content, created_at FROM posts
            WHERE bot_name = ? ORDER BY created_at DESC, id DESC LIMIT 1
            "#,
        )
        .bind(bot_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let post = match row {
            Some(r) => Post {
                id: r.get("id"),
                bot_name: r.get("bot_name"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            },
            None => return Ok(None),
        };

        let publications = self.publications_for_post(&post.id).await?;
        Ok(Some(PostWithPublications { post, publications }))
    }

    /// Posts created at or after `since`, oldest first.
    pub async fn recent_posts(&self, bot_name: &str, since: i64) -> Result<Vec<Post>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.recent_posts_on(&mut conn, bot_name, since).await
    }

    pub async fn recent_posts_on(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        since: i64,
    ) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, bot_name, content, created_at FROM posts
            WHERE bot_name = ? AND created_at >= ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(bot_name)
        .bind(since)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| Post {
                id: r.get("id"),
                bot_name: r.get("bot_name"),
                content: r.get("content"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Posts with at least one failed publication, oldest first, bounded
    /// by a limit on distinct posts.
    pub async fn failed_post_ids(&self, bot_name: &str, limit: usize) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.failed_post_ids_on(&mut conn, bot_name, limit).await
    }

    pub async fn failed_post_ids_on(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id FROM posts p
            WHERE p.bot_name = ?
              AND EXISTS (
                SELECT 1 FROM publications pb
                WHERE pb.post_id = p.id AND pb.error IS NOT NULL
              )
            ORDER BY p.created_at ASC
            LIMIT ?
            "#,
        )
        .bind(bot_name)
        .bind(limit as i64)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    pub async fn failed_publications_for_post(&self, post_id: &str) -> Result<Vec<Publication>> {
        let mut conn = self.pool.acquire().await.map_err(DbError::SqlxError)?;
        self.failed_publications_for_post_on(&mut conn, post_id).await
    }

    pub async fn failed_publications_for_post_on(
        &self,
        conn: &mut SqliteConnection,
        post_id: &str,
    ) -> Result<Vec<Publication>> {
        let rows = sqlx::query(
            r#"
            SELECT id, post_id, service, first_attempt, most_recent_attempt, error, external_id
            FROM publications WHERE post_id = ? AND error IS NOT NULL ORDER BY id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(publication_from_row).collect())
    }

    // ------------------------------------------------------------------
    // Backlog (FIFO by rowid)
    // ------------------------------------------------------------------

    pub async fn backlog_count(&self, bot_name: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM backlog WHERE bot_name = ?")
            .bind(bot_name)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(row.get("n"))
    }

    pub async fn backlog_peek(&self, bot_name: &str, n: usize) -> Result<Vec<BacklogEntry>> {
        let rows = sqlx::query(
            "SELECT id, bot_name, content FROM backlog WHERE bot_name = ? ORDER BY id ASC LIMIT ?",
        )
        .bind(bot_name)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| BacklogEntry {
                id: r.get("id"),
                bot_name: r.get("bot_name"),
                content: r.get("content"),
            })
            .collect())
    }

    pub async fn backlog_push(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        content: &str,
    ) -> Result<()> {
        sqlx::query("INSERT INTO backlog (bot_name, content) VALUES (?, ?)")
            .bind(bot_name)
            .bind(content)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Remove and return the oldest entry. Select and delete run on the
    /// same connection so a drained entry can never be served twice.
    pub async fn backlog_pop(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
    ) -> Result<Option<BacklogEntry>> {
        let row = sqlx::query(
            "SELECT id, bot_name, content FROM backlog WHERE bot_name = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(bot_name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        let entry = match row {
            Some(r) => BacklogEntry {
                id: r.get("id"),
                bot_name: r.get("bot_name"),
                content: r.get("content"),
            },
            None => return Ok(None),
        };

        sqlx::query("DELETE FROM backlog WHERE id = ?")
            .bind(entry.id)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(Some(entry))
    }

    /// Evict oldest entries beyond `keep`. Returns rows removed.
    pub async fn backlog_trim(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        keep: usize,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM backlog
            WHERE bot_name = ?
              AND id NOT IN (
                SELECT id FROM backlog WHERE bot_name = ? ORDER BY id DESC LIMIT ?
              )
            "#,
        )
        .bind(bot_name)
        .bind(bot_name)
        .bind(keep as i64)
        .execute(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    pub async fn backlog_clear(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM backlog WHERE bot_name = ?")
            .bind(bot_name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------
    // Scheduled posts (publish_at ascending, NULLs last)
    // ------------------------------------------------------------------

    pub async fn scheduled_count(&self, bot_name: &str) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM scheduled_posts WHERE bot_name = ?")
            .bind(bot_name)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(row.get("n"))
    }

    pub async fn scheduled_list(&self, bot_name: &str) -> Result<Vec<ScheduledPost>> {
        let rows = sqlx::query(
            r#"
            SELECT id, bot_name, content, publish_at FROM scheduled_posts
            WHERE bot_name = ?
            ORDER BY publish_at IS NULL, publish_at ASC, id ASC
            "#,
        )
        .bind(bot_name)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows.iter().map(scheduled_from_row).collect())
    }

    pub async fn scheduled_push(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        content: &str,
        publish_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO scheduled_posts (bot_name, content, publish_at) VALUES (?, ?, ?)")
            .bind(bot_name)
            .bind(content)
            .bind(publish_at)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Remove and return the earliest due entry. Timed entries due at or
    /// before `now` come first; untimed entries are due whenever nothing
    /// timed is due.
    pub async fn scheduled_pop_due(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
        now: i64,
    ) -> Result<Option<ScheduledPost>> {
        let row = sqlx::query(
            r#"
            SELECT id, bot_name, content, publish_at FROM scheduled_posts
            WHERE bot_name = ? AND (publish_at IS NULL OR publish_at <= ?)
            ORDER BY publish_at IS NULL, publish_at ASC, id ASC
            LIMIT 1
            "#,
        )
        .bind(bot_name)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await
        .map_err(DbError::SqlxError)?;

        let entry = match row {
            Some(ref r) => scheduled_from_row(r),
            None => return Ok(None),
        };

        sqlx::query("DELETE FROM scheduled_posts WHERE id = ?")
            .bind(entry.id)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(Some(entry))
    }

    pub async fn scheduled_clear(
        &self,
        conn: &mut SqliteConnection,
        bot_name: &str,
    ) -> Result<u64> {
        let result = sqlx::query("DELETE FROM scheduled_posts WHERE bot_name = ?")
            .bind(bot_name)
            .execute(&mut *conn)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(result.rows_affected())
    }
}

fn publication_from_row(r: &sqlx::sqlite::SqliteRow) -> Publication {
    Publication {
        id: r.get("id"),
        post_id: r.get("post_id"),
        service: r.get("service"),
        first_attempt: r.get("first_attempt"),
        most_recent_attempt: r.get("most_recent_attempt"),
        error: r.get("error"),
        external_id: r.get("external_id"),
    }
}

fn scheduled_from_row(r: &sqlx::sqlite::SqliteRow) -> ScheduledPost {
    ScheduledPost {
        id: r.get("id"),
        bot_name: r.get("bot_name"),
        content: r.get("content"),
        publish_at: r.get("publish_at"),
    }
}
