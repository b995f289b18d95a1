use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use serde::Serialize;
use storytime_common::{Story, StoryPart};
use tracing::{debug, info};

use crate::errors::{StoryError, StoryResult};

/// Async-safe handle to the story database.
///
/// Wraps `StoryDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O
/// never ties up async worker threads.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<StoryDb>>,
}

impl DbHandle {
    pub fn new(db: StoryDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> StoryResult<R>
    where
        F: FnOnce(&StoryDb) -> StoryResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| StoryError::storage(format!("DB lock poisoned: {}", e)))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoryError::Storage(anyhow::Error::new(e).context("DB task panicked")))?
    }
}

/// Rows removed by [`StoryDb::clear_all`], per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearSummary {
    pub stories: usize,
    pub parts: usize,
    pub index_entries: usize,
    pub user_info: usize,
}

pub struct StoryDb {
    conn: Connection,
}

impl StoryDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> StoryResult<Self> {
        let conn = Connection::open(path)
            .map_err(|e| StoryError::Storage(anyhow::Error::new(e).context("Failed to open SQLite database")))?;
        // Writers queue behind each other's IMMEDIATE transactions.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        info!(path = %path.display(), "opened story database");
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> StoryResult<Self> {
        debug!("opening in-memory story database");
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> StoryResult<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.run_migrations()
    }

    fn run_migrations(&self) -> StoryResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS stories (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                creator TEXT NOT NULL,
                authors TEXT NOT NULL,
                next_author TEXT NOT NULL,
                next_part_id TEXT,
                modified_at TEXT NOT NULL,
                finished_at TEXT,
                complete INTEGER NOT NULL DEFAULT 0,
                target_words INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS story_parts (
                story_id TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                author TEXT NOT NULL,
                written_at TEXT NOT NULL,
                hidden TEXT NOT NULL DEFAULT '',
                visible TEXT NOT NULL DEFAULT '',
                PRIMARY KEY (story_id, id),
                UNIQUE (story_id, seq)
            );

            CREATE TABLE IF NOT EXISTS author_index (
                author TEXT NOT NULL,
                story_id TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                PRIMARY KEY (author, story_id)
            );

            CREATE TABLE IF NOT EXISTS user_info (
                email TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stories_complete ON stories(complete, finished_at);
            CREATE INDEX IF NOT EXISTS idx_author_index_story ON author_index(story_id);
            ",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a write transaction that takes the database write lock up front,
    /// so a read followed by a write inside it cannot interleave with another
    /// writer.
    pub fn begin_immediate(&self) -> StoryResult<Transaction<'_>> {
        begin_immediate(&self.conn)
    }

    pub fn get_story(&self, id: &str) -> StoryResult<Option<Story>> {
        read_story(&self.conn, id)
    }

    /// Most recently finished stories, newest first.
    pub fn completed_stories(&self, limit: usize) -> StoryResult<Vec<Story>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM stories WHERE complete = 1 ORDER BY finished_at DESC LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut stories = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(story) = read_story(&self.conn, &id)? {
                stories.push(story);
            }
        }
        Ok(stories)
    }

    pub fn count_stories(&self) -> StoryResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every record of every kind. Each kind is cleared on its own;
    /// a failure part way leaves earlier kinds cleared.
    pub fn clear_all(&self) -> StoryResult<ClearSummary> {
        let summary = ClearSummary {
            index_entries: self.conn.execute("DELETE FROM author_index", [])?,
            parts: self.conn.execute("DELETE FROM story_parts", [])?,
            stories: self.conn.execute("DELETE FROM stories", [])?,
            user_info: self.conn.execute("DELETE FROM user_info", [])?,
        };
        info!(?summary, "cleared datastore");
        Ok(summary)
    }
}

pub fn begin_immediate(conn: &Connection) -> StoryResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

// ── Row mapping ───────────────────────────────────────────────────────

/// Current time at the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn fmt_ts(ts: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches chronological order in SQL.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> StoryResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoryError::Storage(anyhow::Error::new(e).context(format!("Bad timestamp '{}'", raw))))
}

struct StoryRow {
    id: String,
    created_at: String,
    creator: String,
    authors: String,
    next_author: String,
    next_part_id: Option<String>,
    modified_at: String,
    finished_at: Option<String>,
    complete: bool,
    target_words: u32,
}

impl StoryRow {
    fn into_story(self, parts: Vec<StoryPart>) -> StoryResult<Story> {
        Ok(Story {
            id: self.id,
            created_at: parse_ts(&self.created_at)?,
            creator: self.creator,
            authors: serde_json::from_str(&self.authors)?,
            next_author: self.next_author,
            next_part_id: self.next_part_id,
            modified_at: parse_ts(&self.modified_at)?,
            finished_at: self.finished_at.as_deref().map(parse_ts).transpose()?,
            complete: self.complete,
            target_words: self.target_words,
            parts,
        })
    }
}

struct PartRow {
    id: String,
    story_id: String,
    author: String,
    written_at: String,
    hidden: String,
    visible: String,
}

impl PartRow {
    fn into_part(self) -> StoryResult<StoryPart> {
        Ok(StoryPart {
            id: self.id,
            story_id: self.story_id,
            author: self.author,
            written_at: parse_ts(&self.written_at)?,
            hidden: self.hidden,
            visible: self.visible,
        })
    }
}

/// Load a story with all of its parts. Works on a plain connection or inside
/// a transaction.
pub fn read_story(conn: &Connection, id: &str) -> StoryResult<Option<Story>> {
    let row = conn
        .query_row(
            "SELECT id, created_at, creator, authors, next_author, next_part_id, modified_at, finished_at, complete, target_words
             FROM stories WHERE id = ?1",
            params![id],
            |row| {
                Ok(StoryRow {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    creator: row.get(2)?,
                    authors: row.get(3)?,
                    next_author: row.get(4)?,
                    next_part_id: row.get(5)?,
                    modified_at: row.get(6)?,
                    finished_at: row.get(7)?,
                    complete: row.get(8)?,
                    target_words: row.get(9)?,
                })
            },
        )
        .optional()?;
    let Some(row) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT id, story_id, author, written_at, hidden, visible
         FROM story_parts WHERE story_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt.query_map(params![id], |row| {
        Ok(PartRow {
            id: row.get(0)?,
            story_id: row.get(1)?,
            author: row.get(2)?,
            written_at: row.get(3)?,
            hidden: row.get(4)?,
            visible: row.get(5)?,
        })
    })?;
    let mut parts = Vec::new();
    for row in rows {
        parts.push(row?.into_part()?);
    }
    Ok(Some(row.into_story(parts)?))
}

pub(crate) fn story_exists(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM stories WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )
}

pub(crate) fn insert_story_row(conn: &Connection, story: &Story) -> rusqlite::Result<()> {
    let authors = serde_json::to_string(&story.authors)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO stories (id, created_at, creator, authors, next_author, next_part_id, modified_at, finished_at, complete, target_words)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            story.id,
            fmt_ts(&story.created_at),
            story.creator,
            authors,
            story.next_author,
            story.next_part_id,
            fmt_ts(&story.modified_at),
            story.finished_at.as_ref().map(fmt_ts),
            story.complete,
            story.target_words,
        ],
    )?;
    Ok(())
}

pub(crate) fn part_exists(conn: &Connection, story_id: &str, id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM story_parts WHERE story_id = ?1 AND id = ?2",
        params![story_id, id],
        |row| row.get(0),
    )
}

/// Append a part row after the story's existing parts.
pub(crate) fn insert_part_row(conn: &Connection, part: &StoryPart) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO story_parts (story_id, id, seq, author, written_at, hidden, visible)
         VALUES (?1, ?2, (SELECT COALESCE(MAX(seq), -1) + 1 FROM story_parts WHERE story_id = ?1), ?3, ?4, ?5, ?6)",
        params![
            part.story_id,
            part.id,
            part.author,
            fmt_ts(&part.written_at),
            part.hidden,
            part.visible,
        ],
    )?;
    Ok(())
}

/// Write back a story's mutable fields, but only if its part token is still
/// `expected_part_id`. Returns the number of rows changed (0 or 1).
pub(crate) fn update_story_if_current(
    conn: &Connection,
    story: &Story,
    expected_part_id: &str,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE stories
         SET next_author = ?1, next_part_id = ?2, modified_at = ?3, finished_at = ?4, complete = ?5
         WHERE id = ?6 AND next_part_id = ?7",
        params![
            story.next_author,
            story.next_part_id,
            fmt_ts(&story.modified_at),
            story.finished_at.as_ref().map(fmt_ts),
            story.complete,
            story.id,
            expected_part_id,
        ],
    )
}
