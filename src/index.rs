//! Author → pending story index.
//!
//! An incomplete story has exactly one entry, for its current `next_author`.
//! Entries only change inside the transaction that changes the story, and
//! the story row stays authoritative: reads join back to `stories` and
//! `rebuild_index` can regenerate the table from scratch.

use rusqlite::{Connection, params};
use storytime_common::{PendingStory, Story};
use tracing::info;

use crate::errors::StoryResult;
use crate::store::{self, fmt_ts, parse_ts};

/// Create the entry for a newly started story.
pub fn create_index_entries(conn: &Connection, story: &Story) -> rusqlite::Result<()> {
    if story.complete {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO author_index (author, story_id, created_at) VALUES (?1, ?2, ?3)",
        params![story.next_author, story.id, fmt_ts(&story.modified_at)],
    )?;
    Ok(())
}

/// Hand the story's entry from the author who just wrote to the next one.
pub fn advance_index_entry(conn: &Connection, story: &Story, previous_author: &str) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM author_index WHERE author = ?1 AND story_id = ?2",
        params![previous_author, story.id],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO author_index (author, story_id, created_at) VALUES (?1, ?2, ?3)",
        params![story.next_author, story.id, fmt_ts(&story.modified_at)],
    )?;
    Ok(())
}

/// Drop every entry for a story that just completed. Returns how many were removed.
pub fn remove_index_entries(conn: &Connection, story_id: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM author_index WHERE story_id = ?1", params![story_id])
}

/// Stories waiting on `author`, oldest activity first.
pub fn find_pending_stories_for(conn: &Connection, author: &str) -> StoryResult<Vec<PendingStory>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.next_author, s.next_part_id, s.modified_at
         FROM author_index ai
         JOIN stories s ON s.id = ai.story_id
         WHERE ai.author = ?1 AND s.next_author = ?1 AND s.complete = 0 AND s.next_part_id IS NOT NULL
         ORDER BY s.modified_at ASC, s.id ASC",
    )?;
    let rows = stmt.query_map(params![author], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;
    let mut pending = Vec::new();
    for row in rows {
        let (story_id, author, next_part_id, modified_at) = row?;
        pending.push(PendingStory {
            story_id,
            author,
            next_part_id,
            modified_at: parse_ts(&modified_at)?,
        });
    }
    Ok(pending)
}

/// The author's current story: the one that has waited longest on them.
pub fn current_story_for(conn: &Connection, author: &str) -> StoryResult<Option<PendingStory>> {
    Ok(find_pending_stories_for(conn, author)?.into_iter().next())
}

/// Authors holding an entry for `story_id`.
pub fn entries_for_story(conn: &Connection, story_id: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT author FROM author_index WHERE story_id = ?1 ORDER BY author")?;
    let rows = stmt.query_map(params![story_id], |row| row.get(0))?;
    rows.collect()
}

/// Regenerate the whole index from story rows. Returns the number of entries written.
pub fn rebuild_index(conn: &Connection) -> StoryResult<usize> {
    let tx = store::begin_immediate(conn)?;
    tx.execute("DELETE FROM author_index", [])?;
    let written = tx.execute(
        "INSERT INTO author_index (author, story_id, created_at)
         SELECT next_author, id, modified_at FROM stories WHERE complete = 0",
        [],
    )?;
    tx.commit()?;
    info!(entries = written, "rebuilt author index");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoryDb, insert_story_row, now};
    use anyhow::Result;
    use chrono::Duration;

    fn story(id: &str, next_author: &str) -> Story {
        let mut story = Story::new(
            "creator@example.com",
            vec!["alice@example.com".into(), "bob@example.com".into()],
            10,
            format!("{}-part", id),
            now(),
        );
        story.id = id.into();
        story.next_author = next_author.into();
        story
    }

    fn insert(db: &StoryDb, story: &Story) -> Result<()> {
        insert_story_row(db.conn(), story)?;
        create_index_entries(db.conn(), story)?;
        Ok(())
    }

    #[test]
    fn test_pending_lists_oldest_first() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        let mut newer = story("bbb", "alice@example.com");
        newer.modified_at = now() + Duration::seconds(5);
        insert(&db, &newer)?;
        insert(&db, &story("aaa", "alice@example.com"))?;
        insert(&db, &story("ccc", "bob@example.com"))?;

        let pending = find_pending_stories_for(db.conn(), "alice@example.com")?;
        let ids: Vec<&str> = pending.iter().map(|p| p.story_id.as_str()).collect();
        assert_eq!(ids, vec!["aaa", "bbb"]);
        assert_eq!(pending[0].next_part_id, "aaa-part");

        let current = current_story_for(db.conn(), "bob@example.com")?.expect("bob has one");
        assert_eq!(current.story_id, "ccc");
        assert!(current_story_for(db.conn(), "nobody@example.com")?.is_none());
        Ok(())
    }

    #[test]
    fn test_advance_moves_entry() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        let mut s = story("aaa", "alice@example.com");
        insert(&db, &s)?;

        s.next_author = "bob@example.com".into();
        db.conn().execute(
            "UPDATE stories SET next_author = ?1 WHERE id = ?2",
            params![s.next_author, s.id],
        )?;
        advance_index_entry(db.conn(), &s, "alice@example.com")?;

        assert_eq!(entries_for_story(db.conn(), "aaa")?, vec!["bob@example.com".to_string()]);
        assert!(find_pending_stories_for(db.conn(), "alice@example.com")?.is_empty());
        assert_eq!(find_pending_stories_for(db.conn(), "bob@example.com")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_single_author_advance_keeps_entry() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        let mut s = story("aaa", "alice@example.com");
        s.authors = vec!["alice@example.com".into()];
        insert(&db, &s)?;
        advance_index_entry(db.conn(), &s, "alice@example.com")?;
        assert_eq!(entries_for_story(db.conn(), "aaa")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_remove_clears_story_entries() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        insert(&db, &story("aaa", "alice@example.com"))?;
        assert_eq!(remove_index_entries(db.conn(), "aaa")?, 1);
        assert!(entries_for_story(db.conn(), "aaa")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_stale_entry_is_ignored_by_reads() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        insert(&db, &story("aaa", "alice@example.com"))?;
        // Story moved on without the index following.
        db.conn().execute(
            "UPDATE stories SET next_author = 'bob@example.com' WHERE id = 'aaa'",
            [],
        )?;
        assert!(find_pending_stories_for(db.conn(), "alice@example.com")?.is_empty());

        assert_eq!(rebuild_index(db.conn())?, 1);
        assert_eq!(entries_for_story(db.conn(), "aaa")?, vec!["bob@example.com".to_string()]);
        assert_eq!(find_pending_stories_for(db.conn(), "bob@example.com")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_complete_story_gets_no_entry() -> Result<()> {
        let db = StoryDb::new_in_memory()?;
        let mut s = story("aaa", "alice@example.com");
        s.complete = true;
        s.next_part_id = None;
        insert(&db, &s)?;
        assert!(entries_for_story(db.conn(), "aaa")?.is_empty());
        assert_eq!(rebuild_index(db.conn())?, 0);
        Ok(())
    }
}
