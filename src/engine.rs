//! Story progression: append one contribution, rotate authorship, close the
//! story once it reaches its word target.
//!
//! The story's `next_part_id` is the optimistic-concurrency token. The
//! append re-reads the story inside an IMMEDIATE transaction, rejects a
//! token that is no longer current, and writes back with a compare on the
//! same token, so of two submissions against one token exactly one commits.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use storytime_common::{Story, StoryPart, find_next_author, sanitize_with_cap};
use tracing::{error, info, warn};

use crate::errors::{StoryError, StoryResult};
use crate::index;
use crate::keys::KeySource;
use crate::store;

/// Result of a committed append.
#[derive(Debug, Clone, Serialize)]
pub struct AppendOutcome {
    /// The story as committed, including the new part.
    pub story: Story,
    pub part: StoryPart,
    /// True if this append completed the story.
    pub completed: bool,
}

pub struct Progression<'a> {
    keys: &'a dyn KeySource,
    part_len: usize,
    max_visible_words: usize,
}

impl<'a> Progression<'a> {
    pub fn new(keys: &'a dyn KeySource, part_len: usize, max_visible_words: usize) -> Self {
        Self {
            keys,
            part_len,
            max_visible_words,
        }
    }

    /// A part token that no part of `story` uses and that differs from the
    /// token being consumed.
    pub fn fresh_part_id(&self, story: &Story, consumed: &str) -> String {
        loop {
            let candidate = self.keys.random_string(self.part_len);
            if candidate != consumed && !story.parts.iter().any(|p| p.id == candidate) {
                return candidate;
            }
        }
    }

    pub fn append_contribution(
        &self,
        conn: &Connection,
        story_id: &str,
        submitted_part_id: &str,
        raw_text: &str,
        now: DateTime<Utc>,
    ) -> StoryResult<AppendOutcome> {
        let tx = store::begin_immediate(conn)?;

        let mut story = store::read_story(&tx, story_id)?.ok_or_else(|| StoryError::NotFound {
            story_id: story_id.to_string(),
        })?;

        if story.next_part_id.as_deref() != Some(submitted_part_id) {
            warn!(story_id, submitted_part_id, complete = story.complete, "stale part submission");
            return Err(StoryError::ConcurrencyConflict {
                story_id: story_id.to_string(),
                submitted: submitted_part_id.to_string(),
            });
        }

        let text = sanitize_with_cap(raw_text, self.max_visible_words)?;

        let author = story.next_author.clone();
        let following = find_next_author(&story.authors, &author)
            .map_err(|e| {
                error!(story_id, author = %author, "next author missing from rotation");
                StoryError::from(e)
            })?
            .to_string();

        let part = StoryPart {
            id: submitted_part_id.to_string(),
            story_id: story.id.clone(),
            author: author.clone(),
            written_at: now,
            hidden: text.hidden,
            visible: text.visible,
        };
        story.parts.push(part.clone());
        story.modified_at = now.max(story.modified_at);

        let words = story.word_count();
        let completed = words >= story.target_words as usize;
        if completed {
            story.complete = true;
            story.finished_at = Some(story.modified_at);
            story.next_part_id = None;
            index::remove_index_entries(&tx, &story.id)?;
        } else {
            story.next_author = following;
            story.next_part_id = Some(self.fresh_part_id(&story, submitted_part_id));
            index::advance_index_entry(&tx, &story, &author)?;
        }

        store::insert_part_row(&tx, &part)?;
        if store::update_story_if_current(&tx, &story, submitted_part_id)? != 1 {
            // Unreachable while the IMMEDIATE lock is held, but never commit on a miss.
            warn!(story_id, submitted_part_id, "compare-and-commit missed");
            return Err(StoryError::ConcurrencyConflict {
                story_id: story_id.to_string(),
                submitted: submitted_part_id.to_string(),
            });
        }
        tx.commit()?;

        if completed {
            info!(story_id, words, target = story.target_words, "story complete");
        } else {
            info!(story_id, author = %author, next_author = %story.next_author, words, "part appended");
        }

        Ok(AppendOutcome {
            story,
            part,
            completed,
        })
    }
}
