//! Transactional short-key allocation.
//!
//! One random string is drawn per allocation. Its prefixes are tried from
//! the minimum length upward; each attempt checks for an existing record and
//! writes the new one inside a single IMMEDIATE transaction, so two
//! allocators can never both claim the same key. Short keys keep URLs compact
//! and collisions become exponentially rarer as the prefix grows.

use rusqlite::{Connection, ErrorCode};
use storytime_common::{ShortKeyed, Story, StoryPart};
use tracing::{debug, info};

use crate::errors::{StoryError, StoryResult};
use crate::index;
use crate::keys::KeySource;
use crate::store;

/// A record that can be written under an allocator-chosen key.
///
/// `scope` is the parent key for records whose ids are only unique within
/// their parent, or `None` for globally keyed records.
pub trait KeyedRecord: ShortKeyed {
    const KIND: &'static str;

    fn exists(conn: &Connection, scope: Option<&str>, key: &str) -> rusqlite::Result<bool>;

    /// Write the record (and anything that must commit with it) under its
    /// current id.
    fn insert(&self, conn: &Connection, scope: Option<&str>) -> rusqlite::Result<()>;
}

impl KeyedRecord for Story {
    const KIND: &'static str = "story";

    fn exists(conn: &Connection, _scope: Option<&str>, key: &str) -> rusqlite::Result<bool> {
        store::story_exists(conn, key)
    }

    fn insert(&self, conn: &Connection, _scope: Option<&str>) -> rusqlite::Result<()> {
        store::insert_story_row(conn, self)?;
        index::create_index_entries(conn, self)
    }
}

/// Part ids scoped to their story. Stories in progress never come through
/// here: the token for the next part is minted by
/// [`Progression::fresh_part_id`](crate::engine::Progression::fresh_part_id)
/// before the part exists, and the part is written under that token. This
/// impl covers writing a part under a freshly allocated id, e.g. when
/// importing parts that carry no token of their own.
impl KeyedRecord for StoryPart {
    const KIND: &'static str = "part";

    fn exists(conn: &Connection, scope: Option<&str>, key: &str) -> rusqlite::Result<bool> {
        match scope {
            Some(story_id) => store::part_exists(conn, story_id, key),
            None => Ok(false),
        }
    }

    fn insert(&self, conn: &Connection, _scope: Option<&str>) -> rusqlite::Result<()> {
        store::insert_part_row(conn, self)
    }
}

pub struct ShortKeyAllocator<'a> {
    keys: &'a dyn KeySource,
    random_len: usize,
}

impl<'a> ShortKeyAllocator<'a> {
    pub fn new(keys: &'a dyn KeySource, random_len: usize) -> Self {
        Self { keys, random_len }
    }

    /// Claim the shortest free prefix (of at least `min_len` characters) of a
    /// fresh random string for `record`, and commit the record under it.
    ///
    /// On success the record's id has been assigned and the key is returned.
    /// `AllocationExhausted` is permanent; don't loop on it.
    pub fn put_short_key<R: KeyedRecord>(
        &self,
        conn: &Connection,
        record: &mut R,
        scope: Option<&str>,
        min_len: usize,
    ) -> StoryResult<String> {
        if min_len == 0 || min_len > self.random_len {
            return Err(StoryError::Validation(format!(
                "Minimum {} key length {} is outside 1..={}",
                R::KIND,
                min_len,
                self.random_len
            )));
        }

        let s = self.keys.random_string(self.random_len);
        let mut attempts = 0;
        let mut last_cause = String::from("no candidate tried");

        for len in min_len..=s.len() {
            attempts += 1;
            let candidate = &s[..len];
            record.assign_id(candidate);

            let tx = store::begin_immediate(conn)?;
            if R::exists(&tx, scope, candidate)? {
                debug!(kind = R::KIND, key = candidate, "key taken, trying longer prefix");
                last_cause = format!("key '{}' already exists", candidate);
                continue;
            }
            match record.insert(&tx, scope) {
                Ok(()) => {}
                Err(e) if is_constraint_violation(&e) => {
                    debug!(kind = R::KIND, key = candidate, "insert collided, trying longer prefix");
                    last_cause = e.to_string();
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            tx.commit()?;

            info!(kind = R::KIND, key = candidate, attempts, "allocated short key");
            return Ok(candidate.to_string());
        }

        Err(StoryError::AllocationExhausted {
            kind: R::KIND,
            attempts,
            last_cause,
        })
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}
