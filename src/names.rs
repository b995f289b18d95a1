//! Email → display name cache.
//!
//! Names live in the `user_info` table, fronted by an in-process map of the
//! names found there. Misses are not cached, so a name written by another
//! process sharing the database shows up on the next lookup. Writes happen
//! once, at story creation, after the story has committed; a failed write is
//! logged and dropped.

use dashmap::DashMap;
use rusqlite::{Connection, OptionalExtension, params};
use storytime_common::UserInfo;
use tracing::debug;

use crate::errors::StoryResult;

#[derive(Default)]
pub struct NameCache {
    cache: DashMap<String, String>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored name for `email`, if any.
    pub fn lookup(&self, conn: &Connection, email: &str) -> StoryResult<Option<String>> {
        if let Some(hit) = self.cache.get(email) {
            return Ok(Some(hit.value().clone()));
        }
        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM user_info WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        let name = name.filter(|n| !n.is_empty());
        if let Some(name) = &name {
            self.cache.insert(email.to_string(), name.clone());
        }
        Ok(name)
    }

    /// Display name for `email`, falling back to the address itself.
    pub fn name_for(&self, conn: &Connection, email: &str) -> StoryResult<String> {
        Ok(self.lookup(conn, email)?.unwrap_or_else(|| email.to_string()))
    }

    /// `Name <email>` if a name is known, else the bare address.
    pub fn full_address(&self, conn: &Connection, email: &str) -> StoryResult<String> {
        Ok(match self.lookup(conn, email)? {
            Some(name) => format!("{} <{}>", name, email),
            None => email.to_string(),
        })
    }

    /// Store a name unless one is already set. Returns whether it was stored.
    pub fn put_name_if_absent(&self, conn: &Connection, info: &UserInfo) -> StoryResult<bool> {
        if self.lookup(conn, &info.email)?.is_some() {
            return Ok(false);
        }
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO user_info (email, name) VALUES (?1, ?2)",
            params![info.email, info.name],
        )?;
        if inserted == 1 {
            debug!(email = %info.email, "cached display name");
            self.cache.insert(info.email.clone(), info.name.clone());
        }
        Ok(inserted == 1)
    }

    /// Forget everything cached in process (after an administrative clear).
    pub fn invalidate(&self) {
        self.cache.clear();
    }
}
