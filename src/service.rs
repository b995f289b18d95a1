//! Story operations as the outer surfaces see them.
//!
//! Each operation runs its store work as one closure on the blocking pool.
//! Name-cache writes and notifications run after the commit and never fail
//! the operation.

use std::sync::Arc;

use serde::Serialize;
use storytime_common::{PendingStory, Story, UserInfo};
use tracing::{info, warn};

use crate::allocator::ShortKeyAllocator;
use crate::authors::{normalize_address, parse_address_list};
use crate::config::StorytimeConfig;
use crate::engine::{AppendOutcome, Progression};
use crate::errors::{StoryError, StoryResult};
use crate::index;
use crate::keys::{KeySource, ThreadRngKeys};
use crate::names::NameCache;
use crate::notify::{self, LogNotifier, Notifier};
use crate::store::{self, ClearSummary, DbHandle, StoryDb};

/// How many finished stories the completed listing shows.
pub const COMPLETED_LIMIT: usize = 10;

/// What a given viewer may see of a story.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoryView {
    Complete {
        story_id: String,
        authors: Vec<String>,
        text: String,
        words: usize,
    },
    /// The viewer writes next and sees only the last visible text.
    YourTurn {
        story_id: String,
        part_id: String,
        previous: Option<String>,
        words: usize,
        target_words: u32,
    },
    Waiting {
        story_id: String,
        next_author: String,
        parts: usize,
    },
}

#[derive(Clone)]
pub struct StoryService {
    db: DbHandle,
    keys: Arc<dyn KeySource>,
    notifier: Arc<dyn Notifier>,
    names: Arc<NameCache>,
    config: Arc<StorytimeConfig>,
}

impl StoryService {
    pub fn new(db: StoryDb, config: StorytimeConfig) -> Self {
        Self::with_parts(db, config, Arc::new(ThreadRngKeys), Arc::new(LogNotifier))
    }

    pub fn with_parts(
        db: StoryDb,
        config: StorytimeConfig,
        keys: Arc<dyn KeySource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            db: DbHandle::new(db),
            keys,
            notifier,
            names: Arc::new(NameCache::new()),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &StorytimeConfig {
        &self.config
    }

    /// Start a story for `authors` (a free-form address list). The first
    /// listed author writes first.
    pub async fn create_story(&self, creator: &str, authors: &str, target_words: u32) -> StoryResult<Story> {
        let creator = normalize_address(creator);
        if creator.is_empty() {
            return Err(StoryError::Validation("A creator is required".to_string()));
        }
        let max = self.config.stories.max_target_words;
        if target_words == 0 || target_words > max {
            return Err(StoryError::Validation(format!(
                "Target word count must be between 1 and {}",
                max
            )));
        }
        let mailboxes = parse_address_list(authors)?;
        let addresses: Vec<String> = mailboxes.iter().map(|m| m.address.clone()).collect();

        let keys = self.keys.clone();
        let cfg = self.config.clone();
        let story = self
            .db
            .call(move |db| {
                let first_part = keys.random_string(cfg.keys.part_len);
                let mut story = Story::new(&creator, addresses, target_words, first_part, store::now());
                ShortKeyAllocator::new(keys.as_ref(), cfg.keys.random_len).put_short_key(
                    db.conn(),
                    &mut story,
                    None,
                    cfg.keys.story_min_len,
                )?;
                Ok(story)
            })
            .await?;
        info!(story_id = %story.id, authors = story.authors.len(), target = target_words, "story created");

        for mailbox in mailboxes {
            let Some(name) = mailbox.name else { continue };
            let info = UserInfo {
                email: mailbox.address,
                name,
            };
            let names = self.names.clone();
            if let Err(e) = self.db.call(move |db| names.put_name_if_absent(db.conn(), &info)).await {
                warn!(error = %e, "failed to store display name");
            }
        }

        self.maybe_notify(&story).await;
        Ok(story)
    }

    /// Append `text` against the part token `part_id`.
    pub async fn append_contribution(&self, story_id: &str, part_id: &str, text: &str) -> StoryResult<AppendOutcome> {
        let keys = self.keys.clone();
        let cfg = self.config.clone();
        let (story_id, part_id, text) = (story_id.to_string(), part_id.to_string(), text.to_string());
        let outcome = self
            .db
            .call(move |db| {
                Progression::new(keys.as_ref(), cfg.keys.part_len, cfg.stories.max_visible_words)
                    .append_contribution(db.conn(), &story_id, &part_id, &text, store::now())
            })
            .await?;
        if !outcome.completed {
            self.maybe_notify(&outcome.story).await;
        }
        Ok(outcome)
    }

    /// Notify the next author, but only if this story is the one they
    /// should work on now; the rest reach them as earlier stories finish.
    /// An author with no indexed story is notified as well.
    async fn maybe_notify(&self, story: &Story) {
        if story.complete {
            return;
        }
        let names = self.names.clone();
        let cfg = self.config.clone();
        let snapshot = story.clone();
        let composed = self
            .db
            .call(move |db| {
                let current = index::current_story_for(db.conn(), &snapshot.next_author)?;
                if let Some(current) = current
                    && current.story_id != snapshot.id
                {
                    return Ok(None);
                }
                let last = snapshot.last_part();
                let writer = last.map(|p| p.author.as_str()).unwrap_or(snapshot.creator.as_str());
                let author_of = names.full_address(db.conn(), writer)?;
                Ok(notify::compose(
                    &snapshot,
                    last,
                    &author_of,
                    &cfg.notify.sender,
                    &cfg.notify.base_url,
                    store::now(),
                ))
            })
            .await;
        match composed {
            Ok(Some(message)) => {
                if let Err(e) = self.notifier.notify(&message).await {
                    warn!(story_id = %story.id, error = %e, "notification failed");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(story_id = %story.id, error = %e, "could not prepare notification"),
        }
    }

    /// The story as `viewer` may see it. Non-authors only see finished stories.
    pub async fn view_story(&self, story_id: &str, viewer: Option<&str>) -> StoryResult<StoryView> {
        let id = story_id.to_string();
        let story = self
            .db
            .call(move |db| db.get_story(&id))
            .await?
            .ok_or_else(|| StoryError::NotFound {
                story_id: story_id.to_string(),
            })?;

        if story.complete {
            return Ok(StoryView::Complete {
                words: story.word_count(),
                text: story.full_text(),
                authors: story.authors,
                story_id: story.id,
            });
        }
        let viewer = match viewer.map(normalize_address) {
            Some(v) if story.is_author(&v) => v,
            _ => {
                return Err(StoryError::NotFound {
                    story_id: story.id,
                });
            }
        };
        match story.next_part_id.clone() {
            Some(part_id) if story.next_author == viewer => Ok(StoryView::YourTurn {
                previous: story.last_part().map(|p| p.visible.clone()),
                words: story.word_count(),
                target_words: story.target_words,
                part_id,
                story_id: story.id,
            }),
            _ => Ok(StoryView::Waiting {
                parts: story.parts.len(),
                next_author: story.next_author,
                story_id: story.id,
            }),
        }
    }

    pub async fn pending_for(&self, author: &str) -> StoryResult<Vec<PendingStory>> {
        let author = normalize_address(author);
        self.db
            .call(move |db| index::find_pending_stories_for(db.conn(), &author))
            .await
    }

    pub async fn current_story(&self, author: &str) -> StoryResult<Option<PendingStory>> {
        let author = normalize_address(author);
        self.db
            .call(move |db| index::current_story_for(db.conn(), &author))
            .await
    }

    pub async fn completed_stories(&self) -> StoryResult<Vec<Story>> {
        self.db.call(|db| db.completed_stories(COMPLETED_LIMIT)).await
    }

    pub async fn rebuild_index(&self) -> StoryResult<usize> {
        self.db.call(|db| index::rebuild_index(db.conn())).await
    }

    pub async fn clear_all(&self) -> StoryResult<ClearSummary> {
        let summary = self.db.call(|db| db.clear_all()).await?;
        self.names.invalidate();
        Ok(summary)
    }

    pub async fn name_for(&self, email: &str) -> StoryResult<String> {
        let names = self.names.clone();
        let email = normalize_address(email);
        self.db.call(move |db| names.name_for(db.conn(), &email)).await
    }
}
