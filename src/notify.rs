//! Turn notifications.
//!
//! Delivery is best effort: the story has already committed by the time a
//! notification is sent, and a failed send is only logged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use storytime_common::{Story, StoryPart};
use tracing::info;

use crate::fuzzy_time::{capitalize, fuzzy_time};

/// A message asking `recipient` to write the next part of a story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub sender: String,
    pub recipient: String,
    pub story_id: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, n: &Notification) -> anyhow::Result<()> {
        info!(to = %n.recipient, story_id = %n.story_id, subject = %n.subject, "notification");
        Ok(())
    }
}

/// Link an author follows to write their part.
pub fn continue_url(base_url: &str, story_id: &str, part_id: &str) -> String {
    format!("{}/story/{}/{}", base_url.trim_end_matches('/'), story_id, part_id)
}

/// Build the turn notification for an open story.
///
/// `author_of` renders the identity shown as the previous writer (or the
/// creator, before the first part). Returns `None` for a complete story.
pub fn compose(
    story: &Story,
    last_part: Option<&StoryPart>,
    author_of: &str,
    sender: &str,
    base_url: &str,
    now: DateTime<Utc>,
) -> Option<Notification> {
    let part_id = story.next_part_id.as_deref()?;
    if story.complete {
        return None;
    }
    let url = continue_url(base_url, &story.id, part_id);
    let (subject, body) = match last_part {
        Some(part) => (
            "Please write the next part of this story.",
            format!(
                "{}, {} wrote:\n> {}\n\nPlease visit {} to write the next part.",
                capitalize(&fuzzy_time(part.written_at, now)),
                author_of,
                part.visible,
                url
            ),
        ),
        None => (
            "Please write the first part of this story.",
            format!(
                "{}, {} initiated a new story.\n\nPlease visit {} to write the beginning.",
                capitalize(&fuzzy_time(story.created_at, now)),
                author_of,
                url
            ),
        ),
    };
    Some(Notification {
        sender: sender.to_string(),
        recipient: story.next_author.clone(),
        story_id: story.id.clone(),
        subject: subject.to_string(),
        body,
    })
}
