use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An entity whose public identifier is assigned after the rest of its
/// payload has been built.
///
/// The short-key allocator tries several candidate keys for the same entity,
/// so it needs to rewrite the id between attempts.
pub trait ShortKeyed {
    fn assign_id(&mut self, id: &str);
    fn id(&self) -> &str;
}

/// Whether a story still accepts contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryState {
    InProgress,
    Complete,
}

impl StoryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }
}

/// A collaborative story and its progression metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    /// Public short identifier. Empty until the allocator claims one.
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Identity that started the story.
    pub creator: String,
    /// Fixed, ordered author rotation.
    pub authors: Vec<String>,
    pub next_author: String,
    /// Token required to submit the next part. `None` once complete.
    pub next_part_id: Option<String>,
    pub modified_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub complete: bool,
    /// Once the parts reach this many words, the story is closed.
    pub target_words: u32,
    pub parts: Vec<StoryPart>,
}

impl Story {
    /// Build a fresh, unkeyed story. The first author in the list writes first.
    pub fn new(
        creator: &str,
        authors: Vec<String>,
        target_words: u32,
        first_part_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        let next_author = authors.first().cloned().unwrap_or_default();
        Self {
            id: String::new(),
            created_at: now,
            creator: creator.to_string(),
            authors,
            next_author,
            next_part_id: Some(first_part_id),
            modified_at: now,
            finished_at: None,
            complete: false,
            target_words,
            parts: Vec::new(),
        }
    }

    pub fn state(&self) -> StoryState {
        if self.complete {
            StoryState::Complete
        } else {
            StoryState::InProgress
        }
    }

    /// Total words across every part, hidden and visible.
    pub fn word_count(&self) -> usize {
        self.parts.iter().map(StoryPart::word_count).sum()
    }

    pub fn last_part(&self) -> Option<&StoryPart> {
        self.parts.last()
    }

    pub fn is_author(&self, identity: &str) -> bool {
        self.authors.iter().any(|a| a == identity)
    }

    /// The full text of the story, parts joined in order.
    pub fn full_text(&self) -> String {
        self.parts
            .iter()
            .map(StoryPart::text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl ShortKeyed for Story {
    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// One author's contribution to a story.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryPart {
    /// Equal to the `next_part_id` this part was submitted against.
    pub id: String,
    pub story_id: String,
    pub author: String,
    pub written_at: DateTime<Utc>,
    /// Text the next author does not get to see.
    pub hidden: String,
    /// Text shown to the next author.
    pub visible: String,
}

impl StoryPart {
    pub fn word_count(&self) -> usize {
        self.hidden.split_whitespace().count() + self.visible.split_whitespace().count()
    }

    pub fn text(&self) -> String {
        match (self.hidden.is_empty(), self.visible.is_empty()) {
            (true, _) => self.visible.clone(),
            (false, true) => self.hidden.clone(),
            (false, false) => format!("{} {}", self.hidden, self.visible),
        }
    }
}

impl ShortKeyed for StoryPart {
    fn assign_id(&mut self, id: &str) {
        self.id = id.to_string();
    }

    fn id(&self) -> &str {
        &self.id
    }
}

/// Summary of a story waiting on a particular author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingStory {
    pub story_id: String,
    pub author: String,
    pub next_part_id: String,
    pub modified_at: DateTime<Utc>,
}

/// Cached display name for an email identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(hidden: &str, visible: &str) -> StoryPart {
        StoryPart {
            id: "p".into(),
            story_id: "s".into(),
            author: "a@example.com".into(),
            written_at: Utc::now(),
            hidden: hidden.into(),
            visible: visible.into(),
        }
    }

    #[test]
    fn test_new_story_starts_with_first_author() {
        let story = Story::new(
            "c@example.com",
            vec!["a@example.com".into(), "b@example.com".into()],
            10,
            "token".into(),
            Utc::now(),
        );
        assert_eq!(story.next_author, "a@example.com");
        assert_eq!(story.next_part_id.as_deref(), Some("token"));
        assert_eq!(story.state(), StoryState::InProgress);
        assert_eq!(story.modified_at, story.created_at);
        assert!(story.id.is_empty());
    }

    #[test]
    fn test_word_count_sums_hidden_and_visible() {
        let mut story = Story::new("c", vec!["a".into()], 10, "t".into(), Utc::now());
        story.parts.push(part("one two", "three"));
        story.parts.push(part("", "four five six"));
        assert_eq!(story.word_count(), 6);
        assert_eq!(story.full_text(), "one two three four five six");
    }

    #[test]
    fn test_assign_id_rewrites_identifier() {
        let mut story = Story::new("c", vec!["a".into()], 10, "t".into(), Utc::now());
        story.assign_id("abc");
        assert_eq!(ShortKeyed::id(&story), "abc");
        story.assign_id("abcd");
        assert_eq!(ShortKeyed::id(&story), "abcd");
    }

    #[test]
    fn test_story_state_serializes_snake_case() {
        let json = serde_json::to_string(&StoryState::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!(StoryState::Complete.as_str(), "complete");
    }
}
