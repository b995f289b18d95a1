//! Storage-independent domain types for Storytime.

pub mod models;
pub mod rotation;
pub mod sanitize;

pub use models::{PendingStory, ShortKeyed, Story, StoryPart, StoryState, UserInfo};
pub use rotation::{AuthorNotFound, find_next_author};
pub use sanitize::{MAX_VISIBLE_WORDS, SanitizeError, Sanitized, sanitize, sanitize_with_cap};
