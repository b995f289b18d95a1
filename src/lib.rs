pub mod allocator;
pub mod authors;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fuzzy_time;
pub mod index;
pub mod keys;
pub mod names;
pub mod notify;
pub mod service;
pub mod store;
pub mod web;

pub use errors::{StoryError, StoryResult};
pub use service::{StoryService, StoryView};
