//! CLI command implementations.
//!
//! | Module    | Commands handled                                              |
//! |-----------|---------------------------------------------------------------|
//! | `serve`   | `Serve`                                                       |
//! | `setup`   | `Init`                                                        |
//! | `stories` | `New`, `Append`, `Show`, `Pending`, `Completed`               |
//! | `admin`   | `Clear`, `RebuildIndex`                                       |

pub mod admin;
pub mod serve;
pub mod setup;
pub mod stories;

pub use admin::{cmd_clear, cmd_rebuild_index};
pub use serve::cmd_serve;
pub use setup::cmd_init;
pub use stories::{cmd_append, cmd_completed, cmd_new, cmd_pending, cmd_show};

use anyhow::{Context, Result};
use storytime::config::StorytimeConfig;
use storytime::service::StoryService;
use storytime::store::StoryDb;

/// Open the configured database, creating its directory if needed.
pub fn open_db(config: &StorytimeConfig) -> Result<StoryDb> {
    let path = &config.storage.db_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    StoryDb::new(path).with_context(|| format!("Failed to open database at {}", path.display()))
}

pub fn open_service(config: &StorytimeConfig) -> Result<StoryService> {
    Ok(StoryService::new(open_db(config)?, config.clone()))
}
