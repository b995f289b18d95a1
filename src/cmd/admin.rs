//! Maintenance commands: `storytime clear`, `storytime rebuild-index`.

use anyhow::{Result, bail};
use storytime::config::StorytimeConfig;

use super::open_service;

pub async fn cmd_clear(config: &StorytimeConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to delete every story without --yes");
    }
    let summary = open_service(config)?.clear_all().await?;
    println!(
        "Deleted {} stories, {} parts, {} index entries, {} names",
        summary.stories, summary.parts, summary.index_entries, summary.user_info
    );
    Ok(())
}

pub async fn cmd_rebuild_index(config: &StorytimeConfig) -> Result<()> {
    let entries = open_service(config)?.rebuild_index().await?;
    println!("Rebuilt author index: {} entries", entries);
    Ok(())
}
