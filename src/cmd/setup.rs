//! Project setup command: `storytime init`.

use std::path::Path;

use anyhow::{Result, bail};
use storytime::config::StorytimeConfig;

use super::open_db;

/// Write a default config file (unless one exists) and create the database.
pub fn cmd_init(config: &StorytimeConfig, config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    config.save(config_path)?;
    println!("Wrote {}", config_path.display());

    let db = open_db(config)?;
    println!(
        "Database ready at {} ({} stories)",
        config.storage.db_path.display(),
        db.count_stories()?
    );
    Ok(())
}
