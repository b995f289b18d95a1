//! Story commands: `storytime new|append|show|pending|completed`.

use std::io::Read;

use anyhow::{Context, Result};
use storytime::config::StorytimeConfig;
use storytime::fuzzy_time::fuzzy_time;
use storytime::service::StoryView;
use storytime::store;

use super::open_service;

pub async fn cmd_new(config: &StorytimeConfig, creator: &str, authors: &str, words: u32) -> Result<()> {
    let story = open_service(config)?.create_story(creator, authors, words).await?;
    println!("Created story {}", story.id);
    println!("  authors: {}", story.authors.join(", "));
    println!("  next author: {}", story.next_author);
    if let Some(part) = &story.next_part_id {
        println!("  part: {}", part);
    }
    Ok(())
}

/// Append `text`, or stdin when no text is given.
pub async fn cmd_append(config: &StorytimeConfig, story_id: &str, part_id: &str, text: Option<String>) -> Result<()> {
    let text = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read contribution from stdin")?;
            buf
        }
    };
    let out = open_service(config)?
        .append_contribution(story_id, part_id, &text)
        .await?;
    if out.completed {
        println!("Story {} is complete ({} words)", out.story.id, out.story.word_count());
    } else {
        println!("Appended part {} to story {}", out.part.id, out.story.id);
        println!("  next author: {}", out.story.next_author);
        if let Some(part) = &out.story.next_part_id {
            println!("  part: {}", part);
        }
    }
    Ok(())
}

pub async fn cmd_show(config: &StorytimeConfig, story_id: &str, viewer: Option<&str>, json: bool) -> Result<()> {
    let view = open_service(config)?.view_story(story_id, viewer).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    match view {
        StoryView::Complete { story_id, authors, text, words } => {
            println!("Story {} by {} ({} words)", story_id, authors.join(", "), words);
            println!();
            println!("{}", text);
        }
        StoryView::YourTurn { story_id, part_id, previous, words, target_words } => {
            println!("Your turn on story {} ({} of {} words)", story_id, words, target_words);
            println!("  part: {}", part_id);
            match previous {
                Some(text) => println!("  previously: {}", text),
                None => println!("  you are writing the beginning"),
            }
        }
        StoryView::Waiting { story_id, next_author, parts } => {
            println!("Story {} is waiting on {} ({} parts so far)", story_id, next_author, parts);
        }
    }
    Ok(())
}

pub async fn cmd_pending(config: &StorytimeConfig, author: &str) -> Result<()> {
    let pending = open_service(config)?.pending_for(author).await?;
    if pending.is_empty() {
        println!("No stories waiting on {}", author);
        return Ok(());
    }
    let now = store::now();
    for (i, p) in pending.iter().enumerate() {
        let marker = if i == 0 { "*" } else { " " };
        println!(
            "{} {}  part {}  (last activity {})",
            marker,
            p.story_id,
            p.next_part_id,
            fuzzy_time(p.modified_at, now)
        );
    }
    Ok(())
}

pub async fn cmd_completed(config: &StorytimeConfig) -> Result<()> {
    let stories = open_service(config)?.completed_stories().await?;
    if stories.is_empty() {
        println!("No completed stories yet");
        return Ok(());
    }
    let now = store::now();
    for story in stories {
        let finished = story
            .finished_at
            .map(|t| fuzzy_time(t, now))
            .unwrap_or_else(|| "at an unknown time".to_string());
        println!("{}  {} words, finished {}", story.id, story.word_count(), finished);
    }
    Ok(())
}
