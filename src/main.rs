use anyhow::{Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use storytime::config::{CONFIG_FILE, StorytimeConfig};
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "storytime")]
#[command(version, about = "Round-robin collaborative story writing")]
pub struct Cli {
    /// Path to storytime.toml (defaults to ./storytime.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path. Overrides the config file and STORYTIME_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, value_enum, default_value = "text", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
        /// Allow cross-origin requests from any origin
        #[arg(long)]
        cors: bool,
    },
    /// Write a default storytime.toml and create the database
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Start a new story
    New {
        /// Identity of whoever starts the story
        #[arg(long, env = "STORYTIME_USER")]
        creator: String,
        /// Authors in writing order, e.g. "Alice <a@example.com>, b@example.com"
        #[arg(long)]
        authors: String,
        /// Word count at which the story is finished
        #[arg(long)]
        words: u32,
    },
    /// Append the next part of a story (reads stdin if TEXT is omitted)
    Append {
        story_id: String,
        part_id: String,
        text: Option<String>,
    },
    /// Show a story as the given author sees it
    Show {
        story_id: String,
        #[arg(long = "as", env = "STORYTIME_USER")]
        viewer: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List stories waiting on an author, current one first
    Pending {
        #[arg(long, env = "STORYTIME_USER")]
        author: String,
    },
    /// List the most recently completed stories
    Completed,
    /// Delete every story, part, index entry and cached name
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Recompute the author index from the stories
    RebuildIndex,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "storytime=debug,tower_http=debug"
    } else {
        "storytime=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(config_path: Option<&Path>, db_path: Option<PathBuf>) -> Result<StorytimeConfig> {
    let mut config = StorytimeConfig::resolve(config_path)?;
    if let Some(db_path) = db_path {
        config.storage.db_path = db_path;
    }
    let problems = config.validate();
    if !problems.is_empty() {
        bail!("Invalid configuration:\n  {}", problems.join("\n  "));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let Cli {
        config: config_path,
        db_path,
        command,
        ..
    } = cli;

    if let Commands::Init { force } = command {
        let path = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
        let mut config = StorytimeConfig::default();
        if let Some(db_path) = db_path {
            config.storage.db_path = db_path;
        }
        return cmd::cmd_init(&config, &path, force);
    }

    let config = load_config(config_path.as_deref(), db_path)?;
    match command {
        Commands::Serve { host, port, cors } => cmd::cmd_serve(config, host, port, cors).await?,
        Commands::Init { .. } => {}
        Commands::New {
            creator,
            authors,
            words,
        } => cmd::cmd_new(&config, &creator, &authors, words).await?,
        Commands::Append {
            story_id,
            part_id,
            text,
        } => cmd::cmd_append(&config, &story_id, &part_id, text).await?,
        Commands::Show {
            story_id,
            viewer,
            json,
        } => cmd::cmd_show(&config, &story_id, viewer.as_deref(), json).await?,
        Commands::Pending { author } => cmd::cmd_pending(&config, &author).await?,
        Commands::Completed => cmd::cmd_completed(&config).await?,
        Commands::Clear { yes } => cmd::cmd_clear(&config, yes).await?,
        Commands::RebuildIndex => cmd::cmd_rebuild_index(&config).await?,
    }

    Ok(())
}
