//! Reelsmith CLI: turn forum stories into narrated, subtitled vertical videos.
//!
//! Usage:
//!   reelsmith single --id <ID>         Render one item by id
//!   reelsmith single --category <NAME> Render the first usable item in a category
//!   reelsmith batch [OPTIONS]          Render up to N items
//!   reelsmith test-connection          Check the content source
//!   reelsmith rewrite-only --id <ID>   Rewrite one item and stop
//!   reelsmith list-categories          Show configured categories
//!   reelsmith list-voices              Show voices offered by the speech engine
//!   reelsmith check                    Check external tools
//!   reelsmith init                     Write the default config file

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgGroup, Parser, Subcommand};

use reelsmith_common::config::AppConfig;
use reelsmith_content_source::{SortMode, TimeFilter};

mod commands;

#[derive(Parser)]
#[command(
    name = "reelsmith",
    about = "Turn forum stories into narrated, subtitled vertical videos",
    version,
    author
)]
struct Cli {
    /// Config file (defaults to $XDG_CONFIG_HOME/reelsmith/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override pipeline.output_dir
    #[arg(short, long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a single item
    #[command(group(ArgGroup::new("target").required(true).args(["id", "category"])))]
    Single {
        /// Item id at the source
        #[arg(long)]
        id: Option<String>,

        /// Category to take the first usable item from
        #[arg(long)]
        category: Option<String>,
    },

    /// Render a batch of items
    Batch {
        /// Items to render (defaults to pipeline.batch_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Category to fetch from; repeat to try several in order
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Listing sort: hot|new|top|rising|controversial
        #[arg(long)]
        sort: Option<SortMode>,

        /// Time filter for top/controversial: hour|day|week|month|year|all
        #[arg(long = "time")]
        time_filter: Option<TimeFilter>,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Check that the content source is reachable
    TestConnection,

    /// Fetch and rewrite one item without rendering
    RewriteOnly {
        /// Item id at the source
        #[arg(long)]
        id: String,

        /// Also copy the script here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List configured categories
    ListCategories,

    /// List voices offered by the configured speech engine
    ListVoices,

    /// Check external tools
    Check,

    /// Write the default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load(),
    };
    if let Some(dir) = &cli.output_dir {
        config.pipeline.output_dir = dir.clone();
    }
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        reelsmith_common::logging::init_default_logging();
        commands::init::run(cli.config.clone(), force)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    reelsmith_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Single { id, category } => commands::single::run(config, id, category).await,
        Commands::Batch {
            limit,
            categories,
            sort,
            time_filter,
            timeout_secs,
        } => {
            commands::batch::run(config, limit, categories, sort, time_filter, timeout_secs).await
        }
        Commands::TestConnection => commands::test_connection::run(config).await,
        Commands::RewriteOnly { id, output } => {
            commands::rewrite_only::run(config, id, output).await
        }
        Commands::ListCategories => commands::list_categories::run(&config),
        Commands::ListVoices => commands::list_voices::run(&config).await,
        Commands::Check => commands::check::run(&config),
        Commands::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}
