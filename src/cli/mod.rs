pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "estuary")]
#[command(about = "Personal news and reading ingestion platform", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a new feed
    Add {
        /// URL of the feed to add
        url: String,
        /// Display name (defaults to the feed's own title)
        #[arg(short, long)]
        name: Option<String>,
        /// Optional category
        #[arg(short, long)]
        category: Option<String>,
    },
    /// Remove a feed
    Remove {
        /// URL of the feed to remove
        url: String,
    },
    /// List feeds with unread counts
    List,
    /// Refresh all feeds (or one with --feed)
    Refresh {
        /// Refresh only this feed id
        #[arg(long)]
        feed: Option<i64>,
    },
    /// Summarize an article by id
    Summarize {
        /// Article id
        id: i64,
    },
    /// Full-text search over articles
    Search {
        /// FTS query
        query: String,
        /// Maximum results
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
    /// Add a URL to the library
    Save {
        /// URL to fetch and store
        url: String,
    },
    /// Run the refresh scheduler and Gmail poller in the foreground
    Serve,
    /// Sweep expired disk-cache entries
    Cleanup,
}
