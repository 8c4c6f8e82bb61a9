use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use estuary::app::AppContext;
use estuary::cli::{commands, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::from_env()?;

    match cli.command {
        Commands::Add {
            url,
            name,
            category,
        } => {
            commands::add_feed(&ctx, &url, name.as_deref(), category.as_deref()).await?;
        }
        Commands::Remove { url } => {
            commands::remove_feed(&ctx, &url)?;
        }
        Commands::List => {
            commands::list_feeds(&ctx)?;
        }
        Commands::Refresh { feed } => {
            commands::refresh(&ctx, feed).await?;
        }
        Commands::Summarize { id } => {
            commands::summarize(&ctx, id).await?;
        }
        Commands::Search { query, limit } => {
            commands::search(&ctx, &query, limit)?;
        }
        Commands::Save { url } => {
            commands::save_url(&ctx, &url).await?;
        }
        Commands::Serve => {
            let scheduler = ctx.scheduler.clone();
            let poller = ctx.gmail_poller.clone();
            let refresh_task = tokio::spawn(scheduler.clone().run());
            let gmail_task = tokio::spawn(poller.clone().run());

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutting down");
            scheduler.stop();
            poller.stop();
            ctx.fetcher.stop().await;
            refresh_task.abort();
            gmail_task.abort();
        }
        Commands::Cleanup => {
            commands::cleanup(&ctx)?;
        }
    }

    Ok(())
}
