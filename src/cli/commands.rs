use crate::app::{AppContext, EstuaryError, Result};

pub async fn add_feed(
    ctx: &AppContext,
    url: &str,
    name: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    if ctx.store.get_feed_by_url(url)?.is_some() {
        println!("Feed already exists: {}", url);
        return Ok(());
    }

    let parsed = ctx.feed_parser.fetch(url).await?;
    let display_name = name.unwrap_or(&parsed.title);
    let feed_id = ctx.store.add_feed(url, display_name, category)?;
    println!("Added feed: {} ({})", display_name, url);

    let matches = ctx.scheduler.ingest_feed_items(feed_id, &parsed).await?;
    ctx.store.update_feed_fetched(feed_id, None)?;
    println!("Fetched {} items", parsed.items.len());
    if !matches.is_empty() {
        println!("{} notification match(es)", matches.len());
    }
    Ok(())
}

pub fn remove_feed(ctx: &AppContext, url: &str) -> Result<()> {
    let feed = ctx
        .store
        .get_feed_by_url(url)?
        .ok_or_else(|| EstuaryError::NotFound(format!("Feed {}", url)))?;
    ctx.store.delete_feed(feed.id)?;
    println!("Removed feed: {}", url);
    Ok(())
}

pub fn list_feeds(ctx: &AppContext) -> Result<()> {
    let feeds = ctx.store.list_feeds(None)?;
    if feeds.is_empty() {
        println!("No feeds");
        return Ok(());
    }
    for feed in feeds {
        let kind = if feed.is_standalone() {
            " [library]"
        } else if feed.is_newsletter() {
            " [newsletter]"
        } else {
            ""
        };
        let error = feed
            .fetch_error
            .as_deref()
            .map(|e| format!("  !! {}", e))
            .unwrap_or_default();
        println!(
            "{:>5}  {} ({} unread){}{}",
            feed.id,
            feed.display_name(),
            feed.unread_count,
            kind,
            error
        );
    }
    Ok(())
}

pub async fn refresh(ctx: &AppContext, feed_id: Option<i64>) -> Result<()> {
    match feed_id {
        Some(feed_id) => {
            let matches = ctx.scheduler.refresh_feed(feed_id).await?;
            println!("Refreshed feed {} ({} notification matches)", feed_id, matches.len());
        }
        None => {
            ctx.scheduler.refresh_all().await?;
            let matches = ctx.scheduler.take_notifications();
            println!("Refresh complete ({} notification matches)", matches.len());
        }
    }
    Ok(())
}

pub async fn summarize(ctx: &AppContext, article_id: i64) -> Result<()> {
    match ctx.scheduler.summarize_article(article_id, None).await? {
        Some(summary) => {
            println!("{}", summary.one_liner);
            println!();
            println!("{}", summary.full_summary);
            for point in &summary.key_points {
                println!("  - {}", point);
            }
        }
        None => println!("No summary produced (summarizer disabled or content unusable)"),
    }
    Ok(())
}

pub fn search(ctx: &AppContext, query: &str, limit: i64) -> Result<()> {
    let articles = ctx.store.search_articles(query, limit)?;
    if articles.is_empty() {
        println!("No matches");
        return Ok(());
    }
    for article in articles {
        println!("{:>5}  {}  ({})", article.id, article.display_title(), article.url);
    }
    Ok(())
}

pub async fn save_url(ctx: &AppContext, url: &str) -> Result<()> {
    match ctx.library.add_url(1, url).await? {
        Some(id) => println!("Saved to library as item {}", id),
        None => println!("Already in library"),
    }
    Ok(())
}

pub fn cleanup(ctx: &AppContext) -> Result<()> {
    let removed = ctx.cache.cleanup_expired();
    println!("Removed {} expired cache entries", removed);
    Ok(())
}
