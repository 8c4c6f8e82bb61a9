//! Reddit decoder.
//!
//! Thread URLs are rewritten to old.reddit.com, whose markup exposes the
//! title link of link posts directly. Self-posts have no external link and
//! resolve to nothing, which is not an error.

use reqwest::Client;
use scraper::Html;
use tracing::warn;

use super::{Aggregator, ResolveOutcome};
use crate::extract::html;

const NEW_LAYOUT_SELECTORS: &[&str] = &[
    "a[data-click-id=\"body\"][href^=\"http\"]",
    ".Post a[href^=\"http\"]",
];

pub(super) async fn resolve(client: &Client, url: &str) -> ResolveOutcome {
    let reddit_url = url.replace("www.reddit.com", "old.reddit.com");

    let body = match fetch(client, &reddit_url).await {
        Ok(body) => body,
        Err(e) => {
            warn!("Reddit extraction failed: {}", e);
            return ResolveOutcome::missing(Some(Aggregator::Reddit), e);
        }
    };

    let doc = html::parse_document(&body);
    match external_link(&doc) {
        Some(href) => {
            let confidence = if is_old_layout_match(&doc) { 0.9 } else { 0.8 };
            ResolveOutcome::found(Aggregator::Reddit, href, confidence)
        }
        None => ResolveOutcome::missing(
            Some(Aggregator::Reddit),
            "No external link found (may be self-post)",
        ),
    }
}

async fn fetch(client: &Client, url: &str) -> std::result::Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    response.text().await.map_err(|e| e.to_string())
}

fn is_external(href: &str) -> bool {
    let lower = href.to_lowercase();
    !lower.contains("reddit.com") && !lower.contains("redd.it")
}

fn is_old_layout_match(doc: &Html) -> bool {
    html::first_attr(doc, "a.title[href^=\"http\"]", "href")
        .is_some_and(|href| is_external(&href))
}

fn external_link(doc: &Html) -> Option<String> {
    // Old-Reddit link posts carry the external URL on the title anchor.
    if let Some(href) = html::first_attr(doc, "a.title[href^=\"http\"]", "href") {
        if is_external(&href) {
            return Some(href);
        }
    }

    for css in NEW_LAYOUT_SELECTORS {
        if let Some(sel) = html::selector(css) {
            for link in doc.select(&sel) {
                if let Some(href) = link.value().attr("href") {
                    if is_external(href) {
                        return Some(href.to_string());
                    }
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_layout_title_link() {
        let page = r#"<html><body>
            <a class="title" href="https://publisher.example/story">Story title</a>
            </body></html>"#;
        let doc = html::parse_document(page);
        assert_eq!(
            external_link(&doc).as_deref(),
            Some("https://publisher.example/story")
        );
    }

    #[test]
    fn test_self_post_has_no_external_link() {
        let page = r#"<html><body>
            <a class="title" href="https://old.reddit.com/r/rust/comments/x/y">Discussion</a>
            </body></html>"#;
        let doc = html::parse_document(page);
        assert!(external_link(&doc).is_none());
    }

    #[test]
    fn test_new_layout_fallback() {
        let page = r#"<html><body>
            <div class="Post"><a href="https://publisher.example/new-layout">link</a></div>
            </body></html>"#;
        let doc = html::parse_document(page);
        assert_eq!(
            external_link(&doc).as_deref(),
            Some("https://publisher.example/new-layout")
        );
    }
}
