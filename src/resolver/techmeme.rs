//! Techmeme decoder.
//!
//! The RSS description usually carries the outbound link directly. Failing
//! that, the Techmeme page is fetched; a `#a...` fragment identifies the
//! story cluster to pull the main outbound link from, with homepage
//! fallbacks at decreasing confidence.

use reqwest::Client;
use scraper::Html;
use tracing::warn;

use super::{Aggregator, ResolveOutcome};
use crate::extract::html;

pub(super) async fn resolve(client: &Client, url: &str, content: &str) -> ResolveOutcome {
    if !content.is_empty() {
        if let Some(href) = first_external_link_in_description(content) {
            return ResolveOutcome::found(Aggregator::Techmeme, href, 0.9);
        }
    }

    match fetch_and_scan(client, url).await {
        Ok(Some(outcome)) => outcome,
        Ok(None) => ResolveOutcome::missing(
            Some(Aggregator::Techmeme),
            "Could not find source link",
        ),
        Err(e) => {
            warn!("Techmeme fetch failed: {}", e);
            ResolveOutcome::missing(Some(Aggregator::Techmeme), e)
        }
    }
}

fn first_external_link_in_description(content: &str) -> Option<String> {
    let doc = html::parse_fragment(content);
    let sel = html::selector("a[href]")?;
    for link in doc.select(&sel) {
        let href = link.value().attr("href")?.to_string();
        if href.starts_with("http") && !href.to_lowercase().contains("techmeme.com") {
            return Some(href);
        }
    }
    None
}

async fn fetch_and_scan(
    client: &Client,
    url: &str,
) -> std::result::Result<Option<ResolveOutcome>, String> {
    let fragment = url.split('#').nth(1).unwrap_or_default().to_string();

    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }
    let body = response.text().await.map_err(|e| e.to_string())?;
    let doc = html::parse_document(&body);

    // Fragment-addressed story: find its cluster and take the main link.
    if !fragment.is_empty() {
        if let Some(href) = cluster_link_for_fragment(&doc, &fragment) {
            return Ok(Some(ResolveOutcome::found(Aggregator::Techmeme, href, 0.95)));
        }
    }

    // Homepage main-story link.
    if let Some(href) = html::first_attr(&doc, "a.ourh[href^=\"http\"]", "href") {
        if !href.to_lowercase().contains("techmeme.com") {
            return Ok(Some(ResolveOutcome::found(Aggregator::Techmeme, href, 0.7)));
        }
    }

    // Any external link in an item block.
    if let Some(sel) = html::selector(".ii a[href^=\"http\"]") {
        for link in doc.select(&sel) {
            if let Some(href) = link.value().attr("href") {
                if !href.to_lowercase().contains("techmeme.com") {
                    return Ok(Some(ResolveOutcome::found(
                        Aggregator::Techmeme,
                        href.to_string(),
                        0.5,
                    )));
                }
            }
        }
    }

    Ok(None)
}

/// Walk up from the `<a name="...">` anchor to its `.clus` container, then
/// pick the main article link inside it.
fn cluster_link_for_fragment(doc: &Html, fragment: &str) -> Option<String> {
    let anchor_sel = html::selector(&format!("a[name=\"{}\"]", fragment))?;
    let anchor = doc.select(&anchor_sel).next()?;

    let cluster = anchor
        .ancestors()
        .filter_map(scraper::ElementRef::wrap)
        .find(|el| el.value().classes().any(|c| c == "clus"))?;

    for css in [".ii a[href^=\"http\"]", "a.ourh[href^=\"http\"]"] {
        let sel = html::selector(css)?;
        for link in cluster.select(&sel) {
            if let Some(href) = link.value().attr("href") {
                if !href.to_lowercase().contains("techmeme.com") {
                    return Some(href.to_string());
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
    fn test_description_link_preferred() {
        let description = r#"<p><a href="https://www.techmeme.com/x">Techmeme</a>
            <a href="https://publisher.example/story">Publisher story</a></p>"#;
        assert_eq!(
            first_external_link_in_description(description).as_deref(),
            Some("https://publisher.example/story")
        );
    }

    #[test]
    fn test_description_without_external_link() {
        let description = r#"<a href="https://www.techmeme.com/only">internal</a>"#;
        assert!(first_external_link_in_description(description).is_none());
    }

    #[test]
    fn test_cluster_link_for_fragment() {
        let page = r#"<html><body>
            <div class="clus">
              <a name="a251224p15"></a>
              <div class="ii"><a href="https://publisher.example/deep-story">Story</a></div>
            </div>
            <div class="clus">
              <a name="a251224p16"></a>
              <div class="ii"><a href="https://other.example/story">Other</a></div>
            </div>
            </body></html>"#;
        let doc = html::parse_document(page);
        assert_eq!(
            cluster_link_for_fragment(&doc, "a251224p15").as_deref(),
            Some("https://publisher.example/deep-story")
        );
        assert_eq!(
            cluster_link_for_fragment(&doc, "a251224p16").as_deref(),
            Some("https://other.example/story")
        );
        assert!(cluster_link_for_fragment(&doc, "missing").is_none());
    }
}
