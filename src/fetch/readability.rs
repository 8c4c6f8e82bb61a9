//! Reader-mode and heuristic extraction for pages without a site-specific
//! extractor.
//!
//! Reader mode scores candidate containers by the amount of paragraph text
//! they hold, discounted by link density, then serializes the winner's block
//! elements. The heuristic fallback walks a fixed container priority list.

use scraper::{ElementRef, Html};

use crate::domain::Article;
use crate::extract::html;
use crate::fetch::FetchResult;

const BLOCK_ELEMENTS: &str = "p, h1, h2, h3, h4, h5, h6, ul, ol, blockquote, pre";

const SKIP_ANCESTORS: &[&str] = &["nav", "header", "footer", "aside", "form", "noscript"];

const NOISE_CLASS_FRAGMENTS: &[&str] = &[
    "ad-",
    "advertisement",
    "social",
    "share",
    "related",
    "recommended",
    "newsletter",
    "subscribe",
    "comment",
    "sidebar",
];

/// Reader-mode extraction. Returns None when no candidate container holds a
/// meaningful amount of article text.
pub fn reader_mode(url: &str, body: &str) -> Option<FetchResult> {
    let doc = html::parse_document(body);

    let candidate_sel = html::selector("article, main, [role=\"main\"], section, div")?;
    let mut best: Option<(f64, ElementRef)> = None;
    for candidate in doc.select(&candidate_sel) {
        let score = score_candidate(&candidate);
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    let (score, container) = best?;
    if score < 250.0 {
        return None;
    }

    let content = collect_blocks(&container);
    if content.is_empty() {
        return None;
    }

    Some(build_result(url, &doc, content, "reader"))
}

/// Heuristic fallback: fixed container priority list, then block-element
/// collection. Always produces a result, however thin.
pub fn heuristic(url: &str, body: &str) -> FetchResult {
    let doc = html::parse_document(body);

    let container = html::select_first(&doc, "article")
        .or_else(|| {
            html::select_first(&doc, ".article, .post, .post-content, .entry-content, .story")
        })
        .or_else(|| html::select_first(&doc, "[role=\"main\"]"))
        .or_else(|| html::select_first(&doc, "main"))
        .or_else(|| html::select_first(&doc, "[class*=\"content\"], [class*=\"body\"]"))
        .or_else(|| html::select_first(&doc, "body"));

    let mut content = container
        .map(|c| collect_blocks(&c))
        .unwrap_or_default();

    // Thin block extraction: fall back to the container's inner HTML.
    if content.len() < 100 {
        if let Some(container) = container {
            content = html::html_without(
                container,
                &["script", "style", "nav", "header", "footer", "aside", "form", "noscript"],
            );
        }
    }

    build_result(url, &doc, content, "heuristic")
}

fn score_candidate(candidate: &ElementRef) -> f64 {
    let Some(p_sel) = html::selector("p") else {
        return 0.0;
    };
    let Some(a_sel) = html::selector("a") else {
        return 0.0;
    };

    let text_len: usize = candidate
        .select(&p_sel)
        .map(|p| html::element_text(&p).len())
        .sum();
    if text_len == 0 {
        return 0.0;
    }

    let link_len: usize = candidate
        .select(&a_sel)
        .map(|a| html::element_text(&a).len())
        .sum();
    let total = html::element_text(candidate).len().max(1);
    let link_density = link_len as f64 / total as f64;

    text_len as f64 * (1.0 - link_density)
}

/// Serialize the container's block-level elements, skipping blocks inside
/// navigation chrome or noise-classed wrappers.
fn collect_blocks(container: &ElementRef) -> String {
    let Some(block_sel) = html::selector(BLOCK_ELEMENTS) else {
        return String::new();
    };

    let mut parts = Vec::new();
    for block in container.select(&block_sel) {
        if html::element_text(&block).is_empty() {
            continue;
        }
        if has_noisy_ancestor(&block, container) {
            continue;
        }
        // Nested blocks (a <p> inside a collected <blockquote>) would be
        // emitted twice; keep only top-most blocks.
        if has_block_ancestor(&block, container) {
            continue;
        }
        parts.push(block.html());
    }
    parts.join("\n")
}

fn has_noisy_ancestor(block: &ElementRef, container: &ElementRef) -> bool {
    for ancestor in block.ancestors() {
        if ancestor.id() == container.id() {
            break;
        }
        let Some(element) = ElementRef::wrap(ancestor) else {
            continue;
        };
        let name = element.value().name();
        if SKIP_ANCESTORS.contains(&name) {
            return true;
        }
        let classes = element
            .value()
            .classes()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        if NOISE_CLASS_FRAGMENTS.iter().any(|n| classes.contains(n)) {
            return true;
        }
        let id = element.value().id().unwrap_or_default().to_lowercase();
        if id.contains("comment") {
            return true;
        }
    }
    false
}

fn has_block_ancestor(block: &ElementRef, container: &ElementRef) -> bool {
    const BLOCKS: &[&str] = &[
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "blockquote", "pre",
    ];
    for ancestor in block.ancestors() {
        if ancestor.id() == container.id() {
            break;
        }
        if let Some(element) = ElementRef::wrap(ancestor) {
            if BLOCKS.contains(&element.value().name()) {
                return true;
            }
        }
    }
    false
}

fn build_result(url: &str, doc: &Html, content: String, extractor: &str) -> FetchResult {
    let title = html::select_first_text(doc, "title")
        .map(|t| html::strip_title_suffix(&t))
        .filter(|t| !t.is_empty())
        .or_else(|| html::select_first_text(doc, "h1"))
        .or_else(|| html::meta_property(doc, "og:title"))
        .unwrap_or_else(|| "Untitled".into());

    let author = html::meta_name(doc, "author")
        .or_else(|| html::meta_property(doc, "article:author"))
        .or_else(|| {
            html::select_first_text(doc, "[class*=\"author\"], [class*=\"byline\"]")
        });

    let published = html::meta_property(doc, "article:published_time")
        .or_else(|| html::first_attr(doc, "time[datetime]", "datetime"));

    let categories = html::meta_property(doc, "article:section")
        .map(|section| vec![section])
        .or_else(|| {
            html::meta_name(doc, "keywords").map(|keywords| {
                keywords
                    .split(',')
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .take(5)
                    .collect()
            })
        })
        .unwrap_or_default();

    let (word_count, reading_time, has_code, code_languages) =
        crate::fetch::content_metrics(&content);

    FetchResult {
        url: url.to_string(),
        title,
        content_hash: Some(Article::hash_content(&content)),
        content,
        author,
        published,
        source: "direct".into(),
        reading_time_minutes: Some(reading_time),
        word_count: Some(word_count),
        categories,
        featured_image: html::meta_property(doc, "og:image"),
        has_code_blocks: has_code,
        code_languages,
        site_name: html::meta_property(doc, "og:site_name"),
        extractor_used: extractor.into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_page(paragraphs: usize) -> String {
        let body: String = (0..paragraphs)
            .map(|i| {
                format!(
                    "<p>Paragraph {} with a reasonable amount of article text \
                     continuing for several more words to fill space.</p>",
                    i
                )
            })
            .collect();
        format!(
            r#"<html><head>
            <title>Deep Dive — Example Site</title>
            <meta name="author" content="Casey Author">
            <meta property="article:published_time" content="2025-02-01T00:00:00Z">
            <meta property="og:site_name" content="Example Site">
            </head><body>
            <nav><a href="/">Home</a><a href="/about">About</a></nav>
            <article>{}</article>
            <footer><p>Copyright notice</p></footer>
            </body></html>"#,
            body
        )
    }

    #[test]
    fn test_reader_mode_extracts_article_body() {
        let page = article_page(10);
        let result = reader_mode("https://example.com/story", &page).unwrap();
        assert_eq!(result.title, "Deep Dive");
        assert_eq!(result.author.as_deref(), Some("Casey Author"));
        assert_eq!(result.site_name.as_deref(), Some("Example Site"));
        assert!(result.content.contains("Paragraph 3"));
        assert!(!result.content.contains("Copyright notice"));
        assert_eq!(result.extractor_used, "reader");
        assert!(result.word_count.unwrap() > 100);
    }

    #[test]
    fn test_reader_mode_rejects_thin_pages() {
        let page = "<html><body><div><p>tiny</p></div></body></html>";
        assert!(reader_mode("https://example.com/x", page).is_none());
    }

    #[test]
    fn test_heuristic_always_produces_result() {
        let page = "<html><head><title>Thin</title></head>\
                    <body><div><p>just a line of text</p></div></body></html>";
        let result = heuristic("https://example.com/x", page);
        assert_eq!(result.title, "Thin");
        assert!(result.content.contains("just a line"));
        assert_eq!(result.extractor_used, "heuristic");
    }

    #[test]
    fn test_heuristic_skips_noise_containers() {
        let page = format!(
            "<html><body><article>\
             <p>{}</p>\
             <div class=\"social-share\"><p>Share this everywhere!</p></div>\
             <div class=\"related-posts\"><p>Read next</p></div>\
             </article></body></html>",
            "body text ".repeat(40)
        );
        let result = heuristic("https://example.com/x", &page);
        assert!(result.content.contains("body text"));
        assert!(!result.content.contains("Share this"));
        assert!(!result.content.contains("Read next"));
    }
}
