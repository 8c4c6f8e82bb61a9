//! Bloomberg articles: JSON-LD first, article-body selectors second,
//! aggressively filtered paragraphs last.

use serde_json::Value;

use super::html;
use super::ExtractedContent;

const BODY_SELECTORS: &[&str] = &[
    "[data-component=\"body-content\"]",
    "[data-component=\"article-body\"]",
    "[class*=\"body-content\"]",
    "[class*=\"article-body\"]",
    "[class*=\"story-body\"]",
    "[class*=\"ArticleBody\"]",
    ".body-content",
    "article .content",
    ".article-body__content",
];

const NOISE_SELECTORS: &[&str] = &[
    "[class*=\"newsletter\"]",
    "[class*=\"subscribe\"]",
    "[class*=\"related\"]",
    "[class*=\"recommended\"]",
    "[class*=\"ad-\"]",
    "[class*=\"promo\"]",
    "[class*=\"Promo\"]",
    "[class*=\"recirc\"]",
    "[class*=\"Recirc\"]",
    "[class*=\"terminal\"]",
    "[class*=\"Terminal\"]",
    "aside",
    "nav",
    "footer",
    "script",
    "style",
];

const NOISE_PHRASES: &[&str] = &[
    "subscribe",
    "sign up",
    "newsletter",
    "cookie",
    "privacy",
    "more from bloomberg",
    "top reads",
    "related",
    "before it's here",
    "bloomberg terminal",
    "learn more",
    "gift this article",
    "add us on",
    "contact us",
    "send a tip",
    "site feedback",
    "take our survey",
    "provide news feedback",
    "report an error",
    "by bloomberg",
    "updated",
    "read more",
    "see also",
];

const CONTAINER_NOISE: &[&str] = &["related", "sidebar", "nav", "footer", "promo", "ad-"];

pub fn extract(_url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let title = html::select_first_text(&doc, "h1")
        .or_else(|| html::meta_property(&doc, "og:title"))
        .or_else(|| {
            html::select_first_text(&doc, "title")
                .map(|t| t.split(" - Bloomberg").next().unwrap_or(&t).to_string())
        })
        .unwrap_or_default();

    let author = html::select_first_text(&doc, "[class*=\"author\"], .byline, [data-component=\"byline\"]")
        .map(|a| {
            let trimmed = a.trim();
            trimmed
                .strip_prefix("By ")
                .or_else(|| trimmed.strip_prefix("by "))
                .unwrap_or(trimmed)
                .to_string()
        })
        .or_else(|| html::meta_name(&doc, "author"));

    let published = html::first_attr(&doc, "time[datetime]", "datetime")
        .or_else(|| html::meta_property(&doc, "article:published_time"));

    let mut content = extract_from_json_ld(&doc);
    if content.len() < 500 {
        content = extract_from_html(&doc);
    }

    let html_lower = raw.to_lowercase();
    let is_paywalled = [
        "subscribe to continue",
        "subscription required",
        "paywall",
        "sign in to read",
        "subscriber-only",
    ]
    .iter()
    .any(|phrase| html_lower.contains(phrase));

    let mut categories = Vec::new();
    if let Some(section) = html::meta_property(&doc, "article:section") {
        categories.push(section);
    }

    ExtractedContent {
        title,
        content,
        author,
        published,
        categories,
        featured_image: html::meta_property(&doc, "og:image"),
        is_paywalled,
        site_name: Some("Bloomberg".into()),
        extractor_used: "bloomberg".into(),
        ..Default::default()
    }
    .with_text_metrics()
}

fn extract_from_json_ld(doc: &scraper::Html) -> String {
    let Some(sel) = html::selector("script[type=\"application/ld+json\"]") else {
        return String::new();
    };
    for script in doc.select(&sel) {
        let raw: String = script.text().collect();
        let Ok(data) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        let candidates: Vec<&Value> = match &data {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in candidates {
            let body = article_body_from_json_ld(item);
            if !body.is_empty() {
                return body;
            }
        }
    }
    String::new()
}

fn article_body_from_json_ld(data: &Value) -> String {
    if let Some(body) = data.get("articleBody").and_then(Value::as_str) {
        return paragraphs_to_html(body);
    }
    if let Some(graph) = data.get("@graph").and_then(Value::as_array) {
        for item in graph {
            let is_article = item
                .get("@type")
                .and_then(Value::as_str)
                .is_some_and(|t| matches!(t, "NewsArticle" | "Article" | "WebPage"));
            if is_article {
                if let Some(body) = item.get("articleBody").and_then(Value::as_str) {
                    return paragraphs_to_html(body);
                }
            }
        }
    }
    String::new()
}

fn paragraphs_to_html(body: &str) -> String {
    body.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_from_html(doc: &scraper::Html) -> String {
    for css in BODY_SELECTORS {
        let Some(body) = html::select_first(doc, css) else {
            continue;
        };
        let paragraph_count = html::selector("p")
            .map(|sel| body.select(&sel).count())
            .unwrap_or(0);
        if paragraph_count >= 2 {
            return html::html_without(body, NOISE_SELECTORS);
        }
    }

    if let Some(article) = html::select_first(doc, "article") {
        if let Some(sel) = html::selector("p") {
            let paragraphs: Vec<String> = article
                .select(&sel)
                .filter(|p| html::element_text(p).len() > 100)
                .map(|p| p.html())
                .collect();
            if !paragraphs.is_empty() {
                return paragraphs.join("\n");
            }
        }
    }

    filtered_paragraphs(doc)
}

/// Last resort: every paragraph on the page, minus short lines, noise
/// phrases, and anything living inside promo or sidebar containers.
fn filtered_paragraphs(doc: &scraper::Html) -> String {
    let Some(sel) = html::selector("p") else {
        return String::new();
    };
    let mut kept = Vec::new();
    for p in doc.select(&sel) {
        let text = html::element_text(&p);
        if text.len() < 80 {
            continue;
        }
        let text_lower = text.to_lowercase();
        if NOISE_PHRASES.iter().any(|phrase| text_lower.contains(phrase)) {
            continue;
        }
        let parent_classes = p
            .parent()
            .and_then(scraper::ElementRef::wrap)
            .map(|parent| {
                parent
                    .value()
                    .classes()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_lowercase()
            })
            .unwrap_or_default();
        if CONTAINER_NOISE.iter().any(|noise| parent_classes.contains(noise)) {
            continue;
        }
        kept.push(p.html());
    }
    kept.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_ld_article_body_preferred() {
        let sample = r#"<html><head>
            <script type="application/ld+json">
            {"@type": "NewsArticle", "articleBody": "First paragraph of the story with enough substance to matter.\n\nSecond paragraph continuing the reporting in more depth here."}
            </script></head><body><h1>Markets Rally</h1></body></html>"#;
        let result = extract("https://www.bloomberg.com/news/articles/x", sample);
        assert!(result.content.contains("<p>First paragraph"));
        assert!(result.content.contains("<p>Second paragraph"));
        assert_eq!(result.extractor_used, "bloomberg");
    }

    #[test]
    fn test_json_ld_graph_variant() {
        let body = "A ".repeat(300);
        let sample = format!(
            r#"<html><head><script type="application/ld+json">
            {{"@graph": [{{"@type": "WebPage", "articleBody": "{}"}}]}}
            </script></head><body></body></html>"#,
            body.trim()
        );
        let result = extract("https://www.bloomberg.com/news/articles/y", &sample);
        assert!(result.content.starts_with("<p>A A"));
    }

    #[test]
    fn test_paragraph_filter_rejects_noise() {
        let long_noise = format!(
            "<p>{} subscribe to our newsletter for more coverage</p>",
            "filler ".repeat(20)
        );
        let dateline = format!(
            "<p>Updated: June 1, 2025 at 9:00 AM EDT {}</p>",
            "with minor corrections throughout. ".repeat(3)
        );
        let story = format!("<p>{}</p>", "Real reporting sentence content here. ".repeat(5));
        let sample = format!(
            "<html><body>{}{}{}</body></html>",
            long_noise, dateline, story
        );
        let result = extract("https://www.bloomberg.com/news/articles/z", &sample);
        assert!(result.content.contains("Real reporting"));
        assert!(!result.content.contains("subscribe"));
        assert!(!result.content.contains("Updated: June 1"));
    }

    #[test]
    fn test_paywall_phrase_flags() {
        let sample = "<html><body><p>Subscribe to continue reading.</p></body></html>";
        let result = extract("https://www.bloomberg.com/news/articles/w", sample);
        assert!(result.is_paywalled);
    }
}
