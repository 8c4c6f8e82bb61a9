//! Medium and Medium-hosted publications.

use super::html::{self, selector};
use super::ExtractedContent;

const PAYWALL_MARKERS: &[&str] = &[
    "memberonlycontent",
    "meteredcontent",
    "locked",
    "you have 2 free member-only",
    "member-only story",
];

const UI_SELECTORS: &[&str] = &[
    "[data-testid=\"headerSocialShare\"]",
    "[data-testid=\"responses\"]",
    ".pw-multi-vote-count",
    ".js-postActionsFooter",
];

pub fn extract(url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let title = html::select_first_text(&doc, "h1")
        .or_else(|| {
            html::select_first_text(&doc, "title")
                .map(|t| html::strip_title_suffix(&t))
        })
        .unwrap_or_default();

    let author = html::select_first_text(&doc, "a[data-testid=\"authorName\"]")
        .or_else(|| html::meta_name(&doc, "author"));

    let published = html::first_attr(&doc, "time[datetime]", "datetime")
        .or_else(|| html::meta_property(&doc, "article:published_time"));

    let html_lower = raw.to_lowercase();
    let is_paywalled = PAYWALL_MARKERS
        .iter()
        .any(|marker| html_lower.contains(marker));

    // Medium reports its own reading time ("7 min read").
    let reading_time = find_reported_reading_time(raw);

    let content = html::select_first(&doc, "article")
        .or_else(|| html::select_first(&doc, "main"))
        .map(|article| html::html_without(article, UI_SELECTORS))
        .unwrap_or_default();

    let mut categories = Vec::new();
    if let Some(tag) = url.split("/tag/").nth(1) {
        let tag = tag.split('/').next().unwrap_or_default();
        if !tag.is_empty() {
            categories.push(title_case(&tag.replace('-', " ")));
        }
    }

    ExtractedContent {
        title,
        content,
        author,
        published,
        reading_time_minutes: reading_time,
        categories,
        featured_image: html::meta_property(&doc, "og:image"),
        is_paywalled,
        has_code_blocks: html::select_first(&doc, "pre").is_some(),
        code_languages: html::code_languages(&doc),
        site_name: Some("Medium".into()),
        extractor_used: "medium".into(),
        ..Default::default()
    }
    .with_text_metrics()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Scan for an "N min read" marker anywhere in the page text.
fn find_reported_reading_time(raw: &str) -> Option<i64> {
    let doc = html::parse_document(raw);
    let sel = selector("span, div, p")?;
    for element in doc.select(&sel) {
        let text = html::element_text(&element);
        if let Some(minutes) = parse_min_read(&text) {
            return Some(minutes);
        }
    }
    None
}

fn parse_min_read(text: &str) -> Option<i64> {
    let idx = text.find("min read")?;
    let head = text[..idx].trim_end();
    let digits: String = head
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok().filter(|&m| m > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html><head>
        <title>Why Rust | Medium</title>
        <meta property="og:image" content="https://miro.medium.com/x.png">
        </head><body>
        <span>7 min read</span>
        <article>
          <h1>Why Rust</h1>
          <a data-testid="authorName">Jane Dev</a>
          <time datetime="2025-03-01T10:00:00Z">Mar 1</time>
          <div data-testid="headerSocialShare">share</div>
          <p>Rust gives you control without footguns. This paragraph carries
          the body of the article and keeps going for a while.</p>
        </article>
        </body></html>"#;

    #[test]
    fn test_extracts_title_author_and_strips_ui() {
        let result = extract("https://medium.com/@jane/why-rust", SAMPLE);
        assert_eq!(result.title, "Why Rust");
        assert_eq!(result.author.as_deref(), Some("Jane Dev"));
        assert_eq!(result.reading_time_minutes, Some(7));
        assert!(!result.content.contains("headerSocialShare"));
        assert!(result.content.contains("footguns"));
        assert_eq!(result.site_name.as_deref(), Some("Medium"));
        assert_eq!(result.extractor_used, "medium");
    }

    #[test]
    fn test_paywall_marker_detected() {
        let paywalled = SAMPLE.replace("<article>", "<article data-x=\"meteredContent\">");
        let result = extract("https://medium.com/@jane/why-rust", &paywalled);
        assert!(result.is_paywalled);
    }

    #[test]
    fn test_tag_url_category_is_title_cased() {
        let result = extract("https://medium.com/tag/machine-learning", SAMPLE);
        assert_eq!(result.categories, vec!["Machine Learning"]);

        let result = extract("https://medium.com/tag/rust/archive", SAMPLE);
        assert_eq!(result.categories, vec!["Rust"]);
    }

    #[test]
    fn test_parse_min_read() {
        assert_eq!(parse_min_read("7 min read"), Some(7));
        assert_eq!(parse_min_read("About 12 min read time"), Some(12));
        assert_eq!(parse_min_read("no marker"), None);
    }
}
