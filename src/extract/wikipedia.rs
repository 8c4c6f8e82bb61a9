//! Wikipedia articles.

use super::html;
use super::ExtractedContent;

const NOISE_SELECTORS: &[&str] = &[
    ".reflist",
    ".navbox",
    ".sistersitebox",
    ".mw-editsection",
    ".mw-empty-elt",
    ".noprint",
    "#coordinates",
    ".ambox",
    ".hatnote",
];

pub fn extract(_url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let title = html::select_first_text(&doc, "#firstHeading")
        .or_else(|| {
            html::select_first_text(&doc, "title")
                .map(|t| t.trim_end_matches(" - Wikipedia").trim().to_string())
        })
        .unwrap_or_default();

    let content = html::select_first(&doc, "#mw-content-text")
        .map(|body| html::html_without(body, NOISE_SELECTORS))
        .unwrap_or_default();

    let mut categories = Vec::new();
    if let Some(sel) = html::selector("#mw-normal-catlinks a") {
        // First link is the "Categories" index page itself.
        for link in doc.select(&sel).skip(1).take(5) {
            let text = html::element_text(&link);
            if !text.is_empty() {
                categories.push(text);
            }
        }
    }

    let featured_image = html::first_attr(&doc, ".infobox img", "src").map(|src| {
        if src.starts_with("//") {
            format!("https:{}", src)
        } else {
            src
        }
    });

    ExtractedContent {
        title,
        content,
        categories,
        featured_image,
        site_name: Some("Wikipedia".into()),
        extractor_used: "wikipedia".into(),
        ..Default::default()
    }
    .with_text_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<html><body>
        <h1 id="firstHeading">Rust (programming language)</h1>
        <div id="mw-content-text">
          <p>Rust is a general-purpose programming language emphasizing
          performance, type safety, and concurrency.</p>
          <div class="hatnote">For other uses, see Rust.</div>
          <div class="reflist">[1] [2]</div>
        </div>
        <div id="mw-normal-catlinks">
          <a href="/wiki/Help:Category">Categories</a>
          <a href="/wiki/Category:Programming_languages">Programming languages</a>
          <a href="/wiki/Category:Systems_programming">Systems programming</a>
        </div>
        <table class="infobox"><tr><td><img src="//upload.wikimedia.org/rust.png"></td></tr></table>
        </body></html>"#;

    #[test]
    fn test_strips_reference_noise_and_collects_categories() {
        let result = extract("https://en.wikipedia.org/wiki/Rust_(programming_language)", SAMPLE);
        assert_eq!(result.title, "Rust (programming language)");
        assert!(result.content.contains("type safety"));
        assert!(!result.content.contains("For other uses"));
        assert!(!result.content.contains("[1]"));
        assert_eq!(
            result.categories,
            vec!["Programming languages", "Systems programming"]
        );
        assert_eq!(
            result.featured_image.as_deref(),
            Some("https://upload.wikimedia.org/rust.png")
        );
    }
}
