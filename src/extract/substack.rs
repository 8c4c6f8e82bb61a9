//! Substack newsletters.

use super::html;
use super::ExtractedContent;

const UI_SELECTORS: &[&str] = &[
    ".subscribe-widget",
    ".subscription-widget",
    ".post-ufi",
    ".share-dialog",
    ".footer",
];

pub fn extract(_url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let title = html::select_first_text(&doc, "h1.post-title")
        .or_else(|| html::select_first_text(&doc, "h1"))
        .or_else(|| html::select_first_text(&doc, "title"))
        .unwrap_or_default();

    let site_name = html::select_first_text(&doc, ".publication-name");
    let author = html::select_first_text(&doc, ".author-name")
        .or_else(|| html::meta_name(&doc, "author"));

    let published = html::first_attr(&doc, "time[datetime]", "datetime")
        .or_else(|| html::meta_property(&doc, "article:published_time"));

    let content = html::select_first(&doc, ".body")
        .or_else(|| html::select_first(&doc, ".post-content"))
        .or_else(|| html::select_first(&doc, "article"))
        .map(|body| html::html_without(body, UI_SELECTORS))
        .unwrap_or_default();

    let html_lower = raw.to_lowercase();
    let is_paywalled =
        html_lower.contains("paywall") || html_lower.contains("subscriber-only");

    let mut images = Vec::new();
    if let Some(sel) = html::selector(".body img, .post-content img") {
        for img in doc.select(&sel) {
            if let Some(src) = img.value().attr("src") {
                if !src.starts_with("data:") {
                    images.push(src.to_string());
                }
            }
        }
    }

    ExtractedContent {
        title,
        content,
        author,
        published,
        featured_image: html::meta_property(&doc, "og:image"),
        images,
        is_paywalled,
        has_code_blocks: html::select_first(&doc, "pre").is_some(),
        code_languages: html::code_languages(&doc),
        site_name: site_name.or_else(|| Some("Substack".into())),
        extractor_used: "substack".into(),
        ..Default::default()
    }
    .with_text_metrics()
}
