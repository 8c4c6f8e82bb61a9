//! Twitter/X posts: best effort from Open Graph tags only, since the page
//! body is rendered client-side.

use super::html;
use super::ExtractedContent;

pub fn extract(url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let title = html::meta_property(&doc, "og:title")
        .or_else(|| html::select_first_text(&doc, "title"))
        .unwrap_or_default();

    let content = html::meta_property(&doc, "og:description")
        .map(|desc| format!("<p>{}</p>", html_escape::encode_text(&desc)))
        .unwrap_or_default();

    let author = url::Url::parse(url).ok().and_then(|parsed| {
        parsed
            .path_segments()
            .and_then(|mut segments| segments.next().map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
    });

    let featured_image = html::meta_property(&doc, "og:image")
        .filter(|img| !img.contains("profile_images"));

    ExtractedContent {
        title,
        content,
        author,
        featured_image,
        site_name: Some("X (Twitter)".into()),
        extractor_used: "twitter".into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_og_tags_and_author_from_path() {
        let sample = r#"<html><head>
            <meta property="og:title" content="rustlang on X">
            <meta property="og:description" content="Rust 1.80 is out today.">
            <meta property="og:image" content="https://pbs.twimg.com/media/card.png">
            </head><body></body></html>"#;
        let result = extract("https://x.com/rustlang/status/1", sample);
        assert_eq!(result.title, "rustlang on X");
        assert_eq!(result.author.as_deref(), Some("rustlang"));
        assert!(result.content.contains("1.80"));
        assert_eq!(
            result.featured_image.as_deref(),
            Some("https://pbs.twimg.com/media/card.png")
        );
    }

    #[test]
    fn test_profile_image_skipped() {
        let sample = r#"<html><head>
            <meta property="og:image" content="https://pbs.twimg.com/profile_images/me.png">
            </head><body></body></html>"#;
        let result = extract("https://x.com/someone/status/2", sample);
        assert!(result.featured_image.is_none());
    }
}
