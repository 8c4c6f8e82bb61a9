//! YouTube video pages: metadata only, plus an embed URL.

use super::html;
use super::ExtractedContent;

pub fn extract(url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let video_id = video_id_from_url(url);

    let title = html::meta_name(&doc, "title")
        .or_else(|| {
            html::select_first_text(&doc, "title").map(|t| {
                t.trim_end_matches(" - YouTube").trim().to_string()
            })
        })
        .unwrap_or_default();

    let author = html::first_attr(&doc, "link[itemprop=\"name\"]", "content")
        .or_else(|| html::first_attr(&doc, "meta[itemprop=\"author\"]", "content"));

    let published = html::first_attr(&doc, "meta[itemprop=\"datePublished\"]", "content");

    let content = html::meta_name(&doc, "description")
        .map(|desc| format!("<p>{}</p>", html_escape::encode_text(&desc)))
        .unwrap_or_default();

    let featured_image = html::meta_property(&doc, "og:image").or_else(|| {
        video_id
            .as_ref()
            .map(|id| format!("https://img.youtube.com/vi/{}/maxresdefault.jpg", id))
    });

    let categories = html::meta_name(&doc, "keywords")
        .map(|keywords| {
            keywords
                .split(',')
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .take(5)
                .collect()
        })
        .unwrap_or_default();

    ExtractedContent {
        title,
        content,
        author,
        published,
        categories,
        featured_image,
        has_video: true,
        video_embed_url: video_id
            .map(|id| format!("https://www.youtube.com/embed/{}", id)),
        site_name: Some("YouTube".into()),
        extractor_used: "youtube".into(),
        ..Default::default()
    }
}

fn video_id_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;

    if host.contains("youtu.be") {
        let id = parsed.path().trim_matches('/');
        return (!id.is_empty()).then(|| id.to_string());
    }

    if parsed.path() == "/watch" {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.to_string());
    }

    if let Some(rest) = parsed.path().strip_prefix("/shorts/") {
        let id = rest.split('/').next().unwrap_or_default();
        return (!id.is_empty()).then(|| id.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_variants() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?v=abc123"),
            Some("abc123".into())
        );
        assert_eq!(
            video_id_from_url("https://youtu.be/xyz789"),
            Some("xyz789".into())
        );
        assert_eq!(
            video_id_from_url("https://www.youtube.com/shorts/sh0rt/extra"),
            Some("sh0rt".into())
        );
        assert_eq!(video_id_from_url("https://www.youtube.com/feed"), None);
    }

    #[test]
    fn test_embed_and_thumbnail_urls() {
        let sample = r#"<html><head>
            <meta name="title" content="Rust in 100 Seconds">
            <meta name="description" content="A whirlwind tour of Rust.">
            <meta itemprop="datePublished" content="2025-01-10">
            </head><body></body></html>"#;
        let result = extract("https://www.youtube.com/watch?v=abc123", sample);
        assert_eq!(result.title, "Rust in 100 Seconds");
        assert_eq!(
            result.video_embed_url.as_deref(),
            Some("https://www.youtube.com/embed/abc123")
        );
        assert_eq!(
            result.featured_image.as_deref(),
            Some("https://img.youtube.com/vi/abc123/maxresdefault.jpg")
        );
        assert!(result.has_video);
        assert!(result.content.contains("whirlwind"));
    }
}
