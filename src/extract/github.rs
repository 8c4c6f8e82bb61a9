//! GitHub releases, issues, pull requests, discussions, files, and READMEs.

use super::html;
use super::ExtractedContent;

pub fn extract(url: &str, raw: &str) -> ExtractedContent {
    let doc = html::parse_document(raw);

    let path = url
        .split("github.com/")
        .nth(1)
        .unwrap_or_default()
        .trim_matches('/');
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    let kind = match parts.get(2).copied() {
        Some("releases") => "release",
        Some("discussions") => "discussion",
        Some("issues") => "issue",
        Some("pull") => "pull_request",
        Some("blob") => "file",
        _ => "repository",
    };

    let title = match kind {
        "release" => html::select_first_text(&doc, ".release-header .f1"),
        _ => None,
    }
    .or_else(|| html::select_first_text(&doc, "h1"))
    .or_else(|| {
        html::select_first_text(&doc, "title").map(|t| {
            t.split(" · GitHub")
                .next()
                .unwrap_or(&t)
                .trim()
                .to_string()
        })
    })
    .unwrap_or_default();

    let author = html::select_first_text(&doc, ".author, .user-mention")
        .map(|a| a.trim_start_matches('@').to_string());

    let published = html::first_attr(&doc, "relative-time[datetime]", "datetime")
        .or_else(|| html::first_attr(&doc, "time[datetime]", "datetime"));

    let content = match kind {
        "issue" | "discussion" | "pull_request" => {
            html::select_first(&doc, ".comment-body")
                .or_else(|| html::select_first(&doc, ".markdown-body"))
        }
        "file" | "repository" => html::select_first(&doc, "#readme .markdown-body"),
        _ => html::select_first(&doc, ".markdown-body"),
    }
    .map(|body| body.html())
    .unwrap_or_default();

    let site_name = (parts.len() >= 2).then(|| format!("{}/{}", parts[0], parts[1]));

    let mut tags = Vec::new();
    if kind == "release" {
        if let Some(tag) = html::select_first_text(&doc, ".css-truncate-target") {
            tags.push(tag);
        }
    }

    ExtractedContent {
        title,
        content,
        author,
        published,
        tags,
        has_code_blocks: html::select_first(&doc, "pre").is_some(),
        code_languages: html::code_languages(&doc),
        site_name,
        extractor_used: format!("github_{}", kind),
        ..Default::default()
    }
    .with_text_metrics()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_classification_and_repo_name() {
        let sample = r#"<html><body>
            <div class="release-header"><span class="f1">v1.80.0</span></div>
            <span class="css-truncate-target">1.80.0</span>
            <relative-time datetime="2025-06-13T12:00:00Z"></relative-time>
            <div class="markdown-body"><p>This release stabilizes LazyCell and
            adds exclusive-range patterns to the language.</p></div>
            </body></html>"#;
        let result = extract("https://github.com/rust-lang/rust/releases/tag/1.80.0", sample);
        assert_eq!(result.extractor_used, "github_release");
        assert_eq!(result.title, "v1.80.0");
        assert_eq!(result.site_name.as_deref(), Some("rust-lang/rust"));
        assert_eq!(result.tags, vec!["1.80.0"]);
        assert!(result.content.contains("LazyCell"));
    }

    #[test]
    fn test_repository_uses_readme() {
        let sample = r#"<html><body>
            <h1>tokio</h1>
            <div id="readme"><div class="markdown-body"><p>A runtime for
            writing reliable asynchronous applications.</p></div></div>
            </body></html>"#;
        let result = extract("https://github.com/tokio-rs/tokio", sample);
        assert_eq!(result.extractor_used, "github_repository");
        assert!(result.content.contains("asynchronous"));
    }

    #[test]
    fn test_issue_uses_comment_body() {
        let sample = r#"<html><body><h1>Panic in scheduler</h1>
            <div class="comment-body"><p>Repro steps attached below.</p></div>
            </body></html>"#;
        let result = extract("https://github.com/tokio-rs/tokio/issues/1234", sample);
        assert_eq!(result.extractor_used, "github_issue");
        assert!(result.content.contains("Repro steps"));
    }
}
