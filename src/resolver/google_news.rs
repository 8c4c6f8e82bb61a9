//! Google News decoder.
//!
//! Preferred path: fetch the article page, read the signature and timestamp
//! attributes Google embeds next to the article id, and ask the
//! batchexecute endpoint for the real URL. Fallback: the article id of
//! older-style links is base64 and carries the URL in its payload. Neither
//! path ever returns a URL still pointing at Google News.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use reqwest::Client;
use tracing::{debug, warn};

use super::{Aggregator, ResolveOutcome};
use crate::extract::html;

const BATCHEXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";

pub(super) async fn resolve(client: &Client, url: &str) -> ResolveOutcome {
    let Some(article_id) = article_id_from_url(url) else {
        return ResolveOutcome::missing(
            Some(Aggregator::GoogleNews),
            "Could not extract article ID",
        );
    };

    match decode_via_api(client, &article_id).await {
        Ok(Some(decoded)) => {
            return ResolveOutcome::found(Aggregator::GoogleNews, decoded, 0.9);
        }
        Ok(None) => {}
        Err(e) => warn!("Google News API decode failed: {}", e),
    }

    match decode_base64(&article_id) {
        Some(decoded) => ResolveOutcome::found(Aggregator::GoogleNews, decoded, 0.7),
        None => ResolveOutcome::missing(Some(Aggregator::GoogleNews), "Base64 decode failed"),
    }
}

/// Article id is the path segment after `/articles/`, or an `article` query
/// parameter on older links.
fn article_id_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();
    if let Some(idx) = segments.iter().position(|s| *s == "articles") {
        if let Some(id) = segments.get(idx + 1) {
            let id = id.split('?').next().unwrap_or(id);
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
    }

    parsed
        .query_pairs()
        .find(|(k, _)| k == "article")
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

async fn decode_via_api(
    client: &Client,
    article_id: &str,
) -> std::result::Result<Option<String>, String> {
    let article_url = format!("https://news.google.com/rss/articles/{}", article_id);
    let response = client
        .get(&article_url)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("HTTP {}", response.status()));
    }

    // A redirect straight to the publisher already answers the question.
    let final_url = response.url().to_string();
    if !final_url.contains("news.google.com") {
        return Ok(Some(final_url));
    }

    let body = response.text().await.map_err(|e| e.to_string())?;
    let (signature, timestamp) = {
        let doc = html::parse_document(&body);
        let Some(div) = html::select_first(&doc, "c-wiz > div") else {
            return Err("Could not find data element".into());
        };
        let (Some(signature), Some(timestamp)) = (
            div.value().attr("data-n-a-sg"),
            div.value().attr("data-n-a-ts"),
        ) else {
            return Err("Missing signature/timestamp".into());
        };
        (signature.to_string(), timestamp.to_string())
    };

    let inner = format!(
        "[\"garturlreq\",[[\"X\",\"Y\",\"Z\",\"{}\",{},\"{}\"],1],\"generic\"]",
        article_id, timestamp, signature
    );
    let payload = serde_json::to_string(&serde_json::json!([[["Fbv4je", inner]]]))
        .map_err(|e| e.to_string())?;

    let response = client
        .post(BATCHEXECUTE_URL)
        .header(
            "Content-Type",
            "application/x-www-form-urlencoded;charset=UTF-8",
        )
        .body(format!("f.req={}", payload))
        .send()
        .await
        .map_err(|e| e.to_string())?;

    if !response.status().is_success() {
        return Err(format!("API HTTP {}", response.status()));
    }

    let mut text = response.text().await.map_err(|e| e.to_string())?;
    // Responses open with an anti-JSON-hijacking prefix.
    if let Some(stripped) = text.strip_prefix(")]}'") {
        text = stripped.trim_start().to_string();
    }

    match extract_http_url(&text) {
        Some(found) => {
            let cleaned = unescape_url(&found);
            if cleaned.contains("news.google.com") {
                debug!("API decode still points at Google News");
                Ok(None)
            } else {
                Ok(Some(cleaned))
            }
        }
        None => Ok(None),
    }
}

/// Base64-decode the article id (standard then URL-safe, with padding) and
/// scan the payload for an http(s) URL.
fn decode_base64(article_id: &str) -> Option<String> {
    let padding = (4 - article_id.len() % 4) % 4;
    let padded = format!("{}{}", article_id, "=".repeat(padding));

    let decoded = STANDARD
        .decode(&padded)
        .or_else(|_| URL_SAFE.decode(&padded))
        .ok()?;

    let text = String::from_utf8_lossy(&decoded);
    let found = extract_http_url(&text)?;
    let found = found.trim_end_matches('\\').to_string();
    if found.contains("news.google.com") {
        return None;
    }
    Some(found)
}

/// First http(s) URL in free-form text, stopping at whitespace, quotes,
/// control bytes, and angle brackets.
fn extract_http_url(text: &str) -> Option<String> {
    let idx = text.find("http://").or_else(|| text.find("https://"))?;
    let url: String = text[idx..]
        .chars()
        .take_while(|c| {
            !c.is_whitespace() && !c.is_control() && !matches!(c, '"' | '<' | '>' | '\u{FFFD}')
        })
        .collect();
    (url.len() > "https://".len()).then_some(url)
}

fn unescape_url(url: &str) -> String {
    let unescaped = url.replace("\\u003d", "=").replace("\\u0026", "&");
    urlencoding::decode(&unescaped)
        .map(|s| s.into_owned())
        .unwrap_or(unescaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_id_from_url() {
        assert_eq!(
            article_id_from_url("https://news.google.com/articles/CBMiX0FVX3lxTE4").as_deref(),
            Some("CBMiX0FVX3lxTE4")
        );
        assert_eq!(
            article_id_from_url("https://news.google.com/rss/articles/abc123?oc=5").as_deref(),
            Some("abc123")
        );
        assert_eq!(
            article_id_from_url("https://news.google.com/read?article=xyz").as_deref(),
            Some("xyz")
        );
        assert!(article_id_from_url("https://news.google.com/home").is_none());
    }

    #[test]
    fn test_base64_decode_finds_embedded_url() {
        let payload = b"\x08\x13\x22https://publisher.example/story\xd2\x01\x00";
        let id = URL_SAFE.encode(payload).trim_end_matches('=').to_string();
        assert_eq!(
            decode_base64(&id).as_deref(),
            Some("https://publisher.example/story")
        );
    }

    #[test]
    fn test_base64_decode_rejects_google_news_urls() {
        let payload = b"https://news.google.com/internal";
        let id = STANDARD.encode(payload);
        assert!(decode_base64(&id).is_none());
    }

    #[test]
    fn test_extract_http_url_stops_at_delimiters() {
        assert_eq!(
            extract_http_url("junk https://example.com/a\"rest").as_deref(),
            Some("https://example.com/a")
        );
        assert!(extract_http_url("no url here").is_none());
    }

    #[test]
    fn test_unescape_url() {
        assert_eq!(
            unescape_url("https://example.com/a?b\\u003d1\\u0026c%3D2"),
            "https://example.com/a?b=1&c=2"
        );
    }
}
