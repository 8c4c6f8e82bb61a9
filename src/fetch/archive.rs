//! Archive fallbacks for paywalled pages: archive.today, the Wayback
//! Machine, and Google Cache, tried in that order.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::app::{EstuaryError, Result};
use crate::fetch::DESKTOP_USER_AGENT;

#[derive(Debug, Clone)]
pub struct ArchiveResult {
    pub url: String,
    pub original_url: String,
    pub html: String,
    /// "archive.today", "wayback", or "google_cache".
    pub source: String,
    pub cached_date: Option<DateTime<Utc>>,
}

pub struct ArchiveService {
    client: Client,
    max_age_days: i64,
}

impl ArchiveService {
    pub fn new(timeout_secs: u64, max_age_days: i64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(DESKTOP_USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| EstuaryError::Archive(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            max_age_days,
        })
    }

    /// Try each archive service in order; first usable page wins.
    pub async fn fetch(&self, url: &str) -> Result<ArchiveResult> {
        match self.fetch_archive_today(url).await {
            Ok(result) if !result.html.is_empty() => {
                info!("Found {} in archive.today", url);
                return Ok(result);
            }
            Ok(_) => {}
            Err(e) => debug!("archive.today lookup failed: {}", e),
        }

        match self.fetch_wayback(url).await {
            Ok(result) if !result.html.is_empty() => {
                info!("Found {} in Wayback Machine", url);
                return Ok(result);
            }
            Ok(_) => {}
            Err(e) => debug!("Wayback lookup failed: {}", e),
        }

        match self.fetch_google_cache(url).await {
            Ok(result) if !result.html.is_empty() => {
                info!("Found {} in Google Cache", url);
                return Ok(result);
            }
            Ok(_) => {}
            Err(e) => debug!("Google Cache lookup failed: {}", e),
        }

        Err(EstuaryError::Archive("No archived version found".into()))
    }

    fn is_too_old(&self, cached_date: DateTime<Utc>) -> bool {
        Utc::now() - cached_date > chrono::Duration::days(self.max_age_days)
    }

    async fn fetch_archive_today(&self, url: &str) -> Result<ArchiveResult> {
        let search_url = format!("https://archive.today/newest/{}", url);
        let response = self.client.get(&search_url).send().await?;

        if !response.status().is_success() {
            return Err(EstuaryError::Archive(format!(
                "archive.today status {}",
                response.status()
            )));
        }

        let final_url = response.url().to_string();
        let html = response.text().await?;
        let cached_date = parse_archive_today_date(&final_url);

        if let Some(date) = cached_date {
            if self.is_too_old(date) {
                return Err(EstuaryError::Archive("Cached version too old".into()));
            }
        }

        Ok(ArchiveResult {
            url: final_url,
            original_url: url.to_string(),
            html,
            source: "archive.today".into(),
            cached_date,
        })
    }

    async fn fetch_wayback(&self, url: &str) -> Result<ArchiveResult> {
        let cdx_url = format!(
            "https://web.archive.org/cdx/search/cdx?url={}&output=json&limit=1&sort=reverse",
            urlencoding::encode(url)
        );
        let response = self.client.get(&cdx_url).send().await?;
        if !response.status().is_success() {
            return Err(EstuaryError::Archive(format!(
                "CDX API status {}",
                response.status()
            )));
        }

        let data: Value = response.json().await?;
        let rows = data.as_array().filter(|rows| rows.len() >= 2).ok_or_else(|| {
            EstuaryError::Archive("No snapshots found".into())
        })?;

        // Row format: [urlkey, timestamp, original, mimetype, status, digest, length]
        let snapshot = rows[1].as_array().ok_or_else(|| {
            EstuaryError::Archive("Malformed CDX response".into())
        })?;
        let timestamp = snapshot
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| EstuaryError::Archive("Malformed CDX timestamp".into()))?;
        let original = snapshot
            .get(2)
            .and_then(Value::as_str)
            .ok_or_else(|| EstuaryError::Archive("Malformed CDX original URL".into()))?;

        let cached_date = parse_wayback_timestamp(timestamp);
        if let Some(date) = cached_date {
            if self.is_too_old(date) {
                return Err(EstuaryError::Archive("Cached version too old".into()));
            }
        }

        // The id_ variant serves the raw page with no toolbar injected.
        let archive_url = format!("https://web.archive.org/web/{}id_/{}", timestamp, original);
        let response = self.client.get(&archive_url).send().await?;
        if !response.status().is_success() {
            return Err(EstuaryError::Archive(format!(
                "Snapshot fetch status {}",
                response.status()
            )));
        }

        let html = clean_wayback_html(&response.text().await?);

        Ok(ArchiveResult {
            url: archive_url,
            original_url: url.to_string(),
            html,
            source: "wayback".into(),
            cached_date,
        })
    }

    async fn fetch_google_cache(&self, url: &str) -> Result<ArchiveResult> {
        let cache_url = format!(
            "https://webcache.googleusercontent.com/search?q=cache:{}",
            urlencoding::encode(url)
        );
        let response = self.client.get(&cache_url).send().await?;
        if !response.status().is_success() {
            return Err(EstuaryError::Archive(format!(
                "Not in cache (status {})",
                response.status()
            )));
        }

        let html = response.text().await?;
        let cached_date = parse_google_cache_date(&html);
        let html = clean_google_cache_html(&html);

        Ok(ArchiveResult {
            url: cache_url,
            original_url: url.to_string(),
            html,
            source: "google_cache".into(),
            cached_date,
        })
    }
}

/// Archive.today snapshot URLs embed the capture date:
/// `https://archive.today/2024.01.15-123456/...`
fn parse_archive_today_date(url: &str) -> Option<DateTime<Utc>> {
    let idx = url.find("archive.")?;
    let rest = &url[idx..];
    let path = rest.split('/').nth(1)?;
    let mut parts = path.splitn(3, '.');
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = parts.next()?.parse().ok()?;
    let day: u32 = parts.next()?.split('-').next()?.parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Wayback timestamps are YYYYMMDDHHmmss.
fn parse_wayback_timestamp(timestamp: &str) -> Option<DateTime<Utc>> {
    let trimmed = timestamp.get(..14)?;
    let parsed = NaiveDateTime::parse_from_str(trimmed, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&parsed))
}

/// Google Cache pages open with "... as retrieved on Jan 15, 2024 ...".
fn parse_google_cache_date(html: &str) -> Option<DateTime<Utc>> {
    let head = html.get(..2000).unwrap_or(html);
    let idx = head.find("as retrieved on ")?;
    let rest = &head[idx + "as retrieved on ".len()..];
    let date_text: String = rest.chars().take_while(|c| *c != '.' && *c != '<').collect();
    let date = NaiveDate::parse_from_str(date_text.trim(), "%b %d, %Y").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Strip any surviving Wayback toolbar markup and scripts.
fn clean_wayback_html(html: &str) -> String {
    let mut cleaned = html.to_string();
    if let (Some(start), Some(end)) = (
        cleaned.find("<!-- BEGIN WAYBACK TOOLBAR INSERT -->"),
        cleaned.find("<!-- END WAYBACK TOOLBAR INSERT -->"),
    ) {
        if end > start {
            let end = end + "<!-- END WAYBACK TOOLBAR INSERT -->".len();
            cleaned.replace_range(start..end, "");
        }
    }

    // Remove script tags sourcing web.archive.org helpers.
    loop {
        let Some(script_start) = find_archive_script(&cleaned) else {
            break;
        };
        let Some(rel_end) = cleaned[script_start..].find("</script>") else {
            break;
        };
        let end = script_start + rel_end + "</script>".len();
        cleaned.replace_range(script_start..end, "");
    }

    cleaned
}

fn find_archive_script(html: &str) -> Option<usize> {
    let mut search_from = 0;
    while let Some(rel) = html[search_from..].find("<script") {
        let start = search_from + rel;
        let tag_end = html[start..].find('>').map(|i| start + i)?;
        if html[start..tag_end].contains("web.archive.org") {
            return Some(start);
        }
        search_from = tag_end;
    }
    None
}

/// Drop Google's cache banner (a styled div followed by an <hr>).
fn clean_google_cache_html(html: &str) -> String {
    if let Some(hr_idx) = html.find("<hr") {
        let head = &html[..hr_idx];
        if head.contains("cache") {
            if let Some(close) = html[hr_idx..].find('>') {
                return html[hr_idx + close + 1..].to_string();
            }
        }
    }
    html.to_string()
}
