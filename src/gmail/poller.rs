//! Gmail polling loop.
//!
//! Runs as an independent periodic task. Each cycle re-reads the stored
//! configuration (so interval and enablement changes take effect), refreshes
//! the access token when needed, fetches new messages over IMAP, and
//! persists them as newsletter articles. Per-message failures are logged and
//! skipped, always advancing past the failing UID so it is never retried
//! forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use super::{imap, oauth};
use crate::app::{EstuaryError, Result};
use crate::config::Config;
use crate::domain::{GmailConfig, NewArticle};
use crate::email;
use crate::store::SqliteStore;

/// Settle time before the first poll after boot.
const STARTUP_DELAY: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Clone)]
pub struct PollStats {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct GmailPoller {
    store: Arc<SqliteStore>,
    client_id: Option<String>,
    client_secret: Option<String>,
    running: AtomicBool,
}

impl GmailPoller {
    pub fn new(store: Arc<SqliteStore>, config: &Config) -> Self {
        Self {
            store,
            client_id: config.gmail_client_id.clone(),
            client_secret: config.gmail_client_secret.clone(),
            running: AtomicBool::new(true),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Main polling loop; exits gracefully when polling is disabled or the
    /// configuration is removed.
    pub async fn run(self: Arc<Self>) {
        tokio::time::sleep(STARTUP_DELAY).await;

        while self.running.load(Ordering::SeqCst) {
            let config = match self.store.get_gmail_config() {
                Ok(Some(config)) => config,
                Ok(None) => {
                    info!("Gmail configuration removed, stopping poller");
                    return;
                }
                Err(e) => {
                    error!("Failed to read Gmail configuration: {}", e);
                    return;
                }
            };

            if !config.is_enabled {
                info!("Gmail polling disabled, stopping poller");
                return;
            }

            match self.poll_once(&config).await {
                Ok(stats) if stats.imported > 0 => {
                    info!("Gmail poll: imported {} newsletters", stats.imported);
                }
                Ok(_) => {}
                Err(e) => warn!("Gmail poll failed: {}", e),
            }

            tokio::time::sleep(Duration::from_secs(config.poll_interval_minutes.max(1) * 60))
                .await;
        }
    }

    /// One fetch cycle: token refresh if needed, IMAP fetch, import.
    pub async fn poll_once(&self, config: &GmailConfig) -> Result<PollStats> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret)
        else {
            return Err(EstuaryError::Config(
                "GMAIL_CLIENT_ID / GMAIL_CLIENT_SECRET not configured".into(),
            ));
        };

        let access_token =
            oauth::valid_access_token(&self.store, config, client_id, client_secret).await?;

        let email_address = config.email.clone();
        let label = config.monitored_label.clone();
        let since_uid = config.last_fetched_uid;
        let emails = tokio::task::spawn_blocking(move || {
            imap::fetch_since_uid(&email_address, &access_token, &label, since_uid)
        })
        .await
        .map_err(|e| EstuaryError::Imap(format!("IMAP task panicked: {}", e)))??;

        let mut stats = PollStats::default();
        let mut max_uid = config.last_fetched_uid;

        for fetched in emails {
            max_uid = max_uid.max(fetched.uid);
            match self.import_message(&fetched.raw) {
                Ok(true) => stats.imported += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    stats.failed += 1;
                    warn!("Failed to import email UID {}: {}", fetched.uid, e);
                }
            }
        }

        if max_uid > config.last_fetched_uid {
            self.store.update_gmail_last_uid(max_uid)?;
        }

        Ok(stats)
    }

    /// Parse one message and persist it under its sender's newsletter feed.
    /// Returns false for thin or duplicate messages.
    fn import_message(&self, raw: &[u8]) -> Result<bool> {
        let parsed = email::parse_eml_bytes(raw)?;

        let content = parsed.article_content();
        if content.trim().len() < 50 {
            warn!("Email '{}' has insufficient content", parsed.title());
            return Ok(false);
        }

        let date_str = parsed
            .date
            .map(|d| d.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| "unknown".into());
        let url = format!("newsletter://gmail/{}_{}", parsed.sender_email, date_str);

        let feed_id = self
            .store
            .get_or_create_newsletter_feed(&parsed.sender_email, parsed.author())?;

        let mut article =
            NewArticle::new(feed_id, url, parsed.title()).with_content(content);
        article.author = Some(parsed.author().to_string());
        article.content_type = Some("newsletter".into());
        article.published_at = parsed.date;
        article.site_name = parsed.newsletter_name.clone();

        match self.store.add_article(&article)? {
            Some(_) => {
                info!("Imported newsletter: {}", parsed.title());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poller() -> GmailPoller {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let config = Config {
            db_path: "articles.db".into(),
            cache_dir: "cache".into(),
            uploads_dir: "uploads".into(),
            max_upload_size_mb: 25,
            anthropic_api_key: None,
            openai_api_key: None,
            google_api_key: None,
            llm_provider: None,
            llm_model: None,
            exa_api_key: None,
            enable_related_links: false,
            enable_js_render: false,
            enable_archive: false,
            js_render_timeout_ms: 30_000,
            archive_max_age_days: 30,
            gmail_client_id: Some("id".into()),
            gmail_client_secret: Some("secret".into()),
        };
        GmailPoller::new(store, &config)
    }

    const EML: &[u8] = b"From: Weekly <weekly@example.com>\r\n\
        Subject: Issue 12\r\n\
        Date: Tue, 14 Jan 2025 12:00:00 +0000\r\n\
        Content-Type: text/html; charset=utf-8\r\n\r\n\
        <html><body><p>A full issue body with enough text to import \
        and read comfortably on any device.</p></body></html>\r\n";

    #[test]
    fn test_import_creates_newsletter_feed_and_article() {
        let poller = poller();
        assert!(poller.import_message(EML).unwrap());

        let feed = poller
            .store
            .get_feed_by_url("newsletter://weekly@example.com")
            .unwrap()
            .unwrap();
        assert!(feed.is_newsletter());
        assert_eq!(feed.category.as_deref(), Some("Newsletters"));

        let article = poller
            .store
            .get_article_by_url("newsletter://gmail/weekly@example.com_20250114120000")
            .unwrap()
            .unwrap();
        assert_eq!(article.content_type.as_deref(), Some("newsletter"));
    }

    #[test]
    fn test_duplicate_message_skipped() {
        let poller = poller();
        assert!(poller.import_message(EML).unwrap());
        assert!(!poller.import_message(EML).unwrap());
    }

    #[test]
    fn test_thin_message_skipped() {
        let poller = poller();
        let eml = b"From: a@example.com\r\nSubject: Hi\r\n\
            Content-Type: text/plain\r\n\r\nshort\r\n";
        assert!(!poller.import_message(eml).unwrap());
    }
}
