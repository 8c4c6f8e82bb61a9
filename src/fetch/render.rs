//! Headless-browser rendering for JavaScript-heavy pages.
//!
//! One shared Chrome instance per process, launched lazily on first use and
//! guarded by a mutex. Each request gets its own page with a desktop
//! viewport, a stealth script that hides automation markers, and request
//! blocking for trackers and fonts.

use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{BlockPattern, SetBlockedUrLsParams};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::app::{EstuaryError, Result};
use crate::fetch::DESKTOP_USER_AGENT;

const ARTICLE_SELECTORS: &str =
    "article, [role='main'], .article-content, .story-body, .post-content, main";

const BLOCKED_URL_PATTERNS: &[&str] = &[
    "*google-analytics.com*",
    "*googletagmanager.com*",
    "*facebook.net*",
    "*facebook.com/tr*",
    "*doubleclick.net*",
    "*googlesyndication.com*",
    "*adservice.google.com*",
    "*amazon-adsystem.com*",
    "*quantserve.com*",
    "*scorecardresearch.com*",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.otf",
];

/// Hides the usual automation tells before page scripts run.
const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'plugins', {
        get: () => [
            { name: 'Chrome PDF Plugin', filename: 'internal-pdf-viewer' },
            { name: 'Chrome PDF Viewer', filename: 'mhjfbmdgcfjbbpaeojofohoefgiehjai' },
            { name: 'Native Client', filename: 'internal-nacl-plugin' }
        ]
    });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    const originalQuery = window.navigator.permissions.query;
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
    window.chrome = { runtime: {}, loadTimes: function() {}, csi: function() {}, app: {} };
"#;

const WAIT_FOR_CONTENT_SCRIPT: &str = r#"
    (() => {
        const selectors = "article, [role='main'], .article-content, .story-body, .post-content, main";
        return document.querySelector(selectors) !== null;
    })()
"#;

#[derive(Debug, Clone)]
pub struct RenderResult {
    pub url: String,
    pub html: String,
    pub final_url: String,
}

pub struct JsRenderer {
    browser: Mutex<Option<Arc<Browser>>>,
    timeout: Duration,
    scroll_to_load: bool,
    max_scrolls: usize,
}

impl JsRenderer {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            browser: Mutex::new(None),
            timeout: Duration::from_millis(timeout_ms),
            scroll_to_load: true,
            max_scrolls: 3,
        }
    }

    /// Launch the browser if it is not already running, returning the shared
    /// instance. The launch itself happens at most once per process.
    async fn browser(&self) -> Result<Arc<Browser>> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(browser.clone());
        }

        let config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--window-size=1920,1080")
            .arg("--lang=en-US")
            .build()
            .map_err(|e| EstuaryError::Render(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            EstuaryError::Render(format!(
                "Failed to launch browser: {}. Is Chrome or Chromium installed and in PATH?",
                e
            ))
        })?;

        tokio::spawn(async move {
            while let Some(_event) = handler.next().await {
                // Drain browser events.
            }
        });

        let browser = Arc::new(browser);
        *guard = Some(browser.clone());
        Ok(browser)
    }

    pub async fn stop(&self) {
        let mut guard = self.browser.lock().await;
        guard.take();
    }

    /// Render a page and return the final HTML and URL.
    pub async fn render(&self, url: &str) -> Result<RenderResult> {
        let browser = self.browser().await?;

        let render = self.render_on(&browser, url);
        match tokio::time::timeout(self.timeout, render).await {
            Ok(result) => result,
            Err(_) => Err(EstuaryError::Render(format!(
                "Page load timeout for {}",
                url
            ))),
        }
    }

    async fn render_on(&self, browser: &Browser, url: &str) -> Result<RenderResult> {
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EstuaryError::Render(format!("Failed to create page: {}", e)))?;

        let result = self.drive_page(&page, url).await;
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        result
    }

    async fn drive_page(&self, page: &Page, url: &str) -> Result<RenderResult> {
        page.set_user_agent(DESKTOP_USER_AGENT)
            .await
            .map_err(|e| EstuaryError::Render(format!("Failed to set user agent: {}", e)))?;

        let blocked: Vec<BlockPattern> = BLOCKED_URL_PATTERNS
            .iter()
            .map(|p| BlockPattern::new(*p, true))
            .collect();
        if let Err(e) = page
            .execute(SetBlockedUrLsParams::builder().url_patterns(blocked).build())
            .await
        {
            debug!("Failed to install request blocking: {}", e);
        }

        page.goto(url)
            .await
            .map_err(|e| EstuaryError::Render(format!("Navigation failed: {}", e)))?;

        if let Err(e) = page.evaluate(STEALTH_SCRIPT).await {
            debug!("Stealth script failed: {}", e);
        }

        self.wait_for_article(page).await;

        if self.scroll_to_load {
            self.scroll_page(page).await;
        }
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let html = page
            .content()
            .await
            .map_err(|e| EstuaryError::Render(format!("Failed to read page content: {}", e)))?;

        let final_url = page
            .url()
            .await
            .ok()
            .flatten()
            .unwrap_or_else(|| url.to_string());

        Ok(RenderResult {
            url: url.to_string(),
            html,
            final_url,
        })
    }

    /// Poll for any of the common article containers, up to 10 seconds.
    async fn wait_for_article(&self, page: &Page) {
        for _ in 0..20 {
            match page.evaluate(WAIT_FOR_CONTENT_SCRIPT).await {
                Ok(result) => {
                    if result.into_value::<bool>().unwrap_or(false) {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Content wait probe failed: {}", e);
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        debug!("No article container appeared ({})", ARTICLE_SELECTORS);
    }

    /// A few viewport scrolls to trigger lazy loading, then back to top.
    async fn scroll_page(&self, page: &Page) {
        for _ in 0..self.max_scrolls {
            let _ = page.evaluate("window.scrollBy(0, window.innerHeight)").await;
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let _ = page.evaluate("window.scrollTo(0, 0)").await;
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_patterns_cover_trackers_and_fonts() {
        assert!(BLOCKED_URL_PATTERNS
            .iter()
            .any(|p| p.contains("google-analytics")));
        assert!(BLOCKED_URL_PATTERNS.iter().any(|p| p.ends_with(".woff2")));
    }

    #[test]
    fn test_stealth_script_overrides_webdriver() {
        assert!(STEALTH_SCRIPT.contains("navigator, 'webdriver'"));
        assert!(STEALTH_SCRIPT.contains("window.chrome"));
        assert!(STEALTH_SCRIPT.contains("permissions.query"));
    }
}
