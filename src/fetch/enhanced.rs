//! Enhanced fetcher: layers JS-render and archive fallbacks over the base
//! fetcher as an explicit state machine.
//!
//! ```text
//! Direct -> JsRender -> Archive -> Done
//! ```
//!
//! Transitions key on the outcome of each attempt (ok, insufficient,
//! paywalled, blocked, error) rather than on exceptions.

use tracing::{info, warn};

use crate::app::Result;
use crate::fetch::archive::ArchiveService;
use crate::fetch::render::JsRenderer;
use crate::fetch::{is_paywalled_domain, looks_blocked, FetchResult, Fetcher};

const JS_HEAVY_DOMAINS: &[&str] = &[
    "medium.com",
    "substack.com",
    "bloomberg.com",
    "reuters.com",
    "twitter.com",
    "x.com",
];

/// Per-call overrides for the fallback cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchPolicy {
    pub force_js: bool,
    pub force_archive: bool,
}

/// Outcome tag of a single fetch attempt, driving the state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Ok,
    Insufficient,
    Paywalled,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Direct,
    JsRender,
    Archive,
    Done,
}

pub struct EnhancedFetcher {
    fetcher: Fetcher,
    renderer: Option<JsRenderer>,
    archive: Option<ArchiveService>,
}

impl EnhancedFetcher {
    pub fn new(
        fetcher: Fetcher,
        renderer: Option<JsRenderer>,
        archive: Option<ArchiveService>,
    ) -> Self {
        Self {
            fetcher,
            renderer,
            archive,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub async fn stop(&self) {
        if let Some(renderer) = &self.renderer {
            renderer.stop().await;
        }
    }

    /// Fetch with fallbacks. Always returns the best result available;
    /// complete failure comes back as a result tagged `source = "error"`
    /// carrying the original error for diagnostics.
    pub async fn fetch(&self, url: &str, policy: FetchPolicy) -> Result<FetchResult> {
        let mut state = if policy.force_archive && self.archive.is_some() {
            State::Archive
        } else if policy.force_js && self.renderer.is_some() {
            State::JsRender
        } else {
            State::Direct
        };

        let mut best: Option<FetchResult> = None;
        let mut original_error: Option<String> = None;

        loop {
            match state {
                State::Direct => {
                    match self.try_direct(url).await {
                        (Outcome::Ok, Some(mut result), _) => {
                            result.original_error = original_error;
                            return Ok(result);
                        }
                        (Outcome::Error, _, error) => {
                            original_error = error;
                            state = self.next_after_direct(url, None, &mut original_error);
                        }
                        (outcome, Some(result), _) => {
                            original_error = Some(match outcome {
                                Outcome::Paywalled | Outcome::Blocked => {
                                    "Content appears paywalled".into()
                                }
                                _ => format!(
                                    "Insufficient content ({} chars)",
                                    result.content.len()
                                ),
                            });
                            state =
                                self.next_after_direct(url, Some(&result), &mut original_error);
                            best = Some(result);
                        }
                        (_, None, error) => {
                            original_error = error;
                            state = State::Done;
                        }
                    }
                }
                State::JsRender => {
                    match self.try_js_render(url).await {
                        (Outcome::Ok, Some(mut result)) => {
                            result.original_error = original_error;
                            return Ok(result);
                        }
                        (Outcome::Blocked, _) => {
                            info!("JS render hit bot detection for {}, trying archive", url);
                            original_error = Some("JS render blocked by bot detection".into());
                            state = self.next_after_js(url, best.as_ref());
                        }
                        (_, _) => {
                            state = self.next_after_js(url, best.as_ref());
                        }
                    }
                }
                State::Archive => {
                    if let Some(mut result) = self.try_archive(url).await {
                        result.original_error = original_error;
                        return Ok(result);
                    }
                    state = State::Done;
                }
                State::Done => break,
            }
        }

        // Nothing good: return the direct result if any, else a tagged error.
        Ok(match best {
            Some(mut result) => {
                result.original_error = original_error;
                result
            }
            None => FetchResult {
                url: url.to_string(),
                title: "Failed to fetch".into(),
                source: "error".into(),
                original_error,
                ..Default::default()
            },
        })
    }

    async fn try_direct(&self, url: &str) -> (Outcome, Option<FetchResult>, Option<String>) {
        match self.fetcher.fetch(url).await {
            Ok(result) => {
                let outcome = if result.source == "paywalled" {
                    if looks_blocked(&result.content) {
                        Outcome::Blocked
                    } else {
                        Outcome::Paywalled
                    }
                } else if !result.has_sufficient_content(self.fetcher.min_content_length()) {
                    Outcome::Insufficient
                } else {
                    Outcome::Ok
                };
                (outcome, Some(result), None)
            }
            Err(e) => {
                warn!("Primary fetch failed for {}: {}", url, e);
                (Outcome::Error, None, Some(e.to_string()))
            }
        }
    }

    fn next_after_direct(
        &self,
        url: &str,
        result: Option<&FetchResult>,
        original_error: &mut Option<String>,
    ) -> State {
        if original_error.is_none() {
            *original_error = Some("Primary fetch failed".into());
        }
        if self.renderer.is_some() && self.should_try_js(url, result) {
            return State::JsRender;
        }
        if self.archive.is_some() && self.should_try_archive(url, result) {
            return State::Archive;
        }
        State::Done
    }

    fn next_after_js(&self, url: &str, direct: Option<&FetchResult>) -> State {
        if self.archive.is_some()
            && (self.should_try_archive(url, direct)
                || direct.is_some_and(|r| looks_blocked(&r.content)))
        {
            return State::Archive;
        }
        State::Done
    }

    fn should_try_js(&self, url: &str, result: Option<&FetchResult>) -> bool {
        let url_lower = url.to_lowercase();
        if JS_HEAVY_DOMAINS.iter().any(|d| url_lower.contains(d)) {
            return true;
        }
        // A near-empty body usually means client-side rendering.
        result.is_some_and(|r| r.content.len() < 200)
    }

    fn should_try_archive(&self, url: &str, result: Option<&FetchResult>) -> bool {
        if result.is_some_and(|r| r.source == "paywalled") {
            return true;
        }
        is_paywalled_domain(url)
    }

    async fn try_js_render(&self, url: &str) -> (Outcome, Option<FetchResult>) {
        let Some(renderer) = &self.renderer else {
            return (Outcome::Error, None);
        };
        match renderer.render(url).await {
            Ok(rendered) => {
                if looks_blocked(&rendered.html) {
                    return (Outcome::Blocked, None);
                }
                let mut result = self
                    .fetcher
                    .extract_content(&rendered.final_url, &rendered.html);
                if looks_blocked(&result.content) {
                    return (Outcome::Blocked, None);
                }
                result.source = "js_render".into();
                result.fallback_used = Some("js_render".into());
                (Outcome::Ok, Some(result))
            }
            Err(e) => {
                warn!("JS render failed for {}: {}", url, e);
                (Outcome::Error, None)
            }
        }
    }

    async fn try_archive(&self, url: &str) -> Option<FetchResult> {
        let archive = self.archive.as_ref()?;
        match archive.fetch(url).await {
            Ok(archived) => {
                let mut result = self
                    .fetcher
                    .extract_content(&archived.url, &archived.html);
                result.source = "archive".into();
                result.fallback_used = Some("archive".into());
                result.archive_source = Some(archived.source);
                Some(result)
            }
            Err(e) => {
                warn!("Archive fetch failed for {}: {}", url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(fetcher_min: usize) -> EnhancedFetcher {
        EnhancedFetcher::new(Fetcher::new(30, fetcher_min).unwrap(), None, None)
    }

    #[test]
    fn test_js_heavy_domain_detection() {
        let fetcher = bare(500);
        assert!(fetcher.should_try_js("https://medium.com/@a/post", None));
        assert!(fetcher.should_try_js("https://x.com/a/status/1", None));

        let thick = FetchResult {
            content: "x".repeat(400),
            ..Default::default()
        };
        assert!(!fetcher.should_try_js("https://example.com/a", Some(&thick)));

        let thin = FetchResult {
            content: "x".repeat(50),
            ..Default::default()
        };
        assert!(fetcher.should_try_js("https://example.com/a", Some(&thin)));
    }

    #[test]
    fn test_archive_triggers() {
        let fetcher = bare(500);
        assert!(fetcher.should_try_archive("https://www.wsj.com/articles/x", None));

        let paywalled = FetchResult {
            source: "paywalled".into(),
            ..Default::default()
        };
        assert!(fetcher.should_try_archive("https://example.com/a", Some(&paywalled)));
        assert!(!fetcher.should_try_archive("https://example.com/a", None));
    }
}
