//! Notification rules engine, evaluated inline during ingestion.
//!
//! Matching is suppressed for any article that already has a history entry
//! (at-most-once per article); when a match is recorded, a single entry is
//! written for the highest-priority matching rule.

use std::sync::Arc;

use crate::app::Result;
use crate::domain::{Article, NotificationMatch, NotificationRule};
use crate::store::SqliteStore;

pub struct NotificationEngine {
    store: Arc<SqliteStore>,
}

impl NotificationEngine {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Evaluate an article against every applicable enabled rule, sorted by
    /// priority (high first). Articles that were already notified produce no
    /// matches.
    pub fn evaluate(&self, article: &Article) -> Result<Vec<NotificationMatch>> {
        if self.store.was_notified(article.id)? {
            return Ok(Vec::new());
        }

        let rules = self.store.rules_for_feed(article.feed_id)?;
        let mut matches: Vec<NotificationMatch> = rules
            .iter()
            .filter_map(|rule| {
                check_rule(article, rule).map(|reason| NotificationMatch {
                    article_id: article.id,
                    article_title: article.title.clone(),
                    feed_id: article.feed_id,
                    rule_id: rule.id,
                    rule_name: rule.name.clone(),
                    priority: rule.priority,
                    match_reason: reason,
                })
            })
            .collect();

        matches.sort_by_key(|m| m.priority.order());
        Ok(matches)
    }

    /// Evaluate and, if anything matched, record a history entry for the
    /// best match. Returns that match.
    pub fn evaluate_and_record(&self, article: &Article) -> Result<Option<NotificationMatch>> {
        let matches = self.evaluate(article)?;
        let Some(best) = matches.into_iter().next() else {
            return Ok(None);
        };
        self.store.add_notification(best.article_id, Some(best.rule_id))?;
        Ok(Some(best))
    }
}

/// Check one rule against an article, returning the match reason.
fn check_rule(article: &Article, rule: &NotificationRule) -> Option<String> {
    if rule.feed_id.is_some_and(|feed_id| feed_id != article.feed_id) {
        return None;
    }

    // A rule with only a feed filter matches everything in that feed.
    if rule.keyword.is_none() && rule.author.is_none() {
        return rule.feed_id.map(|_| "Feed notification".to_string());
    }

    if let Some(keyword) = &rule.keyword {
        if matches_keyword(article, keyword) {
            return Some(format!("Keyword match: '{}'", keyword));
        }
    }

    if let Some(author) = &rule.author {
        if matches_author(article.author.as_deref(), author) {
            return Some(format!("Author match: '{}'", author));
        }
    }

    None
}

/// Case-insensitive substring over title, then short summary, then content.
fn matches_keyword(article: &Article, keyword: &str) -> bool {
    let keyword_lower = keyword.to_lowercase();

    if article.title.to_lowercase().contains(&keyword_lower) {
        return true;
    }
    if article
        .summary_short
        .as_deref()
        .is_some_and(|s| s.to_lowercase().contains(&keyword_lower))
    {
        return true;
    }
    article
        .content
        .as_deref()
        .is_some_and(|c| c.to_lowercase().contains(&keyword_lower))
}

fn matches_author(article_author: Option<&str>, rule_author: &str) -> bool {
    article_author
        .is_some_and(|a| a.to_lowercase().contains(&rule_author.to_lowercase()))
}
