//! SQLite persistence layer.
//!
//! Single authoritative home for feeds, articles, per-user state, settings,
//! notification rules and history, Gmail configuration, and topic history.
//! A full-text index over article text is kept in lockstep with article
//! mutations by triggers created in the initial migration.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};
use serde_json::Value;

use crate::app::{EstuaryError, Result};
use crate::domain::{
    Article, ArticleFilter, Feed, FeedUpdate, GmailConfig, NewArticle, NotificationHistoryEntry,
    NotificationRule, Priority, TopicEntry, UserArticleState, UserStats, NEWSLETTER_SCHEME,
    STANDALONE_FEED_URL,
};

const ARTICLE_COLUMNS: &str = "id, feed_id, user_id, url, source_url, title, author, content, \
     content_hash, summary_short, summary_full, key_points, model_used, summarized_at, \
     is_read, read_at, is_bookmarked, bookmarked_at, content_type, file_name, file_path, \
     reading_time_minutes, word_count, featured_image, has_code_blocks, code_languages, \
     site_name, categories, is_paywalled, extractor_used, extracted_keywords, related_links, \
     published_at, created_at";

/// Partial notification-rule update; `clear_*` wins over the value field.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub feed_id: Option<i64>,
    pub clear_feed: bool,
    pub keyword: Option<String>,
    pub clear_keyword: bool,
    pub author: Option<String>,
    pub clear_author: bool,
    pub priority: Option<Priority>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ArticleStats {
    pub total: i64,
    pub unread: i64,
    pub bookmarked: i64,
    pub last_week: i64,
    pub last_month: i64,
    pub older_than_month: i64,
    pub oldest: Option<DateTime<Utc>>,
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.lock()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| EstuaryError::Other(format!("Migration failed: {}", e)))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| EstuaryError::Other(format!("Store lock poisoned: {}", e)))
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn get_datetime(row: &Row, col: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
        Ok(row
            .get::<_, Option<String>>(col)?
            .and_then(|s| Self::parse_datetime(&s)))
    }

    fn get_json_list<T: serde::de::DeserializeOwned>(
        row: &Row,
        col: &str,
    ) -> rusqlite::Result<Vec<T>> {
        Ok(row
            .get::<_, Option<String>>(col)?
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default())
    }

    fn row_to_feed(row: &Row, unread_count: i64) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get("id")?,
            url: row.get("url")?,
            name: row.get("name")?,
            category: row.get("category")?,
            last_fetched: Self::get_datetime(row, "last_fetched")?,
            fetch_error: row.get("fetch_error")?,
            created_at: Self::get_datetime(row, "created_at")?.unwrap_or_else(Utc::now),
            unread_count,
        })
    }

    fn row_to_article(row: &Row) -> rusqlite::Result<Article> {
        Ok(Article {
            id: row.get("id")?,
            feed_id: row.get("feed_id")?,
            user_id: row.get("user_id")?,
            url: row.get("url")?,
            source_url: row.get("source_url")?,
            title: row.get("title")?,
            author: row.get("author")?,
            content: row.get("content")?,
            content_hash: row.get("content_hash")?,
            summary_short: row.get("summary_short")?,
            summary_full: row.get("summary_full")?,
            key_points: Self::get_json_list(row, "key_points")?,
            model_used: row.get("model_used")?,
            summarized_at: Self::get_datetime(row, "summarized_at")?,
            is_read: row.get("is_read")?,
            read_at: Self::get_datetime(row, "read_at")?,
            is_bookmarked: row.get("is_bookmarked")?,
            bookmarked_at: Self::get_datetime(row, "bookmarked_at")?,
            content_type: row.get("content_type")?,
            file_name: row.get("file_name")?,
            file_path: row.get("file_path")?,
            reading_time_minutes: row.get("reading_time_minutes")?,
            word_count: row.get("word_count")?,
            featured_image: row.get("featured_image")?,
            has_code_blocks: row.get("has_code_blocks")?,
            code_languages: Self::get_json_list(row, "code_languages")?,
            site_name: row.get("site_name")?,
            categories: Self::get_json_list(row, "categories")?,
            is_paywalled: row.get("is_paywalled")?,
            extractor_used: row.get("extractor_used")?,
            extracted_keywords: Self::get_json_list(row, "extracted_keywords")?,
            related_links: row
                .get::<_, Option<String>>("related_links")?
                .and_then(|s| serde_json::from_str(&s).ok()),
            published_at: Self::get_datetime(row, "published_at")?,
            created_at: Self::get_datetime(row, "created_at")?.unwrap_or_else(Utc::now),
        })
    }

    // --- Feeds ---

    pub fn add_feed(&self, url: &str, name: &str, category: Option<&str>) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO feeds (url, name, category) VALUES (?1, ?2, ?3)",
            params![url, name, category],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_feed(&self, id: i64, user_id: Option<i64>) -> Result<Option<Feed>> {
        let conn = self.lock()?;
        let feed = conn
            .query_row("SELECT * FROM feeds WHERE id = ?1", params![id], |row| {
                Self::row_to_feed(row, 0)
            })
            .optional()?;

        let Some(mut feed) = feed else {
            return Ok(None);
        };
        drop(conn);
        feed.unread_count = self.unread_count(user_id, Some(id))?;
        Ok(Some(feed))
    }

    pub fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>> {
        let conn = self.lock()?;
        let feed = conn
            .query_row("SELECT * FROM feeds WHERE url = ?1", params![url], |row| {
                Self::row_to_feed(row, 0)
            })
            .optional()?;
        Ok(feed)
    }

    /// List every feed, including the standalone and newsletter pseudo-feeds.
    /// Unread counts are per-user when a user id is supplied, otherwise they
    /// count every article (no state rows means everything is unread).
    pub fn list_feeds(&self, user_id: Option<i64>) -> Result<Vec<Feed>> {
        let conn = self.lock()?;
        let mut feeds = match user_id {
            Some(uid) => {
                let mut stmt = conn.prepare(
                    "SELECT f.*,
                            COUNT(CASE WHEN a.id IS NOT NULL
                                        AND COALESCE(s.is_read, 0) = 0 THEN 1 END) AS unread
                     FROM feeds f
                     LEFT JOIN articles a ON a.feed_id = f.id
                     LEFT JOIN user_article_state s
                            ON s.article_id = a.id AND s.user_id = ?1
                     GROUP BY f.id
                     ORDER BY f.name",
                )?;
                let rows = stmt
                    .query_map(params![uid], |row| {
                        let unread: i64 = row.get("unread")?;
                        Self::row_to_feed(row, unread)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT f.*, COUNT(a.id) AS unread
                     FROM feeds f
                     LEFT JOIN articles a ON a.feed_id = f.id
                     GROUP BY f.id
                     ORDER BY f.name",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        let unread: i64 = row.get("unread")?;
                        Self::row_to_feed(row, unread)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                rows
            }
        };
        feeds.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(feeds)
    }

    pub fn update_feed(&self, id: i64, update: &FeedUpdate) -> Result<()> {
        let conn = self.lock()?;
        if let Some(ref name) = update.name {
            conn.execute("UPDATE feeds SET name = ?1 WHERE id = ?2", params![name, id])?;
        }
        if update.clear_category {
            conn.execute("UPDATE feeds SET category = NULL WHERE id = ?1", params![id])?;
        } else if let Some(ref category) = update.category {
            conn.execute(
                "UPDATE feeds SET category = ?1 WHERE id = ?2",
                params![category, id],
            )?;
        }
        Ok(())
    }

    /// Record the outcome of a refresh attempt on the feed row.
    pub fn update_feed_fetched(&self, id: i64, error: Option<&str>) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE feeds SET last_fetched = ?1, fetch_error = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), error, id],
        )?;
        Ok(())
    }

    pub fn delete_feed(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM feeds WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn bulk_delete_feeds(&self, ids: &[i64], preserve_newsletters: bool) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.lock()?;
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = if preserve_newsletters {
            format!(
                "DELETE FROM feeds WHERE id IN ({}) AND url NOT LIKE '{}%'",
                placeholders, NEWSLETTER_SCHEME
            )
        } else {
            format!("DELETE FROM feeds WHERE id IN ({})", placeholders)
        };
        conn.execute(&sql, rusqlite::params_from_iter(ids.iter()))?;
        Ok(())
    }

    /// Each newsletter sender gets its own feed keyed by email address.
    pub fn get_or_create_newsletter_feed(
        &self,
        sender_email: &str,
        display_name: &str,
    ) -> Result<i64> {
        let feed_url = format!("{}{}", NEWSLETTER_SCHEME, sender_email);
        let conn = self.lock()?;
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM feeds WHERE url = ?1",
                params![feed_url],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
        {
            return Ok(id);
        }
        let name = if display_name.is_empty() {
            sender_email
        } else {
            display_name
        };
        conn.execute(
            "INSERT INTO feeds (url, name, category) VALUES (?1, ?2, 'Newsletters')",
            params![feed_url, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_or_create_standalone_feed(&self) -> Result<i64> {
        let conn = self.lock()?;
        if let Some(id) = conn
            .query_row(
                "SELECT id FROM feeds WHERE url = ?1",
                params![STANDALONE_FEED_URL],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
        {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO feeds (url, name) VALUES (?1, 'Library')",
            params![STANDALONE_FEED_URL],
        )?;
        Ok(conn.last_insert_rowid())
    }

    // --- Articles ---

    /// Insert an article. Returns `None` when the URL already exists so
    /// ingestion can skip quietly; every other failure is surfaced.
    pub fn add_article(&self, article: &NewArticle) -> Result<Option<i64>> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO articles
             (feed_id, user_id, url, source_url, title, author, content, content_hash,
              content_type, file_name, file_path, reading_time_minutes, word_count,
              featured_image, has_code_blocks, code_languages, site_name, categories,
              is_paywalled, extractor_used, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
                     ?17, ?18, ?19, ?20, ?21)",
            params![
                article.feed_id,
                article.user_id,
                article.url,
                article.source_url,
                article.title,
                article.author,
                article.content,
                article.content_hash,
                article.content_type,
                article.file_name,
                article.file_path,
                article.reading_time_minutes,
                article.word_count,
                article.featured_image,
                article.has_code_blocks,
                serde_json::to_string(&article.code_languages)?,
                article.site_name,
                serde_json::to_string(&article.categories)?,
                article.is_paywalled,
                article.extractor_used,
                article.published_at.map(|dt| dt.to_rfc3339()),
            ],
        );

        match result {
            Ok(_) => Ok(Some(conn.last_insert_rowid())),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_article(&self, id: i64) -> Result<Option<Article>> {
        let conn = self.lock()?;
        let article = conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE id = ?1", ARTICLE_COLUMNS),
                params![id],
                Self::row_to_article,
            )
            .optional()?;
        Ok(article)
    }

    pub fn get_article_by_url(&self, url: &str) -> Result<Option<Article>> {
        let conn = self.lock()?;
        let article = conn
            .query_row(
                &format!("SELECT {} FROM articles WHERE url = ?1", ARTICLE_COLUMNS),
                params![url],
                Self::row_to_article,
            )
            .optional()?;
        Ok(article)
    }

    pub fn delete_article(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM articles WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn update_article_content(&self, id: i64, content: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE articles SET content = ?1, content_hash = ?2 WHERE id = ?3",
            params![content, Article::hash_content(content), id],
        )?;
        Ok(())
    }

    pub fn update_article_source_url(&self, id: i64, source_url: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE articles SET source_url = ?1 WHERE id = ?2",
            params![source_url, id],
        )?;
        Ok(())
    }

    pub fn update_summary(
        &self,
        id: i64,
        summary_short: &str,
        summary_full: &str,
        key_points: &[String],
        model_used: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE articles SET summary_short = ?1, summary_full = ?2, key_points = ?3,
             model_used = ?4, summarized_at = ?5 WHERE id = ?6",
            params![
                summary_short,
                summary_full,
                serde_json::to_string(key_points)?,
                model_used,
                Utc::now().to_rfc3339(),
                id
            ],
        )?;
        Ok(())
    }

    pub fn update_related_links(
        &self,
        id: i64,
        related_links: &Value,
        keywords: Option<&[String]>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE articles SET related_links = ?1 WHERE id = ?2",
            params![serde_json::to_string(related_links)?, id],
        )?;
        if let Some(keywords) = keywords {
            conn.execute(
                "UPDATE articles SET extracted_keywords = ?1 WHERE id = ?2",
                params![serde_json::to_string(keywords)?, id],
            )?;
        }
        Ok(())
    }

    /// Full-text search over title, content, and full summary.
    pub fn search_articles(&self, query: &str, limit: i64) -> Result<Vec<Article>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM articles a
             JOIN articles_fts fts ON a.id = fts.rowid
             WHERE articles_fts MATCH ?1
             ORDER BY rank
             LIMIT ?2",
            ARTICLE_COLUMNS
                .split(", ")
                .map(|c| format!("a.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        ))?;
        let articles = stmt
            .query_map(params![query, limit], Self::row_to_article)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    pub fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<Article>> {
        let mut sql = format!("SELECT {} FROM articles WHERE 1=1", ARTICLE_COLUMNS);
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(feed_id) = filter.feed_id {
            sql.push_str(" AND feed_id = ?");
            bound.push(Box::new(feed_id));
        }
        if let Some(user_id) = filter.user_id {
            sql.push_str(" AND (user_id IS NULL OR user_id = ?)");
            bound.push(Box::new(user_id));
        }
        if filter.unread_only {
            sql.push_str(" AND is_read = 0");
        }
        if filter.bookmarked_only {
            sql.push_str(" AND is_bookmarked = 1");
        }
        match filter.summarized {
            Some(true) => sql.push_str(" AND summary_full IS NOT NULL"),
            Some(false) => sql.push_str(" AND summary_full IS NULL"),
            None => {}
        }
        if let Some(ref content_type) = filter.content_type {
            sql.push_str(" AND content_type = ?");
            bound.push(Box::new(content_type.clone()));
        }

        sql.push_str(" ORDER BY published_at DESC NULLS LAST, created_at DESC LIMIT ? OFFSET ?");
        bound.push(Box::new(filter.limit.unwrap_or(50)));
        bound.push(Box::new(filter.offset));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let articles = stmt
            .query_map(
                rusqlite::params_from_iter(bound.iter().map(|b| b.as_ref())),
                Self::row_to_article,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(articles)
    }

    /// Articles grouped by publication date (YYYY-MM-DD), newest first.
    pub fn group_by_date(&self, filter: &ArticleFilter) -> Result<BTreeMap<String, Vec<Article>>> {
        let articles = self.list_articles(filter)?;
        let mut grouped: BTreeMap<String, Vec<Article>> = BTreeMap::new();
        for article in articles {
            let key = article.effective_date().format("%Y-%m-%d").to_string();
            grouped.entry(key).or_default().push(article);
        }
        Ok(grouped)
    }

    pub fn group_by_feed(&self, filter: &ArticleFilter) -> Result<BTreeMap<i64, Vec<Article>>> {
        let articles = self.list_articles(filter)?;
        let mut grouped: BTreeMap<i64, Vec<Article>> = BTreeMap::new();
        for article in articles {
            grouped.entry(article.feed_id).or_default().push(article);
        }
        Ok(grouped)
    }

    /// IDs of hideable duplicates: for each shared content hash, every
    /// article except the earliest (by published-at, then created-at).
    pub fn get_duplicate_ids(&self) -> Result<HashSet<i64>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT content_hash FROM articles
             WHERE content_hash IS NOT NULL AND content_hash != ''
             GROUP BY content_hash HAVING COUNT(*) > 1",
        )?;
        let hashes = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut hidden = HashSet::new();
        for hash in hashes {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM articles WHERE content_hash = ?1",
                ARTICLE_COLUMNS
            ))?;
            let mut articles = stmt
                .query_map(params![hash], Self::row_to_article)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            articles.sort_by_key(|a| a.effective_date());
            for article in articles.into_iter().skip(1) {
                hidden.insert(article.id);
            }
        }
        Ok(hidden)
    }

    /// Delete articles older than `days`. Returns the number deleted.
    pub fn archive_older_than(
        &self,
        days: i64,
        keep_bookmarked: bool,
        keep_unread: bool,
    ) -> Result<usize> {
        let cutoff = (Utc::now() - Duration::days(days)).to_rfc3339();
        let mut sql = String::from(
            "DELETE FROM articles
             WHERE (published_at < ?1 OR (published_at IS NULL AND created_at < ?1))",
        );
        if keep_bookmarked {
            sql.push_str(" AND is_bookmarked = 0");
        }
        if keep_unread {
            sql.push_str(" AND is_read = 1");
        }
        let conn = self.lock()?;
        let deleted = conn.execute(&sql, params![cutoff])?;
        Ok(deleted)
    }

    pub fn article_stats(&self) -> Result<ArticleStats> {
        let now = Utc::now();
        let week_ago = (now - Duration::days(7)).to_rfc3339();
        let month_ago = (now - Duration::days(30)).to_rfc3339();

        let conn = self.lock()?;
        let count = |sql: &str, p: &[&dyn rusqlite::ToSql]| -> Result<i64> {
            Ok(conn.query_row(sql, p, |row| row.get(0))?)
        };

        Ok(ArticleStats {
            total: count("SELECT COUNT(*) FROM articles", &[])?,
            unread: count("SELECT COUNT(*) FROM articles WHERE is_read = 0", &[])?,
            bookmarked: count("SELECT COUNT(*) FROM articles WHERE is_bookmarked = 1", &[])?,
            last_week: count(
                "SELECT COUNT(*) FROM articles
                 WHERE COALESCE(published_at, created_at) >= ?1",
                &[&week_ago],
            )?,
            last_month: count(
                "SELECT COUNT(*) FROM articles
                 WHERE COALESCE(published_at, created_at) >= ?1
                   AND COALESCE(published_at, created_at) < ?2",
                &[&month_ago, &week_ago],
            )?,
            older_than_month: count(
                "SELECT COUNT(*) FROM articles
                 WHERE COALESCE(published_at, created_at) < ?1",
                &[&month_ago],
            )?,
            oldest: conn
                .query_row(
                    "SELECT MIN(COALESCE(published_at, created_at)) FROM articles",
                    [],
                    |row| row.get::<_, Option<String>>(0),
                )?
                .and_then(|s| Self::parse_datetime(&s)),
        })
    }

    /// Legacy single-user flag; multi-user deployments use the per-user
    /// state relation instead.
    pub fn mark_article_read(&self, id: i64, is_read: bool) -> Result<()> {
        let read_at = is_read.then(|| Utc::now().to_rfc3339());
        let conn = self.lock()?;
        conn.execute(
            "UPDATE articles SET is_read = ?1, read_at = ?2 WHERE id = ?3",
            params![is_read, read_at, id],
        )?;
        Ok(())
    }

    /// Legacy single-user flag; returns the new bookmark state.
    pub fn toggle_article_bookmark(&self, id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let current: bool = conn
            .query_row(
                "SELECT is_bookmarked FROM articles WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(false);
        let new_status = !current;
        let bookmarked_at = new_status.then(|| Utc::now().to_rfc3339());
        conn.execute(
            "UPDATE articles SET is_bookmarked = ?1, bookmarked_at = ?2 WHERE id = ?3",
            params![new_status, bookmarked_at, id],
        )?;
        Ok(new_status)
    }

    // --- Per-user state ---

    pub fn get_state(&self, user_id: i64, article_id: i64) -> Result<Option<UserArticleState>> {
        let conn = self.lock()?;
        let state = conn
            .query_row(
                "SELECT user_id, article_id, is_read, read_at, is_bookmarked, bookmarked_at
                 FROM user_article_state WHERE user_id = ?1 AND article_id = ?2",
                params![user_id, article_id],
                |row| {
                    Ok(UserArticleState {
                        user_id: row.get("user_id")?,
                        article_id: row.get("article_id")?,
                        is_read: row.get("is_read")?,
                        read_at: Self::get_datetime(row, "read_at")?,
                        is_bookmarked: row.get("is_bookmarked")?,
                        bookmarked_at: Self::get_datetime(row, "bookmarked_at")?,
                    })
                },
            )
            .optional()?;
        Ok(state)
    }

    pub fn mark_read(&self, user_id: i64, article_id: i64, is_read: bool) -> Result<()> {
        let read_at = is_read.then(|| Utc::now().to_rfc3339());
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_article_state (user_id, article_id, is_read, read_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, article_id) DO UPDATE SET
                 is_read = excluded.is_read, read_at = excluded.read_at",
            params![user_id, article_id, is_read, read_at],
        )?;
        Ok(())
    }

    pub fn mark_read_many(&self, user_id: i64, article_ids: &[i64], is_read: bool) -> Result<()> {
        if article_ids.is_empty() {
            return Ok(());
        }
        let read_at = is_read.then(|| Utc::now().to_rfc3339());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for article_id in article_ids {
            tx.execute(
                "INSERT INTO user_article_state (user_id, article_id, is_read, read_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, article_id) DO UPDATE SET
                     is_read = excluded.is_read, read_at = excluded.read_at",
                params![user_id, article_id, is_read, read_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn mark_feed_read(&self, user_id: i64, feed_id: i64, is_read: bool) -> Result<usize> {
        let read_at = is_read.then(|| Utc::now().to_rfc3339());
        let conn = self.lock()?;
        let updated = conn.execute(
            "INSERT INTO user_article_state (user_id, article_id, is_read, read_at)
             SELECT ?1, id, ?2, ?3 FROM articles WHERE feed_id = ?4
             ON CONFLICT(user_id, article_id) DO UPDATE SET
                 is_read = excluded.is_read, read_at = excluded.read_at",
            params![user_id, is_read, read_at, feed_id],
        )?;
        Ok(updated)
    }

    /// Mark every shared article read/unread for a user. Library items are
    /// owned rows and are left alone.
    pub fn mark_all_read(&self, user_id: i64, is_read: bool) -> Result<usize> {
        let read_at = is_read.then(|| Utc::now().to_rfc3339());
        let conn = self.lock()?;
        let updated = conn.execute(
            "INSERT INTO user_article_state (user_id, article_id, is_read, read_at)
             SELECT ?1, id, ?2, ?3 FROM articles WHERE user_id IS NULL
             ON CONFLICT(user_id, article_id) DO UPDATE SET
                 is_read = excluded.is_read, read_at = excluded.read_at",
            params![user_id, is_read, read_at],
        )?;
        Ok(updated)
    }

    pub fn toggle_bookmark(&self, user_id: i64, article_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let current: bool = conn
            .query_row(
                "SELECT is_bookmarked FROM user_article_state
                 WHERE user_id = ?1 AND article_id = ?2",
                params![user_id, article_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(false);

        let new_status = !current;
        let bookmarked_at = new_status.then(|| Utc::now().to_rfc3339());
        conn.execute(
            "INSERT INTO user_article_state (user_id, article_id, is_bookmarked, bookmarked_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, article_id) DO UPDATE SET
                 is_bookmarked = excluded.is_bookmarked,
                 bookmarked_at = excluded.bookmarked_at",
            params![user_id, article_id, new_status, bookmarked_at],
        )?;
        Ok(new_status)
    }

    /// Unread count over shared articles, per-user when one is supplied.
    /// Articles without a state row count as unread.
    pub fn unread_count(&self, user_id: Option<i64>, feed_id: Option<i64>) -> Result<i64> {
        let conn = self.lock()?;
        let count = match (user_id, feed_id) {
            (Some(uid), Some(fid)) => conn.query_row(
                "SELECT COUNT(*) FROM articles a
                 LEFT JOIN user_article_state s
                        ON s.article_id = a.id AND s.user_id = ?1
                 WHERE a.feed_id = ?2 AND a.user_id IS NULL
                   AND COALESCE(s.is_read, 0) = 0",
                params![uid, fid],
                |row| row.get(0),
            )?,
            (Some(uid), None) => conn.query_row(
                "SELECT COUNT(*) FROM articles a
                 LEFT JOIN user_article_state s
                        ON s.article_id = a.id AND s.user_id = ?1
                 WHERE a.user_id IS NULL AND COALESCE(s.is_read, 0) = 0",
                params![uid],
                |row| row.get(0),
            )?,
            (None, Some(fid)) => conn.query_row(
                "SELECT COUNT(*) FROM articles WHERE feed_id = ?1 AND is_read = 0",
                params![fid],
                |row| row.get(0),
            )?,
            (None, None) => conn.query_row(
                "SELECT COUNT(*) FROM articles WHERE is_read = 0",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    pub fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        let conn = self.lock()?;
        let read_count = conn.query_row(
            "SELECT COUNT(*) FROM user_article_state WHERE user_id = ?1 AND is_read = 1",
            params![user_id],
            |row| row.get(0),
        )?;
        let bookmarked_count = conn.query_row(
            "SELECT COUNT(*) FROM user_article_state WHERE user_id = ?1 AND is_bookmarked = 1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(UserStats {
            read_count,
            bookmarked_count,
        })
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn all_settings(&self) -> Result<Vec<(String, String)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let settings = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(settings)
    }

    // --- Notification rules and history ---

    pub fn add_rule(
        &self,
        name: &str,
        feed_id: Option<i64>,
        keyword: Option<&str>,
        author: Option<&str>,
        priority: Priority,
    ) -> Result<i64> {
        if feed_id.is_none() && keyword.is_none() && author.is_none() {
            return Err(EstuaryError::Config(
                "Notification rule must have at least one filter".into(),
            ));
        }
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notification_rules (name, feed_id, keyword, author, priority, enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![name, feed_id, keyword, author, priority.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn row_to_rule(row: &Row) -> rusqlite::Result<NotificationRule> {
        Ok(NotificationRule {
            id: row.get("id")?,
            name: row.get("name")?,
            feed_id: row.get("feed_id")?,
            keyword: row.get("keyword")?,
            author: row.get("author")?,
            priority: Priority::from_str(&row.get::<_, String>("priority")?),
            enabled: row.get("enabled")?,
            created_at: Self::get_datetime(row, "created_at")?.unwrap_or_else(Utc::now),
        })
    }

    pub fn get_rule(&self, id: i64) -> Result<Option<NotificationRule>> {
        let conn = self.lock()?;
        let rule = conn
            .query_row(
                "SELECT * FROM notification_rules WHERE id = ?1",
                params![id],
                Self::row_to_rule,
            )
            .optional()?;
        Ok(rule)
    }

    pub fn list_rules(&self, enabled_only: bool) -> Result<Vec<NotificationRule>> {
        let conn = self.lock()?;
        let sql = if enabled_only {
            "SELECT * FROM notification_rules WHERE enabled = 1 ORDER BY created_at DESC"
        } else {
            "SELECT * FROM notification_rules ORDER BY created_at DESC"
        };
        let mut stmt = conn.prepare(sql)?;
        let rules = stmt
            .query_map([], Self::row_to_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Enabled rules applicable to a feed: global rules plus feed-scoped ones.
    pub fn rules_for_feed(&self, feed_id: i64) -> Result<Vec<NotificationRule>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM notification_rules
             WHERE enabled = 1 AND (feed_id IS NULL OR feed_id = ?1)
             ORDER BY created_at DESC",
        )?;
        let rules = stmt
            .query_map(params![feed_id], Self::row_to_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    pub fn update_rule(&self, id: i64, update: &RuleUpdate) -> Result<()> {
        let conn = self.lock()?;
        if let Some(ref name) = update.name {
            conn.execute(
                "UPDATE notification_rules SET name = ?1 WHERE id = ?2",
                params![name, id],
            )?;
        }
        if update.clear_feed {
            conn.execute(
                "UPDATE notification_rules SET feed_id = NULL WHERE id = ?1",
                params![id],
            )?;
        } else if let Some(feed_id) = update.feed_id {
            conn.execute(
                "UPDATE notification_rules SET feed_id = ?1 WHERE id = ?2",
                params![feed_id, id],
            )?;
        }
        if update.clear_keyword {
            conn.execute(
                "UPDATE notification_rules SET keyword = NULL WHERE id = ?1",
                params![id],
            )?;
        } else if let Some(ref keyword) = update.keyword {
            conn.execute(
                "UPDATE notification_rules SET keyword = ?1 WHERE id = ?2",
                params![keyword, id],
            )?;
        }
        if update.clear_author {
            conn.execute(
                "UPDATE notification_rules SET author = NULL WHERE id = ?1",
                params![id],
            )?;
        } else if let Some(ref author) = update.author {
            conn.execute(
                "UPDATE notification_rules SET author = ?1 WHERE id = ?2",
                params![author, id],
            )?;
        }
        if let Some(priority) = update.priority {
            conn.execute(
                "UPDATE notification_rules SET priority = ?1 WHERE id = ?2",
                params![priority.as_str(), id],
            )?;
        }
        if let Some(enabled) = update.enabled {
            conn.execute(
                "UPDATE notification_rules SET enabled = ?1 WHERE id = ?2",
                params![enabled, id],
            )?;
        }
        Ok(())
    }

    pub fn set_rule_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notification_rules SET enabled = ?1 WHERE id = ?2",
            params![enabled, id],
        )?;
        Ok(())
    }

    pub fn delete_rule(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM notification_rules WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// At-most-once check: has any rule ever fired for this article?
    pub fn was_notified(&self, article_id: i64) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification_history WHERE article_id = ?1",
            params![article_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn add_notification(&self, article_id: i64, rule_id: Option<i64>) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notification_history (article_id, rule_id) VALUES (?1, ?2)",
            params![article_id, rule_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_notifications(
        &self,
        limit: i64,
        include_dismissed: bool,
    ) -> Result<Vec<NotificationHistoryEntry>> {
        let conn = self.lock()?;
        let sql = if include_dismissed {
            "SELECT * FROM notification_history ORDER BY notified_at DESC LIMIT ?1"
        } else {
            "SELECT * FROM notification_history WHERE dismissed = 0
             ORDER BY notified_at DESC LIMIT ?1"
        };
        let mut stmt = conn.prepare(sql)?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(NotificationHistoryEntry {
                    id: row.get("id")?,
                    article_id: row.get("article_id")?,
                    rule_id: row.get("rule_id")?,
                    notified_at: Self::get_datetime(row, "notified_at")?.unwrap_or_else(Utc::now),
                    dismissed: row.get("dismissed")?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn dismiss_notification(&self, id: i64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE notification_history SET dismissed = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    // --- Gmail configuration ---

    pub fn save_gmail_config(&self, config: &GmailConfig) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM gmail_config", [])?;
        conn.execute(
            "INSERT INTO gmail_config
             (email, access_token, refresh_token, token_expires_at, monitored_label,
              last_fetched_uid, poll_interval_minutes, is_enabled)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config.email,
                config.access_token,
                config.refresh_token,
                config.token_expires_at.to_rfc3339(),
                config.monitored_label,
                config.last_fetched_uid,
                config.poll_interval_minutes as i64,
                config.is_enabled,
            ],
        )?;
        Ok(())
    }

    pub fn get_gmail_config(&self) -> Result<Option<GmailConfig>> {
        let conn = self.lock()?;
        let config = conn
            .query_row("SELECT * FROM gmail_config LIMIT 1", [], |row| {
                Ok(GmailConfig {
                    email: row.get("email")?,
                    access_token: row.get("access_token")?,
                    refresh_token: row.get("refresh_token")?,
                    token_expires_at: Self::get_datetime(row, "token_expires_at")?
                        .unwrap_or_else(Utc::now),
                    monitored_label: row.get("monitored_label")?,
                    last_fetched_uid: row.get::<_, i64>("last_fetched_uid")? as u32,
                    poll_interval_minutes: row.get::<_, i64>("poll_interval_minutes")? as u64,
                    is_enabled: row.get("is_enabled")?,
                })
            })
            .optional()?;
        Ok(config)
    }

    pub fn update_gmail_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE gmail_config SET access_token = ?1, refresh_token = ?2,
             token_expires_at = ?3, updated_at = ?4",
            params![
                access_token,
                refresh_token,
                expires_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn update_gmail_last_uid(&self, uid: u32) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE gmail_config SET last_fetched_uid = ?1, updated_at = ?2",
            params![uid, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn delete_gmail_config(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM gmail_config", [])?;
        Ok(())
    }

    // --- Topic history ---

    pub fn add_topic_entry(
        &self,
        label: &str,
        article_ids: &[i64],
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO topic_history
             (topic_label, topic_hash, article_count, article_ids, period_start, period_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                label,
                TopicEntry::hash_label(label),
                article_ids.len() as i64,
                serde_json::to_string(article_ids)?,
                period_start.to_rfc3339(),
                period_end.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Clustering runs recorded since the given instant, newest first.
    pub fn topic_trends(&self, since: DateTime<Utc>) -> Result<Vec<TopicEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM topic_history WHERE clustered_at >= ?1
             ORDER BY clustered_at DESC",
        )?;
        let entries = stmt
            .query_map(params![since.to_rfc3339()], |row| {
                Ok(TopicEntry {
                    id: row.get("id")?,
                    topic_label: row.get("topic_label")?,
                    topic_hash: row.get("topic_hash")?,
                    article_count: row.get("article_count")?,
                    article_ids: Self::get_json_list(row, "article_ids")?,
                    clustered_at: Self::get_datetime(row, "clustered_at")?
                        .unwrap_or_else(Utc::now),
                    period_start: Self::get_datetime(row, "period_start")?
                        .unwrap_or_else(Utc::now),
                    period_end: Self::get_datetime(row, "period_end")?.unwrap_or_else(Utc::now),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_feed() -> (SqliteStore, i64) {
        let store = SqliteStore::in_memory().unwrap();
        let feed_id = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();
        (store, feed_id)
    }

    #[test]
    fn test_add_and_get_feed() {
        let (store, feed_id) = store_with_feed();
        let feed = store.get_feed(feed_id, None).unwrap().unwrap();
        assert_eq!(feed.url, "https://example.com/feed.xml");
        assert_eq!(feed.name, "Example");
    }

    #[test]
    fn test_duplicate_article_returns_none() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/a", "Hello")
            .with_content("some body text");

        let first = store.add_article(&article).unwrap();
        assert!(first.is_some());

        let second = store.add_article(&article).unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_fts_search_finds_title_after_insert_and_update() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/rust", "Rust async runtimes")
            .with_content("A deep dive into work stealing schedulers.");
        let id = store.add_article(&article).unwrap().unwrap();

        let hits = store.search_articles("\"Rust async runtimes\"", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);

        store
            .update_article_content(id, "Completely rewritten body about executors")
            .unwrap();
        let hits = store.search_articles("executors", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
    }

    #[test]
    fn test_feed_delete_cascades_to_articles() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/a", "A").with_content("body");
        let id = store.add_article(&article).unwrap().unwrap();

        store.delete_feed(feed_id).unwrap();
        assert!(store.get_article(id).unwrap().is_none());
    }

    #[test]
    fn test_per_user_unread_counts_are_independent() {
        let (store, feed_id) = store_with_feed();
        for i in 0..4 {
            let article =
                NewArticle::new(feed_id, format!("https://example.com/{}", i), "A")
                    .with_content(format!("body {}", i));
            store.add_article(&article).unwrap();
        }

        assert_eq!(store.unread_count(Some(1), Some(feed_id)).unwrap(), 4);
        assert_eq!(store.unread_count(Some(2), Some(feed_id)).unwrap(), 4);

        let first = store
            .list_articles(&ArticleFilter {
                feed_id: Some(feed_id),
                ..Default::default()
            })
            .unwrap();
        store.mark_read(1, first[0].id, true).unwrap();

        assert_eq!(store.unread_count(Some(1), Some(feed_id)).unwrap(), 3);
        assert_eq!(store.unread_count(Some(2), Some(feed_id)).unwrap(), 4);
    }

    #[test]
    fn test_mark_feed_read_and_unread() {
        let (store, feed_id) = store_with_feed();
        for i in 0..3 {
            let article =
                NewArticle::new(feed_id, format!("https://example.com/{}", i), "A")
                    .with_content("b");
            store.add_article(&article).unwrap();
        }
        store.mark_feed_read(7, feed_id, true).unwrap();
        assert_eq!(store.unread_count(Some(7), Some(feed_id)).unwrap(), 0);

        store.mark_feed_read(7, feed_id, false).unwrap();
        assert_eq!(store.unread_count(Some(7), Some(feed_id)).unwrap(), 3);
    }

    #[test]
    fn test_toggle_bookmark_round_trip() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/a", "A").with_content("b");
        let id = store.add_article(&article).unwrap().unwrap();

        assert!(store.toggle_bookmark(3, id).unwrap());
        let state = store.get_state(3, id).unwrap().unwrap();
        assert!(state.is_bookmarked);
        assert!(state.bookmarked_at.is_some());

        assert!(!store.toggle_bookmark(3, id).unwrap());
    }

    #[test]
    fn test_duplicate_detection_keeps_earliest() {
        let (store, feed_id) = store_with_feed();
        let other_feed = store
            .add_feed("https://other.com/feed.xml", "Other", None)
            .unwrap();

        let mut first = NewArticle::new(feed_id, "https://example.com/a", "A")
            .with_content("shared body");
        first.published_at = Some(Utc::now() - Duration::days(2));
        let first_id = store.add_article(&first).unwrap().unwrap();

        let mut second = NewArticle::new(other_feed, "https://other.com/a", "A")
            .with_content("shared body");
        second.published_at = Some(Utc::now() - Duration::days(1));
        let second_id = store.add_article(&second).unwrap().unwrap();

        let hidden = store.get_duplicate_ids().unwrap();
        assert!(!hidden.contains(&first_id));
        assert!(hidden.contains(&second_id));
    }

    #[test]
    fn test_archive_older_than_respects_guards() {
        let (store, feed_id) = store_with_feed();
        let mut old = NewArticle::new(feed_id, "https://example.com/old", "Old")
            .with_content("old body");
        old.published_at = Some(Utc::now() - Duration::days(90));
        let old_id = store.add_article(&old).unwrap().unwrap();

        let mut recent = NewArticle::new(feed_id, "https://example.com/new", "New")
            .with_content("new body");
        recent.published_at = Some(Utc::now());
        let recent_id = store.add_article(&recent).unwrap().unwrap();

        // keep_unread guard protects the old unread article
        let deleted = store.archive_older_than(30, true, true).unwrap();
        assert_eq!(deleted, 0);

        let deleted = store.archive_older_than(30, true, false).unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_article(old_id).unwrap().is_none());
        assert!(store.get_article(recent_id).unwrap().is_some());
    }

    #[test]
    fn test_settings_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get_setting("auto_summarize").unwrap().is_none());
        store.set_setting("auto_summarize", "true").unwrap();
        assert_eq!(
            store.get_setting("auto_summarize").unwrap().as_deref(),
            Some("true")
        );
        store.set_setting("auto_summarize", "false").unwrap();
        assert_eq!(
            store.get_setting("auto_summarize").unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn test_rule_requires_a_filter() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store.add_rule("empty", None, None, None, Priority::Normal);
        assert!(err.is_err());
    }

    #[test]
    fn test_update_rule_clears_and_sets_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let id = store
            .add_rule("watch", None, Some("rust"), None, Priority::Normal)
            .unwrap();

        store
            .update_rule(
                id,
                &RuleUpdate {
                    clear_keyword: true,
                    author: Some("jane".into()),
                    priority: Some(Priority::High),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        let rule = store.get_rule(id).unwrap().unwrap();
        assert!(rule.keyword.is_none());
        assert_eq!(rule.author.as_deref(), Some("jane"));
        assert_eq!(rule.priority, Priority::High);
        assert!(!rule.enabled);
    }

    #[test]
    fn test_legacy_article_flags() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/a", "A").with_content("b");
        let id = store.add_article(&article).unwrap().unwrap();

        store.mark_article_read(id, true).unwrap();
        assert!(store.get_article(id).unwrap().unwrap().is_read);
        assert_eq!(store.unread_count(None, Some(feed_id)).unwrap(), 0);

        assert!(store.toggle_article_bookmark(id).unwrap());
        assert!(!store.toggle_article_bookmark(id).unwrap());
    }

    #[test]
    fn test_notification_history_at_most_once() {
        let (store, feed_id) = store_with_feed();
        let article = NewArticle::new(feed_id, "https://example.com/a", "A").with_content("b");
        let id = store.add_article(&article).unwrap().unwrap();

        assert!(!store.was_notified(id).unwrap());
        let rule_id = store
            .add_rule("ai", None, Some("AI"), None, Priority::High)
            .unwrap();
        store.add_notification(id, Some(rule_id)).unwrap();
        assert!(store.was_notified(id).unwrap());
    }

    #[test]
    fn test_bulk_delete_preserves_newsletter_feeds() {
        let store = SqliteStore::in_memory().unwrap();
        let rss = store
            .add_feed("https://example.com/feed.xml", "Example", None)
            .unwrap();
        let newsletter = store
            .get_or_create_newsletter_feed("news@example.com", "News")
            .unwrap();

        store.bulk_delete_feeds(&[rss, newsletter], true).unwrap();
        assert!(store.get_feed(rss, None).unwrap().is_none());
        assert!(store.get_feed(newsletter, None).unwrap().is_some());
    }

    #[test]
    fn test_newsletter_feed_reused_per_sender() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store
            .get_or_create_newsletter_feed("news@example.com", "News")
            .unwrap();
        let b = store
            .get_or_create_newsletter_feed("news@example.com", "News")
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_gmail_config_round_trip() {
        let store = SqliteStore::in_memory().unwrap();
        let config = GmailConfig {
            email: "me@gmail.com".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            token_expires_at: Utc::now() + Duration::hours(1),
            monitored_label: "Newsletters".into(),
            last_fetched_uid: 0,
            poll_interval_minutes: 30,
            is_enabled: true,
        };
        store.save_gmail_config(&config).unwrap();

        let loaded = store.get_gmail_config().unwrap().unwrap();
        assert_eq!(loaded.email, "me@gmail.com");

        store.update_gmail_last_uid(42).unwrap();
        let loaded = store.get_gmail_config().unwrap().unwrap();
        assert_eq!(loaded.last_fetched_uid, 42);
    }

    #[test]
    fn test_topic_trends_window() {
        let store = SqliteStore::in_memory().unwrap();
        let now = Utc::now();
        store
            .add_topic_entry("EU AI Regulation", &[1, 2, 3], now - Duration::days(1), now)
            .unwrap();

        let trends = store.topic_trends(now - Duration::hours(1)).unwrap();
        assert_eq!(trends.len(), 1);
        assert_eq!(trends[0].article_ids, vec![1, 2, 3]);
        assert_eq!(trends[0].article_count, 3);

        let trends = store.topic_trends(now + Duration::hours(1)).unwrap();
        assert!(trends.is_empty());
    }
}
