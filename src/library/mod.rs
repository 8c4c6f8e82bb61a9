//! Library intake: standalone URLs, uploaded documents, and imported
//! newsletters, all stored under the reserved `local://standalone` feed and
//! owned by the submitting user.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pulldown_cmark::{html as md_html, Parser as MarkdownParser};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::info;
use uuid::Uuid;

use crate::app::{EstuaryError, Result};
use crate::domain::{Article, ArticleFilter, ContentKind, NewArticle};
use crate::email;
use crate::fetch::{readability, EnhancedFetcher, FetchPolicy};
use crate::store::SqliteStore;

pub struct LibraryService {
    store: Arc<SqliteStore>,
    fetcher: Arc<EnhancedFetcher>,
    uploads_dir: PathBuf,
    max_upload_bytes: u64,
}

impl LibraryService {
    pub fn new(
        store: Arc<SqliteStore>,
        fetcher: Arc<EnhancedFetcher>,
        uploads_dir: impl Into<PathBuf>,
        max_upload_size_mb: u64,
    ) -> Result<Self> {
        let uploads_dir = uploads_dir.into();
        std::fs::create_dir_all(&uploads_dir)?;
        Ok(Self {
            store,
            fetcher,
            uploads_dir,
            max_upload_bytes: max_upload_size_mb * 1024 * 1024,
        })
    }

    /// Submit a URL to the library: fetch (with fallbacks), extract, store.
    /// Returns None when the URL is already in the library.
    pub async fn add_url(&self, user_id: i64, url: &str) -> Result<Option<i64>> {
        let result = self.fetcher.fetch(url, FetchPolicy::default()).await?;
        if result.source == "error" {
            return Err(EstuaryError::Fetch(
                result
                    .original_error
                    .unwrap_or_else(|| "Failed to fetch URL".into()),
            ));
        }

        let feed_id = self.store.get_or_create_standalone_feed()?;
        let mut article = NewArticle::new(feed_id, url, &result.title)
            .with_content(&result.content);
        article.user_id = Some(user_id);
        article.content_type = Some(ContentKind::Url.as_str().into());
        article.author = result.author.clone();
        article.reading_time_minutes = result.reading_time_minutes;
        article.word_count = result.word_count;
        article.featured_image = result.featured_image.clone();
        article.has_code_blocks = result.has_code_blocks;
        article.code_languages = result.code_languages.clone();
        article.site_name = result.site_name.clone();
        article.categories = result.categories.clone();
        article.is_paywalled = result.is_paywalled;
        article.extractor_used = Some(result.extractor_used.clone());

        self.store.add_article(&article)
    }

    /// Persist and import an uploaded file. The extension picks the
    /// extractor; the file itself is kept under a UUID name.
    pub fn upload_file(
        &self,
        user_id: i64,
        original_filename: &str,
        data: &[u8],
    ) -> Result<Option<i64>> {
        if data.len() as u64 > self.max_upload_bytes {
            return Err(EstuaryError::Config(format!(
                "Upload exceeds {} byte limit",
                self.max_upload_bytes
            )));
        }

        let extension = Path::new(original_filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let kind = ContentKind::from_extension(extension).ok_or_else(|| {
            EstuaryError::Extraction(format!("Unsupported file type: .{}", extension))
        })?;

        let stored_name = format!("{}.{}", Uuid::new_v4(), extension.to_lowercase());
        let stored_path = self.uploads_dir.join(&stored_name);
        std::fs::write(&stored_path, data)?;

        let imported = self.import_upload(user_id, original_filename, &stored_path, kind, data);
        if matches!(imported, Err(_) | Ok(None)) {
            let _ = std::fs::remove_file(&stored_path);
        }
        imported
    }

    fn import_upload(
        &self,
        user_id: i64,
        original_filename: &str,
        stored_path: &Path,
        kind: ContentKind,
        data: &[u8],
    ) -> Result<Option<i64>> {
        let title_stem = Path::new(original_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string();

        // Newsletters carry their own metadata; everything else is a plain
        // document named after the file.
        if kind == ContentKind::Newsletter {
            return self.import_eml(user_id, original_filename, stored_path, data);
        }

        let content = extract_text(kind, data)?;
        if content.trim().is_empty() {
            return Err(EstuaryError::Extraction(format!(
                "No text content found in {}",
                original_filename
            )));
        }

        let feed_id = self.store.get_or_create_standalone_feed()?;
        let url = format!(
            "local://upload/{}",
            stored_path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
        );

        let mut article = NewArticle::new(feed_id, url, title_stem).with_content(content);
        article.user_id = Some(user_id);
        article.content_type = Some(kind.as_str().into());
        article.file_name = Some(original_filename.to_string());
        article.file_path = Some(stored_path.to_string_lossy().into_owned());

        let inserted = self.store.add_article(&article)?;
        if inserted.is_some() {
            info!("Imported upload {} as {:?}", original_filename, kind);
        }
        Ok(inserted)
    }

    fn import_eml(
        &self,
        user_id: i64,
        original_filename: &str,
        stored_path: &Path,
        data: &[u8],
    ) -> Result<Option<i64>> {
        let parsed = email::parse_eml_bytes(data)?;
        let content = parsed.article_content();
        if content.trim().len() < 50 {
            return Err(EstuaryError::Email(format!(
                "Newsletter {} has insufficient content",
                original_filename
            )));
        }

        let date_str = parsed
            .date
            .map(|d| d.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| "unknown".into());
        let url = format!("newsletter://upload/{}_{}", parsed.sender_email, date_str);

        let feed_id = self.store.get_or_create_standalone_feed()?;
        let mut article = NewArticle::new(feed_id, url, parsed.title()).with_content(content);
        article.user_id = Some(user_id);
        article.content_type = Some(ContentKind::Newsletter.as_str().into());
        article.author = Some(parsed.author().to_string());
        article.published_at = parsed.date;
        article.file_name = Some(original_filename.to_string());
        article.file_path = Some(stored_path.to_string_lossy().into_owned());
        article.site_name = parsed.newsletter_name.clone();

        self.store.add_article(&article)
    }

    /// List the caller's library items, optionally filtered by content type.
    pub fn list_items(
        &self,
        user_id: i64,
        content_type: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Article>> {
        let feed_id = self.store.get_or_create_standalone_feed()?;
        let articles = self.store.list_articles(&ArticleFilter {
            feed_id: Some(feed_id),
            content_type: content_type.map(String::from),
            limit: Some(limit),
            offset,
            ..Default::default()
        })?;
        Ok(articles
            .into_iter()
            .filter(|a| a.user_id == Some(user_id))
            .collect())
    }

    pub fn get_item(&self, user_id: i64, item_id: i64) -> Result<Article> {
        let article = self
            .store
            .get_article(item_id)?
            .ok_or_else(|| EstuaryError::NotFound(format!("Library item {}", item_id)))?;
        if article.user_id != Some(user_id) {
            return Err(EstuaryError::NotFound(format!("Library item {}", item_id)));
        }
        Ok(article)
    }

    /// Delete a library item and its stored file.
    pub fn delete_item(&self, user_id: i64, item_id: i64) -> Result<()> {
        let article = self.get_item(user_id, item_id)?;
        if let Some(file_path) = &article.file_path {
            let _ = std::fs::remove_file(file_path);
        }
        self.store.delete_article(item_id)
    }
}

/// Extract displayable HTML from an uploaded document.
pub fn extract_text(kind: ContentKind, data: &[u8]) -> Result<String> {
    match kind {
        ContentKind::Pdf => extract_pdf(data),
        ContentKind::Docx => extract_docx(data),
        ContentKind::Txt => Ok(paragraphs_to_html(&String::from_utf8_lossy(data))),
        ContentKind::Md => Ok(markdown_to_html(&String::from_utf8_lossy(data))),
        ContentKind::Html => {
            let raw = String::from_utf8_lossy(data);
            Ok(readability::heuristic("local://upload", &raw).content)
        }
        ContentKind::Url | ContentKind::Newsletter => Err(EstuaryError::Extraction(
            "Not a file-extraction content type".into(),
        )),
    }
}

fn extract_pdf(data: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| EstuaryError::Extraction(format!("PDF extraction failed: {}", e)))?;
    Ok(paragraphs_to_html(&text))
}

/// DOCX is a zip archive; the document body lives in word/document.xml with
/// paragraphs as `w:p` elements.
fn extract_docx(data: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data))
        .map_err(|e| EstuaryError::Extraction(format!("Not a DOCX archive: {}", e)))?;
    let mut document = archive
        .by_name("word/document.xml")
        .map_err(|e| EstuaryError::Extraction(format!("DOCX missing document.xml: {}", e)))?;
    let mut xml = String::new();
    document
        .read_to_string(&mut xml)
        .map_err(|e| EstuaryError::Extraction(format!("DOCX read failed: {}", e)))?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Text(text)) => {
                if let Ok(decoded) = text.unescape() {
                    current.push_str(&decoded);
                }
            }
            Ok(Event::End(end)) if end.name().as_ref() == b"w:p" => {
                let trimmed = current.trim().to_string();
                if !trimmed.is_empty() {
                    paragraphs.push(trimmed);
                }
                current.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(EstuaryError::Extraction(format!(
                    "DOCX parse error: {}",
                    e
                )));
            }
            _ => {}
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    Ok(paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn paragraphs_to_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn markdown_to_html(markdown: &str) -> String {
    let parser = MarkdownParser::new(markdown);
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Fetcher;
    use tempfile::TempDir;

    fn service() -> (TempDir, LibraryService) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fetcher = Arc::new(EnhancedFetcher::new(
            Fetcher::with_defaults().unwrap(),
            None,
            None,
        ));
        let service = LibraryService::new(store, fetcher, dir.path(), 25).unwrap();
        (dir, service)
    }

    #[test]
    fn test_txt_upload_round_trip() {
        let (_dir, service) = service();
        let id = service
            .upload_file(1, "notes.txt", b"First paragraph.\n\nSecond paragraph.")
            .unwrap()
            .unwrap();

        let item = service.get_item(1, id).unwrap();
        assert_eq!(item.content_type.as_deref(), Some("txt"));
        assert_eq!(item.file_name.as_deref(), Some("notes.txt"));
        assert!(item.content.as_deref().unwrap().contains("<p>First paragraph.</p>"));
        // Stored file exists under a UUID name.
        assert!(Path::new(item.file_path.as_deref().unwrap()).exists());
    }

    #[test]
    fn test_markdown_rendering() {
        let html = markdown_to_html("# Title\n\nSome *emphasis* here.");
        assert!(html.contains("<h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let (_dir, service) = service();
        assert!(service.upload_file(1, "binary.exe", b"MZ").is_err());
    }

    #[test]
    fn test_upload_size_cap() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fetcher = Arc::new(EnhancedFetcher::new(
            Fetcher::with_defaults().unwrap(),
            None,
            None,
        ));
        let service = LibraryService::new(store, fetcher, dir.path(), 0).unwrap();
        assert!(service.upload_file(1, "notes.txt", b"over the zero cap").is_err());
    }

    #[test]
    fn test_ownership_guard() {
        let (_dir, service) = service();
        let id = service
            .upload_file(1, "mine.txt", b"Something worth keeping around.")
            .unwrap()
            .unwrap();

        assert!(service.get_item(1, id).is_ok());
        assert!(service.get_item(2, id).is_err());
    }

    #[test]
    fn test_delete_removes_row_and_file() {
        let (_dir, service) = service();
        let id = service
            .upload_file(1, "gone.txt", b"Temporary body text.")
            .unwrap()
            .unwrap();
        let path = service.get_item(1, id).unwrap().file_path.unwrap();

        service.delete_item(1, id).unwrap();
        assert!(service.get_item(1, id).is_err());
        assert!(!Path::new(&path).exists());
    }

    #[test]
    fn test_eml_upload_becomes_newsletter_item() {
        let (_dir, service) = service();
        let eml = b"From: Weekly <weekly@example.com>\r\n\
            Subject: Issue 3\r\n\
            Date: Tue, 14 Jan 2025 12:00:00 +0000\r\n\
            Content-Type: text/html; charset=utf-8\r\n\r\n\
            <html><body><p>A full newsletter body with plenty of text for \
            the importer to accept happily.</p></body></html>\r\n";
        let id = service.upload_file(1, "issue3.eml", eml).unwrap().unwrap();

        let item = service.get_item(1, id).unwrap();
        assert_eq!(item.content_type.as_deref(), Some("newsletter"));
        assert!(item.url.starts_with("newsletter://upload/weekly@example.com_"));
        assert_eq!(item.author.as_deref(), Some("Weekly"));
    }

    #[test]
    fn test_html_upload_extracts_article() {
        let (_dir, service) = service();
        let html = format!(
            "<html><head><title>Saved Page</title></head><body><article><p>{}</p></article></body></html>",
            "Saved content sentence. ".repeat(20)
        );
        let id = service
            .upload_file(1, "saved.html", html.as_bytes())
            .unwrap()
            .unwrap();
        let item = service.get_item(1, id).unwrap();
        assert_eq!(item.content_type.as_deref(), Some("html"));
        assert!(item.content.as_deref().unwrap().contains("Saved content"));
    }
}
