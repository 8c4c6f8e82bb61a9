//! Newsletter email parsing.
//!
//! RFC 822 / MIME messages (Gmail fetches and `.eml` uploads) are parsed
//! with mail-parser; the HTML body is preferred over plain text and cleaned
//! of the usual newsletter chrome: tracking pixels, hidden preview spans,
//! spacer divs, presentational table wrappers, and footer blocks.

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{HeaderValue, MessageParser};
use ego_tree::NodeRef;
use scraper::{ElementRef, Node};

use crate::app::{EstuaryError, Result};
use crate::extract::html;

#[derive(Debug, Clone)]
pub struct ParsedEmail {
    pub subject: String,
    pub sender: String,
    pub sender_email: String,
    pub date: Option<DateTime<Utc>>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub newsletter_name: Option<String>,
    pub unsubscribe_url: Option<String>,
}

impl ParsedEmail {
    pub fn title(&self) -> &str {
        if self.subject.is_empty() {
            "Untitled Newsletter"
        } else {
            &self.subject
        }
    }

    pub fn author(&self) -> &str {
        self.newsletter_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or_else(|| (!self.sender.is_empty()).then_some(self.sender.as_str()))
            .unwrap_or(&self.sender_email)
    }

    /// Best body: cleaned HTML, else plain text wrapped into paragraphs.
    pub fn article_content(&self) -> String {
        if let Some(content_html) = &self.content_html {
            return extract_article_from_html(content_html);
        }
        if let Some(text) = &self.content_text {
            return text
                .split("\n\n")
                .filter(|p| !p.trim().is_empty())
                .map(|p| format!("<p>{}</p>", html_escape::encode_text(p.trim())))
                .collect::<Vec<_>>()
                .join("\n");
        }
        String::new()
    }
}

pub fn parse_eml_bytes(raw: &[u8]) -> Result<ParsedEmail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| EstuaryError::Email("Failed to parse email".into()))?;

    let subject = message.subject().unwrap_or_default().to_string();

    let (sender, sender_email) = message
        .from()
        .and_then(|from| from.first())
        .map(|addr| {
            (
                addr.name().unwrap_or_default().to_string(),
                addr.address().unwrap_or_default().to_string(),
            )
        })
        .unwrap_or_default();

    let date = message
        .date()
        .and_then(|dt| Utc.timestamp_opt(dt.to_timestamp(), 0).single());

    let content_html = message
        .body_html(0)
        .map(|body| clean_newsletter_html(&body));
    let content_text = message.body_text(0).map(|body| body.into_owned());

    let list_id = header_text(&message, "List-Id");
    let x_mailer = header_text(&message, "X-Mailer");
    let list_unsubscribe = header_text(&message, "List-Unsubscribe");

    let newsletter_name = detect_newsletter_name(
        list_id.as_deref(),
        x_mailer.as_deref(),
        &sender,
        content_html.as_deref(),
    );
    let unsubscribe_url =
        find_unsubscribe_url(list_unsubscribe.as_deref(), content_html.as_deref());

    Ok(ParsedEmail {
        subject,
        sender,
        sender_email,
        date,
        content_html,
        content_text,
        newsletter_name,
        unsubscribe_url,
    })
}

fn header_text(message: &mail_parser::Message, name: &str) -> Option<String> {
    match message.header(name) {
        Some(HeaderValue::Text(text)) => Some(text.to_string()),
        Some(HeaderValue::TextList(list)) => list.first().map(|t| t.to_string()),
        _ => None,
    }
}

/// Newsletter name from List-Id ("Name <list.domain>"), known platform
/// mailers, or common HTML title elements.
fn detect_newsletter_name(
    list_id: Option<&str>,
    x_mailer: Option<&str>,
    sender: &str,
    content_html: Option<&str>,
) -> Option<String> {
    if let Some(list_id) = list_id {
        let name = list_id.split('<').next().unwrap_or_default();
        let name = name.trim().trim_matches('"').trim();
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    if x_mailer.is_some_and(|m| m.contains("Substack")) && !sender.is_empty() {
        return Some(sender.to_string());
    }

    if let Some(content_html) = content_html {
        let doc = html::parse_document(content_html);
        for css in [
            "h1.newsletter-title",
            ".newsletter-name",
            "[data-newsletter-title]",
        ] {
            if let Some(name) = html::select_first_text(&doc, css) {
                return Some(name);
            }
        }
    }

    None
}

/// Unsubscribe URL from List-Unsubscribe (unwrapping `<...>` and preferring
/// the http(s) variant over mailto), else an HTML link mentioning
/// "unsubscribe" in its text or href.
fn find_unsubscribe_url(
    list_unsubscribe: Option<&str>,
    content_html: Option<&str>,
) -> Option<String> {
    if let Some(header) = list_unsubscribe {
        for part in header.split(',') {
            let url = part.trim().trim_start_matches('<').trim_end_matches('>');
            if url.starts_with("http") {
                return Some(url.to_string());
            }
        }
    }

    let content_html = content_html?;
    let doc = html::parse_document(content_html);
    let sel = html::selector("a[href]")?;
    for link in doc.select(&sel) {
        let href = link.value().attr("href")?;
        let text = html::element_text(&link).to_lowercase();
        if (text.contains("unsubscribe") || href.to_lowercase().contains("unsubscribe"))
            && href.starts_with("http")
        {
            return Some(href.to_string());
        }
    }
    None
}

/// Clean newsletter HTML: drop tracking pixels, hidden preview spans,
/// scripts/styles, spacer divs, and footer blocks; unwrap single-cell
/// presentational table wrappers.
pub fn clean_newsletter_html(raw: &str) -> String {
    let doc = html::parse_document(raw);
    let Some(body) = html::select_first(&doc, "body") else {
        return raw.to_string();
    };
    let mut out = String::new();
    for child in body.children() {
        write_cleaned(child, &mut out);
    }
    out
}

/// Extract the main article area from cleaned newsletter HTML.
fn extract_article_from_html(content_html: &str) -> String {
    let doc = html::parse_document(content_html);
    let container = [
        "article",
        ".post-content",
        ".email-content",
        ".newsletter-content",
        ".body-content",
        "[role=\"article\"]",
        ".post",
        "main",
    ]
    .iter()
    .find_map(|css| html::select_first(&doc, css))
    .or_else(|| html::select_first(&doc, "body"));

    match container {
        Some(container) => html::html_without(
            container,
            &[
                "nav",
                "header",
                "footer",
                "[class*=\"share\"]",
                "[class*=\"social\"]",
                "[class*=\"button\"]",
            ],
        ),
        None => content_html.to_string(),
    }
}

fn write_cleaned(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(&html_escape::encode_text(&**text));
        }
        Node::Element(_) => {
            let Some(element) = ElementRef::wrap(node) else {
                return;
            };
            let value = element.value();
            let name = value.name();

            match name {
                "script" | "style" | "head" => return,
                "img" if is_tracking_pixel(value) => return,
                "span" if is_hidden_preview(value) => return,
                "div" if is_spacer_div(&element) => return,
                _ => {}
            }

            if is_footer_block(value) {
                return;
            }

            // Presentational single-cell table wrappers add nesting without
            // meaning; emit their content only.
            if unwraps(&element) {
                for child in node.children() {
                    write_cleaned(child, out);
                }
                return;
            }

            out.push('<');
            out.push_str(name);
            for (attr, attr_value) in value.attrs() {
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(attr_value));
                out.push('"');
            }
            out.push('>');
            if matches!(name, "img" | "br" | "hr" | "meta" | "input" | "link") {
                return;
            }
            for child in node.children() {
                write_cleaned(child, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {
            for child in node.children() {
                write_cleaned(child, out);
            }
        }
    }
}

fn is_tracking_pixel(element: &scraper::node::Element) -> bool {
    let dim_is_zeroish = |attr: &str| {
        element
            .attr(attr)
            .is_some_and(|v| matches!(v.trim(), "0" | "1"))
    };
    if dim_is_zeroish("width") || dim_is_zeroish("height") {
        return true;
    }
    element.attr("style").is_some_and(|style| {
        let style = style.replace(' ', "");
        style.contains("width:1px") || style.contains("height:1px") || style.contains("width:0")
    })
}

fn is_hidden_preview(element: &scraper::node::Element) -> bool {
    element.attr("style").is_some_and(|style| {
        let style = style.replace(' ', "");
        style.contains("display:none")
            || style.contains("visibility:hidden")
            || (style.contains("max-height:0") && style.contains("overflow:hidden"))
    })
}

fn is_spacer_div(element: &ElementRef) -> bool {
    if !html::element_text(element).is_empty() {
        return false;
    }
    if element.children().next().is_some() {
        return false;
    }
    element
        .value()
        .attr("style")
        .is_some_and(|style| style.contains("height:"))
}

fn is_footer_block(element: &scraper::node::Element) -> bool {
    element.classes().any(|class| {
        let class = class.to_lowercase();
        class.contains("footer") || class.contains("unsubscribe") || class.contains("preferences")
    })
}

fn unwraps(element: &ElementRef) -> bool {
    let value = element.value();
    match value.name() {
        "table" => value.attr("role") == Some("presentation") && single_cell(element),
        "tbody" | "tr" | "td" => {
            // Only inside a presentational wrapper being unwrapped.
            element.ancestors().any(|a| {
                ElementRef::wrap(a).is_some_and(|parent| {
                    parent.value().name() == "table"
                        && parent.value().attr("role") == Some("presentation")
                        && single_cell(&parent)
                })
            })
        }
        _ => false,
    }
}

fn single_cell(table: &ElementRef) -> bool {
    let Some(td_sel) = html::selector("td, th") else {
        return false;
    };
    table.select(&td_sel).count() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_EML: &str = "From: The Batch <news@deeplearning.ai>\r\n\
        To: reader@example.com\r\n\
        Subject: The Batch: Agents everywhere\r\n\
        Date: Tue, 14 Jan 2025 12:00:00 +0000\r\n\
        List-Id: \"The Batch\" <thebatch.deeplearning.ai>\r\n\
        List-Unsubscribe: <mailto:unsub@deeplearning.ai>, <https://deeplearning.ai/unsub?u=1>\r\n\
        MIME-Version: 1.0\r\n\
        Content-Type: text/html; charset=utf-8\r\n\
        \r\n\
        <html><body>\
        <img src=\"https://t.example.com/open.gif\" width=\"1\" height=\"1\">\
        <span style=\"display:none\">Preview text you should not see</span>\
        <table role=\"presentation\"><tr><td><p>This week in AI: agents, agents, agents.</p></td></tr></table>\
        <div class=\"footer\"><a href=\"https://deeplearning.ai/unsub\">Unsubscribe</a></div>\
        </body></html>\r\n";

    #[test]
    fn test_parse_headers_and_sender() {
        let parsed = parse_eml_bytes(SAMPLE_EML.as_bytes()).unwrap();
        assert_eq!(parsed.subject, "The Batch: Agents everywhere");
        assert_eq!(parsed.sender, "The Batch");
        assert_eq!(parsed.sender_email, "news@deeplearning.ai");
        assert!(parsed.date.is_some());
        assert_eq!(parsed.newsletter_name.as_deref(), Some("The Batch"));
    }

    #[test]
    fn test_unsubscribe_prefers_https_over_mailto() {
        let parsed = parse_eml_bytes(SAMPLE_EML.as_bytes()).unwrap();
        assert_eq!(
            parsed.unsubscribe_url.as_deref(),
            Some("https://deeplearning.ai/unsub?u=1")
        );
    }

    #[test]
    fn test_cleaning_strips_pixels_previews_and_footer() {
        let parsed = parse_eml_bytes(SAMPLE_EML.as_bytes()).unwrap();
        let cleaned = parsed.content_html.as_deref().unwrap();
        assert!(!cleaned.contains("open.gif"));
        assert!(!cleaned.contains("Preview text"));
        assert!(!cleaned.contains("footer"));
        assert!(cleaned.contains("This week in AI"));
        // Presentational wrapper unwrapped.
        assert!(!cleaned.contains("<table"));
    }

    #[test]
    fn test_plain_text_body_becomes_paragraphs() {
        let eml = "From: a@example.com\r\nSubject: Plain\r\n\
            Content-Type: text/plain; charset=utf-8\r\n\r\n\
            First paragraph.\n\nSecond paragraph.\r\n";
        let parsed = parse_eml_bytes(eml.as_bytes()).unwrap();
        let content = parsed.article_content();
        assert!(content.contains("<p>First paragraph.</p>"));
        assert!(content.contains("<p>Second paragraph.</p>"));
    }

    #[test]
    fn test_author_prefers_newsletter_name() {
        let parsed = parse_eml_bytes(SAMPLE_EML.as_bytes()).unwrap();
        assert_eq!(parsed.author(), "The Batch");
    }
}
