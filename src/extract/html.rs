//! HTML helpers shared by the extractors.
//!
//! `scraper` exposes a read-only DOM, so "remove these elements" is done by
//! re-serializing the tree while skipping pruned subtrees.

use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node, Selector};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

pub fn parse_document(html: &str) -> Html {
    Html::parse_document(html)
}

pub fn parse_fragment(html: &str) -> Html {
    Html::parse_fragment(html)
}

/// Compile a selector, skipping invalid ones rather than failing extraction.
pub fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

pub fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = selector(css)?;
    doc.select(&sel).next()
}

pub fn select_first_text(doc: &Html, css: &str) -> Option<String> {
    let text = element_text(&select_first(doc, css)?);
    (!text.is_empty()).then_some(text)
}

pub fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    select_first(doc, css)?
        .value()
        .attr(attr)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `<meta property="..." content="...">` lookup.
pub fn meta_property(doc: &Html, property: &str) -> Option<String> {
    first_attr(doc, &format!("meta[property=\"{}\"]", property), "content")
}

/// `<meta name="..." content="...">` lookup.
pub fn meta_name(doc: &Html, name: &str) -> Option<String> {
    first_attr(doc, &format!("meta[name=\"{}\"]", name), "content")
}

/// Whitespace-normalized text of an element subtree.
pub fn element_text(element: &ElementRef) -> String {
    let text: String = element.text().collect::<Vec<_>>().join(" ");
    normalize_whitespace(&text)
}

/// Text-only projection of an HTML fragment.
pub fn fragment_text(html: &str) -> String {
    let doc = parse_fragment(html);
    let text: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    normalize_whitespace(&text)
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word_count(text: &str) -> i64 {
    text.split_whitespace().count() as i64
}

/// Estimated reading time at roughly 225 words per minute, minimum 1.
pub fn reading_time_minutes(words: i64) -> i64 {
    ((words as f64 / 225.0).round() as i64).max(1)
}

/// Serialize an element's outer HTML while dropping any descendant matching
/// one of the given selectors.
pub fn html_without(element: ElementRef, remove: &[&str]) -> String {
    let selectors: Vec<Selector> = remove.iter().filter_map(|css| selector(css)).collect();
    let mut out = String::new();
    write_node(*element, &selectors, &mut out);
    out
}

fn write_node(node: NodeRef<'_, Node>, remove: &[Selector], out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(&html_escape::encode_text(&**text));
        }
        Node::Element(_) => {
            let Some(element) = ElementRef::wrap(node) else {
                return;
            };
            if remove.iter().any(|sel| sel.matches(&element)) {
                return;
            }
            let name = element.value().name();
            out.push('<');
            out.push_str(name);
            for (attr, value) in element.value().attrs() {
                out.push(' ');
                out.push_str(attr);
                out.push_str("=\"");
                out.push_str(&html_escape::encode_double_quoted_attribute(value));
                out.push('"');
            }
            out.push('>');
            if VOID_ELEMENTS.contains(&name) {
                return;
            }
            for child in node.children() {
                write_node(child, remove, out);
            }
            out.push_str("</");
            out.push_str(name);
            out.push('>');
        }
        _ => {
            for child in node.children() {
                write_node(child, remove, out);
            }
        }
    }
}

/// Strip a trailing site-name segment joined by `|`, `-`, `–`, or `—`.
pub fn strip_title_suffix(title: &str) -> String {
    let title = title.trim();
    if let Some(idx) = title.rfind(['|', '-', '–', '—']) {
        let head = &title[..idx];
        let sep_len = title[idx..].chars().next().map_or(1, |c| c.len_utf8());
        let rest = &title[idx + sep_len..];
        // Only treat it as a site-name separator when padded by whitespace,
        // so hyphenated words survive.
        let padded = head.ends_with(' ') || rest.starts_with(' ');
        if padded && !rest.trim().is_empty() && !head.trim().is_empty() {
            return head.trim().to_string();
        }
    }
    title.to_string()
}

const LANGUAGE_CLASS_PREFIXES: &[&str] = &["language-", "lang-", "highlight-", "hljs-"];

fn normalize_language(lang: &str) -> String {
    match lang {
        "js" => "javascript",
        "ts" => "typescript",
        "py" => "python",
        "rb" => "ruby",
        "yml" => "yaml",
        "sh" | "shell" => "bash",
        other => other,
    }
    .to_string()
}

/// Detect programming languages from code-block class names and
/// `data-language` attributes.
pub fn code_languages(doc: &Html) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    let mut push = |languages: &mut Vec<String>, lang: String| {
        if !lang.is_empty() && !languages.contains(&lang) {
            languages.push(lang);
        }
    };

    if let Some(sel) = selector("pre, code") {
        for element in doc.select(&sel) {
            for class in element.value().classes() {
                for prefix in LANGUAGE_CLASS_PREFIXES {
                    if let Some(lang) = class.strip_prefix(prefix) {
                        let lang: String = lang
                            .chars()
                            .take_while(|c| c.is_ascii_alphanumeric())
                            .collect();
                        push(&mut languages, normalize_language(&lang.to_lowercase()));
                    }
                }
            }
        }
    }

    if let Some(sel) = selector("[data-language]") {
        for element in doc.select(&sel) {
            if let Some(lang) = element.value().attr("data-language") {
                push(&mut languages, normalize_language(&lang.to_lowercase()));
            }
        }
    }

    languages
}

pub fn has_code_blocks(doc: &Html) -> bool {
    select_first(doc, "pre").is_some() || select_first(doc, "code").is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_lookups() {
        let doc = parse_document(
            r#"<html><head>
               <meta property="og:image" content="https://cdn.example.com/x.png">
               <meta name="author" content="Jane Doe">
               </head><body></body></html>"#,
        );
        assert_eq!(
            meta_property(&doc, "og:image").as_deref(),
            Some("https://cdn.example.com/x.png")
        );
        assert_eq!(meta_name(&doc, "author").as_deref(), Some("Jane Doe"));
        assert!(meta_name(&doc, "missing").is_none());
    }

    #[test]
    fn test_html_without_prunes_subtrees() {
        let doc = parse_document(
            "<article><p>keep</p><div class=\"subscribe-widget\"><p>drop</p></div>\
             <script>drop()</script><p>also keep</p></article>",
        );
        let article = select_first(&doc, "article").unwrap();
        let cleaned = html_without(article, &[".subscribe-widget", "script"]);
        assert!(cleaned.contains("keep"));
        assert!(cleaned.contains("also keep"));
        assert!(!cleaned.contains("drop"));
        assert!(!cleaned.contains("subscribe-widget"));
    }

    #[test]
    fn test_strip_title_suffix() {
        assert_eq!(
            strip_title_suffix("Big Launch | Example News"),
            "Big Launch"
        );
        assert_eq!(
            strip_title_suffix("Big Launch – Example News"),
            "Big Launch"
        );
        assert_eq!(
            strip_title_suffix("Self-hosting e-mail"),
            "Self-hosting e-mail"
        );
        assert_eq!(strip_title_suffix("No separator here"), "No separator here");
    }

    #[test]
    fn test_code_language_detection_and_aliases() {
        let doc = parse_document(
            "<pre class=\"language-py\"><code>print()</code></pre>\
             <code class=\"hljs-js\">x</code>\
             <div data-language=\"Rust\">fn</div>\
             <pre class=\"lang-yml\">a: 1</pre>",
        );
        let langs = code_languages(&doc);
        assert!(langs.contains(&"python".to_string()));
        assert!(langs.contains(&"javascript".to_string()));
        assert!(langs.contains(&"rust".to_string()));
        assert!(langs.contains(&"yaml".to_string()));
    }

    #[test]
    fn test_reading_time_floor() {
        assert_eq!(reading_time_minutes(10), 1);
        assert_eq!(reading_time_minutes(225), 1);
        assert_eq!(reading_time_minutes(900), 4);
    }

    #[test]
    fn test_fragment_text_strips_markup() {
        assert_eq!(
            fragment_text("<p>Hello <b>world</b></p>\n<p>again</p>"),
            "Hello world again"
        );
    }
}
