//! Small HTML and text helpers shared by the extraction stages

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use url::Url;

/// Collapse every whitespace run into one space and trim
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Accent-, case- and ß-insensitive form used for keyword matching
pub fn normalize_for_match(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .replace('ß', "ss")
}

/// Whitespace-collapsed text content of an element
pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

/// Lowercased tag name
pub fn tag_name(el: ElementRef<'_>) -> String {
    el.value().name().to_ascii_lowercase()
}

/// Lowercased class names of an element
pub fn classes(el: ElementRef<'_>) -> Vec<String> {
    el.value().classes().map(|c| c.to_ascii_lowercase()).collect()
}

/// True if any class contains one of the hints
pub fn class_contains(el: ElementRef<'_>, hints: &[&str]) -> bool {
    classes(el)
        .iter()
        .any(|c| hints.iter().any(|h| c.contains(h)))
}

pub fn is_heading_tag(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Iterate element children only
pub fn child_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children().filter_map(ElementRef::wrap)
}

/// Descendant elements in document order, excluding `el` itself
pub fn descendant_elements<'a>(el: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.descendants().skip(1).filter_map(ElementRef::wrap)
}

/// Select with a CSS selector, yielding nothing for an invalid selector
pub fn select_all<'a>(el: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => el.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Select the first match in a whole document
pub fn select_first<'a>(doc: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    doc.select(&selector).next()
}

/// Escape text for embedding in HTML
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Outer HTML of an arbitrary node (text nodes are escaped)
pub fn node_html(node: ego_tree::NodeRef<'_, Node>) -> String {
    if let Some(el) = ElementRef::wrap(node) {
        return el.html();
    }
    match node.value() {
        Node::Text(text) => escape_text(text),
        _ => String::new(),
    }
}

/// Resolve `href` against `base`
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with("mailto:") {
        return None;
    }
    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

/// Count words the way a reader would (Unicode word boundaries)
pub fn word_count(text: &str) -> usize {
    use unicode_segmentation::UnicodeSegmentation;
    text.unicode_words().count()
}
