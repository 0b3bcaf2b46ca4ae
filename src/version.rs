//! Version root page metadata: author, titles, genre, edition and date

use crate::html::{collapse_whitespace, element_text, is_heading_tag, select_all, select_first, tag_name};
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

/// Metadata read from a version's root page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VersionMeta {
    pub author_name: String,
    pub lifespan: Option<String>,
    pub title: String,
    pub title_original: Option<String>,
    pub genre: Option<String>,
    pub edition_info: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

const UNKNOWN_AUTHOR: &str = "Unbekannt";
const UNTITLED: &str = "Ohne Titel";

fn regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

fn author_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&RE, r"^(?P<name>.+?)\s*\((?P<years>\d{1,4}.*?\d{1,4})\)")
}

fn title_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&RE, r"^(?P<trans>.+?)\s*\((?P<orig>[^()]+)\)")
}

fn years_only_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    regex(&RE, r"^[\d\s\-–.]+$")
}

/// Parse a version root page
pub fn parse_version(html: &str) -> VersionMeta {
    let doc = Html::parse_document(html);
    let root = select_first(&doc, "body").unwrap_or_else(|| doc.root_element());
    let headings: Vec<ElementRef<'_>> = select_all(root, "h1, h2, h3, h4");
    let lines = text_lines(root);

    let mut meta = VersionMeta::default();

    // Author: "Name (340-397)" anywhere, else the first heading
    if let Some(caps) = author_regex().and_then(|re| lines.iter().find_map(|l| re.captures(l))) {
        meta.author_name = caps["name"].trim().to_string();
        meta.lifespan = Some(caps["years"].trim().to_string());
    } else if let Some(first) = headings.iter().map(|h| element_text(*h)).find(|t| !t.is_empty()) {
        meta.author_name = first;
    } else if let Some(first) = lines.first() {
        meta.author_name = first.clone();
    }
    if meta.author_name.is_empty() {
        meta.author_name = UNKNOWN_AUTHOR.to_string();
    }

    // Title: "Translation (Original)"
    for heading in &headings {
        let text = element_text(*heading);
        let Some(caps) = title_regex().and_then(|re| re.captures(&text)) else {
            continue;
        };
        let original = caps["orig"].trim();
        if years_only_regex().is_some_and(|re| re.is_match(original)) {
            continue;
        }
        meta.title = caps["trans"].trim().to_string();
        meta.title_original = Some(original.to_string());
        break;
    }
    if meta.title.is_empty() {
        meta.title = headings
            .iter()
            .map(|h| element_text(*h))
            .find(|t| !t.is_empty() && !t.starts_with(&meta.author_name))
            .or_else(|| select_first(&doc, "title").map(element_text).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| UNTITLED.to_string());
    }

    meta.genre = select_all(root, "small").into_iter().find_map(|sm| {
        let text = element_text(sm).to_lowercase();
        if text.contains("übersetzung") {
            Some("translation".to_string())
        } else if text.contains("kommentar") {
            Some("commentary".to_string())
        } else if text.contains("edition") {
            Some("edition".to_string())
        } else {
            None
        }
    });

    for heading in &headings {
        let label = element_text(*heading).to_lowercase();
        if label.contains("bibliographische angabe") {
            let text = text_until_next_heading(*heading);
            if !text.is_empty() {
                meta.edition_info = Some(text);
            }
        } else if label == "datum" {
            let (from, to) = parse_years(&text_until_next_heading(*heading));
            meta.year_from = from;
            meta.year_to = to;
        }
    }

    meta
}

fn text_lines(root: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|p| matches!(tag_name(p).as_str(), "script" | "style" | "noscript"));
        if skipped {
            continue;
        }
        let line = collapse_whitespace(text);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Text of the siblings following `heading` up to the next heading
fn text_until_next_heading(heading: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    for sibling in heading.next_siblings() {
        match sibling.value() {
            Node::Text(text) => parts.push(text.to_string()),
            Node::Element(_) => {
                let Some(el) = ElementRef::wrap(sibling) else {
                    continue;
                };
                if is_heading_tag(&tag_name(el)) {
                    break;
                }
                parts.push(element_text(el));
            }
            _ => {}
        }
    }
    collapse_whitespace(&parts.join(" "))
}

/// `4. Jh.` → 300..=399, `390-400` → range, `390` → single year
pub fn parse_years(text: &str) -> (Option<i32>, Option<i32>) {
    static CENTURY: OnceLock<Option<Regex>> = OnceLock::new();
    static RANGE: OnceLock<Option<Regex>> = OnceLock::new();
    static YEAR: OnceLock<Option<Regex>> = OnceLock::new();

    let text = text.trim();
    if let Some(caps) = regex(&CENTURY, r"^(\d+)\.\s*Jh").and_then(|re| re.captures(text)) {
        if let Ok(century) = caps[1].parse::<i32>() {
            return (Some((century - 1) * 100), Some(century * 100 - 1));
        }
    }
    if let Some(caps) = regex(&RANGE, r"^(\d{1,4})\s*[-–]\s*(\d{1,4})").and_then(|re| re.captures(text)) {
        return (caps[1].parse().ok(), caps[2].parse().ok());
    }
    if let Some(caps) = regex(&YEAR, r"^(\d{1,4})").and_then(|re| re.captures(text)) {
        return (caps[1].parse().ok(), None);
    }
    (None, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>BKV</title></head><body>
        <h2>Ambrosius von Mailand (340-397)</h2>
        <small>Übersetzung (Deutsch)</small>
        <h1>Der Tod ein Gut (De bono mortis)</h1>
        <h3>Bibliographische Angabe</h3>
        <p>Des heiligen Kirchenlehrers Ambrosius ausgewählte Schriften,
           Kempten 1917.</p>
        <h3>Datum</h3>
        <p>4. Jh.</p>
        <h3>Inhaltsangabe</h3>
    </body></html>"#;

    #[test]
    fn test_parse_version_page() {
        let meta = parse_version(PAGE);
        assert_eq!(meta.author_name, "Ambrosius von Mailand");
        assert_eq!(meta.lifespan.as_deref(), Some("340-397"));
        assert_eq!(meta.title, "Der Tod ein Gut");
        assert_eq!(meta.title_original.as_deref(), Some("De bono mortis"));
        assert_eq!(meta.genre.as_deref(), Some("translation"));
        assert_eq!(
            meta.edition_info.as_deref(),
            Some("Des heiligen Kirchenlehrers Ambrosius ausgewählte Schriften, Kempten 1917.")
        );
        assert_eq!((meta.year_from, meta.year_to), (Some(300), Some(399)));
    }

    #[test]
    fn test_fallbacks() {
        let meta = parse_version("<html><body><h1>Basilius</h1><h2>Homilien</h2></body></html>");
        assert_eq!(meta.author_name, "Basilius");
        assert_eq!(meta.lifespan, None);
        assert_eq!(meta.title, "Homilien");
        assert_eq!(meta.genre, None);

        let empty = parse_version("<html><body></body></html>");
        assert_eq!(empty.author_name, UNKNOWN_AUTHOR);
        assert_eq!(empty.title, UNTITLED);
    }

    #[test]
    fn test_parse_years() {
        assert_eq!(parse_years("4. Jh."), (Some(300), Some(399)));
        assert_eq!(parse_years("390-400"), (Some(390), Some(400)));
        assert_eq!(parse_years("390"), (Some(390), None));
        assert_eq!(parse_years("unbekannt"), (None, None));
    }
}
