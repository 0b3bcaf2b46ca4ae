//! Footnote resolution
//!
//! Reads footnote entries out of a division's footnote blocks, recognizes
//! anchors in the body and links the two per division. Keys are scoped to
//! one division because numbering restarts across divisions.

use crate::html::{
    child_elements, class_contains, collapse_whitespace, element_text, escape_text, select_all,
    tag_name,
};
use crate::segment::{strip_notes_opening, Block};
use regex::Regex;
use scraper::ElementRef;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Id prefixes stripped before an id is used as a key
const ID_PREFIXES: &[&str] = &["footnote", "fussnote", "fn", "note", "anm"];

/// Characters of context kept on each side of an anchor
const SNIPPET_RADIUS: usize = 60;

/// One footnote entry of a division
#[derive(Debug, Clone, PartialEq)]
pub struct FootnoteEntry {
    /// Normalized key used for matching
    pub key: String,
    pub html: String,
    pub text: String,
}

/// One anchor occurrence in a passage's plain text
#[derive(Debug, Clone, PartialEq)]
pub struct Anchor {
    pub marker: String,
    pub position_char: usize,
}

/// A matched anchor
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    /// Index into the entry slice
    pub entry: usize,
    /// Raw marker, suffixed `@n` from the second occurrence of a key on
    pub origin_anchor: String,
    pub position_char: usize,
    pub context_snippet: String,
}

/// Canonical form of a footnote key: brackets and trailing punctuation
/// removed, superscript digits folded, lowercase
pub fn normalize_key(raw: &str) -> String {
    let folded: String = raw
        .chars()
        .map(|c| match c {
            '⁰' => '0',
            '¹' => '1',
            '²' => '2',
            '³' => '3',
            '⁴' => '4',
            '⁵' => '5',
            '⁶' => '6',
            '⁷' => '7',
            '⁸' => '8',
            '⁹' => '9',
            other => other,
        })
        .collect();
    folded
        .trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '[' | ']' | '(' | ')' | '.' | '*' | '^' | ':')
        })
        .to_lowercase()
}

/// A marker short enough to be a footnote reference
fn is_short_token(raw: &str) -> bool {
    let key = normalize_key(raw);
    !key.is_empty() && key.chars().count() <= 4 && key.chars().all(|c| c.is_alphanumeric())
}

fn is_note_ref_link(el: ElementRef<'_>) -> bool {
    if class_contains(el, &["footnote", "fnref", "noteref", "fussnote"]) {
        return true;
    }
    if el.value().attr("role") == Some("doc-noteref") {
        return true;
    }
    match el.value().attr("href").and_then(|h| h.split_once('#')) {
        Some((_, fragment)) => {
            let f = fragment.to_ascii_lowercase();
            f.starts_with("fn") || f.starts_with("footnote") || f.starts_with("note")
                || f.starts_with("fussnote") || f.starts_with("anm")
        }
        None => false,
    }
}

fn key_from_id(id: &str) -> Option<String> {
    let lower = id.to_ascii_lowercase();
    let (last, mut separated) = match lower.rsplit_once(':') {
        Some((_, last)) => (last, true),
        None => (lower.as_str(), false),
    };
    let rest = match ID_PREFIXES.iter().find_map(|p| last.strip_prefix(*p)) {
        Some(rest) => {
            let trimmed = rest.trim_start_matches(['-', '_']);
            separated |= trimmed.len() != rest.len();
            trimmed
        }
        None => last,
    };
    // "footnotes" must not turn into key "s"
    let has_digit = rest.chars().any(|c| c.is_ascii_digit());
    (is_short_token(rest) && (has_digit || separated)).then(|| normalize_key(rest))
}

/// Marker of an anchor element: a superscript holding a short token, or a
/// link tagged as a footnote reference
pub fn anchor_marker(el: ElementRef<'_>) -> Option<String> {
    match tag_name(el).as_str() {
        "sup" => {
            let text = element_text(el);
            is_short_token(&text).then(|| text.trim().to_string())
        }
        "a" if is_note_ref_link(el) => {
            let text = element_text(el);
            if is_short_token(&text) {
                return Some(text.trim().to_string());
            }
            let fragment = el.value().attr("href")?.split_once('#')?.1;
            key_from_id(fragment)
        }
        _ => None,
    }
}

fn leading_marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[?(\d{1,3}|[A-Za-z])[.)\]]\s*").ok())
        .as_ref()
}

fn inline_marker_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|\s)\[?(\d{1,3}|[A-Za-z])[.)\]]\s+").ok())
        .as_ref()
}

/// Key expected to follow `key` in a numbered sequence
fn successor(key: &str) -> Option<String> {
    if let Ok(n) = key.parse::<u32>() {
        return Some((n + 1).to_string());
    }
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() && c != 'z' && c != 'Z' => {
            Some(((c as u8) + 1) as char).map(|c| c.to_ascii_lowercase().to_string())
        }
        _ => None,
    }
}

/// Split free text at sequential markers (`1.` … `2.` …)
fn split_numbered(text: &str) -> Vec<(Option<String>, String)> {
    let Some(re) = inline_marker_regex() else {
        return vec![(None, text.trim().to_string())];
    };

    let mut cuts: Vec<(usize, usize, String)> = Vec::new();
    for caps in re.captures_iter(text) {
        let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let key = normalize_key(key.as_str());
        let accepted = match cuts.last() {
            None => text[..whole.start()].trim().is_empty(),
            Some((_, _, prev)) => successor(prev).as_deref() == Some(key.as_str()),
        };
        if accepted {
            cuts.push((whole.start(), whole.end(), key));
        }
    }

    if cuts.is_empty() {
        return vec![(None, text.trim().to_string())];
    }

    let mut out = Vec::with_capacity(cuts.len());
    for (i, (_, body_start, key)) in cuts.iter().enumerate() {
        let end = cuts.get(i + 1).map(|c| c.0).unwrap_or(text.len());
        out.push((Some(key.clone()), text[*body_start..end].trim().to_string()));
    }
    out
}

/// Entry read from an element (list item or keyed paragraph)
fn entry_from_element(el: ElementRef<'_>, ordinal: usize) -> FootnoteEntry {
    let mut text = element_text(el);
    let html = el.inner_html().trim().to_string();

    let explicit = el
        .value()
        .attr("data-footnote-number")
        .filter(|v| is_short_token(v))
        .map(normalize_key)
        .or_else(|| el.value().id().and_then(key_from_id))
        .or_else(|| {
            select_all(el, ".footnote-number")
                .first()
                .map(|n| element_text(*n))
                .filter(|t| is_short_token(t))
                .map(|t| normalize_key(&t))
        })
        .or_else(|| {
            select_all(el, "a[href*='#fnref']")
                .iter()
                .map(|a| element_text(*a))
                .find(|t| is_short_token(t))
                .map(|t| normalize_key(&t))
        });

    let key = match explicit {
        Some(key) => {
            // Drop a visible number label that repeats the key
            if let Some(rest) = strip_leading_marker(&text, &key) {
                text = rest;
            }
            key
        }
        None => match leading_marker(&text) {
            Some((key, rest)) => {
                text = rest;
                key
            }
            None => ordinal.to_string(),
        },
    };

    FootnoteEntry {
        key,
        html,
        text: text.trim_end_matches(['↩', '↑']).trim().to_string(),
    }
}

fn leading_marker(text: &str) -> Option<(String, String)> {
    let caps = leading_marker_regex()?.captures(text)?;
    let whole = caps.get(0)?;
    let key = normalize_key(caps.get(1)?.as_str());
    Some((key, text[whole.end()..].to_string()))
}

fn strip_leading_marker(text: &str, key: &str) -> Option<String> {
    match leading_marker(text) {
        Some((k, rest)) if k == key => Some(rest),
        _ => None,
    }
}

fn has_explicit_key(el: ElementRef<'_>) -> bool {
    el.value().attr("data-footnote-number").is_some()
        || el.value().id().and_then(key_from_id).is_some()
}

/// Free-text footnote content: split at markers, continuing the previous
/// entry when a paragraph carries no marker
fn push_text_entries(text: &str, entries: &mut Vec<FootnoteEntry>) {
    let text = strip_notes_opening(text).unwrap_or(text);
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return;
    }

    for (key, body) in split_numbered(&text) {
        match key {
            Some(key) => entries.push(FootnoteEntry {
                key,
                html: escape_text(&body),
                text: body,
            }),
            None => match entries.last_mut() {
                Some(prev) => {
                    prev.text = format!("{} {}", prev.text, body).trim().to_string();
                    prev.html = format!("{} {}", prev.html, escape_text(&body));
                }
                None => {
                    let ordinal = entries.len() + 1;
                    entries.push(FootnoteEntry {
                        key: ordinal.to_string(),
                        html: escape_text(&body),
                        text: body,
                    });
                }
            },
        }
    }
}

/// Extract the footnote entries of one division from its footnote blocks
pub fn extract_entries(blocks: &[&Block<'_>]) -> Vec<FootnoteEntry> {
    let mut entries: Vec<FootnoteEntry> = Vec::new();

    for block in blocks {
        let Some(el) = block.as_element() else {
            push_text_entries(&block.text(), &mut entries);
            continue;
        };

        let items = select_all(el, "li");
        if !items.is_empty() {
            for li in items {
                let entry = entry_from_element(li, entries.len() + 1);
                entries.push(entry);
            }
            continue;
        }

        if has_explicit_key(el) {
            let entry = entry_from_element(el, entries.len() + 1);
            entries.push(entry);
            continue;
        }

        let children: Vec<_> = child_elements(el)
            .filter(|c| matches!(tag_name(*c).as_str(), "p" | "div" | "dd" | "section"))
            .collect();
        if children.is_empty() {
            push_text_entries(&block.text(), &mut entries);
            continue;
        }
        for child in children {
            if has_explicit_key(child) {
                let entry = entry_from_element(child, entries.len() + 1);
                entries.push(entry);
            } else {
                push_text_entries(&element_text(child), &mut entries);
            }
        }
    }

    entries.retain(|e| !e.text.is_empty());
    entries
}

/// Link anchors to entries of the same division
///
/// Every occurrence of a known key yields one link; the same occurrence
/// (same key at the same position) is never linked twice.
pub fn link_anchors(
    entries: &[FootnoteEntry],
    anchors: &[Anchor],
    plain_text: &str,
) -> Vec<ResolvedLink> {
    let mut by_key: HashMap<&str, usize> = HashMap::new();
    for (i, entry) in entries.iter().enumerate() {
        by_key.entry(entry.key.as_str()).or_insert(i);
    }

    let chars: Vec<char> = plain_text.chars().collect();
    let mut seen: HashSet<(String, usize)> = HashSet::new();
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut links = Vec::new();

    for anchor in anchors {
        let key = normalize_key(&anchor.marker);
        let Some(&entry) = by_key.get(key.as_str()) else {
            continue;
        };
        if !seen.insert((key.clone(), anchor.position_char)) {
            continue;
        }

        let n = occurrences.entry(key).or_insert(0);
        *n += 1;
        let marker = anchor.marker.trim().to_string();
        let origin_anchor = if *n == 1 {
            marker
        } else {
            format!("{}@{}", marker, n)
        };

        links.push(ResolvedLink {
            entry,
            origin_anchor,
            position_char: anchor.position_char,
            context_snippet: context_snippet(&chars, anchor.position_char),
        });
    }

    links
}

fn context_snippet(chars: &[char], position: usize) -> String {
    let position = position.min(chars.len());
    let start = position.saturating_sub(SNIPPET_RADIUS);
    let end = (position + SNIPPET_RADIUS).min(chars.len());
    collapse_whitespace(&chars[start..end].iter().collect::<String>())
}
