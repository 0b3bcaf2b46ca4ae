//! Verse/prose line extraction
//!
//! A body with at least three `<br` markers is verse: each rendered line
//! becomes one output line with its leading-whitespace indent. Anything
//! else is prose: one line per block-level element. Lines still carry
//! anchor marks; callers strip them.

use crate::html::{collapse_whitespace, select_all, tag_name};
use crate::render::{render_list_item, render_nodes, Mark, ANCHOR_MARK};
use crate::segment::{Block, BlockKind};
use regex::Regex;
use scraper::ElementRef;
use std::sync::OnceLock;

/// Minimum number of line-break markers for a body to count as verse
pub const VERSE_BREAK_THRESHOLD: usize = 3;

/// One output line; `text` may contain anchor marks
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub indent_level: u32,
    pub is_heading: bool,
    /// Index of the source block, used to rebuild paragraph breaks
    pub block: usize,
}

impl Line {
    /// Text without anchor marks
    pub fn clean_text(&self) -> String {
        self.text.chars().filter(|c| *c != ANCHOR_MARK).collect()
    }
}

/// Lines of one passage plus the anchors they contain, in order
#[derive(Debug, Clone, Default)]
pub struct LineLayout {
    pub is_verse: bool,
    pub lines: Vec<Line>,
    pub markers: Vec<Mark>,
}

impl LineLayout {
    /// Put the source text back in place of every anchor whose marker
    /// `is_known` rejects; only accepted anchors keep their mark
    pub fn restore_unmatched<F>(&mut self, is_known: F)
    where
        F: Fn(&str) -> bool,
    {
        let mut marks = std::mem::take(&mut self.markers).into_iter();
        let mut kept = Vec::new();

        for line in &mut self.lines {
            if !line.text.contains(ANCHOR_MARK) {
                continue;
            }
            let mut text = String::with_capacity(line.text.len());
            for c in line.text.chars() {
                if c != ANCHOR_MARK {
                    text.push(c);
                    continue;
                }
                match marks.next() {
                    Some(mark) if is_known(&mark.marker) => {
                        text.push(ANCHOR_MARK);
                        kept.push(mark);
                    }
                    Some(mark) => text.push_str(&mark.surface),
                    None => {}
                }
            }
            line.text = text;
        }

        self.markers = kept;
    }
}

/// Verse iff the raw markup holds at least `VERSE_BREAK_THRESHOLD` breaks
pub fn is_verse_markup(html: &str) -> bool {
    html.to_ascii_lowercase().matches("<br").count() >= VERSE_BREAK_THRESHOLD
}

/// Width of leading whitespace in non-breaking-space units
fn split_indent(line: &str) -> (u32, &str) {
    let mut width = 0u32;
    for (i, c) in line.char_indices() {
        if !c.is_whitespace() {
            return (width, &line[i..]);
        }
        width += match c {
            '\u{2003}' | '\u{3000}' => 2,
            ' ' | '\t' | '\n' | '\r' => 0,
            _ => 1,
        };
    }
    (width, "")
}

/// Join rendered text into a single line
fn one_line(text: &str) -> String {
    text.split('\n')
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn base_indent(el: Option<ElementRef<'_>>) -> u32 {
    match el.map(tag_name).as_deref() {
        Some("blockquote") => 1,
        _ => 0,
    }
}

/// Lay out body blocks as lines
pub fn layout(blocks: &[&Block<'_>], body_html: &str) -> LineLayout {
    let is_verse = is_verse_markup(body_html);
    let mut out = LineLayout {
        is_verse,
        ..LineLayout::default()
    };

    for (index, block) in blocks.iter().enumerate() {
        match block.kind {
            BlockKind::Table | BlockKind::Footnotes => {}
            BlockKind::Heading => {
                let marked = render_nodes(block.nodes.iter().copied());
                push_line(&mut out, one_line(&marked.text), 0, true, index);
                out.markers.extend(marked.markers);
            }
            BlockKind::List => {
                let Some(list) = block.as_element() else {
                    continue;
                };
                for li in select_all(list, "li") {
                    let depth = li
                        .ancestors()
                        .filter_map(ElementRef::wrap)
                        .take_while(|a| a.id() != list.id())
                        .filter(|a| tag_name(*a) == "li")
                        .count() as u32;
                    let marked = render_list_item(li);
                    if is_verse {
                        push_verse_lines(&mut out, &marked.text, 1 + depth, index);
                    } else {
                        push_line(&mut out, one_line(&marked.text), 1 + depth, false, index);
                    }
                    out.markers.extend(marked.markers);
                }
            }
            BlockKind::Paragraph | BlockKind::Container => {
                let marked = render_nodes(block.nodes.iter().copied());
                let indent = base_indent(block.as_element());
                if is_verse {
                    push_verse_lines(&mut out, &marked.text, indent, index);
                } else {
                    push_line(&mut out, one_line(&marked.text), indent, false, index);
                }
                out.markers.extend(marked.markers);
            }
        }
    }

    merge_orphan_enumerators(&mut out.lines);
    out
}

fn push_line(out: &mut LineLayout, text: String, indent_level: u32, is_heading: bool, block: usize) {
    let text = text.trim().to_string();
    if text.is_empty() {
        return;
    }
    out.lines.push(Line {
        text,
        indent_level,
        is_heading,
        block,
    });
}

fn push_verse_lines(out: &mut LineLayout, text: &str, base: u32, block: usize) {
    for raw in text.split('\n') {
        let (indent, rest) = split_indent(raw);
        let rest = rest.trim_end();
        if rest.is_empty() {
            continue;
        }
        out.lines.push(Line {
            text: rest.to_string(),
            indent_level: base + indent,
            is_heading: false,
            block,
        });
    }
}

fn orphan_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+|[IVXLCDM]+|[ivxlcdm]+|[A-Za-z])[.)]?$").ok())
        .as_ref()
}

/// A line holding nothing but a number, roman numeral or letter marker
pub fn is_orphan_enumerator(text: &str) -> bool {
    orphan_regex().is_some_and(|re| re.is_match(text.trim()))
}

/// Fold isolated enumerators into the line that follows them
fn merge_orphan_enumerators(lines: &mut Vec<Line>) {
    let mut merged: Vec<Line> = Vec::with_capacity(lines.len());
    let mut pending: Option<Line> = None;

    for mut line in lines.drain(..) {
        if let Some(orphan) = pending.take() {
            line.text = format!("{} {}", orphan.text, line.text);
        }
        if is_orphan_enumerator(&line.text) {
            pending = Some(line);
        } else {
            merged.push(line);
        }
    }
    if let Some(orphan) = pending {
        merged.push(orphan);
    }

    *lines = merged;
}

/// Lines, or a single fallback line of the whole text when there are none
pub fn lines_or_fallback(layout: &LineLayout, full_text: &str) -> Vec<Line> {
    let lines: Vec<Line> = layout
        .lines
        .iter()
        .filter(|l| !l.clean_text().trim().is_empty())
        .cloned()
        .collect();
    if !lines.is_empty() {
        return lines;
    }
    vec![Line {
        text: collapse_whitespace(full_text),
        indent_level: 0,
        is_heading: false,
        block: 0,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::segment;
    use scraper::Html;

    fn layout_of(html: &str) -> LineLayout {
        let doc = Html::parse_document(html);
        let seg = segment(&doc);
        let blocks: Vec<_> = seg.body_blocks().collect();
        layout(&blocks, &seg.body_html())
    }

    #[test]
    fn test_two_breaks_is_prose() {
        let l = layout_of("<html><body><p>eins<br>zwei<br>drei</p></body></html>");
        assert!(!l.is_verse);
        assert_eq!(l.lines.len(), 1);
        assert_eq!(l.lines[0].text, "eins zwei drei");
    }

    #[test]
    fn test_three_breaks_is_verse() {
        let l = layout_of(
            "<html><body><p>eins<br>\u{a0}\u{a0}zwei<br>drei<br>vier</p></body></html>",
        );
        assert!(l.is_verse);
        let texts: Vec<_> = l.lines.iter().map(|x| x.text.as_str()).collect();
        assert_eq!(texts, vec!["eins", "zwei", "drei", "vier"]);
        assert_eq!(l.lines[1].indent_level, 2);
        assert_eq!(l.lines[0].indent_level, 0);
    }

    #[test]
    fn test_prose_blocks_and_indents() {
        let l = layout_of(
            "<html><body><div><h3>Kapitel</h3><p>Absatz.</p><blockquote>Zitat.</blockquote><ul><li>Punkt</li></ul></div></body></html>",
        );
        assert!(!l.is_verse);
        let summary: Vec<_> = l
            .lines
            .iter()
            .map(|x| (x.text.as_str(), x.indent_level, x.is_heading))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Kapitel", 0, true),
                ("Absatz.", 0, false),
                ("Zitat.", 1, false),
                ("Punkt", 1, false)
            ]
        );
    }

    #[test]
    fn test_orphan_enumerators_merge_forward() {
        let l = layout_of(
            "<html><body><div><p>1.</p><p>Im Anfang.</p><p>IV</p><p>Weiter.</p><p>b)</p></div></body></html>",
        );
        let texts: Vec<_> = l.lines.iter().map(|x| x.text.as_str()).collect();
        assert_eq!(texts, vec!["1. Im Anfang.", "IV Weiter.", "b)"]);
    }

    #[test]
    fn test_restore_unmatched_keeps_only_known_anchors() {
        let mut l = layout_of(
            "<html><body><p>Wort<sup>1</sup> und 20 m² am 1<sup>te</sup> Tag.</p></body></html>",
        );
        assert_eq!(l.markers.len(), 3);
        l.restore_unmatched(|marker| marker == "1");

        assert_eq!(l.markers.len(), 1);
        assert_eq!(l.markers[0].marker, "1");
        assert_eq!(l.lines[0].clean_text(), "Wort und 20 m² am 1te Tag.");
        assert_eq!(l.lines[0].text.matches(ANCHOR_MARK).count(), 1);
    }

    #[test]
    fn test_fallback_line_when_empty() {
        let l = LineLayout::default();
        let lines = lines_or_fallback(&l, "  nur   Text ");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "nur Text");
    }

    #[test]
    fn test_orphan_pattern() {
        assert!(is_orphan_enumerator("12."));
        assert!(is_orphan_enumerator("xiv)"));
        assert!(is_orphan_enumerator("a"));
        assert!(!is_orphan_enumerator("Amen."));
    }
}
