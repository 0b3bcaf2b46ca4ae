//! Inline rendering of body markup
//!
//! Produces text in which every footnote anchor is replaced by
//! `ANCHOR_MARK`, with the anchor markers and their source text collected
//! in order. Line breaks
//! (`<br>` and nested block boundaries) become `\n`; runs of ASCII
//! whitespace collapse to one space while non-breaking spaces survive so
//! that verse indentation can still be measured.

use crate::footnotes::anchor_marker;
use crate::html::{element_text, tag_name};
use crate::segment::{placeholder_regex, superscript_digit};
use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::ElementRef;

/// Stand-in for an anchor inside rendered text
pub const ANCHOR_MARK: char = '\u{E000}';

const BREAKING_TAGS: &[&str] = &[
    "p", "div", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "tr", "dd", "dt", "pre",
    "section", "article", "ul", "ol", "dl", "table",
];

/// One anchor: its marker and the text it replaced
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub marker: String,
    pub surface: String,
}

/// Rendered text plus the anchors it contains, in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Marked {
    pub text: String,
    pub markers: Vec<Mark>,
}

impl Marked {
    fn push_text(&mut self, raw: &str) {
        let raw: String = raw.chars().filter(|c| *c != ANCHOR_MARK).collect();

        let mut rest: &str = &raw;
        if let Some(re) = placeholder_regex() {
            while let Some(caps) = re.captures(rest) {
                let (Some(whole), Some(key)) = (caps.get(0), caps.get(1)) else {
                    break;
                };
                self.push_superscripts(&rest[..whole.start()]);
                self.push_anchor(key.as_str().to_string(), whole.as_str().to_string());
                rest = &rest[whole.end()..];
            }
        }
        self.push_superscripts(rest);
    }

    /// Plain text in which runs of superscript digits are anchors
    fn push_superscripts(&mut self, text: &str) {
        let mut plain = String::new();
        let mut run = String::new();
        let mut surface = String::new();
        for c in text.chars() {
            match superscript_digit(c) {
                Some(d) => {
                    run.push(d);
                    surface.push(c);
                }
                None => {
                    if !run.is_empty() {
                        self.push_plain(&std::mem::take(&mut plain));
                        self.push_anchor(std::mem::take(&mut run), std::mem::take(&mut surface));
                    }
                    plain.push(c);
                }
            }
        }
        self.push_plain(&plain);
        if !run.is_empty() {
            self.push_anchor(run, surface);
        }
    }

    fn push_plain(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_ascii_whitespace() {
                match self.text.chars().last() {
                    None | Some(' ') | Some('\n') => {}
                    Some(_) => self.text.push(' '),
                }
            } else {
                self.text.push(c);
            }
        }
    }

    fn push_anchor(&mut self, marker: String, surface: String) {
        self.text.push(ANCHOR_MARK);
        self.markers.push(Mark { marker, surface });
    }

    fn hard_break(&mut self) {
        if self.text.ends_with(' ') {
            self.text.pop();
        }
        self.text.push('\n');
    }

    fn soft_break(&mut self) {
        if self.text.ends_with(' ') {
            self.text.pop();
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
    }
}

/// Render a sequence of sibling nodes
pub fn render_nodes<'a, I>(nodes: I) -> Marked
where
    I: IntoIterator<Item = NodeRef<'a, Node>>,
{
    let mut out = Marked::default();
    for node in nodes {
        walk(node, &mut out, false);
    }
    out
}

/// Render a list item without the nested lists it contains
pub fn render_list_item(li: ElementRef<'_>) -> Marked {
    let mut out = Marked::default();
    for child in li.children() {
        walk(child, &mut out, true);
    }
    out
}

fn walk(node: NodeRef<'_, Node>, out: &mut Marked, skip_lists: bool) {
    match node.value() {
        Node::Text(text) => out.push_text(text),
        Node::Element(_) => {
            let Some(el) = ElementRef::wrap(node) else {
                return;
            };
            let tag = tag_name(el);
            match tag.as_str() {
                "br" => out.hard_break(),
                "script" | "style" | "noscript" | "img" => {}
                "ul" | "ol" if skip_lists => {}
                _ => {
                    if let Some(marker) = anchor_marker(el) {
                        out.push_anchor(marker, element_text(el));
                        return;
                    }
                    let breaking = BREAKING_TAGS.contains(&tag.as_str());
                    if breaking {
                        out.soft_break();
                    }
                    for child in el.children() {
                        walk(child, out, skip_lists);
                    }
                    if breaking {
                        out.soft_break();
                    }
                }
            }
        }
        _ => {}
    }
}

/// Remove marks, returning the clean text and the char offset of each mark
pub fn strip_marks(text: &str) -> (String, Vec<usize>) {
    let mut clean = String::with_capacity(text.len());
    let mut positions = Vec::new();
    let mut count = 0usize;
    for c in text.chars() {
        if c == ANCHOR_MARK {
            positions.push(count);
        } else {
            clean.push(c);
            count += 1;
        }
    }
    (clean, positions)
}
