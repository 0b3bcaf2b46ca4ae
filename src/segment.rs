//! Division segmentation
//!
//! Locates the content container of a division page and splits it into an
//! ordered sequence of typed blocks. Navigation and decoration wrappers are
//! discarded; footnote regions become their own block kind and never leak
//! into body text.

use crate::html::{
    child_elements, class_contains, classes, collapse_whitespace, descendant_elements,
    element_text, is_heading_tag, node_html, normalize_for_match, select_first, tag_name,
};
use ego_tree::NodeRef;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use std::borrow::Cow;
use std::sync::OnceLock;

/// Class fragments that mark a footnote container
pub const FOOTNOTE_CLASS_HINTS: &[&str] = &["footnote", "fussnote", "endnote", "notes"];

/// Classes of wrappers that never hold content
pub const WRAPPER_SKIP_CLASSES: &[&str] = &[
    "detail-view-header",
    "division-footer",
    "ornament",
    "breadcrumb",
    "breadcrumbs",
    "sidebar",
    "content-navigation",
    "related-links",
    "edition-information",
    "meta",
    "metadata",
    "division-meta",
    "toolbar",
    "pagination",
];

/// Tags that are dropped wholesale
const SKIP_TAGS: &[&str] = &[
    "nav", "header", "footer", "script", "style", "noscript", "form", "button", "template",
];

/// Tags that start a new block when met as a container child
const BLOCK_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre", "address", "ul", "ol", "dl",
    "table", "hr", "div", "section", "article", "aside", "main", "figure", "center", "nav",
    "header", "footer", "script", "style", "noscript", "form", "template",
];

const CANDIDATE_TAGS: &[&str] = &["div", "section", "article", "main", "body"];

/// Labels that open a footnote region when they start a paragraph
const FOOTNOTE_LABELS: &[&str] = &["fussnoten", "footnotes", "anmerkungen"];

/// Elements whose text is never scanned for inline separators
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "noscript", "template", "textarea"];

/// Empty block inserted where body text runs into its notes
const SPLIT_MARKUP: &str = "<div data-split=\"notes\"></div>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Heading,
    Paragraph,
    List,
    Table,
    Footnotes,
    /// Wrapper without further content blocks, kept whole
    Container,
}

/// One typed block: a single element or a run of inline nodes
#[derive(Debug, Clone)]
pub struct Block<'a> {
    pub kind: BlockKind,
    pub nodes: Vec<NodeRef<'a, Node>>,
}

impl<'a> Block<'a> {
    fn element(kind: BlockKind, el: ElementRef<'a>) -> Self {
        Self {
            kind,
            nodes: vec![*el],
        }
    }

    /// The block's element when it wraps exactly one
    pub fn as_element(&self) -> Option<ElementRef<'a>> {
        match self.nodes.as_slice() {
            [node] => ElementRef::wrap(*node),
            _ => None,
        }
    }

    pub fn tag(&self) -> Option<String> {
        self.as_element().map(tag_name)
    }

    pub fn html(&self) -> String {
        self.nodes.iter().map(|n| node_html(*n)).collect()
    }

    /// Whitespace-collapsed text
    pub fn text(&self) -> String {
        let mut raw = String::new();
        for node in &self.nodes {
            for descendant in node.descendants() {
                if let Node::Text(text) = descendant.value() {
                    raw.push_str(text);
                    raw.push(' ');
                }
            }
        }
        collapse_whitespace(&raw)
    }

    pub fn is_body(&self) -> bool {
        self.kind != BlockKind::Footnotes
    }
}

/// Segmentation result for one page
#[derive(Debug, Clone, Default)]
pub struct Segmented<'a> {
    pub blocks: Vec<Block<'a>>,
}

impl<'a> Segmented<'a> {
    pub fn body_blocks(&self) -> impl Iterator<Item = &Block<'a>> {
        self.blocks.iter().filter(|b| b.is_body())
    }

    pub fn footnote_blocks(&self) -> impl Iterator<Item = &Block<'a>> {
        self.blocks.iter().filter(|b| !b.is_body())
    }

    /// Concatenated body markup
    pub fn body_html(&self) -> String {
        self.body_blocks().map(|b| b.html()).collect::<Vec<_>>().join("\n")
    }

    /// Body text without footnotes
    pub fn main_text(&self) -> String {
        self.body_blocks()
            .map(|b| b.text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Parse a division page, first splitting paragraphs in which the body
/// text runs straight into a separator or a footnote label
pub fn parse_division(html: &str) -> Html {
    Html::parse_document(&split_inline_notes(html))
}

/// Segment a parsed division page
pub fn segment(doc: &Html) -> Segmented<'_> {
    let root = content_root(doc);

    if descendant_elements(root).any(|el| class_contains(el, &["error-message"])) {
        return Segmented::default();
    }

    let container = select_container(root).unwrap_or(root);
    let mut blocks = Vec::new();
    flatten(container, &mut blocks);
    apply_footnote_separators(&mut blocks);

    // Footnote containers that sit outside the chosen container
    for el in descendant_elements(root) {
        if is_footnote_element(el)
            && !is_inside(el, container)
            && !is_inside(container, el)
            && !has_footnote_ancestor(el, root)
        {
            blocks.push(Block::element(BlockKind::Footnotes, el));
        }
    }

    Segmented { blocks }
}

fn content_root(doc: &Html) -> ElementRef<'_> {
    select_first(doc, "main")
        .or_else(|| select_first(doc, "body"))
        .unwrap_or_else(|| doc.root_element())
}

/// Pick the wrapper maximizing
/// `6·paragraphs + 3·headings + text_len/400 − 0.5·depth`
fn select_container(root: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let mut best: Option<(f64, ElementRef<'_>)> = None;
    let mut stack = vec![(root, 0usize)];

    while let Some((el, depth)) = stack.pop() {
        let children: Vec<_> = child_elements(el).filter(|c| !is_excluded(*c)).collect();
        for child in children.into_iter().rev() {
            stack.push((child, depth + 1));
        }

        let tag = tag_name(el);
        if !CANDIDATE_TAGS.contains(&tag.as_str()) {
            continue;
        }

        let paragraphs = child_elements(el).filter(|c| tag_name(*c) == "p").count();
        let headings = child_elements(el)
            .filter(|c| matches!(tag_name(*c).as_str(), "h1" | "h2" | "h3" | "h4"))
            .count();
        let text_len = element_text(el).chars().count();
        if paragraphs + headings == 0 && text_len < 200 {
            continue;
        }

        let score = 6.0 * paragraphs as f64 + 3.0 * headings as f64 + text_len as f64 / 400.0
            - 0.5 * depth as f64;
        if best.map_or(true, |(s, _)| score > s) {
            best = Some((score, el));
        }
    }

    best.map(|(_, el)| el)
}

fn is_skipped(el: ElementRef<'_>) -> bool {
    let tag = tag_name(el);
    SKIP_TAGS.contains(&tag.as_str())
        || classes(el)
            .iter()
            .any(|c| WRAPPER_SKIP_CLASSES.contains(&c.as_str()))
}

fn is_excluded(el: ElementRef<'_>) -> bool {
    is_skipped(el) || is_footnote_element(el)
}

/// Footnote containers: `<aside>`, class hints or footnote id prefixes
pub fn is_footnote_element(el: ElementRef<'_>) -> bool {
    let tag = tag_name(el);
    if tag == "aside" {
        return true;
    }
    if matches!(tag.as_str(), "sup" | "a" | "span") {
        return false;
    }
    if class_contains(el, FOOTNOTE_CLASS_HINTS) {
        return true;
    }
    match el.value().id() {
        Some(id) => {
            let id = id.to_ascii_lowercase();
            if id.starts_with("fnref") {
                return false;
            }
            id.starts_with("footnote")
                || id.starts_with("fussnote")
                || id.starts_with("fn-")
                || id.starts_with("fn:")
                || (id.starts_with("fn") && id[2..].starts_with(|c: char| c.is_ascii_digit()))
        }
        None => false,
    }
}

fn is_inside(el: ElementRef<'_>, ancestor: ElementRef<'_>) -> bool {
    el.ancestors().any(|a| a.id() == ancestor.id())
}

fn has_footnote_ancestor(el: ElementRef<'_>, root: ElementRef<'_>) -> bool {
    for ancestor in el.ancestors() {
        if ancestor.id() == root.id() {
            return false;
        }
        if let Some(a) = ElementRef::wrap(ancestor) {
            if is_footnote_element(a) {
                return true;
            }
        }
    }
    false
}

fn is_block_element(el: ElementRef<'_>) -> bool {
    BLOCK_TAGS.contains(&tag_name(el).as_str())
}

/// Walk container children, turning block elements into typed blocks and
/// grouping runs of inline nodes into paragraph blocks
fn flatten<'a>(container: ElementRef<'a>, blocks: &mut Vec<Block<'a>>) {
    let mut inline: Vec<NodeRef<'a, Node>> = Vec::new();

    for child in container.children() {
        match ElementRef::wrap(child) {
            Some(el) if is_block_element(el) => {
                flush_inline(&mut inline, blocks);
                push_block(el, blocks);
            }
            Some(_) => inline.push(child),
            None => {
                if let Node::Text(_) = child.value() {
                    inline.push(child);
                }
            }
        }
    }

    flush_inline(&mut inline, blocks);
}

fn flush_inline<'a>(inline: &mut Vec<NodeRef<'a, Node>>, blocks: &mut Vec<Block<'a>>) {
    if inline.is_empty() {
        return;
    }
    let block = Block {
        kind: BlockKind::Paragraph,
        nodes: std::mem::take(inline),
    };
    let has_image = block
        .nodes
        .iter()
        .flat_map(|n| n.descendants())
        .filter_map(ElementRef::wrap)
        .any(|el| tag_name(el) == "img");
    if !block.text().is_empty() || has_image {
        blocks.push(block);
    }
}

fn push_block<'a>(el: ElementRef<'a>, blocks: &mut Vec<Block<'a>>) {
    if is_skipped(el) {
        return;
    }
    if is_footnote_element(el) {
        blocks.push(Block::element(BlockKind::Footnotes, el));
        return;
    }

    let tag = tag_name(el);
    match tag.as_str() {
        t if is_heading_tag(t) => {
            if !element_text(el).is_empty() {
                blocks.push(Block::element(BlockKind::Heading, el));
            }
        }
        "p" | "blockquote" | "pre" | "address" => {
            let block = Block::element(BlockKind::Paragraph, el);
            if !block.text().is_empty() || contains_tag(el, "img") {
                blocks.push(block);
            }
        }
        "ul" | "ol" | "dl" => blocks.push(Block::element(BlockKind::List, el)),
        "table" => blocks.push(Block::element(BlockKind::Table, el)),
        "hr" => {}
        _ => {
            let has_blocks = child_elements(el).any(|c| is_block_element(c) && tag_name(c) != "hr");
            if has_blocks {
                flatten(el, blocks);
            } else if !element_text(el).is_empty() || contains_tag(el, "img") {
                blocks.push(Block::element(BlockKind::Container, el));
            }
        }
    }
}

fn contains_tag(el: ElementRef<'_>, tag: &str) -> bool {
    descendant_elements(el).any(|d| tag_name(d) == tag)
}

/// If `text` starts with an asterism (`* * *`), return the rest
pub fn strip_separator(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    let end = trimmed
        .find(|c: char| !(c == '*' || c == '⁂' || c.is_whitespace()))
        .unwrap_or(trimmed.len());
    let weight: usize = trimmed[..end]
        .chars()
        .map(|c| match c {
            '*' => 1,
            '⁂' => 3,
            _ => 0,
        })
        .sum();
    (weight >= 3).then(|| trimmed[end..].trim_start())
}

/// If `text` starts with a footnote label (`Fußnoten:`), return the rest
pub fn strip_footnote_label(text: &str) -> Option<&str> {
    let trimmed = text.trim_start();
    let (head, rest) = match trimmed.split_once(':') {
        Some((head, rest)) => (head, rest),
        None => (trimmed, ""),
    };
    let normalized = normalize_for_match(head.trim());
    if FOOTNOTE_LABELS.contains(&normalized.as_str()) {
        Some(rest.trim_start())
    } else {
        None
    }
}

/// Strip a leading separator, a leading footnote label, or both
pub fn strip_notes_opening(text: &str) -> Option<&str> {
    match strip_separator(text) {
        Some(rest) => Some(strip_footnote_label(rest).unwrap_or(rest)),
        None => strip_footnote_label(text),
    }
}

fn tag_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").ok()).as_ref()
}

fn inline_separator_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\*(?:\s|&nbsp;|&#160;)*\*(?:\s|&nbsp;|&#160;)*\*").ok()
    })
    .as_ref()
}

/// A footnote label followed by a note marker or by the end of the text run
fn inline_label_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(?:fußnoten|fussnoten|fu&szlig;noten|footnotes|anmerkungen)\s*:(?:\s|&nbsp;)*(?:$|\[?\d|[a-z][.)])",
        )
        .ok()
    })
    .as_ref()
}

/// Closing flag and lowercase name of a tag
fn tag_info(tag: &str) -> (bool, String) {
    let inner = tag.trim_start_matches('<');
    let closing = inner.starts_with('/');
    let name = inner
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    (closing, name)
}

/// Offset in one text run where the notes begin
///
/// A separator needs body text before it in the same run or a preceding
/// `<br>`; a label must also follow the end of a sentence. Openings at the
/// start of a block are left to the block-level pass.
fn notes_start_in_text(text: &str, after_break: bool) -> Option<usize> {
    let has_lead = |at: usize| {
        let before = text[..at].replace("&nbsp;", " ");
        let before = before.trim();
        if before.is_empty() {
            None
        } else {
            Some(before.ends_with(['.', '!', '?', ';', ')', ']']))
        }
    };

    let separator = inline_separator_regex().and_then(|re| {
        re.find_iter(text)
            .find(|m| has_lead(m.start()).map_or(after_break, |_| true))
            .map(|m| m.start())
    });
    let label = inline_label_regex().and_then(|re| {
        re.find_iter(text)
            .find(|m| has_lead(m.start()).unwrap_or(after_break))
            .map(|m| m.start())
    });

    match (separator, label) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Byte offset in the raw markup of the first inline notes opening
fn inline_notes_offset(html: &str) -> Option<usize> {
    let tags = tag_regex()?;
    let start = html.to_ascii_lowercase().find("<body").unwrap_or(0);

    let mut cursor = start;
    let mut after_break = false;
    let mut raw_text: Option<String> = None;

    for tag in tags.find_iter(&html[start..]) {
        let tag_start = start + tag.start();
        if raw_text.is_none() {
            if let Some(at) = notes_start_in_text(&html[cursor..tag_start], after_break) {
                return Some(cursor + at);
            }
        }

        let (closing, name) = tag_info(tag.as_str());
        let closes_raw = raw_text.as_deref().is_some_and(|open| closing && open == name);
        if closes_raw {
            raw_text = None;
        } else if raw_text.is_none() && !closing && RAW_TEXT_TAGS.contains(&name.as_str()) {
            raw_text = Some(name.clone());
        }
        after_break = name == "br";
        cursor = start + tag.end();
    }

    if raw_text.is_some() {
        return None;
    }
    notes_start_in_text(&html[cursor..], after_break).map(|at| cursor + at)
}

/// Insert an empty block element where body text runs into a separator or a
/// footnote label, so that the parser closes the paragraph there
pub fn split_inline_notes(html: &str) -> Cow<'_, str> {
    match inline_notes_offset(html) {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + SPLIT_MARKUP.len());
            out.push_str(&html[..at]);
            out.push_str(SPLIT_MARKUP);
            out.push_str(&html[at..]);
            Cow::Owned(out)
        }
        None => Cow::Borrowed(html),
    }
}

/// After a separator or a footnote label, the remaining blocks of the
/// division are footnote content
fn apply_footnote_separators(blocks: &mut Vec<Block<'_>>) {
    let mut in_notes = false;
    let mut seen_body = false;
    let mut i = 0;

    while i < blocks.len() {
        if in_notes {
            if blocks[i].kind != BlockKind::Heading {
                blocks[i].kind = BlockKind::Footnotes;
                i += 1;
            } else {
                blocks.remove(i);
            }
            continue;
        }

        let kind = blocks[i].kind;
        if seen_body && matches!(kind, BlockKind::Paragraph | BlockKind::Container | BlockKind::Heading) {
            let text = blocks[i].text();
            if let Some(rest) = strip_notes_opening(&text) {
                in_notes = true;
                if rest.is_empty() || kind == BlockKind::Heading {
                    blocks.remove(i);
                } else {
                    blocks[i].kind = BlockKind::Footnotes;
                    i += 1;
                }
                continue;
            }
        }

        if blocks[i].is_body() {
            seen_body = true;
        }
        i += 1;
    }
}

pub(crate) fn superscript_digit(c: char) -> Option<char> {
    match c {
        '⁰' => Some('0'),
        '¹' => Some('1'),
        '²' => Some('2'),
        '³' => Some('3'),
        '⁴' => Some('4'),
        '⁵' => Some('5'),
        '⁶' => Some('6'),
        '⁷' => Some('7'),
        '⁸' => Some('8'),
        '⁹' => Some('9'),
        _ => None,
    }
}

/// Rewrite runs of Unicode superscript digits into `[^N]` placeholders
/// where `keep` accepts the folded key; other runs stay as they are
pub fn rewrite_superscripts<F>(text: &str, keep: F) -> Cow<'_, str>
where
    F: Fn(&str) -> bool,
{
    if !text.chars().any(|c| superscript_digit(c).is_some()) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    let mut run = String::new();
    let mut surface = String::new();
    for c in text.chars() {
        match superscript_digit(c) {
            Some(d) => {
                run.push(d);
                surface.push(c);
            }
            None => {
                flush_superscripts(&mut out, &mut run, &mut surface, &keep);
                out.push(c);
            }
        }
    }
    flush_superscripts(&mut out, &mut run, &mut surface, &keep);
    Cow::Owned(out)
}

fn flush_superscripts<F>(out: &mut String, run: &mut String, surface: &mut String, keep: &F)
where
    F: Fn(&str) -> bool,
{
    if run.is_empty() {
        return;
    }
    if keep(run) {
        out.push_str("[^");
        out.push_str(run);
        out.push(']');
    } else {
        out.push_str(surface);
    }
    run.clear();
    surface.clear();
}

/// Matches `[^KEY]` placeholders
pub fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\^([^\]\s]{1,8})\]").ok())
        .as_ref()
}
