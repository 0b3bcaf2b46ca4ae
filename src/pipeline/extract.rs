//! Per-unit extraction: segment, lay out lines, resolve footnotes, collect assets
//!
//! Everything here is synchronous and returns owned data so that no parsed
//! document is held across an await point.

use crate::footnotes::{
    extract_entries, link_anchors, normalize_key, Anchor, FootnoteEntry, ResolvedLink,
};
use crate::html::{collapse_whitespace, element_text, resolve_url, select_all, tag_name, word_count};
use crate::model::AssetKind;
use crate::render::strip_marks;
use crate::segment::{parse_division, rewrite_superscripts, segment, Block, BlockKind};
use crate::verse::{layout, lines_or_fallback};
use scraper::ElementRef;
use std::collections::HashSet;

/// One output line with anchor marks removed
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedLine {
    pub text: String,
    pub indent_level: u32,
    pub is_heading: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedAsset {
    pub kind: AssetKind,
    pub src_url: String,
    pub caption_text: Option<String>,
}

/// Everything extracted from one content-unit page
#[derive(Debug, Clone, Default)]
pub struct UnitContent {
    pub heading: Option<String>,
    pub html: String,
    pub plain_text: String,
    pub is_verse: bool,
    pub lines: Vec<ExtractedLine>,
    pub word_count: usize,
    pub footnotes: Vec<FootnoteEntry>,
    pub links: Vec<ResolvedLink>,
    pub assets: Vec<ExtractedAsset>,
}

impl UnitContent {
    pub fn has_content(&self) -> bool {
        !self.plain_text.trim().is_empty()
    }
}

/// Extract one unit page fetched from `url`
pub fn extract_unit(html: &str, url: &str) -> UnitContent {
    let doc = parse_division(html);
    let seg = segment(&doc);

    let body: Vec<&Block<'_>> = seg.body_blocks().collect();
    let notes: Vec<&Block<'_>> = seg.footnote_blocks().collect();
    let footnotes = extract_entries(&notes);
    let known: HashSet<&str> = footnotes.iter().map(|e| e.key.as_str()).collect();

    let raw_html = seg.body_html();
    let mut lines = layout(&body, &raw_html);
    // Superscripts and short <sup> tokens without a note are ordinary text
    lines.restore_unmatched(|marker| known.contains(normalize_key(marker).as_str()));
    let body_html = rewrite_superscripts(&raw_html, |key| known.contains(key)).into_owned();

    // Lines of one block join with '\n', blocks with a blank line
    let mut marked = String::new();
    let mut previous_block = None;
    for line in &lines.lines {
        match previous_block {
            None => {}
            Some(b) if b == line.block => marked.push('\n'),
            Some(_) => marked.push_str("\n\n"),
        }
        marked.push_str(&line.text);
        previous_block = Some(line.block);
    }
    let (plain_text, positions) = strip_marks(&marked);

    let anchors: Vec<Anchor> = lines
        .markers
        .iter()
        .zip(positions)
        .map(|(mark, position_char)| Anchor {
            marker: mark.marker.clone(),
            position_char,
        })
        .collect();
    let links = link_anchors(&footnotes, &anchors, &plain_text);

    let plain_text = if plain_text.trim().is_empty() {
        seg.main_text()
    } else {
        plain_text
    };

    let out_lines = lines_or_fallback(&lines, &plain_text)
        .into_iter()
        .map(|l| ExtractedLine {
            text: l.clean_text(),
            indent_level: l.indent_level,
            is_heading: l.is_heading,
        })
        .filter(|l| !l.text.trim().is_empty())
        .collect();

    let heading = body
        .iter()
        .find(|b| b.kind == BlockKind::Heading)
        .map(|b| b.text())
        .filter(|t| !t.is_empty());

    UnitContent {
        heading,
        word_count: word_count(&plain_text),
        html: body_html,
        is_verse: lines.is_verse,
        lines: out_lines,
        footnotes,
        links,
        assets: collect_assets(&body, url),
        plain_text,
    }
}

fn collect_assets(blocks: &[&Block<'_>], base_url: &str) -> Vec<ExtractedAsset> {
    let mut assets = Vec::new();
    for block in blocks {
        for node in &block.nodes {
            for el in node.descendants().filter_map(ElementRef::wrap) {
                match tag_name(el).as_str() {
                    "img" => assets.push(image_asset(el, base_url)),
                    "table" => assets.push(table_asset(el)),
                    _ => {}
                }
            }
        }
    }
    assets
}

fn image_asset(el: ElementRef<'_>, base_url: &str) -> ExtractedAsset {
    let src = el.value().attr("src").unwrap_or_default();
    ExtractedAsset {
        kind: AssetKind::Image,
        src_url: resolve_url(base_url, src).unwrap_or_else(|| src.trim().to_string()),
        caption_text: el
            .value()
            .attr("alt")
            .map(collapse_whitespace)
            .filter(|a| !a.is_empty()),
    }
}

fn table_asset(el: ElementRef<'_>) -> ExtractedAsset {
    ExtractedAsset {
        kind: AssetKind::Table,
        src_url: String::new(),
        caption_text: select_all(el, "caption")
            .into_iter()
            .next()
            .map(element_text)
            .filter(|c| !c.is_empty()),
    }
}
