//! Entity assembly for one Work
//!
//! Turns the TOC plus per-unit extraction results into typed rows with
//! deterministic ids. Section parents come from a level→id stack.

use super::extract::UnitContent;
use crate::classify::{classify_units, Classification, UnitFacts, WorkSummary};
use crate::identity::{
    asset_id, author_id, note_id, note_link_id, passage_id, section_id, slugify, verse_id,
    work_id, work_slug,
};
use crate::model::{
    Asset, Author, Note, NoteLink, NoteType, Passage, Section, Verse, Work, WorkBundle,
};
use crate::toc::TocEntry;
use crate::version::VersionMeta;
use std::collections::HashSet;
use uuid::Uuid;

/// What happened to one TOC entry
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// No URL: a pure tree node
    Branch,
    /// Fetch or extraction failed; the section survives without a passage
    Failed(String),
    Extracted(UnitContent),
}

#[derive(Debug, Clone)]
pub struct UnitRecord {
    pub entry: TocEntry,
    pub outcome: UnitOutcome,
}

impl UnitRecord {
    fn content(&self) -> Option<&UnitContent> {
        match &self.outcome {
            UnitOutcome::Extracted(content) => Some(content),
            _ => None,
        }
    }

    fn facts(&self) -> UnitFacts {
        let content = self.content();
        UnitFacts {
            label: self.entry.label.clone(),
            heading: content.and_then(|c| c.heading.clone()),
            level: self.entry.level.max(1),
            has_content: content.is_some_and(UnitContent::has_content),
            word_count: content.map_or(0, |c| c.word_count),
            has_verse: content.is_some_and(|c| c.is_verse),
            note_count: content.map_or(0, |c| c.footnotes.len()),
        }
    }
}

/// Source-level facts about the Work being assembled
#[derive(Debug, Clone)]
pub struct WorkSource<'a> {
    pub meta: &'a VersionMeta,
    pub version_url: &'a str,
    pub language: &'a str,
}

/// Assembled entities plus the classifier's audit trail
#[derive(Debug, Clone)]
pub struct Assembled {
    pub bundle: WorkBundle,
    pub classifications: Vec<Classification>,
    pub summary: WorkSummary,
    pub units_failed: usize,
}

/// Build every entity of one Work
pub fn assemble(source: &WorkSource<'_>, units: &[UnitRecord]) -> Assembled {
    let meta = source.meta;
    let author_slug = slugify(&meta.author_name);
    let author = Author {
        id: author_id(&author_slug),
        name: meta.author_name.clone(),
        name_original: None,
        lifespan: meta.lifespan.clone(),
        slug: author_slug.clone(),
    };

    let slug = work_slug(&author_slug, &meta.title, source.language);
    let work_uuid = work_id(&slug);

    let facts: Vec<UnitFacts> = units.iter().map(UnitRecord::facts).collect();
    let classifications = classify_units(&facts);
    let roles: Vec<_> = classifications.iter().map(|c| c.role).collect();
    let summary = WorkSummary::from_roles(&roles);

    let mut bundle = WorkBundle::default();
    let mut parents: Vec<(u32, Uuid)> = Vec::new();
    let mut unit_keys: HashSet<String> = HashSet::new();
    let mut note_keys: HashSet<String> = HashSet::new();
    let mut units_failed = 0;

    for (order, (unit, class)) in units.iter().zip(&classifications).enumerate() {
        let level = unit.entry.level.max(1);
        while parents.last().is_some_and(|(l, _)| *l >= level) {
            parents.pop();
        }

        let sid = section_id(&work_uuid, level, &unit.entry.label, order);
        let content = unit.content();
        bundle.sections.push(Section {
            id: sid,
            work_id: work_uuid,
            parent_id: parents.last().map(|(_, id)| *id),
            level,
            label: unit.entry.label.clone(),
            title: content.and_then(|c| c.heading.clone()),
            order_index: order,
            role: class.role,
        });
        parents.push((level, sid));

        if matches!(unit.outcome, UnitOutcome::Failed(_)) {
            units_failed += 1;
        }
        let Some(content) = content.filter(|c| c.has_content()) else {
            continue;
        };

        let pid = passage_id(&sid, 0);
        bundle.passages.push(Passage {
            id: pid,
            section_id: sid,
            order_index: 0,
            html: content.html.clone(),
            plain_text: content.plain_text.clone(),
            contains_verse_lines: content.is_verse,
        });

        for (i, line) in content.lines.iter().enumerate() {
            let line_no = i + 1;
            bundle.verses.push(Verse {
                id: verse_id(&pid, line_no),
                passage_id: pid,
                line_no,
                text: line.text.clone(),
                indent_level: line.indent_level,
                is_heading: line.is_heading,
            });
        }

        let unit_key = unique_unit_key(unit, order, &mut unit_keys);
        let mut unit_notes: Vec<Option<Uuid>> = vec![None; content.footnotes.len()];
        for link in &content.links {
            let Some(entry) = content.footnotes.get(link.entry) else {
                continue;
            };
            let nid = match unit_notes[link.entry] {
                Some(nid) => nid,
                None => {
                    let note_key = format!("{}:{}", unit_key, entry.key);
                    if !note_keys.insert(note_key.clone()) {
                        continue;
                    }
                    let nid = note_id(&work_uuid, &note_key);
                    bundle.notes.push(Note {
                        id: nid,
                        work_id: work_uuid,
                        note_key,
                        note_type: NoteType::Footnote,
                        html: entry.html.clone(),
                        plain_text: entry.text.clone(),
                        order_index: bundle.notes.len(),
                    });
                    unit_notes[link.entry] = Some(nid);
                    nid
                }
            };

            bundle.note_links.push(NoteLink {
                id: note_link_id(&work_uuid, &nid, &pid, &link.origin_anchor),
                work_id: work_uuid,
                note_id: nid,
                origin_passage_id: pid,
                origin_html_anchor: link.origin_anchor.clone(),
                context_snippet: link.context_snippet.clone(),
                position_char: Some(link.position_char),
            });
        }

        for asset in &content.assets {
            let order_index = bundle.assets.len();
            bundle.assets.push(Asset {
                id: asset_id(&work_uuid, order_index),
                work_id: work_uuid,
                kind: asset.kind,
                src_url: asset.src_url.clone(),
                caption_text: asset.caption_text.clone(),
                order_index,
            });
        }
    }

    bundle.works.push(Work {
        id: work_uuid,
        author_id: author.id,
        title: meta.title.clone(),
        title_original: meta.title_original.clone(),
        year_from: meta.year_from,
        year_to: meta.year_to,
        language: source.language.to_string(),
        work_slug: slug,
        source_url: source.version_url.to_string(),
        edition_info: meta.edition_info.clone(),
        genre: meta.genre.clone(),
        summary: serde_json::to_value(&summary).unwrap_or(serde_json::Value::Null),
    });
    bundle.authors.push(author);

    Assembled {
        bundle,
        classifications,
        summary,
        units_failed,
    }
}

/// Unit identifier used to scope footnote keys
fn unique_unit_key(unit: &UnitRecord, order: usize, used: &mut HashSet<String>) -> String {
    let base = unit
        .entry
        .unit_id
        .clone()
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| format!("u{}", order));
    if used.insert(base.clone()) {
        return base;
    }
    let key = format!("{}-{}", base, order);
    used.insert(key.clone());
    key
}
