//! Typed records for every persisted entity
//!
//! Field names double as column names for both store backends.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Semantic role of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionRole {
    Introduction,
    Preface,
    MainText,
    Commentary,
    Notes,
    Appendix,
}

impl SectionRole {
    pub const ALL: [SectionRole; 6] = [
        SectionRole::Introduction,
        SectionRole::Preface,
        SectionRole::MainText,
        SectionRole::Commentary,
        SectionRole::Notes,
        SectionRole::Appendix,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionRole::Introduction => "introduction",
            SectionRole::Preface => "preface",
            SectionRole::MainText => "main_text",
            SectionRole::Commentary => "commentary",
            SectionRole::Notes => "notes",
            SectionRole::Appendix => "appendix",
        }
    }
}

impl std::fmt::Display for SectionRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Footnote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Table,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
    pub name_original: Option<String>,
    pub lifespan: Option<String>,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Work {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub title_original: Option<String>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub language: String,
    pub work_slug: String,
    pub source_url: String,
    pub edition_info: Option<String>,
    pub genre: Option<String>,
    /// Serialized `WorkSummary`
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: Uuid,
    pub work_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub level: u32,
    pub label: String,
    pub title: Option<String>,
    pub order_index: usize,
    pub role: SectionRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub id: Uuid,
    pub section_id: Uuid,
    pub order_index: usize,
    pub html: String,
    pub plain_text: String,
    pub contains_verse_lines: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verse {
    pub id: Uuid,
    pub passage_id: Uuid,
    pub line_no: usize,
    pub text: String,
    pub indent_level: u32,
    pub is_heading: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub work_id: Uuid,
    pub note_key: String,
    pub note_type: NoteType,
    pub html: String,
    pub plain_text: String,
    pub order_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteLink {
    pub id: Uuid,
    pub work_id: Uuid,
    pub note_id: Uuid,
    pub origin_passage_id: Uuid,
    pub origin_html_anchor: String,
    pub context_snippet: String,
    pub position_char: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub work_id: Uuid,
    pub kind: AssetKind,
    pub src_url: String,
    pub caption_text: Option<String>,
    pub order_index: usize,
}

/// Every entity computed for one Work, ready for persistence
#[derive(Debug, Clone, Default)]
pub struct WorkBundle {
    pub authors: Vec<Author>,
    pub works: Vec<Work>,
    pub sections: Vec<Section>,
    pub passages: Vec<Passage>,
    pub verses: Vec<Verse>,
    pub notes: Vec<Note>,
    pub note_links: Vec<NoteLink>,
    pub assets: Vec<Asset>,
}

impl WorkBundle {
    pub fn work(&self) -> Option<&Work> {
        self.works.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_serializes_snake_case() {
        let json = serde_json::to_string(&SectionRole::MainText).unwrap();
        assert_eq!(json, "\"main_text\"");
        for role in SectionRole::ALL {
            assert_eq!(
                serde_json::to_value(role).unwrap(),
                serde_json::Value::String(role.as_str().to_string())
            );
        }
    }
}
