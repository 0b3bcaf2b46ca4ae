//! Section role classification
//!
//! Two passes over the ordered content units of a work. The first looks at
//! label and heading text only; the second refines with facts taken from
//! the extracted body. Keyword vocabularies are plain data so they can be
//! tested on their own.

use crate::html::normalize_for_match;
use crate::model::SectionRole;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Below this many words a unit with at least one note is a notes unit
pub const NOTES_MAX_WORDS: usize = 80;
/// Early units shorter than this must be keyword-backed to stay introductions
pub const EARLY_MAX_WORDS: usize = 180;
/// Trailing units shorter than this are demoted to appendix
pub const TRAILING_MAX_WORDS: usize = 150;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// Some word of the label starts with the keyword
    WordPrefix,
    /// The keyword appears anywhere in the label
    Anywhere,
}

/// One keyword → role mapping
#[derive(Debug, Clone, Copy)]
pub struct RoleRule {
    pub keyword: &'static str,
    pub role: SectionRole,
    pub matching: Match,
}

const fn rule(keyword: &'static str, role: SectionRole, matching: Match) -> RoleRule {
    RoleRule {
        keyword,
        role,
        matching,
    }
}

/// Ordered: the first matching rule wins. Keywords are in match form
/// (lowercase, accents folded, ß as ss).
pub const ROLE_RULES: &[RoleRule] = &[
    rule("vorwort", SectionRole::Preface, Match::WordPrefix),
    rule("vorrede", SectionRole::Preface, Match::WordPrefix),
    rule("widmung", SectionRole::Preface, Match::WordPrefix),
    rule("geleitwort", SectionRole::Preface, Match::WordPrefix),
    rule("praefatio", SectionRole::Preface, Match::WordPrefix),
    rule("preface", SectionRole::Preface, Match::WordPrefix),
    rule("einleitung", SectionRole::Introduction, Match::WordPrefix),
    rule("einfuhrung", SectionRole::Introduction, Match::WordPrefix),
    rule("introduction", SectionRole::Introduction, Match::WordPrefix),
    rule("prolog", SectionRole::Introduction, Match::WordPrefix),
    rule("lebensbeschreibung", SectionRole::Introduction, Match::WordPrefix),
    rule("biographie", SectionRole::Introduction, Match::WordPrefix),
    rule("brief des herausgebers", SectionRole::Introduction, Match::Anywhere),
    rule("inhalt", SectionRole::Introduction, Match::WordPrefix),
    rule("anmerkung", SectionRole::Notes, Match::WordPrefix),
    rule("fussnote", SectionRole::Notes, Match::WordPrefix),
    rule("endnote", SectionRole::Notes, Match::WordPrefix),
    rule("notiz", SectionRole::Notes, Match::WordPrefix),
    rule("bemerkung", SectionRole::Notes, Match::WordPrefix),
    rule("kommentar", SectionRole::Commentary, Match::WordPrefix),
    rule("commentary", SectionRole::Commentary, Match::WordPrefix),
    rule("erklarung", SectionRole::Commentary, Match::WordPrefix),
    rule("scholie", SectionRole::Commentary, Match::WordPrefix),
    rule("anhang", SectionRole::Appendix, Match::Anywhere),
    rule("anhange", SectionRole::Appendix, Match::Anywhere),
    rule("register", SectionRole::Appendix, Match::Anywhere),
    rule("nachtrag", SectionRole::Appendix, Match::WordPrefix),
    rule("erganzung", SectionRole::Appendix, Match::WordPrefix),
    rule("appendix", SectionRole::Appendix, Match::WordPrefix),
];

/// Words that mark canonical main-text units (book, chapter, letter, …)
pub const MAIN_TEXT_MARKERS: &[&str] = &[
    "buch", "bucher", "kapitel", "liber", "capitulum", "caput", "brief", "epistola", "homilie",
    "predigt", "sermo", "rede", "psalm", "gesang", "hymnus", "teil", "abschnitt", "traktat",
    "tractatus", "frage", "artikel", "vers",
];

/// Why a unit ended up with its role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    KeywordMatch,
    MainTextMarker,
    FirstUnitDefault,
    LastUnitDefault,
    DefaultMainText,
    NoteDense,
    VersePromoted,
    EarlyUnitUnconfirmed,
    TrailingShortDemoted,
}

/// What the classifier knows about one content unit
#[derive(Debug, Clone, Default)]
pub struct UnitFacts {
    pub label: String,
    pub heading: Option<String>,
    pub level: u32,
    /// False for TOC branches and units whose fetch failed
    pub has_content: bool,
    pub word_count: usize,
    pub has_verse: bool,
    pub note_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub role: SectionRole,
    pub reasons: Vec<ReasonCode>,
    pub keyword_derived: bool,
}

fn words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

/// First rule whose keyword matches the text
pub fn keyword_role(text: &str) -> Option<SectionRole> {
    let normalized = normalize_for_match(text);
    ROLE_RULES
        .iter()
        .find(|r| match r.matching {
            Match::WordPrefix => words(&normalized).any(|w| w.starts_with(r.keyword)),
            Match::Anywhere => normalized.contains(r.keyword),
        })
        .map(|r| r.role)
}

fn roman_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^m{0,4}(cm|cd|d?c{0,3})(xc|xl|l?x{0,3})(ix|iv|v?i{0,3})$").ok()
    })
    .as_ref()
}

fn is_roman_numeral(word: &str) -> bool {
    !word.is_empty() && roman_regex().is_some_and(|re| re.is_match(word))
}

/// Label carries a roman numeral or a canonical book/chapter word
pub fn has_main_text_marker(text: &str) -> bool {
    let normalized = normalize_for_match(text);
    let marked = words(&normalized).any(|w| {
        is_roman_numeral(w) || MAIN_TEXT_MARKERS.iter().any(|m| w == *m || w.ends_with(m))
    });
    marked
}

fn unit_keyword_role(unit: &UnitFacts) -> Option<SectionRole> {
    keyword_role(&unit.label).or_else(|| unit.heading.as_deref().and_then(keyword_role))
}

fn unit_has_main_marker(unit: &UnitFacts) -> bool {
    has_main_text_marker(&unit.label)
        || unit.heading.as_deref().is_some_and(has_main_text_marker)
}

/// Pre-content pass for all units of a work
pub fn classify_pre(units: &[UnitFacts]) -> Vec<Classification> {
    let top_level: Vec<usize> = units
        .iter()
        .enumerate()
        .filter(|(_, u)| u.level == 1)
        .map(|(i, _)| i)
        .collect();
    let structural = top_level.len() >= 2;
    let first_top = top_level.first().copied();
    let last_top = top_level.last().copied();

    units
        .iter()
        .enumerate()
        .map(|(i, unit)| {
            if let Some(role) = unit_keyword_role(unit) {
                return Classification {
                    role,
                    reasons: vec![ReasonCode::KeywordMatch],
                    keyword_derived: true,
                };
            }
            let (role, reason) = if unit_has_main_marker(unit) {
                (SectionRole::MainText, ReasonCode::MainTextMarker)
            } else if structural && Some(i) == first_top {
                (SectionRole::Introduction, ReasonCode::FirstUnitDefault)
            } else if structural && Some(i) == last_top {
                (SectionRole::Appendix, ReasonCode::LastUnitDefault)
            } else {
                (SectionRole::MainText, ReasonCode::DefaultMainText)
            };
            Classification {
                role,
                reasons: vec![reason],
                keyword_derived: false,
            }
        })
        .collect()
}

/// Post-content refinement, in place
pub fn classify_post(units: &[UnitFacts], classes: &mut [Classification]) {
    let total = units.len();

    for (i, (unit, class)) in units.iter().zip(classes.iter_mut()).enumerate() {
        if !unit.has_content {
            continue;
        }

        if unit.note_count >= 1 && unit.word_count < NOTES_MAX_WORDS {
            if class.role != SectionRole::Notes {
                class.role = SectionRole::Notes;
                class.reasons.push(ReasonCode::NoteDense);
            }
            continue;
        }

        if unit.has_verse && matches!(class.role, SectionRole::Introduction | SectionRole::Preface) {
            class.role = SectionRole::MainText;
            class.reasons.push(ReasonCode::VersePromoted);
            continue;
        }

        let early = i < 2;
        if early
            && class.role == SectionRole::Introduction
            && !class.keyword_derived
            && unit.word_count < EARLY_MAX_WORDS
            && !unit.has_verse
        {
            class.role = SectionRole::MainText;
            class.reasons.push(ReasonCode::EarlyUnitUnconfirmed);
            continue;
        }

        let trailing = total >= 2 && i + 2 >= total;
        if trailing
            && !class.keyword_derived
            && class.role != SectionRole::Appendix
            && unit.word_count < TRAILING_MAX_WORDS
            && !unit.has_verse
            && !unit_has_main_marker(unit)
        {
            class.role = SectionRole::Appendix;
            class.reasons.push(ReasonCode::TrailingShortDemoted);
        }
    }
}

/// Both passes
pub fn classify_units(units: &[UnitFacts]) -> Vec<Classification> {
    let mut classes = classify_pre(units);
    classify_post(units, &mut classes);
    classes
}

/// Per-work digest of section roles
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSummary {
    pub role_counts: BTreeMap<String, usize>,
    pub has_introduction: bool,
    pub has_appendix: bool,
    pub has_commentary: bool,
    pub dominant_role: Option<SectionRole>,
}

impl WorkSummary {
    pub fn from_roles(roles: &[SectionRole]) -> Self {
        let mut role_counts: BTreeMap<String, usize> = SectionRole::ALL
            .iter()
            .map(|r| (r.as_str().to_string(), 0))
            .collect();
        for role in roles {
            *role_counts.entry(role.as_str().to_string()).or_insert(0) += 1;
        }

        let count = |r: SectionRole| role_counts.get(r.as_str()).copied().unwrap_or(0);

        let mut dominant: Option<(SectionRole, usize)> = None;
        for role in SectionRole::ALL {
            let n = count(role);
            if n > 0 && dominant.map_or(true, |(_, best)| n > best) {
                dominant = Some((role, n));
            }
        }

        Self {
            has_introduction: count(SectionRole::Introduction) + count(SectionRole::Preface) > 0,
            has_appendix: count(SectionRole::Appendix) > 0,
            has_commentary: count(SectionRole::Commentary) > 0,
            dominant_role: dominant.map(|(r, _)| r),
            role_counts,
        }
    }

    pub fn count(&self, role: SectionRole) -> usize {
        self.role_counts.get(role.as_str()).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(label: &str, words: usize) -> UnitFacts {
        UnitFacts {
            label: label.to_string(),
            level: 1,
            has_content: true,
            word_count: words,
            ..UnitFacts::default()
        }
    }

    fn roles(units: &[UnitFacts]) -> Vec<SectionRole> {
        classify_units(units).into_iter().map(|c| c.role).collect()
    }

    #[test]
    fn test_keyword_rules() {
        assert_eq!(keyword_role("Vorwort des Übersetzers"), Some(SectionRole::Preface));
        assert_eq!(keyword_role("EINLEITUNG"), Some(SectionRole::Introduction));
        assert_eq!(keyword_role("Stellenregister"), Some(SectionRole::Appendix));
        assert_eq!(keyword_role("Anmerkungen"), Some(SectionRole::Notes));
        assert_eq!(keyword_role("Erklärung des Vaterunsers"), Some(SectionRole::Commentary));
        assert_eq!(keyword_role("Erstes Buch"), None);
    }

    #[test]
    fn test_main_text_markers() {
        assert!(has_main_text_marker("Erstes Buch"));
        assert!(has_main_text_marker("XIV."));
        assert!(has_main_text_marker("Dritte Homilie"));
        assert!(has_main_text_marker("Psalmenbuch"));
        assert!(!has_main_text_marker("Mild und gut"));
        assert!(!has_main_text_marker("Division 3"));
    }

    #[test]
    fn test_preface_main_appendix() {
        let units = vec![unit("Vorwort", 40), unit("Erstes Buch", 2000), unit("Anhang", 30)];
        assert_eq!(
            roles(&units),
            vec![SectionRole::Preface, SectionRole::MainText, SectionRole::Appendix]
        );
    }

    #[test]
    fn test_structural_defaults_need_two_top_units() {
        let single = vec![unit("Division 1", 500)];
        assert_eq!(roles(&single), vec![SectionRole::MainText]);

        let units = vec![
            unit("Division 1", 500),
            unit("Division 2", 500),
            unit("Division 3", 500),
        ];
        assert_eq!(
            roles(&units),
            vec![SectionRole::Introduction, SectionRole::MainText, SectionRole::Appendix]
        );
    }

    #[test]
    fn test_note_dense_unit() {
        let mut u = unit("Kapitel 2", 50);
        u.note_count = 3;
        let classes = classify_units(&[unit("Kapitel 1", 900), u, unit("Kapitel 3", 900)]);
        assert_eq!(classes[1].role, SectionRole::Notes);
        assert!(classes[1].reasons.contains(&ReasonCode::NoteDense));
    }

    #[test]
    fn test_verse_never_introduction() {
        let mut u = unit("Einleitung", 400);
        u.has_verse = true;
        let classes = classify_units(&[u, unit("Buch I", 900)]);
        assert_eq!(classes[0].role, SectionRole::MainText);
        assert_eq!(
            classes[0].reasons,
            vec![ReasonCode::KeywordMatch, ReasonCode::VersePromoted]
        );
    }

    #[test]
    fn test_short_unkeyed_first_unit_is_not_introduction() {
        let units = vec![
            unit("Division 1", 100),
            unit("Division 2", 900),
            unit("Division 3", 900),
        ];
        let classes = classify_units(&units);
        assert_eq!(classes[0].role, SectionRole::MainText);
        assert!(classes[0].reasons.contains(&ReasonCode::EarlyUnitUnconfirmed));
    }

    #[test]
    fn test_trailing_short_demoted_but_keywords_kept() {
        let units = vec![
            unit("Kapitel 1", 900),
            unit("Schlusswort", 60),
            unit("Kommentar", 60),
        ];
        let r = roles(&units);
        assert_eq!(r[1], SectionRole::Appendix);
        assert_eq!(r[2], SectionRole::Commentary);
    }

    #[test]
    fn test_branch_units_skip_post_pass() {
        let mut branch = unit("Erster Teil", 0);
        branch.has_content = false;
        let classes = classify_units(&[branch, unit("Kapitel 1", 900)]);
        assert_eq!(classes[0].role, SectionRole::MainText);
    }

    #[test]
    fn test_work_summary() {
        let summary = WorkSummary::from_roles(&[
            SectionRole::Preface,
            SectionRole::MainText,
            SectionRole::MainText,
            SectionRole::Appendix,
        ]);
        assert!(summary.has_introduction);
        assert!(summary.has_appendix);
        assert!(!summary.has_commentary);
        assert_eq!(summary.dominant_role, Some(SectionRole::MainText));
        assert_eq!(summary.count(SectionRole::MainText), 2);
        assert_eq!(summary.count(SectionRole::Notes), 0);
    }
}
