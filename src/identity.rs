//! Deterministic identities
//!
//! Authors and works hash their slug into a fixed per-type namespace. Every
//! child entity hashes its natural key into its parent's id, so a row's
//! primary key can never drift away from its natural key between crawls.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Namespace for author ids
pub const AUTHOR_NAMESPACE: Uuid = Uuid::from_u128(0x11111111_1111_1111_1111_111111111111);

/// Namespace for work ids
pub const WORK_NAMESPACE: Uuid = Uuid::from_u128(0x22222222_2222_2222_2222_222222222222);

/// URL-safe ASCII slug: accents folded, lowercase, runs of other
/// characters collapsed into single dashes
pub fn slugify(text: &str) -> String {
    let folded: String = text
        .replace('ß', "ss")
        .replace('ẞ', "SS")
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect();

    let mut slug = String::with_capacity(folded.len());
    let mut pending_dash = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

pub fn author_id(author_slug: &str) -> Uuid {
    Uuid::new_v5(&AUTHOR_NAMESPACE, author_slug.as_bytes())
}

pub fn work_id(work_slug: &str) -> Uuid {
    Uuid::new_v5(&WORK_NAMESPACE, work_slug.as_bytes())
}

/// Slug of a translated work: author, title and language code
pub fn work_slug(author_slug: &str, title: &str, language: &str) -> String {
    slugify(&format!("{}-{}-{}", author_slug, title, language))
}

/// Id of a child entity from its natural key inside the parent's namespace
pub fn child_id(parent: &Uuid, kind: &str, natural_key: &str) -> Uuid {
    Uuid::new_v5(parent, format!("{}:{}", kind, natural_key).as_bytes())
}

pub fn section_id(work_id: &Uuid, level: u32, label: &str, order_index: usize) -> Uuid {
    child_id(work_id, "section", &format!("{}|{}|{}", level, label, order_index))
}

pub fn passage_id(section_id: &Uuid, order_index: usize) -> Uuid {
    child_id(section_id, "passage", &order_index.to_string())
}

pub fn verse_id(passage_id: &Uuid, line_no: usize) -> Uuid {
    child_id(passage_id, "verse", &line_no.to_string())
}

pub fn note_id(work_id: &Uuid, note_key: &str) -> Uuid {
    child_id(work_id, "note", note_key)
}

pub fn note_link_id(work_id: &Uuid, note_id: &Uuid, passage_id: &Uuid, anchor: &str) -> Uuid {
    child_id(
        work_id,
        "note_link",
        &format!("{}|{}|{}", note_id, passage_id, anchor),
    )
}

pub fn asset_id(work_id: &Uuid, order_index: usize) -> Uuid {
    child_id(work_id, "asset", &order_index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Augustinus von Hippo"), "augustinus-von-hippo");
        assert_eq!(slugify("  Über die Dreieinigkeit (De Trinitate) "), "uber-die-dreieinigkeit-de-trinitate");
        assert_eq!(slugify("Großer Katechismus"), "grosser-katechismus");
        assert_eq!(slugify("--"), "");
    }

    #[test]
    fn test_equal_slugs_same_id() {
        assert_eq!(author_id(&slugify("Basilius")), author_id(&slugify(" basilius ")));
        assert_eq!(work_id("a-b-de"), work_id("a-b-de"));
    }

    #[test]
    fn test_one_char_difference_changes_id() {
        assert_ne!(work_id("homilien-1-de"), work_id("homilien-2-de"));
        assert_ne!(author_id("basilius"), author_id("basilios"));
    }

    #[test]
    fn test_author_and_work_namespaces_differ() {
        assert_ne!(author_id("x"), work_id("x"));
    }

    #[test]
    fn test_work_slug() {
        assert_eq!(
            work_slug("augustinus", "Bekenntnisse", "de"),
            "augustinus-bekenntnisse-de"
        );
    }

    #[test]
    fn test_child_ids_scoped_by_parent() {
        let a = work_id("a");
        let b = work_id("b");
        assert_ne!(section_id(&a, 1, "Vorwort", 0), section_id(&b, 1, "Vorwort", 0));
        assert_eq!(section_id(&a, 1, "Vorwort", 0), section_id(&a, 1, "Vorwort", 0));
    }
}
