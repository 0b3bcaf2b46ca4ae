//! SQL schema of the relational corpus

/// Tables and natural-key constraints, valid for SQLite and PostgreSQL
pub const SCHEMA_SQL: &str = r#"
-- Authors: one row per distinct slug
CREATE TABLE IF NOT EXISTS authors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    name_original TEXT,
    lifespan TEXT,
    slug TEXT NOT NULL UNIQUE
);

-- Works: one row per (author, translated title)
CREATE TABLE IF NOT EXISTS works (
    id TEXT PRIMARY KEY,
    author_id TEXT NOT NULL REFERENCES authors(id),
    title TEXT NOT NULL,
    title_original TEXT,
    year_from INTEGER,
    year_to INTEGER,
    language TEXT NOT NULL,
    work_slug TEXT NOT NULL UNIQUE,
    source_url TEXT NOT NULL,
    edition_info TEXT,
    genre TEXT,
    summary TEXT
);

-- Sections: the TOC tree of a work
CREATE TABLE IF NOT EXISTS sections (
    id TEXT PRIMARY KEY,
    work_id TEXT NOT NULL REFERENCES works(id),
    parent_id TEXT REFERENCES sections(id),
    level INTEGER NOT NULL,
    label TEXT NOT NULL,
    title TEXT,
    order_index INTEGER NOT NULL,
    role TEXT NOT NULL,
    UNIQUE(work_id, level, label, order_index)
);

-- Passages: body text of a section
CREATE TABLE IF NOT EXISTS passages (
    id TEXT PRIMARY KEY,
    section_id TEXT NOT NULL REFERENCES sections(id),
    order_index INTEGER NOT NULL,
    html TEXT NOT NULL,
    plain_text TEXT NOT NULL,
    contains_verse_lines BOOLEAN NOT NULL,
    UNIQUE(section_id, order_index)
);

-- Verses: line breakdown of a passage
CREATE TABLE IF NOT EXISTS verses (
    id TEXT PRIMARY KEY,
    passage_id TEXT NOT NULL REFERENCES passages(id),
    line_no INTEGER NOT NULL,
    text TEXT NOT NULL,
    indent_level INTEGER NOT NULL,
    is_heading BOOLEAN NOT NULL,
    UNIQUE(passage_id, line_no)
);

-- Notes: footnotes anchored from at least one passage
CREATE TABLE IF NOT EXISTS notes (
    id TEXT PRIMARY KEY,
    work_id TEXT NOT NULL REFERENCES works(id),
    note_key TEXT NOT NULL,
    note_type TEXT NOT NULL,
    html TEXT NOT NULL,
    plain_text TEXT NOT NULL,
    order_index INTEGER NOT NULL,
    UNIQUE(work_id, note_key)
);

-- Note links: one row per anchor occurrence
CREATE TABLE IF NOT EXISTS note_links (
    id TEXT PRIMARY KEY,
    work_id TEXT NOT NULL REFERENCES works(id),
    note_id TEXT NOT NULL REFERENCES notes(id),
    origin_passage_id TEXT NOT NULL REFERENCES passages(id),
    origin_html_anchor TEXT NOT NULL,
    context_snippet TEXT NOT NULL,
    position_char INTEGER,
    UNIQUE(work_id, note_id, origin_passage_id, origin_html_anchor)
);

-- Assets: images and tables
CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    work_id TEXT NOT NULL REFERENCES works(id),
    kind TEXT NOT NULL,
    src_url TEXT NOT NULL,
    caption_text TEXT,
    order_index INTEGER NOT NULL,
    UNIQUE(work_id, order_index)
);

CREATE INDEX IF NOT EXISTS idx_sections_work ON sections(work_id);
CREATE INDEX IF NOT EXISTS idx_passages_section ON passages(section_id);
CREATE INDEX IF NOT EXISTS idx_verses_passage ON verses(passage_id);
CREATE INDEX IF NOT EXISTS idx_note_links_note ON note_links(note_id);
"#;
