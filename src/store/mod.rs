//! Persistence adapters
//!
//! Every backend implements the same upsert contract: a batch of rows for
//! one table, resolved on that table's natural unique key. A conflict is a
//! successful no-op.

mod rest;
mod schema;
mod sqlite;

pub use rest::RestStore;
pub use schema::SCHEMA_SQL;
pub use sqlite::SqliteStore;

use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::model::WorkBundle;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Persisted tables, in upsert order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Authors,
    Works,
    Sections,
    Passages,
    Verses,
    Notes,
    NoteLinks,
    Assets,
}

impl Table {
    pub const ALL: [Table; 8] = [
        Table::Authors,
        Table::Works,
        Table::Sections,
        Table::Passages,
        Table::Verses,
        Table::Notes,
        Table::NoteLinks,
        Table::Assets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Authors => "authors",
            Table::Works => "works",
            Table::Sections => "sections",
            Table::Passages => "passages",
            Table::Verses => "verses",
            Table::Notes => "notes",
            Table::NoteLinks => "note_links",
            Table::Assets => "assets",
        }
    }

    /// Natural unique key used for conflict resolution
    pub fn conflict_target(&self) -> &'static [&'static str] {
        match self {
            Table::Authors => &["slug"],
            Table::Works => &["work_slug"],
            Table::Sections => &["work_id", "level", "label", "order_index"],
            Table::Passages => &["section_id", "order_index"],
            Table::Verses => &["passage_id", "line_no"],
            Table::Notes => &["work_id", "note_key"],
            Table::NoteLinks => &["work_id", "note_id", "origin_passage_id", "origin_html_anchor"],
            Table::Assets => &["work_id", "order_index"],
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Authors => &["id", "name", "name_original", "lifespan", "slug"],
            Table::Works => &[
                "id",
                "author_id",
                "title",
                "title_original",
                "year_from",
                "year_to",
                "language",
                "work_slug",
                "source_url",
                "edition_info",
                "genre",
                "summary",
            ],
            Table::Sections => &[
                "id",
                "work_id",
                "parent_id",
                "level",
                "label",
                "title",
                "order_index",
                "role",
            ],
            Table::Passages => &[
                "id",
                "section_id",
                "order_index",
                "html",
                "plain_text",
                "contains_verse_lines",
            ],
            Table::Verses => &["id", "passage_id", "line_no", "text", "indent_level", "is_heading"],
            Table::Notes => &[
                "id",
                "work_id",
                "note_key",
                "note_type",
                "html",
                "plain_text",
                "order_index",
            ],
            Table::NoteLinks => &[
                "id",
                "work_id",
                "note_id",
                "origin_passage_id",
                "origin_html_anchor",
                "context_snippet",
                "position_char",
            ],
            Table::Assets => &["id", "work_id", "kind", "src_url", "caption_text", "order_index"],
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Upsert backend
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Upsert rows on the table's conflict target, returning rows written
    async fn upsert(&self, table: Table, rows: &[Value]) -> Result<usize>;
}

/// Dry-run backend: counts rows and writes nothing
#[derive(Debug, Default, Clone)]
pub struct NullStore;

#[async_trait]
impl Store for NullStore {
    fn backend(&self) -> &'static str {
        "none"
    }

    async fn upsert(&self, table: Table, rows: &[Value]) -> Result<usize> {
        debug!(table = %table, rows = rows.len(), "Dry run, skipping upsert");
        Ok(rows.len())
    }
}

/// Open the backend selected in the configuration
pub async fn open_store(config: &Config) -> Result<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Rest => Arc::new(RestStore::from_config(config)?),
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(config).await?;
            store.init_schema().await?;
            Arc::new(store)
        }
        StoreBackend::None => Arc::new(NullStore),
    };
    info!(backend = store.backend(), "Opened store");
    Ok(store)
}

fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).map_err(Into::into))
        .collect()
}

/// Row counts written per table, in upsert order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistStats {
    pub tables: Vec<(Table, usize)>,
}

impl PersistStats {
    pub fn total(&self) -> usize {
        self.tables.iter().map(|(_, n)| n).sum()
    }
}

/// Upsert every entity of a Work: authors, works, sections, passages,
/// verses, notes, note links, assets
pub async fn persist_bundle(store: &dyn Store, bundle: &WorkBundle) -> Result<PersistStats> {
    let mut stats = PersistStats::default();

    for table in Table::ALL {
        let rows = match table {
            Table::Authors => to_rows(&bundle.authors)?,
            Table::Works => to_rows(&bundle.works)?,
            Table::Sections => to_rows(&bundle.sections)?,
            Table::Passages => to_rows(&bundle.passages)?,
            Table::Verses => to_rows(&bundle.verses)?,
            Table::Notes => to_rows(&bundle.notes)?,
            Table::NoteLinks => to_rows(&bundle.note_links)?,
            Table::Assets => to_rows(&bundle.assets)?,
        };
        if rows.is_empty() {
            continue;
        }
        let written = store.upsert(table, &rows).await?;
        debug!(table = %table, rows = written, "Upserted");
        stats.tables.push((table, written));
    }

    Ok(stats)
}
