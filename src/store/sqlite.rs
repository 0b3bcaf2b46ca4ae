//! Local SQLite backend

use super::{Store, Table, SCHEMA_SQL};
use crate::config::{database_url, Config};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite store handle
pub struct SqliteStore {
    pool: SqlitePool,
    batch_size: usize,
}

impl SqliteStore {
    /// Connect to the database file named in the configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        let db_path = config.sqlite_file();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&database_url(config))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            batch_size: config.store.batch_size.max(1),
        })
    }

    /// Private in-memory database (single connection)
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            batch_size: 500,
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Row count of a table
    pub async fn count(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {}", table.name());
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        Ok(row.try_get("n")?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `INSERT … ON CONFLICT(target) DO UPDATE SET` for every non-key column
pub fn upsert_sql(table: Table) -> String {
    let columns = table.columns();
    let target = table.conflict_target();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| **c != "id" && !target.contains(c))
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        table.name(),
        columns.join(", "),
        placeholders,
        target.join(", "),
        action
    )
}

#[async_trait]
impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, table: Table, rows: &[Value]) -> Result<usize> {
        let sql = upsert_sql(table);
        let persistence = |e: sqlx::Error| Error::Persistence {
            table: table.name().to_string(),
            reason: e.to_string(),
        };

        for batch in rows.chunks(self.batch_size) {
            let mut tx = self.pool.begin().await.map_err(persistence)?;
            for row in batch {
                let mut query = sqlx::query(&sql);
                for column in table.columns() {
                    query = match row.get(*column).unwrap_or(&Value::Null) {
                        Value::Null => query.bind(None::<String>),
                        Value::Bool(b) => query.bind(*b),
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => query.bind(i),
                            None => query.bind(n.as_f64()),
                        },
                        Value::String(s) => query.bind(s.clone()),
                        other => query.bind(other.to_string()),
                    };
                }
                query.execute(&mut *tx).await.map_err(persistence)?;
            }
            tx.commit().await.map_err(persistence)?;
        }

        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_sql_shape() {
        let sql = upsert_sql(Table::Verses);
        assert!(sql.starts_with("INSERT INTO verses (id, passage_id, line_no, text, indent_level, is_heading)"));
        assert!(sql.contains("ON CONFLICT(passage_id, line_no) DO UPDATE SET"));
        assert!(sql.contains("text = excluded.text"));
        assert!(!sql.contains("id = excluded.id"));
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_one_row() {
        let store = SqliteStore::in_memory().await.unwrap();
        let row = json!({
            "id": "a1",
            "name": "Basilius",
            "name_original": null,
            "lifespan": "330-379",
            "slug": "basilius"
        });

        store.upsert(Table::Authors, &[row.clone()]).await.unwrap();
        let mut changed = row.clone();
        changed["lifespan"] = json!("um 330-379");
        store.upsert(Table::Authors, &[changed]).await.unwrap();

        assert_eq!(store.count(Table::Authors).await.unwrap(), 1);
        let lifespan: String = sqlx::query_scalar("SELECT lifespan FROM authors WHERE slug = 'basilius'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(lifespan, "um 330-379");
    }
}
