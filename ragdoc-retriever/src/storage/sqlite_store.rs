//! SQLite implementation of [`DocumentStore`].
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE documents (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     content TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- little-endian f32
//!     content_hash TEXT NOT NULL UNIQUE,
//!     metadata TEXT,
//!     created_at TEXT NOT NULL
//! );
//! ```
//!
//! The database lives at `<base>/.ragdoc.db` and runs in WAL mode so the
//! engine can read while an ingest writes.

use super::{
    AddOutcome, DocumentEmbedding, DocumentId, DocumentRecord, DocumentStore, NewDocument,
};
use crate::vector;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// File name of the document database inside the base directory.
pub const DATABASE_FILE: &str = ".ragdoc.db";

/// SQLite-backed document store.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    base: PathBuf,
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the store under `base`.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join(DATABASE_FILE);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(&db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Self::new_with_pool(base, pool).await
    }

    /// Open a store backed by in-memory SQLite, for tests.
    ///
    /// Every pooled connection to `sqlite::memory:` gets its own database, so
    /// the pool is limited to one connection.
    pub async fn open_memory(base: &Path) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(base, pool).await
    }

    async fn new_with_pool(base: &Path, pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self {
            base: base.to_path_buf(),
            pool,
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                content_hash TEXT NOT NULL UNIQUE,
                metadata TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("Failed to create documents table")?;

        Ok(())
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn id_for_hash(&self, content_hash: &str) -> Result<Option<DocumentId>> {
        let row = sqlx::query("SELECT id FROM documents WHERE content_hash = ?")
            .bind(content_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("id")))
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn add_if_hash_absent(&self, document: NewDocument) -> Result<AddOutcome> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (content, embedding, content_hash, metadata, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(content_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&document.content)
        .bind(vector::encode(&document.embedding))
        .bind(&document.content_hash)
        .bind(&document.metadata)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to insert document")?;

        if let Some(row) = inserted {
            return Ok(AddOutcome::Created(row.get("id")));
        }

        let existing = self
            .id_for_hash(&document.content_hash)
            .await?
            .with_context(|| {
                format!(
                    "Document {} conflicted on insert but is not stored",
                    document.content_hash
                )
            })?;
        Ok(AddOutcome::AlreadyExists(existing))
    }

    async fn exists_by_hash(&self, content_hash: &str) -> Result<bool> {
        Ok(self.id_for_hash(content_hash).await?.is_some())
    }

    async fn all_embeddings(&self) -> Result<Vec<DocumentEmbedding>> {
        let rows = sqlx::query("SELECT id, embedding FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut embeddings = Vec::with_capacity(rows.len());
        for row in rows {
            let id: DocumentId = row.get("id");
            let bytes: Vec<u8> = row.get("embedding");
            match vector::decode(&bytes) {
                Ok(embedding) => embeddings.push(DocumentEmbedding { id, embedding }),
                Err(e) => tracing::warn!("Skipping document {}: {}", id, e),
            }
        }
        Ok(embeddings)
    }

    async fn contents_by_ids(&self, ids: &[DocumentId]) -> Result<Vec<String>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, content FROM documents WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let by_id: HashMap<DocumentId, String> = rows
            .into_iter()
            .map(|row| (row.get("id"), row.get("content")))
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn get_document(&self, id: DocumentId) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, content, embedding, content_hash, metadata, created_at
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let bytes: Vec<u8> = row.get("embedding");
        let created_at: DateTime<Utc> = row.get("created_at");
        Ok(Some(DocumentRecord {
            id: row.get("id"),
            content: row.get("content"),
            embedding: vector::decode(&bytes)?,
            content_hash: row.get("content_hash"),
            metadata: row.get("metadata"),
            created_at,
        }))
    }

    async fn document_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM documents")
            .fetch_one(&self.pool)
            .await?
            .get("count");
        Ok(count as usize)
    }
}
