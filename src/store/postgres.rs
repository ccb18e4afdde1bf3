//! Postgres-backed document and chunk persistence over `sqlx`.

use super::{DocumentBlob, DocumentStore, StoreError};
use crate::chunk::{ChunkKind, ChunkRecord};
use crate::store::ChunkStore;
use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Persistence backend over a Postgres connection pool.
///
/// Each ingestion job checks out its own connection from the pool, so
/// concurrent jobs on different documents never share a session.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database and ensure the expected schema exists.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                content BYTEA NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rag_original_chunks (
                chunk_id TEXT PRIMARY KEY,
                document_id BIGINT NOT NULL,
                type TEXT NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS rag_original_chunks_document_id \
             ON rag_original_chunks (document_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChunkStore for PgStore {
    async fn is_processed(&self, document_id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM rag_original_chunks WHERE document_id = $1) AS processed",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("processed")?)
    }

    async fn save_chunks(&self, records: &[ChunkRecord]) -> Result<usize, StoreError> {
        let mut saved = 0;
        for record in records {
            let result = sqlx::query(
                "INSERT INTO rag_original_chunks (chunk_id, document_id, type, content, content_hash) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&record.chunk_id)
            .bind(record.document_id)
            .bind(record.kind.as_str())
            .bind(&record.content)
            .bind(&record.content_hash)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => saved += 1,
                Err(error) => {
                    // A single failed record must not abort the rest of the batch.
                    tracing::error!(
                        chunk_id = %record.chunk_id,
                        document_id = record.document_id,
                        kind = record.kind.as_str(),
                        error = %error,
                        "Failed to save chunk; skipping"
                    );
                }
            }
        }
        Ok(saved)
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<ChunkRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT chunk_id, document_id, type, content, content_hash \
             FROM rag_original_chunks WHERE chunk_id = $1",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let kind: ChunkKind = row.try_get::<String, _>("type")?.parse()?;
        Ok(Some(ChunkRecord {
            chunk_id: row.try_get("chunk_id")?,
            document_id: row.try_get("document_id")?,
            kind,
            content: row.try_get("content")?,
            content_hash: row.try_get("content_hash")?,
        }))
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn fetch_document(&self, document_id: i64) -> Result<Option<DocumentBlob>, StoreError> {
        let row = sqlx::query("SELECT name, type, content FROM documents WHERE id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(DocumentBlob {
                name: row.try_get("name")?,
                doc_type: row.try_get("type")?,
                data: row.try_get("content")?,
            }),
            None => None,
        })
    }

    async fn replace_content(
        &self,
        document_id: i64,
        data: &[u8],
        doc_type: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET content = $1, type = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(data)
        .bind(doc_type)
        .bind(document_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DocumentMissing(document_id));
        }
        Ok(())
    }
}
