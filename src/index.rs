//! Vector index storage.
//!
//! The [`VectorIndex`] trait defines the storage operations the ingestion
//! orchestrator and query engine need, keeping both testable against
//! alternative backends. [`SqliteIndex`] is the shipped implementation:
//! records keyed by (document identity, ordinal), vectors stored as
//! little-endian f32 BLOBs, similarity computed in Rust at query time with
//! the same cosine metric used everywhere else.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::PipelineError;
use crate::migrate;
use crate::models::{DocumentStatus, IndexRecord, RetrievedPassage};

/// Storage backend for index records.
///
/// Writes must be atomic per record: a reader sees the whole record or
/// nothing. Batch atomicity across a document is deliberately not required;
/// partial completion is recoverable and observable.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Register (or supersede) a document before its records are written.
    ///
    /// Deletes every existing record under the same identity in the same
    /// transaction, so a re-upload never leaves stale ordinals behind.
    async fn register_document(
        &self,
        identity: &str,
        arrived_at: i64,
        segment_count: i64,
        model: &str,
    ) -> Result<(), PipelineError>;

    /// Insert or overwrite the record at (document identity, ordinal).
    /// Idempotent: the same record twice leaves one row.
    async fn upsert_record(&self, record: &IndexRecord) -> Result<(), PipelineError>;

    /// Nearest-neighbor search by cosine similarity, at most `k` results.
    /// Ties break by newer document arrival, then lower ordinal.
    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, PipelineError>;

    /// Terminal state of a document, or `None` if it was never ingested.
    async fn document_status(&self, identity: &str)
        -> Result<Option<DocumentStatus>, PipelineError>;

    /// Number of records currently stored for a document.
    async fn record_count(&self, identity: &str) -> Result<i64, PipelineError>;
}

/// SQLite-backed [`VectorIndex`].
#[derive(Clone)]
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the index at `path`, creating the database file if missing.
    /// Does not provision the schema; see [`SqliteIndex::provision`].
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        Ok(Self { pool })
    }

    /// Create the schema if it does not exist. Idempotent.
    pub async fn provision(&self) -> Result<()> {
        migrate::provision_schema(&self.pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Classify a write-path failure: connection-level problems mean the store
/// is unreachable (fatal for the batch); anything else is a per-record
/// write failure the orchestrator may retry.
fn classify_write_error(e: sqlx::Error) -> PipelineError {
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => PipelineError::IndexUnavailable(e),
        other => PipelineError::IndexWrite(other),
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn register_document(
        &self,
        identity: &str,
        arrived_at: i64,
        segment_count: i64,
        model: &str,
    ) -> Result<(), PipelineError> {
        let mut tx = self.pool.begin().await.map_err(classify_write_error)?;

        sqlx::query("DELETE FROM records WHERE document_identity = ?")
            .bind(identity)
            .execute(&mut *tx)
            .await
            .map_err(classify_write_error)?;

        sqlx::query(
            r#"
            INSERT INTO documents (identity, arrived_at, segment_count, model)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(identity) DO UPDATE SET
                arrived_at = excluded.arrived_at,
                segment_count = excluded.segment_count,
                model = excluded.model
            "#,
        )
        .bind(identity)
        .bind(arrived_at)
        .bind(segment_count)
        .bind(model)
        .execute(&mut *tx)
        .await
        .map_err(classify_write_error)?;

        tx.commit().await.map_err(classify_write_error)
    }

    async fn upsert_record(&self, record: &IndexRecord) -> Result<(), PipelineError> {
        let blob = vec_to_blob(&record.vector);

        // A single statement writes vector and text together, so the record
        // appears atomically or not at all.
        sqlx::query(
            r#"
            INSERT INTO records
                (document_identity, ordinal, text, embedding, model, dims, text_hash, arrived_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_identity, ordinal) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                model = excluded.model,
                dims = excluded.dims,
                text_hash = excluded.text_hash,
                arrived_at = excluded.arrived_at
            "#,
        )
        .bind(&record.document_identity)
        .bind(record.ordinal)
        .bind(&record.text)
        .bind(&blob)
        .bind(&record.model)
        .bind(record.dims as i64)
        .bind(&record.text_hash)
        .bind(record.arrived_at)
        .execute(&self.pool)
        .await
        .map_err(classify_write_error)?;

        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedPassage>, PipelineError> {
        // Full scan with cosine scoring in Rust. Exact, and the metric
        // matches storage by construction; an empty table yields an empty
        // result, not an error.
        let rows = sqlx::query(
            "SELECT document_identity, ordinal, text, embedding, arrived_at FROM records",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(PipelineError::IndexUnavailable)?;

        let mut passages: Vec<RetrievedPassage> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                RetrievedPassage {
                    text: row.get("text"),
                    document_identity: row.get("document_identity"),
                    ordinal: row.get("ordinal"),
                    score: cosine_similarity(query_vec, &vector) as f64,
                    arrived_at: row.get("arrived_at"),
                }
            })
            .collect();

        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.arrived_at.cmp(&a.arrived_at))
                .then(a.ordinal.cmp(&b.ordinal))
                .then(a.document_identity.cmp(&b.document_identity))
        });
        passages.truncate(k);

        Ok(passages)
    }

    async fn document_status(
        &self,
        identity: &str,
    ) -> Result<Option<DocumentStatus>, PipelineError> {
        let row = sqlx::query("SELECT segment_count FROM documents WHERE identity = ?")
            .bind(identity)
            .fetch_optional(&self.pool)
            .await
            .map_err(PipelineError::IndexUnavailable)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let expected: i64 = row.get("segment_count");

        if expected == 0 {
            return Ok(Some(DocumentStatus::Empty));
        }

        let indexed = self.record_count(identity).await?;
        if indexed >= expected {
            Ok(Some(DocumentStatus::Indexed { segments: expected }))
        } else {
            Ok(Some(DocumentStatus::Partial { indexed, expected }))
        }
    }

    async fn record_count(&self, identity: &str) -> Result<i64, PipelineError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE document_identity = ?")
            .bind(identity)
            .fetch_one(&self.pool)
            .await
            .map_err(PipelineError::IndexUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_index() -> (TempDir, SqliteIndex) {
        let tmp = TempDir::new().unwrap();
        let index = SqliteIndex::open(&tmp.path().join("index.sqlite"))
            .await
            .unwrap();
        index.provision().await.unwrap();
        (tmp, index)
    }

    fn record(identity: &str, ordinal: i64, vector: Vec<f32>, arrived_at: i64) -> IndexRecord {
        IndexRecord {
            document_identity: identity.to_string(),
            ordinal,
            text: format!("{identity} segment {ordinal}"),
            vector,
            model: "test-model".to_string(),
            dims: 3,
            text_hash: format!("hash-{identity}-{ordinal}"),
            arrived_at,
        }
    }

    #[tokio::test]
    async fn provision_is_idempotent() {
        let (_tmp, index) = open_index().await;
        index.provision().await.unwrap();
        index.provision().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let (_tmp, index) = open_index().await;
        index
            .register_document("doc", 100, 1, "test-model")
            .await
            .unwrap();

        let rec = record("doc", 0, vec![1.0, 0.0, 0.0], 100);
        index.upsert_record(&rec).await.unwrap();
        index.upsert_record(&rec).await.unwrap();

        assert_eq!(index.record_count("doc").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_in_place() {
        let (_tmp, index) = open_index().await;
        index
            .register_document("doc", 100, 1, "test-model")
            .await
            .unwrap();

        index
            .upsert_record(&record("doc", 0, vec![1.0, 0.0, 0.0], 100))
            .await
            .unwrap();
        let mut updated = record("doc", 0, vec![0.0, 1.0, 0.0], 100);
        updated.text = "replaced".to_string();
        index.upsert_record(&updated).await.unwrap();

        assert_eq!(index.record_count("doc").await.unwrap(), 1);
        let results = index.search(&[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(results[0].text, "replaced");
    }

    #[tokio::test]
    async fn search_empty_index_returns_empty() {
        let (_tmp, index) = open_index().await;
        let results = index.search(&[1.0, 0.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn search_respects_k() {
        let (_tmp, index) = open_index().await;
        index
            .register_document("doc", 100, 5, "test-model")
            .await
            .unwrap();
        for i in 0..5 {
            index
                .upsert_record(&record("doc", i, vec![1.0, 0.2 * i as f32, 0.0], 100))
                .await
                .unwrap();
        }

        let results = index.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn ties_break_by_newer_arrival_then_lower_ordinal() {
        let (_tmp, index) = open_index().await;
        index
            .register_document("older", 100, 1, "test-model")
            .await
            .unwrap();
        index
            .register_document("newer", 200, 2, "test-model")
            .await
            .unwrap();

        // Identical vectors: scores tie exactly.
        let v = vec![1.0, 0.0, 0.0];
        index
            .upsert_record(&record("older", 0, v.clone(), 100))
            .await
            .unwrap();
        index
            .upsert_record(&record("newer", 1, v.clone(), 200))
            .await
            .unwrap();
        index
            .upsert_record(&record("newer", 0, v.clone(), 200))
            .await
            .unwrap();

        let results = index.search(&v, 3).await.unwrap();
        assert_eq!(results[0].document_identity, "newer");
        assert_eq!(results[0].ordinal, 0);
        assert_eq!(results[1].document_identity, "newer");
        assert_eq!(results[1].ordinal, 1);
        assert_eq!(results[2].document_identity, "older");
    }

    #[tokio::test]
    async fn reregister_deletes_stale_records() {
        let (_tmp, index) = open_index().await;
        index
            .register_document("doc", 100, 3, "test-model")
            .await
            .unwrap();
        for i in 0..3 {
            index
                .upsert_record(&record("doc", i, vec![1.0, 0.0, 0.0], 100))
                .await
                .unwrap();
        }

        // Re-upload shrinks the document to one segment.
        index
            .register_document("doc", 200, 1, "test-model")
            .await
            .unwrap();
        assert_eq!(index.record_count("doc").await.unwrap(), 0);
        index
            .upsert_record(&record("doc", 0, vec![1.0, 0.0, 0.0], 200))
            .await
            .unwrap();

        assert_eq!(index.record_count("doc").await.unwrap(), 1);
        assert_eq!(
            index.document_status("doc").await.unwrap(),
            Some(DocumentStatus::Indexed { segments: 1 })
        );
    }

    #[tokio::test]
    async fn status_reports_partial_and_empty() {
        let (_tmp, index) = open_index().await;

        index
            .register_document("partial", 100, 5, "test-model")
            .await
            .unwrap();
        for i in 0..3 {
            index
                .upsert_record(&record("partial", i, vec![1.0, 0.0, 0.0], 100))
                .await
                .unwrap();
        }
        assert_eq!(
            index.document_status("partial").await.unwrap(),
            Some(DocumentStatus::Partial {
                indexed: 3,
                expected: 5
            })
        );

        index
            .register_document("empty", 100, 0, "test-model")
            .await
            .unwrap();
        assert_eq!(
            index.document_status("empty").await.unwrap(),
            Some(DocumentStatus::Empty)
        );

        assert_eq!(index.document_status("missing").await.unwrap(), None);
    }
}
