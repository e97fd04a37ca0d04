use anyhow::Result;
use sqlx::SqlitePool;

/// Provision the index schema. Idempotent; run once by `sdx init` and safe
/// to run again after upgrades.
pub async fn provision_schema(pool: &SqlitePool) -> Result<()> {
    // One row per ingested document. segment_count is the number of
    // segments chunking produced, so a monitoring collaborator can tell a
    // fully indexed document from a partially indexed one by comparing it
    // with the record count.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            identity TEXT PRIMARY KEY,
            arrived_at INTEGER NOT NULL,
            segment_count INTEGER NOT NULL,
            model TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One row per (document, ordinal). Vector and text live in the same
    // row, written by a single statement, so a record is never observably
    // half-present.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            document_identity TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            text_hash TEXT NOT NULL,
            arrived_at INTEGER NOT NULL,
            PRIMARY KEY (document_identity, ordinal),
            FOREIGN KEY (document_identity) REFERENCES documents(identity)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_document ON records(document_identity)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_documents_arrived_at ON documents(arrived_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
