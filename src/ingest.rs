//! Ingestion orchestration.
//!
//! Drives one document-arrival event through the full pipeline:
//! extract text, chunk it, then embed and index every segment. Stages per
//! document: received, extracted, chunked, embedding (per segment), indexed.
//!
//! Segments are independent units of work and run under a fixed-size worker
//! pool; completion order among siblings is unspecified. A segment that
//! exhausts its retries is marked failed without aborting its siblings, so
//! a document can land partially indexed, a valid terminal state that
//! stays distinguishable from fully indexed via
//! [`VectorIndex::document_status`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, IngestConfig};
use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::extract;
use crate::index::VectorIndex;
use crate::models::{ArrivalEvent, IndexRecord, IngestOutcome, Segment};

/// First retry waits this long; later attempts double it, capped at 2^5.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Ingest one document end to end.
///
/// Extraction yielding no text terminates the run with
/// [`IngestOutcome::Empty`], a logged no-op rather than an error. Re-uploading an
/// identity supersedes the previous version: all of its old records are
/// deleted before the new segments are written.
///
/// # Errors
///
/// Returns [`PipelineError::IndexUnavailable`] when the store itself cannot
/// be reached, and [`PipelineError::IndexWrite`] when registering the
/// document still fails after bounded retries. Per-segment embedding and
/// write failures are retried the same way and reported through the
/// outcome instead.
pub async fn ingest_document(
    event: ArrivalEvent,
    chunking: &ChunkingConfig,
    ingest: &IngestConfig,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
) -> Result<IngestOutcome, PipelineError> {
    let identity = event.identity.clone();
    let arrived_at = event.arrived_at.timestamp();

    let text = extract::extract_text(&event.bytes, &event.content_type);
    if text.is_empty() {
        // Still registered, so the no-op outcome is observable later.
        register_with_retries(
            &*index,
            &identity,
            arrived_at,
            0,
            embedder.model_name(),
            ingest.max_retries,
        )
        .await?;
        info!(identity, "extraction yielded no text, nothing to index");
        return Ok(IngestOutcome::Empty);
    }

    let segments = chunk_text(&identity, &text, chunking);
    let total = segments.len();

    register_with_retries(
        &*index,
        &identity,
        arrived_at,
        total as i64,
        embedder.model_name(),
        ingest.max_retries,
    )
    .await?;

    let semaphore = Arc::new(Semaphore::new(ingest.worker_concurrency));
    let mut tasks: JoinSet<Result<i64, (i64, PipelineError)>> = JoinSet::new();
    let mut ordinals: HashMap<tokio::task::Id, i64> = HashMap::new();

    for segment in segments {
        let permit_source = semaphore.clone();
        let embedder = embedder.clone();
        let index = index.clone();
        let max_retries = ingest.max_retries;
        let ordinal = segment.ordinal;

        let handle = tasks.spawn(async move {
            let _permit = permit_source
                .acquire()
                .await
                .expect("ingest semaphore closed");
            index_segment(&segment, arrived_at, max_retries, &*embedder, &*index)
                .await
                .map(|_| ordinal)
                .map_err(|e| (ordinal, e))
        });
        ordinals.insert(handle.id(), ordinal);
    }

    let mut indexed = 0usize;
    let mut failed: Vec<i64> = Vec::new();
    let mut store_down: Option<PipelineError> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(_)) => indexed += 1,
            Ok(Err((ordinal, e))) => {
                if matches!(e, PipelineError::IndexUnavailable(_)) && store_down.is_none() {
                    store_down = Some(e);
                } else {
                    warn!(identity, ordinal, error = %e, "segment failed after retries");
                }
                failed.push(ordinal);
            }
            Err(join_err) => {
                // A panicked segment task is an ordinary per-segment failure;
                // its siblings keep running.
                if let Some(ordinal) = ordinals.get(&join_err.id()).copied() {
                    warn!(identity, ordinal, error = %join_err, "segment task panicked");
                    failed.push(ordinal);
                } else {
                    warn!(identity, error = %join_err, "segment task panicked");
                }
            }
        }
    }

    // The store being unreachable is fatal for the whole batch, unlike an
    // ordinary per-segment failure.
    if let Some(e) = store_down {
        return Err(e);
    }

    if failed.is_empty() {
        info!(identity, segments = total, "document indexed");
        Ok(IngestOutcome::Indexed { segments: total })
    } else {
        failed.sort_unstable();
        warn!(
            identity,
            indexed,
            failed = failed.len(),
            "document partially indexed"
        );
        Ok(IngestOutcome::Partial { indexed, failed })
    }
}

/// Register (or supersede) the document row, retrying transient failures
/// with the same bounded backoff as segment work. Registration gates every
/// record write, so exhausting its retries fails the whole document.
async fn register_with_retries(
    index: &dyn VectorIndex,
    identity: &str,
    arrived_at: i64,
    segment_count: i64,
    model: &str,
    max_retries: u32,
) -> Result<(), PipelineError> {
    let mut attempt = 0u32;
    loop {
        match index
            .register_document(identity, arrived_at, segment_count, model)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt.min(5));
                warn!(
                    identity,
                    attempt = attempt + 1,
                    error = %e,
                    "transient failure registering document, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Embed one segment and write its record, retrying transient failures with
/// exponential backoff. The upsert is idempotent, so retrying the composed
/// operation is safe even if a write landed before a timeout.
async fn index_segment(
    segment: &Segment,
    arrived_at: i64,
    max_retries: u32,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<(), PipelineError> {
    let mut attempt = 0u32;
    loop {
        let result = embed_and_write(segment, arrived_at, embedder, index).await;
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = RETRY_BASE_DELAY * 2u32.pow(attempt.min(5));
                warn!(
                    document = segment.document_identity,
                    ordinal = segment.ordinal,
                    attempt = attempt + 1,
                    error = %e,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn embed_and_write(
    segment: &Segment,
    arrived_at: i64,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<(), PipelineError> {
    let vectors = embedder.embed(std::slice::from_ref(&segment.text)).await?;
    let vector = vectors.into_iter().next().ok_or_else(|| {
        PipelineError::ModelUnavailable("backend returned no embedding".to_string())
    })?;

    let record = IndexRecord {
        document_identity: segment.document_identity.clone(),
        ordinal: segment.ordinal,
        text: segment.text.clone(),
        text_hash: hash_text(&segment.text),
        vector,
        model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        arrived_at,
    };
    index.upsert_record(&record).await
}

/// Build arrival events from a path: one for a file, one per file for a
/// directory tree.
pub fn collect_events(path: &std::path::Path) -> anyhow::Result<Vec<ArrivalEvent>> {
    let mut events = Vec::new();

    let entries: Vec<std::path::PathBuf> = if path.is_dir() {
        walkdir::WalkDir::new(path)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    for file in entries {
        let bytes = std::fs::read(&file)?;
        let ext = file
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        events.push(ArrivalEvent {
            identity: file.display().to_string(),
            bytes,
            content_type: extract::content_type_for_extension(ext).to_string(),
            arrived_at: Utc::now(),
        });
    }

    Ok(events)
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
