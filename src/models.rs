//! Core data models used throughout semidex.
//!
//! These types represent the documents, segments, and index records that
//! flow through the ingestion pipeline and the passages returned by the
//! query engine.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A document-arrival event, the sole entry point into ingestion.
///
/// Producers (the CLI, a blob-trigger shim, a queue consumer) build one of
/// these per uploaded document and hand it to
/// [`ingest_document`](crate::ingest::ingest_document).
#[derive(Debug, Clone)]
pub struct ArrivalEvent {
    /// Stable document identity (name or path). Re-uploads under the same
    /// identity supersede the previous version.
    pub identity: String,
    /// Raw document bytes as uploaded.
    pub bytes: Vec<u8>,
    /// MIME content type, used to pick the extraction path.
    pub content_type: String,
    /// When the document arrived.
    pub arrived_at: DateTime<Utc>,
}

/// A bounded, possibly overlapping slice of a document's extracted text.
///
/// Segments from one document, ordered by ordinal, reconstruct the extracted
/// text with only the configured overlap regions duplicated.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub document_identity: String,
    /// 0-based, contiguous position within the document.
    pub ordinal: i64,
    pub text: String,
}

/// One row of the vector index, keyed by (document identity, ordinal).
///
/// Carries the embedding model name and dimensionality as provenance so a
/// silent model change is detectable, plus a SHA-256 hash of the segment
/// text for staleness checks.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub document_identity: String,
    pub ordinal: i64,
    pub text: String,
    pub vector: Vec<f32>,
    pub model: String,
    pub dims: usize,
    pub text_hash: String,
    pub arrived_at: i64,
}

/// A ranked passage returned by the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub document_identity: String,
    pub ordinal: i64,
    /// Cosine similarity against the query vector.
    pub score: f64,
    pub arrived_at: i64,
}

/// Terminal state of one document as visible in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Extraction yielded no text; zero segments, zero records.
    Empty,
    /// Every segment has a record.
    Indexed { segments: i64 },
    /// Some segments failed embedding or writing after bounded retries.
    Partial { indexed: i64, expected: i64 },
}

/// Outcome of one ingestion run, reported to the caller and logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Extraction produced no text. A no-op, not an error.
    Empty,
    /// All segments embedded and written.
    Indexed { segments: usize },
    /// Some ordinals exhausted their retries; their siblings still landed.
    Partial { indexed: usize, failed: Vec<i64> },
}
