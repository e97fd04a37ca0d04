//! Query engine: natural-language question in, ranked passages out.
//!
//! Embeds the question with the same model ingestion used and runs a
//! cosine nearest-neighbor search over the index. Returns passages only;
//! answer synthesis is a downstream consumer's job.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::PipelineError;
use crate::index::VectorIndex;
use crate::models::RetrievedPassage;

/// Retrieve the `k` most relevant passages for `question`.
///
/// At most `k` results, ranked by cosine similarity; ties break by newer
/// document arrival, then lower ordinal. An empty index (or a corpus with
/// nothing indexed yet) returns an empty vec, not an error. Completeness
/// of coverage is not knowable here, so a partially indexed corpus answers
/// with whatever records exist.
///
/// # Errors
///
/// [`PipelineError::ModelUnavailable`] if the question cannot be embedded;
/// [`PipelineError::IndexUnavailable`] if the store cannot be reached.
pub async fn retrieve(
    question: &str,
    k: usize,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
) -> Result<Vec<RetrievedPassage>, PipelineError> {
    let texts = [question.to_string()];
    let vectors = embedder.embed(&texts).await?;
    let query_vec = vectors.into_iter().next().ok_or_else(|| {
        PipelineError::ModelUnavailable("backend returned no embedding".to_string())
    })?;

    let passages = index.search(&query_vec, k).await?;
    debug!(k, returned = passages.len(), "retrieval complete");
    Ok(passages)
}
