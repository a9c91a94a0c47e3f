use crate::embeddings::Embedder;
use crate::index::MemoryVectorIndex;
use crate::traits::VectorIndex;
use crate::{ExamError, RankedChunk, TextChunk};
use tracing::{debug, error};

pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// Picks the chunks most relevant to a fixed task query and glues them
/// into the grounding context for the generative model.
pub struct ContextSelector<E>
where
    E: Embedder,
{
    embedder: E,
    query: String,
    top_k: usize,
}

impl<E> ContextSelector<E>
where
    E: Embedder,
{
    pub fn new(embedder: E, query: impl Into<String>, top_k: usize) -> Self {
        Self {
            embedder,
            query: query.into(),
            top_k,
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub async fn rank(&self, chunks: &[TextChunk]) -> Result<Vec<RankedChunk>, ExamError> {
        if chunks.is_empty() {
            debug!("no chunks to rank, context stays empty");
            return Ok(Vec::new());
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let embeddings = self.embedder.embed_batch(&texts).await.map_err(|err| {
            error!(chunks = chunks.len(), error = %err, "chunk embedding failed");
            into_embedding_error(err)
        })?;

        let index = MemoryVectorIndex::build(chunks, embeddings).map_err(|err| {
            error!(chunks = chunks.len(), error = %err, "similarity index build failed");
            err
        })?;

        let query_vector = self.embedder.embed(&self.query).await.map_err(|err| {
            error!(error = %err, "query embedding failed");
            into_embedding_error(err)
        })?;

        let k = self.top_k.min(index.len());
        let ranked = index.search_vector(&query_vector, k).map_err(|err| {
            error!(top_k = k, error = %err, "similarity query failed");
            err
        })?;

        debug!(chunks = chunks.len(), selected = ranked.len(), "ranked chunks");
        Ok(ranked)
    }

    pub async fn select(&self, chunks: &[TextChunk]) -> Result<String, ExamError> {
        let ranked = self.rank(chunks).await?;
        Ok(join_context(&ranked))
    }
}

pub fn join_context(ranked: &[RankedChunk]) -> String {
    ranked
        .iter()
        .map(|hit| hit.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

fn into_embedding_error(err: ExamError) -> ExamError {
    match err {
        ExamError::Embedding(_) => err,
        other => ExamError::Embedding(other.to_string()),
    }
}
