use crate::{ExamError, RankedChunk};
use async_trait::async_trait;
use serde_json::Value;

pub trait VectorIndex {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search_vector(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RankedChunk>, ExamError>;
}

/// Generative model boundary.
///
/// Implementations send the prompt once and hand back whatever came out,
/// already run through a best-effort JSON parse. The value is untrusted: a
/// mapping, a sequence, a bare string or anything else.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<Value, ExamError>;
}
