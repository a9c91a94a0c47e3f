use crate::traits::VectorIndex;
use crate::{ExamError, RankedChunk, TextChunk};

/// Brute-force cosine index living for a single request.
#[derive(Debug, Clone)]
pub struct MemoryVectorIndex {
    dimensions: usize,
    entries: Vec<(TextChunk, Vec<f32>)>,
}

impl MemoryVectorIndex {
    pub fn build(chunks: &[TextChunk], embeddings: Vec<Vec<f32>>) -> Result<Self, ExamError> {
        if chunks.len() != embeddings.len() {
            return Err(ExamError::Index(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or_default();
        if !embeddings.is_empty() && dimensions == 0 {
            return Err(ExamError::Index("embeddings are empty vectors".to_string()));
        }

        let entries = chunks
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                if embedding.len() != dimensions {
                    return Err(ExamError::Index(format!(
                        "embedding dimension {} != {} for chunk {}",
                        embedding.len(),
                        dimensions,
                        chunk.index
                    )));
                }
                Ok((chunk, embedding))
            })
            .collect::<Result<Vec<_>, ExamError>>()?;

        Ok(Self { dimensions, entries })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

impl VectorIndex for MemoryVectorIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search_vector(&self, query_vector: &[f32], top_k: usize) -> Result<Vec<RankedChunk>, ExamError> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }

        if query_vector.len() != self.dimensions {
            return Err(ExamError::Index(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.dimensions
            )));
        }

        let mut ranked: Vec<RankedChunk> = self
            .entries
            .iter()
            .map(|(chunk, embedding)| RankedChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query_vector, embedding),
            })
            .collect();

        // stable sort keeps chunk order on ties
        ranked.sort_by(|left, right| right.score.total_cmp(&left.score));
        ranked.truncate(top_k);

        Ok(ranked)
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }

    // overflowing components give inf / inf
    let score = dot / (left_norm * right_norm);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(index: u64, text: &str) -> TextChunk {
        TextChunk {
            chunk_id: format!("chunk-{index}"),
            index,
            page: 1,
            text: text.to_string(),
        }
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let chunks = vec![chunk(0, "x axis"), chunk(1, "y axis"), chunk(2, "diagonal")];
        let index = MemoryVectorIndex::build(
            &chunks,
            vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.7, 0.7]],
        )
        .unwrap();

        let hits = index.search_vector(&[0.0, 1.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.index, 1);
        assert_eq!(hits[1].chunk.index, 2);
    }

    #[test]
    fn ties_keep_chunk_order() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let index =
            MemoryVectorIndex::build(&chunks, vec![vec![1.0], vec![1.0], vec![1.0]]).unwrap();

        let order: Vec<u64> = index
            .search_vector(&[1.0], 3)
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk.index)
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn count_mismatch_is_an_index_error() {
        let result = MemoryVectorIndex::build(&[chunk(0, "a")], Vec::new());
        assert!(matches!(result, Err(ExamError::Index(_))));
    }

    #[test]
    fn dimension_mismatch_is_an_index_error() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b")];
        let result = MemoryVectorIndex::build(&chunks, vec![vec![1.0, 0.0], vec![1.0]]);
        assert!(matches!(result, Err(ExamError::Index(_))));

        let index = MemoryVectorIndex::build(&chunks[..1], vec![vec![1.0, 0.0]]).unwrap();
        assert!(matches!(index.search_vector(&[1.0], 1), Err(ExamError::Index(_))));
    }

    #[test]
    fn overflowing_embeddings_rank_last_without_panicking() {
        let chunks: Vec<TextChunk> = (0..64).map(|index| chunk(index, "page text")).collect();
        let embeddings = (0..64)
            .map(|index| {
                if index % 3 == 0 {
                    vec![f32::MAX, f32::MAX]
                } else {
                    vec![1.0, index as f32 / 64.0]
                }
            })
            .collect();
        let index = MemoryVectorIndex::build(&chunks, embeddings).unwrap();

        let hits = index.search_vector(&[1.0, 0.5], 10).unwrap();

        assert_eq!(hits.len(), 10);
        assert!(hits.iter().all(|hit| hit.score.is_finite() && hit.score > 0.0));
        assert!(hits.iter().all(|hit| hit.chunk.index % 3 != 0));
        assert!(hits.windows(2).all(|pair| pair[0].score >= pair[1].score));
    }

    #[test]
    fn overflow_scores_zero() {
        assert_eq!(cosine_similarity(&[f32::MAX, f32::MAX], &[1.0, 0.5]), 0.0);
    }

    #[test]
    fn zero_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
