use serde::{Deserialize, Serialize};

/// One multiple-choice item as returned to callers.
///
/// `choices` is always a flat, human-readable string (`"A, B, C, D"`), no
/// matter how the generative model shaped it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Question {
    pub question: String,
    pub choices: String,
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ExamResponse {
    pub questions: Vec<Question>,
}

impl ExamResponse {
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextChunk {
    pub chunk_id: String,
    pub index: u64,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk: TextChunk,
    pub score: f32,
}
