pub mod chunking;
pub mod config;
pub mod context;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod providers;
pub mod traits;

pub use chunking::{chunk_pages, normalize_whitespace, ChunkingConfig};
pub use config::{ExamSettings, PromptLanguage, API_KEY_ENV, DEFAULT_QUESTION_COUNT};
pub use context::ContextSelector;
pub use document::ScopedDocument;
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ExamError, IngestError};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use generation::{build_prompt, ExamGenerator};
pub use index::MemoryVectorIndex;
pub use models::{ExamResponse, PageText, Question, RankedChunk, TextChunk};
pub use normalizer::{normalize_response, normalize_with_report, NormalizationReport};
pub use orchestrator::ExamPipeline;
pub use providers::{GeminiClient, GeminiConfig};
pub use traits::{LanguageModel, VectorIndex};
