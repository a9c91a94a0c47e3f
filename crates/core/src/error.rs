use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),
}

#[derive(Debug, Error)]
pub enum ExamError {
    #[error("missing configuration: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] IngestError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("similarity index failed: {0}")]
    Index(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("response normalization failed: {0}")]
    Normalization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ExamError> = std::result::Result<T, E>;
