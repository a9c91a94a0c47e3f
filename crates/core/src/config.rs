use crate::chunking::ChunkingConfig;
use crate::ExamError;
use serde::{Deserialize, Serialize};

pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";
pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_QUESTION_COUNT: usize = 5;
pub const DEFAULT_RETRIEVAL_QUERY: &str = "Generate multiple-choice questions with 4 options each.";
pub const SPANISH_RETRIEVAL_QUERY: &str =
    "Generar preguntas de multiple choice con 4 opciones cada una.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptLanguage {
    #[default]
    English,
    Spanish,
}

impl PromptLanguage {
    /// Query that chunks are ranked against, phrased in the prompt language.
    pub fn retrieval_query(self) -> &'static str {
        match self {
            Self::English => DEFAULT_RETRIEVAL_QUERY,
            Self::Spanish => SPANISH_RETRIEVAL_QUERY,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExamSettings {
    pub api_key: Option<String>,
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub retrieval_query: String,
    pub language: PromptLanguage,
}

impl Default for ExamSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            chunking: ChunkingConfig::default(),
            top_k: DEFAULT_TOP_K,
            retrieval_query: PromptLanguage::default().retrieval_query().to_string(),
            language: PromptLanguage::default(),
        }
    }
}

impl ExamSettings {
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().and_then(non_empty),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.and_then(non_empty);
        self
    }

    pub fn require_api_key(&self) -> Result<&str, ExamError> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ExamError::Configuration(format!("{API_KEY_ENV} is not set"))
            })
    }
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
