mod server;

use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use pdf_exam_core::chunking::{DEFAULT_CHUNK_MAX_CHARS, DEFAULT_CHUNK_OVERLAP_CHARS};
use pdf_exam_core::config::DEFAULT_TOP_K;
use pdf_exam_core::providers::gemini::{
    parse_base_url, DEFAULT_EMBEDDING_MODEL, DEFAULT_GEMINI_URL, DEFAULT_GENERATION_MODEL,
    DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS,
};
use pdf_exam_core::{
    CharacterNgramEmbedder, ChunkingConfig, Embedder, ExamPipeline, ExamSettings, GeminiClient,
    GeminiConfig, LopdfExtractor, PromptLanguage, DEFAULT_QUESTION_COUNT,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type AppPipeline = ExamPipeline<LopdfExtractor, Box<dyn Embedder>, GeminiClient>;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Parser)]
#[command(name = "pdf-exam", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Gemini API key
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Gemini REST base URL
    #[arg(long, env = "GEMINI_BASE_URL", default_value = DEFAULT_GEMINI_URL)]
    gemini_url: String,

    /// Generation model
    #[arg(long, env = "GEMINI_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    model: String,

    /// Embedding model used when --embedder=gemini
    #[arg(long, env = "GEMINI_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Sampling temperature
    #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Per-request timeout for Gemini calls, in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Which embedder ranks chunks
    #[arg(long, value_enum, default_value_t = EmbedderKind::Gemini)]
    embedder: EmbedderKind,

    /// Prompt language
    #[arg(long, value_enum, default_value_t = Language::En)]
    language: Language,

    /// Maximum characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_MAX_CHARS)]
    chunk_size: usize,

    /// Characters shared by consecutive chunks
    #[arg(long, default_value_t = DEFAULT_CHUNK_OVERLAP_CHARS)]
    chunk_overlap: usize,

    /// Number of chunks handed to the model as context
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Generate an exam from a local PDF and print it as JSON.
    Generate {
        /// PDF file to read.
        #[arg(long)]
        file: PathBuf,
        /// Number of questions to ask for.
        #[arg(long, default_value_t = DEFAULT_QUESTION_COUNT)]
        questions: usize,
    },
    /// Serve the exam generation HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "EXAM_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
        /// Largest accepted upload, in bytes.
        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_upload_bytes: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    /// Gemini embedding API
    Gemini,
    /// Offline character trigram hashing
    Ngram,
}

#[derive(Clone, Copy, ValueEnum)]
enum Language {
    En,
    Es,
}

impl From<Language> for PromptLanguage {
    fn from(value: Language) -> Self {
        match value {
            Language::En => PromptLanguage::English,
            Language::Es => PromptLanguage::Spanish,
        }
    }
}

impl Cli {
    fn settings(&self) -> ExamSettings {
        let defaults = ExamSettings::from_env();
        let api_key = self.api_key.clone().or_else(|| defaults.api_key.clone());
        let language = PromptLanguage::from(self.language);
        ExamSettings {
            chunking: ChunkingConfig {
                max_chars: self.chunk_size,
                overlap_chars: self.chunk_overlap,
            },
            top_k: self.top_k,
            retrieval_query: language.retrieval_query().to_string(),
            language,
            ..defaults
        }
        .with_api_key(api_key)
    }

    fn build_pipeline(&self) -> anyhow::Result<AppPipeline> {
        let settings = self.settings();
        settings.chunking.validate()?;
        let api_key = settings.require_api_key()?.to_string();

        let gemini = GeminiConfig {
            base_url: parse_base_url(&self.gemini_url)?,
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
            ..GeminiConfig::new(api_key)?
        };

        let embedder: Box<dyn Embedder> = match self.embedder {
            EmbedderKind::Gemini => Box::new(GeminiClient::new(gemini.clone())?),
            EmbedderKind::Ngram => Box::new(CharacterNgramEmbedder::default()),
        };
        let model = GeminiClient::new(gemini)?;

        Ok(ExamPipeline::new(settings, LopdfExtractor, embedder, model))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let pipeline = cli.build_pipeline()?;

    info!(
        version = app_version,
        model = %cli.model,
        started_at = %Utc::now().to_rfc3339(),
        "pdf-exam boot"
    );

    match cli.command {
        Command::Generate { file, questions } => {
            let bytes = tokio::fs::read(&file).await?;
            info!(file = %file.display(), bytes = bytes.len(), questions, "generating exam");

            let exam = pipeline.generate_exam(&bytes, questions).await?;
            println!("{}", serde_json::to_string_pretty(&exam)?);
        }
        Command::Serve {
            bind,
            max_upload_bytes,
        } => {
            server::serve(Arc::new(pipeline), bind, max_upload_bytes).await?;
        }
    }

    Ok(())
}
