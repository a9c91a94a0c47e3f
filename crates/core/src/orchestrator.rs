use crate::chunking::chunk_pages;
use crate::config::ExamSettings;
use crate::context::ContextSelector;
use crate::document::{document_digest, ScopedDocument};
use crate::embeddings::Embedder;
use crate::extractor::PdfExtractor;
use crate::generation::ExamGenerator;
use crate::normalizer::normalize_with_report;
use crate::traits::LanguageModel;
use crate::{ExamError, ExamResponse, IngestError};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Runs one document through extract → chunk → select → generate →
/// normalize. Holds no per-request state, so one instance can serve many
/// requests concurrently.
pub struct ExamPipeline<X, E, M>
where
    X: PdfExtractor,
    E: Embedder,
    M: LanguageModel,
{
    settings: ExamSettings,
    extractor: Arc<X>,
    selector: ContextSelector<E>,
    generator: ExamGenerator<M>,
}

impl<X, E, M> ExamPipeline<X, E, M>
where
    X: PdfExtractor + Send + Sync + 'static,
    E: Embedder,
    M: LanguageModel,
{
    pub fn new(settings: ExamSettings, extractor: X, embedder: E, model: M) -> Self {
        let selector = ContextSelector::new(embedder, settings.retrieval_query.clone(), settings.top_k);
        let generator = ExamGenerator::new(model, settings.language);
        Self {
            settings,
            extractor: Arc::new(extractor),
            selector,
            generator,
        }
    }

    pub fn settings(&self) -> &ExamSettings {
        &self.settings
    }

    pub fn extractor(&self) -> &X {
        &self.extractor
    }

    pub fn embedder(&self) -> &E {
        self.selector.embedder()
    }

    pub fn model(&self) -> &M {
        self.generator.model()
    }

    pub async fn generate_exam(
        &self,
        document: &[u8],
        requested_question_count: usize,
    ) -> Result<ExamResponse, ExamError> {
        if let Err(err) = self.settings.require_api_key() {
            error!(error = %err, "refusing exam generation");
            return Err(err);
        }

        if requested_question_count == 0 {
            return Err(ExamError::InvalidRequest(
                "question count must be at least 1".to_string(),
            ));
        }

        let span = info_span!(
            "generate_exam",
            request_id = %Uuid::new_v4(),
            document_sha256 = %document_digest(document),
            questions = requested_question_count,
        );

        async {
            let stored = ScopedDocument::write(document)?;
            let outcome = self.run(&stored, requested_question_count).await;
            if let Err(err) = stored.close() {
                warn!(error = %err, "could not remove uploaded document");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        document: &ScopedDocument,
        requested_question_count: usize,
    ) -> Result<ExamResponse, ExamError> {
        let path = document.path().to_path_buf();
        let extractor = Arc::clone(&self.extractor);
        let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&path))
            .await
            .map_err(|err| IngestError::PdfParse(format!("extraction task failed: {err}")))
            .and_then(|extracted| extracted)
            .map_err(|err| {
                error!(error = %err, "text extraction failed");
                ExamError::Extraction(err)
            })?;

        let chunks = chunk_pages(&pages, self.settings.chunking)
            .map_err(|err| ExamError::Configuration(err.to_string()))?;
        info!(pages = pages.len(), chunks = chunks.len(), "document chunked");

        let context = self.selector.select(&chunks).await?;
        let raw = self
            .generator
            .generate(&context, requested_question_count)
            .await?;

        let report = normalize_with_report(&raw)?;
        info!(
            accepted = report.exam.len(),
            rejected = report.rejected.len(),
            "exam generated"
        );

        Ok(report.exam)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::PageText;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeExtractor {
        pages: Vec<PageText>,
        fail: bool,
        seen: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    impl PdfExtractor for FakeExtractor {
        fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
            let bytes = std::fs::read(path)?;
            self.seen.lock().unwrap().push((path.to_path_buf(), bytes));
            if self.fail {
                return Err(IngestError::PdfParse("not a pdf".to_string()));
            }
            Ok(self.pages.clone())
        }
    }

    struct FakeModel {
        response: Value,
        fail: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeModel {
        fn answering(response: Value) -> Self {
            Self {
                response,
                fail: false,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, prompt: &str) -> Result<Value, ExamError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(ExamError::Generation("model unavailable".to_string()));
            }
            Ok(self.response.clone())
        }
    }

    fn settings() -> ExamSettings {
        ExamSettings::default().with_api_key(Some("test-key".to_string()))
    }

    fn pipeline(
        settings: ExamSettings,
        extractor: FakeExtractor,
        model: FakeModel,
    ) -> ExamPipeline<FakeExtractor, CharacterNgramEmbedder, FakeModel> {
        ExamPipeline::new(settings, extractor, CharacterNgramEmbedder::default(), model)
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ExamError> {
            Err(ExamError::Embedding("embedding service unavailable".to_string()))
        }
    }

    fn seen_paths<E: Embedder>(pipeline: &ExamPipeline<FakeExtractor, E, FakeModel>) -> Vec<PathBuf> {
        pipeline
            .extractor()
            .seen
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn biology_pages() -> Vec<PageText> {
        vec![
            PageText {
                number: 1,
                text: "Photosynthesis turns light into chemical energy.".to_string(),
            },
            PageText {
                number: 2,
                text: "Mitochondria produce ATP through respiration.".to_string(),
            },
        ]
    }

    #[tokio::test]
    async fn missing_api_key_fails_before_any_collaborator() {
        let pipeline = pipeline(
            ExamSettings::default(),
            FakeExtractor::default(),
            FakeModel::answering(json!([])),
        );

        let result = pipeline.generate_exam(b"%PDF-1.4", 5).await;

        assert!(matches!(result, Err(ExamError::Configuration(_))));
        assert!(seen_paths(&pipeline).is_empty());
        assert!(pipeline.model().prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_questions_is_rejected() {
        let pipeline = pipeline(settings(), FakeExtractor::default(), FakeModel::answering(json!([])));
        let result = pipeline.generate_exam(b"%PDF-1.4", 0).await;
        assert!(matches!(result, Err(ExamError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn document_flows_through_to_normalized_exam() {
        let extractor = FakeExtractor {
            pages: biology_pages(),
            ..Default::default()
        };
        let model = FakeModel::answering(json!({"questions": [
            {"question": "What produces ATP?", "choices": ["Mitochondria", "Ribosome"], "answer": "Mitochondria"},
            "not-json",
            {"pregunta": "¿Qué convierte la luz?", "opciones": ["Fotosíntesis", "Mitosis"], "respuesta": "Fotosíntesis"}
        ]}));
        let pipeline = pipeline(settings(), extractor, model);

        let exam = pipeline.generate_exam(b"%PDF-1.4 biology", 3).await.unwrap();

        assert_eq!(exam.len(), 2);
        assert_eq!(exam.questions[0].choices, "Mitochondria, Ribosome");
        assert_eq!(exam.questions[1].answer, "Fotosíntesis");

        let prompts = pipeline.model().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("generate 3 multiple-choice questions"));
        assert!(prompts[0].contains("Mitochondria produce ATP"));
        assert!(prompts[0].contains("Photosynthesis turns light"));

        let seen = pipeline.extractor().seen.lock().unwrap();
        assert_eq!(seen[0].1, b"%PDF-1.4 biology");
        assert!(!seen[0].0.exists());
    }

    #[tokio::test]
    async fn document_without_text_reaches_model_with_empty_context() {
        let pipeline = pipeline(settings(), FakeExtractor::default(), FakeModel::answering(json!([])));

        let exam = pipeline.generate_exam(b"%PDF-1.4", 5).await.unwrap();

        assert!(exam.is_empty());
        let prompts = pipeline.model().prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Text: \n"));
    }

    #[tokio::test]
    async fn extraction_failure_propagates_and_cleans_up() {
        let extractor = FakeExtractor {
            fail: true,
            ..Default::default()
        };
        let pipeline = pipeline(settings(), extractor, FakeModel::answering(json!([])));

        let result = pipeline.generate_exam(b"garbage", 5).await;

        assert!(matches!(result, Err(ExamError::Extraction(_))));
        assert!(pipeline.model().prompts.lock().unwrap().is_empty());
        let paths = seen_paths(&pipeline);
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn generation_failure_propagates_and_cleans_up() {
        let extractor = FakeExtractor {
            pages: biology_pages(),
            ..Default::default()
        };
        let model = FakeModel {
            fail: true,
            ..FakeModel::answering(json!([]))
        };
        let pipeline = pipeline(settings(), extractor, model);

        let result = pipeline.generate_exam(b"%PDF-1.4", 5).await;

        assert!(matches!(result, Err(ExamError::Generation(_))));
        assert!(!seen_paths(&pipeline)[0].exists());
    }

    #[tokio::test]
    async fn fatal_normalization_error_propagates() {
        let extractor = FakeExtractor {
            pages: biology_pages(),
            ..Default::default()
        };
        let pipeline = pipeline(
            settings(),
            extractor,
            FakeModel::answering(json!({"questions": {"question": "Q"}})),
        );

        let result = pipeline.generate_exam(b"%PDF-1.4", 1).await;
        assert!(matches!(result, Err(ExamError::Normalization(_))));
        assert!(!seen_paths(&pipeline)[0].exists());
    }

    #[tokio::test]
    async fn embedding_failure_propagates_and_cleans_up() {
        let extractor = FakeExtractor {
            pages: biology_pages(),
            ..Default::default()
        };
        let pipeline = ExamPipeline::new(
            settings(),
            extractor,
            DownEmbedder,
            FakeModel::answering(json!([])),
        );

        let result = pipeline.generate_exam(b"%PDF-1.4", 5).await;

        assert!(matches!(result, Err(ExamError::Embedding(_))));
        assert!(pipeline.model().prompts.lock().unwrap().is_empty());
        let paths = seen_paths(&pipeline);
        assert_eq!(paths.len(), 1);
        assert!(!paths[0].exists());
    }

    #[tokio::test]
    async fn invalid_chunking_is_a_configuration_error() {
        let extractor = FakeExtractor {
            pages: biology_pages(),
            ..Default::default()
        };
        let mut settings = settings();
        settings.chunking.overlap_chars = settings.chunking.max_chars;
        let pipeline = pipeline(settings, extractor, FakeModel::answering(json!([])));

        let result = pipeline.generate_exam(b"%PDF-1.4", 5).await;

        assert!(matches!(result, Err(ExamError::Configuration(_))));
        assert!(!seen_paths(&pipeline)[0].exists());
    }
}
