use crate::config::PromptLanguage;
use crate::traits::LanguageModel;
use crate::ExamError;
use serde_json::Value;
use tracing::{debug, error};

const FORMAT_INSTRUCTIONS: &str = r#"Return only JSON, with no surrounding prose or markdown. The JSON must be a list of objects shaped like:
[{"question": "...", "choices": ["...", "...", "...", "..."], "answer": "..."}]"#;

pub fn build_prompt(question_count: usize, context: &str, language: PromptLanguage) -> String {
    match language {
        PromptLanguage::English => format!(
            "Based on the following text, generate {question_count} multiple-choice questions with 4 options each.\n\
             Make sure the questions are relevant and educational.\n\
             Output format: a JSON list of objects with 'question', 'choices' (list), and 'answer'.\n\n\
             Text: {context}\n\n\
             {FORMAT_INSTRUCTIONS}\n"
        ),
        PromptLanguage::Spanish => format!(
            "Basado en el siguiente texto, genera {question_count} preguntas de multiple choice con 4 opciones cada una.\n\
             Asegúrate de que las preguntas sean relevantes y educativas.\n\
             Formato de salida: Una lista JSON con objetos que tengan 'question', 'choices' (lista), y 'answer'.\n\n\
             Texto: {context}\n\n\
             {FORMAT_INSTRUCTIONS}\n"
        ),
    }
}

pub struct ExamGenerator<M>
where
    M: LanguageModel,
{
    model: M,
    language: PromptLanguage,
}

impl<M> ExamGenerator<M>
where
    M: LanguageModel,
{
    pub fn new(model: M, language: PromptLanguage) -> Self {
        Self { model, language }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// One model call per exam; failures are not retried.
    pub async fn generate(&self, context: &str, question_count: usize) -> Result<Value, ExamError> {
        let prompt = build_prompt(question_count, context, self.language);
        debug!(
            model = self.model.name(),
            prompt_chars = prompt.len(),
            context_chars = context.len(),
            "invoking generative model"
        );

        self.model.generate(&prompt).await.map_err(|err| {
            error!(model = self.model.name(), error = %err, "generation failed");
            match err {
                ExamError::Generation(_) => err,
                other => ExamError::Generation(other.to_string()),
            }
        })
    }
}
