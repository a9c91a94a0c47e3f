pub mod gemini;

pub use gemini::{parse_model_output, GeminiClient, GeminiConfig};
