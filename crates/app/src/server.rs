//! HTTP surface: one upload endpoint in front of [`ExamPipeline`].

use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pdf_exam_core::{
    Embedder, ExamError, ExamPipeline, ExamResponse, LanguageModel, PdfExtractor,
    DEFAULT_QUESTION_COUNT,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const FILE_FIELD: &str = "file";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Exam(ExamError),
}

impl From<ExamError> for ApiError {
    fn from(value: ExamError) -> Self {
        Self::Exam(value)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(value: MultipartRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Exam(err) => match err {
                ExamError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                ExamError::Extraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ExamError::Embedding(_)
                | ExamError::Index(_)
                | ExamError::Generation(_)
                | ExamError::Normalization(_) => StatusCode::BAD_GATEWAY,
                ExamError::Configuration(_) | ExamError::Io(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(message) => message.clone(),
            Self::Exam(err) => err.to_string(),
        };

        if status.is_server_error() {
            error!(%status, error = %message, "exam request failed");
        } else {
            warn!(%status, error = %message, "exam request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    #[serde(default = "default_question_count")]
    pub questions: usize,
}

fn default_question_count() -> usize {
    DEFAULT_QUESTION_COUNT
}

pub fn router<X, E, M>(pipeline: Arc<ExamPipeline<X, E, M>>, max_upload_bytes: usize) -> Router
where
    X: PdfExtractor + Send + Sync + 'static,
    E: Embedder + 'static,
    M: LanguageModel + 'static,
{
    Router::new()
        .route("/", get(root))
        .route(
            "/generate_exam",
            post(generate_exam::<X, E, M>).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .with_state(pipeline)
        .layer(TraceLayer::new_for_http())
}

pub async fn serve<X, E, M>(
    pipeline: Arc<ExamPipeline<X, E, M>>,
    bind: SocketAddr,
    max_upload_bytes: usize,
) -> anyhow::Result<()>
where
    X: PdfExtractor + Send + Sync + 'static,
    E: Embedder + 'static,
    M: LanguageModel + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, max_upload_bytes, "serving exam API");

    axum::serve(listener, router(pipeline, max_upload_bytes)).await?;
    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the EduPath API" }))
}

/// POST /generate_exam?questions=N with a multipart `file` field.
async fn generate_exam<X, E, M>(
    State(pipeline): State<Arc<ExamPipeline<X, E, M>>>,
    params: Result<Query<GenerateParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExamResponse>, ApiError>
where
    X: PdfExtractor + Send + Sync + 'static,
    E: Embedder + 'static,
    M: LanguageModel + 'static,
{
    let Query(params) = params?;
    let mut multipart = multipart?;
    let mut document = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("upload.pdf").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read file: {e}")))?;

        info!(filename = %filename, bytes = data.len(), "received document");
        document = Some(data);
        break;
    }

    let document = document
        .ok_or_else(|| ApiError::BadRequest(format!("missing multipart field '{FILE_FIELD}'")))?;

    let exam = pipeline.generate_exam(&document, params.questions).await?;
    Ok(Json(exam))
}
