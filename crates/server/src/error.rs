//! Error types for the upload service

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use csvision_pipeline::PipelineError;
use plotters::drawing::DrawingAreaErrorKind;
use thiserror::Error;

use crate::html;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Chart rendering failed: {0}")]
    Chart(#[from] DrawingAreaErrorKind<std::io::Error>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) | ServerError::Multipart(_) => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(PipelineError::Fit { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Pipeline(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ServerError::Pipeline(_) | ServerError::Chart(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text shown on the error page
    pub fn message(&self) -> String {
        match self {
            ServerError::BadRequest(msg) => msg.clone(),
            ServerError::Multipart(e) => format!("Could not read the uploaded form: {}", e.body_text()),
            ServerError::Pipeline(e) => e.user_message(),
            ServerError::Chart(_) => "The report charts could not be rendered".to_string(),
            ServerError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ServerError::Pipeline(PipelineError::Fit { reason, diagnostics }) => {
                tracing::error!(reason = %reason, "Training failed\n{}", diagnostics);
            }
            _ if status.is_server_error() => {
                tracing::error!(detail = %self, "Internal server error");
            }
            _ => tracing::warn!(detail = %self, "Rejected request"),
        }

        (status, Html(html::error_page(status, &self.message()))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
