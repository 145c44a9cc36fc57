use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use validator::ValidationErrors;

use crate::uploads::UploadError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("movie {0} not found")]
    NotFound(i32),
    #[error("movie {0:?} not found")]
    MalformedId(String),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("movie {0} was modified by another request")]
    ConcurrencyConflict(i32),
    #[error("failed to store poster: {0}")]
    Storage(#[from] UploadError),
    #[error(transparent)]
    Database(#[from] sea_orm::DbErr),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<CatalogError>() {
            Some(CatalogError::NotFound(_) | CatalogError::MalformedId(_)) => {
                StatusCode::NOT_FOUND
            },
            Some(CatalogError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(CatalogError::ConcurrencyConflict(_)) => StatusCode::CONFLICT,
            _ if self.0.is::<MultipartError>() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self(err)
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        Self(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
