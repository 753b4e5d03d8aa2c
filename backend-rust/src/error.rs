use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::i18n::{translate, Lang};

/// Stable error kind exposed to callers alongside the translation key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Forbidden,
    InvalidState,
    Unauthorized,
    Internal,
}

/// Every caller-visible failure of the booking core. Domain variants carry the
/// translation key; none of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(&'static str),
    #[error("validation failed: {0}")]
    Validation(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn forbidden() -> Self {
        AppError::Forbidden("errors.forbidden")
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::InvalidState(_) => ErrorKind::InvalidState,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn translation_key(&self) -> &'static str {
        match self {
            AppError::NotFound(key)
            | AppError::Validation(key)
            | AppError::Forbidden(key)
            | AppError::InvalidState(key)
            | AppError::Unauthorized(key) => key,
            AppError::Internal(_) => "errors.internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::InvalidState => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn in_lang(self, lang: Lang) -> LocalizedError {
        LocalizedError { error: self, lang }
    }
}

/// An `AppError` bound to the request's locale, ready to become a response.
#[derive(Debug)]
pub struct LocalizedError {
    pub error: AppError,
    pub lang: Lang,
}

impl From<AppError> for LocalizedError {
    fn from(error: AppError) -> Self {
        Self {
            error,
            lang: Lang::default(),
        }
    }
}

impl IntoResponse for LocalizedError {
    fn into_response(self) -> Response {
        if let AppError::Internal(e) = &self.error {
            error!("Internal error: {e:#}");
        }
        let key = self.error.translation_key();
        let body = json!({
            "error": self.error.kind(),
            "key": key,
            "message": translate(key, self.lang),
        });
        (self.error.status_code(), Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        LocalizedError::from(self).into_response()
    }
}
