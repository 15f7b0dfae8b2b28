use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// RepositoryError
///
/// Failures surfaced by the persistence layer. Unique-constraint violations are
/// reported as `Conflict` so form handlers can turn them into field errors.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return RepositoryError::Conflict(constraint);
            }
        }
        RepositoryError::Database(err)
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// AppError
///
/// Everything a handler can fail with. Form validation problems are not errors;
/// they are rendered back into the form.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("password hashing error: {0}")]
    PasswordHash(String),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("forbidden")]
    Forbidden,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            AppError::Multipart(e) => {
                tracing::warn!(error = %e, "rejected multipart body");
                (StatusCode::BAD_REQUEST, "Malformed form submission").into_response()
            }
            other => {
                tracing::error!(error = ?other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
            }
        }
    }
}
