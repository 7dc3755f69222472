use std::io::Cursor;

use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use serde_json::json;
use thiserror::Error;

/// Failures a handler can surface, mapped to HTTP statuses. Store and pool
/// errors keep their source for logs but never reach the response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Erro interno")]
    Internal,
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Pool(#[from] r2d2::Error),
}

impl ApiError {
    /// Translate a uniqueness violation into a user-facing conflict.
    pub fn on_conflict(err: rusqlite::Error, message: &str) -> ApiError {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                ApiError::BadRequest(message.to_string())
            }
            other => ApiError::Database(other),
        }
    }

    fn status(&self) -> Status {
        match self {
            ApiError::BadRequest(_) => Status::BadRequest,
            ApiError::Unauthorized(_) => Status::Unauthorized,
            ApiError::Forbidden(_) => Status::Forbidden,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Internal | ApiError::Database(_) | ApiError::Pool(_) => {
                Status::InternalServerError
            }
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Internal | ApiError::Database(_) | ApiError::Pool(_) => {
                "Erro interno".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let body = json!({ "error": self.message() }).to_string();
        Response::build()
            .status(self.status())
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}
