// src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(e) if is_unique_violation(e) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
        }
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

// 核心逻辑：将我们的错误转换为 HTTP 响应
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match self {
            AppError::Database(ref e) => {
                // 后台记录详细错误
                tracing::error!("Database Error: {:?}", e);

                // 对外根据具体情况返回信息
                if status == StatusCode::CONFLICT {
                    "Record already exists".to_string()
                } else {
                    "Database operation failed".to_string()
                }
            }
            AppError::Internal(ref detail) => {
                tracing::error!("Internal Error: {}", detail);
                "Internal server error".to_string()
            }
            AppError::Auth(msg)
            | AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::Conflict(msg)
            | AppError::BadRequest(msg) => msg,
            AppError::ValidationError(ref e) => format!("Invalid input: {}", e),
        };

        let body = Json(json!({
            "status": "error",
            "message": error_message,
        }));

        (status, body).into_response()
    }
}
