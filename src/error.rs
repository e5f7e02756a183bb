use actix_web::{HttpResponse, ResponseError};
use crate::models::ApiResponse;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    /// 原子单元未能提交；未留下任何部分状态，调用方可整体重试
    #[error("Persistence error: {0}")]
    PersistenceError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::NothingToUndo => "NOTHING_TO_UNDO",
            AppError::Unauthorized(_) => "PERMISSION_DENIED",
            AppError::AuthError(_) | AppError::JwtError(_) => "AUTH_ERROR",
            AppError::PersistenceError(_) => "PERSISTENCE_ERROR",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InsufficientBalance { .. } => StatusCode::CONFLICT,
            AppError::NotFound(_) | AppError::NothingToUndo => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::AuthError(_) | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::PersistenceError(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::ValidationError(msg) => {
                log::warn!("Validation error: {msg}");
                msg.clone()
            }
            AppError::InsufficientBalance { .. } => "Insufficient balance".to_string(),
            AppError::NotFound(msg) => msg.clone(),
            // 正常业务结果，不按错误记录
            AppError::NothingToUndo => "Nothing to undo".to_string(),
            AppError::Unauthorized(msg) => {
                log::warn!("Permission denied: {msg}");
                "Permission denied".to_string()
            }
            AppError::AuthError(msg) => {
                log::warn!("Authentication error: {msg}");
                msg.clone()
            }
            AppError::JwtError(err) => {
                log::warn!("Authentication error: {err}");
                "Invalid access token".to_string()
            }
            AppError::PersistenceError(err) => {
                log::error!("Persistence error: {err}");
                "Temporarily unable to save, please retry".to_string()
            }
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(ApiResponse::<()>::error(
            self.error_code().to_string(),
            message,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InsufficientBalance {
                available: 1,
                requested: 2
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(AppError::NothingToUndo.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Unauthorized("inactive".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::PersistenceError(sea_orm::DbErr::Custom("timeout".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::NothingToUndo.error_code(), "NOTHING_TO_UNDO");
        assert_eq!(
            AppError::NotFound("entry".into()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            AppError::InternalError("boom".into()).error_code(),
            "INTERNAL_ERROR"
        );
    }
}
