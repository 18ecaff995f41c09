//! 核心错误处理模块

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// 核心错误类型
#[derive(Debug, Error)]
pub enum ProductError {
    /// 请求数据缺失、格式错误或类型不符
    #[error("{0}")]
    DataValidation(String),

    #[error("{0}")]
    NotFound(String),

    /// 非法的状态转换（重复购买）
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    /// 存储暂时不可用，重试次数已耗尽
    #[error("{0}")]
    ServiceUnavailable(String),

    /// 启动时无法连接或初始化存储
    #[error("database connection failed: {0}")]
    DatabaseConnection(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type ProductResult<T> = Result<T, ProductError>;

#[cfg(feature = "database")]
impl From<sqlx::Error> for ProductError {
    fn from(err: sqlx::Error) -> Self {
        ProductError::Database(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ProductError {
    fn from(err: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = err
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    error
                        .message
                        .as_ref()
                        .map(|msg| msg.to_string())
                        .unwrap_or_else(|| format!("Invalid value for [{}]", field))
                })
            })
            .collect();

        ProductError::DataValidation(messages.join(", "))
    }
}

/// 错误响应结构
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    pub timestamp: String,
}

impl ProductError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProductError::DataValidation(_) => StatusCode::BAD_REQUEST,
            ProductError::NotFound(_) => StatusCode::NOT_FOUND,
            ProductError::Conflict(_) => StatusCode::CONFLICT,
            ProductError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProductError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ProductError::DatabaseConnection(_) | ProductError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ProductError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, user_message) = match self {
            ProductError::DataValidation(msg) => ("Bad Request", msg),
            ProductError::NotFound(msg) => ("Not Found", msg),
            ProductError::Conflict(msg) => ("Conflict", msg),
            ProductError::UnsupportedMediaType(msg) => ("Unsupported media type", msg),
            ProductError::ServiceUnavailable(msg) => ("Service Unavailable", msg),
            ProductError::DatabaseConnection(msg) | ProductError::Database(msg) => {
                // 内部细节只写日志
                error!("Database error: {}", msg);
                (
                    "Internal Server Error",
                    "The server encountered an internal error".to_string(),
                )
            }
        };

        let error_response = ErrorResponse {
            error: error_message.to_string(),
            message: user_message,
            code: status.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, axum::Json(error_response)).into_response()
    }
}
