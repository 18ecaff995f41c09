//! 核心响应处理模块

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// 201 Created，附带 Location 头
pub fn created<T: Serialize>(location: &str, body: T) -> Response {
    (
        StatusCode::CREATED,
        [(header::LOCATION, location.to_string())],
        Json(body),
    )
        .into_response()
}

/// 204 No Content，空响应体
pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}
