//! 核心中间件模块

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// 请求日志中间件
///
/// 为每个请求分配 request id（或沿用客户端传入的），写回响应头，
/// 并在请求结束后记录方法、路径、状态码与耗时。
pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut response = next.run(req).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        warn!(%request_id, %method, %uri, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        info!(%request_id, %method, %uri, status = status.as_u16(), elapsed_ms, "request handled");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
