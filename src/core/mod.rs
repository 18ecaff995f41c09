//! 核心层：错误、响应、中间件、重试

pub mod error;
pub mod middleware;
pub mod response;
pub mod retry;
