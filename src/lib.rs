//! # Product Service
//!
//! 商品目录 REST 服务：
//! - `app`：路由、处理器、业务服务与 Product 实体
//! - `core`：错误、响应、中间件、重试
//! - `infrastructure`：PostgreSQL / CouchDB / 内存存储，日志
//! - `config`：环境变量配置

pub mod app;
pub mod config;
pub mod core;
pub mod infrastructure;

use std::sync::Arc;

use axum::Router;

use app::product::{handler::AppState, ProductRepository, ProductService};

/// 用给定的存储后端构建完整的应用路由
pub fn build_app(repo: Arc<dyn ProductRepository>) -> Router {
    app::routes(AppState {
        product_service: ProductService::new(repo),
    })
}
