//! 应用层

pub mod product;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::core::middleware::request_logging_middleware;
use product::handler::{self, AppState};

/// 组装全部路由
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handler::index))
        .route("/healthcheck", get(handler::health_check))
        .route(
            "/products",
            get(handler::list_products).post(handler::create_product),
        )
        .route(
            "/products/:id",
            get(handler::get_product)
                .put(handler::update_product)
                .delete(handler::delete_product),
        )
        .route("/products/:id/purchase", put(handler::purchase_product))
        .fallback(handler::not_found)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
