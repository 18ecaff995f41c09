//! Product 处理器

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use super::model::Product;
use super::service::{ProductFilter, ProductService};
use crate::core::error::{ProductError, ProductResult};
use crate::core::response::{created, no_content};

const JSON: &str = "application/json";
const FORM: &str = "application/x-www-form-urlencoded";

#[derive(Clone)]
pub struct AppState {
    pub product_service: ProductService,
}

/// 列表查询参数
#[derive(Debug, Deserialize)]
pub struct ProductQuery {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    available: Option<String>,
}

impl From<ProductQuery> for ProductFilter {
    fn from(query: ProductQuery) -> Self {
        ProductFilter {
            name: query.name,
            category: query.category,
            available: query
                .available
                .filter(|value| !value.is_empty())
                .map(|value| parse_flag(&value)),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1")
}

/// 校验 Content-Type，必须在读取请求体之前调用
fn check_content_type<'a>(headers: &HeaderMap, allowed: &[&'a str]) -> ProductResult<&'a str> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            ProductError::UnsupportedMediaType(format!("Content-Type must be {}", allowed[0]))
        })?;

    // 忽略 "; charset=utf-8" 之类的参数
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    allowed
        .iter()
        .find(|candidate| **candidate == mime)
        .copied()
        .ok_or_else(|| {
            ProductError::UnsupportedMediaType(format!("Content-Type must be {}", allowed[0]))
        })
}

fn parse_json(body: &Bytes) -> ProductResult<Value> {
    serde_json::from_slice(body).map_err(|err| {
        ProductError::DataValidation(format!(
            "Invalid Product: body of request contained bad or no data ({})",
            err
        ))
    })
}

/// 表单字段都是字符串，这里把数值和布尔字段转换成对应的 JSON 类型
fn parse_form(body: &Bytes) -> Value {
    let mut map = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let value = value.into_owned();
        let converted = match key.as_ref() {
            "price" | "stock" => value
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::String(value)),
            "available" => match value.to_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::String(value),
            },
            _ => Value::String(value),
        };
        map.insert(key.into_owned(), converted);
    }
    Value::Object(map)
}

/// GET /
pub async fn index() -> Json<Value> {
    info!("Request for Root URL");
    Json(serde_json::json!({
        "name": "Product Demo REST API Service",
        "version": "1.0",
        "paths": "/products",
    }))
}

/// GET /healthcheck
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": 200,
        "message": "Healthy",
        "backend": state.product_service.backend(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /products
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductQuery>,
) -> ProductResult<Json<Vec<Value>>> {
    info!("Request for product list");
    let filter = ProductFilter::from(query);
    let products = state.product_service.list(&filter).await?;
    let results: Vec<Value> = products.iter().map(Product::serialize).collect();
    info!("Returning {} products", results.len());
    Ok(Json(results))
}

/// GET /products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ProductResult<Json<Value>> {
    info!("Request for product with id: {}", id);
    let product = state.product_service.find_or_404(&id).await?;
    Ok(Json(product.serialize()))
}

/// POST /products
pub async fn create_product(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ProductResult<Response> {
    info!("Request to create a product");
    let data = match check_content_type(&headers, &[JSON, FORM])? {
        FORM => parse_form(&body),
        _ => parse_json(&body)?,
    };

    let product = Product::from_value(&data)?;
    let product = state.product_service.create(product).await?;
    let id = product.id.clone().unwrap_or_default();
    info!("Product with id [{}] created!", id);

    Ok(created(&format!("/products/{}", id), product.serialize()))
}

/// PUT /products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ProductResult<Json<Value>> {
    info!("Request to update product with id: {}", id);
    check_content_type(&headers, &[JSON])?;

    let mut product = state.product_service.find_or_404(&id).await?;
    let data = parse_json(&body)?;
    product.deserialize(&data)?;
    state.product_service.update(&product).await?;

    Ok(Json(product.serialize()))
}

/// DELETE /products/:id
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ProductResult<Response> {
    info!("Request to delete product with id: {}", id);
    if state.product_service.find(&id).await?.is_some() {
        state.product_service.delete(&id).await?;
    }
    Ok(no_content())
}

/// PUT /products/:id/purchase
pub async fn purchase_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ProductResult<Json<Value>> {
    info!("Request to purchase product with id: {}", id);
    let product = state.product_service.purchase(&id).await?;
    Ok(Json(product.serialize()))
}

/// 未知路径
pub async fn not_found() -> Response {
    ProductError::NotFound("The requested resource was not found.".to_string()).into_response()
}
