//! CouchDB / Cloudant 文档存储
//!
//! 通过 CouchDB 的 HTTP API 访问。所有请求都包在重试策略里：
//! 连接失败、超时以及 408/429/5xx 会按指数退避重试。
//!
//! 写操作（create / update / delete）重试耗尽后只记录日志不报错，
//! create 此时不会回填 id，由调用方检查；读操作重试耗尽后返回
//! `ServiceUnavailable`。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::app::product::model::Product;
use crate::app::product::repository::{FilterField, ProductRepository, CATEGORY_FIRST};
use crate::config::CouchDbCredentials;
use crate::core::error::{ProductError, ProductResult};
use crate::core::retry::RetryPolicy;

/// `_find` 每页文档数
const PAGE_SIZE: usize = 200;

const INDEXED_FIELDS: [&str; 3] = ["name", "category", "available"];

#[derive(Debug, Error)]
enum CouchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("CouchDB returned {status}: {body}")]
    Status { status: u16, body: String },
}

impl CouchError {
    fn is_transient(&self) -> bool {
        match self {
            CouchError::Transport(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            CouchError::Status { status, .. } => {
                matches!(status, 408 | 429) || (500..=599).contains(status)
            }
        }
    }
}

impl From<CouchError> for ProductError {
    fn from(err: CouchError) -> Self {
        if err.is_transient() {
            return ProductError::ServiceUnavailable(format!("Document store unavailable: {}", err));
        }
        match err {
            CouchError::Status { status: 409, .. } => ProductError::Conflict(
                "Product was modified by another request, try again".to_string(),
            ),
            other => ProductError::Database(other.to_string()),
        }
    }
}

pub struct CouchDbProductRepository {
    client: Client,
    base: Url,
    database: String,
    auth: Option<(String, Option<String>)>,
    retry: RetryPolicy,
}

impl CouchDbProductRepository {
    pub fn new(
        credentials: &CouchDbCredentials,
        database: &str,
        admin_party: bool,
        retry: RetryPolicy,
    ) -> ProductResult<Self> {
        let base = Url::parse(&credentials.url).map_err(|err| {
            ProductError::DatabaseConnection(format!("invalid CouchDB url: {}", err))
        })?;
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|err| ProductError::DatabaseConnection(err.to_string()))?;

        let auth = match (&credentials.username, admin_party) {
            (Some(username), false) => Some((username.clone(), credentials.password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base,
            database: database.to_string(),
            auth,
            retry,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.database).extend(segments);
        }
        url
    }

    async fn send_once(
        &self,
        method: Method,
        url: &Url,
        body: Option<&Value>,
        allow: &[u16],
    ) -> Result<(u16, Value), CouchError> {
        let mut request = self.client.request(method, url.clone());
        if let Some((username, password)) = &self.auth {
            request = request.basic_auth(username, password.as_ref());
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_success() || allow.contains(&status.as_u16()) {
            let value = serde_json::from_str(&text).unwrap_or(Value::Null);
            Ok((status.as_u16(), value))
        } else {
            Err(CouchError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }

    /// 带重试地发送请求；`allow` 中的状态码按成功处理
    async fn call(
        &self,
        label: &str,
        method: Method,
        url: Url,
        body: Option<Value>,
        allow: &[u16],
    ) -> Result<(u16, Value), CouchError> {
        let method = &method;
        let url = &url;
        let body = body.as_ref();
        self.retry
            .run(label, CouchError::is_transient, move || {
                self.send_once(method.clone(), url, body, allow)
            })
            .await
    }

    async fn fetch_document(&self, id: &str) -> Result<Option<Value>, CouchError> {
        if !is_document_id(id) {
            return Ok(None);
        }
        let (status, doc) = self
            .call("get", Method::GET, self.url(&[id]), None, &[404])
            .await?;
        Ok((status != 404).then_some(doc))
    }

    async fn query(&self, field: &str, value: Value) -> ProductResult<Vec<Product>> {
        let mut products = Vec::new();
        let mut bookmark: Option<String> = None;
        loop {
            let mut body = json!({
                "selector": { field: value },
                "limit": PAGE_SIZE,
            });
            if let Some(bookmark) = &bookmark {
                body["bookmark"] = Value::String(bookmark.clone());
            }

            let (_, page) = self
                .call("find", Method::POST, self.url(&["_find"]), Some(body), &[])
                .await?;
            let docs = page["docs"].as_array().cloned().unwrap_or_default();
            let count = docs.len();
            products.extend(docs.iter().filter_map(to_product));

            match page["bookmark"].as_str() {
                Some(next) if count == PAGE_SIZE => bookmark = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(products)
    }

    async fn all_documents(&self) -> ProductResult<Vec<Value>> {
        let mut url = self.url(&["_all_docs"]);
        url.query_pairs_mut().append_pair("include_docs", "true");
        let (_, result) = self.call("all", Method::GET, url, None, &[]).await?;

        Ok(result["rows"]
            .as_array()
            .map(|rows| {
                rows.iter()
                    .filter(|row| !row["id"].as_str().unwrap_or("").starts_with("_design/"))
                    .map(|row| row["doc"].clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    /// 写操作重试耗尽时只记日志
    fn absorb(&self, operation: &str, err: CouchError) -> ProductResult<()> {
        if err.is_transient() {
            error!("{} gave up after {} attempts: {}", operation, self.retry.max_attempts, err);
            Ok(())
        } else {
            Err(err.into())
        }
    }
}

/// 空 id、`.`、`..` 会被 URL 规范化成数据库本身，`_` 开头的是系统文档
fn is_document_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.starts_with('_')
}

fn to_product(doc: &Value) -> Option<Product> {
    match Product::from_value(doc) {
        Ok(product) => Some(product),
        Err(err) => {
            warn!("Skipping malformed document {}: {}", doc["_id"], err);
            None
        }
    }
}

/// 去掉 id，CouchDB 使用 `_id`
fn to_document(product: &Product) -> Value {
    let mut doc = product.serialize();
    if let Some(map) = doc.as_object_mut() {
        map.remove("id");
    }
    doc
}

#[async_trait]
impl ProductRepository for CouchDbProductRepository {
    fn backend(&self) -> &'static str {
        "couchdb"
    }

    fn filter_precedence(&self) -> [FilterField; 3] {
        CATEGORY_FIRST
    }

    async fn init_db(&self) -> ProductResult<()> {
        info!("Initializing CouchDB database {}", self.database);
        let connection_error = |err: CouchError| ProductError::DatabaseConnection(err.to_string());

        self.call("create database", Method::PUT, self.url(&[]), None, &[412])
            .await
            .map_err(connection_error)?;

        for field in INDEXED_FIELDS {
            let index = json!({
                "index": { "fields": [field] },
                "name": format!("{}-index", field),
                "type": "json",
            });
            self.call("create index", Method::POST, self.url(&["_index"]), Some(index), &[])
                .await
                .map_err(connection_error)?;
        }
        Ok(())
    }

    async fn create(&self, product: &mut Product) -> ProductResult<()> {
        let doc = to_document(product);
        match self.call("create", Method::POST, self.url(&[]), Some(doc), &[]).await {
            Ok((_, result)) => {
                product.id = result["id"].as_str().map(str::to_string);
                Ok(())
            }
            Err(err) => self.absorb("create", err),
        }
    }

    async fn update(&self, product: &Product) -> ProductResult<()> {
        let Some(id) = product.id.as_deref() else {
            return Ok(());
        };

        let existing = match self.fetch_document(id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                warn!("Update skipped, document {} no longer exists", id);
                return Ok(());
            }
            Err(err) => return self.absorb("update", err),
        };

        let mut doc = to_document(product);
        doc["_id"] = Value::String(id.to_string());
        doc["_rev"] = existing["_rev"].clone();
        match self.call("update", Method::PUT, self.url(&[id]), Some(doc), &[]).await {
            Ok(_) => Ok(()),
            Err(err) => self.absorb("update", err),
        }
    }

    async fn delete(&self, id: &str) -> ProductResult<()> {
        let existing = match self.fetch_document(id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return Ok(()),
            Err(err) => return self.absorb("delete", err),
        };

        let mut url = self.url(&[id]);
        if let Some(rev) = existing["_rev"].as_str() {
            url.query_pairs_mut().append_pair("rev", rev);
        }
        match self.call("delete", Method::DELETE, url, None, &[404]).await {
            Ok(_) => Ok(()),
            Err(err) => self.absorb("delete", err),
        }
    }

    async fn find(&self, id: &str) -> ProductResult<Option<Product>> {
        let doc = self.fetch_document(id).await?;
        Ok(doc.as_ref().and_then(to_product))
    }

    async fn find_by_name(&self, name: &str) -> ProductResult<Vec<Product>> {
        self.query("name", json!(name)).await
    }

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        self.query("category", json!(category)).await
    }

    async fn find_by_availability(&self, available: bool) -> ProductResult<Vec<Product>> {
        self.query("available", json!(available)).await
    }

    async fn all(&self) -> ProductResult<Vec<Product>> {
        let docs = self.all_documents().await?;
        Ok(docs.iter().filter_map(to_product).collect())
    }

    async fn remove_all(&self) -> ProductResult<()> {
        let deletions: Vec<Value> = self
            .all_documents()
            .await?
            .iter()
            .map(|doc| json!({ "_id": doc["_id"], "_rev": doc["_rev"], "_deleted": true }))
            .collect();
        if deletions.is_empty() {
            return Ok(());
        }

        self.call(
            "remove all",
            Method::POST,
            self.url(&["_bulk_docs"]),
            Some(json!({ "docs": deletions })),
            &[],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn repo_for(url: &str, attempts: u32) -> CouchDbProductRepository {
        let credentials = CouchDbCredentials {
            url: url.to_string(),
            username: Some("admin".to_string()),
            password: Some("pass".to_string()),
        };
        let retry = RetryPolicy::new(attempts, Duration::from_millis(1), 2.0);
        CouchDbProductRepository::new(&credentials, "test", false, retry).unwrap()
    }

    fn phone() -> Product {
        Product::new("iPhone13", Some("Phone".to_string()), true, 400, None, Some(2))
    }

    fn phone_doc(id: &str) -> Value {
        json!({
            "_id": id,
            "_rev": "1-abc",
            "name": "iPhone13",
            "category": "Phone",
            "available": true,
            "price": 400,
            "description": null,
            "stock": 2,
        })
    }

    #[tokio::test]
    async fn init_db_accepts_existing_database() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(412).set_body_json(json!({"error": "file_exists"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/test/_index"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"result": "exists"})))
            .expect(3)
            .mount(&server)
            .await;

        repo_for(&server.uri(), 1).init_db().await.unwrap();
    }

    #[tokio::test]
    async fn init_db_reports_unreachable_store() {
        let err = repo_for("http://127.0.0.1:1", 2).init_db().await.unwrap_err();
        assert!(matches!(err, ProductError::DatabaseConnection(_)));
    }

    #[tokio::test]
    async fn create_assigns_document_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test"))
            .and(body_partial_json(json!({"name": "iPhone13", "category": "Phone"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"ok": true, "id": "abc", "rev": "1-abc"})),
            )
            .mount(&server)
            .await;

        let mut product = phone();
        repo_for(&server.uri(), 1).create(&mut product).await.unwrap();
        assert_eq!(product.id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn create_gives_up_silently_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let mut product = phone();
        repo_for(&server.uri(), 3).create(&mut product).await.unwrap();
        assert_eq!(product.id, None);
    }

    #[tokio::test]
    async fn create_rejected_by_store_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad_request"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut product = phone();
        let err = repo_for(&server.uri(), 5).create(&mut product).await.unwrap_err();
        assert!(matches!(err, ProductError::Database(_)));
    }

    #[tokio::test]
    async fn find_returns_none_for_missing_document() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/notExist"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not_found"})))
            .mount(&server)
            .await;

        let found = repo_for(&server.uri(), 1).find("notExist").await.unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn find_maps_document_to_product() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(phone_doc("abc")))
            .mount(&server)
            .await;

        let found = repo_for(&server.uri(), 1).find("abc").await.unwrap().unwrap();
        assert_eq!(found.id.as_deref(), Some("abc"));
        assert_eq!(found.name, "iPhone13");
        assert_eq!(found.stock, Some(2));
    }

    #[tokio::test]
    async fn find_surfaces_exhausted_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/abc"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&server)
            .await;

        let err = repo_for(&server.uri(), 2).find("abc").await.unwrap_err();
        assert!(matches!(err, ProductError::ServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn update_writes_with_current_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(phone_doc("abc")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/test/abc"))
            .and(body_partial_json(json!({"_id": "abc", "_rev": "1-abc", "category": "NewCategory"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let mut product = phone();
        product.id = Some("abc".to_string());
        product.category = Some("NewCategory".to_string());
        repo_for(&server.uri(), 1).update(&product).await.unwrap();
    }

    #[tokio::test]
    async fn update_of_vanished_document_is_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut product = phone();
        product.id = Some("gone".to_string());
        repo_for(&server.uri(), 1).update(&product).await.unwrap();
    }

    #[tokio::test]
    async fn delete_passes_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(phone_doc("abc")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/test/abc"))
            .and(query_param("rev", "1-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        repo_for(&server.uri(), 1).delete("abc").await.unwrap();
    }

    #[test_case(""  ; "empty")]
    #[test_case("." ; "dot")]
    #[test_case(".." ; "dot_dot")]
    #[test_case("_design/idx" ; "design_doc")]
    #[test_case("_all_docs" ; "system_endpoint")]
    #[tokio::test]
    async fn reserved_ids_never_reach_the_store(id: &str) {
        let server = MockServer::start().await;
        let repo = repo_for(&server.uri(), 1);

        repo.delete(id).await.unwrap();
        assert_eq!(repo.find(id).await.unwrap(), None);
        let mut product = phone();
        product.id = Some(id.to_string());
        repo.update(&product).await.unwrap();

        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty(), "unexpected requests: {:?}", received);
    }

    #[tokio::test]
    async fn find_by_category_uses_selector() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/test/_find"))
            .and(body_partial_json(json!({"selector": {"category": "Phone"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "docs": [phone_doc("a"), phone_doc("b")],
                "bookmark": "nil",
            })))
            .mount(&server)
            .await;

        let products = repo_for(&server.uri(), 1)
            .find_by_category("Phone")
            .await
            .unwrap();
        assert_eq!(products.len(), 2);
        assert!(products.iter().all(|p| p.category.as_deref() == Some("Phone")));
    }

    #[tokio::test]
    async fn all_skips_design_documents() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/_all_docs"))
            .and(query_param("include_docs", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [
                    {"id": "_design/idx", "doc": {"_id": "_design/idx", "language": "query"}},
                    {"id": "a", "doc": phone_doc("a")},
                ],
            })))
            .mount(&server)
            .await;

        let products = repo_for(&server.uri(), 1).all().await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn remove_all_bulk_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/test/_all_docs"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "rows": [{"id": "a", "doc": phone_doc("a")}],
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/test/_bulk_docs"))
            .and(body_partial_json(json!({"docs": [{"_id": "a", "_rev": "1-abc", "_deleted": true}]})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        repo_for(&server.uri(), 1).remove_all().await.unwrap();
    }

    #[test]
    fn document_precedence_is_category_first() {
        let repo = repo_for("http://localhost:5984", 1);
        assert_eq!(repo.filter_precedence(), CATEGORY_FIRST);
    }
}
