//! 数据库基础设施（PostgreSQL）

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    FromRow,
};
use std::time::Duration;
use tracing::info;

use crate::app::product::model::Product;
use crate::app::product::repository::ProductRepository;
use crate::core::error::{ProductError, ProductResult};

pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    /// 建立连接池，连接失败视为启动错误
    pub async fn new(database_url: &str) -> ProductResult<Self> {
        info!(
            "Connecting to database: {}",
            redact_password(database_url)
        );
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|err| ProductError::DatabaseConnection(err.to_string()))?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}

/// 隐藏连接串中的密码
fn redact_password(database_url: &str) -> String {
    match (database_url.find("://"), database_url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            let credentials = &database_url[scheme_end + 3..at];
            match credentials.find(':') {
                Some(colon) => format!(
                    "{}{}:***{}",
                    &database_url[..scheme_end + 3],
                    &credentials[..colon],
                    &database_url[at..]
                ),
                None => database_url.to_string(),
            }
        }
        _ => database_url.to_string(),
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    description: Option<String>,
    price: i64,
    category: Option<String>,
    available: bool,
    stock: Option<i64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: Some(row.id.to_string()),
            name: row.name,
            description: row.description,
            price: row.price,
            category: row.category,
            available: row.available,
            stock: row.stock,
        }
    }
}

/// 关系型 id 是整数，无法解析的 id 当作不存在
fn parse_id(id: &str) -> Option<i32> {
    id.trim().parse().ok()
}

const SELECT_COLUMNS: &str =
    "SELECT id, name, description, price, category, available, stock FROM products";

pub struct PgProductRepository {
    db: DatabaseManager,
}

impl PgProductRepository {
    pub fn new(db: DatabaseManager) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str) -> ProductResult<Self> {
        Ok(Self::new(DatabaseManager::new(database_url).await?))
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn init_db(&self) -> ProductResult<()> {
        info!("Initializing database");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS products (
                id SERIAL PRIMARY KEY,
                name VARCHAR(63) NOT NULL,
                description VARCHAR(250),
                price BIGINT NOT NULL DEFAULT 100,
                category VARCHAR(63),
                available BOOLEAN NOT NULL DEFAULT TRUE,
                stock BIGINT
            )
            "#,
        )
        .execute(self.db.get_pool())
        .await
        .map_err(|err| ProductError::DatabaseConnection(err.to_string()))?;

        for column in ["name", "category", "available"] {
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_products_{0} ON products ({0})",
                column
            ))
            .execute(self.db.get_pool())
            .await
            .map_err(|err| ProductError::DatabaseConnection(err.to_string()))?;
        }
        Ok(())
    }

    async fn create(&self, product: &mut Product) -> ProductResult<()> {
        let (id,): (i32,) = sqlx::query_as(
            "INSERT INTO products (name, description, price, category, available, stock) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(product.available)
        .bind(product.stock)
        .fetch_one(self.db.get_pool())
        .await?;

        product.id = Some(id.to_string());
        Ok(())
    }

    async fn update(&self, product: &Product) -> ProductResult<()> {
        let Some(id) = product.id.as_deref().and_then(parse_id) else {
            return Ok(());
        };
        sqlx::query(
            "UPDATE products SET name = $1, description = $2, price = $3, category = $4, \
             available = $5, stock = $6 WHERE id = $7",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(&product.category)
        .bind(product.available)
        .bind(product.stock)
        .bind(id)
        .execute(self.db.get_pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> ProductResult<()> {
        if let Some(id) = parse_id(id) {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(self.db.get_pool())
                .await?;
        }
        Ok(())
    }

    async fn find(&self, id: &str) -> ProductResult<Option<Product>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, ProductRow>(&format!("{} WHERE id = $1", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(self.db.get_pool())
            .await?;
        Ok(row.map(Product::from))
    }

    async fn find_by_name(&self, name: &str) -> ProductResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{} WHERE name = $1", SELECT_COLUMNS))
            .bind(name)
            .fetch_all(self.db.get_pool())
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        let rows =
            sqlx::query_as::<_, ProductRow>(&format!("{} WHERE category = $1", SELECT_COLUMNS))
                .bind(category)
                .fetch_all(self.db.get_pool())
                .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn find_by_availability(&self, available: bool) -> ProductResult<Vec<Product>> {
        let rows =
            sqlx::query_as::<_, ProductRow>(&format!("{} WHERE available = $1", SELECT_COLUMNS))
                .bind(available)
                .fetch_all(self.db.get_pool())
                .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn all(&self) -> ProductResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!("{} ORDER BY id", SELECT_COLUMNS))
            .fetch_all(self.db.get_pool())
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn remove_all(&self) -> ProductResult<()> {
        sqlx::query("DELETE FROM products")
            .execute(self.db.get_pool())
            .await?;
        Ok(())
    }
}
