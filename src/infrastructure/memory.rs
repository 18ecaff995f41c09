//! 内存存储，用于测试和本地开发

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::app::product::model::Product;
use crate::app::product::repository::ProductRepository;
use crate::core::error::ProductResult;

#[derive(Debug, Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<String, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn filter<F>(&self, predicate: F) -> Vec<Product>
    where
        F: Fn(&Product) -> bool,
    {
        self.products
            .read()
            .await
            .values()
            .filter(|product| predicate(product))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn init_db(&self) -> ProductResult<()> {
        info!("Initializing in-memory product store");
        Ok(())
    }

    async fn create(&self, product: &mut Product) -> ProductResult<()> {
        let id = Uuid::new_v4().to_string();
        product.id = Some(id.clone());
        self.products.write().await.insert(id, product.clone());
        Ok(())
    }

    async fn update(&self, product: &Product) -> ProductResult<()> {
        let Some(id) = product.id.as_deref() else {
            return Ok(());
        };
        if let Some(stored) = self.products.write().await.get_mut(id) {
            *stored = product.clone();
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> ProductResult<()> {
        self.products.write().await.remove(id);
        Ok(())
    }

    async fn find(&self, id: &str) -> ProductResult<Option<Product>> {
        Ok(self.products.read().await.get(id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> ProductResult<Vec<Product>> {
        Ok(self.filter(|p| p.name == name).await)
    }

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>> {
        Ok(self
            .filter(|p| p.category.as_deref() == Some(category))
            .await)
    }

    async fn find_by_availability(&self, available: bool) -> ProductResult<Vec<Product>> {
        Ok(self.filter(|p| p.available == available).await)
    }

    async fn all(&self) -> ProductResult<Vec<Product>> {
        Ok(self.filter(|_| true).await)
    }

    async fn remove_all(&self) -> ProductResult<()> {
        self.products.write().await.clear();
        Ok(())
    }
}
