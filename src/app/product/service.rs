//! Product 业务服务

use std::sync::Arc;

use tracing::{error, info};
use validator::Validate;

use super::model::Product;
use super::repository::{FilterField, ProductRepository};
use crate::core::error::{ProductError, ProductResult};

/// 列表查询参数，同一时间只有优先级最高的非空参数生效
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub name: Option<String>,
    pub category: Option<String>,
    pub available: Option<bool>,
}

impl ProductFilter {
    fn field_is_set(&self, field: FilterField) -> bool {
        match field {
            FilterField::Name => self.name.as_deref().is_some_and(|v| !v.is_empty()),
            FilterField::Category => self.category.as_deref().is_some_and(|v| !v.is_empty()),
            FilterField::Availability => self.available.is_some(),
        }
    }
}

#[derive(Clone)]
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
}

impl ProductService {
    pub fn new(repo: Arc<dyn ProductRepository>) -> Self {
        Self { repo }
    }

    pub fn backend(&self) -> &'static str {
        self.repo.backend()
    }

    pub async fn create(&self, mut product: Product) -> ProductResult<Product> {
        if product.name.trim().is_empty() {
            return Err(ProductError::DataValidation(
                "Invalid Product: missing name".to_string(),
            ));
        }
        product.validate()?;
        // id 由存储分配
        product.id = None;
        info!("Creating {}", product);
        self.repo.create(&mut product).await?;

        if product.id.is_none() {
            error!("Store gave up creating {}", product);
            return Err(ProductError::ServiceUnavailable(
                "Product could not be saved, the database is unavailable".to_string(),
            ));
        }
        Ok(product)
    }

    pub async fn update(&self, product: &Product) -> ProductResult<()> {
        if product.id.is_none() {
            return Err(ProductError::DataValidation(
                "Update called with empty ID field".to_string(),
            ));
        }
        info!("Saving {}", product);
        self.repo.update(product).await
    }

    pub async fn delete(&self, id: &str) -> ProductResult<()> {
        info!("Deleting product {}", id);
        self.repo.delete(id).await
    }

    pub async fn find(&self, id: &str) -> ProductResult<Option<Product>> {
        info!("Processing lookup for id {} ...", id);
        self.repo.find(id).await
    }

    pub async fn find_or_404(&self, id: &str) -> ProductResult<Product> {
        self.find(id).await?.ok_or_else(|| {
            ProductError::NotFound(format!("Product with id '{}' was not found.", id))
        })
    }

    /// 按后端的优先级选出第一个非空过滤条件，否则返回全部
    pub async fn list(&self, filter: &ProductFilter) -> ProductResult<Vec<Product>> {
        let field = self
            .repo
            .filter_precedence()
            .into_iter()
            .find(|field| filter.field_is_set(*field));

        match (field, filter) {
            (Some(FilterField::Name), ProductFilter { name: Some(name), .. }) => {
                info!("Processing name query for {} ...", name);
                self.repo.find_by_name(name).await
            }
            (Some(FilterField::Category), ProductFilter { category: Some(category), .. }) => {
                info!("Processing category query for {} ...", category);
                self.repo.find_by_category(category).await
            }
            (Some(FilterField::Availability), ProductFilter { available: Some(available), .. }) => {
                info!("Processing available query for {} ...", available);
                self.repo.find_by_availability(*available).await
            }
            _ => {
                info!("Processing all Products");
                self.repo.all().await
            }
        }
    }

    /// 购买：available 只能从 true 变为 false
    pub async fn purchase(&self, id: &str) -> ProductResult<Product> {
        let mut product = self.find_or_404(id).await?;
        product.purchase()?;
        self.update(&product).await?;
        Ok(product)
    }
}
