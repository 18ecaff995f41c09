//! Product 持久化接口
//!
//! 每种存储后端（PostgreSQL、CouchDB、内存）各自实现这个 trait，
//! 启动时根据配置选择其中一个。

use async_trait::async_trait;

use super::model::Product;
use crate::core::error::ProductResult;

/// 列表查询过滤字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    Name,
    Category,
    Availability,
}

/// 关系型后端的过滤优先级
pub const NAME_FIRST: [FilterField; 3] = [
    FilterField::Name,
    FilterField::Category,
    FilterField::Availability,
];

/// 文档型后端的过滤优先级
pub const CATEGORY_FIRST: [FilterField; 3] = [
    FilterField::Category,
    FilterField::Name,
    FilterField::Availability,
];

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// 后端名称，用于日志和健康检查
    fn backend(&self) -> &'static str;

    /// 多个过滤参数同时出现时的取用顺序
    fn filter_precedence(&self) -> [FilterField; 3] {
        NAME_FIRST
    }

    /// 建立连接并确保表 / 数据库存在，可重复调用
    async fn init_db(&self) -> ProductResult<()>;

    /// 写入新记录并回填 id
    async fn create(&self, product: &mut Product) -> ProductResult<()>;

    /// 按 id 覆盖记录；记录已不存在时什么也不做
    async fn update(&self, product: &Product) -> ProductResult<()>;

    /// 删除记录；不存在时不报错
    async fn delete(&self, id: &str) -> ProductResult<()>;

    async fn find(&self, id: &str) -> ProductResult<Option<Product>>;

    async fn find_by_name(&self, name: &str) -> ProductResult<Vec<Product>>;

    async fn find_by_category(&self, category: &str) -> ProductResult<Vec<Product>>;

    async fn find_by_availability(&self, available: bool) -> ProductResult<Vec<Product>>;

    async fn all(&self) -> ProductResult<Vec<Product>>;

    /// 清空所有记录，仅供测试使用
    async fn remove_all(&self) -> ProductResult<()>;
}
