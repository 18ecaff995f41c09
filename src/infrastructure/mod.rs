//! 基础设施层：存储后端与日志

pub mod couchdb;
#[cfg(feature = "database")]
pub mod database;
pub mod logger;
pub mod memory;

use std::sync::Arc;

use tracing::info;

use crate::app::product::repository::ProductRepository;
use crate::config::{Backend, Config};
use crate::core::error::ProductResult;

/// 按配置创建存储后端并完成初始化（建表 / 建库、建索引）
///
/// 任何失败都视为启动失败，由调用方决定退出。
pub async fn connect(config: &Config) -> ProductResult<Arc<dyn ProductRepository>> {
    let repo: Arc<dyn ProductRepository> = match config.backend {
        #[cfg(feature = "database")]
        Backend::Postgres => {
            Arc::new(database::PgProductRepository::connect(&config.database_uri).await?)
        }
        #[cfg(not(feature = "database"))]
        Backend::Postgres => {
            return Err(crate::core::error::ProductError::DatabaseConnection(
                "built without the `database` feature".to_string(),
            ))
        }
        Backend::CouchDb => Arc::new(couchdb::CouchDbProductRepository::new(
            &config.couchdb,
            &config.database_name,
            config.admin_party,
            config.retry.clone(),
        )?),
        Backend::Memory => Arc::new(memory::InMemoryProductRepository::new()),
    };

    repo.init_db().await?;
    info!("Connected to {} backend", repo.backend());
    Ok(repo)
}
