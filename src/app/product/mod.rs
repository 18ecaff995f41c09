//! Product 资源：模型、持久化接口、业务服务与处理器

pub mod handler;
pub mod model;
pub mod repository;
pub mod service;

pub use model::Product;
pub use repository::ProductRepository;
pub use service::{ProductFilter, ProductService};
