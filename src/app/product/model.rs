//! Product 数据模型
//!
//! 字段：
//! - `id`：由存储分配，创建前为空
//! - `name`：必填
//! - `description` / `category`：可选文本
//! - `price`：整数价格，默认 100
//! - `available`：是否可购买，默认 true
//! - `stock`：可选库存

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use validator::Validate;

use crate::core::error::{ProductError, ProductResult};

pub const DEFAULT_PRICE: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Validate)]
pub struct Product {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[validate(length(min = 1, max = 63, message = "Invalid Product: name must be 1 to 63 characters"))]
    pub name: String,
    #[validate(length(max = 250, message = "Invalid Product: description must be at most 250 characters"))]
    pub description: Option<String>,
    pub price: i64,
    #[validate(length(max = 63, message = "Invalid Product: category must be at most 63 characters"))]
    pub category: Option<String>,
    pub available: bool,
    pub stock: Option<i64>,
}

impl Default for Product {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            description: None,
            price: DEFAULT_PRICE,
            category: None,
            available: true,
            stock: None,
        }
    }
}

impl Product {
    pub fn new(
        name: impl Into<String>,
        category: Option<String>,
        available: bool,
        price: i64,
        description: Option<String>,
        stock: Option<i64>,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            description,
            price,
            category,
            available,
            stock,
        }
    }

    /// 从 JSON 对象构造一个新的 Product
    pub fn from_value(data: &Value) -> ProductResult<Self> {
        let mut product = Product::default();
        product.deserialize(data)?;
        Ok(product)
    }

    /// 序列化为 JSON 对象，未分配 id 时不输出 id
    pub fn serialize(&self) -> Value {
        // 所有字段都是基础类型，序列化不会失败
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// 用 JSON 对象中的字段覆盖当前实体
    ///
    /// 缺失的可选字段保持原值；`id` 只在实体还没有 id 时被采用。
    pub fn deserialize(&mut self, data: &Value) -> ProductResult<&mut Self> {
        let map = data.as_object().ok_or_else(|| {
            ProductError::DataValidation(
                "Invalid Product: body of request contained bad or no data".to_string(),
            )
        })?;

        let name = match map.get("name") {
            None => {
                return Err(ProductError::DataValidation(
                    "Invalid Product: missing name".to_string(),
                ))
            }
            Some(Value::String(name)) => name.clone(),
            Some(other) => return Err(type_error("string", "name", other)),
        };

        let description = optional_text(map, "description")?;
        let category = optional_text(map, "category")?;
        let price = optional_integer(map, "price", false)?;
        let stock = optional_integer(map, "stock", true)?;
        let available = match map.get("available") {
            None => None,
            Some(Value::Bool(flag)) => Some(*flag),
            Some(other) => return Err(type_error("boolean", "available", other)),
        };

        self.name = name;
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(category) = category {
            self.category = category;
        }
        if let Some(Some(price)) = price {
            self.price = price;
        }
        if let Some(stock) = stock {
            self.stock = stock;
        }
        if let Some(available) = available {
            self.available = available;
        }
        if self.id.is_none() {
            self.id = stored_id(map);
        }

        self.validate()?;
        Ok(self)
    }

    /// available -> unavailable，已售出时返回 Conflict
    pub fn purchase(&mut self) -> ProductResult<()> {
        if !self.available {
            return Err(ProductError::Conflict(format!(
                "Product with id '{}' is not available.",
                self.id.as_deref().unwrap_or("None")
            )));
        }
        self.available = false;
        Ok(())
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Product {} id=[{}]>",
            self.name,
            self.id.as_deref().unwrap_or("None")
        )
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(expected: &str, field: &str, actual: &Value) -> ProductError {
    ProductError::DataValidation(format!(
        "Invalid type for {} [{}]: {}",
        expected,
        field,
        json_type(actual)
    ))
}

/// `Some(None)` 表示显式传入了 null
fn optional_text(map: &Map<String, Value>, field: &str) -> ProductResult<Option<Option<String>>> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::Null) => Ok(Some(None)),
        Some(Value::String(text)) => Ok(Some(Some(text.clone()))),
        Some(other) => Err(type_error("string", field, other)),
    }
}

fn optional_integer(
    map: &Map<String, Value>,
    field: &str,
    nullable: bool,
) -> ProductResult<Option<Option<i64>>> {
    match map.get(field) {
        None => Ok(None),
        Some(Value::Null) if nullable => Ok(Some(None)),
        Some(value) => match value.as_i64() {
            Some(n) => Ok(Some(Some(n))),
            None => Err(type_error("integer", field, value)),
        },
    }
}

fn stored_id(map: &Map<String, Value>) -> Option<String> {
    ["id", "_id"].iter().find_map(|key| match map.get(*key) {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}
