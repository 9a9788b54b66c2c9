use std::fmt;
use std::time::Duration;

use common_http_errors::ApiError;
use common_money::MoneyError;
use thiserror::Error;

use crate::model::{ProductId, VariantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Product,
    Variant,
    Category,
    Brand,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Entity::Product => "product",
            Entity::Variant => "variant",
            Entity::Category => "category",
            Entity::Brand => "brand",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("malformed event: {0}")]
    MalformedEvent(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },
    #[error("variant with SKU {0} already exists")]
    DuplicateSku(String),
    #[error("product with external id {0} already exists")]
    DuplicateProduct(String),
    #[error("insufficient stock for variant {variant_id}: requested {requested}, available {available}")]
    InsufficientStock { variant_id: VariantId, requested: u32, available: u32 },
    #[error("cannot release {requested} units of variant {variant_id}: only {reserved} reserved")]
    ExcessRelease { variant_id: VariantId, requested: u32, reserved: u32 },
    #[error("stock {requested} for variant {variant_id} is below reserved stock {reserved}")]
    StockBelowReserved { variant_id: VariantId, requested: u32, reserved: u32 },
    #[error("quantity must be greater than zero")]
    InvalidQuantity,
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("product {0} is inactive")]
    ProductInactive(ProductId),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Transient(String),
    #[error("failed to publish downstream event: {0}")]
    PublishFailed(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

impl CatalogError {
    pub fn not_found(entity: Entity, id: i64) -> Self {
        CatalogError::NotFound { entity, id }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        CatalogError::Validation { field, reason: reason.into() }
    }

    /// Stable snake_case code used for logs, metric labels and the HTTP `X-Error-Code` header.
    pub fn kind(&self) -> &'static str {
        match self {
            CatalogError::MalformedEvent(_) => "malformed_event",
            CatalogError::UnknownAction(_) => "unknown_action",
            CatalogError::NotFound { entity, .. } => match entity {
                Entity::Product => "product_not_found",
                Entity::Variant => "variant_not_found",
                Entity::Category => "category_not_found",
                Entity::Brand => "brand_not_found",
            },
            CatalogError::DuplicateSku(_) => "duplicate_sku",
            CatalogError::DuplicateProduct(_) => "duplicate_product",
            CatalogError::InsufficientStock { .. } => "insufficient_stock",
            CatalogError::ExcessRelease { .. } => "excess_release",
            CatalogError::StockBelowReserved { .. } => "stock_below_reserved",
            CatalogError::InvalidQuantity => "invalid_quantity",
            CatalogError::Validation { .. } => "validation_failed",
            CatalogError::ProductInactive(_) => "product_inactive",
            CatalogError::Timeout(_) => "timeout",
            CatalogError::Transient(_) => "store_unavailable",
            CatalogError::PublishFailed(_) => "publish_failed",
        }
    }

    /// Safe to retry the same call unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Transient(_) | CatalogError::Timeout(_))
    }

    /// Ledger rejections: the request was well-formed but current stock does not allow it.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CatalogError::InsufficientStock { .. }
                | CatalogError::ExcessRelease { .. }
                | CatalogError::StockBelowReserved { .. }
        )
    }
}

/// SQLSTATE 57014: the server cancelled the statement (`statement_timeout`).
const QUERY_CANCELED: &str = "57014";

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                // Class 22 is a data exception, class 23 an integrity violation: the same row
                // will fail the same way on every retry.
                if code.starts_with("22") || code.starts_with("23") {
                    let target = db_err.constraint().unwrap_or("row");
                    return CatalogError::validation("record", format!("{target}: {} ({code})", db_err.message()));
                }
                if code == QUERY_CANCELED {
                    return CatalogError::Transient(format!("statement timeout: {}", db_err.message()));
                }
            }
        }
        CatalogError::Transient(err.to_string())
    }
}

impl From<MoneyError> for CatalogError {
    fn from(err: MoneyError) -> Self {
        match err {
            MoneyError::Negative { field, value } => {
                CatalogError::validation(field, format!("must not be negative (got {value})"))
            }
            MoneyError::OutOfRange { field, value } => {
                CatalogError::validation(field, format!("must be below 100000000 (got {value})"))
            }
        }
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        let code = err.kind();
        match err {
            CatalogError::NotFound { .. } => ApiError::NotFound { code, trace_id: None },
            CatalogError::InsufficientStock { .. }
            | CatalogError::ExcessRelease { .. }
            | CatalogError::StockBelowReserved { .. }
            | CatalogError::DuplicateSku(_)
            | CatalogError::DuplicateProduct(_)
            | CatalogError::ProductInactive(_) => ApiError::conflict(code, err.to_string()),
            CatalogError::MalformedEvent(_)
            | CatalogError::UnknownAction(_)
            | CatalogError::InvalidQuantity
            | CatalogError::Validation { .. } => ApiError::BadRequest {
                code,
                trace_id: None,
                message: Some(err.to_string()),
            },
            CatalogError::Timeout(_) | CatalogError::Transient(_) => ApiError::Unavailable {
                code,
                trace_id: None,
                message: Some(err.to_string()),
            },
            CatalogError::PublishFailed(_) => ApiError::internal(err, None),
        }
    }
}
