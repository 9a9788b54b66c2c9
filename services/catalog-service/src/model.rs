use bigdecimal::BigDecimal;
use common_money::checked_amount;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::ledger::StockLevel;

pub type ProductId = i64;
pub type VariantId = i64;
pub type CategoryId = i64;
pub type BrandId = i64;

pub const MAX_SKU_LEN: usize = 100;
pub const MAX_NAME_LEN: usize = 255;
pub const MAX_MATERIAL_LEN: usize = 200;
pub const MAX_CODE_LEN: usize = 50;

fn check_len(field: &'static str, value: &str, max: usize) -> CatalogResult<()> {
    if value.chars().count() > max {
        return Err(CatalogError::validation(field, format!("longer than {max} characters")));
    }
    Ok(())
}

/// Sizes are stored as INTEGER[].
fn check_sizes(sizes: &[u32]) -> CatalogResult<()> {
    match sizes.iter().find(|s| i32::try_from(**s).is_err()) {
        Some(size) => Err(CatalogError::validation("sizes", format!("{size} exceeds {}", i32::MAX))),
        None => Ok(()),
    }
}

fn check_optional_codes(barcode: Option<&str>, dimensions: Option<&str>) -> CatalogResult<()> {
    if let Some(barcode) = barcode {
        check_len("barcode", barcode, MAX_CODE_LEN)?;
    }
    if let Some(dimensions) = dimensions {
        check_len("dimensions", dimensions, MAX_CODE_LEN)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Product {
    pub id: ProductId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    pub description: String,
    pub material: String,
    pub is_active: bool,
    pub category_id: CategoryId,
    pub brand_id: BrandId,
    pub image_urls: Vec<String>,
    pub video_urls: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub external_id: Option<String>,
    pub name: String,
    pub description: String,
    pub material: String,
    pub is_active: bool,
    pub category_id: CategoryId,
    pub brand_id: BrandId,
}

impl NewProduct {
    pub fn validate(&self) -> CatalogResult<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::validation("name", "must not be empty"));
        }
        check_len("name", &self.name, MAX_NAME_LEN)?;
        check_len("material", &self.material, MAX_MATERIAL_LEN)?;
        if let Some(external_id) = &self.external_id {
            if external_id.trim().is_empty() {
                return Err(CatalogError::validation("external_id", "must not be blank when present"));
            }
            check_len("external_id", external_id, MAX_NAME_LEN)?;
        }
        Ok(())
    }
}

/// One purchasable SKU. `stock >= reserved_stock` holds for every value read from a store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Variant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub price: BigDecimal,
    pub discount: BigDecimal,
    pub stock: u32,
    pub reserved_stock: u32,
    pub sizes: Vec<u32>,
    pub colors: Vec<String>,
    pub barcode: Option<String>,
    pub dimensions: Option<String>,
    pub image_urls: Vec<String>,
    pub min_order: u32,
    pub is_active: bool,
}

impl Variant {
    pub fn stock_level(&self) -> StockLevel {
        StockLevel { stock: self.stock, reserved: self.reserved_stock }
    }

    pub fn available(&self) -> u32 {
        self.stock_level().available()
    }
}

#[derive(Debug, Clone)]
pub struct NewVariant {
    pub sku: String,
    pub price: BigDecimal,
    pub discount: BigDecimal,
    pub stock: u32,
    pub sizes: Vec<u32>,
    pub colors: Vec<String>,
    pub barcode: Option<String>,
    pub dimensions: Option<String>,
    pub image_urls: Vec<String>,
    pub min_order: u32,
    pub is_active: bool,
}

impl NewVariant {
    /// Trim the SKU, check bounds and normalize amounts to cents.
    pub fn normalized(mut self) -> CatalogResult<Self> {
        self.sku = self.sku.trim().to_string();
        if self.sku.is_empty() {
            return Err(CatalogError::validation("sku", "must not be empty"));
        }
        check_len("sku", &self.sku, MAX_SKU_LEN)?;
        if self.min_order == 0 {
            return Err(CatalogError::validation("min_order", "must be at least 1"));
        }
        check_sizes(&self.sizes)?;
        check_optional_codes(self.barcode.as_deref(), self.dimensions.as_deref())?;
        self.price = checked_amount("price", &self.price)?;
        self.discount = checked_amount("discount", &self.discount)?;
        Ok(self)
    }
}

/// Generic field update. SKU and reserved stock are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantPatch {
    pub price: Option<BigDecimal>,
    pub discount: Option<BigDecimal>,
    pub stock: Option<u32>,
    pub sizes: Option<Vec<u32>>,
    pub colors: Option<Vec<String>>,
    pub barcode: Option<String>,
    pub dimensions: Option<String>,
    pub image_urls: Option<Vec<String>>,
    pub min_order: Option<u32>,
    pub is_active: Option<bool>,
}

impl VariantPatch {
    pub fn normalized(mut self) -> CatalogResult<Self> {
        if let Some(price) = self.price.take() {
            self.price = Some(checked_amount("price", &price)?);
        }
        if let Some(discount) = self.discount.take() {
            self.discount = Some(checked_amount("discount", &discount)?);
        }
        if self.min_order == Some(0) {
            return Err(CatalogError::validation("min_order", "must be at least 1"));
        }
        if let Some(sizes) = &self.sizes {
            check_sizes(sizes)?;
        }
        check_optional_codes(self.barcode.as_deref(), self.dimensions.as_deref())?;
        Ok(self)
    }

    /// Apply the patch to a loaded row. Stock changes go through the ledger check.
    pub fn apply_to(&self, variant: &mut Variant) -> CatalogResult<()> {
        if let Some(stock) = self.stock {
            let level = variant.stock_level().apply(variant.id, crate::ledger::StockOp::SetStock(stock))?;
            variant.stock = level.stock;
        }
        if let Some(price) = &self.price {
            variant.price = price.clone();
        }
        if let Some(discount) = &self.discount {
            variant.discount = discount.clone();
        }
        if let Some(sizes) = &self.sizes {
            variant.sizes = sizes.clone();
        }
        if let Some(colors) = &self.colors {
            variant.colors = colors.clone();
        }
        if let Some(barcode) = &self.barcode {
            variant.barcode = Some(barcode.clone());
        }
        if let Some(dimensions) = &self.dimensions {
            variant.dimensions = Some(dimensions.clone());
        }
        if let Some(images) = &self.image_urls {
            variant.image_urls = images.clone();
        }
        if let Some(min_order) = self.min_order {
            variant.min_order = min_order;
        }
        if let Some(active) = self.is_active {
            variant.is_active = active;
        }
        Ok(())
    }
}

/// Existence + active check answered to other services.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct VariantCheck {
    pub exists: bool,
    pub is_active: bool,
}
