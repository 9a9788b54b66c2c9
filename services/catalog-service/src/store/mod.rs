//! Persistence boundary for products, variants and their category/brand references.

use async_trait::async_trait;

use crate::error::CatalogResult;
use crate::ledger::{StockLevel, StockOp};
use crate::model::{
    BrandId, CategoryId, NewProduct, NewVariant, Product, ProductId, Variant, VariantId, VariantPatch,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryCatalogStore;
pub use postgres::PgCatalogStore;

/// Every method is one unit of work: implementations either commit all of its writes or none.
/// Soft-deleted rows are invisible to reads but still hold their SKU.
///
/// Callers do not cancel write methods. Each implementation bounds its own writes and reports a
/// timeout only when nothing was committed.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn category_exists(&self, id: CategoryId) -> CatalogResult<bool>;

    async fn brand_exists(&self, id: BrandId) -> CatalogResult<bool>;

    /// Insert a product alone. Fails with `DuplicateProduct` when `external_id` is already used.
    async fn insert_product(&self, product: &NewProduct) -> CatalogResult<Product>;

    /// Product and its variants in a single transaction, including the category/brand
    /// precondition and SKU checks. Nothing is written on any error.
    async fn insert_product_with_variants(
        &self,
        product: &NewProduct,
        variants: &[NewVariant],
    ) -> CatalogResult<(Product, Vec<Variant>)>;

    async fn get_product(&self, id: ProductId) -> CatalogResult<Option<Product>>;

    /// Overwrite image/video URL lists. `None` when the product does not exist.
    async fn set_product_media(
        &self,
        id: ProductId,
        image_urls: &[String],
        video_urls: &[String],
    ) -> CatalogResult<Option<Product>>;

    /// Fails with `DuplicateSku` when the SKU is taken, including by a soft-deleted row.
    async fn insert_variant(&self, product_id: ProductId, variant: &NewVariant) -> CatalogResult<Variant>;

    async fn get_variant(&self, id: VariantId) -> CatalogResult<Option<Variant>>;

    async fn get_variant_by_sku(&self, sku: &str) -> CatalogResult<Option<Variant>>;

    /// Missing and soft-deleted IDs are skipped; order follows ascending ID.
    async fn variants_by_ids(&self, ids: &[VariantId]) -> CatalogResult<Vec<Variant>>;

    async fn variants_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Variant>>;

    /// Lock the row, apply the patch and write it back.
    async fn update_variant(&self, id: VariantId, patch: &VariantPatch) -> CatalogResult<Option<Variant>>;

    /// Returns false when there was no live row to delete.
    async fn soft_delete_variant(&self, id: VariantId) -> CatalogResult<bool>;

    /// Read-check-write of the stock columns under the variant's row lock.
    async fn adjust_stock(&self, id: VariantId, op: StockOp) -> CatalogResult<StockLevel>;

    /// Both columns from one read.
    async fn stock_level(&self, id: VariantId) -> CatalogResult<Option<StockLevel>>;
}
