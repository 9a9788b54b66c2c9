use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::{query, query_as, query_scalar, PgConnection, PgPool, Postgres, Transaction};

use super::CatalogStore;
use crate::error::{CatalogError, CatalogResult, Entity};
use crate::ledger::{clamp_u32, StockLevel, StockOp};
use crate::model::{
    BrandId, CategoryId, NewProduct, NewVariant, Product, ProductId, Variant, VariantId, VariantPatch,
};

const PRODUCT_COLUMNS: &str =
    "id, external_id, name, description, material, is_active, category_id, brand_id, image_urls, video_urls";

const VARIANT_COLUMNS: &str = "id, product_id, sku, price, discount, stock, reserved_stock, sizes, colors, \
     barcode, dimensions, image_urls, min_order, is_active";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    external_id: Option<String>,
    name: String,
    description: String,
    material: String,
    is_active: bool,
    category_id: i64,
    brand_id: i64,
    image_urls: Vec<String>,
    video_urls: Vec<String>,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            external_id: r.external_id,
            name: r.name,
            description: r.description,
            material: r.material,
            is_active: r.is_active,
            category_id: r.category_id,
            brand_id: r.brand_id,
            image_urls: r.image_urls,
            video_urls: r.video_urls,
        }
    }
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: i64,
    product_id: i64,
    sku: String,
    price: BigDecimal,
    discount: BigDecimal,
    stock: i64,
    reserved_stock: i64,
    sizes: Vec<i32>,
    colors: Vec<String>,
    barcode: Option<String>,
    dimensions: Option<String>,
    image_urls: Vec<String>,
    min_order: i64,
    is_active: bool,
}

impl From<VariantRow> for Variant {
    fn from(r: VariantRow) -> Self {
        Variant {
            id: r.id,
            product_id: r.product_id,
            sku: r.sku,
            price: r.price,
            discount: r.discount,
            stock: clamp_u32(r.stock),
            reserved_stock: clamp_u32(r.reserved_stock),
            sizes: r.sizes.into_iter().map(|s| clamp_u32(i64::from(s))).collect(),
            colors: r.colors,
            barcode: r.barcode,
            dimensions: r.dimensions,
            image_urls: r.image_urls,
            min_order: clamp_u32(r.min_order).max(1),
            is_active: r.is_active,
        }
    }
}

fn sizes_column(sizes: &[u32]) -> CatalogResult<Vec<i32>> {
    sizes
        .iter()
        .map(|s| i32::try_from(*s).map_err(|_| CatalogError::validation("sizes", format!("{s} exceeds {}", i32::MAX))))
        .collect()
}

/// Translate constraint violations into domain errors; everything else is a store failure.
fn map_write_error(err: sqlx::Error, sku: Option<&str>, external_id: Option<&str>) -> CatalogError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some("products_external_id_key") => {
                    return CatalogError::DuplicateProduct(external_id.unwrap_or_default().to_string());
                }
                _ => {
                    if let Some(sku) = sku {
                        return CatalogError::DuplicateSku(sku.to_string());
                    }
                }
            }
        }
    }
    CatalogError::from(err)
}

pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Postgres-backed store. Each ledger mutation locks the variant row with `FOR UPDATE` inside
/// its own transaction.
///
/// Write transactions carry a server-side `statement_timeout`: a slow statement is cancelled by
/// Postgres and the transaction rolls back, so a write never ends in an unknown state.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, statement_timeout: DEFAULT_STATEMENT_TIMEOUT }
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> CatalogResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET does not take bind parameters; the value is an integer we format ourselves.
        query(&format!("SET LOCAL statement_timeout = {}", self.statement_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn sku_taken(conn: &mut PgConnection, sku: &str) -> CatalogResult<bool> {
        let hit = query_scalar::<_, i64>("SELECT id FROM product_variants WHERE sku = $1")
            .bind(sku)
            .fetch_optional(conn)
            .await?;
        Ok(hit.is_some())
    }

    async fn insert_product_in(conn: &mut PgConnection, product: &NewProduct) -> CatalogResult<Product> {
        if let Some(external_id) = &product.external_id {
            let existing = query_scalar::<_, i64>("SELECT id FROM products WHERE external_id = $1")
                .bind(external_id)
                .fetch_optional(&mut *conn)
                .await?;
            if existing.is_some() {
                return Err(CatalogError::DuplicateProduct(external_id.clone()));
            }
        }
        let row = query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (external_id, name, description, material, is_active, category_id, brand_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product.external_id.as_deref())
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.material)
        .bind(product.is_active)
        .bind(product.category_id)
        .bind(product.brand_id)
        .fetch_one(conn)
        .await
        .map_err(|e| map_write_error(e, None, product.external_id.as_deref()))?;
        Ok(row.into())
    }

    async fn insert_variant_in(
        conn: &mut PgConnection,
        product_id: ProductId,
        v: &NewVariant,
    ) -> CatalogResult<Variant> {
        if Self::sku_taken(&mut *conn, &v.sku).await? {
            return Err(CatalogError::DuplicateSku(v.sku.clone()));
        }
        let row = query_as::<_, VariantRow>(&format!(
            "INSERT INTO product_variants \
             (product_id, sku, price, discount, stock, reserved_stock, sizes, colors, barcode, dimensions, image_urls, min_order, is_active) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $7, $8, $9, $10, $11, $12) RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(product_id)
        .bind(&v.sku)
        .bind(&v.price)
        .bind(&v.discount)
        .bind(i64::from(v.stock))
        .bind(sizes_column(&v.sizes)?)
        .bind(&v.colors)
        .bind(v.barcode.as_deref())
        .bind(v.dimensions.as_deref())
        .bind(&v.image_urls)
        .bind(i64::from(v.min_order))
        .bind(v.is_active)
        .fetch_one(conn)
        .await
        .map_err(|e| map_write_error(e, Some(&v.sku), None))?;
        Ok(row.into())
    }

    async fn lock_variant(conn: &mut PgConnection, id: VariantId) -> CatalogResult<Option<Variant>> {
        let row = query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1 AND deleted_at IS NULL FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(row.map(Variant::from))
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn category_exists(&self, id: CategoryId) -> CatalogResult<bool> {
        let hit = query_scalar::<_, i64>("SELECT id FROM categories WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hit.is_some())
    }

    async fn brand_exists(&self, id: BrandId) -> CatalogResult<bool> {
        let hit = query_scalar::<_, i64>("SELECT id FROM brands WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(hit.is_some())
    }

    async fn insert_product(&self, product: &NewProduct) -> CatalogResult<Product> {
        let mut tx = self.begin().await?;
        let created = Self::insert_product_in(&mut tx, product).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn insert_product_with_variants(
        &self,
        product: &NewProduct,
        variants: &[NewVariant],
    ) -> CatalogResult<(Product, Vec<Variant>)> {
        let mut tx = self.begin().await?;

        // Share-lock the referenced rows so they cannot disappear before commit.
        let category = query_scalar::<_, i64>(
            "SELECT id FROM categories WHERE id = $1 AND deleted_at IS NULL FOR SHARE",
        )
        .bind(product.category_id)
        .fetch_optional(&mut *tx)
        .await?;
        if category.is_none() {
            return Err(CatalogError::not_found(Entity::Category, product.category_id));
        }
        let brand = query_scalar::<_, i64>("SELECT id FROM brands WHERE id = $1 AND deleted_at IS NULL FOR SHARE")
            .bind(product.brand_id)
            .fetch_optional(&mut *tx)
            .await?;
        if brand.is_none() {
            return Err(CatalogError::not_found(Entity::Brand, product.brand_id));
        }

        let created = Self::insert_product_in(&mut tx, product).await?;
        let mut created_variants = Vec::with_capacity(variants.len());
        for v in variants {
            created_variants.push(Self::insert_variant_in(&mut tx, created.id, v).await?);
        }
        tx.commit().await?;
        Ok((created, created_variants))
    }

    async fn get_product(&self, id: ProductId) -> CatalogResult<Option<Product>> {
        let row = query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Product::from))
    }

    async fn set_product_media(
        &self,
        id: ProductId,
        image_urls: &[String],
        video_urls: &[String],
    ) -> CatalogResult<Option<Product>> {
        let mut tx = self.begin().await?;
        let row = query_as::<_, ProductRow>(&format!(
            "UPDATE products SET image_urls = $2, video_urls = $3, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(image_urls)
        .bind(video_urls)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(row.map(Product::from))
    }

    async fn insert_variant(&self, product_id: ProductId, variant: &NewVariant) -> CatalogResult<Variant> {
        let mut tx = self.begin().await?;
        let created = Self::insert_variant_in(&mut tx, product_id, variant).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn get_variant(&self, id: VariantId) -> CatalogResult<Option<Variant>> {
        let row = query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Variant::from))
    }

    async fn get_variant_by_sku(&self, sku: &str) -> CatalogResult<Option<Variant>> {
        let row = query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE sku = $1 AND deleted_at IS NULL"
        ))
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Variant::from))
    }

    async fn variants_by_ids(&self, ids: &[VariantId]) -> CatalogResult<Vec<Variant>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = ANY($1) AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Variant::from).collect())
    }

    async fn variants_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        let rows = query_as::<_, VariantRow>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = $1 AND deleted_at IS NULL ORDER BY id"
        ))
        .bind(product_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Variant::from).collect())
    }

    async fn update_variant(&self, id: VariantId, patch: &VariantPatch) -> CatalogResult<Option<Variant>> {
        let mut tx = self.begin().await?;
        let Some(mut variant) = Self::lock_variant(&mut tx, id).await? else {
            return Ok(None);
        };
        patch.apply_to(&mut variant)?;
        let row = query_as::<_, VariantRow>(&format!(
            "UPDATE product_variants SET price = $2, discount = $3, stock = $4, sizes = $5, colors = $6, \
             barcode = $7, dimensions = $8, image_urls = $9, min_order = $10, is_active = $11, updated_at = NOW() \
             WHERE id = $1 RETURNING {VARIANT_COLUMNS}"
        ))
        .bind(id)
        .bind(&variant.price)
        .bind(&variant.discount)
        .bind(i64::from(variant.stock))
        .bind(sizes_column(&variant.sizes)?)
        .bind(&variant.colors)
        .bind(variant.barcode.as_deref())
        .bind(variant.dimensions.as_deref())
        .bind(&variant.image_urls)
        .bind(i64::from(variant.min_order))
        .bind(variant.is_active)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn soft_delete_variant(&self, id: VariantId) -> CatalogResult<bool> {
        let mut tx = self.begin().await?;
        let result = query(
            "UPDATE product_variants SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn adjust_stock(&self, id: VariantId, op: StockOp) -> CatalogResult<StockLevel> {
        let mut tx = self.begin().await?;
        let current = query_as::<_, (i64, i64)>(
            "SELECT stock, reserved_stock FROM product_variants WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((stock, reserved)) = current else {
            return Err(CatalogError::not_found(Entity::Variant, id));
        };
        let next = StockLevel::from_columns(stock, reserved).apply(id, op)?;
        query("UPDATE product_variants SET stock = $2, reserved_stock = $3, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(i64::from(next.stock))
            .bind(i64::from(next.reserved))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(next)
    }

    async fn stock_level(&self, id: VariantId) -> CatalogResult<Option<StockLevel>> {
        let row = query_as::<_, (i64, i64)>(
            "SELECT stock, reserved_stock FROM product_variants WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(stock, reserved)| StockLevel::from_columns(stock, reserved)))
    }
}
