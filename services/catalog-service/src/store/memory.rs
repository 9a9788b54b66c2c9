use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::CatalogStore;
use crate::error::{CatalogError, CatalogResult, Entity};
use crate::ledger::{StockLevel, StockOp};
use crate::model::{
    BrandId, CategoryId, NewProduct, NewVariant, Product, ProductId, Variant, VariantId, VariantPatch,
};

struct VariantSlot {
    variant: Variant,
    deleted: bool,
}

#[derive(Default)]
struct Tables {
    next_category_id: i64,
    next_brand_id: i64,
    next_product_id: i64,
    next_variant_id: i64,
    categories: HashSet<CategoryId>,
    brands: HashSet<BrandId>,
    products: BTreeMap<ProductId, Product>,
    variants: BTreeMap<VariantId, VariantSlot>,
    failing_writes: u32,
    latency: Duration,
    statement_timeout: Option<Duration>,
}

impl Tables {
    fn take_fault(&mut self) -> CatalogResult<()> {
        if self.failing_writes > 0 {
            self.failing_writes -= 1;
            return Err(CatalogError::Transient("injected write failure".into()));
        }
        Ok(())
    }

    fn sku_taken(&self, sku: &str) -> bool {
        self.variants.values().any(|slot| slot.variant.sku == sku)
    }

    fn check_external_id(&self, product: &NewProduct) -> CatalogResult<()> {
        if let Some(external_id) = &product.external_id {
            if self.products.values().any(|p| p.external_id.as_ref() == Some(external_id)) {
                return Err(CatalogError::DuplicateProduct(external_id.clone()));
            }
        }
        Ok(())
    }

    fn push_product(&mut self, product: &NewProduct) -> Product {
        self.next_product_id += 1;
        let created = Product {
            id: self.next_product_id,
            external_id: product.external_id.clone(),
            name: product.name.clone(),
            description: product.description.clone(),
            material: product.material.clone(),
            is_active: product.is_active,
            category_id: product.category_id,
            brand_id: product.brand_id,
            image_urls: Vec::new(),
            video_urls: Vec::new(),
        };
        self.products.insert(created.id, created.clone());
        created
    }

    fn push_variant(&mut self, product_id: ProductId, v: &NewVariant) -> Variant {
        self.next_variant_id += 1;
        let created = Variant {
            id: self.next_variant_id,
            product_id,
            sku: v.sku.clone(),
            price: v.price.clone(),
            discount: v.discount.clone(),
            stock: v.stock,
            reserved_stock: 0,
            sizes: v.sizes.clone(),
            colors: v.colors.clone(),
            barcode: v.barcode.clone(),
            dimensions: v.dimensions.clone(),
            image_urls: v.image_urls.clone(),
            min_order: v.min_order,
            is_active: v.is_active,
        };
        self.variants.insert(created.id, VariantSlot { variant: created.clone(), deleted: false });
        created
    }

    fn live_variant_mut(&mut self, id: VariantId) -> Option<&mut Variant> {
        self.variants.get_mut(&id).filter(|slot| !slot.deleted).map(|slot| &mut slot.variant)
    }
}

/// Process-local store for tests and embedding.
/// A single mutex serializes every operation, which gives the same guarantees as the row locks
/// in [`super::PgCatalogStore`].
#[derive(Default)]
pub struct InMemoryCatalogStore {
    tables: Mutex<Tables>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_category(&self) -> CategoryId {
        let mut t = self.lock().await;
        t.next_category_id += 1;
        let id = t.next_category_id;
        t.categories.insert(id);
        id
    }

    pub async fn add_brand(&self) -> BrandId {
        let mut t = self.lock().await;
        t.next_brand_id += 1;
        let id = t.next_brand_id;
        t.brands.insert(id);
        id
    }

    /// Make the next `n` write operations fail with a transient error.
    pub async fn fail_next_writes(&self, n: u32) {
        self.tables.lock().await.failing_writes = n;
    }

    /// Every later operation holds the lock for at least `latency`, like a slow database.
    pub async fn set_latency(&self, latency: Duration) {
        self.tables.lock().await.latency = latency;
    }

    /// Writes slower than this fail with `Timeout` before touching any table, like a
    /// server-side `statement_timeout`.
    pub async fn set_statement_timeout(&self, timeout: Option<Duration>) {
        self.tables.lock().await.statement_timeout = timeout;
    }

    async fn lock_for_write(&self) -> CatalogResult<MutexGuard<'_, Tables>> {
        let guard = self.tables.lock().await;
        match guard.statement_timeout {
            Some(limit) if guard.latency > limit => {
                tokio::time::sleep(limit).await;
                Err(CatalogError::Timeout(limit))
            }
            _ => {
                if !guard.latency.is_zero() {
                    tokio::time::sleep(guard.latency).await;
                }
                Ok(guard)
            }
        }
    }

    async fn lock(&self) -> MutexGuard<'_, Tables> {
        let guard = self.tables.lock().await;
        if !guard.latency.is_zero() {
            tokio::time::sleep(guard.latency).await;
        }
        guard
    }

    pub async fn product_count(&self) -> usize {
        self.lock().await.products.len()
    }

    pub async fn variant_count(&self) -> usize {
        self.lock().await.variants.values().filter(|s| !s.deleted).count()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn category_exists(&self, id: CategoryId) -> CatalogResult<bool> {
        Ok(self.lock().await.categories.contains(&id))
    }

    async fn brand_exists(&self, id: BrandId) -> CatalogResult<bool> {
        Ok(self.lock().await.brands.contains(&id))
    }

    async fn insert_product(&self, product: &NewProduct) -> CatalogResult<Product> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        t.check_external_id(product)?;
        Ok(t.push_product(product))
    }

    async fn insert_product_with_variants(
        &self,
        product: &NewProduct,
        variants: &[NewVariant],
    ) -> CatalogResult<(Product, Vec<Variant>)> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        if !t.categories.contains(&product.category_id) {
            return Err(CatalogError::not_found(Entity::Category, product.category_id));
        }
        if !t.brands.contains(&product.brand_id) {
            return Err(CatalogError::not_found(Entity::Brand, product.brand_id));
        }
        t.check_external_id(product)?;
        let mut seen = HashSet::new();
        for v in variants {
            if t.sku_taken(&v.sku) || !seen.insert(v.sku.as_str()) {
                return Err(CatalogError::DuplicateSku(v.sku.clone()));
            }
        }
        // All checks passed, nothing below can fail.
        let created = t.push_product(product);
        let created_variants: Vec<Variant> = variants.iter().map(|v| t.push_variant(created.id, v)).collect();
        Ok((created, created_variants))
    }

    async fn get_product(&self, id: ProductId) -> CatalogResult<Option<Product>> {
        Ok(self.lock().await.products.get(&id).cloned())
    }

    async fn set_product_media(
        &self,
        id: ProductId,
        image_urls: &[String],
        video_urls: &[String],
    ) -> CatalogResult<Option<Product>> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        Ok(t.products.get_mut(&id).map(|p| {
            p.image_urls = image_urls.to_vec();
            p.video_urls = video_urls.to_vec();
            p.clone()
        }))
    }

    async fn insert_variant(&self, product_id: ProductId, variant: &NewVariant) -> CatalogResult<Variant> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        if t.sku_taken(&variant.sku) {
            return Err(CatalogError::DuplicateSku(variant.sku.clone()));
        }
        Ok(t.push_variant(product_id, variant))
    }

    async fn get_variant(&self, id: VariantId) -> CatalogResult<Option<Variant>> {
        let t = self.lock().await;
        Ok(t.variants.get(&id).filter(|s| !s.deleted).map(|s| s.variant.clone()))
    }

    async fn get_variant_by_sku(&self, sku: &str) -> CatalogResult<Option<Variant>> {
        let t = self.lock().await;
        Ok(t
            .variants
            .values()
            .find(|s| !s.deleted && s.variant.sku == sku)
            .map(|s| s.variant.clone()))
    }

    async fn variants_by_ids(&self, ids: &[VariantId]) -> CatalogResult<Vec<Variant>> {
        let wanted: HashSet<VariantId> = ids.iter().copied().collect();
        let t = self.lock().await;
        Ok(t
            .variants
            .values()
            .filter(|s| !s.deleted && wanted.contains(&s.variant.id))
            .map(|s| s.variant.clone())
            .collect())
    }

    async fn variants_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        let t = self.lock().await;
        Ok(t
            .variants
            .values()
            .filter(|s| !s.deleted && s.variant.product_id == product_id)
            .map(|s| s.variant.clone())
            .collect())
    }

    async fn update_variant(&self, id: VariantId, patch: &VariantPatch) -> CatalogResult<Option<Variant>> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        let Some(current) = t.live_variant_mut(id) else {
            return Ok(None);
        };
        let mut next = current.clone();
        patch.apply_to(&mut next)?;
        *current = next.clone();
        Ok(Some(next))
    }

    async fn soft_delete_variant(&self, id: VariantId) -> CatalogResult<bool> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        match t.variants.get_mut(&id) {
            Some(slot) if !slot.deleted => {
                slot.deleted = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn adjust_stock(&self, id: VariantId, op: StockOp) -> CatalogResult<StockLevel> {
        let mut t = self.lock_for_write().await?;
        t.take_fault()?;
        let variant = t.live_variant_mut(id).ok_or_else(|| CatalogError::not_found(Entity::Variant, id))?;
        let next = variant.stock_level().apply(id, op)?;
        variant.stock = next.stock;
        variant.reserved_stock = next.reserved;
        Ok(next)
    }

    async fn stock_level(&self, id: VariantId) -> CatalogResult<Option<StockLevel>> {
        let t = self.lock().await;
        Ok(t.variants.get(&id).filter(|s| !s.deleted).map(|s| s.variant.stock_level()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    fn product(category_id: CategoryId, brand_id: BrandId) -> NewProduct {
        NewProduct {
            external_id: None,
            name: "Runner".into(),
            description: String::new(),
            material: "mesh".into(),
            is_active: true,
            category_id,
            brand_id,
        }
    }

    fn variant(sku: &str, stock: u32) -> NewVariant {
        NewVariant {
            sku: sku.into(),
            price: BigDecimal::from(50),
            discount: BigDecimal::from(0),
            stock,
            sizes: vec![],
            colors: vec![],
            barcode: None,
            dimensions: None,
            image_urls: vec![],
            min_order: 1,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn atomic_insert_writes_nothing_on_duplicate_sku() {
        let store = InMemoryCatalogStore::new();
        let (c, b) = (store.add_category().await, store.add_brand().await);
        let err = store
            .insert_product_with_variants(&product(c, b), &[variant("A", 1), variant("A", 2)])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSku(sku) if sku == "A"));
        assert_eq!(store.product_count().await, 0);
        assert_eq!(store.variant_count().await, 0);
    }

    #[tokio::test]
    async fn deleted_variant_keeps_its_sku() {
        let store = InMemoryCatalogStore::new();
        let (c, b) = (store.add_category().await, store.add_brand().await);
        let p = store.insert_product(&product(c, b)).await.unwrap();
        let v = store.insert_variant(p.id, &variant("KEEP", 3)).await.unwrap();
        assert!(store.soft_delete_variant(v.id).await.unwrap());
        assert!(store.get_variant(v.id).await.unwrap().is_none());
        let err = store.insert_variant(p.id, &variant("KEEP", 1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSku(_)));
    }

    #[tokio::test]
    async fn slow_write_times_out_without_applying() {
        let store = InMemoryCatalogStore::new();
        let (c, b) = (store.add_category().await, store.add_brand().await);
        let p = store.insert_product(&product(c, b)).await.unwrap();
        let v = store.insert_variant(p.id, &variant("SLOW", 5)).await.unwrap();

        store.set_statement_timeout(Some(Duration::from_millis(10))).await;
        store.set_latency(Duration::from_millis(50)).await;
        let err = store.adjust_stock(v.id, StockOp::Reserve(2)).await.unwrap_err();
        assert!(matches!(err, CatalogError::Timeout(_)));

        store.set_latency(Duration::ZERO).await;
        assert_eq!(store.stock_level(v.id).await.unwrap(), Some(StockLevel { stock: 5, reserved: 0 }));
    }

    #[tokio::test]
    async fn injected_faults_are_transient() {
        let store = InMemoryCatalogStore::new();
        let (c, b) = (store.add_category().await, store.add_brand().await);
        store.fail_next_writes(1).await;
        let err = store.insert_product(&product(c, b)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.insert_product(&product(c, b)).await.is_ok());
    }
}
