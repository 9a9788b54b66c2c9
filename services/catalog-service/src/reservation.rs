//! Reservation service: the only writer of variant stock columns.
//!
//! Reads are bounded by `op_timeout` on the client side. Writes are not: dropping a write future
//! mid-commit would leave its outcome unknown, so the store bounds them itself (see
//! [`CatalogStore`]). Ledger rejections are counted and logged at `warn`; they are never retried
//! here.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use common_observability::CatalogMetrics;
use tracing::{info, warn};

use crate::error::{CatalogError, CatalogResult, Entity};
use crate::ledger::{StockLevel, StockOp};
use crate::model::{NewVariant, Product, ProductId, Variant, VariantCheck, VariantId, VariantPatch};
use crate::store::CatalogStore;

pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one store read under a deadline; an elapsed deadline becomes a retryable `Timeout`.
/// Never wrap writes: the future may be dropped after the commit reached the server.
pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> CatalogResult<T>
where
    F: Future<Output = CatalogResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(CatalogError::Timeout(limit)),
    }
}

#[derive(Clone)]
pub struct ReservationService {
    store: Arc<dyn CatalogStore>,
    op_timeout: Duration,
    metrics: Option<Arc<CatalogMetrics>>,
}

impl ReservationService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store, op_timeout: DEFAULT_OP_TIMEOUT, metrics: None }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CatalogMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Create a variant under an existing, active product. The SKU is checked up front so the
    /// common duplicate case never reaches the insert; the store re-checks inside its write.
    pub async fn create_variant(&self, product_id: ProductId, draft: NewVariant) -> CatalogResult<Variant> {
        let draft = draft.normalized()?;
        let product = bounded(self.op_timeout, self.store.get_product(product_id))
            .await?
            .ok_or_else(|| CatalogError::not_found(Entity::Product, product_id))?;
        if !product.is_active {
            return Err(CatalogError::ProductInactive(product_id));
        }
        self.insert_unique(&product, draft).await
    }

    /// Creation path for variants listed in the same event as their product: the product row was
    /// just written by the caller, so only the SKU check applies.
    pub(crate) async fn create_initial_variant(&self, product: &Product, draft: NewVariant) -> CatalogResult<Variant> {
        self.insert_unique(product, draft.normalized()?).await
    }

    async fn insert_unique(&self, product: &Product, draft: NewVariant) -> CatalogResult<Variant> {
        if bounded(self.op_timeout, self.store.get_variant_by_sku(&draft.sku)).await?.is_some() {
            return Err(CatalogError::DuplicateSku(draft.sku));
        }
        let created = self.store.insert_variant(product.id, &draft).await?;
        info!(variant_id = created.id, product_id = product.id, sku = %created.sku, stock = created.stock, "variant created");
        Ok(created)
    }

    pub async fn reserve(&self, id: VariantId, quantity: u32) -> CatalogResult<StockLevel> {
        self.mutate(id, StockOp::Reserve(quantity)).await
    }

    pub async fn release(&self, id: VariantId, quantity: u32) -> CatalogResult<StockLevel> {
        self.mutate(id, StockOp::Release(quantity)).await
    }

    /// Absolute stock update; rejected when it would drop below the reserved quantity.
    pub async fn set_stock(&self, id: VariantId, stock: u32) -> CatalogResult<StockLevel> {
        self.mutate(id, StockOp::SetStock(stock)).await
    }

    pub async fn available(&self, id: VariantId) -> CatalogResult<u32> {
        let level = bounded(self.op_timeout, self.store.stock_level(id))
            .await?
            .ok_or_else(|| CatalogError::not_found(Entity::Variant, id))?;
        Ok(level.available())
    }

    async fn mutate(&self, id: VariantId, op: StockOp) -> CatalogResult<StockLevel> {
        match self.store.adjust_stock(id, op).await {
            Ok(level) => {
                info!(variant_id = id, op = op.name(), stock = level.stock, reserved = level.reserved, "stock updated");
                Ok(level)
            }
            Err(err) => {
                if err.is_rejection() {
                    if let Some(m) = &self.metrics {
                        m.stock_rejections_total.with_label_values(&[err.kind()]).inc();
                    }
                    warn!(variant_id = id, op = op.name(), reason = err.kind(), "stock change rejected");
                }
                Err(err)
            }
        }
    }

    pub async fn get_variant(&self, id: VariantId) -> CatalogResult<Variant> {
        bounded(self.op_timeout, self.store.get_variant(id))
            .await?
            .ok_or_else(|| CatalogError::not_found(Entity::Variant, id))
    }

    /// `None` when no live variant carries this SKU.
    pub async fn get_by_sku(&self, sku: &str) -> CatalogResult<Option<Variant>> {
        bounded(self.op_timeout, self.store.get_variant_by_sku(sku.trim())).await
    }

    pub async fn variants_for_product(&self, product_id: ProductId) -> CatalogResult<Vec<Variant>> {
        bounded(self.op_timeout, self.store.variants_for_product(product_id)).await
    }

    /// Batch lookup for other services. Unknown IDs are skipped, duplicates collapse.
    pub async fn variants_by_ids(&self, ids: &[VariantId]) -> CatalogResult<Vec<Variant>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        bounded(self.op_timeout, self.store.variants_by_ids(&ids)).await
    }

    pub async fn check_variant(&self, id: VariantId) -> CatalogResult<VariantCheck> {
        let found = bounded(self.op_timeout, self.store.get_variant(id)).await?;
        Ok(match found {
            Some(v) => VariantCheck { exists: true, is_active: v.is_active },
            None => VariantCheck { exists: false, is_active: false },
        })
    }

    pub async fn update_variant(&self, id: VariantId, patch: VariantPatch) -> CatalogResult<Variant> {
        let patch = patch.normalized()?;
        match self.store.update_variant(id, &patch).await {
            Ok(Some(updated)) => {
                info!(variant_id = id, "variant updated");
                Ok(updated)
            }
            Ok(None) => Err(CatalogError::not_found(Entity::Variant, id)),
            Err(err) => {
                if err.is_rejection() {
                    if let Some(m) = &self.metrics {
                        m.stock_rejections_total.with_label_values(&[err.kind()]).inc();
                    }
                }
                Err(err)
            }
        }
    }

    /// Soft delete. The SKU stays reserved so historical orders keep resolving.
    pub async fn delete_variant(&self, id: VariantId) -> CatalogResult<()> {
        if self.store.soft_delete_variant(id).await? {
            info!(variant_id = id, "variant deleted");
            Ok(())
        } else {
            Err(CatalogError::not_found(Entity::Variant, id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewProduct;
    use crate::store::InMemoryCatalogStore;
    use bigdecimal::BigDecimal;

    fn draft(sku: &str, stock: u32) -> NewVariant {
        NewVariant {
            sku: sku.into(),
            price: BigDecimal::from(20),
            discount: BigDecimal::from(0),
            stock,
            sizes: vec![40, 41],
            colors: vec!["red".into()],
            barcode: None,
            dimensions: None,
            image_urls: vec![],
            min_order: 1,
            is_active: true,
        }
    }

    async fn seeded(active: bool) -> (Arc<InMemoryCatalogStore>, ProductId) {
        let store = Arc::new(InMemoryCatalogStore::new());
        let category_id = store.add_category().await;
        let brand_id = store.add_brand().await;
        let product = store
            .insert_product(&NewProduct {
                external_id: None,
                name: "Trail".into(),
                description: String::new(),
                material: String::new(),
                is_active: active,
                category_id,
                brand_id,
            })
            .await
            .unwrap();
        (store, product.id)
    }

    #[tokio::test]
    async fn create_requires_existing_active_product() {
        let (store, product_id) = seeded(false).await;
        let svc = ReservationService::new(store);
        let err = svc.create_variant(product_id, draft("X", 1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::ProductInactive(id) if id == product_id));
        let err = svc.create_variant(product_id + 100, draft("X", 1)).await.unwrap_err();
        assert_eq!(err.kind(), "product_not_found");
    }

    #[tokio::test]
    async fn duplicate_sku_is_rejected_before_insert() {
        let (store, product_id) = seeded(true).await;
        let svc = ReservationService::new(store.clone());
        svc.create_variant(product_id, draft("DUP", 1)).await.unwrap();
        let err = svc.create_variant(product_id, draft(" DUP ", 1)).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSku(sku) if sku == "DUP"));
        assert_eq!(store.variant_count().await, 1);
    }

    #[tokio::test]
    async fn rejections_are_counted() {
        let (store, product_id) = seeded(true).await;
        let metrics = Arc::new(CatalogMetrics::new());
        let svc = ReservationService::new(store).with_metrics(metrics.clone());
        let v = svc.create_variant(product_id, draft("M", 2)).await.unwrap();
        assert!(svc.reserve(v.id, 3).await.is_err());
        assert_eq!(metrics.stock_rejections_total.with_label_values(&["insufficient_stock"]).get(), 1);
    }

    #[tokio::test]
    async fn check_reports_missing_and_inactive() {
        let (store, product_id) = seeded(true).await;
        let svc = ReservationService::new(store);
        let mut d = draft("OFF", 1);
        d.is_active = false;
        let v = svc.create_variant(product_id, d).await.unwrap();
        assert_eq!(svc.check_variant(v.id).await.unwrap(), VariantCheck { exists: true, is_active: false });
        assert_eq!(svc.check_variant(999).await.unwrap(), VariantCheck { exists: false, is_active: false });
    }

    #[tokio::test]
    async fn deleted_variant_is_not_found() {
        let (store, product_id) = seeded(true).await;
        let svc = ReservationService::new(store);
        let v = svc.create_variant(product_id, draft("GONE", 4)).await.unwrap();
        svc.delete_variant(v.id).await.unwrap();
        assert!(matches!(svc.reserve(v.id, 1).await, Err(CatalogError::NotFound { .. })));
        assert!(matches!(svc.delete_variant(v.id).await, Err(CatalogError::NotFound { .. })));
    }
}
