//! Product-level repository operations layered over [`CatalogStore`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::{CatalogError, CatalogResult, Entity};
use crate::model::{NewProduct, NewVariant, Product, ProductId, Variant};
use crate::reservation::{bounded, DEFAULT_OP_TIMEOUT};
use crate::store::CatalogStore;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    op_timeout: Duration,
}

impl CatalogService {
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store, op_timeout: DEFAULT_OP_TIMEOUT }
    }

    pub fn with_timeout(mut self, op_timeout: Duration) -> Self {
        self.op_timeout = op_timeout;
        self
    }

    /// Fail fast when the category or brand a product points at does not exist.
    pub async fn ensure_references(&self, product: &NewProduct) -> CatalogResult<()> {
        if !bounded(self.op_timeout, self.store.category_exists(product.category_id)).await? {
            return Err(CatalogError::not_found(Entity::Category, product.category_id));
        }
        if !bounded(self.op_timeout, self.store.brand_exists(product.brand_id)).await? {
            return Err(CatalogError::not_found(Entity::Brand, product.brand_id));
        }
        Ok(())
    }

    /// Product row only; variants are added one by one afterwards.
    pub async fn create_product(&self, product: &NewProduct) -> CatalogResult<Product> {
        product.validate()?;
        self.ensure_references(product).await?;
        let created = self.store.insert_product(product).await?;
        info!(product_id = created.id, name = %created.name, "product created");
        Ok(created)
    }

    /// Product and its initial variants as one unit of work.
    pub async fn create_product_with_variants(
        &self,
        product: &NewProduct,
        drafts: Vec<NewVariant>,
    ) -> CatalogResult<(Product, Vec<Variant>)> {
        product.validate()?;
        let drafts = drafts
            .into_iter()
            .map(NewVariant::normalized)
            .collect::<CatalogResult<Vec<_>>>()?;
        let mut seen = HashSet::new();
        if let Some(dup) = drafts.iter().find(|d| !seen.insert(d.sku.as_str())) {
            return Err(CatalogError::DuplicateSku(dup.sku.clone()));
        }
        self.ensure_references(product).await?;
        // Writes run to completion; the store enforces the deadline.
        let (created, variants) = self.store.insert_product_with_variants(product, &drafts).await?;
        info!(product_id = created.id, variants = variants.len(), "product created with variants");
        Ok((created, variants))
    }

    pub async fn get_product(&self, id: ProductId) -> CatalogResult<Product> {
        bounded(self.op_timeout, self.store.get_product(id))
            .await?
            .ok_or_else(|| CatalogError::not_found(Entity::Product, id))
    }

    /// Replace the product's media URL lists.
    pub async fn update_media(
        &self,
        id: ProductId,
        image_urls: &[String],
        video_urls: &[String],
    ) -> CatalogResult<Product> {
        let updated = self
            .store
            .set_product_media(id, image_urls, video_urls)
            .await?
            .ok_or_else(|| CatalogError::not_found(Entity::Product, id))?;
        info!(product_id = id, images = image_urls.len(), videos = video_urls.len(), "product media updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalogStore;

    fn product(category_id: i64, brand_id: i64) -> NewProduct {
        NewProduct {
            external_id: Some("ext-1".into()),
            name: "Court".into(),
            description: "low top".into(),
            material: "leather".into(),
            is_active: true,
            category_id,
            brand_id,
        }
    }

    #[tokio::test]
    async fn missing_brand_fails_before_any_write() {
        let store = Arc::new(InMemoryCatalogStore::new());
        let category_id = store.add_category().await;
        let svc = CatalogService::new(store.clone());
        let err = svc.create_product(&product(category_id, 42)).await.unwrap_err();
        assert_eq!(err.kind(), "brand_not_found");
        assert_eq!(store.product_count().await, 0);
    }

    #[tokio::test]
    async fn replayed_external_id_is_rejected() {
        let store = Arc::new(InMemoryCatalogStore::new());
        let (c, b) = (store.add_category().await, store.add_brand().await);
        let svc = CatalogService::new(store.clone());
        svc.create_product_with_variants(&product(c, b), vec![]).await.unwrap();
        let err = svc.create_product_with_variants(&product(c, b), vec![]).await.unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateProduct(id) if id == "ext-1"));
        assert_eq!(store.product_count().await, 1);
    }

    #[tokio::test]
    async fn media_update_on_missing_product_is_not_found() {
        let svc = CatalogService::new(Arc::new(InMemoryCatalogStore::new()));
        let err = svc.update_media(7, &["a.png".into()], &[]).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { entity: Entity::Product, id: 7 }));
    }
}
