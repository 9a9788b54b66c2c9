//! Wire shapes for the inbound catalog topics and the outbound `product.created` event.
//!
//! Decoding is two-pass: the `action` tag is read first so an unknown action is reported as
//! such even when the rest of the payload would not parse.

use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use common_money::to_wire_f64;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};
use crate::model::{BrandId, CategoryId, NewProduct, NewVariant, Product, ProductId, Variant, VariantId};

pub const CREATE_ACTION: &str = "create";
pub const MEDIA_STORED_ACTION: &str = "media-stored";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductAction {
    Create,
    MediaStored,
}

impl ProductAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductAction::Create => CREATE_ACTION,
            ProductAction::MediaStored => MEDIA_STORED_ACTION,
        }
    }
}

impl FromStr for ProductAction {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CREATE_ACTION => Ok(ProductAction::Create),
            MEDIA_STORED_ACTION => Ok(ProductAction::MediaStored),
            other => Err(CatalogError::UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ProductAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantAction {
    Create,
}

impl VariantAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantAction::Create => CREATE_ACTION,
        }
    }
}

impl FromStr for VariantAction {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CREATE_ACTION => Ok(VariantAction::Create),
            other => Err(CatalogError::UnknownAction(other.to_string())),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantPayload {
    pub sku: String,
    pub price: BigDecimal,
    #[serde(default)]
    pub discount: BigDecimal,
    #[serde(default)]
    pub sizes: Vec<u32>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub barcode: Option<String>,
    #[serde(default)]
    pub dimensions: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub min_order: Option<u32>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl VariantPayload {
    /// Missing or zero `min_order` means "no minimum", stored as 1.
    pub fn into_new_variant(self) -> NewVariant {
        NewVariant {
            sku: self.sku,
            price: self.price,
            discount: self.discount,
            stock: self.stock,
            sizes: self.sizes,
            colors: self.colors,
            barcode: self.barcode.filter(|b| !b.is_empty()),
            dimensions: self.dimensions.filter(|d| !d.is_empty()),
            image_urls: self.images,
            min_order: self.min_order.filter(|m| *m > 0).unwrap_or(1),
            is_active: self.is_active,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductCreatePayload {
    /// Idempotency key supplied by the producer; replays are rejected.
    #[serde(default)]
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub material: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub review_count: u32,
    pub category_id: CategoryId,
    pub brand_id: BrandId,
    #[serde(default)]
    pub image_keys: Vec<String>,
    #[serde(default)]
    pub video_keys: Vec<String>,
    #[serde(default)]
    pub variants: Vec<VariantPayload>,
}

impl ProductCreatePayload {
    pub fn new_product(&self) -> NewProduct {
        NewProduct {
            external_id: self.external_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            material: self.material.clone(),
            is_active: self.is_active,
            category_id: self.category_id,
            brand_id: self.brand_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaStoredPayload {
    pub product_id: ProductId,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub video_urls: Vec<String>,
}

#[derive(Deserialize)]
struct ActionTag {
    action: String,
}

#[derive(Deserialize)]
struct CreateEnvelope {
    product: ProductCreatePayload,
}

#[derive(Debug, Clone)]
pub enum ProductCommand {
    Create(ProductCreatePayload),
    MediaStored(MediaStoredPayload),
}

impl ProductCommand {
    pub fn action(&self) -> ProductAction {
        match self {
            ProductCommand::Create(_) => ProductAction::Create,
            ProductCommand::MediaStored(_) => ProductAction::MediaStored,
        }
    }

    pub fn decode(raw: &[u8]) -> CatalogResult<Self> {
        let tag: ActionTag = parse(raw)?;
        match tag.action.parse::<ProductAction>()? {
            ProductAction::Create => parse::<CreateEnvelope>(raw).map(|e| ProductCommand::Create(e.product)),
            ProductAction::MediaStored => parse(raw).map(ProductCommand::MediaStored),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VariantEnvelope {
    pub product_id: ProductId,
    pub product_variant: VariantPayload,
    #[serde(default)]
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum VariantCommand {
    Create(VariantEnvelope),
}

impl VariantCommand {
    pub fn action(&self) -> VariantAction {
        match self {
            VariantCommand::Create(_) => VariantAction::Create,
        }
    }

    pub fn decode(raw: &[u8]) -> CatalogResult<Self> {
        let tag: ActionTag = parse(raw)?;
        match tag.action.parse::<VariantAction>()? {
            VariantAction::Create => parse(raw).map(VariantCommand::Create),
        }
    }
}

fn parse<'a, T: Deserialize<'a>>(raw: &'a [u8]) -> CatalogResult<T> {
    serde_json::from_slice(raw).map_err(|e| CatalogError::MalformedEvent(e.to_string()))
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// Per-variant slice of the outbound event. Empty optional attributes are omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantSummary {
    pub variant_id: VariantId,
    pub sku: String,
    pub price: f64,
    pub discount: f64,
    pub sizes: Vec<u32>,
    pub colors: Vec<String>,
    pub stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub min_order: u32,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub reserved_stock: u32,
}

impl From<&Variant> for VariantSummary {
    fn from(v: &Variant) -> Self {
        VariantSummary {
            variant_id: v.id,
            sku: v.sku.clone(),
            price: to_wire_f64(&v.price),
            discount: to_wire_f64(&v.discount),
            sizes: v.sizes.clone(),
            colors: v.colors.clone(),
            stock: v.stock,
            barcode: v.barcode.clone().filter(|b| !b.is_empty()),
            dimensions: v.dimensions.clone().filter(|d| !d.is_empty()),
            image_urls: v.image_urls.clone(),
            min_order: v.min_order,
            is_active: v.is_active,
            reserved_stock: v.reserved_stock,
        }
    }
}

/// Denormalized snapshot for search and media consumers, keyed by product ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductCreatedEvent {
    pub action: String,
    pub product_id: ProductId,
    pub name: String,
    pub description: String,
    pub material: String,
    pub rating: f64,
    pub review_count: u32,
    pub is_active: bool,
    pub category_id: CategoryId,
    pub brand_id: BrandId,
    pub image_keys: Vec<String>,
    pub video_keys: Vec<String>,
    pub variants: Vec<VariantSummary>,
}

impl ProductCreatedEvent {
    pub fn new(product: &Product, source: &ProductCreatePayload, variants: &[Variant]) -> Self {
        ProductCreatedEvent {
            action: CREATE_ACTION.to_string(),
            product_id: product.id,
            name: product.name.clone(),
            description: product.description.clone(),
            material: product.material.clone(),
            rating: source.rating,
            review_count: source.review_count,
            is_active: product.is_active,
            category_id: product.category_id,
            brand_id: product.brand_id,
            image_keys: source.image_keys.clone(),
            video_keys: source.video_keys.clone(),
            variants: variants.iter().map(VariantSummary::from).collect(),
        }
    }

    pub fn partition_key(&self) -> String {
        self.product_id.to_string()
    }

    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| CatalogError::PublishFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_action_wins_over_bad_payload() {
        let err = ProductCommand::decode(br#"{"action":"delete","product":42}"#).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownAction(a) if a == "delete"));
    }

    #[test]
    fn missing_action_is_malformed() {
        let err = ProductCommand::decode(br#"{"product":{}}"#).unwrap_err();
        assert_eq!(err.kind(), "malformed_event");
        let err = VariantCommand::decode(b"not json").unwrap_err();
        assert_eq!(err.kind(), "malformed_event");
    }

    #[test]
    fn create_payload_defaults() {
        let raw = json!({
            "action": "create",
            "product": {
                "name": "Boot", "category_id": 1, "brand_id": 2,
                "variants": [{ "sku": "B-1", "price": 19.99 }]
            }
        });
        let ProductCommand::Create(p) = ProductCommand::decode(raw.to_string().as_bytes()).unwrap() else {
            panic!("expected create");
        };
        assert!(p.is_active);
        assert_eq!(p.rating, 0.0);
        let v = p.variants[0].clone().into_new_variant();
        assert_eq!(v.min_order, 1);
        assert_eq!(v.price, BigDecimal::from_str("19.99").unwrap());
        assert!(v.is_active);
    }

    #[test]
    fn media_stored_reads_top_level_fields() {
        let raw = json!({ "action": "media-stored", "product_id": 9, "image_urls": ["a.jpg"] });
        match ProductCommand::decode(raw.to_string().as_bytes()).unwrap() {
            ProductCommand::MediaStored(m) => {
                assert_eq!(m.product_id, 9);
                assert_eq!(m.image_urls, vec!["a.jpg".to_string()]);
                assert!(m.video_urls.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn summary_omits_empty_optionals() {
        let summary = VariantSummary {
            variant_id: 1,
            sku: "S".into(),
            price: 10.5,
            discount: 0.0,
            sizes: vec![],
            colors: vec![],
            stock: 3,
            barcode: None,
            dimensions: None,
            image_urls: vec![],
            min_order: 1,
            is_active: true,
            reserved_stock: 0,
        };
        let v = serde_json::to_value(&summary).unwrap();
        assert!(v.get("barcode").is_none());
        assert!(v.get("image_urls").is_none());
        assert!(v.get("reserved_stock").is_none());
        assert_eq!(v["min_order"], 1);
    }

    #[test]
    fn variant_envelope_decodes() {
        let raw = json!({
            "action": "create", "product_id": 4, "user_id": 12,
            "product_variant": { "sku": "V-1", "price": "5.00", "stock": 8 }
        });
        let VariantCommand::Create(env) = VariantCommand::decode(raw.to_string().as_bytes()).unwrap();
        assert_eq!(env.product_id, 4);
        assert_eq!(env.user_id, Some(12));
        assert_eq!(env.product_variant.stock, 8);
    }
}
