use axum::extract::{Path, State};
use axum::Json;
use common_http_errors::ApiResult;
use serde::Serialize;

use crate::app::AppState;
use crate::model::{Product, ProductId, Variant};

#[derive(Debug, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub variants: Vec<Variant>,
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<ProductId>) -> ApiResult<Json<ProductView>> {
    let product = state.catalog.get_product(id).await?;
    let variants = state.reservations.variants_for_product(id).await?;
    Ok(Json(ProductView { product, variants }))
}
