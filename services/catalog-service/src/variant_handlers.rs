use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use common_http_errors::ApiResult;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::events::VariantPayload;
use crate::ledger::StockLevel;
use crate::model::{ProductId, Variant, VariantCheck, VariantId, VariantPatch};

#[derive(Debug, Deserialize)]
pub struct CreateVariantRequest {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub variant: VariantPayload,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub stock: u32,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<VariantId>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockResponse {
    pub variant_id: VariantId,
    pub stock: u32,
    pub reserved_stock: u32,
    pub available: u32,
}

impl StockResponse {
    fn new(variant_id: VariantId, level: StockLevel) -> Self {
        Self { variant_id, stock: level.stock, reserved_stock: level.reserved, available: level.available() }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailableResponse {
    pub variant_id: VariantId,
    pub available: u32,
}

pub async fn create_variant(
    State(state): State<AppState>,
    Json(req): Json<CreateVariantRequest>,
) -> ApiResult<(StatusCode, Json<Variant>)> {
    let created = state
        .reservations
        .create_variant(req.product_id, req.variant.into_new_variant())
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_variant(State(state): State<AppState>, Path(id): Path<VariantId>) -> ApiResult<Json<Variant>> {
    Ok(Json(state.reservations.get_variant(id).await?))
}

pub async fn update_variant(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(patch): Json<VariantPatch>,
) -> ApiResult<Json<Variant>> {
    Ok(Json(state.reservations.update_variant(id, patch).await?))
}

pub async fn delete_variant(State(state): State<AppState>, Path(id): Path<VariantId>) -> ApiResult<StatusCode> {
    state.reservations.delete_variant(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reserve_stock(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(req): Json<QuantityRequest>,
) -> ApiResult<Json<StockResponse>> {
    let level = state.reservations.reserve(id, req.quantity).await?;
    Ok(Json(StockResponse::new(id, level)))
}

pub async fn release_stock(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(req): Json<QuantityRequest>,
) -> ApiResult<Json<StockResponse>> {
    let level = state.reservations.release(id, req.quantity).await?;
    Ok(Json(StockResponse::new(id, level)))
}

pub async fn set_stock(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(req): Json<SetStockRequest>,
) -> ApiResult<Json<StockResponse>> {
    let level = state.reservations.set_stock(id, req.stock).await?;
    Ok(Json(StockResponse::new(id, level)))
}

pub async fn available_stock(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
) -> ApiResult<Json<AvailableResponse>> {
    let available = state.reservations.available(id).await?;
    Ok(Json(AvailableResponse { variant_id: id, available }))
}

pub async fn batch_variants(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<Vec<Variant>>> {
    Ok(Json(state.reservations.variants_by_ids(&req.ids).await?))
}

pub async fn variant_exists(
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
) -> ApiResult<Json<VariantCheck>> {
    Ok(Json(state.reservations.check_variant(id).await?))
}
