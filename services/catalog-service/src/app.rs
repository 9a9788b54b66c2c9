use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method, StatusCode,
};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use common_observability::CatalogMetrics;
use prometheus::{Encoder, TextEncoder};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::catalog::CatalogService;
use crate::product_handlers::get_product;
use crate::reservation::ReservationService;
use crate::variant_handlers::{
    available_stock, batch_variants, create_variant, delete_variant, get_variant, release_stock, reserve_stock,
    set_stock, update_variant, variant_exists,
};

pub const SERVICE_NAME: &str = "catalog-service";

#[derive(Clone)]
pub struct AppState {
    pub reservations: ReservationService,
    pub catalog: CatalogService,
    pub metrics: Arc<CatalogMetrics>,
}

pub async fn http_error_metrics(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp.headers().get("X-Error-Code").and_then(|v| v.to_str().ok()).unwrap_or("unknown");
        state.metrics.http_errors_total.with_label_values(&[SERVICE_NAME, code, status.as_str()]).inc();
    }
    resp
}

pub async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry.gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&families, &mut buf) {
        return (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}"));
    }
    (StatusCode::OK, String::from_utf8_lossy(&buf).to_string())
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE]);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/products/:id", get(get_product))
        .route("/variants", post(create_variant))
        .route("/variants/batch", post(batch_variants))
        .route("/variants/:id", get(get_variant).patch(update_variant).delete(delete_variant))
        .route("/variants/:id/reserve", post(reserve_stock))
        .route("/variants/:id/release", post(release_stock))
        .route("/variants/:id/stock", put(set_stock))
        .route("/variants/:id/available", get(available_stock))
        .route("/variants/:id/exists", get(variant_exists))
        .layer(middleware::from_fn_with_state(state.clone(), http_error_metrics))
        .layer(cors)
        .with_state(state)
}
