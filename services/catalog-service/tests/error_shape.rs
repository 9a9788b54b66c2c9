use axum::body::Body;
use axum::http::{Request, StatusCode};
use catalog_service::build_router;
use catalog_service::store::CatalogStore;
use catalog_service::variant_handlers::{AvailableResponse, StockResponse};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::test_utils::{app_state, draft, seeded_store};


fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(resp: axum::response::Response) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn reserve_past_available_is_409_not_retryable() {
    let (store, product_id) = seeded_store().await;
    let v = store.insert_variant(product_id, &draft("H-1", 3)).await.unwrap();
    let app = build_router(app_state(store));

    let resp = app
        .clone()
        .oneshot(json_request("POST", &format!("/variants/{}/reserve", v.id), json!({ "quantity": 2 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: StockResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(body, StockResponse { variant_id: v.id, stock: 3, reserved_stock: 2, available: 1 });

    let resp = app
        .oneshot(json_request("POST", &format!("/variants/{}/reserve", v.id), json!({ "quantity": 2 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "insufficient_stock");
    let body = body_json(resp).await;
    assert_eq!(body["code"], "insufficient_stock");
    assert!(body.get("retryable").is_none());
}

#[tokio::test]
async fn excess_release_is_409() {
    let (store, product_id) = seeded_store().await;
    let v = store.insert_variant(product_id, &draft("H-2", 3)).await.unwrap();
    let app = build_router(app_state(store));
    let resp = app
        .oneshot(json_request("POST", &format!("/variants/{}/release", v.id), json!({ "quantity": 1 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "excess_release");
}

#[tokio::test]
async fn unknown_variant_is_404() {
    let (store, _) = seeded_store().await;
    let app = build_router(app_state(store));
    let req = Request::builder().uri("/variants/777/available").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "variant_not_found");
}

#[tokio::test]
async fn zero_quantity_is_400() {
    let (store, product_id) = seeded_store().await;
    let v = store.insert_variant(product_id, &draft("H-3", 3)).await.unwrap();
    let app = build_router(app_state(store));
    let resp = app
        .oneshot(json_request("POST", &format!("/variants/{}/reserve", v.id), json!({ "quantity": 0 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "invalid_quantity");
}

#[tokio::test]
async fn store_outage_is_503_retryable() {
    let (store, product_id) = seeded_store().await;
    let v = store.insert_variant(product_id, &draft("H-4", 3)).await.unwrap();
    store.fail_next_writes(1).await;
    let app = build_router(app_state(store));
    let resp = app
        .oneshot(json_request("PUT", &format!("/variants/{}/stock", v.id), json!({ "stock": 9 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "store_unavailable");
    assert_eq!(body_json(resp).await["retryable"], true);
}

#[tokio::test]
async fn create_then_read_variant() {
    let (store, product_id) = seeded_store().await;
    let app = build_router(app_state(store));
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/variants",
            json!({ "product_id": product_id, "sku": "NEW-1", "price": "30.00", "stock": 5, "sizes": [44] }),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["sku"], "NEW-1");

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/variants", json!({ "product_id": product_id, "sku": "NEW-1", "price": 1 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "duplicate_sku");

    let req = Request::builder().uri(format!("/variants/{id}/available")).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let body: AvailableResponse = serde_json::from_value(body_json(resp).await).unwrap();
    assert_eq!(body.available, 5);

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/variants/batch", json!({ "ids": [id, id, 9999] })))
        .await
        .unwrap();
    let list = body_json(resp).await;
    assert_eq!(list.as_array().unwrap().len(), 1);

    let req = Request::builder().uri(format!("/products/{product_id}")).body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let product = body_json(resp).await;
    assert_eq!(product["id"], product_id);
    assert_eq!(product["variants"].as_array().unwrap().len(), 1);

    let req = Request::builder().method("DELETE").uri(format!("/variants/{id}")).body(Body::empty()).unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::NO_CONTENT);

    let req = Request::builder().uri(format!("/variants/{id}/exists")).body(Body::empty()).unwrap();
    let check = body_json(app.oneshot(req).await.unwrap()).await;
    assert_eq!(check, json!({ "exists": false, "is_active": false }));
}

#[tokio::test]
async fn patch_rejects_sku_and_stock_below_reserved() {
    let (store, product_id) = seeded_store().await;
    let v = store.insert_variant(product_id, &draft("P-1", 10)).await.unwrap();
    store.adjust_stock(v.id, catalog_service::ledger::StockOp::Reserve(4)).await.unwrap();
    let app = build_router(app_state(store));

    let resp = app
        .clone()
        .oneshot(json_request("PATCH", &format!("/variants/{}", v.id), json!({ "sku": "OTHER" })))
        .await
        .unwrap();
    assert!(resp.status().is_client_error());

    let resp = app
        .clone()
        .oneshot(json_request("PATCH", &format!("/variants/{}", v.id), json!({ "stock": 3 })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "stock_below_reserved");

    let resp = app
        .oneshot(json_request("PATCH", &format!("/variants/{}", v.id), json!({ "price": "12.50", "is_active": false })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["is_active"], false);
    assert_eq!(body["reserved_stock"], 4);
}

#[tokio::test]
async fn error_responses_are_counted() {
    let (store, _) = seeded_store().await;
    let state = app_state(store);
    let metrics = state.metrics.clone();
    let app = build_router(state);
    let req = Request::builder().uri("/variants/1/available").body(Body::empty()).unwrap();
    let _ = app.clone().oneshot(req).await.unwrap();
    assert_eq!(
        metrics.http_errors_total.with_label_values(&["catalog-service", "variant_not_found", "404"]).get(),
        1
    );

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let text = String::from_utf8(resp.into_body().collect().await.unwrap().to_bytes().to_vec()).unwrap();
    assert!(text.contains("http_errors_total"));
}

#[tokio::test]
async fn values_too_large_for_their_columns_are_400() {
    let (store, product_id) = seeded_store().await;
    let app = build_router(app_state(store.clone()));
    let cases = [
        json!({ "product_id": product_id, "sku": "XL-1", "price": 100000000 }),
        json!({ "product_id": product_id, "sku": "XL-2", "price": 1, "barcode": "0".repeat(51) }),
        json!({ "product_id": product_id, "sku": "XL-3", "price": 1, "sizes": [4294967295u32] }),
    ];
    for body in cases {
        let resp = app.clone().oneshot(json_request("POST", "/variants", body.clone())).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
        let err = body_json(resp).await;
        assert_eq!(err["code"], "validation_failed");
        assert!(err.get("retryable").is_none());
    }
    assert!(store.variants_for_product(product_id).await.unwrap().is_empty());
}
