mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use serde_json::{json, Value};

async fn create_item(app: &TestApp, body: Value) -> i64 {
    let (status, item) = app.request(Method::POST, "/api/v1/items", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", item);
    item["id"].as_i64().expect("item id")
}

#[tokio::test]
async fn health_reports_the_database() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn stock_adjustments_round_trip_over_http() {
    let app = TestApp::new().await;
    let item_id = create_item(
        &app,
        json!({
            "sku": "CEM-50",
            "name": "Cement 50kg",
            "kind": "product",
            "channel": "warehouse",
            "opening_balance": 12,
            "low_stock_threshold": 5
        }),
    )
    .await;

    let (status, entry) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 3, "kind": "out", "note": "site 7 pickup" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["resulting_balance"], 9);
    assert_eq!(entry["partition"], "product");

    let (status, entry) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 4, "kind": "in", "site_id": 7 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(entry["site_id"], 7);

    let (status, balance) = app
        .request(Method::GET, &format!("/api/v1/stock/items/{}/balance?site_id=7", item_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["balance"], 4);
    assert_eq!(balance["available"], 13);

    let (status, ledger) = app
        .request(Method::GET, &format!("/api/v1/stock/items/{}/ledger", item_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ledger.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn voiding_an_entry_falls_back_to_the_previous_snapshot() {
    let app = TestApp::new().await;
    let item_id = create_item(
        &app,
        json!({ "sku": "REBAR", "name": "Rebar 12mm", "kind": "material", "channel": "hardware", "opening_balance": 20 }),
    )
    .await;

    let (_, entry) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 8, "kind": "out" })),
        )
        .await;
    let entry_id = entry["id"].as_i64().unwrap();

    let (status, voided) = app
        .request(Method::POST, &format!("/api/v1/stock/entries/{}/void", entry_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voided["active"], false);

    let (_, balance) = app
        .request(Method::GET, &format!("/api/v1/stock/items/{}/balance", item_id), None)
        .await;
    assert_eq!(balance["balance"], 20);
}

#[tokio::test]
async fn adjustment_errors_map_to_status_codes() {
    let app = TestApp::new().await;
    let item_id = create_item(
        &app,
        json!({ "sku": "SAND", "name": "Sand", "kind": "material", "channel": "hardware", "opening_balance": 2 }),
    )
    .await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 0, "kind": "in" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Bad Request");

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": i64::MAX, "kind": "in" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 5, "kind": "out" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["shortages"][0]["available"], 2);
    assert_eq!(body["details"]["shortages"][0]["requested"], 5);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": 9_999, "quantity": 1, "kind": "in" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/stock/adjustments",
            Some(json!({ "item_id": item_id, "quantity": 1, "kind": "in", "partition": "product" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn bill_of_materials_is_replaced_and_validated() {
    let app = TestApp::new().await;
    let door = create_item(
        &app,
        json!({ "sku": "DOOR", "name": "Door", "kind": "product", "channel": "hardware", "opening_balance": 3 }),
    )
    .await;
    let hinge = create_item(
        &app,
        json!({ "sku": "HINGE", "name": "Hinge", "kind": "material", "channel": "hardware", "opening_balance": 30 }),
    )
    .await;

    let (status, lines) = app
        .request(
            Method::PUT,
            &format!("/api/v1/items/{}/bom", door),
            Some(json!({ "components": [{ "material_item_id": hinge, "quantity_per_unit": "3" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines.as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/items/{}/bom", door),
            Some(json!({ "components": [{ "material_item_id": door, "quantity_per_unit": "1" }] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, lines) = app
        .request(Method::GET, &format!("/api/v1/items/{}/bom", door), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines[0]["material_item_id"], hinge);

    let (status, _) = app.request(Method::GET, "/api/v1/items/9999/bom", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let app = TestApp::new().await;
    let window = create_item(
        &app,
        json!({ "sku": "WIN", "name": "Window", "kind": "product", "channel": "hardware", "opening_balance": 10 }),
    )
    .await;
    let frame = create_item(
        &app,
        json!({ "sku": "FRAME", "name": "Frame", "kind": "material", "channel": "hardware", "opening_balance": 100 }),
    )
    .await;
    app.request(
        Method::PUT,
        &format!("/api/v1/items/{}/bom", window),
        Some(json!({ "components": [{ "material_item_id": frame, "quantity_per_unit": "2" }] })),
    )
    .await;

    let (status, order) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "lines": [{ "type": "regular", "item_id": window, "quantity": 3 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["order"]["overall_status"], "pending");
    assert_eq!(order["channels"][0]["channel_key"], "hardware");
    let order_id = order["order"]["id"].as_str().unwrap().to_string();
    let transitions = format!("/api/v1/orders/{}/transitions", order_id);

    let (status, order) = app
        .request(
            Method::POST,
            &transitions,
            Some(json!({ "channel": "hardware", "action": "approve", "actor": "yard-lead" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["order"]["overall_status"], "approved");

    let (_, balance) = app
        .request(Method::GET, &format!("/api/v1/stock/items/{}/balance", frame), None)
        .await;
    assert_eq!(balance["balance"], 94);

    let (status, body) = app
        .request(
            Method::POST,
            &transitions,
            Some(json!({ "channel": "hardware", "action": "deliver" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .request(
            Method::POST,
            &transitions,
            Some(json!({ "channel": "hardware", "action": "approve" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["details"]["from"], "delivered");

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, order) = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["order"]["overall_status"], "delivered");
}

#[tokio::test]
async fn order_requests_are_validated() {
    let app = TestApp::new().await;
    let pump = create_item(
        &app,
        json!({ "sku": "PUMP", "name": "Pump", "kind": "product", "channel": "lpo", "opening_balance": 0 }),
    )
    .await;

    let (status, _) = app
        .request(Method::POST, "/api/v1/orders", Some(json!({ "lines": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "lines": [{ "type": "regular", "item_id": pump, "quantity": 1 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("supplier"));

    let (status, order) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "lines": [{ "type": "regular", "item_id": pump, "quantity": 1, "supplier_id": 3 }] })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["order"]["is_lpo"], true);
    assert_eq!(order["channels"][0]["channel_key"], "lpo:3");
    let order_id = order["order"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(Method::DELETE, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .request(Method::GET, &format!("/api/v1/orders/{}", order_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
