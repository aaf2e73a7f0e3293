mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use common::{json_body, TestApp};

fn num(value: &Value) -> f64 {
    value
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .or_else(|| value.as_f64())
        .unwrap_or_else(|| panic!("not a numeric value: {value:?}"))
}

async fn create_voucher(app: &TestApp, payload: Value) -> Value {
    let response = app
        .request_branch1(Method::POST, "/api/v1/vouchers", Some(payload))
        .await;
    json_body(response, StatusCode::CREATED).await
}

#[tokio::test]
async fn create_voucher_uppercases_code_and_defaults_valid_from() {
    let app = TestApp::new().await;
    let body = create_voucher(
        &app,
        json!({
            "code": "hemat10",
            "discount_type": "percentage",
            "discount_value": 10
        }),
    )
    .await;

    let data = &body["data"];
    assert_eq!(data["code"], "HEMAT10");
    assert_eq!(data["is_active"], true);
    assert_eq!(data["usage_count"], 0);
    assert!(data["valid_from"].is_string());
}

#[tokio::test]
async fn duplicate_code_in_same_branch_conflicts() {
    let app = TestApp::new().await;
    create_voucher(
        &app,
        json!({"code": "PROMO", "discount_type": "fixed", "discount_value": 5000}),
    )
    .await;

    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers",
            Some(json!({"code": "promo", "discount_type": "fixed", "discount_value": 1000})),
        )
        .await;
    let body = json_body(response, StatusCode::CONFLICT).await;
    assert_eq!(body["message"], "Voucher code already exists");

    // Same code in another branch is fine
    let response = app
        .request(
            Method::POST,
            "/api/v1/vouchers",
            Some(json!({"code": "PROMO", "discount_type": "fixed", "discount_value": 1000})),
            Some(2),
        )
        .await;
    json_body(response, StatusCode::CREATED).await;
}

#[tokio::test]
async fn validate_unknown_or_inactive_code_is_404() {
    let app = TestApp::new().await;

    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "NOPE", "subtotal": 100000})),
        )
        .await;
    let body = json_body(response, StatusCode::NOT_FOUND).await;
    assert_eq!(body["message"], "Invalid voucher code");

    let created = create_voucher(
        &app,
        json!({"code": "OFF", "discount_type": "fixed", "discount_value": 5000, "is_active": false}),
    )
    .await;
    assert_eq!(created["data"]["is_active"], false);

    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "OFF", "subtotal": 100000})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn validate_checks_run_in_order() {
    let app = TestApp::new().await;

    // Not yet valid
    create_voucher(
        &app,
        json!({
            "code": "SOON",
            "discount_type": "fixed",
            "discount_value": 5000,
            "valid_from": (Utc::now() + Duration::days(1)).to_rfc3339()
        }),
    )
    .await;
    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "SOON", "subtotal": 100000})),
        )
        .await;
    let body = json_body(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Voucher is not yet valid");

    // Expired
    create_voucher(
        &app,
        json!({
            "code": "OLD",
            "discount_type": "fixed",
            "discount_value": 5000,
            "valid_from": (Utc::now() - Duration::days(30)).to_rfc3339(),
            "valid_until": (Utc::now() - Duration::days(1)).to_rfc3339()
        }),
    )
    .await;
    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "OLD", "subtotal": 100000})),
        )
        .await;
    let body = json_body(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Voucher has expired");

    // Minimum order, message carries the formatted minimum
    create_voucher(
        &app,
        json!({
            "code": "BIGONLY",
            "discount_type": "fixed",
            "discount_value": 5000,
            "min_order": 50000
        }),
    )
    .await;
    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "BIGONLY", "subtotal": 49999})),
        )
        .await;
    let body = json_body(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Minimum order of Rp 50.000 required");
}

#[tokio::test]
async fn percentage_discount_capped_fixed_never() {
    let app = TestApp::new().await;
    create_voucher(
        &app,
        json!({
            "code": "CAP20",
            "discount_type": "percentage",
            "discount_value": 20,
            "max_discount": 15000
        }),
    )
    .await;

    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "CAP20", "subtotal": 100000})),
        )
        .await;
    let body = json_body(response, StatusCode::OK).await;
    assert_eq!(num(&body["data"]["discount_amount"]), 15000.0);

    create_voucher(
        &app,
        json!({
            "code": "FLAT",
            "discount_type": "fixed",
            "discount_value": 25000,
            "max_discount": 1000
        }),
    )
    .await;
    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/vouchers/validate",
            Some(json!({"code": "FLAT", "subtotal": 100000})),
        )
        .await;
    let body = json_body(response, StatusCode::OK).await;
    assert_eq!(num(&body["data"]["discount_amount"]), 25000.0);
}

#[tokio::test]
async fn checkout_with_voucher_increments_usage_until_limit() {
    let app = TestApp::new().await;
    let variant = app
        .seed_variant(1, "KOPI-S", "Kopi Susu", dec!(50000), 10)
        .await;
    let created = create_voucher(
        &app,
        json!({
            "code": "ONCE",
            "discount_type": "fixed",
            "discount_value": 5000,
            "usage_limit": 1
        }),
    )
    .await;
    let voucher_id = created["data"]["id"].as_i64().unwrap();

    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/sales",
            Some(json!({
                "items": [{"variant_id": variant.id, "quantity": 1}],
                "payments": [{"method": "cash", "amount": 50000}],
                "voucher_code": "once"
            })),
        )
        .await;
    let body = json_body(response, StatusCode::CREATED).await;
    // subtotal 50000 - 5000 voucher, 11% tax on 45000
    assert_eq!(num(&body["data"]["voucher_amount"]), 5000.0);
    assert_eq!(num(&body["data"]["total_amount"]), 49950.0);
    assert_eq!(body["data"]["voucher_code"], "ONCE");

    let fetched = app
        .request_branch1(Method::GET, &format!("/api/v1/vouchers/{voucher_id}"), None)
        .await;
    let body = json_body(fetched, StatusCode::OK).await;
    assert_eq!(body["data"]["usage_count"], 1);

    // Limit reached: next checkout with the code fails and rolls back
    let response = app
        .request_branch1(
            Method::POST,
            "/api/v1/sales",
            Some(json!({
                "items": [{"variant_id": variant.id, "quantity": 1}],
                "payments": [{"method": "cash", "amount": 60000}],
                "voucher_code": "ONCE"
            })),
        )
        .await;
    let body = json_body(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(body["message"], "Voucher usage limit reached");
}

#[tokio::test]
async fn update_and_delete_voucher() {
    let app = TestApp::new().await;
    let created = create_voucher(
        &app,
        json!({"code": "EDITME", "discount_type": "fixed", "discount_value": 5000}),
    )
    .await;
    let voucher_id = created["data"]["id"].as_i64().unwrap();

    let response = app
        .request_branch1(
            Method::PUT,
            &format!("/api/v1/vouchers/{voucher_id}"),
            Some(json!({"discount_value": 7500, "is_active": false})),
        )
        .await;
    let body = json_body(response, StatusCode::OK).await;
    assert_eq!(num(&body["data"]["discount_value"]), 7500.0);
    assert_eq!(body["data"]["is_active"], false);

    let response = app
        .request_branch1(
            Method::DELETE,
            &format!("/api/v1/vouchers/{voucher_id}"),
            None,
        )
        .await;
    json_body(response, StatusCode::OK).await;

    let response = app
        .request_branch1(Method::GET, &format!("/api/v1/vouchers/{voucher_id}"), None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Cross-branch access also reads as not-found
    let created = create_voucher(
        &app,
        json!({"code": "MINE", "discount_type": "fixed", "discount_value": 1000}),
    )
    .await;
    let voucher_id = created["data"]["id"].as_i64().unwrap();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/vouchers/{voucher_id}"),
            None,
            Some(2),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
