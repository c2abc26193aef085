//! HTTP API tests
//!
//! Requests go through the full router (extractors, handlers, error mapping)
//! backed by the in-memory store.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use agrivault_server::collateral::CollateralService;
use agrivault_server::config::ApprovalMode;
use agrivault_server::loan::{policy_for, LoanLedger};
use agrivault_server::routes::api_router;
use agrivault_server::services::ValuationPolicy;
use agrivault_server::state::AppState;
use agrivault_server::store::MemoryStore;

fn app(mode: ApprovalMode) -> Router {
    let store = Arc::new(MemoryStore::new());
    let ledger = LoanLedger::new(store.clone(), store.clone(), policy_for(mode));
    let receipts = CollateralService::new(store.clone(), ValuationPolicy::default(), 5);
    api_router(AppState::new(Arc::new(ledger), Arc::new(receipts), store, None))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    caller: Option<(&str, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((user_id, role)) = caller {
        builder = builder.header("x-user-id", user_id).header("x-user-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

const FARMER: Option<(&str, &str)> = Some(("FRM001", "farmer"));
const OTHER_FARMER: Option<(&str, &str)> = Some(("FRM002", "farmer"));
const MANAGER: Option<(&str, &str)> = Some(("MGR001", "warehouse_manager"));

fn deposit() -> Value {
    json!({
        "owner_id": "FRM001",
        "warehouse_name": "Central Grain Depot",
        "warehouse_location": "Indore, MP",
        "crop_type": "wheat",
        "variety": "Sharbati",
        "quantity": 40,
        "quality_grade": "A",
        "moisture_content": "11.5",
        "estimated_value": 100000,
        "price_per_unit": 2500,
        "storage_rate": 10,
        "expected_storage_months": 6
    })
}

async fn register_receipt(app: &Router) -> String {
    let (status, body) = send(app, "POST", "/api/collateral", MANAGER, Some(deposit())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["whr_id"].as_str().unwrap().to_string()
}

fn loan_request(whr_id: &str, amount: i64) -> Value {
    json!({
        "collateral_id": whr_id,
        "requested_amount": amount,
        "purpose": "farming_inputs",
        "tenure_months": 12
    })
}

#[tokio::test]
async fn test_health_reports_memory_store() {
    let app = app(ApprovalMode::Auto);
    let (status, body) = send(&app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["approval_policy"], "auto");
}

#[tokio::test]
async fn test_only_staff_issue_receipts() {
    let app = app(ApprovalMode::Auto);

    let (status, body) = send(&app, "POST", "/api/collateral", FARMER, Some(deposit())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = send(&app, "POST", "/api/collateral", None, Some(deposit())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let whr_id = register_receipt(&app).await;
    assert!(whr_id.starts_with("WHR"));

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/collateral/{}/eligibility", whr_id),
        FARMER,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["eligible_amount"], 70000);
    assert_eq!(body["data"]["loanable"], true);

    let (status, _) = send(&app, "GET", &format!("/api/collateral/{}", whr_id), OTHER_FARMER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

fn receipt_ids(body: &Value) -> Vec<String> {
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["whr_id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_receipts_listed_for_owner_and_issuer() {
    let app = app(ApprovalMode::Auto);
    let spare = register_receipt(&app).await;
    let pledged = register_receipt(&app).await;

    let (status, body) =
        send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&pledged, 50_000))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = send(&app, "GET", "/api/collateral", FARMER, None).await;
    assert_eq!(status, StatusCode::OK);
    let mut owned = receipt_ids(&body);
    owned.sort();
    let mut expected = vec![spare.clone(), pledged.clone()];
    expected.sort();
    assert_eq!(owned, expected);

    let (_, body) = send(&app, "GET", "/api/collateral?status=active", FARMER, None).await;
    assert_eq!(receipt_ids(&body), vec![spare]);
    let (_, body) = send(&app, "GET", "/api/collateral?status=locked_for_loan", FARMER, None).await;
    assert_eq!(receipt_ids(&body), vec![pledged.clone()]);

    let (status, body) = send(&app, "GET", "/api/collateral", OTHER_FARMER, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(receipt_ids(&body).is_empty());

    let (_, body) = send(&app, "GET", "/api/collateral", MANAGER, None).await;
    assert_eq!(receipt_ids(&body).len(), 2);

    let (status, _) = send(&app, "GET", "/api/collateral", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        "GET",
        &format!("/api/collateral/{}/eligibility", pledged),
        FARMER,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["collateral_id"], pledged.as_str());
    assert_eq!(body["data"]["loanable"], false);
}

#[tokio::test]
async fn test_loan_lifecycle_over_http() {
    let app = app(ApprovalMode::Auto);
    let whr_id = register_receipt(&app).await;

    let (status, _) = send(&app, "POST", "/api/loans", None, Some(loan_request(&whr_id, 70_000))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) =
        send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&whr_id, 70_000))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["principal_amount"], 70000);
    assert_eq!(body["data"]["total_amount"], 78400);
    let loan_id = body["data"]["loan_id"].as_str().unwrap().to_string();

    // Receipt is taken
    let (status, body) =
        send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&whr_id, 10_000))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INELIGIBLE_COLLATERAL");

    let repay_uri = format!("/api/loans/{}/repay", loan_id);

    let (status, body) = send(&app, "POST", &repay_uri, FARMER, Some(json!({ "amount": 78401 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, _) = send(&app, "POST", &repay_uri, OTHER_FARMER, Some(json!({ "amount": 100 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        "POST",
        &repay_uri,
        FARMER,
        Some(json!({ "amount": 78400, "method": "upi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["remaining_amount"], 0);
    assert_eq!(body["data"]["payment"]["method"], "upi");

    let (_, body) = send(&app, "GET", &format!("/api/collateral/{}", whr_id), FARMER, None).await;
    assert_eq!(body["data"]["status"], "active");

    let (status, body) = send(&app, "GET", "/api/loans", FARMER, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/loans/LN2401NOSUCH", FARMER, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_manual_underwriting_over_http() {
    let app = app(ApprovalMode::Manual);
    let whr_id = register_receipt(&app).await;

    let (status, body) =
        send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&whr_id, 50_000))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "under_review");
    let loan_id = body["data"]["loan_id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, "POST", &format!("/api/loans/{}/approve", loan_id), FARMER, None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, "POST", &format!("/api/loans/{}/disburse", loan_id), MANAGER, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(
        &app,
        "POST",
        &format!("/api/loans/{}/approve", loan_id),
        MANAGER,
        Some(json!({ "comments": "Grade verified at depot" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["approval_comments"], "Grade verified at depot");

    let steps = [
        ("disburse", "disbursed"),
        ("activate", "active"),
        ("overdue", "overdue"),
        ("default", "defaulted"),
    ];
    for (step, expected) in steps {
        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/loans/{}/{}", loan_id, step),
            MANAGER,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
        assert_eq!(body["data"]["status"], expected);
    }

    let (_, body) = send(&app, "GET", &format!("/api/collateral/{}", whr_id), MANAGER, None).await;
    assert_eq!(body["data"]["status"], "locked_for_loan");
}

#[tokio::test]
async fn test_rejecting_requires_reason() {
    let app = app(ApprovalMode::Manual);
    let whr_id = register_receipt(&app).await;

    let (_, body) = send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&whr_id, 50_000))).await;
    let loan_id = body["data"]["loan_id"].as_str().unwrap().to_string();
    let uri = format!("/api/loans/{}/reject", loan_id);

    let (status, _) = send(&app, "POST", &uri, MANAGER, Some(json!({ "reason": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "POST",
        &uri,
        MANAGER,
        Some(json!({ "reason": "Receipt under dispute" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "rejected");
    assert_eq!(body["data"]["rejection_reason"], "Receipt under dispute");
}

#[tokio::test]
async fn test_risk_classification_and_credit_scores() {
    let app = app(ApprovalMode::Auto);

    let (status, body) = send(&app, "GET", "/api/risk/750", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["risk_category"], "low");

    let (_, body) = send(&app, "GET", "/api/risk/649", None, None).await;
    assert_eq!(body["data"]["risk_category"], "high");

    let (status, _) = send(
        &app,
        "PUT",
        "/api/borrowers/FRM001/credit-score",
        FARMER,
        Some(json!({ "credit_score": 800 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        "PUT",
        "/api/borrowers/FRM001/credit-score",
        MANAGER,
        Some(json!({ "credit_score": 1200 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        "PUT",
        "/api/borrowers/FRM001/credit-score",
        MANAGER,
        Some(json!({ "credit_score": 780 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["risk_category"], "low");

    let whr_id = register_receipt(&app).await;
    let (_, body) = send(&app, "POST", "/api/loans", FARMER, Some(loan_request(&whr_id, 10_000))).await;
    assert_eq!(body["data"]["credit_score"], 780);
    assert_eq!(body["data"]["risk_category"], "low");
}
