mod common;

use common::TestApp;
use paylink_service::services::ledger::{LedgerCall, TransactionStatus};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn paying_a_simulated_link_runs_the_webhook_flow() {
    let app = TestApp::spawn().await;

    let response = app.client.get(app.url("/simulator/42")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(
        response.text().await.unwrap(),
        "paid refId 221216-122218-000001 for 3.90 EUR"
    );

    let calls = app.sims.ledger.recording().await;
    assert_eq!(calls.len(), 1);
    let LedgerCall::Add(tx) = &calls[0] else {
        panic!("expected AddTransaction, got {:?}", calls[0]);
    };
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.effective_date, "2022-10-15");
    assert!(tx.comment.starts_with("CC orderId "));
    assert!(!tx.comment.contains("unknown"));
}

#[tokio::test]
async fn created_links_point_at_the_simulator() {
    let app = TestApp::spawn_with(|config| {
        config.service.public_url = "http://localhost:8080".to_string();
    })
    .await;

    let created = app
        .create_paylink(&json!({"debitor_id": 3, "amount_due": 500, "currency": "EUR", "vat_rate": 7.0}))
        .await;
    let body: serde_json::Value = created.json().await.unwrap();
    assert_eq!(body["link"], "http://localhost:8080/simulator/101");

    let response = app.client.get(app.url("/simulator/101")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.text().await.unwrap().ends_with("for 5.00 EUR"));
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let app = TestApp::spawn().await;

    let unknown = app.client.get(app.url("/simulator/7")).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let malformed = app.client.get(app.url("/simulator/x7")).send().await.unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(malformed.text().await.unwrap(), "bad id");
}
