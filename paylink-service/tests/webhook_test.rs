mod common;

use common::{webhook_event, TestApp};
use paylink_service::models::ProtocolKind;
use paylink_service::services::ledger::{
    LedgerCall, LedgerError, Transaction, TransactionStatus, TransactionType,
};
use paylink_service::services::notifier::NotifyError;
use paylink_service::services::psp::simulator::{SEEDED_PAYLINK_ID, SEEDED_REFERENCE_ID};
use paylink_service::services::psp::PspError;
use reqwest::StatusCode;
use serde_json::{json, Value};

const SEEDED_ID: i64 = SEEDED_PAYLINK_ID as i64;

fn existing(status: TransactionStatus) -> Transaction {
    Transaction {
        debitor_id: 1,
        transaction_identifier: SEEDED_REFERENCE_ID.to_string(),
        transaction_type: TransactionType::Due,
        status,
        ..Default::default()
    }
}

#[tokio::test]
async fn confirmed_without_ledger_record_creates_pending_payment() {
    let app = TestApp::spawn().await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = app.sims.ledger.recording().await;
    assert_eq!(calls.len(), 1);
    let LedgerCall::Add(tx) = &calls[0] else {
        panic!("expected AddTransaction, got {:?}", calls[0]);
    };
    assert_eq!(tx.amount.gross_cent, 390);
    assert_eq!(tx.amount.currency, "EUR");
    assert_eq!(tx.status, TransactionStatus::Pending);

    let entries = app.sims.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ProtocolKind::Success);
    assert_eq!(entries[0].message, "webhook query-pay-link");
    assert_eq!(entries[0].details, "status=confirmed amount=390");
}

#[tokio::test]
async fn confirmed_with_pending_record_updates_to_valid() {
    let app = TestApp::spawn().await;
    app.sims
        .ledger
        .insert(existing(TransactionStatus::Pending))
        .await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = app.sims.ledger.recording().await;
    assert_eq!(calls.len(), 1);
    let LedgerCall::Update(tx) = &calls[0] else {
        panic!("expected UpdateTransaction, got {:?}", calls[0]);
    };
    assert_eq!(tx.status, TransactionStatus::Valid);
    assert_eq!(tx.amount.gross_cent, 390);
    assert_eq!(tx.debitor_id, 1);
    assert_eq!(tx.transaction_type, TransactionType::Due);
}

#[tokio::test]
async fn confirmed_with_valid_record_only_notifies() {
    let app = TestApp::spawn().await;
    app.sims
        .ledger
        .insert(existing(TransactionStatus::Valid))
        .await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.sims.ledger.recording().await.is_empty());
    let mails = app.sims.mail.sent().await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].variable("status"), "abort-update-for-valid");
}

#[tokio::test]
async fn cancelled_is_ignored_quietly() {
    let app = TestApp::spawn().await;
    app.sims.psp.set_status(SEEDED_PAYLINK_ID, "cancelled").await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.ledger_calls().await, 0);
    assert!(app.sims.mail.sent().await.is_empty());
    assert_eq!(app.sims.audit.entries().await.len(), 1);
}

#[tokio::test]
async fn chargeback_needs_an_operator() {
    let app = TestApp::spawn().await;
    app.sims.psp.set_status(SEEDED_PAYLINK_ID, "chargeback").await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.ledger_calls().await, 0);
    let mails = app.sims.mail.sent().await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].variable("status"), "chargeback");
    assert_eq!(mails[0].variable("referenceId"), SEEDED_REFERENCE_ID);
    assert_eq!(mails[0].to, vec![common::NOTIFY_MAIL]);
}

#[tokio::test]
async fn repeated_delivery_books_once() {
    let app = TestApp::spawn().await;
    let event = webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID);

    for _ in 0..3 {
        let response = app.post_webhook(&event).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let calls = app.sims.ledger.recording().await;
    let adds = calls
        .iter()
        .filter(|c| matches!(c, LedgerCall::Add(_)))
        .count();
    let updates = calls
        .iter()
        .filter(|c| matches!(c, LedgerCall::Update(_)))
        .count();
    assert_eq!(adds, 1);
    assert_eq!(updates, 1);
    assert_eq!(
        app.sims
            .ledger
            .get(SEEDED_REFERENCE_ID)
            .await
            .unwrap()
            .status,
        TransactionStatus::Valid
    );
}

#[tokio::test]
async fn foreign_reference_prefix_is_acknowledged_without_booking() {
    let app = TestApp::spawn_with(|config| {
        config.payment.required_ref_id_prefix = "221216".to_string();
    })
    .await;
    let mut link = app.sims.psp.link(SEEDED_PAYLINK_ID).await.unwrap();
    link.reference_id = "230001-122218-000001".to_string();
    app.sims.psp.put_link(link).await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, "230001-122218-000001"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.ledger_calls().await, 0);
    let entries = app.sims.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ProtocolKind::Error);
    assert_eq!(entries[0].message, "webhook ref-id-prefix");
}

#[tokio::test]
async fn reference_id_from_create_passes_the_cross_check() {
    let app = TestApp::spawn().await;

    let created = app
        .create_paylink(&json!({"debitor_id": 7, "amount_due": 1200, "currency": "EUR", "vat_rate": 19.0}))
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let location = created.headers()["location"].to_str().unwrap().to_string();
    let body: Value = created.json().await.unwrap();
    let reference_id = body["reference_id"].as_str().unwrap().to_string();
    let id: i64 = location.rsplit('/').next().unwrap().parse().unwrap();

    let response = app.post_webhook(&webhook_event(id, &reference_id)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = app.sims.ledger.recording().await;
    assert_eq!(calls.len(), 1);
    let LedgerCall::Add(tx) = &calls[0] else {
        panic!("expected AddTransaction, got {:?}", calls[0]);
    };
    assert_eq!(tx.transaction_identifier, reference_id);
    assert_eq!(tx.amount.gross_cent, 1200);
}

#[tokio::test]
async fn reference_id_mismatch_is_unprocessable() {
    let app = TestApp::spawn().await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, "221216-122218-000099"))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.refid.mismatch");
    assert_eq!(app.ledger_calls().await, 0);
    let entries = app.sims.audit.entries().await;
    assert_eq!(entries[0].message, "webhook ref-id-mismatch");
}

#[tokio::test]
async fn malformed_body_is_rejected_without_downstream_calls() {
    let app = TestApp::spawn().await;

    let response = app.post_webhook_raw("{\"transaction\": ".to_string()).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.parse.error");
    assert!(app.sims.psp.recording().await.is_empty());
    assert_eq!(app.ledger_calls().await, 0);
    assert!(app.sims.mail.sent().await.is_empty());
    assert!(app.sims.audit.entries().await.is_empty());
}

#[tokio::test]
async fn wrong_secret_is_unauthorized() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(app.url("/api/rest/v1/webhook/guessed-secret"))
        .json(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.sims.psp.recording().await.is_empty());
}

#[tokio::test]
async fn invalid_paylink_id_is_bad_request_but_test_button_is_ok() {
    let app = TestApp::spawn().await;

    let response = app.post_webhook(&webhook_event(0, "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.data.invalid");

    let mut test_button = webhook_event(0, "");
    test_button["transaction"]["invoice"]["number"] = json!("123456");
    let response = app.post_webhook(&test_button).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.sims.psp.recording().await.is_empty());
}

#[tokio::test]
async fn psp_errors_map_to_status_codes() {
    let app = TestApp::spawn().await;

    let response = app.post_webhook(&webhook_event(9999, "whatever")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.sims
        .psp
        .simulate_error(Some(PspError::Downstream("timeout".to_string())))
        .await;
    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.downstream.error");
}

#[tokio::test]
async fn failing_ledger_create_is_reported() {
    let app = TestApp::spawn().await;
    app.sims
        .ledger
        .simulate_write_error(Some(LedgerError::Downstream("ledger down".to_string())))
        .await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.downstream.error");
    assert_eq!(app.sims.ledger.lookups().await, vec![SEEDED_REFERENCE_ID]);
    assert!(app.sims.ledger.get(SEEDED_REFERENCE_ID).await.is_none());
    let statuses: Vec<String> = app
        .sims
        .mail
        .sent()
        .await
        .iter()
        .map(|m| m.variable("status").to_string())
        .collect();
    assert!(statuses.contains(&"create-missing-err".to_string()));
}

#[tokio::test]
async fn failing_ledger_update_is_reported() {
    let app = TestApp::spawn().await;
    app.sims
        .ledger
        .insert(existing(TransactionStatus::Pending))
        .await;
    app.sims
        .ledger
        .simulate_write_error(Some(LedgerError::Downstream("ledger down".to_string())))
        .await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "webhook.downstream.error");
    assert_eq!(
        app.sims
            .ledger
            .get(SEEDED_REFERENCE_ID)
            .await
            .unwrap()
            .status,
        TransactionStatus::Pending
    );
    let mails = app.sims.mail.sent().await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].variable("status"), "update-tx-err");
    assert_eq!(
        mails[0].variable("referenceId"),
        format!("refId: {}", SEEDED_REFERENCE_ID)
    );
}

#[tokio::test]
async fn failing_mail_does_not_fail_the_webhook() {
    let app = TestApp::spawn().await;
    app.sims
        .mail
        .simulate_error(Some(NotifyError::Downstream("smtp down".to_string())))
        .await;
    app.sims.psp.set_status(SEEDED_PAYLINK_ID, "chargeback").await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.ledger_calls().await, 0);
    assert!(app.sims.mail.sent().await.is_empty());
    let entries = app.sims.audit.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, ProtocolKind::Success);
    assert_eq!(entries[0].details, "status=chargeback amount=390");
}

#[tokio::test]
async fn failing_mail_keeps_the_valid_guard() {
    let app = TestApp::spawn().await;
    app.sims
        .ledger
        .insert(existing(TransactionStatus::Valid))
        .await;
    app.sims
        .mail
        .simulate_error(Some(NotifyError::Downstream("smtp down".to_string())))
        .await;

    let response = app
        .post_webhook(&webhook_event(SEEDED_ID, SEEDED_REFERENCE_ID))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(app.sims.ledger.recording().await.is_empty());
    assert_eq!(app.sims.ledger.lookups().await.len(), 1);
}

#[tokio::test]
async fn null_fields_in_the_payload_are_tolerated() {
    let app = TestApp::spawn().await;

    let response = app
        .post_webhook_raw(format!(
            r#"{{"transaction":{{"id":4711,"uuid":null,"invoice":{{"number":null,"referenceId":"{}","paymentRequestId":{},"products":null}}}}}}"#,
            SEEDED_REFERENCE_ID, SEEDED_ID
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let calls = app.sims.ledger.recording().await;
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], LedgerCall::Add(_)));
}
