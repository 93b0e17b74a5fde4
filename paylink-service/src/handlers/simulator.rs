//! Local stand-in for the hosted payment page. Only routed when the PSP is
//! simulated: opening a simulated link pays it and fires the webhook flow.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::dtos::{WebhookEventDto, WebhookEventInvoice, WebhookEventTransaction};
use crate::services::psp::{Invoice, Payment, TransactionData};
use crate::AppState;

const SIMULATED_PAYMENT_TIME: &str = "2022-10-15 15:50:20";

pub async fn use_simulator(State(state): State<AppState>, Path(raw_id): Path<String>) -> Response {
    let Ok(id) = raw_id.parse::<u64>() else {
        tracing::warn!(id = %raw_id, "simulator received invalid id");
        return plain(StatusCode::BAD_REQUEST, "bad id".to_string());
    };

    let Some(simulator) = state.paylinks.dependencies().psp_simulator.clone() else {
        return plain(StatusCode::NOT_FOUND, "not found".to_string());
    };

    let Some(paylink) = simulator.link(id).await else {
        tracing::warn!(
            paylink_id = id,
            "simulator paylink not found (may be lost from memory after restart)"
        );
        return plain(StatusCode::NOT_FOUND, "not found".to_string());
    };

    let transaction_id = simulator
        .inject_transaction(TransactionData {
            uuid: Uuid::new_v4().to_string(),
            amount: paylink.amount,
            status: "confirmed".to_string(),
            time: SIMULATED_PAYMENT_TIME.to_string(),
            lang: "de".to_string(),
            payment: Payment {
                brand: "visa".to_string(),
            },
            psp: "Simulated_PayEngine".to_string(),
            psp_id: 29,
            mode: "TEST".to_string(),
            reference_id: paylink.reference_id.clone(),
            invoice: Invoice {
                currency: paylink.currency.clone(),
                ..Default::default()
            },
            ..Default::default()
        })
        .await;

    let event = WebhookEventDto {
        transaction: WebhookEventTransaction {
            id: transaction_id,
            invoice: WebhookEventInvoice {
                number: String::new(),
                reference_id: paylink.reference_id.clone(),
                payment_request_id: i64::try_from(id).unwrap_or_default(),
            },
        },
    };

    if let Err(e) = state.paylinks.handle_webhook(&event).await {
        tracing::warn!(error = %e, reference_id = %paylink.reference_id, "simulated payment failed to reconcile");
        return plain(
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to report to local webhook - see log for details".to_string(),
        );
    }

    let message = format!(
        "paid refId {} for {:.2} {}",
        paylink.reference_id,
        paylink.amount as f64 / 100.0,
        paylink.currency
    );
    tracing::info!("simulator {}", message);
    plain(StatusCode::OK, message)
}

fn plain(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        body,
    )
        .into_response()
}
