use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    PaymentLinkCreateRequest, PaymentLinkCreated, PaymentLinkInvoice, PaymentLinkQueryResponse,
    PaymentProvider, PspError, TransactionData,
};

/// Payment link present in every fresh simulator.
pub const SEEDED_PAYLINK_ID: u64 = 42;
pub const SEEDED_REFERENCE_ID: &str = "221216-122218-000001";

const SIMULATED_CREATED_AT: i64 = 1418392958;

#[derive(Default)]
struct SimulatorState {
    recording: Vec<String>,
    simulate_error: Option<PspError>,
    links: BTreeMap<u64, PaymentLinkQueryResponse>,
    transactions: Vec<TransactionData>,
}

/// In-memory PSP. Every created link is immediately `confirmed`.
pub struct PspSimulator {
    public_url: String,
    id_sequence: AtomicU64,
    state: Mutex<SimulatorState>,
}

impl PspSimulator {
    pub fn new(public_url: impl Into<String>) -> Self {
        let public_url = public_url.into();
        let mut links = BTreeMap::new();
        links.insert(
            SEEDED_PAYLINK_ID,
            PaymentLinkQueryResponse {
                id: SEEDED_PAYLINK_ID,
                status: "confirmed".to_string(),
                reference_id: SEEDED_REFERENCE_ID.to_string(),
                link: simulated_link(&public_url, SEEDED_PAYLINK_ID),
                name: "Online-Shop payment #001".to_string(),
                title: "Online-Shop payment".to_string(),
                description: "some payment description".to_string(),
                purpose: BTreeMap::from([("1".to_string(), "some payment purpose".to_string())]),
                amount: 390,
                currency: "EUR".to_string(),
                created_at: SIMULATED_CREATED_AT,
                ..Default::default()
            },
        );

        Self {
            public_url,
            id_sequence: AtomicU64::new(100),
            state: Mutex::new(SimulatorState {
                links,
                ..Default::default()
            }),
        }
    }

    fn next_id(&self) -> u64 {
        self.id_sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Calls seen so far, e.g. `QueryPaymentLink 42`.
    pub async fn recording(&self) -> Vec<String> {
        self.state.lock().await.recording.clone()
    }

    /// Forget recorded calls and any injected error. Links are kept.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.recording.clear();
        state.simulate_error = None;
    }

    /// Make every following call fail with `err` until reset.
    pub async fn simulate_error(&self, err: Option<PspError>) {
        self.state.lock().await.simulate_error = err;
    }

    /// Add or replace a link as if the PSP had it.
    pub async fn put_link(&self, link: PaymentLinkQueryResponse) {
        self.state.lock().await.links.insert(link.id, link);
    }

    pub async fn link(&self, id: u64) -> Option<PaymentLinkQueryResponse> {
        self.state.lock().await.links.get(&id).cloned()
    }

    /// Change the status of a stored link. Returns false for unknown ids.
    pub async fn set_status(&self, id: u64, status: &str) -> bool {
        match self.state.lock().await.links.get_mut(&id) {
            Some(link) => {
                link.status = status.to_string();
                true
            }
            None => false,
        }
    }

    /// Record a payment and attach it to the link with the same reference id.
    /// Returns the assigned transaction id.
    pub async fn inject_transaction(&self, mut tx: TransactionData) -> i64 {
        let id = self.next_id() as i64;
        tx.id = id;

        let mut state = self.state.lock().await;
        state.transactions.push(tx.clone());
        for (paylink_id, link) in state.links.iter_mut() {
            if link.reference_id == tx.reference_id {
                link.invoices = vec![PaymentLinkInvoice {
                    reference_id: tx.reference_id.clone(),
                    payment_request_id: *paylink_id,
                    currency: link.currency.clone(),
                    amount: link.amount,
                    transactions: vec![tx.clone()],
                }];
            }
        }
        id
    }

    async fn begin(&self, call: String) -> Result<tokio::sync::MutexGuard<'_, SimulatorState>, PspError> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.simulate_error {
            return Err(err.clone());
        }
        state.recording.push(call);
        Ok(state)
    }
}

fn simulated_link(public_url: &str, id: u64) -> String {
    if public_url.is_empty() {
        format!("http://localhost:1111/some/paylink/{}", id)
    } else {
        format!("{}/simulator/{}", public_url, id)
    }
}

#[async_trait]
impl PaymentProvider for PspSimulator {
    async fn create_payment_link(
        &self,
        request: &PaymentLinkCreateRequest,
    ) -> Result<PaymentLinkCreated, PspError> {
        let mut state = self
            .begin(format!(
                "CreatePaymentLink {} {} {} {}",
                request.reference_id, request.amount, request.currency, request.email
            ))
            .await?;

        let id = self.next_id();
        let link = simulated_link(&self.public_url, id);
        state.links.insert(
            id,
            PaymentLinkQueryResponse {
                id,
                status: "confirmed".to_string(),
                reference_id: request.reference_id.clone(),
                link: link.clone(),
                name: "Online-Shop payment #001".to_string(),
                title: request.title.clone(),
                description: request.description.clone(),
                purpose: BTreeMap::from([("1".to_string(), request.purpose.clone())]),
                amount: request.amount,
                vat_rate: Some(request.vat_rate),
                currency: request.currency.clone(),
                created_at: SIMULATED_CREATED_AT,
                ..Default::default()
            },
        );

        Ok(PaymentLinkCreated {
            id,
            reference_id: request.reference_id.clone(),
            link,
        })
    }

    async fn query_payment_link(&self, id: u64) -> Result<PaymentLinkQueryResponse, PspError> {
        let state = self.begin(format!("QueryPaymentLink {}", id)).await?;
        state.links.get(&id).cloned().ok_or(PspError::NotFound)
    }

    async fn delete_payment_link(&self, id: u64) -> Result<(), PspError> {
        let mut state = self.begin(format!("DeletePaymentLink {}", id)).await?;
        state.links.remove(&id).map(|_| ()).ok_or(PspError::NotFound)
    }

    async fn query_transactions(
        &self,
        time_greater_than: DateTime<Utc>,
        time_less_than: DateTime<Utc>,
    ) -> Result<Vec<TransactionData>, PspError> {
        let state = self
            .begin(format!(
                "QueryTransactions {} <= t <= {}",
                time_greater_than.to_rfc3339(),
                time_less_than.to_rfc3339()
            ))
            .await?;
        Ok(state.transactions.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(reference_id: &str) -> PaymentLinkCreateRequest {
        PaymentLinkCreateRequest {
            title: "t".to_string(),
            description: "d".to_string(),
            psp: 1,
            reference_id: reference_id.to_string(),
            order_id: reference_id.replace('-', ""),
            purpose: "p".to_string(),
            amount: 1200,
            vat_rate: 19.0,
            currency: "EUR".to_string(),
            sku: "registration".to_string(),
            email: "a@b.c".to_string(),
        }
    }

    #[tokio::test]
    async fn seeded_link_is_available() {
        let sim = PspSimulator::new("");
        let link = sim.query_payment_link(SEEDED_PAYLINK_ID).await.unwrap();

        assert_eq!(link.reference_id, SEEDED_REFERENCE_ID);
        assert_eq!(link.amount, 390);
        assert_eq!(sim.recording().await, vec!["QueryPaymentLink 42"]);
    }

    #[tokio::test]
    async fn ids_are_assigned_in_sequence() {
        let sim = PspSimulator::new("http://localhost:8080");

        let first = sim.create_payment_link(&request("a")).await.unwrap();
        let second = sim.create_payment_link(&request("b")).await.unwrap();

        assert_eq!(first.id, 101);
        assert_eq!(second.id, 102);
        assert_eq!(first.link, "http://localhost:8080/simulator/101");
    }

    #[tokio::test]
    async fn delete_removes_and_then_reports_not_found() {
        let sim = PspSimulator::new("");
        sim.delete_payment_link(SEEDED_PAYLINK_ID).await.unwrap();

        assert_eq!(
            sim.delete_payment_link(SEEDED_PAYLINK_ID).await.unwrap_err(),
            PspError::NotFound
        );
    }

    #[tokio::test]
    async fn injected_errors_apply_until_reset() {
        let sim = PspSimulator::new("");
        sim.simulate_error(Some(PspError::Downstream("boom".to_string())))
            .await;

        assert!(sim.query_payment_link(SEEDED_PAYLINK_ID).await.is_err());
        assert!(sim.recording().await.is_empty());

        sim.reset().await;
        assert!(sim.query_payment_link(SEEDED_PAYLINK_ID).await.is_ok());
    }

    #[tokio::test]
    async fn injected_transaction_attaches_to_link() {
        let sim = PspSimulator::new("");
        let tx_id = sim
            .inject_transaction(TransactionData {
                uuid: "u-1".to_string(),
                reference_id: SEEDED_REFERENCE_ID.to_string(),
                ..Default::default()
            })
            .await;

        let link = sim.link(SEEDED_PAYLINK_ID).await.unwrap();
        let tx = link.latest_transaction().unwrap();
        assert_eq!(tx.id, tx_id);
        assert_eq!(tx.uuid, "u-1");
    }
}
