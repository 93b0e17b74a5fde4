use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Ledger, LedgerError, Transaction};

/// A write performed against the simulated ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCall {
    Add(Transaction),
    Update(Transaction),
}

#[derive(Default)]
struct SimulatorState {
    recording: Vec<LedgerCall>,
    lookups: Vec<String>,
    transactions: BTreeMap<String, Transaction>,
    simulate_error: Option<LedgerError>,
    simulate_write_error: Option<LedgerError>,
}

impl SimulatorState {
    fn write_error(&self) -> Option<LedgerError> {
        self.simulate_error
            .clone()
            .or_else(|| self.simulate_write_error.clone())
    }
}

/// In-memory ledger keyed by transaction identifier.
#[derive(Default)]
pub struct LedgerSimulator {
    state: Mutex<SimulatorState>,
}

impl LedgerSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes seen so far. Lookups are tracked separately in [`Self::lookups`].
    pub async fn recording(&self) -> Vec<LedgerCall> {
        self.state.lock().await.recording.clone()
    }

    pub async fn lookups(&self) -> Vec<String> {
        self.state.lock().await.lookups.clone()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.recording.clear();
        state.lookups.clear();
        state.simulate_error = None;
        state.simulate_write_error = None;
    }

    /// Make every following call fail with `err` until reset.
    pub async fn simulate_error(&self, err: Option<LedgerError>) {
        self.state.lock().await.simulate_error = err;
    }

    /// Make adds and updates fail with `err`, lookups keep working.
    pub async fn simulate_write_error(&self, err: Option<LedgerError>) {
        self.state.lock().await.simulate_write_error = err;
    }

    /// Seed a transaction without recording a write.
    pub async fn insert(&self, transaction: Transaction) {
        self.state
            .lock()
            .await
            .transactions
            .insert(transaction.transaction_identifier.clone(), transaction);
    }

    pub async fn get(&self, reference_id: &str) -> Option<Transaction> {
        self.state
            .lock()
            .await
            .transactions
            .get(reference_id)
            .cloned()
    }
}

#[async_trait]
impl Ledger for LedgerSimulator {
    async fn add_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.write_error() {
            return Err(err);
        }
        state.recording.push(LedgerCall::Add(transaction.clone()));
        state.transactions.insert(
            transaction.transaction_identifier.clone(),
            transaction.clone(),
        );
        Ok(())
    }

    async fn update_transaction(&self, transaction: &Transaction) -> Result<(), LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.write_error() {
            return Err(err);
        }
        state.recording.push(LedgerCall::Update(transaction.clone()));
        match state
            .transactions
            .get_mut(&transaction.transaction_identifier)
        {
            Some(existing) => {
                *existing = transaction.clone();
                Ok(())
            }
            None => Err(LedgerError::NotFound),
        }
    }

    async fn get_transaction_by_reference_id(
        &self,
        reference_id: &str,
    ) -> Result<Transaction, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.simulate_error {
            return Err(err.clone());
        }
        state.lookups.push(reference_id.to_string());
        state
            .transactions
            .get(reference_id)
            .cloned()
            .ok_or(LedgerError::NotFound)
    }
}
