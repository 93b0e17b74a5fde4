use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AuditError, AuditLog};
use crate::models::ProtocolEntry;

#[derive(Default)]
struct State {
    entries: Vec<ProtocolEntry>,
    simulate_error: Option<AuditError>,
}

#[derive(Default)]
pub struct InMemoryAuditLog {
    state: Mutex<State>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<ProtocolEntry> {
        self.state.lock().await.entries.clone()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.simulate_error = None;
    }

    pub async fn simulate_error(&self, err: Option<AuditError>) {
        self.state.lock().await.simulate_error = err;
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn write_entry(&self, entry: &ProtocolEntry) -> Result<(), AuditError> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.simulate_error {
            return Err(err.clone());
        }
        state.entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProtocolKind;

    #[tokio::test]
    async fn entries_are_appended_in_order() {
        let log = InMemoryAuditLog::new();
        for message in ["first", "second"] {
            log.write_entry(&ProtocolEntry::new(
                ProtocolKind::Success,
                "ref",
                42,
                message,
                "",
                "abcd1234",
            ))
            .await
            .unwrap();
        }

        let messages: Vec<_> = log.entries().await.into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
    }
}
