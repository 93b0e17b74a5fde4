use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{MailSendDto, NotifyError, Notifier};

#[derive(Default)]
struct SimulatorState {
    sent: Vec<MailSendDto>,
    simulate_error: Option<NotifyError>,
}

/// Keeps sent mails in memory.
#[derive(Default)]
pub struct MailSimulator {
    state: Mutex<SimulatorState>,
}

impl MailSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<MailSendDto> {
        self.state.lock().await.sent.clone()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.sent.clear();
        state.simulate_error = None;
    }

    pub async fn simulate_error(&self, err: Option<NotifyError>) {
        self.state.lock().await.simulate_error = err;
    }
}

#[async_trait]
impl Notifier for MailSimulator {
    async fn send(&self, mail: &MailSendDto) -> Result<(), NotifyError> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.simulate_error {
            return Err(err.clone());
        }
        state.sent.push(mail.clone());
        Ok(())
    }
}
