use std::collections::BTreeSet;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{AttendeeDirectory, AttendeeDto, DirectoryError};

pub const SIMULATED_EMAIL: &str = "jsquirrel_github_9a6d@packetloss.de";

#[derive(Default)]
struct SimulatorState {
    recording: Vec<String>,
    unknown: BTreeSet<u64>,
    simulate_error: Option<DirectoryError>,
}

/// Knows every attendee id except those marked unknown.
#[derive(Default)]
pub struct DirectorySimulator {
    state: Mutex<SimulatorState>,
}

impl DirectorySimulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn recording(&self) -> Vec<String> {
        self.state.lock().await.recording.clone()
    }

    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.recording.clear();
        state.unknown.clear();
        state.simulate_error = None;
    }

    pub async fn simulate_error(&self, err: Option<DirectoryError>) {
        self.state.lock().await.simulate_error = err;
    }

    pub async fn mark_unknown(&self, id: u64) {
        self.state.lock().await.unknown.insert(id);
    }
}

#[async_trait]
impl AttendeeDirectory for DirectorySimulator {
    async fn get_attendee(&self, id: u64) -> Result<AttendeeDto, DirectoryError> {
        let mut state = self.state.lock().await;
        if let Some(err) = &state.simulate_error {
            return Err(err.clone());
        }
        state.recording.push(format!("GetAttendee {}", id));
        if state.unknown.contains(&id) {
            return Err(DirectoryError::NotFound);
        }

        Ok(AttendeeDto {
            id,
            nickname: "Squirrel".to_string(),
            first_name: "John".to_string(),
            last_name: "Squirrel".to_string(),
            street: "Teststrasse 24".to_string(),
            zip: "12345".to_string(),
            city: "Berlin".to_string(),
            country: "DE".to_string(),
            email: SIMULATED_EMAIL.to_string(),
            registration_language: "en-US".to_string(),
        })
    }
}
