use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Ok,
    Degraded,
    Error,
}

/// Outcome of the most recent fetch attempt, as far as health is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastAttempt {
    Never,
    Succeeded,
    Failed,
}

impl HealthState {
    /// Health is a function of these two inputs only. Nothing is counted or
    /// smoothed, so one success after any run of failures reads `Ok`.
    pub fn derive(has_entry: bool, last_attempt: LastAttempt) -> Self {
        match (last_attempt, has_entry) {
            (LastAttempt::Succeeded, _) => HealthState::Ok,
            (LastAttempt::Failed, true) => HealthState::Degraded,
            (LastAttempt::Failed, false) | (LastAttempt::Never, _) => HealthState::Error,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthStatus {
    pub state: HealthState,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}
