use chrono::{DateTime, Utc};
use feinschmecker_core::ValidatedQuery;
use feinschmecker_query::QueryResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// Lifecycle of a background search.
///
/// `Pending -> Running -> {Succeeded, Retrying, Failed}` and `Retrying -> Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Succeeded)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Running)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Retrying => "RETRYING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Compilation, data or logic fault. Never retried.
    Permanent,
    /// Transient errors kept failing after the last allowed retry.
    RetryExhausted,
    /// The execution budget elapsed while running.
    TimeoutAbort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Everything known about one submitted search. The payload is self-contained, so any
/// attempt can be re-run from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: Uuid,
    pub state: TaskState,
    pub priority: Priority,
    pub payload: ValidatedQuery,
    pub attempts: u32,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
}

impl TaskRecord {
    pub fn new(payload: ValidatedQuery, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: TaskState::Pending,
            priority,
            payload,
            attempts: 0,
            retries: 0,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    /// Moves to `next`, ignoring transitions the state machine does not allow.
    pub fn transition(&mut self, next: TaskState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feinschmecker_core::{FilterSet, PageRequest};

    fn record() -> TaskRecord {
        TaskRecord::new(
            ValidatedQuery {
                filters: FilterSet::default(),
                page: PageRequest::new(1, 20),
            },
            Priority::Normal,
        )
    }

    #[test]
    fn state_machine_allows_only_documented_moves() {
        let mut r = record();
        assert!(!r.transition(TaskState::Succeeded));
        assert!(r.transition(TaskState::Running));
        assert!(r.transition(TaskState::Retrying));
        assert!(!r.transition(TaskState::Failed));
        assert!(r.transition(TaskState::Running));
        assert!(r.transition(TaskState::Failed));
        assert!(r.state.is_terminal());
        assert!(!r.transition(TaskState::Running));
    }

    #[test]
    fn record_serializes_state_in_upper_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["state"], "PENDING");
        assert!(json.get("result").is_none());
    }

    #[test]
    fn priorities_order_low_to_critical() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::Low < Priority::Normal);
    }
}
