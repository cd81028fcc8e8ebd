//! Core run types shared by both orchestration flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bus::Event;

/// Unique run identifier.
pub type RunId = Uuid;

/// Position of a run in its state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunState {
    Started,
    AwaitingAction,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Result of one streaming run, mirrored by exactly one terminal event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of approval submissions made during the run.
    #[serde(default)]
    pub actions: usize,
    pub finished_at: DateTime<Utc>,
}

impl RunOutcome {
    pub fn completed(run_id: RunId, text: impl Into<String>, actions: usize) -> Self {
        Self {
            run_id,
            status: RunStatus::Completed,
            text: Some(text.into()),
            error: None,
            actions,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(run_id: RunId, error: impl Into<String>, actions: usize) -> Self {
        Self {
            run_id,
            status: RunStatus::Failed,
            text: None,
            error: Some(error.into()),
            actions,
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// The single event delivered to the subscriber for this run.
    pub fn terminal_event(&self) -> Event {
        match (&self.text, &self.error) {
            (Some(text), _) if self.is_completed() => Event::assistant_text(text.clone()),
            (_, Some(error)) => Event::error(error.clone()),
            _ => Event::error("run ended without a result"),
        }
    }
}
