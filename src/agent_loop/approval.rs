//! Streaming run with automatic tool approval.
//!
//! A run moves `Started → AwaitingAction* → Completed | Failed`. Every tool
//! call the backend asks about is approved. Once the stream reports `done`,
//! the final assistant message is fetched with bounded polling, since it can
//! lag behind the completion signal. Token deltas are never surfaced: the
//! subscriber sees exactly one terminal event per run.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::types::{RunOutcome, RunState};
use crate::bus::SessionBus;
use crate::error::Result;
use crate::types::{collect_text, ContentItem, Role};
use crate::util::PollPolicy;

/// Text delivered when the final message never became visible.
pub const NO_ASSISTANT_TEXT: &str = "[No assistant text content returned.]";

/// A tool call the backend wants approved before it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequiredToolCall {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequiredAction {
    SubmitToolApproval { tool_calls: Vec<RequiredToolCall> },
    /// Action kinds this runner does not handle.
    Other(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolApproval {
    pub tool_call_id: String,
    pub approve: bool,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
}

/// Typed events of a streaming run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStreamEvent {
    RequiresAction {
        run_id: String,
        action: RequiredAction,
    },
    Error(String),
    Done,
    /// Deltas and status updates; ignored.
    Other(String),
}

/// A message as listed from a backend thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
}

impl ThreadMessage {
    pub fn text(&self) -> String {
        collect_text(&self.content)
    }
}

/// Hosted agent runtime that owns threads and runs.
#[async_trait]
pub trait AgentRunBackend: Send + Sync {
    async fn create_thread(&self) -> Result<String>;

    async fn post_message(&self, thread_id: &str, role: Role, content: &str) -> Result<()>;

    async fn stream_run(&self, thread_id: &str) -> Result<BoxStream<'static, Result<RunStreamEvent>>>;

    async fn submit_tool_approvals(
        &self,
        thread_id: &str,
        run_id: &str,
        approvals: Vec<ToolApproval>,
    ) -> Result<()>;

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>>;
}

/// Pick the newest assistant message.
///
/// A later message wins when its timestamp is at least the current best. A
/// message without a timestamp only replaces the candidate while no
/// timestamped candidate has been seen.
pub fn select_latest_assistant(messages: &[ThreadMessage]) -> Option<&ThreadMessage> {
    let mut best: Option<&ThreadMessage> = None;
    let mut best_ts: Option<DateTime<Utc>> = None;
    for message in messages.iter().filter(|m| m.role == Role::Assistant) {
        let replace = match (best_ts, message.created_at) {
            (None, _) => true,
            (Some(current), Some(ts)) => ts >= current,
            (Some(_), None) => false,
        };
        if replace {
            best = Some(message);
            best_ts = message.created_at;
        }
    }
    best
}

/// Drives streaming runs for sessions, one backend thread per session.
pub struct ApprovalRunner {
    backend: Arc<dyn AgentRunBackend>,
    bus: Arc<SessionBus>,
    threads: Mutex<HashMap<String, String>>,
    approval_headers: HashMap<String, String>,
    poll: PollPolicy,
}

impl ApprovalRunner {
    pub fn new(backend: Arc<dyn AgentRunBackend>, bus: Arc<SessionBus>) -> Self {
        Self {
            backend,
            bus,
            threads: Mutex::new(HashMap::new()),
            approval_headers: HashMap::new(),
            poll: PollPolicy::default(),
        }
    }

    /// Headers attached to every approval (forwarded to the tool server).
    pub fn with_approval_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.approval_headers = headers;
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Thread bound to `session`, if one was created.
    pub async fn thread_for(&self, session: &str) -> Option<String> {
        self.threads.lock().await.get(session).cloned()
    }

    async fn thread_for_or_create(&self, session: &str) -> Result<String> {
        if let Some(thread) = self.thread_for(session).await {
            return Ok(thread);
        }
        // Created outside the map lock; the first insert for a session wins.
        let created = self.backend.create_thread().await?;
        let thread = self
            .threads
            .lock()
            .await
            .entry(session.to_string())
            .or_insert_with(|| created.clone())
            .clone();
        if thread == created {
            tracing::info!(session, thread = %thread, "created thread");
        } else {
            tracing::debug!(session, thread = %thread, unused = %created, "lost thread creation race");
        }
        Ok(thread)
    }

    /// Execute one turn and publish its terminal event to `session`.
    pub async fn run_turn(&self, session: &str, query: &str) -> RunOutcome {
        let run_id = Uuid::new_v4();
        let outcome = self.drive(run_id, session, query).await;
        match &outcome.error {
            Some(error) => tracing::warn!(session, %run_id, %error, "run failed"),
            None => tracing::info!(session, %run_id, actions = outcome.actions, "run completed"),
        }
        self.bus.publish(session, outcome.terminal_event());
        outcome
    }

    async fn drive(&self, run_id: Uuid, session: &str, query: &str) -> RunOutcome {
        let thread = match self.thread_for_or_create(session).await {
            Ok(thread) => thread,
            Err(error) => return RunOutcome::failed(run_id, error.to_string(), 0),
        };
        if let Err(error) = self.backend.post_message(&thread, Role::User, query).await {
            return RunOutcome::failed(run_id, error.to_string(), 0);
        }

        let mut stream = match self.backend.stream_run(&thread).await {
            Ok(stream) => stream,
            Err(error) => return RunOutcome::failed(run_id, error.to_string(), 0),
        };

        let mut state = RunState::Started;
        let mut actions = 0;
        tracing::debug!(session, %run_id, %state, "run started");

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => event,
                Err(error) => return RunOutcome::failed(run_id, error.to_string(), actions),
            };
            match event {
                RunStreamEvent::RequiresAction {
                    run_id: backend_run,
                    action,
                } => {
                    state = RunState::AwaitingAction;
                    tracing::debug!(session, %run_id, %state, "run requires action");
                    let approvals = self.approvals_for(&action);
                    if approvals.is_empty() {
                        continue;
                    }
                    if let Err(error) = self
                        .backend
                        .submit_tool_approvals(&thread, &backend_run, approvals)
                        .await
                    {
                        return RunOutcome::failed(run_id, format!("tool_approval_failed: {error}"), actions);
                    }
                    actions += 1;
                }
                RunStreamEvent::Error(message) => {
                    return RunOutcome::failed(run_id, message, actions);
                }
                RunStreamEvent::Done => {
                    tracing::debug!(session, %run_id, state = %RunState::Completed, "run done, fetching answer");
                    return match self.fetch_final_text(&thread).await {
                        Ok(text) => RunOutcome::completed(
                            run_id,
                            text.unwrap_or_else(|| NO_ASSISTANT_TEXT.to_string()),
                            actions,
                        ),
                        Err(error) => {
                            RunOutcome::failed(run_id, format!("final_fetch_failed: {error}"), actions)
                        }
                    };
                }
                RunStreamEvent::Other(kind) => {
                    tracing::trace!(session, %run_id, %kind, "ignoring run event");
                }
            }
        }

        RunOutcome::failed(run_id, "run stream ended before completion", actions)
    }

    fn approvals_for(&self, action: &RequiredAction) -> Vec<ToolApproval> {
        match action {
            RequiredAction::SubmitToolApproval { tool_calls } => tool_calls
                .iter()
                .map(|call| {
                    tracing::info!(tool = %call.name, call_id = %call.id, "approving tool call");
                    ToolApproval {
                        tool_call_id: call.id.clone(),
                        approve: true,
                        headers: self.approval_headers.clone(),
                    }
                })
                .collect(),
            RequiredAction::Other(_) => Vec::new(),
        }
    }

    /// Poll for the newest assistant text; `Ok(None)` once attempts run out.
    async fn fetch_final_text(&self, thread: &str) -> Result<Option<String>> {
        self.poll
            .poll(|attempt| async move {
                let messages = self.backend.list_messages(thread).await?;
                let text = select_latest_assistant(&messages)
                    .map(ThreadMessage::text)
                    .filter(|text| !text.is_empty());
                if text.is_none() {
                    tracing::debug!(thread, attempt, "final answer not visible yet");
                }
                Ok(text)
            })
            .await
    }
}

impl std::fmt::Debug for ApprovalRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalRunner")
            .field("poll", &self.poll)
            .field("approval_headers", &self.approval_headers.keys().collect::<Vec<_>>())
            .finish()
    }
}
