//! Long-lived upstream SSE listener that republishes notifications onto the
//! session bus.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::notification::classify;
use super::parser::{Frame, FrameParser};
use crate::bus::{SessionBus, UserSessions, SESSION_HEADER};
use crate::error::{RelayError, Result};
use crate::util::BackoffPolicy;

/// Connect timeout for the upstream stream. Reads never time out.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Consumes one upstream event stream and routes what it sees to sessions.
#[derive(Debug)]
pub struct StreamRelay {
    client: reqwest::Client,
    endpoint: String,
    session_id: String,
    bus: Arc<SessionBus>,
    users: Arc<UserSessions>,
    broadcast: RwLock<Option<String>>,
    backoff: BackoffPolicy,
}

impl StreamRelay {
    pub fn new(
        endpoint: impl Into<String>,
        session_id: impl Into<String>,
        bus: Arc<SessionBus>,
        users: Arc<UserSessions>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            session_id: session_id.into(),
            bus,
            users,
            broadcast: RwLock::new(None),
            backoff: BackoffPolicy::default(),
        })
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Session that receives notifications not attributable to a known user.
    pub fn set_broadcast_session(&self, key: impl Into<String>) {
        *self.broadcast.write().unwrap_or_else(PoisonError::into_inner) = Some(key.into());
    }

    pub fn broadcast_session(&self) -> Option<String> {
        self.broadcast
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn resolve_target(&self, user_id: Option<&str>) -> Option<String> {
        user_id
            .and_then(|user| self.users.session_for(user))
            .or_else(|| self.broadcast_session())
    }

    /// Classify one frame and publish it. Returns whether an event was published.
    pub fn handle_frame(&self, frame: &Frame) -> bool {
        let Some(notification) = classify(&frame.data) else {
            return false;
        };
        let Some(target) = self.resolve_target(notification.user_id()) else {
            tracing::debug!(relay = %self.session_id, "no destination session, dropping notification");
            return false;
        };
        let event = notification.into_event();
        tracing::debug!(relay = %self.session_id, session = %target, kind = %event.kind(), "relaying notification");
        self.bus.publish(&target, event)
    }

    /// Open one connection and consume it until the stream ends.
    pub async fn listen_once(&self) -> Result<()> {
        let resp = self
            .client
            .get(&self.endpoint)
            .header(SESSION_HEADER, &self.session_id)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::api(status.as_u16(), body));
        }

        tracing::info!(relay = %self.session_id, endpoint = %self.endpoint, "upstream stream connected");
        let mut parser = FrameParser::new();
        let mut body = resp.bytes_stream();
        while let Some(chunk) = body.next().await {
            for frame in parser.push_bytes(&chunk?) {
                self.handle_frame(&frame);
            }
        }
        if let Some(frame) = parser.finish() {
            self.handle_frame(&frame);
        }
        Err(RelayError::Stream("upstream stream ended".into()))
    }

    /// Listen until `cancel` fires, reconnecting with growing backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut backoff = self.backoff.start();
        tracing::info!(relay = %self.session_id, "starting stream relay");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.listen_once() => {
                    if let Err(error) = result {
                        if error.category().is_transport() {
                            tracing::info!(relay = %self.session_id, %error, "upstream stream lost");
                        } else {
                            tracing::warn!(relay = %self.session_id, %error, "upstream stream failed");
                        }
                    }
                }
            }

            let delay = backoff.next_delay();
            tracing::info!(relay = %self.session_id, delay_secs = delay.as_secs_f64(), "reconnecting");
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(relay = %self.session_id, "stream relay stopped");
    }

    /// Run on a background task.
    pub fn spawn(self: Arc<Self>) -> RelayHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        RelayHandle { cancel, task }
    }
}

/// Handle to a spawned [`StreamRelay`].
#[derive(Debug)]
pub struct RelayHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RelayHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel and wait for the listener task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "stream relay task panicked");
        }
    }
}
