//! Drains one session's queue into SSE frames for a subscribed client.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use crate::bus::{Event, EventKind, Session};

/// Keep-alive settings for a subscription.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeliveryConfig {
    /// Longest wait for a queued event before a keep-alive frame is sent.
    pub heartbeat: Duration,
    /// Kind of the keep-alive frame, `heartbeat` or `noevent`.
    pub keepalive: EventKind,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_secs(15),
            keepalive: EventKind::Heartbeat,
        }
    }
}

/// Frames for one subscriber: an `open` frame first, then queued events in
/// publish order interleaved with keep-alives. Ends once the session closes.
///
/// The serving layer drops the stream when the peer disconnects.
pub fn event_stream(session: Arc<Session>, config: DeliveryConfig) -> impl Stream<Item = String> {
    async_stream::stream! {
        tracing::debug!(session = session.key(), "subscriber attached");
        yield Event::open().to_frame();
        while !session.is_closed() {
            match session.next_timeout(config.heartbeat).await {
                _ if session.is_closed() => break,
                Some(event) => yield event.to_frame(),
                None => yield Event::keepalive(config.keepalive).to_frame(),
            }
        }
        tracing::debug!(session = session.key(), "subscriber stream ended");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SessionBus;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn yields_open_then_events_then_keepalive() {
        let bus = SessionBus::new();
        let session = bus.get_or_create("s");
        bus.publish("s", Event::assistant_text("hi"));

        let config = DeliveryConfig {
            heartbeat: Duration::from_secs(1),
            keepalive: EventKind::NoEvent,
        };
        let stream = event_stream(session, config);
        futures::pin_mut!(stream);

        assert_eq!(stream.next().await.as_deref(), Some("event: open\ndata: {}\n\n"));
        assert_eq!(
            stream.next().await.as_deref(),
            Some("event: message\ndata: {\"text\":\"hi\"}\n\n")
        );
        assert_eq!(stream.next().await.as_deref(), Some("event: noevent\ndata: {}\n\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn ends_after_session_deleted() {
        let bus = SessionBus::new();
        let session = bus.get_or_create("s");
        let stream = event_stream(session, DeliveryConfig::default());
        futures::pin_mut!(stream);

        assert!(stream.next().await.is_some());
        bus.delete("s");
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn delete_discards_events_queued_for_a_parked_subscriber() {
        let bus = std::sync::Arc::new(SessionBus::new());
        let session = bus.get_or_create("k");
        let config = DeliveryConfig {
            heartbeat: Duration::from_secs(60),
            keepalive: EventKind::Heartbeat,
        };

        let subscriber = tokio::spawn(async move {
            let stream = event_stream(session, config);
            futures::pin_mut!(stream);
            let mut frames = Vec::new();
            while let Some(frame) = stream.next().await {
                frames.push(frame);
            }
            frames
        });
        tokio::task::yield_now().await;

        bus.publish("k", Event::assistant_text("stale-1"));
        bus.publish("k", Event::assistant_text("stale-2"));
        assert!(bus.delete("k"));

        let frames = tokio::time::timeout(Duration::from_secs(5), subscriber)
            .await
            .expect("subscriber should end after delete")
            .expect("subscriber task");
        assert_eq!(frames, vec!["event: open\ndata: {}\n\n".to_string()]);
    }
}
