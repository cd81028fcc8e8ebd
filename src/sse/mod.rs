//! Server-Sent-Events plumbing: frame parsing, notification classification,
//! the upstream relay, and per-session delivery.

pub mod delivery;
pub mod notification;
pub mod parser;
pub mod relay;

pub use delivery::{event_stream, DeliveryConfig};
pub use notification::{classify, Notification};
pub use parser::{Frame, FrameParser};
pub use relay::{RelayHandle, StreamRelay};
