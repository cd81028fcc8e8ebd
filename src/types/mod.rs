//! Core types shared across the relay.

pub mod content;
pub mod message;

pub use content::*;
pub use message::*;
