//! Chat state — client-side message and conversation state for a multi-agent chat.

pub mod config;
pub mod conversations;
pub mod error;
pub mod messages;
pub mod persistence;
pub mod reminders;
pub mod session;
pub mod transport;
