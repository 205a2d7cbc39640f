//! Conversation list: metadata, the active pointer, and date grouping.

pub mod grouping;
pub mod model;
pub mod store;

pub use grouping::{BucketKind, DateBucket, group_by_date};
pub use model::{Conversation, ConversationStatus, preview};
pub use store::ConversationStore;
