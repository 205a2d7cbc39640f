//! Messages — the optimistic store and snapshot reconciliation.

pub mod model;
pub mod reconcile;
pub mod store;

pub use model::{Attachment, Message, MessageMetadata, MessageOrigin, MessageStatus, Role};
pub use reconcile::{ReconcileOptions, Reconciled, Superseded, reconcile};
pub use store::MessageStore;
