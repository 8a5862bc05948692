//! Document state store
//!
//! [`PipelineStore`] owns the open document. Every change goes through a
//! typed [`Action`] and the pure [`reduce`] function; listeners registered
//! with [`PipelineStore::subscribe`] see each resulting state.

pub mod action;
pub mod reconcile;
pub mod reducer;
pub mod store;

pub use action::Action;
pub use reconcile::{reconcile, ReconcileInput, Reconciliation};
pub use reducer::{reduce, PipelineStudioState};
pub use store::{FetchOptions, Listener, PipelineStore, SaveResult, StudioError, SubscriptionId};
