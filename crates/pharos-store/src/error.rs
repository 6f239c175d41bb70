//! ---
//! phs_section: "02-store-gateway"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Realtime store gateway trait and in-memory backend."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use thiserror::Error;

/// Failures surfaced by a [`crate::StoreGateway`] implementation.
///
/// All of these are recoverable at the caller: subscription errors are retried
/// on a fixed backoff by the consuming session, write rejections roll back
/// optimistic state, and `NotInitialized` is what the readiness gate polls
/// away.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection not initialized")]
    NotInitialized,

    #[error("read of key '{key}' failed: {reason}")]
    ReadFailed { key: String, reason: String },

    #[error("write to key '{key}' rejected: {reason}")]
    WriteRejected { key: String, reason: String },

    #[error("subscription to key '{key}' could not be established: {reason}")]
    SubscribeFailed { key: String, reason: String },

    #[error("subscription to key '{key}' closed by the store")]
    SubscriptionClosed { key: String },

    #[error("subscription to key '{key}' lagged, {missed} notification(s) dropped")]
    SubscriptionLagged { key: String, missed: u64 },
}

impl StoreError {
    /// Whether the consuming session should tear down its subscription and
    /// establish a fresh one. Lag keeps the receiver usable; everything else
    /// does not.
    pub fn requires_resubscribe(&self) -> bool {
        !matches!(self, StoreError::SubscriptionLagged { .. })
    }
}
