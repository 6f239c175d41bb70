//! ---
//! phs_section: "03-liveness-reconciliation"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Liveness detection and optimistic command reconciliation."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
use thiserror::Error;

use crate::liveness::LivenessState;
use pharos_store::StoreError;

/// Reasons a submitted command intent was not carried out.
///
/// None of these are fatal: the caller retries explicitly, local state has
/// already been rolled back where it was touched.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The store gateway or the readiness gate has not reported ready yet.
    #[error("store gateway is not ready")]
    NotReady,

    /// The liveness verdict was not `online` at command time. No write was
    /// issued; it would sit unconfirmed with nobody to act on it.
    #[error("endpoint unreachable (liveness verdict: {state})")]
    EndpointUnreachable { state: LivenessState },

    /// A previous intent is still awaiting confirmation. Overlapping submits
    /// are rejected rather than queued.
    #[error("a command is already in flight for this actuator")]
    CommandInFlight,

    /// The underlying store rejected the write. The optimistic update has
    /// been reverted.
    #[error("store write failed")]
    WriteFailed(#[from] StoreError),
}
