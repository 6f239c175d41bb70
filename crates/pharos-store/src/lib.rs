//! ---
//! phs_section: "02-store-gateway"
//! phs_subsection: "module"
//! phs_type: "source"
//! phs_scope: "code"
//! phs_description: "Realtime store gateway trait and in-memory backend."
//! phs_version: "v0.0.0-prealpha"
//! phs_owner: "tbd"
//! ---
//! Gateway to the realtime key-value store that sits between the controller
//! and the endpoint. The store delivers the current value at subscribe time
//! and every change afterwards; per-key ordering is the store's guarantee,
//! cross-key ordering is nobody's.

mod error;
mod gateway;
mod memory;

pub use error::StoreError;
pub use gateway::{KeySubscription, SharedGateway, StoreGateway, Value};
pub use memory::MemoryStore;
