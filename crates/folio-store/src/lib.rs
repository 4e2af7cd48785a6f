//! Folio Store — durable consent decision and region-classification records.
//!
//! Records live under fixed keys in a [`KeyValueBackend`]. Every read failure,
//! whether the backend is down or the payload is malformed, surfaces to callers
//! of [`ConsentStore`] as plain absence.

pub mod backend;
pub mod consent_store;
pub mod sqlite;
pub mod types;

pub use backend::{KeyValueBackend, MemoryBackend, UnavailableBackend};
pub use consent_store::ConsentStore;
pub use sqlite::SqliteBackend;
pub use types::*;
