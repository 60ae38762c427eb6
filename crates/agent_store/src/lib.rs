//! Opaque key/value persistence for agent sessions.
//!
//! Each `(session, key)` pair holds one JSON blob wrapped in a versioned
//! envelope. The agent decides what the blobs mean; this crate only stores,
//! timestamps and validates them.

mod error;
mod paths;
mod schema;
mod store;

pub use error::StoreError;
pub use paths::{blob_file_name, store_root, validate_segment};
pub use schema::{Envelope, STORE_VERSION};
pub use store::{load_as, new_session_id, save_as, FileStore, KeyValueStore, MemoryStore};
