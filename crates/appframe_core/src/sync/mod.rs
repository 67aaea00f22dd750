//! Persistence adapter contract and implementations.
//!
//! # Responsibility
//! - Define the single capability records and collections persist through:
//!   `sync(request, callback)`.
//! - Provide the default no-op adapter and a SQLite-backed local adapter.
//!
//! # Invariants
//! - Adapters invoke the callback exactly once, synchronously or later.
//! - Adapter failures reach the caller's callback only; they never become
//!   `error` signals.

mod adapter;
mod sqlite_sync;

pub use adapter::{
    default_sync_adapter, NoopSync, RecordSnapshot, SyncAction, SyncAdapter, SyncCallback,
    SyncError, SyncRequest, SyncResult, SyncSubject,
};
pub use sqlite_sync::{SqliteSync, StoreError, STORE_LAYOUT};
