//! Observable records and ordered collections for client-side MV* apps.
//!
//! # Responsibility
//! - [`Record`]: attribute state with change tracking, validation, undo and
//!   persistence through a pluggable [`SyncAdapter`].
//! - [`Collection`]: ordered, reference-unique record sets with preventable
//!   membership signals and member signal relay.
//!
//! # Invariants
//! - Everything is single-threaded; handles are `Rc`-based and cheap to clone.
//! - Signals are delivered synchronously and listeners may reenter.

pub mod event;
pub mod list;
pub mod logging;
pub mod model;
pub mod sync;

pub use event::{Decision, EventFacade, ListenerId};
pub use list::{
    Bubbled, Collection, InvokeError, Invoked, ListEvent, ListEventKind, MembershipEvent,
    RecordCall, RecordInput, RefreshEvent,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::change::{
    Attributes, ChangeDescriptor, ChangeEvent, ChangeSet, ErrorEvent, RecordEvent,
    RecordEventKind,
};
pub use model::options::Options;
pub use model::parse::{parse_response, ParseError};
pub use model::record::Record;
pub use model::schema::{RecordSchema, RecordSchemaBuilder, SchemaError, SchemaRef};
pub use sync::{
    NoopSync, RecordSnapshot, SqliteSync, StoreError, SyncAction, SyncAdapter, SyncCallback,
    SyncError, SyncRequest, SyncResult, SyncSubject, STORE_LAYOUT,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
