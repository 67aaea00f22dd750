//! Ordered record collections.
//!
//! # Responsibility
//! - Keep an ordered, reference-unique set of records with clientId and
//!   identity indices.
//! - Gate membership changes behind preventable `add`/`remove`/`refresh`
//!   signals and re-emit member `change`/`error` signals.
//!
//! # Invariants
//! - A record appears at most once per collection.
//! - Both indices only ever point at current members.
//! - Records hold weak back-references to their collections; collections
//!   own their members.
//!
//! # See also
//! - `crate::model::record` for the member side of the relationship.

pub mod collection;
pub mod event;
pub mod invoke;
mod order;

pub use collection::{Collection, RecordInput};
pub use event::{Bubbled, ListEvent, ListEventKind, MembershipEvent, RefreshEvent};
pub use invoke::{InvokeError, Invoked, RecordCall};
