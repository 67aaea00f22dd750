//! Signals emitted by a collection.

use crate::event::Signal;
use crate::list::collection::Collection;
use crate::model::change::{ChangeEvent, ErrorEvent};
use crate::model::record::Record;
use serde_json::{Map, Value};

/// Payload of `add` and `remove`.
#[derive(Debug, Clone)]
pub struct MembershipEvent {
    pub record: Record,
    /// Insertion index for `add`, prior index for `remove`.
    pub index: usize,
    pub src: Option<String>,
    /// Caller options beyond `silent`/`src`/`delete`.
    pub extra: Map<String, Value>,
}

/// Payload of `refresh`.
#[derive(Debug, Clone)]
pub struct RefreshEvent {
    /// New membership, in final order.
    pub records: Vec<Record>,
    /// `"refresh"` unless the caller supplied one; `"sort"` for sorts.
    pub src: String,
    pub extra: Map<String, Value>,
}

/// A member signal re-emitted by the collection.
#[derive(Debug, Clone)]
pub struct Bubbled<T> {
    /// Record that emitted the original signal.
    pub target: Record,
    /// Collection re-emitting it.
    pub current_target: Collection,
    pub event: T,
}

#[derive(Debug, Clone)]
pub enum ListEvent {
    Add(MembershipEvent),
    Remove(MembershipEvent),
    Refresh(RefreshEvent),
    /// Collection-level failure, e.g. an unparsable load response.
    Error(ErrorEvent),
    RecordChange(Bubbled<ChangeEvent>),
    RecordError(Bubbled<ErrorEvent>),
}

/// Subscription key for [`ListEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListEventKind {
    Add,
    Remove,
    Refresh,
    Error,
    RecordChange,
    RecordError,
}

impl Signal for ListEvent {
    type Kind = ListEventKind;

    fn kind(&self) -> ListEventKind {
        match self {
            Self::Add(_) => ListEventKind::Add,
            Self::Remove(_) => ListEventKind::Remove,
            Self::Refresh(_) => ListEventKind::Refresh,
            Self::Error(_) => ListEventKind::Error,
            Self::RecordChange(_) => ListEventKind::RecordChange,
            Self::RecordError(_) => ListEventKind::RecordError,
        }
    }
}
