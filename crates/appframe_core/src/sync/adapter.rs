//! Sync request/response types and the adapter trait.

use crate::model::change::Attributes;
use crate::model::options::Options;
use crate::model::parse::ParseError;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

/// Persistence action requested from an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncAction {
    Create,
    Read,
    Update,
    Delete,
}

impl SyncAction {
    /// Stable action name (`create|read|update|delete`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Display for SyncAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record state captured when a request is issued.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    /// Record type name.
    pub kind: String,
    pub client_id: String,
    pub id_attribute: String,
    /// Identity value, `None` while the record is new.
    pub id: Option<Value>,
    /// Same shape as `Record::to_json`.
    pub attributes: Attributes,
}

/// What a request is about.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncSubject {
    Record(RecordSnapshot),
    /// A whole collection of the given record type.
    Collection { kind: String },
}

impl SyncSubject {
    pub fn kind(&self) -> &str {
        match self {
            Self::Record(snapshot) => &snapshot.kind,
            Self::Collection { kind } => kind,
        }
    }
}

/// One persistence request.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub action: SyncAction,
    /// Caller options, passed through untouched.
    pub options: Options,
    pub subject: SyncSubject,
}

/// `Ok(Some(response))` carries a payload to parse and merge.
pub type SyncResult = Result<Option<Value>, SyncError>;

/// Completion callback; must be invoked exactly once.
pub type SyncCallback = Box<dyn FnOnce(SyncResult)>;

/// Pluggable persistence capability.
///
/// Any `Fn(SyncRequest, SyncCallback)` closure is an adapter.
pub trait SyncAdapter {
    fn sync(&self, request: SyncRequest, callback: SyncCallback);
}

impl<F> SyncAdapter for F
where
    F: Fn(SyncRequest, SyncCallback),
{
    fn sync(&self, request: SyncRequest, callback: SyncCallback) {
        self(request, callback)
    }
}

/// Default adapter: reports success immediately without a response.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSync;

impl SyncAdapter for NoopSync {
    fn sync(&self, _request: SyncRequest, callback: SyncCallback) {
        callback(Ok(None));
    }
}

/// Shared [`NoopSync`] handle used when nothing else is configured.
pub fn default_sync_adapter() -> Rc<dyn SyncAdapter> {
    Rc::new(NoopSync)
}

/// Errors delivered to sync callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    /// A request was issued while another one on the same object was pending.
    Busy {
        pending: SyncAction,
        requested: SyncAction,
    },
    /// The response text could not be parsed.
    Parse(ParseError),
    NotFound {
        kind: String,
        id: String,
    },
    /// The adapter cannot serve this request shape.
    InvalidRequest(String),
    /// Backing store failure.
    Storage(String),
    /// Adapter-defined failure.
    Adapter {
        code: String,
        message: String,
    },
}

impl SyncError {
    pub fn adapter(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &str {
        match self {
            Self::Busy { .. } => "sync_busy",
            Self::Parse(_) => "parse_failed",
            Self::NotFound { .. } => "not_found",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Storage(_) => "storage_failed",
            Self::Adapter { code, .. } => code,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Busy { pending, requested } => write!(
                f,
                "cannot {requested} while a {pending} request is still pending"
            ),
            Self::Parse(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::InvalidRequest(message) => write!(f, "invalid sync request: {message}"),
            Self::Storage(message) => write!(f, "sync storage failure: {message}"),
            Self::Adapter { code, message } => write!(f, "[{code}] {message}"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ParseError> for SyncError {
    fn from(value: ParseError) -> Self {
        Self::Parse(value)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.to_string())
    }
}
