//! Change descriptors and the signals a record emits.

use crate::event::Signal;
use crate::model::parse::ParseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Attribute mapping used for record state, candidates and JSON output.
///
/// Keys keep insertion order, so declared attributes serialize in schema
/// order followed by ad-hoc ones.
pub type Attributes = Map<String, Value>;

/// Per-attribute change coalesced into one `change` signal.
pub type ChangeSet = BTreeMap<String, ChangeDescriptor>;

/// Describes one attribute change.
///
/// Serialized with the wire names `newVal`, `prevVal` and `src`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDescriptor {
    pub new_val: Value,
    /// `null` when the attribute did not exist before.
    pub prev_val: Value,
    pub src: Option<String>,
}

/// Payload of a record `change` signal.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Every attribute changed by one `set`/`set_attrs` call.
    pub changed: ChangeSet,
    pub src: Option<String>,
}

impl ChangeEvent {
    pub fn get(&self, name: &str) -> Option<&ChangeDescriptor> {
        self.changed.get(name)
    }
}

/// Payload of an `error` signal.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorEvent {
    /// The validation hook rejected a candidate attribute set.
    Validate {
        /// Attributes the caller attempted to set.
        attributes: Attributes,
        /// Value returned by the validation hook.
        error: Value,
    },
    /// A textual response could not be deserialized.
    Parse { response: Value, error: ParseError },
}

impl ErrorEvent {
    /// Stable error kind name (`validate|parse`).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Validate { .. } => "validate",
            Self::Parse { .. } => "parse",
        }
    }
}

/// Signals emitted by a record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    Change(ChangeEvent),
    Error(ErrorEvent),
}

/// Subscription key for [`RecordEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordEventKind {
    Change,
    Error,
}

impl Signal for RecordEvent {
    type Kind = RecordEventKind;

    fn kind(&self) -> RecordEventKind {
        match self {
            Self::Change(_) => RecordEventKind::Change,
            Self::Error(_) => RecordEventKind::Error,
        }
    }
}
