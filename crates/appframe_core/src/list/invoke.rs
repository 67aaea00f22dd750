//! Named record operations for `Collection::invoke`.
//!
//! Method names follow the record's public surface in its wire spelling
//! (`get`, `set`, `setAttrs`, `undo`, `isNew`, `isModified`, `toJSON`,
//! `getAsHTML`, `getAsURL`, `save`, `load`, `destroy`). Arguments are JSON
//! values; a trailing object argument is read as [`Options`].

use crate::model::change::Attributes;
use crate::model::options::Options;
use crate::model::record::Record;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A decoded record operation, ready to apply to many records.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordCall {
    Get(String),
    Set {
        name: String,
        value: Value,
        options: Options,
    },
    SetAttrs {
        attributes: Attributes,
        options: Options,
    },
    Undo {
        names: Option<Vec<String>>,
        options: Options,
    },
    IsNew,
    IsModified,
    ToJson,
    GetAsHtml(String),
    GetAsUrl(String),
    Save(Options),
    Load(Options),
    Destroy(Options),
}

/// Result of applying a [`RecordCall`] to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Invoked {
    /// Chainable operations return the record itself.
    Record(Record),
    Value(Option<Value>),
    Flag(bool),
    Text(String),
    Json(Attributes),
}

impl RecordCall {
    /// Decodes `method` and its positional `args`.
    pub fn parse(method: &str, args: &[Value]) -> Result<Self, InvokeError> {
        let call = match method {
            "get" => Self::Get(string_arg(method, args, 0)?),
            "set" => Self::Set {
                name: string_arg(method, args, 0)?,
                value: args
                    .get(1)
                    .cloned()
                    .ok_or_else(|| InvokeError::missing(method, 1))?,
                options: options_arg(method, args, 2)?,
            },
            "setAttrs" => Self::SetAttrs {
                attributes: object_arg(method, args, 0)?,
                options: options_arg(method, args, 1)?,
            },
            "undo" => Self::Undo {
                names: names_arg(method, args, 0)?,
                options: options_arg(method, args, 1)?,
            },
            "isNew" => Self::IsNew,
            "isModified" => Self::IsModified,
            "toJSON" => Self::ToJson,
            "getAsHTML" => Self::GetAsHtml(string_arg(method, args, 0)?),
            "getAsURL" => Self::GetAsUrl(string_arg(method, args, 0)?),
            "save" => Self::Save(options_arg(method, args, 0)?),
            "load" => Self::Load(options_arg(method, args, 0)?),
            "destroy" => Self::Destroy(options_arg(method, args, 0)?),
            other => return Err(InvokeError::UnknownMethod(other.to_string())),
        };
        Ok(call)
    }

    pub fn apply(&self, record: &Record) -> Invoked {
        match self {
            Self::Get(name) => Invoked::Value(record.get(name)),
            Self::Set {
                name,
                value,
                options,
            } => Invoked::Record(record.set(name, value.clone(), options).clone()),
            Self::SetAttrs {
                attributes,
                options,
            } => Invoked::Record(record.set_attrs(attributes.clone(), options).clone()),
            Self::Undo { names, options } => {
                let names: Option<Vec<&str>> = names
                    .as_ref()
                    .map(|names| names.iter().map(String::as_str).collect());
                Invoked::Record(record.undo(names.as_deref(), options).clone())
            }
            Self::IsNew => Invoked::Flag(record.is_new()),
            Self::IsModified => Invoked::Flag(record.is_modified()),
            Self::ToJson => Invoked::Json(record.to_json()),
            Self::GetAsHtml(name) => Invoked::Text(record.get_as_html(name)),
            Self::GetAsUrl(name) => Invoked::Text(record.get_as_url(name)),
            Self::Save(options) => Invoked::Record(record.save(options).clone()),
            Self::Load(options) => Invoked::Record(record.load(options).clone()),
            Self::Destroy(options) => Invoked::Record(record.destroy(options).clone()),
        }
    }
}

fn string_arg(method: &str, args: &[Value], position: usize) -> Result<String, InvokeError> {
    match args.get(position) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(_) => Err(InvokeError::invalid(method, position, "string")),
        None => Err(InvokeError::missing(method, position)),
    }
}

fn object_arg(method: &str, args: &[Value], position: usize) -> Result<Attributes, InvokeError> {
    match args.get(position) {
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(InvokeError::invalid(method, position, "object")),
        None => Err(InvokeError::missing(method, position)),
    }
}

/// Optional trailing options object; `null` and absence mean defaults.
fn options_arg(method: &str, args: &[Value], position: usize) -> Result<Options, InvokeError> {
    match args.get(position) {
        None | Some(Value::Null) => Ok(Options::new()),
        Some(Value::Object(map)) => Ok(Options::from_map(map)),
        Some(_) => Err(InvokeError::invalid(method, position, "options object")),
    }
}

fn names_arg(
    method: &str,
    args: &[Value],
    position: usize,
) -> Result<Option<Vec<String>>, InvokeError> {
    match args.get(position) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(name) => Ok(name.clone()),
                _ => Err(InvokeError::invalid(method, position, "array of strings")),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(InvokeError::invalid(method, position, "array of strings")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    UnknownMethod(String),
    MissingArgument {
        method: String,
        position: usize,
    },
    InvalidArgument {
        method: String,
        position: usize,
        expected: &'static str,
    },
}

impl InvokeError {
    fn missing(method: &str, position: usize) -> Self {
        Self::MissingArgument {
            method: method.to_string(),
            position,
        }
    }

    fn invalid(method: &str, position: usize, expected: &'static str) -> Self {
        Self::InvalidArgument {
            method: method.to_string(),
            position,
            expected,
        }
    }
}

impl Display for InvokeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMethod(method) => write!(f, "unknown record method: {method}"),
            Self::MissingArgument { method, position } => {
                write!(f, "`{method}` is missing argument {position}")
            }
            Self::InvalidArgument {
                method,
                position,
                expected,
            } => write!(f, "`{method}` argument {position} must be a {expected}"),
        }
    }
}

impl Error for InvokeError {}

#[cfg(test)]
mod tests {
    use super::{InvokeError, RecordCall};
    use serde_json::json;

    #[test]
    fn decodes_set_with_options() {
        let call = RecordCall::parse("set", &[json!("foo"), json!(1), json!({"silent": true})])
            .expect("valid call");
        match call {
            RecordCall::Set {
                name,
                value,
                options,
            } => {
                assert_eq!(name, "foo");
                assert_eq!(value, json!(1));
                assert!(options.silent);
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_methods_and_bad_arguments() {
        assert_eq!(
            RecordCall::parse("explode", &[]).unwrap_err(),
            InvokeError::UnknownMethod("explode".to_string())
        );
        assert!(matches!(
            RecordCall::parse("get", &[]).unwrap_err(),
            InvokeError::MissingArgument { position: 0, .. }
        ));
        assert!(matches!(
            RecordCall::parse("setAttrs", &[json!("nope")]).unwrap_err(),
            InvokeError::InvalidArgument { expected: "object", .. }
        ));
        assert!(matches!(
            RecordCall::parse("undo", &[json!(["a", 1])]).unwrap_err(),
            InvokeError::InvalidArgument { .. }
        ));
    }
}
