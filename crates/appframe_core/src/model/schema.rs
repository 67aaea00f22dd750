//! Record type declaration.
//!
//! # Responsibility
//! - Resolve a record type's name, identity attribute and ordered attribute
//!   defaults once, at definition time.
//! - Hold the type-level validation hook and default sync adapter.
//!
//! # Invariants
//! - The identity attribute is always declared (defaulting to `null`).
//! - `clientId` and `destroyed` are reserved and never declared.
//! - With a custom identity attribute, `id` is an alias and cannot be
//!   declared separately.

use crate::model::change::Attributes;
use crate::sync::SyncAdapter;
use serde_json::Value;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

/// Default identity attribute name, also the alias name for custom ones.
pub const ID_ATTRIBUTE: &str = "id";
/// Read-only, locally generated identifier attribute.
pub const CLIENT_ID_ATTRIBUTE: &str = "clientId";
/// Read-only destruction flag attribute.
pub const DESTROYED_ATTRIBUTE: &str = "destroyed";
/// Type name used by [`RecordSchema::generic`].
pub const GENERIC_TYPE_NAME: &str = "model";

const RESERVED_ATTRIBUTES: &[&str] = &[CLIENT_ID_ATTRIBUTE, DESTROYED_ATTRIBUTE];

/// Validation hook. `Err(value)` rejects the candidate with `value` as the
/// reported error.
pub type ValidateFn = dyn Fn(&Attributes) -> Result<(), Value>;

/// Shared schema handle; every record keeps one.
pub type SchemaRef = Rc<RecordSchema>;

/// Resolved record type declaration.
pub struct RecordSchema {
    name: String,
    id_attribute: String,
    attributes: Vec<(String, Value)>,
    validator: Option<Rc<ValidateFn>>,
    sync: Option<Rc<dyn SyncAdapter>>,
}

impl RecordSchema {
    pub fn builder(name: impl Into<String>) -> RecordSchemaBuilder {
        RecordSchemaBuilder {
            name: name.into(),
            id_attribute: ID_ATTRIBUTE.to_string(),
            attributes: Vec::new(),
            validator: None,
            sync: None,
        }
    }

    /// Schema with only the implicit `id` attribute.
    pub fn generic() -> SchemaRef {
        Rc::new(Self {
            name: GENERIC_TYPE_NAME.to_string(),
            id_attribute: ID_ATTRIBUTE.to_string(),
            attributes: vec![(ID_ATTRIBUTE.to_string(), Value::Null)],
            validator: None,
            sync: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    /// Returns whether the identity attribute is named something other
    /// than `id`.
    pub fn has_custom_id(&self) -> bool {
        self.id_attribute != ID_ATTRIBUTE
    }

    /// Declared attributes and defaults, in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn declares(&self, name: &str) -> bool {
        let name = self.canonical_name(name);
        self.attributes.iter().any(|(declared, _)| declared == name)
    }

    pub fn default_value(&self, name: &str) -> Option<&Value> {
        let name = self.canonical_name(name);
        self.attributes
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, value)| value)
    }

    /// Maps the `id` alias onto the identity attribute name.
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        if name == ID_ATTRIBUTE {
            &self.id_attribute
        } else {
            name
        }
    }

    pub(crate) fn validator(&self) -> Option<Rc<ValidateFn>> {
        self.validator.clone()
    }

    pub(crate) fn sync_adapter(&self) -> Option<Rc<dyn SyncAdapter>> {
        self.sync.clone()
    }
}

impl Debug for RecordSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSchema")
            .field("name", &self.name)
            .field("id_attribute", &self.id_attribute)
            .field("attributes", &self.attributes)
            .field("has_validator", &self.validator.is_some())
            .field("has_sync_adapter", &self.sync.is_some())
            .finish()
    }
}

/// Builder for [`RecordSchema`].
pub struct RecordSchemaBuilder {
    name: String,
    id_attribute: String,
    attributes: Vec<(String, Value)>,
    validator: Option<Rc<ValidateFn>>,
    sync: Option<Rc<dyn SyncAdapter>>,
}

impl RecordSchemaBuilder {
    /// Overrides the identity attribute name (default `id`).
    pub fn id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    /// Declares one attribute with its default value.
    pub fn attribute(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.attributes.push((name.into(), default.into()));
        self
    }

    pub fn validator(
        mut self,
        validator: impl Fn(&Attributes) -> Result<(), Value> + 'static,
    ) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Sync adapter used by records of this type unless overridden per record.
    pub fn sync_adapter(mut self, adapter: Rc<dyn SyncAdapter>) -> Self {
        self.sync = Some(adapter);
        self
    }

    /// Validates the declaration and resolves it into a shared schema.
    pub fn build(self) -> Result<SchemaRef, SchemaError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SchemaError::EmptyName);
        }
        if !is_valid_type_name(&name) {
            return Err(SchemaError::InvalidName(name));
        }

        let id_attribute = self.id_attribute.trim().to_string();
        if id_attribute.is_empty() {
            return Err(SchemaError::EmptyAttributeName);
        }
        if RESERVED_ATTRIBUTES.contains(&id_attribute.as_str()) {
            return Err(SchemaError::ReservedAttribute(id_attribute));
        }
        let custom_id = id_attribute != ID_ATTRIBUTE;

        let mut seen = BTreeSet::<String>::new();
        let mut attributes = Vec::with_capacity(self.attributes.len() + 1);
        for (raw_name, default) in self.attributes {
            let attr_name = raw_name.trim().to_string();
            if attr_name.is_empty() {
                return Err(SchemaError::EmptyAttributeName);
            }
            if RESERVED_ATTRIBUTES.contains(&attr_name.as_str()) {
                return Err(SchemaError::ReservedAttribute(attr_name));
            }
            if custom_id && attr_name == ID_ATTRIBUTE {
                return Err(SchemaError::IdAliasDeclared(id_attribute));
            }
            if !seen.insert(attr_name.clone()) {
                return Err(SchemaError::DuplicateAttribute(attr_name));
            }
            attributes.push((attr_name, default));
        }

        if !seen.contains(&id_attribute) {
            attributes.insert(0, (id_attribute.clone(), Value::Null));
        }

        Ok(Rc::new(RecordSchema {
            name,
            id_attribute,
            attributes,
            validator: self.validator,
            sync: self.sync,
        }))
    }
}

fn is_valid_type_name(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Schema declaration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    EmptyName,
    InvalidName(String),
    EmptyAttributeName,
    ReservedAttribute(String),
    DuplicateAttribute(String),
    /// `id` was declared although it aliases the named custom attribute.
    IdAliasDeclared(String),
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "record type name must not be empty"),
            Self::InvalidName(value) => write!(f, "record type name is invalid: {value}"),
            Self::EmptyAttributeName => write!(f, "attribute name must not be empty"),
            Self::ReservedAttribute(value) => write!(f, "attribute name is reserved: {value}"),
            Self::DuplicateAttribute(value) => {
                write!(f, "attribute is declared more than once: {value}")
            }
            Self::IdAliasDeclared(value) => write!(
                f,
                "`id` cannot be declared when the identity attribute is `{value}`"
            ),
        }
    }
}

impl Error for SchemaError {}
