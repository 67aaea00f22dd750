//! Per-call options bag shared by record, collection and sync operations.

use serde_json::{Map, Value};

/// Options accepted by mutating and persistence operations.
///
/// `extra` carries caller-defined keys; collections copy them onto the
/// `add`/`remove`/`refresh` signals they emit, and sync adapters receive the
/// whole bag unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Suppress signals while still applying state changes.
    pub silent: bool,
    /// Provenance tag copied into change descriptors and collection signals.
    pub src: Option<String>,
    /// For `destroy`: delete through the sync adapter before destroying.
    pub delete: bool,
    pub extra: Map<String, Value>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for `Options::new().with_silent(true)`.
    pub fn silent() -> Self {
        Self::new().with_silent(true)
    }

    /// Shorthand for `Options::new().with_src(src)`.
    pub fn src(src: impl Into<String>) -> Self {
        Self::new().with_src(src)
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_src(mut self, src: impl Into<String>) -> Self {
        self.src = Some(src.into());
        self
    }

    pub fn with_delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    /// Reads an options object: `silent`, `src` and `delete` are recognized,
    /// every other key lands in `extra`.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let mut options = Self::new();
        for (key, value) in map {
            match (key.as_str(), value) {
                ("silent", Value::Bool(flag)) => options.silent = *flag,
                ("delete", Value::Bool(flag)) => options.delete = *flag,
                ("src", Value::String(src)) => options.src = Some(src.clone()),
                ("src", Value::Null) => options.src = None,
                _ => {
                    options.extra.insert(key.clone(), value.clone());
                }
            }
        }
        options
    }
}
