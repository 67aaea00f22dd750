//! Observable record.
//!
//! # Responsibility
//! - Hold one record's attributes and track `changed` / `last_change`.
//! - Validate, apply and announce attribute mutations.
//! - Drive save/load/destroy through the record's sync adapter.
//!
//! # Invariants
//! - `id` and the identity attribute always read the same value; a change to
//!   either is reported under both names.
//! - `changed` and `last_change` are only written by set/save/load/undo.
//! - Rejected validation never mutates state.
//! - No state borrow is held while listeners or adapters run.

use crate::event::{EventFacade, EventTarget, ListenerId};
use crate::list::collection::{Collection, CollectionInner};
use crate::model::change::{
    Attributes, ChangeDescriptor, ChangeEvent, ChangeSet, ErrorEvent, RecordEvent,
    RecordEventKind,
};
use crate::model::escape::{encode_uri_component, escape_html, value_to_text};
use crate::model::options::Options;
use crate::model::parse::{parse_response, ParseError};
use crate::model::schema::{
    SchemaRef, ValidateFn, CLIENT_ID_ATTRIBUTE, DESTROYED_ATTRIBUTE, ID_ATTRIBUTE,
};
use crate::sync::{
    default_sync_adapter, RecordSnapshot, SyncAction, SyncAdapter, SyncError, SyncRequest,
    SyncResult, SyncSubject,
};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Completion callback for save/load/destroy.
pub type Completion = Box<dyn FnOnce(Result<(), SyncError>)>;

/// Shared handle to one observable record.
///
/// Clones refer to the same record; equality is identity.
#[derive(Clone)]
pub struct Record {
    inner: Rc<RecordInner>,
}

pub(crate) struct RecordInner {
    schema: SchemaRef,
    client_id: String,
    state: RefCell<RecordState>,
    events: EventTarget<RecordEvent>,
    validator: RefCell<Option<Rc<ValidateFn>>>,
    sync: RefCell<Rc<dyn SyncAdapter>>,
}

#[derive(Default)]
struct RecordState {
    /// Keyed by canonical names; the `id` alias is never stored separately.
    attributes: Attributes,
    changed: Attributes,
    last_change: ChangeSet,
    destroyed: bool,
    pending_sync: Option<SyncAction>,
    lists: Vec<Weak<CollectionInner>>,
}

impl Record {
    /// Creates a record from schema defaults overlaid with `attributes`.
    ///
    /// Construction values are not changes: `changed` and `last_change`
    /// start empty and no signal is emitted.
    pub fn new(schema: &SchemaRef, attributes: Attributes) -> Self {
        let mut values = Attributes::new();
        for (name, default) in schema.attributes() {
            values.insert(name.to_string(), default.clone());
        }
        for (name, value) in attributes {
            if is_read_only(&name) {
                debug!(
                    "event=record_init module=model status=skip kind={} attribute={} reason=read_only",
                    schema.name(),
                    name
                );
                continue;
            }
            values.insert(schema.canonical_name(&name).to_string(), value);
        }

        let client_id = next_client_id(schema.name());
        let sync = schema.sync_adapter().unwrap_or_else(default_sync_adapter);
        debug!(
            "event=record_init module=model status=ok kind={} client_id={}",
            schema.name(),
            client_id
        );

        Self {
            inner: Rc::new(RecordInner {
                schema: Rc::clone(schema),
                client_id,
                state: RefCell::new(RecordState {
                    attributes: values,
                    ..RecordState::default()
                }),
                events: EventTarget::new(),
                validator: RefCell::new(None),
                sync: RefCell::new(sync),
            }),
        }
    }

    /// Creates a record holding only schema defaults.
    pub fn with_defaults(schema: &SchemaRef) -> Self {
        Self::new(schema, Attributes::new())
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.inner.schema
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Identity value, `None` while the record is new.
    pub fn id(&self) -> Option<Value> {
        self.get(ID_ATTRIBUTE).filter(|value| !value.is_null())
    }

    /// Generates a fresh client id for this record's type. Does not change
    /// the record's own `clientId`.
    pub fn generate_client_id(&self) -> String {
        next_client_id(self.inner.schema.name())
    }

    /// Reads one attribute; `id` and the identity attribute are
    /// interchangeable.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            CLIENT_ID_ATTRIBUTE => Some(Value::String(self.inner.client_id.clone())),
            DESTROYED_ATTRIBUTE => Some(Value::Bool(self.is_destroyed())),
            _ => {
                let canonical = self.inner.schema.canonical_name(name);
                self.inner.state.borrow().attributes.get(canonical).cloned()
            }
        }
    }

    /// HTML-escaped string form of an attribute.
    pub fn get_as_html(&self, name: &str) -> String {
        escape_html(&value_to_text(self.get(name).as_ref()))
    }

    /// Percent-encoded string form of an attribute.
    pub fn get_as_url(&self, name: &str) -> String {
        encode_uri_component(&value_to_text(self.get(name).as_ref()))
    }

    /// Sets one attribute. See [`Record::set_attrs`].
    pub fn set(&self, name: &str, value: impl Into<Value>, options: &Options) -> &Self {
        let mut attributes = Attributes::new();
        attributes.insert(name.to_string(), value.into());
        self.set_attrs(attributes, options)
    }

    /// Validates and applies several attributes as one change.
    ///
    /// On rejection an `error` signal of kind `validate` is emitted and
    /// nothing changes. Otherwise every differing value is applied, recorded
    /// in `changed` and `last_change`, and one `change` signal lists them all
    /// unless `options.silent`.
    pub fn set_attrs(&self, attributes: Attributes, options: &Options) -> &Self {
        let schema = &self.inner.schema;
        let mut updates = Attributes::new();
        for (name, value) in attributes {
            if is_read_only(&name) {
                warn!(
                    "event=record_set module=model status=skip kind={} client_id={} attribute={} reason=read_only",
                    schema.name(),
                    self.inner.client_id,
                    name
                );
                continue;
            }
            updates.insert(schema.canonical_name(&name).to_string(), value);
        }
        if updates.is_empty() {
            return self;
        }

        let candidate = {
            let state = self.inner.state.borrow();
            let mut candidate = state.attributes.clone();
            for (name, value) in &updates {
                candidate.insert(name.clone(), value.clone());
            }
            self.with_alias(candidate)
        };
        if let Err(error) = self.validate(&candidate) {
            debug!(
                "event=record_set module=model status=rejected kind={} client_id={}",
                schema.name(),
                self.inner.client_id
            );
            self.inner.events.notify(RecordEvent::Error(ErrorEvent::Validate {
                attributes: self.with_alias(updates),
                error,
            }));
            return self;
        }

        let changes = {
            let mut state = self.inner.state.borrow_mut();
            let mut changes = ChangeSet::new();
            for (name, new_val) in updates {
                let prev_val = state.attributes.get(&name).cloned().unwrap_or(Value::Null);
                if prev_val == new_val {
                    continue;
                }
                state.attributes.insert(name.clone(), new_val.clone());
                let descriptor = ChangeDescriptor {
                    new_val,
                    prev_val,
                    src: options.src.clone(),
                };
                if schema.has_custom_id() && name == schema.id_attribute() {
                    state
                        .changed
                        .insert(ID_ATTRIBUTE.to_string(), descriptor.new_val.clone());
                    changes.insert(ID_ATTRIBUTE.to_string(), descriptor.clone());
                }
                state.changed.insert(name.clone(), descriptor.new_val.clone());
                changes.insert(name, descriptor);
            }
            if !changes.is_empty() {
                state.last_change = changes.clone();
            }
            changes
        };
        if changes.is_empty() {
            return self;
        }

        debug!(
            "event=record_set module=model status=ok kind={} client_id={} changed_count={} silent={}",
            schema.name(),
            self.inner.client_id,
            changes.len(),
            options.silent
        );
        if !options.silent {
            self.inner.events.notify(RecordEvent::Change(ChangeEvent {
                changed: changes,
                src: options.src.clone(),
            }));
        }
        self
    }

    /// Runs the validation hook: the per-record override if set, then the
    /// schema's, otherwise accepts.
    pub fn validate(&self, attributes: &Attributes) -> Result<(), Value> {
        let validator = self
            .inner
            .validator
            .borrow()
            .clone()
            .or_else(|| self.inner.schema.validator());
        match validator {
            Some(validator) => validator(attributes),
            None => Ok(()),
        }
    }

    /// Replaces the validation hook for this record only.
    pub fn set_validator(&self, validator: impl Fn(&Attributes) -> Result<(), Value> + 'static) {
        *self.inner.validator.borrow_mut() = Some(Rc::new(validator));
    }

    pub fn clear_validator(&self) {
        *self.inner.validator.borrow_mut() = None;
    }

    /// Attributes changed since the last successful save or load.
    pub fn changed(&self) -> Attributes {
        self.inner.state.borrow().changed.clone()
    }

    /// Descriptors of the most recent mutating call.
    pub fn last_change(&self) -> ChangeSet {
        self.inner.state.borrow().last_change.clone()
    }

    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    pub fn is_modified(&self) -> bool {
        self.is_new() || !self.inner.state.borrow().changed.is_empty()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.state.borrow().destroyed
    }

    /// Reverts attributes to their values before `last_change`.
    ///
    /// `names` limits the revert to those attributes. The revert goes
    /// through [`Record::set_attrs`]; `src` defaults to `"undo"`. Does
    /// nothing when there is nothing to revert.
    pub fn undo(&self, names: Option<&[&str]>, options: &Options) -> &Self {
        let reverted: Attributes = self
            .inner
            .state
            .borrow()
            .last_change
            .iter()
            .filter(|(name, _)| names.map_or(true, |names| names.contains(&name.as_str())))
            .map(|(name, descriptor)| (name.clone(), descriptor.prev_val.clone()))
            .collect();
        if reverted.is_empty() {
            debug!(
                "event=record_undo module=model status=skip client_id={} reason=no_change",
                self.inner.client_id
            );
            return self;
        }

        let mut options = options.clone();
        if options.src.is_none() {
            options.src = Some("undo".to_string());
        }
        self.set_attrs(reverted, &options)
    }

    /// Copy of the attributes for serialization.
    ///
    /// Excludes `clientId` and `destroyed`; with a custom identity attribute
    /// only that name appears, never the `id` alias.
    pub fn to_json(&self) -> Attributes {
        self.inner.state.borrow().attributes.clone()
    }

    /// Deserializes textual input, passing other values through.
    ///
    /// Failures emit an `error` signal of kind `parse` and return `None`.
    pub fn parse(&self, raw: &Value) -> Option<Value> {
        self.parse_reporting(raw).ok()
    }

    /// Delegates one action to the record's sync adapter.
    pub fn sync(
        &self,
        action: SyncAction,
        options: &Options,
        callback: impl FnOnce(SyncResult) + 'static,
    ) {
        let adapter = Rc::clone(&self.inner.sync.borrow());
        let request = SyncRequest {
            action,
            options: options.clone(),
            subject: SyncSubject::Record(self.snapshot()),
        };
        adapter.sync(request, Box::new(callback));
    }

    /// Replaces the sync adapter for this record only.
    pub fn set_sync_adapter(&self, adapter: Rc<dyn SyncAdapter>) {
        *self.inner.sync.borrow_mut() = adapter;
    }

    /// Saves with `create` when new, `update` otherwise.
    pub fn save(&self, options: &Options) -> &Self {
        self.save_with(options, |_| {})
    }

    /// Like [`Record::save`], reporting the outcome to `callback`.
    ///
    /// On success a mapping response is merged into the attributes and
    /// `changed` is cleared.
    pub fn save_with(
        &self,
        options: &Options,
        callback: impl FnOnce(Result<(), SyncError>) + 'static,
    ) -> &Self {
        let action = if self.is_new() {
            SyncAction::Create
        } else {
            SyncAction::Update
        };
        self.dispatch(action, options, Box::new(callback), |record, response, options| {
            record.merge_response(response, options)
        });
        self
    }

    /// Reads the record through the sync adapter.
    pub fn load(&self, options: &Options) -> &Self {
        self.load_with(options, |_| {})
    }

    /// Like [`Record::load`], reporting the outcome to `callback`.
    pub fn load_with(
        &self,
        options: &Options,
        callback: impl FnOnce(Result<(), SyncError>) + 'static,
    ) -> &Self {
        self.dispatch(
            SyncAction::Read,
            options,
            Box::new(callback),
            |record, response, options| record.merge_response(response, options),
        );
        self
    }

    /// Destroys the record. See [`Record::destroy_with`].
    pub fn destroy(&self, options: &Options) -> &Self {
        self.destroy_with(options, |_| {})
    }

    /// Destroys the record, deleting it through the adapter first when
    /// `options.delete` is set.
    ///
    /// Destruction removes the record from every collection holding it,
    /// marks it destroyed and detaches its listeners. A failed delete leaves
    /// the record untouched.
    pub fn destroy_with(
        &self,
        options: &Options,
        callback: impl FnOnce(Result<(), SyncError>) + 'static,
    ) -> &Self {
        if self.is_destroyed() {
            debug!(
                "event=record_destroy module=model status=skip client_id={} reason=already_destroyed",
                self.inner.client_id
            );
            callback(Ok(()));
            return self;
        }

        if options.delete {
            self.dispatch(
                SyncAction::Delete,
                options,
                Box::new(callback),
                |record, _response, options| {
                    record.finish_destroy(options);
                    Ok(())
                },
            );
        } else {
            self.finish_destroy(options);
            callback(Ok(()));
        }
        self
    }

    /// Collections currently holding this record.
    pub fn lists(&self) -> Vec<Collection> {
        self.inner
            .state
            .borrow()
            .lists
            .iter()
            .filter_map(Weak::upgrade)
            .map(Collection::from_inner)
            .collect()
    }

    /// Registers an intent-phase listener on this record.
    pub fn on(
        &self,
        kind: RecordEventKind,
        handler: impl Fn(&mut EventFacade<RecordEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.on(kind, handler)
    }

    /// Registers an effect-phase listener on this record.
    pub fn after(
        &self,
        kind: RecordEventKind,
        handler: impl Fn(&mut EventFacade<RecordEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.after(kind, handler)
    }

    pub fn once(
        &self,
        kind: RecordEventKind,
        handler: impl Fn(&mut EventFacade<RecordEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.once(kind, handler)
    }

    pub fn detach(&self, id: ListenerId) -> bool {
        self.inner.events.detach(id)
    }

    /// Record state as seen by sync adapters.
    pub fn snapshot(&self) -> RecordSnapshot {
        RecordSnapshot {
            kind: self.inner.schema.name().to_string(),
            client_id: self.inner.client_id.clone(),
            id_attribute: self.inner.schema.id_attribute().to_string(),
            id: self.id(),
            attributes: self.to_json(),
        }
    }

    pub(crate) fn events(&self) -> &EventTarget<RecordEvent> {
        &self.inner.events
    }

    pub(crate) fn downgrade(&self) -> Weak<RecordInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<RecordInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub(crate) fn attach_list(&self, list: Weak<CollectionInner>) {
        let mut state = self.inner.state.borrow_mut();
        if !state.lists.iter().any(|held| held.ptr_eq(&list)) {
            state.lists.push(list);
        }
    }

    pub(crate) fn detach_list(&self, list: &Weak<CollectionInner>) {
        self.inner
            .state
            .borrow_mut()
            .lists
            .retain(|held| !held.ptr_eq(list) && held.strong_count() > 0);
    }

    pub(crate) fn parse_reporting(&self, raw: &Value) -> Result<Value, ParseError> {
        parse_response(raw).map_err(|error| {
            warn!(
                "event=record_parse module=model status=error client_id={} error={}",
                self.inner.client_id, error
            );
            self.inner.events.notify(RecordEvent::Error(ErrorEvent::Parse {
                response: raw.clone(),
                error: error.clone(),
            }));
            error
        })
    }

    /// Issues one sync request, rejecting it while another is pending.
    ///
    /// `on_success` runs before the completion callback and may turn the
    /// response into a failure.
    fn dispatch(
        &self,
        action: SyncAction,
        options: &Options,
        callback: Completion,
        on_success: impl FnOnce(&Record, Option<Value>, &Options) -> Result<(), SyncError> + 'static,
    ) {
        let pending = self.inner.state.borrow().pending_sync;
        if let Some(pending) = pending {
            warn!(
                "event=record_sync module=model status=rejected client_id={} action={} pending={}",
                self.inner.client_id, action, pending
            );
            callback(Err(SyncError::Busy {
                pending,
                requested: action,
            }));
            return;
        }
        self.inner.state.borrow_mut().pending_sync = Some(action);

        let record = self.clone();
        let call_options = options.clone();
        self.sync(action, options, move |result| {
            record.inner.state.borrow_mut().pending_sync = None;
            let outcome = result.and_then(|response| on_success(&record, response, &call_options));
            match &outcome {
                Ok(()) => info!(
                    "event=record_sync module=model status=ok kind={} client_id={} action={}",
                    record.inner.schema.name(),
                    record.inner.client_id,
                    action
                ),
                Err(err) => warn!(
                    "event=record_sync module=model status=error kind={} client_id={} action={} error_code={} error={}",
                    record.inner.schema.name(),
                    record.inner.client_id,
                    action,
                    err.code(),
                    err
                ),
            }
            callback(outcome);
        });
    }

    fn merge_response(&self, response: Option<Value>, options: &Options) -> Result<(), SyncError> {
        if let Some(raw) = response {
            match self.parse_reporting(&raw)? {
                Value::Object(attributes) => {
                    self.set_attrs(attributes, options);
                }
                Value::Null => {}
                other => debug!(
                    "event=record_merge module=model status=skip client_id={} reason=non_object response_type={}",
                    self.inner.client_id,
                    json_type_name(&other)
                ),
            }
        }
        self.inner.state.borrow_mut().changed.clear();
        Ok(())
    }

    fn finish_destroy(&self, options: &Options) {
        for list in self.lists() {
            list.remove(self, options);
        }
        self.inner.state.borrow_mut().destroyed = true;
        self.inner.events.detach_all();
        info!(
            "event=record_destroy module=model status=ok kind={} client_id={} deleted={}",
            self.inner.schema.name(),
            self.inner.client_id,
            options.delete
        );
    }

    /// Adds the `id` alias next to a custom identity attribute.
    fn with_alias(&self, mut attributes: Attributes) -> Attributes {
        let schema = &self.inner.schema;
        if schema.has_custom_id() {
            if let Some(value) = attributes.get(schema.id_attribute()).cloned() {
                attributes.insert(ID_ATTRIBUTE.to_string(), value);
            }
        }
        attributes
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Record {}

impl Debug for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Record")
            .field("kind", &self.inner.schema.name())
            .field("client_id", &self.inner.client_id)
            .field("attributes", &state.attributes)
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn next_client_id(kind: &str) -> String {
    format!("{kind}_{}", NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed))
}

fn is_read_only(name: &str) -> bool {
    name == CLIENT_ID_ATTRIBUTE || name == DESTROYED_ATTRIBUTE
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
