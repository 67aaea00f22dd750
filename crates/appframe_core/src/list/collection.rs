//! Ordered, reference-unique record collection.
//!
//! # Responsibility
//! - Own membership, order and the clientId/identity indices.
//! - Run `add`/`remove`/`refresh`/`sort` as intent, commit, effect.
//! - Relay member `change`/`error` signals as `record_change`/`record_error`.
//!
//! # Invariants
//! - Positions are recomputed after the intent phase, since intent listeners
//!   may have mutated the collection.
//! - A relay is registered exactly once per membership and removed with it.
//! - No state borrow is held across comparator, listener or adapter calls.

use crate::event::{Decision, EventFacade, EventTarget, ListenerId};
use crate::list::event::{Bubbled, ListEvent, ListEventKind, MembershipEvent, RefreshEvent};
use crate::list::invoke::{InvokeError, Invoked, RecordCall};
use crate::list::order::compare_keys;
use crate::model::change::{Attributes, ChangeEvent, ErrorEvent, RecordEvent, RecordEventKind};
use crate::model::options::Options;
use crate::model::parse::{parse_response, ParseError};
use crate::model::record::Record;
use crate::model::schema::{SchemaRef, ID_ATTRIBUTE};
use crate::sync::{
    default_sync_adapter, SyncAction, SyncAdapter, SyncError, SyncRequest, SyncResult, SyncSubject,
};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

type Comparator = Rc<dyn Fn(&Record) -> Value>;

/// Shared handle to one collection. Clones refer to the same collection.
#[derive(Clone)]
pub struct Collection {
    inner: Rc<CollectionInner>,
}

pub(crate) struct CollectionInner {
    schema: SchemaRef,
    state: RefCell<ListState>,
    events: EventTarget<ListEvent>,
    comparator: RefCell<Option<Comparator>>,
    sync: RefCell<Rc<dyn SyncAdapter>>,
    pending_sync: Cell<Option<SyncAction>>,
}

#[derive(Default)]
struct ListState {
    items: Vec<Record>,
    by_client_id: HashMap<String, Record>,
    by_id: HashMap<String, Record>,
    /// Relay listener ids on each member, keyed by clientId.
    relays: HashMap<String, [ListenerId; 2]>,
}

/// Input accepted wherever a collection takes records.
///
/// Attribute maps are turned into records of the collection's schema.
#[derive(Debug, Clone)]
pub enum RecordInput {
    Record(Record),
    Attributes(Attributes),
}

impl From<Record> for RecordInput {
    fn from(value: Record) -> Self {
        Self::Record(value)
    }
}

impl From<&Record> for RecordInput {
    fn from(value: &Record) -> Self {
        Self::Record(value.clone())
    }
}

impl From<Attributes> for RecordInput {
    fn from(value: Attributes) -> Self {
        Self::Attributes(value)
    }
}

impl From<Value> for RecordInput {
    /// Non-object values become an empty attribute map.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Attributes(map),
            _ => Self::Attributes(Attributes::new()),
        }
    }
}

impl Collection {
    /// Creates an empty collection of `schema` records.
    ///
    /// The sync adapter defaults to the schema's, falling back to the no-op
    /// adapter.
    pub fn new(schema: &SchemaRef) -> Self {
        let sync = schema.sync_adapter().unwrap_or_else(default_sync_adapter);
        Self {
            inner: Rc::new(CollectionInner {
                schema: Rc::clone(schema),
                state: RefCell::new(ListState::default()),
                events: EventTarget::new(),
                comparator: RefCell::new(None),
                sync: RefCell::new(sync),
                pending_sync: Cell::new(None),
            }),
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.inner.schema
    }

    /// Orders members by the key `comparator` returns. Existing members are
    /// not reordered until [`Collection::sort`].
    pub fn set_comparator(&self, comparator: impl Fn(&Record) -> Value + 'static) {
        *self.inner.comparator.borrow_mut() = Some(Rc::new(comparator));
    }

    pub fn clear_comparator(&self) {
        *self.inner.comparator.borrow_mut() = None;
    }

    pub fn has_comparator(&self) -> bool {
        self.inner.comparator.borrow().is_some()
    }

    pub fn set_sync_adapter(&self, adapter: Rc<dyn SyncAdapter>) {
        *self.inner.sync.borrow_mut() = adapter;
    }

    /// Adds one record (or one record built from attributes).
    ///
    /// Returns `None` when the record is already a member or an `add`
    /// listener prevented it.
    pub fn add(&self, input: impl Into<RecordInput>, options: &Options) -> Option<Record> {
        let record = self.materialize(input.into());
        self.add_record(record, options)
    }

    /// Adds several records, each with its own `add` signal. Returns the
    /// records actually added, in input order.
    pub fn add_many<I>(&self, inputs: I, options: &Options) -> Vec<Record>
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        inputs
            .into_iter()
            .filter_map(|input| self.add(input, options))
            .collect()
    }

    /// Removes one member. Returns `None` for non-members and prevented
    /// removals.
    pub fn remove(&self, record: &Record, options: &Options) -> Option<Record> {
        let Some(index) = self.index_of(record) else {
            debug!(
                "event=list_remove module=list status=skip kind={} client_id={} reason=not_member",
                self.inner.schema.name(),
                record.client_id()
            );
            return None;
        };

        if !options.silent {
            let mut facade = EventFacade::new(
                ListEvent::Remove(membership(record, index, options)),
                true,
            );
            if self.inner.events.intent(&mut facade) == Decision::Prevented {
                debug!(
                    "event=list_remove module=list status=prevented kind={} client_id={}",
                    self.inner.schema.name(),
                    record.client_id()
                );
                return None;
            }
        }

        let index = self.index_of(record)?;
        self.detach_at(index);
        debug!(
            "event=list_remove module=list status=ok kind={} client_id={} index={}",
            self.inner.schema.name(),
            record.client_id(),
            index
        );
        if !options.silent {
            let mut facade = EventFacade::new(
                ListEvent::Remove(membership(record, index, options)),
                false,
            );
            self.inner.events.effect(&mut facade);
        }
        Some(record.clone())
    }

    /// Removes several members, each with its own `remove` signal.
    pub fn remove_many(&self, records: &[Record], options: &Options) -> Vec<Record> {
        records
            .iter()
            .filter_map(|record| self.remove(record, options))
            .collect()
    }

    /// Replaces the whole membership with `inputs`.
    ///
    /// Emits one preventable `refresh` signal and no per-record signals. A
    /// prevented refresh leaves membership and order untouched.
    pub fn refresh<I>(&self, inputs: I, options: &Options) -> Decision
    where
        I: IntoIterator,
        I::Item: Into<RecordInput>,
    {
        let mut records: Vec<Record> = Vec::new();
        for input in inputs {
            let record = self.materialize(input.into());
            if !records.contains(&record) {
                records.push(record);
            }
        }
        let records = self.ordered(records);
        let src = options.src.clone().unwrap_or_else(|| "refresh".to_string());
        self.replace_members(records, src, options)
    }

    /// Reorders members by the comparator, announced as a `refresh` with
    /// `src` `"sort"`. Does nothing without a comparator.
    pub fn sort(&self, options: &Options) -> Decision {
        if !self.has_comparator() {
            debug!(
                "event=list_sort module=list status=skip kind={} reason=no_comparator",
                self.inner.schema.name()
            );
            return Decision::Proceed;
        }
        let records = self.ordered(self.to_array());
        self.replace_members(records, "sort".to_string(), options)
    }

    /// Value of `name` on every member, in order.
    pub fn get(&self, name: &str) -> Vec<Option<Value>> {
        self.map(|record, _| record.get(name))
    }

    pub fn get_as_html(&self, name: &str) -> Vec<String> {
        self.map(|record, _| record.get_as_html(name))
    }

    pub fn get_as_url(&self, name: &str) -> Vec<String> {
        self.map(|record, _| record.get_as_url(name))
    }

    pub fn item(&self, index: usize) -> Option<Record> {
        self.inner.state.borrow().items.get(index).cloned()
    }

    pub fn size(&self) -> usize {
        self.inner.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn to_array(&self) -> Vec<Record> {
        self.inner.state.borrow().items.clone()
    }

    /// `to_json` of every member, in order.
    pub fn to_json(&self) -> Vec<Attributes> {
        self.map(|record, _| record.to_json())
    }

    /// Maps over a snapshot of the members; `f` may mutate the collection.
    pub fn map<T>(&self, mut f: impl FnMut(&Record, usize) -> T) -> Vec<T> {
        self.to_array()
            .iter()
            .enumerate()
            .map(|(index, record)| f(record, index))
            .collect()
    }

    /// Calls the named record operation on every member.
    ///
    /// The call is decoded once, so an unknown method or bad argument fails
    /// before any member is touched.
    pub fn invoke(&self, method: &str, args: &[Value]) -> Result<Vec<Invoked>, InvokeError> {
        let call = RecordCall::parse(method, args)?;
        Ok(self.map(|record, _| call.apply(record)))
    }

    pub fn get_by_client_id(&self, client_id: &str) -> Option<Record> {
        self.inner.state.borrow().by_client_id.get(client_id).cloned()
    }

    /// Looks a member up by identity value; `1` and `"1"` are the same key.
    ///
    /// Silent identity changes bypass the relay, so a stale index entry
    /// falls back to a scan of the members.
    pub fn get_by_id(&self, id: impl Into<Value>) -> Option<Record> {
        let key = id_key(&id.into())?;
        let has_key = |record: &Record| record.id().as_ref().and_then(id_key) == Some(key.clone());
        let indexed = self.inner.state.borrow().by_id.get(&key).cloned();
        match indexed {
            Some(record) if has_key(&record) => Some(record),
            _ => self.to_array().into_iter().find(|record| has_key(record)),
        }
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.inner
            .state
            .borrow()
            .by_client_id
            .get(record.client_id())
            .is_some_and(|member| member == record)
    }

    /// Delegates one action on the whole collection to its sync adapter.
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
            subject: SyncSubject::Collection {
                kind: self.inner.schema.name().to_string(),
            },
        };
        adapter.sync(request, Box::new(callback));
    }

    /// Deserializes textual input, emitting an `error` signal of kind
    /// `parse` on failure.
    pub fn parse(&self, raw: &Value) -> Option<Value> {
        self.parse_reporting(raw).ok()
    }

    /// Reads the collection and refreshes with the response.
    pub fn load(&self, options: &Options) -> &Self {
        self.load_with(options, |_| {})
    }

    /// Like [`Collection::load`], reporting the outcome to `callback`.
    ///
    /// An array response refreshes with its object entries; an object
    /// response refreshes with that single record.
    pub fn load_with(
        &self,
        options: &Options,
        callback: impl FnOnce(Result<(), SyncError>) + 'static,
    ) -> &Self {
        if let Some(pending) = self.inner.pending_sync.get() {
            warn!(
                "event=list_sync module=list status=rejected kind={} action=read pending={}",
                self.inner.schema.name(),
                pending
            );
            callback(Err(SyncError::Busy {
                pending,
                requested: SyncAction::Read,
            }));
            return self;
        }
        self.inner.pending_sync.set(Some(SyncAction::Read));

        let list = self.clone();
        let call_options = options.clone();
        self.sync(SyncAction::Read, options, move |result| {
            list.inner.pending_sync.set(None);
            let outcome =
                result.and_then(|response| list.refresh_from_response(response, &call_options));
            match &outcome {
                Ok(()) => info!(
                    "event=list_sync module=list status=ok kind={} action=read size={}",
                    list.inner.schema.name(),
                    list.size()
                ),
                Err(err) => warn!(
                    "event=list_sync module=list status=error kind={} action=read error_code={} error={}",
                    list.inner.schema.name(),
                    err.code(),
                    err
                ),
            }
            callback(outcome);
        });
        self
    }

    /// Saves a record and adds it once the save succeeds.
    pub fn create(&self, input: impl Into<RecordInput>, options: &Options) -> Record {
        self.create_with(input, options, |_| {})
    }

    /// Like [`Collection::create`], reporting the save outcome to `callback`.
    pub fn create_with(
        &self,
        input: impl Into<RecordInput>,
        options: &Options,
        callback: impl FnOnce(Result<(), SyncError>) + 'static,
    ) -> Record {
        let record = self.materialize(input.into());
        let list = self.clone();
        let added = record.clone();
        let add_options = options.clone();
        record.save_with(options, move |result| {
            if result.is_ok() {
                list.add(&added, &add_options);
            }
            callback(result);
        });
        record
    }

    /// Detaches every member without signals and drops all listeners.
    /// Members are not destroyed.
    pub fn destroy(&self) {
        let released = self.size();
        while !self.is_empty() {
            self.detach_at(self.size() - 1);
        }
        self.inner.events.detach_all();
        info!(
            "event=list_destroy module=list status=ok kind={} released={}",
            self.inner.schema.name(),
            released
        );
    }

    /// Registers an intent-phase listener.
    pub fn on(
        &self,
        kind: ListEventKind,
        handler: impl Fn(&mut EventFacade<ListEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.on(kind, handler)
    }

    /// Registers an effect-phase listener.
    pub fn after(
        &self,
        kind: ListEventKind,
        handler: impl Fn(&mut EventFacade<ListEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.after(kind, handler)
    }

    pub fn once(
        &self,
        kind: ListEventKind,
        handler: impl Fn(&mut EventFacade<ListEvent>) + 'static,
    ) -> ListenerId {
        self.inner.events.once(kind, handler)
    }

    pub fn detach(&self, id: ListenerId) -> bool {
        self.inner.events.detach(id)
    }

    pub(crate) fn from_inner(inner: Rc<CollectionInner>) -> Self {
        Self { inner }
    }

    fn add_record(&self, record: Record, options: &Options) -> Option<Record> {
        if self.contains(&record) {
            warn!(
                "event=list_add module=list status=skip kind={} client_id={} reason=duplicate",
                self.inner.schema.name(),
                record.client_id()
            );
            return None;
        }

        if !options.silent {
            let index = self.insertion_index(&record);
            let mut facade = EventFacade::new(
                ListEvent::Add(membership(&record, index, options)),
                true,
            );
            if self.inner.events.intent(&mut facade) == Decision::Prevented {
                debug!(
                    "event=list_add module=list status=prevented kind={} client_id={}",
                    self.inner.schema.name(),
                    record.client_id()
                );
                return None;
            }
            if self.contains(&record) {
                return None;
            }
        }

        let index = self.insertion_index(&record);
        self.attach_at(&record, index);
        debug!(
            "event=list_add module=list status=ok kind={} client_id={} index={}",
            self.inner.schema.name(),
            record.client_id(),
            index
        );
        if !options.silent {
            let mut facade = EventFacade::new(
                ListEvent::Add(membership(&record, index, options)),
                false,
            );
            self.inner.events.effect(&mut facade);
        }
        Some(record)
    }

    fn replace_members(&self, records: Vec<Record>, src: String, options: &Options) -> Decision {
        let event = RefreshEvent {
            records: records.clone(),
            src,
            extra: options.extra.clone(),
        };
        if !options.silent {
            let mut facade = EventFacade::new(ListEvent::Refresh(event.clone()), true);
            if self.inner.events.intent(&mut facade) == Decision::Prevented {
                debug!(
                    "event=list_refresh module=list status=prevented kind={} src={}",
                    self.inner.schema.name(),
                    event.src
                );
                return Decision::Prevented;
            }
        }

        while !self.is_empty() {
            self.detach_at(self.size() - 1);
        }
        for (index, record) in records.iter().enumerate() {
            self.attach_at(record, index);
        }
        info!(
            "event=list_refresh module=list status=ok kind={} src={} size={}",
            self.inner.schema.name(),
            event.src,
            records.len()
        );
        if !options.silent {
            let mut facade = EventFacade::new(ListEvent::Refresh(event), false);
            self.inner.events.effect(&mut facade);
        }
        Decision::Proceed
    }

    fn refresh_from_response(
        &self,
        response: Option<Value>,
        options: &Options,
    ) -> Result<(), SyncError> {
        let Some(raw) = response else {
            return Ok(());
        };
        match self.parse_reporting(&raw)? {
            Value::Array(entries) => {
                let inputs: Vec<RecordInput> = entries
                    .into_iter()
                    .filter(Value::is_object)
                    .map(RecordInput::from)
                    .collect();
                self.refresh(inputs, options);
            }
            Value::Object(attributes) => {
                self.refresh([RecordInput::Attributes(attributes)], options);
            }
            _ => debug!(
                "event=list_load module=list status=skip kind={} reason=non_list_response",
                self.inner.schema.name()
            ),
        }
        Ok(())
    }

    fn parse_reporting(&self, raw: &Value) -> Result<Value, ParseError> {
        parse_response(raw).map_err(|error| {
            warn!(
                "event=list_parse module=list status=error kind={} error={}",
                self.inner.schema.name(),
                error
            );
            self.inner.events.notify(ListEvent::Error(ErrorEvent::Parse {
                response: raw.clone(),
                error: error.clone(),
            }));
            error
        })
    }

    fn materialize(&self, input: RecordInput) -> Record {
        match input {
            RecordInput::Record(record) => record,
            RecordInput::Attributes(attributes) => Record::new(&self.inner.schema, attributes),
        }
    }

    fn index_of(&self, record: &Record) -> Option<usize> {
        self.inner
            .state
            .borrow()
            .items
            .iter()
            .position(|member| member == record)
    }

    /// Comparator position after every member with an equal key, or the end.
    fn insertion_index(&self, record: &Record) -> usize {
        let comparator = self.inner.comparator.borrow().clone();
        let items = self.to_array();
        match comparator {
            Some(comparator) => {
                let key = comparator(record);
                items.partition_point(|member| {
                    compare_keys(&comparator(member), &key) != Ordering::Greater
                })
            }
            None => items.len(),
        }
    }

    /// Stable comparator sort; identity order without a comparator.
    fn ordered(&self, records: Vec<Record>) -> Vec<Record> {
        let comparator = self.inner.comparator.borrow().clone();
        let Some(comparator) = comparator else {
            return records;
        };
        let mut keyed: Vec<(Value, Record)> = records
            .into_iter()
            .map(|record| (comparator(&record), record))
            .collect();
        keyed.sort_by(|(left, _), (right, _)| compare_keys(left, right));
        keyed.into_iter().map(|(_, record)| record).collect()
    }

    fn attach_at(&self, record: &Record, index: usize) {
        let relays = self.register_relays(record);
        {
            let mut state = self.inner.state.borrow_mut();
            let index = index.min(state.items.len());
            state.items.insert(index, record.clone());
            state
                .by_client_id
                .insert(record.client_id().to_string(), record.clone());
            if let Some(key) = record.id().as_ref().and_then(id_key) {
                state.by_id.insert(key, record.clone());
            }
            state
                .relays
                .insert(record.client_id().to_string(), relays);
        }
        record.attach_list(Rc::downgrade(&self.inner));
    }

    fn detach_at(&self, index: usize) {
        let (record, relays) = {
            let mut state = self.inner.state.borrow_mut();
            if index >= state.items.len() {
                return;
            }
            let record = state.items.remove(index);
            state.by_client_id.remove(record.client_id());
            if let Some(key) = record.id().as_ref().and_then(id_key) {
                if state.by_id.get(&key) == Some(&record) {
                    state.by_id.remove(&key);
                }
            }
            let relays = state.relays.remove(record.client_id());
            (record, relays)
        };
        for id in relays.into_iter().flatten() {
            record.detach(id);
        }
        record.detach_list(&Rc::downgrade(&self.inner));
    }

    /// Subscribes to the member's `change` and `error` effect phase.
    fn register_relays(&self, record: &Record) -> [ListenerId; 2] {
        let list = Rc::downgrade(&self.inner);
        let member = record.downgrade();
        let change = record.events().after(RecordEventKind::Change, move |facade| {
            let (Some(inner), Some(record)) = (list.upgrade(), Record::upgrade(&member)) else {
                return;
            };
            if let RecordEvent::Change(change) = facade.event() {
                let list = Collection::from_inner(inner);
                list.reindex(&record, change);
                list.inner.events.notify(ListEvent::RecordChange(Bubbled {
                    target: record,
                    current_target: list.clone(),
                    event: change.clone(),
                }));
            }
        });

        let list = Rc::downgrade(&self.inner);
        let member = record.downgrade();
        let error = record.events().after(RecordEventKind::Error, move |facade| {
            let (Some(inner), Some(record)) = (list.upgrade(), Record::upgrade(&member)) else {
                return;
            };
            if let RecordEvent::Error(error) = facade.event() {
                let list = Collection::from_inner(inner);
                list.inner.events.notify(ListEvent::RecordError(Bubbled {
                    target: record,
                    current_target: list.clone(),
                    event: error.clone(),
                }));
            }
        });
        [change, error]
    }

    /// Moves the identity index entry when a member's identity changed.
    fn reindex(&self, record: &Record, change: &ChangeEvent) {
        let Some(descriptor) = change.get(ID_ATTRIBUTE) else {
            return;
        };
        let mut state = self.inner.state.borrow_mut();
        if let Some(previous) = id_key(&descriptor.prev_val) {
            if state.by_id.get(&previous) == Some(record) {
                state.by_id.remove(&previous);
            }
        }
        if let Some(current) = id_key(&descriptor.new_val) {
            state.by_id.insert(current, record.clone());
        }
    }
}

impl PartialEq for Collection {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Collection {}

impl Debug for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Collection")
            .field("kind", &self.inner.schema.name())
            .field(
                "members",
                &state
                    .items
                    .iter()
                    .map(Record::client_id)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn membership(record: &Record, index: usize, options: &Options) -> MembershipEvent {
    MembershipEvent {
        record: record.clone(),
        index,
        src: options.src.clone(),
        extra: options.extra.clone(),
    }
}

/// Index key for an identity value; `null` is never indexed.
fn id_key(id: &Value) -> Option<String> {
    match id {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::Collection;
    use crate::model::options::Options;
    use crate::model::schema::RecordSchema;
    use serde_json::json;

    #[test]
    fn identity_lookup_accepts_numbers_and_strings() {
        let list = Collection::new(&RecordSchema::generic());
        let record = list.add(json!({"id": 1}), &Options::new()).unwrap();

        assert_eq!(list.get_by_id(1), Some(record.clone()));
        assert_eq!(list.get_by_id("1"), Some(record));
        assert_eq!(list.get_by_id(json!(null)), None);
    }

    #[test]
    fn identity_index_follows_member_changes() {
        let list = Collection::new(&RecordSchema::generic());
        let record = list.add(json!({"id": "a"}), &Options::new()).unwrap();

        record.set("id", "b", &Options::new());
        assert_eq!(list.get_by_id("a"), None);
        assert_eq!(list.get_by_id("b"), Some(record.clone()));

        record.set("id", "c", &Options::silent());
        assert_eq!(list.get_by_id("b"), None);
        assert_eq!(list.get_by_id("c"), Some(record));
    }

    #[test]
    fn destroy_releases_members_without_destroying_them() {
        let list = Collection::new(&RecordSchema::generic());
        let record = list.add(json!({}), &Options::new()).unwrap();

        list.destroy();
        assert!(list.is_empty());
        assert!(!record.is_destroyed());
        assert!(record.lists().is_empty());
        assert_eq!(list.get_by_client_id(record.client_id()), None);
    }
}
