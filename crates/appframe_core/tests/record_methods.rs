use appframe_core::{
    Attributes, ErrorEvent, Options, Record, RecordEvent, RecordEventKind, RecordSchema,
    SchemaRef, SyncAction, SyncCallback, SyncError, SyncRequest, SyncSubject,
};
use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn test_schema() -> SchemaRef {
    RecordSchema::builder("testModel")
        .attribute("foo", "")
        .attribute("bar", "")
        .build()
        .expect("valid schema")
}

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("object literal")
}

fn counter() -> (Rc<Cell<usize>>, Rc<Cell<usize>>) {
    let calls = Rc::new(Cell::new(0));
    (Rc::clone(&calls), calls)
}

#[test]
fn is_modified_is_true_for_new_records() {
    let schema = test_schema();
    assert!(Record::with_defaults(&schema).is_modified());
    assert!(!Record::new(&schema, attrs(json!({"id": "foo"}))).is_modified());
}

#[test]
fn is_modified_tracks_unsaved_changes() {
    let record = Record::new(&test_schema(), attrs(json!({"id": "foo"})));
    assert!(!record.is_modified());

    record.set("foo", "bar", &Options::new());
    assert!(record.is_modified());

    record.save(&Options::new());
    assert!(!record.is_modified());
}

#[test]
fn is_new_means_no_identity() {
    let schema = test_schema();
    assert!(Record::with_defaults(&schema).is_new());
    assert!(!Record::new(&schema, attrs(json!({"id": "foo"}))).is_new());
}

#[test]
fn load_delegates_read_to_sync_with_caller_options() {
    let record = Record::with_defaults(&test_schema());
    let requests = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&requests);
    record.set_sync_adapter(Rc::new(move |request: SyncRequest, callback: SyncCallback| {
        log.borrow_mut().push(request);
        callback(Ok(None));
    }));

    let options = Options::src("test").with_extra("page", 2);
    record.load(&options);

    let requests = requests.borrow();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action, SyncAction::Read);
    assert_eq!(requests[0].options, options);
    match &requests[0].subject {
        SyncSubject::Record(snapshot) => {
            assert_eq!(snapshot.kind, "testModel");
            assert_eq!(snapshot.client_id, record.client_id());
        }
        other => panic!("unexpected subject: {other:?}"),
    }
}

#[test]
fn load_resets_changed_and_merges_text_response() {
    let record = Record::with_defaults(&test_schema());
    record.set_sync_adapter(Rc::new(|_request: SyncRequest, callback: SyncCallback| {
        callback(Ok(Some(json!(r#"{"id": 7, "foo": "loaded"}"#))));
    }));

    record.set("bar", "local", &Options::new());
    assert_eq!(record.changed().len(), 1);

    record.load(&Options::new());
    assert!(record.changed().is_empty());
    assert_eq!(record.get("foo"), Some(json!("loaded")));
    assert_eq!(record.id(), Some(json!(7)));
}

#[test]
fn load_and_save_are_chainable_and_call_callbacks() {
    let record = Record::with_defaults(&test_schema());
    let (seen, calls) = counter();

    assert_eq!(record.load(&Options::new()), &record);
    let other = Rc::clone(&seen);
    let returned = record.load_with(&Options::new(), move |result| {
        assert!(result.is_ok());
        other.set(other.get() + 1);
    });
    assert_eq!(returned, &record);

    assert_eq!(record.save(&Options::new()), &record);
    let returned = record.save_with(&Options::new(), move |result| {
        assert!(result.is_ok());
        seen.set(seen.get() + 1);
    });
    assert_eq!(returned, &record);

    assert_eq!(calls.get(), 2);
}

#[test]
fn save_creates_new_records_then_updates_them() {
    let record = Record::with_defaults(&test_schema());
    let actions = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&actions);
    record.set_sync_adapter(Rc::new(move |request: SyncRequest, callback: SyncCallback| {
        log.borrow_mut().push(request.action);
        callback(Ok(Some(json!({"id": "foo"}))));
    }));

    record.save(&Options::new());
    assert_eq!(record.id(), Some(json!("foo")));
    record.save(&Options::new());

    assert_eq!(*actions.borrow(), vec![SyncAction::Create, SyncAction::Update]);
}

#[test]
fn save_resets_changed_on_success_only() {
    let record = Record::with_defaults(&test_schema());
    record.set("foo", "bar", &Options::new());
    record.save(&Options::new());
    assert!(record.changed().is_empty());

    record.set_sync_adapter(Rc::new(|_request: SyncRequest, callback: SyncCallback| {
        callback(Err(SyncError::adapter("offline", "no network")));
    }));
    record.set("foo", "baz", &Options::new());
    record.save(&Options::new());
    assert_eq!(record.changed().get("foo"), Some(&json!("baz")));
}

#[test]
fn unparsable_save_response_reports_parse_error() {
    let record = Record::with_defaults(&test_schema());
    record.set_sync_adapter(Rc::new(|_request: SyncRequest, callback: SyncCallback| {
        callback(Ok(Some(json!("moo"))));
    }));
    let (seen, errors) = counter();
    record.on(RecordEventKind::Error, move |facade| {
        if let RecordEvent::Error(ErrorEvent::Parse { .. }) = facade.event() {
            seen.set(seen.get() + 1);
        }
    });

    record.set("foo", "bar", &Options::new());
    let outcome = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&outcome);
    record.save_with(&Options::new(), move |result| *slot.borrow_mut() = Some(result));

    let err = outcome.borrow_mut().take().expect("callback ran").unwrap_err();
    assert_eq!(err.code(), "parse_failed");
    assert_eq!(errors.get(), 1);
    assert_eq!(record.changed().len(), 1);
}

#[test]
fn second_sync_while_pending_is_rejected_as_busy() {
    let record = Record::with_defaults(&test_schema());
    let parked: Rc<RefCell<Vec<SyncCallback>>> = Rc::new(RefCell::new(Vec::new()));
    let queue = Rc::clone(&parked);
    record.set_sync_adapter(Rc::new(move |_request: SyncRequest, callback: SyncCallback| {
        queue.borrow_mut().push(callback);
    }));

    let first = Rc::new(RefCell::new(None));
    let first_slot = Rc::clone(&first);
    record.save_with(&Options::new(), move |result| *first_slot.borrow_mut() = Some(result));

    let second = Rc::new(RefCell::new(None));
    let second_slot = Rc::clone(&second);
    record.load_with(&Options::new(), move |result| *second_slot.borrow_mut() = Some(result));

    assert_eq!(parked.borrow().len(), 1);
    assert_eq!(
        second.borrow_mut().take().expect("rejected immediately"),
        Err(SyncError::Busy {
            pending: SyncAction::Create,
            requested: SyncAction::Read,
        })
    );

    let callback = parked.borrow_mut().pop().expect("parked request");
    callback(Ok(None));
    assert_eq!(first.borrow_mut().take(), Some(Ok(())));

    let third = Rc::new(Cell::new(false));
    let third_flag = Rc::clone(&third);
    record.load_with(&Options::new(), move |_| third_flag.set(true));
    assert_eq!(parked.borrow().len(), 1);
    assert!(!third.get());
}

#[test]
fn parse_deserializes_text_and_passes_other_values_through() {
    let record = Record::with_defaults(&test_schema());

    let parsed = record.parse(&json!(r#"{"foo": "bar"}"#)).expect("valid JSON");
    assert_eq!(parsed["foo"], json!("bar"));

    let array = json!(["foo", "bar"]);
    assert_eq!(record.parse(&array), Some(array));
    let object = json!({"foo": "bar"});
    assert_eq!(record.parse(&object), Some(object));
}

#[test]
fn set_and_set_attrs_are_chainable() {
    let record = Record::with_defaults(&test_schema());

    assert_eq!(record.get("foo"), Some(json!("")));
    assert_eq!(record.set("foo", "bar", &Options::new()), &record);
    assert_eq!(record.get("foo"), Some(json!("bar")));

    let returned = record.set_attrs(attrs(json!({"foo": "foo", "bar": "bar"})), &Options::new());
    assert_eq!(returned, &record);
    assert_eq!(record.get("foo"), Some(json!("foo")));
    assert_eq!(record.get("bar"), Some(json!("bar")));
}

#[test]
fn default_sync_calls_back_without_response() {
    let record = Record::with_defaults(&test_schema());
    let (seen, calls) = counter();

    record.sync(SyncAction::Read, &Options::new(), move |result| {
        assert_eq!(result, Ok(None));
        seen.set(seen.get() + 1);
    });
    assert_eq!(calls.get(), 1);
}

#[test]
fn undo_reverts_the_previous_change() {
    let input = attrs(json!({"id": "id", "foo": "foo", "bar": "bar"}));
    let record = Record::new(&test_schema(), input.clone());
    assert_eq!(record.to_json(), input);

    record.set_attrs(attrs(json!({"foo": "moo", "bar": "quux"})), &Options::new());
    assert_eq!(record.to_json(), attrs(json!({"id": "id", "foo": "moo", "bar": "quux"})));

    assert_eq!(record.undo(None, &Options::new()), &record);
    assert_eq!(record.to_json(), input);
    assert_eq!(record.last_change()["foo"].src.as_deref(), Some("undo"));
}

#[test]
fn undo_reverts_only_named_attributes() {
    let record = Record::new(&test_schema(), attrs(json!({"id": "id", "foo": "foo", "bar": "bar"})));
    record.set_attrs(attrs(json!({"foo": "moo", "bar": "quux"})), &Options::new());

    record.undo(Some(&["foo"]), &Options::new());
    assert_eq!(record.to_json(), attrs(json!({"id": "id", "foo": "foo", "bar": "quux"})));
}

#[test]
fn undo_passes_options_to_set_attrs() {
    let record = Record::new(&test_schema(), attrs(json!({"id": "id", "foo": "foo", "bar": "bar"})));
    record.set_attrs(attrs(json!({"foo": "moo", "bar": "quux"})), &Options::new());

    let (seen, calls) = counter();
    record.on(RecordEventKind::Change, move |facade| {
        seen.set(seen.get() + 1);
        if let RecordEvent::Change(change) = facade.event() {
            assert_eq!(change.get("foo").and_then(|d| d.src.as_deref()), Some("test"));
        }
    });

    record.undo(None, &Options::src("test"));
    assert_eq!(calls.get(), 1);
}

#[test]
fn undo_without_previous_change_does_nothing() {
    let record = Record::with_defaults(&test_schema());
    record.on(RecordEventKind::Change, |_| panic!("`change` should not fire"));

    record.undo(None, &Options::new());
    assert!(record.last_change().is_empty());
}

#[test]
fn validate_accepts_by_default() {
    let record = Record::with_defaults(&test_schema());
    assert_eq!(record.validate(&record.to_json()), Ok(()));
}

#[test]
fn failed_validation_emits_error_and_keeps_state() {
    let record = Record::with_defaults(&test_schema());
    let (validated, validations) = counter();
    record.set_validator(move |attributes| {
        validated.set(validated.get() + 1);
        if attributes.get("foo") == Some(&json!("invalid")) {
            Err(json!("Invalid!"))
        } else {
            Ok(())
        }
    });
    let (seen, errors) = counter();
    record.on(RecordEventKind::Error, move |facade| {
        seen.set(seen.get() + 1);
        let RecordEvent::Error(error) = facade.event() else {
            panic!("expected error");
        };
        assert_eq!(error.kind_name(), "validate");
        if let ErrorEvent::Validate { error, .. } = error {
            assert_eq!(error, &json!("Invalid!"));
        }
    });

    record.set("foo", "bar", &Options::new());
    record.set("foo", "invalid", &Options::new());

    assert_eq!(validations.get(), 2);
    assert_eq!(errors.get(), 1);
    assert_eq!(record.get("foo"), Some(json!("bar")));
    assert_eq!(record.last_change()["foo"].new_val, json!("bar"));
}

#[test]
fn schema_validator_applies_unless_overridden() {
    let schema = RecordSchema::builder("testModel")
        .attribute("count", 0)
        .validator(|attributes| match attributes.get("count") {
            Some(Value::Number(n)) if n.as_i64().is_some_and(|n| n >= 0) => Ok(()),
            _ => Err(json!("count must be non-negative")),
        })
        .build()
        .expect("valid schema");
    let record = Record::with_defaults(&schema);

    record.set("count", -1, &Options::new());
    assert_eq!(record.get("count"), Some(json!(0)));

    record.set_validator(|_| Ok(()));
    record.set("count", -1, &Options::new());
    assert_eq!(record.get("count"), Some(json!(-1)));

    record.clear_validator();
    record.set("count", -2, &Options::new());
    assert_eq!(record.get("count"), Some(json!(-1)));
}
