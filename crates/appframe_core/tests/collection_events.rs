use appframe_core::{
    Collection, Decision, ErrorEvent, ListEvent, ListEventKind, Options, Record, RecordSchema,
    SchemaRef,
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

fn count(list: &Collection, kind: ListEventKind, after: bool) -> Rc<Cell<usize>> {
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    let handler = move |_: &mut appframe_core::EventFacade<ListEvent>| seen.set(seen.get() + 1);
    if after {
        list.after(kind, handler);
    } else {
        list.on(kind, handler);
    }
    calls
}

#[test]
fn add_signal_fires_for_each_added_record() {
    let schema = test_schema();
    let list = Collection::new(&schema);
    let record = Record::with_defaults(&schema);
    let calls = Rc::new(Cell::new(0));

    let seen = Rc::clone(&calls);
    let expected = record.clone();
    list.once(ListEventKind::Add, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::Add(added) = facade.event() else {
            panic!("expected add");
        };
        assert_eq!(added.record, expected);
        assert_eq!(added.index, 0);
        assert_eq!(added.src.as_deref(), Some("test"));
    });
    list.add(&record, &Options::src("test"));

    let seen = Rc::clone(&calls);
    list.after(ListEventKind::Add, move |_| seen.set(seen.get() + 1));
    list.add_many([json!({}), json!({})], &Options::new());

    assert_eq!(calls.get(), 3);
}

#[test]
fn add_signal_is_preventable() {
    let list = Collection::new(&test_schema());
    let intents = count(&list, ListEventKind::Add, false);
    list.on(ListEventKind::Add, |facade| facade.prevent_default());
    list.after(ListEventKind::Add, |_| panic!("add should be prevented"));

    let record = Record::with_defaults(list.schema());
    assert_eq!(list.add(&record, &Options::new()), None);

    assert_eq!(intents.get(), 1);
    assert_eq!(list.size(), 0);
    assert_eq!(list.get_by_client_id(record.client_id()), None);
    assert!(record.lists().is_empty());
}

#[test]
fn add_signal_is_skipped_when_silent() {
    let list = Collection::new(&test_schema());
    list.on(ListEventKind::Add, |_| panic!("add should not fire"));

    list.add(json!({}), &Options::silent());
    list.add_many([json!({}), json!({})], &Options::silent());
    assert_eq!(list.size(), 3);
}

#[test]
fn add_signal_carries_extra_options() {
    let list = Collection::new(&test_schema());
    let extras = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&extras);
    list.after(ListEventKind::Add, move |facade| {
        if let ListEvent::Add(added) = facade.event() {
            log.borrow_mut().push(added.extra.get("batch").cloned());
        }
    });

    list.add(json!({}), &Options::new().with_extra("batch", 7));
    assert_eq!(*extras.borrow(), vec![Some(json!(7))]);
}

#[test]
fn change_signals_bubble_from_members() {
    let list = Collection::new(&test_schema());
    let record = list.add(json!({}), &Options::new()).expect("added");
    let calls = Rc::new(Cell::new(0));

    let seen = Rc::clone(&calls);
    let expected_list = list.clone();
    let expected_record = record.clone();
    list.on(ListEventKind::RecordChange, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::RecordChange(bubbled) = facade.event() else {
            panic!("expected record change");
        };
        assert_eq!(bubbled.target, expected_record);
        assert_eq!(bubbled.current_target, expected_list);
    });

    record
        .set("foo", "foo", &Options::new())
        .set("bar", "bar", &Options::new());
    assert_eq!(calls.get(), 2);
}

#[test]
fn error_signals_bubble_from_members() {
    let list = Collection::new(&test_schema());
    let record = list.add(json!({}), &Options::new()).expect("added");
    record.set_validator(|attributes| {
        if attributes.get("foo") == Some(&json!("invalid")) {
            Err(json!("fail!"))
        } else {
            Ok(())
        }
    });
    let calls = Rc::new(Cell::new(0));

    let seen = Rc::clone(&calls);
    let expected_list = list.clone();
    let expected_record = record.clone();
    list.on(ListEventKind::RecordError, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::RecordError(bubbled) = facade.event() else {
            panic!("expected record error");
        };
        assert_eq!(bubbled.target, expected_record);
        assert_eq!(bubbled.current_target, expected_list);
        assert_eq!(bubbled.event.kind_name(), "validate");
    });

    record.set("foo", "invalid", &Options::new());
    assert_eq!(calls.get(), 1);
}

#[test]
fn removed_records_stop_bubbling() {
    let list = Collection::new(&test_schema());
    let record = list.add(json!({}), &Options::new()).expect("added");
    let bubbled = count(&list, ListEventKind::RecordChange, false);

    list.remove(&record, &Options::new());
    record.set("foo", "foo", &Options::new());
    assert_eq!(bubbled.get(), 0);
}

#[test]
fn refresh_signal_fires_for_refresh_and_sort() {
    let schema = test_schema();
    let list = Collection::new(&schema);
    let records = vec![Record::with_defaults(&schema), Record::with_defaults(&schema)];
    let calls = Rc::new(Cell::new(0));

    let seen = Rc::clone(&calls);
    let expected = records.clone();
    list.once(ListEventKind::Refresh, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::Refresh(refresh) = facade.event() else {
            panic!("expected refresh");
        };
        assert_eq!(refresh.records, expected);
        assert_eq!(refresh.src, "refresh");
        assert_eq!(refresh.extra.get("test"), Some(&json!("test")));
    });
    list.refresh(records, &Options::new().with_extra("test", "test"));

    let seen = Rc::clone(&calls);
    list.after(ListEventKind::Refresh, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::Refresh(refresh) = facade.event() else {
            panic!("expected refresh");
        };
        assert_eq!(refresh.src, "sort");
        assert_eq!(refresh.extra.get("test"), Some(&json!("test")));
    });
    list.set_comparator(|record| record.get("clientId").unwrap_or(Value::Null));
    list.sort(&Options::new().with_extra("test", "test"));

    assert_eq!(calls.get(), 2);
}

#[test]
fn refresh_signal_is_preventable_and_all_or_nothing() {
    let list = Collection::new(&test_schema());
    let originals = list.add_many([json!({"foo": "zero"}), json!({"foo": "one"})], &Options::new());
    let intents = count(&list, ListEventKind::Refresh, false);
    list.on(ListEventKind::Refresh, |facade| facade.prevent_default());
    list.after(ListEventKind::Refresh, |_| panic!("refresh should be prevented"));

    assert_eq!(list.refresh([json!({})], &Options::new()), Decision::Prevented);
    assert_eq!(intents.get(), 1);
    assert_eq!(list.to_array(), originals);
    assert!(originals.iter().all(|record| record.lists() == vec![list.clone()]));
}

#[test]
fn refresh_signal_is_skipped_when_silent() {
    let list = Collection::new(&test_schema());
    list.on(ListEventKind::Refresh, |_| panic!("refresh should not fire"));

    list.refresh([json!({})], &Options::silent());
    assert_eq!(list.size(), 1);
}

#[test]
fn remove_signal_fires_for_each_removed_record() {
    let list = Collection::new(&test_schema());
    let record = list.add(json!({}), &Options::new()).expect("added");
    let calls = Rc::new(Cell::new(0));

    let seen = Rc::clone(&calls);
    let expected = record.clone();
    list.once(ListEventKind::Remove, move |facade| {
        seen.set(seen.get() + 1);
        let ListEvent::Remove(removed) = facade.event() else {
            panic!("expected remove");
        };
        assert_eq!(removed.record, expected);
        assert_eq!(removed.index, 0);
        assert_eq!(removed.src.as_deref(), Some("test"));
    });
    list.remove(&record, &Options::src("test"));

    let seen = Rc::clone(&calls);
    list.after(ListEventKind::Remove, move |_| seen.set(seen.get() + 1));
    let added = list.add_many([json!({}), json!({})], &Options::new());
    list.remove_many(&added, &Options::new());

    assert_eq!(calls.get(), 3);
}

#[test]
fn remove_signal_is_preventable() {
    let list = Collection::new(&test_schema());
    let intents = count(&list, ListEventKind::Remove, false);
    list.on(ListEventKind::Remove, |facade| facade.prevent_default());
    list.after(ListEventKind::Remove, |_| panic!("remove should be prevented"));

    let record = list.add(json!({}), &Options::new()).expect("added");
    assert_eq!(list.remove(&record, &Options::new()), None);

    assert_eq!(intents.get(), 1);
    assert_eq!(list.size(), 1);
}

#[test]
fn remove_signal_is_skipped_when_silent() {
    let list = Collection::new(&test_schema());
    list.on(ListEventKind::Remove, |_| panic!("remove should not fire"));

    let record = list.add(json!({}), &Options::new()).expect("added");
    list.remove(&record, &Options::silent());
    let added = list.add_many([json!({}), json!({})], &Options::new());
    list.remove_many(&added, &Options::silent());

    assert_eq!(list.size(), 0);
}

#[test]
fn add_listener_may_mutate_the_collection() {
    let list = Collection::new(&test_schema());
    list.set_comparator(|record| record.get("foo").unwrap_or(Value::Null));
    let target = list.clone();
    let inserted = Rc::new(Cell::new(false));
    let flag = Rc::clone(&inserted);
    list.on(ListEventKind::Add, move |facade| {
        if flag.replace(true) {
            return;
        }
        if let ListEvent::Add(added) = facade.event() {
            assert_eq!(added.index, 0);
        }
        target.add(json!({"foo": "a"}), &Options::silent());
    });

    let record = list.add(json!({"foo": "b"}), &Options::new()).expect("added");
    assert_eq!(list.item(1), Some(record));
    assert_eq!(list.size(), 2);
}

#[test]
fn collection_parse_failure_emits_error() {
    let list = Collection::new(&test_schema());
    let calls = Rc::new(Cell::new(0));
    let seen = Rc::clone(&calls);
    list.on(ListEventKind::Error, move |facade| {
        seen.set(seen.get() + 1);
        match facade.event() {
            ListEvent::Error(ErrorEvent::Parse { response, .. }) => {
                assert_eq!(response, &json!("moo"));
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    });

    assert_eq!(list.parse(&json!("moo")), None);
    assert_eq!(calls.get(), 1);
}
