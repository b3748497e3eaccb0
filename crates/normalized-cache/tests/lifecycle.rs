#![allow(unused_crate_dependencies)]

use std::sync::Arc;

use normalized_cache::{
    Cache, CacheConfig, MutationId, ObserverSpec, ReadOutput, ReadRequest, RecordId, SelectionSet, Variables,
    WriteRequest,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn user_selection() -> Arc<SelectionSet> {
    Arc::new(
        serde_json::from_value(json!({
            "fields": {
                "viewer": {
                    "type": "User",
                    "fieldName": "viewer",
                    "selection": {
                        "fields": {
                            "__typename": {"type": "String", "fieldName": "__typename"},
                            "id": {"type": "ID", "fieldName": "id"},
                            "name": {"type": "String", "fieldName": "name"}
                        }
                    }
                }
            }
        }))
        .unwrap(),
    )
}

fn viewer(name: &str) -> Value {
    json!({"viewer": {"__typename": "User", "id": "1", "name": name}})
}

fn write(cache: &mut Cache, selection: &SelectionSet, data: Value) {
    let root = RecordId::root();
    cache
        .write(WriteRequest::new(selection, &data, &root, &Variables::new()))
        .unwrap();
}

fn write_optimistic(cache: &mut Cache, mutation: MutationId, selection: &SelectionSet, data: Value) {
    let root = RecordId::root();
    cache
        .write_optimistic(mutation, WriteRequest::new(selection, &data, &root, &Variables::new()))
        .unwrap();
}

fn read(cache: &Cache, selection: &SelectionSet) -> ReadOutput {
    let root = RecordId::root();
    cache
        .read(ReadRequest::new(selection, &root, &Variables::new()))
        .unwrap()
}

fn name(cache: &Cache, selection: &SelectionSet) -> Option<Value> {
    read(cache, selection)
        .data
        .map(|data| data["viewer"]["name"].clone())
}

#[test]
fn rolled_back_mutations_disappear() {
    let mut cache = Cache::default();
    let selection = user_selection();
    write(&mut cache, &selection, viewer("Alice"));

    let first = MutationId::new(1);
    let second = MutationId::new(2);
    write_optimistic(&mut cache, first, &selection, viewer("Alicia"));
    write_optimistic(&mut cache, second, &selection, viewer("Ali"));
    assert_eq!(name(&cache, &selection), Some(json!("Ali")));

    // the server answered the first mutation, the second failed
    cache.commit(first);
    assert_eq!(name(&cache, &selection), Some(json!("Ali")));

    let output = cache.rollback(second);
    assert!(!output.touched.is_empty());
    assert_eq!(name(&cache, &selection), Some(json!("Alicia")));

    // unknown layers are ignored
    assert!(cache.rollback(second).touched.is_empty());
    assert!(cache.commit(MutationId::new(42)).touched.is_empty());
}

#[test]
fn optimistic_writes_notify_observers() {
    let mut cache = Cache::default();
    let selection = user_selection();
    write(&mut cache, &selection, viewer("Alice"));

    let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    cache
        .subscribe(ObserverSpec::new(selection.clone(), Variables::new()), {
            let seen = seen.clone();
            move |output, _| seen.borrow_mut().push(output.data.as_ref().map(|data| data["viewer"]["name"].clone()))
        })
        .unwrap();

    let mutation = MutationId::new(7);
    write_optimistic(&mut cache, mutation, &selection, viewer("Alicia"));
    cache.rollback(mutation);

    assert_eq!(*seen.borrow(), vec![Some(json!("Alicia")), Some(json!("Alice"))]);
}

#[test]
fn stale_types_are_reported_until_rewritten() {
    let mut cache = Cache::default();
    let selection = user_selection();
    write(&mut cache, &selection, viewer("Alice"));

    assert!(!read(&cache, &selection).stale);

    let marked = cache.mark_type_stale("User", Some("name"));
    assert_eq!(marked.len(), 1);
    assert!(read(&cache, &selection).stale);

    write(&mut cache, &selection, viewer("Alice"));
    assert!(!read(&cache, &selection).stale);

    cache.mark_type_stale("User", None);
    assert!(read(&cache, &selection).stale);
    assert!(cache.mark_type_stale("Post", None).is_empty());
}

#[test]
fn hydration_keeps_newer_values() {
    let selection = user_selection();

    let mut old = Cache::default();
    write(&mut old, &selection, viewer("Alice"));
    let snapshot = old.serialize();

    let mut cache = Cache::default();
    write(&mut cache, &selection, viewer("Alicia"));
    cache.hydrate(snapshot);

    assert_eq!(name(&cache, &selection), Some(json!("Alicia")));
}

#[test]
fn unobserved_fields_are_collected() {
    let mut cache = Cache::new(CacheConfig::from_toml_str("default_lifetime = 1").unwrap());
    let selection = user_selection();
    let other: Arc<SelectionSet> = Arc::new(
        serde_json::from_value(json!({"fields": {"motd": {"type": "String", "fieldName": "motd"}}})).unwrap(),
    );

    write(&mut cache, &selection, viewer("Alice"));
    write(&mut cache, &other, json!({"motd": "hello"}));

    cache
        .subscribe(ObserverSpec::new(selection.clone(), Variables::new()), |_, _| {})
        .unwrap();

    assert_eq!(cache.collect_garbage(), 0);
    assert_eq!(cache.collect_garbage(), 1);

    let motd = read(&cache, &other);
    assert!(motd.partial);
    assert_eq!(name(&cache, &selection), Some(json!("Alice")));
}
