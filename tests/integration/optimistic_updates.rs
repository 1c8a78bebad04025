#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use graphcache::{
    selection::{ArgumentValue, LinkedField, ScalarField},
    DataId, Environment, Operation, OperationDescriptor, Selection, Variables,
};
use serde_json::{json, Value};
use support::*;

fn user_query(name: &str, fields: &[&str]) -> OperationDescriptor {
    let mut selections = vec![Selection::scalar("id"), Selection::scalar("__typename")];
    selections.extend(fields.iter().map(|field| Selection::scalar(*field)));
    let node = LinkedField::new("node", selections).arg("id", ArgumentValue::literal("4"));
    OperationDescriptor::new(
        Arc::new(Operation::query(name, vec![node.into()])),
        Variables::new(),
    )
}

fn full_query() -> OperationDescriptor {
    user_query("UserQuery", &["name", "city", "bio"])
}

fn seeded() -> Arc<Environment> {
    let (env, _store) = environment(ManualNetwork::new(), None);
    env.commit_payload(
        &full_query(),
        json!({"node": {"id": "4", "__typename": "User", "name": "Zuck", "city": "Palo Alto", "bio": "hi"}}),
    )
    .unwrap();
    env
}

fn node(env: &Environment) -> Value {
    env.lookup(&full_query().root)
        .data
        .get("node")
        .map(|node| node.to_json())
        .unwrap_or(Value::Null)
}

fn user() -> DataId {
    DataId::new("4")
}

#[test]
fn revert_restores_shadowed_keys_and_keeps_published_ones() {
    let env = seeded();
    let update = env.commit_update(|store| {
        store.set_value(&user(), "name", json!("Mark"));
        store.set_value(&user(), "city", json!("Menlo Park"));
    });
    assert_eq!(node(&env)["name"], json!("Mark"));
    assert_eq!(node(&env)["city"], json!("Menlo Park"));

    env.commit_payload(
        &user_query("BioQuery", &["bio"]),
        json!({"node": {"id": "4", "__typename": "User", "bio": "hello"}}),
    )
    .unwrap();
    assert_eq!(node(&env)["bio"], json!("hello"));

    assert!(update.revert());
    assert_eq!(
        node(&env),
        json!({"id": "4", "__typename": "User", "name": "Zuck", "city": "Palo Alto", "bio": "hello"})
    );
}

#[test]
fn reverting_one_overlay_keeps_the_others() {
    let env = seeded();
    let rename = env.commit_update(|store| store.set_value(&user(), "name", json!("Mark")));
    let _relocate = env.commit_update(|store| store.set_value(&user(), "city", json!("Menlo Park")));
    assert_eq!(env.store().optimistic_updates(), 2);

    assert!(rename.revert());
    assert_eq!(node(&env)["name"], json!("Zuck"));
    assert_eq!(node(&env)["city"], json!("Menlo Park"));
    assert_eq!(env.store().optimistic_updates(), 1);
}

#[test]
fn later_overlays_win_per_key() {
    let env = seeded();
    let _first = env.commit_update(|store| store.set_value(&user(), "name", json!("Mark")));
    let second = env.commit_update(|store| {
        let current = store.get_value(&user(), "name");
        assert_eq!(current, Some(json!("Mark")));
        store.set_value(&user(), "name", json!("Mark Z"));
    });
    assert_eq!(node(&env)["name"], json!("Mark Z"));
    second.revert();
    assert_eq!(node(&env)["name"], json!("Mark"));
}

#[test]
fn publishes_under_an_overlay_surface_after_revert() {
    let env = seeded();
    let update = env.commit_update(|store| store.set_value(&user(), "name", json!("Mark")));
    env.commit_payload(
        &user_query("NameQuery", &["name"]),
        json!({"node": {"id": "4", "__typename": "User", "name": "Zuckerberg"}}),
    )
    .unwrap();
    assert_eq!(node(&env)["name"], json!("Mark"));
    update.revert();
    assert_eq!(node(&env)["name"], json!("Zuckerberg"));
}

#[test]
fn commit_moves_the_overlay_into_canonical_state() {
    let env = seeded();
    let update = env.commit_update(|store| store.set_value(&user(), "name", json!("Mark")));
    assert!(update.commit());
    assert_eq!(env.store().optimistic_updates(), 0);
    assert_eq!(node(&env)["name"], json!("Mark"));
    assert!(!update.revert());
    assert_eq!(node(&env)["name"], json!("Mark"));
}

#[test]
fn overlays_can_delete_records_without_touching_canonical_state() {
    let env = seeded();
    let update = env.commit_update(|store| store.delete(&user()));
    let snapshot = env.lookup(&full_query().root);
    assert_eq!(snapshot.data.to_json(), json!({"node": null}));
    assert!(!snapshot.is_missing_data);

    update.revert();
    assert_eq!(node(&env)["name"], json!("Zuck"));
}

#[test]
fn subscribers_see_apply_and_revert() {
    let env = seeded();
    let (_watch, snapshots) = watch(&env, &full_query().root);
    let update = env.commit_update(|store| store.set_value(&user(), "name", json!("Mark")));
    update.revert();

    let names: Vec<Value> = snapshots
        .lock()
        .iter()
        .map(|snapshot| snapshot.data.to_json()["node"]["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("Mark"), json!("Zuck")]);
}

fn nick_query() -> OperationDescriptor {
    let selections = vec![
        Selection::scalar("id"),
        Selection::scalar("__typename"),
        ScalarField::new("nick").handle("copy_bio").into(),
    ];
    let node = LinkedField::new("node", selections).arg("id", ArgumentValue::literal("4"));
    OperationDescriptor::new(
        Arc::new(Operation::query("NickQuery", vec![node.into()])),
        Variables::new(),
    )
}

#[test]
fn handlers_read_canonical_values_under_an_overlay() {
    let env = seeded();
    let update = env.commit_update(|store| store.set_value(&user(), "bio", json!("OPTIMISTIC")));
    env.commit_payload(
        &nick_query(),
        json!({"node": {"id": "4", "__typename": "User", "nick": "z"}}),
    )
    .unwrap();
    assert_eq!(env.store().to_json()["4"]["__nick_copy_bio"], json!("hi"));

    assert!(update.revert());
    let nick = env.lookup(&nick_query().root).data.to_json();
    assert_eq!(nick["node"]["nick"], json!("hi"));
    assert_eq!(node(&env)["bio"], json!("hi"));
}
