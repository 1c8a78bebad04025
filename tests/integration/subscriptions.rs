#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use graphcache::{
    selection::{ArgumentValue, LinkedField, ScalarField},
    DataId, Operation, OperationDescriptor, Selection, Selector, Variables,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use support::*;

fn user_query(id: &str, fields: Vec<Selection>) -> OperationDescriptor {
    user_query_with(id, fields, Variables::new())
}

fn user_query_with(id: &str, fields: Vec<Selection>, variables: Variables) -> OperationDescriptor {
    let mut selections = vec![Selection::scalar("id")];
    selections.extend(fields);
    let node = LinkedField::new("node", selections).arg("id", ArgumentValue::literal(id));
    let operation = Operation::query("UserQuery", vec![node.into()]).variable("size", json!(32));
    OperationDescriptor::new(Arc::new(operation), variables)
}

fn name_selector(id: &str) -> Selector {
    Selector::new(
        DataId::new(id),
        vec![Selection::scalar("name")].into(),
        Variables::new(),
    )
}

fn publish_name(env: &graphcache::Environment, id: &str, name: &str) {
    env.commit_payload(
        &user_query(id, vec![Selection::scalar("name")]),
        json!({"node": {"id": id, "name": name}}),
    )
    .unwrap();
}

#[test]
fn callbacks_fire_only_when_selected_data_changes() {
    let (env, _store) = environment(ManualNetwork::new(), None);
    publish_name(&env, "4", "Zuck");
    let (_watch, snapshots) = watch(&env, &name_selector("4"));

    publish_name(&env, "4", "Zuck");
    assert!(snapshots.lock().is_empty());

    publish_name(&env, "5", "Priscilla");
    assert!(snapshots.lock().is_empty());

    publish_name(&env, "4", "Mark");
    let snapshots = snapshots.lock();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].data.to_json(), json!({"name": "Mark"}));
    assert!(!snapshots[0].is_missing_data);
}

#[test]
fn missing_records_are_watched_until_they_arrive() {
    let (env, _store) = environment(ManualNetwork::new(), None);
    let snapshot = env.lookup(&name_selector("4"));
    assert!(snapshot.is_missing_data);
    assert_eq!(snapshot.seen_records.get(&DataId::new("4")), Some(&0));

    let (_watch, snapshots) = watch(&env, &name_selector("4"));
    publish_name(&env, "4", "Zuck");
    let snapshots = snapshots.lock();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].data.to_json(), json!({"name": "Zuck"}));
}

#[test]
fn disposed_subscriptions_stop_firing() {
    let (env, store) = environment(ManualNetwork::new(), None);
    publish_name(&env, "4", "Zuck");
    let (subscription, snapshots) = watch(&env, &name_selector("4"));
    assert_eq!(store.subscription_count(), 1);

    subscription.dispose();
    subscription.dispose();
    assert!(subscription.is_disposed());
    assert_eq!(store.subscription_count(), 0);

    publish_name(&env, "4", "Mark");
    assert!(snapshots.lock().is_empty());
}

#[test]
fn arguments_resolve_against_read_time_variables() {
    let (env, _store) = environment(ManualNetwork::new(), None);
    let picture = || {
        Selection::from(
            LinkedField::new("profilePicture", vec![Selection::scalar("uri")])
                .arg("size", ArgumentValue::variable("size")),
        )
    };
    for (size, uri) in [(32, "small.jpg"), (64, "large.jpg")] {
        let operation = user_query_with(
            "4",
            vec![picture()],
            Variables::from([("size".to_owned(), json!(size))]),
        );
        env.commit_payload(
            &operation,
            json!({"node": {"id": "4", "profilePicture": {"uri": uri}}}),
        )
        .unwrap();
    }

    let read = |size: i64| {
        let selector = Selector::new(
            DataId::new("4"),
            vec![picture()].into(),
            Variables::from([("size".to_owned(), json!(size))]),
        );
        env.lookup(&selector).data.to_json()
    };
    assert_eq!(read(32), json!({"profilePicture": {"uri": "small.jpg"}}));
    assert_eq!(read(64), json!({"profilePicture": {"uri": "large.jpg"}}));
}

#[test]
fn aliased_fields_read_under_their_alias() {
    let (env, _store) = environment(ManualNetwork::new(), None);
    let operation = user_query("4", vec![ScalarField::new("name").alias("displayName").into()]);
    env.commit_payload(&operation, json!({"node": {"id": "4", "displayName": "Zuck"}}))
        .unwrap();
    assert_eq!(
        env.lookup(&operation.root).data.to_json(),
        json!({"node": {"id": "4", "displayName": "Zuck"}})
    );
    assert_eq!(
        env.lookup(&name_selector("4")).data.to_json(),
        json!({"name": "Zuck"})
    );
}

#[test]
fn callbacks_may_read_the_store() {
    let (env, _store) = environment(ManualNetwork::new(), None);
    publish_name(&env, "4", "Zuck");
    let seen = Arc::new(Mutex::new(Vec::<Value>::new()));
    let log = seen.clone();
    let reader = Arc::downgrade(&env);
    let _subscription = env.subscribe(env.lookup(&name_selector("4")), move |_| {
        if let Some(env) = reader.upgrade() {
            log.lock().push(env.lookup(&name_selector("4")).data.to_json());
        }
    });
    publish_name(&env, "4", "Mark");
    assert_eq!(seen.lock().as_slice(), &[json!({"name": "Mark"})]);
}
