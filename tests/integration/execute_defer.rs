#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use graphcache::{
    error::PayloadError,
    selection::{ArgumentValue, LinkedField},
    store::StoreOptions,
    CacheConfig, CacheError, Environment, EnvironmentConfig, Operation, OperationDescriptor,
    PathStep, Response, Selection, Store, Variables,
};
use serde_json::json;
use support::*;

const DEFER_LABEL: &str = "UserQuery$defer$UserFragment";

/// `query UserQuery($defer) { node(id: "4") { id __typename ...UserFragment @defer(if: $defer) } }`
fn user_query(defer: bool) -> OperationDescriptor {
    let node = LinkedField::new(
        "node",
        vec![
            Selection::scalar("id"),
            Selection::scalar("__typename"),
            Selection::defer(
                DEFER_LABEL,
                Some(ArgumentValue::variable("defer")),
                vec![Selection::inline_fragment(
                    "User",
                    vec![Selection::scalar("name")],
                )],
            ),
        ],
    )
    .arg("id", ArgumentValue::literal("4"));
    let operation = Operation::query("UserQuery", vec![node.into()]).variable("defer", json!(true));
    OperationDescriptor::new(
        Arc::new(operation),
        Variables::from([("defer".to_owned(), json!(defer))]),
    )
}

fn node_path() -> Vec<PathStep> {
    vec![PathStep::field("node")]
}

#[test]
fn deferred_fragment_completes_the_snapshot() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = user_query(true);
    let (_watch, snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(json!({"node": {"id": "4", "__typename": "User"}})));
    let snapshot = env.lookup(&operation.root);
    assert!(snapshot.is_missing_data);
    assert_eq!(
        snapshot.data.to_json(),
        json!({"node": {"id": "4", "__typename": "User"}})
    );

    network.next(Response::incremental(
        DEFER_LABEL,
        node_path(),
        json!({"id": "4", "__typename": "User", "name": "Zuck"}),
    ));
    let snapshot = env.lookup(&operation.root);
    assert!(!snapshot.is_missing_data);
    assert_eq!(
        snapshot.data.to_json(),
        json!({"node": {"id": "4", "__typename": "User", "name": "Zuck"}})
    );
    assert_eq!(snapshots.lock().len(), 2);

    network.complete();
    assert!(recorded.lock().completed);
}

#[test]
fn a_deferred_entry_is_consumed_once() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = user_query(true);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(json!({"node": {"id": "4", "__typename": "User"}})));
    let deferred = Response::incremental(
        DEFER_LABEL,
        node_path(),
        json!({"id": "4", "__typename": "User", "name": "Zuck"}),
    );
    network.next(deferred.clone());
    assert!(recorded.lock().error.is_none());
    network.next(deferred);
    assert_eq!(
        recorded.lock().error.as_ref().map(CacheError::code),
        Some("UnknownLabel")
    );
}

#[test]
fn disabled_guard_normalizes_inline() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = user_query(false);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(
        json!({"node": {"id": "4", "__typename": "User", "name": "Zuck"}}),
    ));
    network.complete();
    let snapshot = env.lookup(&operation.root);
    assert!(!snapshot.is_missing_data);
    assert!(recorded.lock().completed);
}

#[test]
fn incremental_delivery_can_be_switched_off() {
    let network = ManualNetwork::new();
    let store = Store::new(StoreOptions::default());
    let env = Environment::new(
        EnvironmentConfig::new(network.clone(), store).incremental_delivery(false),
    );
    let operation = user_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(
        json!({"node": {"id": "4", "__typename": "User", "name": "Zuck"}}),
    ));
    assert!(!env.lookup(&operation.root).is_missing_data);
    network.next(Response::incremental(
        DEFER_LABEL,
        node_path(),
        json!({"name": "Zuck"}),
    ));
    assert_eq!(
        recorded.lock().error.as_ref().map(CacheError::code),
        Some("UnknownLabel")
    );
}

#[test]
fn completion_with_pending_entries_still_completes() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = user_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(json!({"node": {"id": "4", "__typename": "User"}})));
    network.complete();
    let recorded = recorded.lock();
    assert!(recorded.completed);
    assert!(recorded.error.is_none());
    assert!(env.lookup(&operation.root).is_missing_data);
}

#[test]
fn network_errors_pass_through_unchanged() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let operation = user_query(true);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::data(json!({"node": {"id": "4", "__typename": "User"}})));
    let revision = store.revision();
    network.error(CacheError::network("connection reset"));
    assert_eq!(
        recorded.lock().error,
        Some(CacheError::Network {
            message: "connection reset".into()
        })
    );
    assert_eq!(store.revision(), revision);
}

#[test]
fn errors_without_data_fail_the_operation() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let operation = user_query(true);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(Response::default().with_errors(vec![PayloadError::new("user is private")]));
    let recorded = recorded.lock();
    let error = recorded.error.as_ref().expect("operation errored");
    assert_eq!(error.code(), "NoData");
    assert_eq!(
        error.to_string(),
        "no data returned for operation `UserQuery`, got error(s):\n  - user is private"
    );
    assert_eq!(store.record_count(), 0);
}
