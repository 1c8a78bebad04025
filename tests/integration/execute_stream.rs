#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use graphcache::{
    selection::{FieldHandle, LinkedField},
    CacheConfig, Callbacks, DataId, PathStep, QueueScheduler, Response, Selector, TaskScheduler,
};
use parking_lot::Mutex;
use serde_json::json;
use support::*;

#[test]
fn streamed_item_fills_an_initially_empty_list() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_watch, snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    assert_eq!(actors(&env.lookup(&operation.root)), json!([]));

    network.next(Response::incremental(
        ACTORS_LABEL,
        actor_path(0),
        actor("2", "Alice"),
    ));
    let snapshot = env.lookup(&operation.root);
    assert!(!snapshot.is_missing_data);
    assert_eq!(actors(&snapshot), json!([{"id": "2", "name": "ALICE"}]));
    assert_eq!(recorded.lock().next.len(), 2);
    assert_eq!(snapshots.lock().len(), 2);

    network.complete();
    let recorded = recorded.lock();
    assert!(recorded.completed);
    assert!(recorded.error.is_none());
}

#[test]
fn out_of_order_items_leave_a_hole_until_delivered() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, _recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    network.next(Response::incremental(ACTORS_LABEL, actor_path(1), actor("3", "Bob")));
    let snapshot = env.lookup(&operation.root);
    let list = snapshot
        .data
        .get("node")
        .and_then(|node| node.get("actors"))
        .expect("actors present");
    assert!(list.index(0).is_some_and(|item| item.is_undefined()));
    assert_eq!(
        list.index(1).and_then(|item| item.get("id")).and_then(|id| id.as_value()),
        Some(&json!("3"))
    );

    network.next(Response::incremental(ACTORS_LABEL, actor_path(0), actor("2", "Alice")));
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}, {"id": "3", "name": "BOB"}])
    );
}

#[test]
fn unknown_label_fails_the_operation_without_writes() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    let records = store.record_count();
    let revision = store.revision();

    network.next(Response::incremental("<unknown>", actor_path(0), actor("2", "Alice")));
    {
        let recorded = recorded.lock();
        let error = recorded.error.as_ref().expect("operation errored");
        assert_eq!(error.code(), "UnknownLabel");
        assert_eq!(error.to_string(), "received response for unknown label '<unknown>'");
        assert!(!recorded.completed);
    }
    assert_eq!(store.record_count(), records);
    assert_eq!(store.revision(), revision);
    assert!(env
        .lookup(&Selector::new(
            DataId::new("2"),
            actor_selections().into(),
            Default::default()
        ))
        .is_missing_data);
    assert_eq!(network.teardowns(), 1);
}

#[test]
fn unknown_path_lists_the_known_paths() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    network.next(Response::incremental(
        ACTORS_LABEL,
        vec![
            PathStep::field("<unknown-path>"),
            PathStep::field("actors"),
            PathStep::Index(0),
        ],
        actor("2", "Alice"),
    ));
    let recorded = recorded.lock();
    let error = recorded.error.as_ref().expect("operation errored");
    assert_eq!(
        error.to_string(),
        format!(
            "received response for unknown path `<unknown-path>` for label `{ACTORS_LABEL}`. Known paths: node."
        )
    );
}

#[test]
fn later_root_payloads_replace_the_stream_context() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, _recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    network.next(feedback_payload(json!([actor("2", "Alice")])));
    network.next(Response::incremental(ACTORS_LABEL, actor_path(1), actor("3", "Bob")));
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}, {"id": "3", "name": "BOB"}])
    );
}

#[test]
fn diverged_parent_keeps_its_list_but_stores_the_item() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let operation = feedback_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([actor("2", "Alice")])));
    env.commit_payload(
        &feedback_query(false),
        json!({"node": {"__typename": "Feedback", "id": "1", "actors": [actor("3", "Bob")]}}),
    )
    .unwrap();

    network.next(Response::incremental(ACTORS_LABEL, actor_path(1), actor("4", "Carol")));
    assert!(recorded.lock().error.is_none());
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "3", "name": "BOB"}])
    );
    let carol = env.lookup(&Selector::new(
        DataId::new("4"),
        actor_selections().into(),
        Default::default(),
    ));
    assert_eq!(carol.data.to_json(), json!({"id": "4", "name": "CAROL"}));
}

#[test]
fn scheduled_publishes_run_in_arrival_order() {
    let network = ManualNetwork::new();
    let scheduler = Arc::new(QueueScheduler::new());
    let (env, _store) = environment(network.clone(), Some(scheduler.clone() as Arc<dyn TaskScheduler>));
    let operation = feedback_query(true);
    let (_watch, snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    network.next(Response::incremental(ACTORS_LABEL, actor_path(0), actor("2", "Alice")));
    assert!(env.lookup(&operation.root).is_missing_data);
    assert!(recorded.lock().next.is_empty());
    assert_eq!(scheduler.len(), 2);

    assert!(scheduler.run_next());
    assert_eq!(actors(&env.lookup(&operation.root)), json!([]));
    assert!(scheduler.run_next());
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}])
    );
    assert_eq!(recorded.lock().next.len(), 2);
    assert_eq!(snapshots.lock().len(), 2);

    network.complete();
    assert!(recorded.lock().completed);
}

#[test]
fn unsubscribing_cancels_scheduled_publishes() {
    let network = ManualNetwork::new();
    let scheduler = Arc::new(QueueScheduler::new());
    let (env, store) = environment(network.clone(), Some(scheduler.clone() as Arc<dyn TaskScheduler>));
    let operation = feedback_query(true);
    let (subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([actor("2", "Alice")])));
    assert_eq!(scheduler.len(), 1);
    subscription.unsubscribe();

    assert!(scheduler.is_empty());
    assert_eq!(store.record_count(), 0);
    assert_eq!(network.teardowns(), 1);
    let recorded = recorded.lock();
    assert!(recorded.next.is_empty());
    assert!(!recorded.completed);
    assert!(recorded.error.is_none());
}

#[test]
fn streamed_items_reach_a_handle_bound_list() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let actors_field = LinkedField::new("actors", actor_selections()).handle(FieldHandle {
        handle: "passthrough".to_owned(),
        key: None,
        filters: None,
    });
    let operation = feedback_query_with(actors_field, true);
    let (_watch, snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([])));
    assert_eq!(actors(&env.lookup(&operation.root)), json!([]));

    network.next(Response::incremental(ACTORS_LABEL, actor_path(0), actor("2", "Alice")));
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}])
    );
    assert_eq!(store.to_json()["1"]["__actors_passthrough"], json!({"__refs": ["2"]}));
    assert_eq!(snapshots.lock().len(), 2);
    assert_eq!(recorded.lock().next.len(), 2);
}

#[test]
fn errors_raised_while_next_runs_are_delivered_after_it() {
    let network = ManualNetwork::new();
    let scheduler = Arc::new(QueueScheduler::new());
    let (env, _store) = environment(network.clone(), Some(scheduler.clone() as Arc<dyn TaskScheduler>));
    let operation = feedback_query(true);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_next, on_error, on_complete) = (log.clone(), log.clone(), log.clone());
    let feeder = network.clone();
    let _subscription = env.execute(&operation, CacheConfig::default()).subscribe(
        Callbacks::new()
            .on_next(move |_| {
                on_next.lock().push("next".to_owned());
                feeder.next(Response::incremental("<unknown>", actor_path(0), actor("2", "Alice")));
            })
            .on_error(move |err| on_error.lock().push(format!("error {}", err.code())))
            .on_complete(move || on_complete.lock().push("complete".to_owned())),
    );

    network.next(feedback_payload(json!([])));
    assert_eq!(scheduler.run_all(), 1);
    assert_eq!(*log.lock(), vec!["next".to_owned(), "error UnknownLabel".to_owned()]);
    assert!(scheduler.is_empty());
    assert_eq!(network.teardowns(), 1);
}

#[test]
fn completion_raised_while_next_runs_waits_for_that_publish() {
    let network = ManualNetwork::new();
    let scheduler = Arc::new(QueueScheduler::new());
    let (env, _store) = environment(network.clone(), Some(scheduler.clone() as Arc<dyn TaskScheduler>));
    let operation = feedback_query(true);

    let log = Arc::new(Mutex::new(Vec::new()));
    let (on_next, on_complete) = (log.clone(), log.clone());
    let feeder = network.clone();
    let _subscription = env.execute(&operation, CacheConfig::default()).subscribe(
        Callbacks::new()
            .on_next(move |_| {
                on_next.lock().push("next");
                feeder.complete();
            })
            .on_complete(move || on_complete.lock().push("complete")),
    );

    network.next(feedback_payload(json!([actor("2", "Alice")])));
    assert_eq!(scheduler.run_all(), 1);
    assert_eq!(*log.lock(), vec!["next", "complete"]);
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}])
    );
}
