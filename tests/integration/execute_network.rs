#![allow(missing_docs)]

mod support;

use std::sync::Arc;

use graphcache::{
    network::{self, channel::ChannelNetwork},
    store::StoreOptions,
    CacheConfig, Callbacks, Environment, EnvironmentConfig, Observable, OperationDescriptor,
    Response, Store, Variables,
};
use serde_json::json;
use support::*;
use tokio::runtime::Handle;
use tokio::sync::oneshot;

#[test]
fn declared_variables_and_cache_config_reach_the_network() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let declared = feedback_query(true);
    let mut variables = declared.variables.clone();
    variables.insert("unused".to_owned(), json!(42));
    let operation = OperationDescriptor::new(declared.request.clone(), variables);

    let (_subscription, _recorded) = record(env.execute(&operation, CacheConfig::force()));
    let requests = network.requests();
    assert_eq!(requests.len(), 1);
    let (name, variables, cache_config) = &requests[0];
    assert_eq!(name, "FeedbackQuery");
    assert_eq!(
        variables,
        &Variables::from([
            ("enableStream".to_owned(), json!(true)),
            ("id".to_owned(), json!("1")),
        ])
    );
    assert!(cache_config.force);
}

#[test]
fn nothing_is_fetched_until_subscribed() {
    let network = ManualNetwork::new();
    let (env, _store) = environment(network.clone(), None);
    let observable = env.execute(&feedback_query(true), CacheConfig::default());
    assert!(network.requests().is_empty());
    let (_subscription, _recorded) = record(observable);
    assert_eq!(network.requests().len(), 1);
}

#[test]
fn synchronous_networks_complete_inline() {
    let fetch = network::from_fn(|_, _, _| {
        Observable::from_values(vec![feedback_payload(json!([actor("2", "Alice")]))])
    });
    let store = Store::new(StoreOptions::default());
    let env = Environment::new(
        EnvironmentConfig::new(fetch, store).handler_provider(Arc::new(handlers())),
    );
    let operation = feedback_query(false);
    let (_watch, snapshots) = watch(&env, &operation.root);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    let recorded = recorded.lock();
    assert!(recorded.completed);
    assert_eq!(recorded.next.len(), 1);
    assert_eq!(snapshots.lock().len(), 1);
    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}])
    );
}

#[test]
fn execute_retains_its_operation_while_in_flight() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let operation = feedback_query(false);
    let (_subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    network.next(feedback_payload(json!([actor("2", "Alice")])));
    let stats = store.collect_garbage();
    assert_eq!(stats.collected, 0);
    assert!(!env.lookup(&operation.root).is_missing_data);

    network.complete();
    assert!(recorded.lock().completed);
    assert_eq!(store.record_count(), 0);
    assert!(env.lookup(&operation.root).is_missing_data);
}

#[test]
fn payloads_after_unsubscribe_are_ignored() {
    let network = ManualNetwork::new();
    let (env, store) = environment(network.clone(), None);
    let operation = feedback_query(false);
    let (subscription, recorded) = record(env.execute(&operation, CacheConfig::default()));

    subscription.unsubscribe();
    assert_eq!(network.teardowns(), 1);
    network.next(feedback_payload(json!([actor("2", "Alice")])));
    assert_eq!(store.record_count(), 0);
    assert!(recorded.lock().next.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn channel_network_drives_an_execute_end_to_end() {
    let network = ChannelNetwork::new(Handle::current());
    let store = Store::new(StoreOptions::default());
    let env = Environment::new(
        EnvironmentConfig::new(network.clone(), store)
            .handler_provider(Arc::new(handlers())),
    );
    let operation = feedback_query(true);
    let (_watch, _snapshots) = watch(&env, &operation.root);

    let sender = network.open();
    sender.send(Ok(feedback_payload(json!([])))).unwrap();
    sender
        .send(Ok(Response::incremental(
            ACTORS_LABEL,
            actor_path(0),
            actor("2", "Alice"),
        )))
        .unwrap();
    drop(sender);

    let (done_tx, done_rx) = oneshot::channel();
    let _subscription = env
        .execute(&operation, CacheConfig::default())
        .subscribe(Callbacks::new().on_complete(move || {
            let _ = done_tx.send(());
        }));
    done_rx.await.unwrap();

    assert_eq!(
        actors(&env.lookup(&operation.root)),
        json!([{"id": "2", "name": "ALICE"}])
    );
    assert_eq!(network.requests()[0].name, "FeedbackQuery");
}
