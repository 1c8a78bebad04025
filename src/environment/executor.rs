use std::collections::VecDeque;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Environment;
use crate::error::{CacheError, ErrorMessages, Result};
use crate::network::{CacheConfig, Response};
use crate::primitives::disposable::Disposable;
use crate::primitives::observable::{Observer, Sink, Subscription};
use crate::primitives::scheduler::TaskToken;
use crate::selection::OperationDescriptor;
use crate::store::{normalize, IncrementalMatcher, MutationBatch};
use crate::types::{DataId, ROOT_TYPE};

/// Lifecycle of one `execute()` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Fetching,
    Receiving,
    Completed,
    Errored,
    Canceled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionState::Completed | ExecutionState::Errored | ExecutionState::Canceled
        )
    }
}

struct QueuedPublish {
    batch: MutationBatch,
    response: Response,
}

struct ExecutorState {
    phase: ExecutionState,
    matcher: IncrementalMatcher,
    /// Normalized payloads waiting for their publish task, in arrival order.
    queue: VecDeque<QueuedPublish>,
    /// Publishes popped from `queue` whose response is not yet emitted.
    in_flight: usize,
    tokens: Vec<TaskToken>,
    retain: Option<Disposable>,
    network: Option<Subscription>,
    network_done: bool,
}

impl ExecutorState {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }
}

/// Drives one operation: network stream in, normalized publishes out.
///
/// Payloads are normalized as they arrive; publish and notify for each one
/// run in arrival order, either inline or as one scheduler task per payload.
pub(crate) struct Executor {
    environment: Arc<Environment>,
    operation: OperationDescriptor,
    sink: Sink<Response>,
    state: Mutex<ExecutorState>,
    this: Weak<Executor>,
}

impl Executor {
    pub(crate) fn start(
        environment: Arc<Environment>,
        operation: OperationDescriptor,
        cache_config: CacheConfig,
        sink: Sink<Response>,
    ) -> Arc<Self> {
        let executor = Arc::new_cyclic(|this| Executor {
            environment,
            operation,
            sink,
            state: Mutex::new(ExecutorState {
                phase: ExecutionState::Idle,
                matcher: IncrementalMatcher::new(),
                queue: VecDeque::new(),
                in_flight: 0,
                tokens: Vec::new(),
                retain: None,
                network: None,
                network_done: false,
            }),
            this: this.clone(),
        });
        let retain = executor.environment.store().retain(&executor.operation);
        {
            let mut state = executor.state.lock();
            state.phase = ExecutionState::Fetching;
            state.retain = Some(retain);
        }
        debug!(operation = executor.operation.name(), "executor.fetch");
        let responses = executor.environment.network().execute(
            &executor.operation.request.params,
            &executor.operation.variables,
            &cache_config,
        );
        let subscription = responses.subscribe(NetworkObserver {
            executor: executor.clone(),
        });
        let finished = {
            let mut state = executor.state.lock();
            if state.phase.is_terminal() || state.network_done {
                Some(subscription)
            } else {
                state.network = Some(subscription);
                None
            }
        };
        if let Some(subscription) = finished {
            subscription.unsubscribe();
        }
        executor
    }

    pub(crate) fn state(&self) -> ExecutionState {
        self.state.lock().phase
    }

    /// Tears the operation down on unsubscribe; no-op once terminal.
    pub(crate) fn cancel(&self) {
        self.terminate(ExecutionState::Canceled, None);
    }

    fn on_payload(&self, response: Response) {
        let processed = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = ExecutionState::Receiving;
            self.process(&mut state, &response)
        };
        match processed {
            Ok(batch) => self.enqueue(batch, response),
            Err(error) => {
                if matches!(
                    error,
                    CacheError::UnknownLabel { .. } | CacheError::UnknownPath { .. }
                ) {
                    self.environment.store().metrics().incremental_rejected();
                }
                self.terminate(ExecutionState::Errored, Some(error));
            }
        }
    }

    /// Normalizes a payload into a fresh batch. Nothing reaches the store
    /// when this fails.
    fn process(&self, state: &mut ExecutorState, response: &Response) -> Result<MutationBatch> {
        let data = match &response.data {
            Some(data) if !data.is_null() => data,
            _ => {
                return Err(CacheError::NoData {
                    operation: self.operation.name().to_owned(),
                    errors: ErrorMessages(response.errors.clone().unwrap_or_default()),
                })
            }
        };
        let options = self.environment.normalization_options();
        let mut batch = MutationBatch::new();
        let normalized = match &response.label {
            Some(label) => {
                let path = response.path.as_deref().ok_or_else(|| {
                    CacheError::invalid_payload(format!(
                        "incremental payload for label `{label}` has no path"
                    ))
                })?;
                let out = state.matcher.resolve(label, path, data, &mut batch, options)?;
                self.environment.store().metrics().incremental_resolved();
                out
            }
            None => {
                let Value::Object(object) = data else {
                    return Err(CacheError::invalid_payload("response data is not an object"));
                };
                normalize(
                    &mut batch,
                    &DataId::root(),
                    Some(ROOT_TYPE),
                    object,
                    &self.operation.request.selections,
                    &self.operation.variables,
                    &[],
                    options,
                )?
            }
        };
        self.environment
            .apply_handlers(&normalized.handles, &mut batch)?;
        for placeholder in normalized.placeholders {
            state.matcher.register(placeholder);
        }
        debug!(
            operation = self.operation.name(),
            label = response.label.as_deref().unwrap_or(""),
            records = batch.len(),
            pending = state.matcher.pending(),
            "executor.payload"
        );
        Ok(batch)
    }

    fn enqueue(&self, batch: MutationBatch, response: Response) {
        self.state
            .lock()
            .queue
            .push_back(QueuedPublish { batch, response });
        let Some(scheduler) = self.environment.scheduler() else {
            self.run_next_publish();
            return;
        };
        let executor = self.this.clone();
        let token = scheduler.schedule(Box::new(move || {
            if let Some(executor) = executor.upgrade() {
                executor.run_next_publish();
            }
        }));
        let mut state = self.state.lock();
        if !state.phase.is_terminal() && !state.queue.is_empty() {
            state.tokens.push(token);
        }
    }

    fn run_next_publish(&self) {
        let next = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            let next = state.queue.pop_front();
            if next.is_some() {
                state.in_flight += 1;
            }
            next
        };
        let Some(QueuedPublish { batch, response }) = next else {
            return;
        };
        let store = self.environment.store();
        store.publish(batch);
        store.notify();
        self.sink.next(response);
        let finished = {
            let mut state = self.state.lock();
            state.in_flight -= 1;
            if state.queue.is_empty() {
                state.tokens.clear();
            }
            state.network_done && state.is_drained()
        };
        if finished {
            self.finish();
        }
    }

    fn on_network_complete(&self) {
        let drained = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.network_done = true;
            state.network = None;
            state.is_drained()
        };
        if drained {
            self.finish();
        }
    }

    fn finish(&self) {
        let (retain, unresolved) = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = ExecutionState::Completed;
            (state.retain.take(), state.matcher.clear())
        };
        if unresolved > 0 {
            warn!(
                operation = self.operation.name(),
                unresolved,
                "executor.complete.unresolved"
            );
        }
        self.sink.complete();
        if let Some(retain) = retain {
            retain.dispose();
        }
    }

    fn terminate(&self, phase: ExecutionState, error: Option<CacheError>) {
        let (tokens, retain, network, dropped) = {
            let mut state = self.state.lock();
            if state.phase.is_terminal() {
                return;
            }
            state.phase = phase;
            let dropped = state.queue.len();
            state.queue.clear();
            state.matcher.clear();
            (
                std::mem::take(&mut state.tokens),
                state.retain.take(),
                state.network.take(),
                dropped,
            )
        };
        if let Some(scheduler) = self.environment.scheduler() {
            for token in tokens {
                scheduler.cancel(token);
            }
        }
        if let Some(network) = network {
            network.unsubscribe();
        }
        match error {
            Some(error) => {
                warn!(
                    operation = self.operation.name(),
                    code = error.code(),
                    error = %error,
                    dropped,
                    "executor.error"
                );
                self.sink.error(error);
            }
            None => info!(operation = self.operation.name(), dropped, "executor.cancel"),
        }
        if let Some(retain) = retain {
            retain.dispose();
        }
    }
}

struct NetworkObserver {
    executor: Arc<Executor>,
}

impl Observer<Response> for NetworkObserver {
    fn next(&mut self, response: Response) {
        self.executor.on_payload(response);
    }

    fn error(&mut self, error: CacheError) {
        self.executor.terminate(ExecutionState::Errored, Some(error));
    }

    fn complete(&mut self) {
        self.executor.on_network_complete();
    }
}
