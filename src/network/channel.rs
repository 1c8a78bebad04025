//! Network backed by tokio channels.
//!
//! Each call to [`ChannelNetwork::open`] queues one response channel; the next
//! `execute` takes it and forwards every message into the response stream from
//! a task spawned on the runtime. Unsubscribing aborts the task.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::trace;

use super::{CacheConfig, Network, Response};
use crate::error::{CacheError, Result};
use crate::primitives::observable::{Observable, Teardown};
use crate::selection::RequestParameters;
use crate::types::Variables;

/// Producer side of one response stream; dropping it completes the stream.
pub type ResponseSender = UnboundedSender<Result<Response>>;

/// Request observed by a [`ChannelNetwork`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub name: String,
    pub variables: Variables,
    pub cache_config: CacheConfig,
}

pub struct ChannelNetwork {
    runtime: Handle,
    pending: Mutex<VecDeque<UnboundedReceiver<Result<Response>>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ChannelNetwork {
    pub fn new(runtime: Handle) -> Arc<Self> {
        Arc::new(Self {
            runtime,
            pending: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queues a response channel for the next executed request.
    pub fn open(&self) -> ResponseSender {
        let (tx, rx) = unbounded_channel();
        self.pending.lock().push_back(rx);
        tx
    }

    /// Requests executed so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }
}

impl Network for ChannelNetwork {
    fn execute(
        &self,
        request: &RequestParameters,
        variables: &Variables,
        cache_config: &CacheConfig,
    ) -> Observable<Response> {
        self.requests.lock().push(RecordedRequest {
            name: request.name.clone(),
            variables: variables.clone(),
            cache_config: cache_config.clone(),
        });
        let Some(mut receiver) = self.pending.lock().pop_front() else {
            return Observable::from_error(CacheError::network(format!(
                "no response channel open for operation `{}`",
                request.name
            )));
        };
        let runtime = self.runtime.clone();
        let name = request.name.clone();
        Observable::create(move |sink| {
            let task = runtime.spawn(async move {
                while let Some(message) = receiver.recv().await {
                    match message {
                        Ok(response) => sink.next(response),
                        Err(error) => {
                            sink.error(error);
                            return;
                        }
                    }
                }
                trace!(operation = %name, "network.channel.closed");
                sink.complete();
            });
            Some(Box::new(move || task.abort()) as Teardown)
        })
    }
}
