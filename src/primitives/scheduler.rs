use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Token identifying a scheduled task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskToken(u64);

/// Cooperative task queue injected by the host.
pub trait TaskScheduler: Send + Sync {
    /// Schedules `task`; it may run before this call returns.
    fn schedule(&self, task: Task) -> TaskToken;

    /// Cancels a task that has not run yet. Unknown tokens are ignored.
    fn cancel(&self, token: TaskToken);
}

/// Runs every task synchronously inside `schedule`.
#[derive(Debug, Default)]
pub struct ImmediateScheduler {
    next: AtomicU64,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskScheduler for ImmediateScheduler {
    fn schedule(&self, task: Task) -> TaskToken {
        let token = TaskToken(self.next.fetch_add(1, Ordering::Relaxed));
        task();
        token
    }

    fn cancel(&self, _token: TaskToken) {}
}

/// FIFO queue drained explicitly by the host (or a test).
#[derive(Default)]
pub struct QueueScheduler {
    queue: Mutex<VecDeque<(TaskToken, Task)>>,
    next: AtomicU64,
}

impl QueueScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest pending task; returns `false` when the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = self.queue.lock().pop_front();
        match task {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty, including tasks scheduled while
    /// draining. Returns how many ran.
    pub fn run_all(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl TaskScheduler for QueueScheduler {
    fn schedule(&self, task: Task) -> TaskToken {
        let token = TaskToken(self.next.fetch_add(1, Ordering::Relaxed));
        self.queue.lock().push_back((token, task));
        token
    }

    fn cancel(&self, token: TaskToken) {
        self.queue.lock().retain(|(queued, _)| *queued != token);
    }
}
