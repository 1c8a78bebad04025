use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::CacheError;

/// Cleanup run once when a subscription ends.
pub type Teardown = Box<dyn FnOnce() + Send>;

type Producer<T> = Box<dyn FnOnce(Sink<T>) -> Option<Teardown> + Send>;

/// Receiver of stream events.
pub trait Observer<T>: Send {
    fn next(&mut self, value: T);
    fn error(&mut self, error: CacheError);
    fn complete(&mut self);
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnOnce(CacheError) + Send>;
type CompleteFn = Box<dyn FnOnce() + Send>;

/// Closure-based [`Observer`]; unset callbacks ignore their event.
pub struct Callbacks<T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T> Default for Callbacks<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }
}

impl<T> Callbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_next(mut self, f: impl FnMut(T) + Send + 'static) -> Self {
        self.next = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnOnce(CacheError) + Send + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }
}

impl<T> Observer<T> for Callbacks<T> {
    fn next(&mut self, value: T) {
        if let Some(next) = self.next.as_mut() {
            next(value);
        }
    }

    fn error(&mut self, error: CacheError) {
        if let Some(f) = self.error.take() {
            f(error);
        }
    }

    fn complete(&mut self) {
        if let Some(f) = self.complete.take() {
            f();
        }
    }
}

enum Event<T> {
    Next(T),
    Error(CacheError),
    Complete,
}

struct Delivery<T> {
    observer: Option<Box<dyn Observer<T>>>,
    queue: VecDeque<Event<T>>,
    /// Set while some caller is delivering the queue.
    draining: bool,
}

struct Shared<T> {
    closed: AtomicBool,
    delivery: Mutex<Delivery<T>>,
    cleanup: Mutex<Option<Teardown>>,
}

impl<T> Shared<T> {
    fn run_cleanup(&self) {
        let cleanup = self.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    /// Queues `event` and delivers the queue unless another call already is.
    ///
    /// The observer is called without any lock held; events raised from
    /// inside an observer callback are delivered after it returns, in order.
    fn emit(&self, event: Event<T>) {
        {
            let mut delivery = self.delivery.lock();
            if delivery.observer.is_none() && !delivery.draining {
                return;
            }
            delivery.queue.push_back(event);
            if delivery.draining {
                return;
            }
            delivery.draining = true;
        }
        loop {
            let (event, observer) = {
                let mut delivery = self.delivery.lock();
                match delivery.queue.pop_front() {
                    Some(event) => (event, delivery.observer.take()),
                    None => {
                        delivery.draining = false;
                        return;
                    }
                }
            };
            let Some(mut observer) = observer else {
                continue;
            };
            match event {
                Event::Next(value) => {
                    observer.next(value);
                    let mut delivery = self.delivery.lock();
                    if self.is_open_for_delivery(&delivery) {
                        delivery.observer = Some(observer);
                    }
                }
                Event::Error(error) => observer.error(error),
                Event::Complete => observer.complete(),
            }
        }
    }

    /// The observer goes back only while a terminal event is still pending
    /// or the stream is open; after unsubscribe it is dropped.
    fn is_open_for_delivery(&self, delivery: &Delivery<T>) -> bool {
        !self.closed.load(Ordering::Acquire) || !delivery.queue.is_empty()
    }

    /// Closes the stream. Returns `false` if it was already closed.
    fn close_once(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    fn terminate(&self, event: Event<T>) {
        if self.close_once() {
            self.emit(event);
        }
        self.run_cleanup();
    }
}

/// Producer side of a stream.
pub struct Sink<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Sink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Sink<T> {
    /// Delivers a value; ignored once the stream is closed.
    pub fn next(&self, value: T) {
        if self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        self.shared.emit(Event::Next(value));
    }

    pub fn error(&self, error: CacheError) {
        self.shared.terminate(Event::Error(error));
    }

    pub fn complete(&self) {
        self.shared.terminate(Event::Complete);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Consumer handle of an active stream.
pub struct Subscription {
    close: Arc<dyn Closable>,
}

trait Closable: Send + Sync {
    fn close(&self);
    fn is_closed(&self) -> bool;
}

impl<T: Send> Closable for Shared<T> {
    fn close(&self) {
        if self.close_once() {
            let dropped = {
                let mut delivery = self.delivery.lock();
                delivery.queue.clear();
                delivery.observer.take()
            };
            drop(dropped);
        }
        self.run_cleanup();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Subscription {
    /// Stops delivery and runs the producer's cleanup. Idempotent.
    pub fn unsubscribe(&self) {
        self.close.close();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Lazy, single-subscriber push stream.
///
/// Nothing runs until [`Observable::subscribe`]; the producer receives a
/// [`Sink`] and may return cleanup to run when the stream ends or the
/// subscriber unsubscribes.
pub struct Observable<T> {
    producer: Producer<T>,
}

impl<T: Send + 'static> Observable<T> {
    pub fn create<F>(producer: F) -> Self
    where
        F: FnOnce(Sink<T>) -> Option<Teardown> + Send + 'static,
    {
        Self {
            producer: Box::new(producer),
        }
    }

    /// Emits each value, then completes.
    pub fn from_values(values: Vec<T>) -> Self {
        Self::create(move |sink| {
            for value in values {
                sink.next(value);
            }
            sink.complete();
            None
        })
    }

    /// Fails immediately.
    pub fn from_error(error: CacheError) -> Self {
        Self::create(move |sink| {
            sink.error(error);
            None
        })
    }

    pub fn subscribe(self, observer: impl Observer<T> + 'static) -> Subscription {
        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            delivery: Mutex::new(Delivery {
                observer: Some(Box::new(observer) as Box<dyn Observer<T>>),
                queue: VecDeque::new(),
                draining: false,
            }),
            cleanup: Mutex::new(None),
        });
        let teardown = (self.producer)(Sink {
            shared: shared.clone(),
        });
        if let Some(teardown) = teardown {
            *shared.cleanup.lock() = Some(teardown);
            if shared.closed.load(Ordering::Acquire) {
                shared.run_cleanup();
            }
        }
        Subscription { close: shared }
    }
}
