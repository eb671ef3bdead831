use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BoxError, EventQueue, panic_message};

type Continuation<T> = Box<dyn FnOnce(Result<T, BoxError>) + Send>;

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromiseState {
    Pending,
    Fulfilled,
    Failed,
}

enum Outcome<T> {
    Pending,
    Fulfilled(T),
    Failed(BoxError),
    /// the outcome was handed to a continuation
    Delivered(PromiseState),
}

struct Stage<T> {
    outcome: Outcome<T>,
    /// set by the first resolve or reject, later ones are ignored
    settled: bool,
    continuation: Option<Continuation<T>>,
}

impl<T: Send + 'static> Stage<T> {
    fn new() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self { outcome: Outcome::Pending, settled: false, continuation: None }))
    }
}

/// Hands `result` to the attached continuation, or stores it until one is attached.
fn complete<T: Send + 'static>(stage: &Mutex<Stage<T>>, result: Result<T, BoxError>) {
    let mut guard = stage.lock();
    guard.settled = true;
    match guard.continuation.take() {
        Some(continuation) => {
            guard.outcome = Outcome::Delivered(if result.is_ok() { PromiseState::Fulfilled } else { PromiseState::Failed });
            drop(guard);
            continuation(result);
        }
        None => {
            guard.outcome = match result {
                Ok(value) => Outcome::Fulfilled(value),
                Err(e) => Outcome::Failed(e),
            };
        }
    }
}

/// Settles `stage` through `queue` unless it was settled before.
fn settle<T: Send + 'static>(stage: &Arc<Mutex<Stage<T>>>, queue: &EventQueue, result: Result<T, BoxError>) {
    {
        let mut guard = stage.lock();
        if guard.settled {
            return;
        }
        guard.settled = true;
    }
    let stage = Arc::clone(stage);
    queue.add_immediate(move || complete(&stage, result));
}

/// Runs a continuation, turning a panic into a failure of the next stage.
fn run<T, U>(f: impl FnOnce(T) -> Result<U, BoxError>, value: T) -> Result<U, BoxError> {
    match panic::catch_unwind(AssertUnwindSafe(|| f(value))) {
        Ok(result) => result,
        Err(payload) => Err(format!("continuation panicked: {}", panic_message(payload.as_ref())).into()),
    }
}

/// Fulfils a [`Promise`]. Only the first of `resolve`/`reject` takes effect.
pub struct Resolve<T> {
    stage: Arc<Mutex<Stage<T>>>,
    queue: EventQueue,
}

/// Fails a [`Promise`]. Only the first of `resolve`/`reject` takes effect.
pub struct Reject<T> {
    stage: Arc<Mutex<Stage<T>>>,
    queue: EventQueue,
}

impl<T: Send + 'static> Resolve<T> {
    /// Queues the fulfilment, continuations run on the next poll of the queue.
    pub fn resolve(&self, value: T) {
        settle(&self.stage, &self.queue, Ok(value));
    }
}

impl<T: Send + 'static> Reject<T> {
    /// Queues the failure, handlers run on the next poll of the queue.
    pub fn reject(&self, reason: impl Into<BoxError>) {
        settle(&self.stage, &self.queue, Err(reason.into()));
    }
}

impl<T> Clone for Resolve<T> {
    fn clone(&self) -> Self {
        Self { stage: Arc::clone(&self.stage), queue: self.queue.clone() }
    }
}

impl<T> Clone for Reject<T> {
    fn clone(&self) -> Self {
        Self { stage: Arc::clone(&self.stage), queue: self.queue.clone() }
    }
}

impl<T> fmt::Debug for Resolve<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolve").finish_non_exhaustive()
    }
}

impl<T> fmt::Debug for Reject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reject").finish_non_exhaustive()
    }
}

/// A single assignment value that becomes available later.
///
/// Settling goes through the owning [`EventQueue`]: `resolve` only queues the
/// settlement and the continuations run when the queue is polled. Attaching a
/// continuation to a promise that already settled acts on the stored outcome
/// right away.
///
/// ```
/// use micro_reactor::event::{EventQueue, Promise};
///
/// let queue = EventQueue::new();
/// let (tx, rx) = std::sync::mpsc::channel();
///
/// Promise::new(&queue, |resolve, _reject| resolve.resolve(20))
///     .then(|v| Ok(v + 1))
///     .then(move |v| Ok(tx.send(v * 2)?));
///
/// assert!(rx.try_recv().is_err());
/// queue.poll();
/// assert_eq!(rx.try_recv().unwrap(), 42);
/// ```
pub struct Promise<T> {
    stage: Arc<Mutex<Stage<T>>>,
    queue: EventQueue,
}

impl<T: Send + 'static> Promise<T> {
    /// Creates a promise and runs `executor` with its resolve and reject handles.
    pub fn new<F>(queue: &EventQueue, executor: F) -> Self
    where
        F: FnOnce(Resolve<T>, Reject<T>),
    {
        let promise = Self { stage: Stage::new(), queue: queue.clone() };
        executor(promise.resolver(), promise.rejecter());
        promise
    }

    /// A promise that fulfils with `value` on the next poll.
    pub fn ready(queue: &EventQueue, value: T) -> Self {
        Self::new(queue, |resolve, _| resolve.resolve(value))
    }

    /// A promise that fails with `reason` on the next poll.
    pub fn rejected(queue: &EventQueue, reason: impl Into<BoxError>) -> Self {
        Self::new(queue, |_, reject| reject.reject(reason))
    }

    pub fn resolver(&self) -> Resolve<T> {
        Resolve { stage: Arc::clone(&self.stage), queue: self.queue.clone() }
    }

    pub fn rejecter(&self) -> Reject<T> {
        Reject { stage: Arc::clone(&self.stage), queue: self.queue.clone() }
    }

    pub fn state(&self) -> PromiseState {
        match &self.stage.lock().outcome {
            Outcome::Pending => PromiseState::Pending,
            Outcome::Fulfilled(_) => PromiseState::Fulfilled,
            Outcome::Failed(_) => PromiseState::Failed,
            Outcome::Delivered(state) => *state,
        }
    }

    /// Chains `f` onto the value of this promise.
    ///
    /// A failure of this promise skips `f` and fails the returned one. When `f`
    /// returns an error (or panics) the returned promise fails immediately, the
    /// error reaches its handler if one is attached and is kept otherwise.
    pub fn then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Result<U, BoxError> + Send + 'static,
    {
        let next = Promise { stage: Stage::new(), queue: self.queue.clone() };
        let next_stage = Arc::clone(&next.stage);
        let next_queue = next.queue.clone();
        let forward = move |result: Result<T, BoxError>| match result.and_then(|value| run(f, value)) {
            Ok(value) => settle(&next_stage, &next_queue, Ok(value)),
            Err(e) => complete(&next_stage, Err(e)),
        };

        let mut guard = self.stage.lock();
        match std::mem::replace(&mut guard.outcome, Outcome::Pending) {
            Outcome::Fulfilled(value) => {
                guard.outcome = Outcome::Delivered(PromiseState::Fulfilled);
                drop(guard);
                forward(Ok(value));
            }
            Outcome::Failed(e) => {
                guard.outcome = Outcome::Delivered(PromiseState::Failed);
                drop(guard);
                forward(Err(e));
            }
            outcome @ (Outcome::Pending | Outcome::Delivered(_)) => {
                guard.outcome = outcome;
                guard.continuation = Some(Box::new(forward));
            }
        }

        next
    }

    /// Attaches the terminal failure handler.
    ///
    /// `handler` runs at most once, immediately if this promise already failed.
    pub fn except<F>(self, handler: F)
    where
        F: FnOnce(BoxError) + Send + 'static,
    {
        let mut guard = self.stage.lock();
        match std::mem::replace(&mut guard.outcome, Outcome::Pending) {
            Outcome::Failed(e) => {
                guard.outcome = Outcome::Delivered(PromiseState::Failed);
                drop(guard);
                handler(e);
            }
            Outcome::Fulfilled(_) => {
                guard.outcome = Outcome::Delivered(PromiseState::Fulfilled);
            }
            outcome @ (Outcome::Pending | Outcome::Delivered(_)) => {
                guard.outcome = outcome;
                guard.continuation = Some(Box::new(move |result| {
                    if let Err(e) = result {
                        handler(e);
                    }
                }));
            }
        }
    }
}

impl<T: Send + 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("state", &self.state()).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[test]
    fn continuations_run_only_on_poll() {
        let queue = EventQueue::new();
        let calls = counter();

        let resolver = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&resolver);
        let (c1, c2) = (Arc::clone(&calls), Arc::clone(&calls));
        let last = Promise::new(&queue, move |resolve, _| *slot.lock() = Some(resolve))
            .then(move |v: i32| {
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(v + 1)
            })
            .then(move |v| {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(v + 1)
            });

        // nothing settled yet
        assert!(!queue.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        resolver.lock().as_ref().unwrap().resolve(1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(last.state(), PromiseState::Pending);

        assert!(queue.poll());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(last.state(), PromiseState::Fulfilled);

        // attaching to a fulfilled stage runs right away
        let c3 = Arc::clone(&calls);
        let seen = Arc::new(Mutex::new(0));
        let s = Arc::clone(&seen);
        last.then(move |v| {
            c3.fetch_add(1, Ordering::SeqCst);
            *s.lock() = v;
            Ok(())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*seen.lock(), 3);
    }

    #[test]
    fn failure_skips_then_and_reaches_except() {
        let queue = EventQueue::new();
        let skipped = counter();
        let s = Arc::clone(&skipped);

        let failed = Promise::ready(&queue, 1)
            .then(|_| -> Result<i32, BoxError> { Err("first stage failed".into()) })
            .then(move |v| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(v)
            });

        queue.poll();
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
        assert_eq!(failed.state(), PromiseState::Failed);

        let s = Arc::clone(&skipped);
        let reason = Arc::new(Mutex::new(String::new()));
        let r = Arc::clone(&reason);
        failed
            .then(move |v| {
                s.fetch_add(1, Ordering::SeqCst);
                Ok(v)
            })
            .except(move |e| *r.lock() = e.to_string());

        assert_eq!(skipped.load(Ordering::SeqCst), 0);
        assert_eq!(*reason.lock(), "first stage failed");
    }

    #[test]
    fn attached_except_receives_failure_on_poll() {
        let queue = EventQueue::new();
        let reason = Arc::new(Mutex::new(None));
        let r = Arc::clone(&reason);

        Promise::<u8>::rejected(&queue, "nope").except(move |e| *r.lock() = Some(e.to_string()));
        assert!(reason.lock().is_none());

        queue.poll();
        assert_eq!(reason.lock().as_deref(), Some("nope"));
    }

    #[test]
    fn only_first_settlement_counts() {
        let queue = EventQueue::new();
        let promise = Promise::new(&queue, |resolve, reject| {
            resolve.resolve(1);
            resolve.resolve(2);
            reject.reject("late");
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        promise.then(move |v| {
            s.lock().push(v);
            Ok(())
        });

        queue.poll();
        assert_eq!(*seen.lock(), vec![1]);
    }

    #[test]
    fn panicking_continuation_fails_next_stage() {
        let queue = EventQueue::new();
        let reason = Arc::new(Mutex::new(String::new()));
        let r = Arc::clone(&reason);

        Promise::ready(&queue, ())
            .then(|()| -> Result<(), BoxError> { panic!("handler exploded") })
            .except(move |e| *r.lock() = e.to_string());

        queue.poll();
        assert_eq!(*reason.lock(), "continuation panicked: handler exploded");
    }

    #[test]
    fn resolve_from_another_thread() {
        let queue = EventQueue::new();
        let promise = Promise::new(&queue, |resolve, _| {
            std::thread::spawn(move || resolve.resolve(String::from("from worker")));
        });
        let seen = Arc::new(Mutex::new(String::new()));
        let s = Arc::clone(&seen);
        promise.then(move |v| {
            *s.lock() = v;
            Ok(())
        });

        while seen.lock().is_empty() {
            queue.poll();
            std::thread::yield_now();
        }
        assert_eq!(*seen.lock(), "from worker");
    }
}
