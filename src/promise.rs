//! The read ends: unique [`Promise`] and clonable [`SharedPromise`].
//!
//! A promise is a handle to a future single-shot outcome. Attaching a
//! continuation builds the next link of the chain: a fresh deferred/promise
//! pair whose resolution is driven by a waiter scheduled onto a work queue
//! when the current state settles.
//!
//! Continuation shapes:
//!
//! - [`then`](Promise::then) — plain-value continuation; the result becomes
//!   the successor's value. Multi-value chains carry tuples and bind
//!   positionally by destructuring (`|(a, b)| …`).
//! - [`try_then`](Promise::try_then) — fallible continuation returning
//!   `Result`; an `Err` becomes the successor's exception.
//! - [`and_then`](Promise::and_then) — promise-returning continuation; the
//!   successor is flattened onto the inner promise's outcome.
//! - [`fail`](Promise::fail) / [`fail_match`](Promise::fail_match) /
//!   [`fail_with`](Promise::fail_with) — recovery points; see each method.
//! - [`finally`](Promise::finally) — always runs, forwards the upstream
//!   outcome verbatim.
//!
//! Exceptions are first-class: they skip over `then` links untouched and are
//! consumed by the first matching recovery point. A panic inside any
//! continuation is caught and becomes the successor's exception.
//!
//! Every combinator has an `*_on` form taking an explicit target queue; the
//! plain forms target the process default queue, and surface a missing
//! default queue as the successor's exception.

use std::error::Error as StdError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::deferred::{failed, Deferred};
use crate::error::Error;
use crate::exception::{report_uncaught, Exception};
use crate::expect::Expect;
use crate::queue::{default_queue, Queue};
use crate::state::{SharedState, State, Target, WaiterFn};

/// A unique, move-only promise: at most one continuation may ever attach,
/// and the settled value is moved into it.
pub struct Promise<T: Send + 'static> {
    state: Arc<State<T>>,
}

/// A clonable promise over a shared state: any number of continuations may
/// attach, each observing a clone of the settled outcome.
pub struct SharedPromise<T> {
    state: Arc<SharedState<T>>,
}

fn then_waiter<T, U, F>(deferred: Deferred<U>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Exception(e) => {
            let _ = deferred.set_exception(e);
        }
        Expect::Value(value) => {
            let _ = deferred.set_by_fun(move || f(value));
        }
    })
}

fn try_then_waiter<T, U, E, F>(deferred: Deferred<U>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    U: Send + 'static,
    E: Into<Exception>,
    F: FnOnce(T) -> Result<U, E> + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Exception(e) => {
            let _ = deferred.set_exception(e);
        }
        Expect::Value(value) => {
            let _ = deferred.try_set_by_fun(move || f(value));
        }
    })
}

fn and_then_waiter<T, U, F>(deferred: Deferred<U>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> Promise<U> + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Exception(e) => {
            let _ = deferred.set_exception(e);
        }
        Expect::Value(value) => {
            let _ = deferred.satisfy_by_fun(move || f(value));
        }
    })
}

fn fail_waiter<T, F>(deferred: Deferred<T>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    F: FnOnce(Exception) -> T + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Value(value) => {
            let _ = deferred.set_value(value);
        }
        Expect::Exception(e) => {
            let _ = deferred.set_by_fun(move || f(e));
        }
    })
}

fn fail_match_waiter<T, E, F>(deferred: Deferred<T>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    E: StdError + 'static,
    F: FnOnce(&E) -> T + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Value(value) => {
            let _ = deferred.set_value(value);
        }
        Expect::Exception(e) => {
            if e.is::<E>() {
                let _ = deferred.set_by_fun(move || {
                    f(e.downcast_ref::<E>().expect("downcast verified before dispatch"))
                });
            } else {
                // Not ours; the next recovery point in the chain gets it.
                let _ = deferred.set_exception(e);
            }
        }
    })
}

fn fail_with_waiter<T, F>(deferred: Deferred<T>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    F: FnOnce(Exception) -> Promise<T> + Send + 'static,
{
    Box::new(move |expect| match expect {
        Expect::Value(value) => {
            let _ = deferred.set_value(value);
        }
        Expect::Exception(e) => {
            let _ = deferred.satisfy_by_fun(move || f(e));
        }
    })
}

fn finally_waiter<T, F>(deferred: Deferred<T>, f: F) -> WaiterFn<T>
where
    T: Send + 'static,
    F: FnOnce() + Send + 'static,
{
    Box::new(move |expect| match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => {
            let _ = deferred.set_expect(expect);
        }
        Err(payload) => {
            let _ = deferred.set_exception(Exception::from_panic(payload));
        }
    })
}

fn done_waiter<T: Send + 'static>() -> WaiterFn<T> {
    Box::new(move |expect| {
        if let Expect::Exception(e) = expect {
            report_uncaught(&e);
        }
    })
}

impl<T: Send + 'static> Promise<T> {
    pub(crate) fn from_state(state: Arc<State<T>>) -> Self {
        Self { state }
    }

    /// Attaches an internal forwarding waiter that runs inline on the
    /// resolving thread. Never used for user continuations.
    pub(crate) fn attach_inline(
        self,
        f: impl FnOnce(Expect<T>) + Send + 'static,
    ) -> Result<(), Error> {
        self.state.attach(Box::new(f), Target::Inline)
    }

    fn chain<U: Send + 'static>(
        self,
        queue: Result<Arc<Queue>, Error>,
        build: impl FnOnce(Deferred<U>) -> WaiterFn<T>,
    ) -> Promise<U> {
        match queue {
            Ok(queue) => {
                let (deferred, promise) = Deferred::new_pair();
                self.state
                    .attach(build(deferred), Target::Queue(queue))
                    .expect("unique promise attached once");
                promise
            }
            Err(err) => failed(err),
        }
    }

    /// Attaches a plain-value continuation targeting the default queue.
    ///
    /// When this promise settles with a value, `f` runs on the queue and its
    /// result resolves the returned promise; an upstream exception bypasses
    /// `f` and resolves the returned promise directly. A panic in `f`
    /// becomes the returned promise's exception.
    pub fn then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(default_queue(), |deferred| then_waiter(deferred, f))
    }

    /// [`then`](Self::then) with an explicit target queue.
    pub fn then_on<U, F>(self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| then_waiter(deferred, f))
    }

    /// Attaches a fallible continuation: `Ok` resolves the successor's
    /// value, `Err` its exception.
    pub fn try_then<U, E, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        E: Into<Exception>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| try_then_waiter(deferred, f))
    }

    /// [`try_then`](Self::try_then) with an explicit target queue.
    pub fn try_then_on<U, E, F>(self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        E: Into<Exception>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| try_then_waiter(deferred, f))
    }

    /// Attaches a promise-returning continuation; the successor resolves
    /// when the inner promise does (flattening).
    pub fn and_then<U, F>(self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| and_then_waiter(deferred, f))
    }

    /// [`and_then`](Self::and_then) with an explicit target queue.
    pub fn and_then_on<U, F>(self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| and_then_waiter(deferred, f))
    }

    /// Attaches a catch-all recovery point.
    ///
    /// An upstream exception is consumed by `f`, whose return value heals
    /// the chain; an upstream value is forwarded unchanged without invoking
    /// `f`. A panic in `f` becomes the successor's exception.
    pub fn fail<F>(self, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> T + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_waiter(deferred, f))
    }

    /// [`fail`](Self::fail) with an explicit target queue.
    pub fn fail_on<F>(self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> T + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_waiter(deferred, f))
    }

    /// Attaches a selective recovery point for exceptions of type `E`.
    ///
    /// If the live exception downcasts to `E`, `f` consumes it and heals the
    /// chain; otherwise the exception re-propagates so the next recovery
    /// point gets a chance.
    pub fn fail_match<E, F>(self, f: F) -> Promise<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> T + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_match_waiter(deferred, f))
    }

    /// [`fail_match`](Self::fail_match) with an explicit target queue.
    pub fn fail_match_on<E, F>(self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> T + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_match_waiter(deferred, f))
    }

    /// Attaches a promise-returning recovery point: the upstream exception
    /// is replaced by the recovery promise's outcome (the retry flow).
    pub fn fail_with<F>(self, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> Promise<T> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_with_waiter(deferred, f))
    }

    /// [`fail_with`](Self::fail_with) with an explicit target queue.
    pub fn fail_with_on<F>(self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> Promise<T> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_with_waiter(deferred, f))
    }

    /// Attaches a continuation that always runs, regardless of outcome; the
    /// upstream outcome is then forwarded verbatim. If `f` panics, the
    /// forwarded outcome is replaced by that exception.
    pub fn finally<F>(self, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(default_queue(), |deferred| finally_waiter(deferred, f))
    }

    /// [`finally`](Self::finally) with an explicit target queue.
    pub fn finally_on<F>(self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| finally_waiter(deferred, f))
    }

    /// Terminates the chain. An unhandled exception is routed to the
    /// process-level uncaught-exception hook; a value is discarded.
    ///
    /// Runs on the default queue when one is installed, otherwise inline on
    /// the resolving thread.
    pub fn done(self) {
        let target = match default_queue() {
            Ok(queue) => Target::Queue(queue),
            Err(_) => Target::Inline,
        };
        let _ = self.state.attach(done_waiter(), target);
    }

    /// [`done`](Self::done) with an explicit target queue.
    pub fn done_on(self, queue: Arc<Queue>) {
        let _ = self.state.attach(done_waiter(), Target::Queue(queue));
    }

    /// Converts this unique promise into a clonable [`SharedPromise`].
    pub fn share(self) -> SharedPromise<T>
    where
        T: Clone,
    {
        let shared = SharedState::new();
        let sink = Arc::clone(&shared);
        let _ = self.state.attach(
            Box::new(move |expect| {
                let _ = sink.resolve(expect);
            }),
            Target::Inline,
        );
        SharedPromise { state: shared }
    }

    /// Blocks the calling thread until the promise settles and moves the
    /// outcome out.
    pub fn wait(self) -> Expect<T> {
        self.state.wait().expect("unique promise observed once")
    }

    /// Blocks until settled and converts the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the exception the chain settled with.
    pub fn get(self) -> Result<T, Exception> {
        self.wait().into_result()
    }
}

impl<T: Send + 'static> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> SharedPromise<T> {
    fn chain<U: Send + 'static>(
        &self,
        queue: Result<Arc<Queue>, Error>,
        build: impl FnOnce(Deferred<U>) -> WaiterFn<T>,
    ) -> Promise<U> {
        match queue {
            Ok(queue) => {
                let (deferred, promise) = Deferred::new_pair();
                self.state.attach(build(deferred), Target::Queue(queue));
                promise
            }
            Err(err) => failed(err),
        }
    }

    /// Attaches a plain-value continuation; see [`Promise::then`]. Each
    /// attached continuation observes its own clone of the settled value.
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(default_queue(), |deferred| then_waiter(deferred, f))
    }

    /// [`then`](Self::then) with an explicit target queue.
    pub fn then_on<U, F>(&self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| then_waiter(deferred, f))
    }

    /// Attaches a fallible continuation; see [`Promise::try_then`].
    pub fn try_then<U, E, F>(&self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        E: Into<Exception>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| try_then_waiter(deferred, f))
    }

    /// [`try_then`](Self::try_then) with an explicit target queue.
    pub fn try_then_on<U, E, F>(&self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        E: Into<Exception>,
        F: FnOnce(T) -> Result<U, E> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| try_then_waiter(deferred, f))
    }

    /// Attaches a promise-returning continuation; see
    /// [`Promise::and_then`].
    pub fn and_then<U, F>(&self, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| and_then_waiter(deferred, f))
    }

    /// [`and_then`](Self::and_then) with an explicit target queue.
    pub fn and_then_on<U, F>(&self, queue: Arc<Queue>, f: F) -> Promise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Promise<U> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| and_then_waiter(deferred, f))
    }

    /// Attaches a catch-all recovery point; see [`Promise::fail`].
    pub fn fail<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> T + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_waiter(deferred, f))
    }

    /// [`fail`](Self::fail) with an explicit target queue.
    pub fn fail_on<F>(&self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> T + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_waiter(deferred, f))
    }

    /// Attaches a selective recovery point; see [`Promise::fail_match`].
    pub fn fail_match<E, F>(&self, f: F) -> Promise<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> T + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_match_waiter(deferred, f))
    }

    /// [`fail_match`](Self::fail_match) with an explicit target queue.
    pub fn fail_match_on<E, F>(&self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        E: StdError + 'static,
        F: FnOnce(&E) -> T + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_match_waiter(deferred, f))
    }

    /// Attaches a promise-returning recovery point; see
    /// [`Promise::fail_with`].
    pub fn fail_with<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> Promise<T> + Send + 'static,
    {
        self.chain(default_queue(), |deferred| fail_with_waiter(deferred, f))
    }

    /// [`fail_with`](Self::fail_with) with an explicit target queue.
    pub fn fail_with_on<F>(&self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce(Exception) -> Promise<T> + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| fail_with_waiter(deferred, f))
    }

    /// Attaches an always-run continuation; see [`Promise::finally`].
    pub fn finally<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(default_queue(), |deferred| finally_waiter(deferred, f))
    }

    /// [`finally`](Self::finally) with an explicit target queue.
    pub fn finally_on<F>(&self, queue: Arc<Queue>, f: F) -> Promise<T>
    where
        F: FnOnce() + Send + 'static,
    {
        self.chain(Ok(queue), |deferred| finally_waiter(deferred, f))
    }

    /// Terminates a branch of the chain; see [`Promise::done`].
    pub fn done(&self) {
        let target = match default_queue() {
            Ok(queue) => Target::Queue(queue),
            Err(_) => Target::Inline,
        };
        self.state.attach(done_waiter(), target);
    }

    /// [`done`](Self::done) with an explicit target queue.
    pub fn done_on(&self, queue: Arc<Queue>) {
        self.state.attach(done_waiter(), Target::Queue(queue));
    }

    /// Produces a unique promise fed by this shared one.
    pub fn unshare(&self) -> Promise<T> {
        let (deferred, promise) = Deferred::new_pair();
        self.state.attach(
            Box::new(move |expect| {
                let _ = deferred.set_expect(expect);
            }),
            Target::Inline,
        );
        promise
    }

    /// Blocks until the promise settles and returns a clone of the outcome.
    pub fn wait(&self) -> Expect<T> {
        self.state.wait()
    }

    /// Blocks until settled and converts a clone of the outcome into a
    /// `Result`.
    ///
    /// # Errors
    ///
    /// Returns the exception the chain settled with.
    pub fn get(&self) -> Result<T, Exception> {
        self.wait().into_result()
    }
}

impl<T> Clone for SharedPromise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for SharedPromise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedPromise").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::{defer, failed, with};
    use crate::error::BrokenPromise;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Runs everything scheduled onto the queue, including tasks scheduled
    /// by tasks.
    fn pump(queue: &Queue) {
        while let Ok(task) = queue.pop() {
            task();
        }
    }

    #[test]
    fn then_chain_runs_in_order_with_previous_results() {
        let queue = Queue::make(0);
        let promise = with(42)
            .then_on(Arc::clone(&queue), |x| x + 1)
            .then_on(Arc::clone(&queue), |x| x * 2);
        pump(&queue);
        assert_eq!(promise.get().expect("value"), 86);
    }

    #[test]
    fn exception_bypasses_then_and_reaches_fail() {
        let queue = Queue::make(0);
        let touched = Arc::new(AtomicUsize::new(0));
        let touched_in_then = Arc::clone(&touched);
        let promise = failed::<i32>(Exception::msg("early"))
            .then_on(Arc::clone(&queue), move |x| {
                touched_in_then.fetch_add(1, Ordering::SeqCst);
                x + 1
            })
            .fail_on(Arc::clone(&queue), |_| 99);
        pump(&queue);
        assert_eq!(promise.get().expect("healed"), 99);
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fail_forwards_value_untouched() {
        let queue = Queue::make(0);
        let touched = Arc::new(AtomicUsize::new(0));
        let touched_in_fail = Arc::clone(&touched);
        let promise = with(5).fail_on(Arc::clone(&queue), move |_| {
            touched_in_fail.fetch_add(1, Ordering::SeqCst);
            0
        });
        pump(&queue);
        assert_eq!(promise.get().expect("value"), 5);
        assert_eq!(touched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn fail_match_consumes_matching_exception() {
        let queue = Queue::make(0);
        let promise = failed::<i32>(io::Error::new(io::ErrorKind::NotFound, "gone"))
            .fail_match_on(Arc::clone(&queue), |e: &io::Error| {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
                7
            });
        pump(&queue);
        assert_eq!(promise.get().expect("healed"), 7);
    }

    #[test]
    fn fail_match_repropagates_other_exceptions() {
        let queue = Queue::make(0);
        let promise = failed::<i32>(Exception::msg("not io"))
            .fail_match_on(Arc::clone(&queue), |_e: &io::Error| 7)
            .fail_on(Arc::clone(&queue), |e| {
                assert_eq!(e.to_string(), "not io");
                13
            });
        pump(&queue);
        assert_eq!(promise.get().expect("healed later"), 13);
    }

    #[test]
    fn fail_with_replaces_exception_with_recovery_promise() {
        let queue = Queue::make(0);
        let promise = failed::<i32>(Exception::msg("retry me"))
            .fail_with_on(Arc::clone(&queue), |_| with(64));
        pump(&queue);
        assert_eq!(promise.get().expect("recovered"), 64);
    }

    #[test]
    fn and_then_flattens_inner_promise() {
        let queue = Queue::make(0);
        let promise = with(1).and_then_on(Arc::clone(&queue), |x| with(x + 10));
        pump(&queue);
        assert_eq!(promise.get().expect("flattened"), 11);
    }

    #[test]
    fn and_then_forwards_inner_failure() {
        let queue = Queue::make(0);
        let promise = with(1).and_then_on(Arc::clone(&queue), |_| {
            failed::<i32>(Exception::msg("inner failed"))
        });
        pump(&queue);
        assert_eq!(
            promise.get().expect_err("exception").to_string(),
            "inner failed"
        );
    }

    #[test]
    fn try_then_err_becomes_successor_exception() {
        let queue = Queue::make(0);
        let promise = with(3).try_then_on(Arc::clone(&queue), |x| {
            if x > 2 {
                Err(Exception::msg("too big"))
            } else {
                Ok(x)
            }
        });
        pump(&queue);
        assert_eq!(
            promise.get().expect_err("exception").to_string(),
            "too big"
        );
    }

    #[test]
    fn panic_in_then_becomes_successor_exception() {
        let queue = Queue::make(0);
        let promise = with(1).then_on(Arc::clone(&queue), |_: i32| -> i32 {
            panic!("continuation blew up")
        });
        pump(&queue);
        assert_eq!(
            promise.get().expect_err("exception").to_string(),
            "panic: continuation blew up"
        );
    }

    #[test]
    fn finally_runs_on_both_branches_and_forwards() {
        let queue = Queue::make(0);
        let runs = Arc::new(AtomicUsize::new(0));

        let counted = Arc::clone(&runs);
        let ok = with(10).finally_on(Arc::clone(&queue), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        let counted = Arc::clone(&runs);
        let bad = failed::<i32>(Exception::msg("down")).finally_on(Arc::clone(&queue), move || {
            counted.fetch_add(1, Ordering::SeqCst);
        });

        pump(&queue);
        assert_eq!(ok.get().expect("forwarded value"), 10);
        assert_eq!(bad.get().expect_err("forwarded exception").to_string(), "down");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn finally_panic_replaces_outcome() {
        let queue = Queue::make(0);
        let promise = with(10).finally_on(Arc::clone(&queue), || panic!("cleanup failed"));
        pump(&queue);
        assert_eq!(
            promise.get().expect_err("exception").to_string(),
            "panic: cleanup failed"
        );
    }

    #[test]
    fn tuple_values_bind_positionally_by_pattern() {
        let queue = Queue::make(0);
        let promise = with((2, 3)).then_on(Arc::clone(&queue), |(a, b)| a * b);
        pump(&queue);
        assert_eq!(promise.get().expect("value"), 6);
    }

    #[test]
    fn shared_promise_fans_out_to_multiple_continuations() {
        let queue = Queue::make(0);
        let deferred = defer::<i32>();
        let shared = deferred.get_promise().expect("promise").share();

        let doubled = shared.then_on(Arc::clone(&queue), |x| x * 2);
        let tripled = shared.clone().then_on(Arc::clone(&queue), |x| x * 3);

        deferred.set_value(6).expect("resolution");
        pump(&queue);
        assert_eq!(doubled.get().expect("doubled"), 12);
        assert_eq!(tripled.get().expect("tripled"), 18);
    }

    #[test]
    fn share_then_unshare_round_trip() {
        let shared = with(9).share();
        let unique = shared.unshare();
        assert_eq!(unique.get().expect("value"), 9);
        // The shared end still observes the outcome.
        assert_eq!(shared.get().expect("value"), 9);
    }

    #[test]
    fn chain_order_is_preserved() {
        let queue = Queue::make(0);
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let log_f = Arc::clone(&log);
        let log_g = Arc::clone(&log);
        let log_h = Arc::clone(&log);
        let promise = with(0)
            .then_on(Arc::clone(&queue), move |x| {
                log_f.lock().push("f");
                x + 1
            })
            .then_on(Arc::clone(&queue), move |x| {
                log_g.lock().push("g");
                x + 1
            })
            .then_on(Arc::clone(&queue), move |x| {
                log_h.lock().push("h");
                x + 1
            });

        pump(&queue);
        assert_eq!(promise.get().expect("value"), 3);
        assert_eq!(*log.lock(), vec!["f", "g", "h"]);
    }

    #[test]
    fn broken_upstream_reaches_downstream_fail() {
        let queue = Queue::make(0);
        let deferred = defer::<i32>();
        let promise = deferred
            .get_promise()
            .expect("promise")
            .fail_match_on(Arc::clone(&queue), |_: &BrokenPromise| -1);
        drop(deferred);
        pump(&queue);
        assert_eq!(promise.get().expect("healed"), -1);
    }

    #[test]
    fn done_reports_through_uncaught_hook() {
        let queue = Queue::make(0);
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let previous = crate::exception::set_uncaught_exception_handler(move |e| {
            assert_eq!(e.to_string(), "terminal");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        failed::<i32>(Exception::msg("terminal")).done_on(Arc::clone(&queue));
        with(1).done_on(Arc::clone(&queue));
        pump(&queue);

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        match previous {
            Some(previous) => {
                crate::exception::set_uncaught_exception_handler(move |e| (*previous)(e));
            }
            None => {
                crate::exception::clear_uncaught_exception_handler();
            }
        }
    }
}
