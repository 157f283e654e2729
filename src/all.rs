//! Aggregation combinators: many promises into one.
//!
//! A single entry point, [`all`], accepts either form the spec defines:
//!
//! - a **tuple of promises** (heterogeneous, arities 0–8):
//!   `all((p1, p2, p3))` yields `Promise<(T1, T2, T3)>`. Built recursively
//!   from a binary merge; if any input fails, the aggregate fails with the
//!   first-observed exception and later outcomes are discarded.
//! - a **`Vec` of promises** (homogeneous): `all(vec)` yields
//!   `Promise<Vec<T>>` and waits for *every* input to settle. If any input
//!   failed, the aggregate fails with a
//!   [`CombinedPromiseException`] carrying every element's outcome, in input
//!   order. Otherwise it resolves to the values in input order, regardless
//!   of completion order.
//!
//! The list form uses a shared atomic counter (seq-cst) decremented as each
//! input settles; the failure flag is set before the decrement, and the
//! decrementer that observes the 1→0 transition reads the slots and resolves
//! the output.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::deferred::{with, Deferred};
use crate::error::CombinedPromiseException;
use crate::expect::Expect;
use crate::promise::Promise;

/// Inputs accepted by [`all`]: tuples of promises, or a `Vec` of promises.
pub trait All {
    /// The aggregate value the combined promise resolves to.
    type Output: Send + 'static;

    /// Combines the inputs into one promise.
    fn all(self) -> Promise<Self::Output>;
}

/// Combines many promises into one; see the module docs for both forms.
pub fn all<A: All>(input: A) -> Promise<A::Output> {
    input.all()
}

/// Restructures a settled value without user code; inline, infallible.
fn map_inline<T, U, F>(promise: Promise<T>, f: F) -> Promise<U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnOnce(T) -> U + Send + 'static,
{
    let (deferred, out) = Deferred::new_pair();
    let _ = promise.attach_inline(move |expect| match expect {
        Expect::Value(value) => {
            let _ = deferred.set_value(f(value));
        }
        Expect::Exception(e) => {
            let _ = deferred.set_exception(e);
        }
    });
    out
}

/// The binary merge every tuple arity reduces to: resolves to both values,
/// or to the first-observed exception.
fn merge2<A, B>(a: Promise<A>, b: Promise<B>) -> Promise<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    let (deferred, out) = Deferred::new_pair();
    let _ = a.attach_inline(move |ea| match ea {
        Expect::Exception(e) => {
            let _ = deferred.set_exception(e);
        }
        Expect::Value(va) => {
            let _ = b.attach_inline(move |eb| match eb {
                Expect::Exception(e) => {
                    let _ = deferred.set_exception(e);
                }
                Expect::Value(vb) => {
                    let _ = deferred.set_value((va, vb));
                }
            });
        }
    });
    out
}

impl All for () {
    type Output = ();

    fn all(self) -> Promise<()> {
        with(())
    }
}

impl<T1> All for (Promise<T1>,)
where
    T1: Send + 'static,
{
    type Output = (T1,);

    fn all(self) -> Promise<(T1,)> {
        map_inline(self.0, |v1| (v1,))
    }
}

impl<T1, T2> All for (Promise<T1>, Promise<T2>)
where
    T1: Send + 'static,
    T2: Send + 'static,
{
    type Output = (T1, T2);

    fn all(self) -> Promise<(T1, T2)> {
        let (p1, p2) = self;
        merge2(p1, p2)
    }
}

impl<T1, T2, T3> All for (Promise<T1>, Promise<T2>, Promise<T3>)
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
{
    type Output = (T1, T2, T3);

    fn all(self) -> Promise<(T1, T2, T3)> {
        let (p1, p2, p3) = self;
        map_inline(merge2(p1, (p2, p3).all()), |(v1, (v2, v3))| (v1, v2, v3))
    }
}

impl<T1, T2, T3, T4> All for (Promise<T1>, Promise<T2>, Promise<T3>, Promise<T4>)
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    T4: Send + 'static,
{
    type Output = (T1, T2, T3, T4);

    fn all(self) -> Promise<(T1, T2, T3, T4)> {
        let (p1, p2, p3, p4) = self;
        map_inline(merge2(p1, (p2, p3, p4).all()), |(v1, (v2, v3, v4))| {
            (v1, v2, v3, v4)
        })
    }
}

impl<T1, T2, T3, T4, T5> All
    for (
        Promise<T1>,
        Promise<T2>,
        Promise<T3>,
        Promise<T4>,
        Promise<T5>,
    )
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    T4: Send + 'static,
    T5: Send + 'static,
{
    type Output = (T1, T2, T3, T4, T5);

    fn all(self) -> Promise<(T1, T2, T3, T4, T5)> {
        let (p1, p2, p3, p4, p5) = self;
        map_inline(
            merge2(p1, (p2, p3, p4, p5).all()),
            |(v1, (v2, v3, v4, v5))| (v1, v2, v3, v4, v5),
        )
    }
}

impl<T1, T2, T3, T4, T5, T6> All
    for (
        Promise<T1>,
        Promise<T2>,
        Promise<T3>,
        Promise<T4>,
        Promise<T5>,
        Promise<T6>,
    )
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    T4: Send + 'static,
    T5: Send + 'static,
    T6: Send + 'static,
{
    type Output = (T1, T2, T3, T4, T5, T6);

    fn all(self) -> Promise<(T1, T2, T3, T4, T5, T6)> {
        let (p1, p2, p3, p4, p5, p6) = self;
        map_inline(
            merge2(p1, (p2, p3, p4, p5, p6).all()),
            |(v1, (v2, v3, v4, v5, v6))| (v1, v2, v3, v4, v5, v6),
        )
    }
}

impl<T1, T2, T3, T4, T5, T6, T7> All
    for (
        Promise<T1>,
        Promise<T2>,
        Promise<T3>,
        Promise<T4>,
        Promise<T5>,
        Promise<T6>,
        Promise<T7>,
    )
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    T4: Send + 'static,
    T5: Send + 'static,
    T6: Send + 'static,
    T7: Send + 'static,
{
    type Output = (T1, T2, T3, T4, T5, T6, T7);

    fn all(self) -> Promise<(T1, T2, T3, T4, T5, T6, T7)> {
        let (p1, p2, p3, p4, p5, p6, p7) = self;
        map_inline(
            merge2(p1, (p2, p3, p4, p5, p6, p7).all()),
            |(v1, (v2, v3, v4, v5, v6, v7))| (v1, v2, v3, v4, v5, v6, v7),
        )
    }
}

impl<T1, T2, T3, T4, T5, T6, T7, T8> All
    for (
        Promise<T1>,
        Promise<T2>,
        Promise<T3>,
        Promise<T4>,
        Promise<T5>,
        Promise<T6>,
        Promise<T7>,
        Promise<T8>,
    )
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    T4: Send + 'static,
    T5: Send + 'static,
    T6: Send + 'static,
    T7: Send + 'static,
    T8: Send + 'static,
{
    type Output = (T1, T2, T3, T4, T5, T6, T7, T8);

    fn all(self) -> Promise<(T1, T2, T3, T4, T5, T6, T7, T8)> {
        let (p1, p2, p3, p4, p5, p6, p7, p8) = self;
        map_inline(
            merge2(p1, (p2, p3, p4, p5, p6, p7, p8).all()),
            |(v1, (v2, v3, v4, v5, v6, v7, v8))| (v1, v2, v3, v4, v5, v6, v7, v8),
        )
    }
}

impl<T> All for Vec<Promise<T>>
where
    T: Send + Sync + 'static,
{
    type Output = Vec<T>;

    fn all(self) -> Promise<Vec<T>> {
        let (deferred, out) = Deferred::new_pair();
        let num = self.len();
        if num == 0 {
            let _ = deferred.set_value(Vec::new());
            return out;
        }

        let slots: Arc<Vec<Mutex<Option<Expect<T>>>>> =
            Arc::new((0..num).map(|_| Mutex::new(None)).collect());
        let remaining = Arc::new(AtomicUsize::new(num));
        let any_failure = Arc::new(AtomicBool::new(false));

        for (index, promise) in self.into_iter().enumerate() {
            let slots = Arc::clone(&slots);
            let remaining = Arc::clone(&remaining);
            let any_failure = Arc::clone(&any_failure);
            let deferred = deferred.clone();
            let _ = promise.attach_inline(move |expect| {
                if expect.has_exception() {
                    any_failure.store(true, Ordering::SeqCst);
                }
                *slots[index].lock() = Some(expect);
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    // Last settler: every slot has been written and published
                    // by the counter decrements.
                    let expects: Vec<Expect<T>> = slots
                        .iter()
                        .map(|slot| slot.lock().take().expect("every input settled"))
                        .collect();
                    if any_failure.load(Ordering::SeqCst) {
                        let _ = deferred.set_exception(CombinedPromiseException::new(expects));
                    } else {
                        let values = expects.into_iter().map(Expect::consume).collect();
                        let _ = deferred.set_value(values);
                    }
                }
            });
        }

        out
    }
}
