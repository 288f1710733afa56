//! Promise-bearing method outputs.
//!
//! A method's output slot is a [`Promise`]: it may already hold a value
//! when the method returns (synchronous method), or it may still be
//! empty and get resolved later by whatever produced it (an async
//! method, a timer, a network response). The engine never blocks on a
//! promise — it polls once per update tick and otherwise leaves pending
//! promises alone, consistent with the single-threaded cooperative
//! execution model: there is no internal timeout, and a promise that
//! never settles simply keeps `pendingCount` above zero forever.
//!
//! This mirrors `VariableActivation`/`SharedState` in the dataflow
//! literature this engine descends from, minus the thread-pool producer:
//! resolution here always comes from a plain function call, never from a
//! spawned task.

use crate::error::MethodFailure;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

enum State<T> {
    Pending,
    Ready(T),
    Error(MethodFailure),
}

struct Inner<T> {
    state: State<T>,
    waker: Option<Waker>,
}

/// A promise for a single method output.
///
/// Cloning a `Promise` shares the same underlying cell; this is how the
/// engine keeps a handle to poll while a [`Resolver`] kept by the method
/// holds the other end.
pub struct Promise<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// The producing half of a [`Promise`]. A synchronous method resolves its
/// promises before returning; an asynchronous method stashes the resolver
/// and calls it once its value is available.
pub struct Resolver<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

/// Creates a linked pending promise/resolver pair.
pub fn pending<T>() -> (Promise<T>, Resolver<T>) {
    let inner = Rc::new(RefCell::new(Inner {
        state: State::Pending,
        waker: None,
    }));
    (
        Promise {
            inner: Rc::clone(&inner),
        },
        Resolver { inner },
    )
}

/// Creates a promise that is already resolved with a value.
pub fn ready<T>(value: T) -> Promise<T> {
    Promise {
        inner: Rc::new(RefCell::new(Inner {
            state: State::Ready(value),
            waker: None,
        })),
    }
}

/// Creates a promise that is already resolved with an error.
pub fn failed<T>(error: MethodFailure) -> Promise<T> {
    Promise {
        inner: Rc::new(RefCell::new(Inner {
            state: State::Error(error),
            waker: None,
        })),
    }
}

impl<T: Clone> Promise<T> {
    /// Polls without blocking. Returns `None` while pending, otherwise
    /// the settled result. Does not consume the promise: repeated calls
    /// after settlement keep returning the same result.
    pub fn poll_ready(&self) -> Option<Result<T, MethodFailure>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Ready(value) => Some(Ok(value.clone())),
            State::Error(e) => Some(Err(e.clone())),
        }
    }

    /// True once the promise has settled, successfully or not.
    pub fn is_settled(&self) -> bool {
        !matches!(self.inner.borrow().state, State::Pending)
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T, MethodFailure>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        match &inner.state {
            State::Pending => {
                inner.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            State::Ready(value) => Poll::Ready(Ok(value.clone())),
            State::Error(e) => Poll::Ready(Err(e.clone())),
        }
    }
}

impl<T> Resolver<T> {
    /// Resolves the linked promise with a value, waking any registered
    /// waker. A no-op if already settled (the first settlement wins,
    /// which is what happens when an old activation is superseded and
    /// its resolver is simply dropped without ever being called again).
    pub fn resolve(self, value: T) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.state, State::Pending) {
            inner.state = State::Ready(value);
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        }
    }

    /// Rejects the linked promise.
    pub fn reject(self, error: MethodFailure) {
        let mut inner = self.inner.borrow_mut();
        if matches!(inner.state, State::Pending) {
            inner.state = State::Error(error);
            if let Some(waker) = inner.waker.take() {
                waker.wake();
            }
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match &self.inner.borrow().state {
            State::Pending => "Pending",
            State::Ready(_) => "Ready",
            State::Error(_) => "Error",
        };
        write!(f, "Promise({})", label)
    }
}
