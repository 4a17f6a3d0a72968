use std::{future::Future, sync::Mutex};

use prio_queue::{Callback, deliver};

/// Consumer of values popped by an async [`Queue`](crate::Queue).
///
/// `handle` is awaited to completion before the next value is popped.
#[async_trait::async_trait]
pub trait Handler<T>: Send + Sync + 'static {
    async fn handle(&self, value: T);
}

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F>(pub F);

#[async_trait::async_trait]
impl<T, F, Fut> Handler<T> for FnHandler<F>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, value: T) {
        (self.0)(value).await
    }
}

/// Drops every value it receives.
pub struct Discard;

#[async_trait::async_trait]
impl<T: Send + 'static> Handler<T> for Discard {
    async fn handle(&self, _value: T) {}
}

/// Runs a synchronous [`Callback`] inline on the consumer task.
/// # Note
/// The callback blocks the runtime worker it runs on, keep it short or use a multi-threaded
/// runtime.
pub struct CallbackHandler<T>(Mutex<Option<Callback<T>>>);

impl<T> CallbackHandler<T> {
    pub fn new(callback: Option<Callback<T>>) -> Self {
        Self(Mutex::new(callback))
    }
}

#[async_trait::async_trait]
impl<T: Send + 'static> Handler<T> for CallbackHandler<T> {
    async fn handle(&self, value: T) {
        let mut callback = self
            .0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        deliver(&mut callback, value);
    }
}
