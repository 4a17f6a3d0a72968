use std::panic::{self, AssertUnwindSafe};

use crate::{DEFAULT_PRIORITY, QueueResult};

/// Consumer of popped values. A queue started without one discards every value it pops.
pub type Callback<T> = Box<dyn FnMut(T) + Send + 'static>;

/// A priority queue that drains itself in the background, handing every popped value to a
/// consumer one at a time.
///
/// Values still queued when [`DrainingQueue::stop`] is called are dropped without being
/// delivered.
pub trait DrainingQueue<T>: Send + Sync {
    /// Enqueues `value` with `priority`.
    /// # Error
    /// Returns [`QueueError::Stopped`](crate::QueueError::Stopped) once the queue was stopped.
    fn try_push_item(&self, value: T, priority: u64) -> QueueResult<()>;

    /// Signals the consumer to terminate. Calls after the first one have no effect.
    fn stop(&self);

    fn is_stopped(&self) -> bool;

    /// Number of values accepted but not yet handed to the consumer.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues `value` with `priority`. Pushing to a stopped queue drops `value`.
    fn push_item(&self, value: T, priority: u64) {
        if self.try_push_item(value, priority).is_err() {
            log::debug!("push after stop, value dropped");
        }
    }

    /// Enqueues `value` with [`DEFAULT_PRIORITY`].
    fn push(&self, value: T) {
        self.push_item(value, DEFAULT_PRIORITY)
    }
}

/// Hands `value` to `callback`. A panic inside the callback is logged and swallowed so that the
/// consumer keeps running for the next item.
pub fn deliver<T>(callback: &mut Option<Callback<T>>, value: T) {
    let Some(callback) = callback.as_mut() else {
        return;
    };
    if panic::catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        log::error!("queue callback panicked, continuing with the next item");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use super::{Callback, deliver};

    #[test]
    fn deliver_without_callback_discards() {
        let mut callback: Option<Callback<u64>> = None;
        deliver(&mut callback, 1);
    }

    #[test]
    fn deliver_survives_panicking_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut callback: Option<Callback<u64>> = Some(Box::new(move |v| {
            counter.fetch_add(1, Ordering::SeqCst);
            if v == 0 {
                panic!("boom");
            }
        }));

        deliver(&mut callback, 0);
        deliver(&mut callback, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
