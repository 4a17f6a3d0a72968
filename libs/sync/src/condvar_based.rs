use std::{
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};

use anyhow::Context;
use prio_queue::{
    Callback, Cfg, DrainingQueue, IndexedHeap, Item, Order, QueueError, QueueResult, deliver,
};

use crate::startup::StartupLatch;

struct State<T> {
    heap: IndexedHeap<T>,
    stopped: bool,
    /// True while the consumer runs the callback for a popped item.
    in_flight: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signaled on every push and on stop.
    available: Condvar,
    /// Signaled whenever the consumer runs out of work.
    idle: Condvar,
}

impl<T> Shared<T> {
    /// The callback never runs under this lock, so a poisoned lock still guards a valid heap.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Priority queue guarded by a mutex, drained by a dedicated consumer thread that parks on a
/// condition variable while the queue is empty.
///
/// Values are handed to the callback one at a time and without holding the lock, so the callback
/// may push into the same queue.
pub struct CondvarQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> CondvarQueue<T> {
    pub fn new(callback: Option<Callback<T>>, order: Order) -> anyhow::Result<Self> {
        Self::start(Cfg::with_order(order), callback)
    }

    /// Creates the queue and spawns its consumer thread. Returns once the consumer is running.
    pub fn start(cfg: Cfg, callback: Option<Callback<T>>) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                heap: IndexedHeap::with_capacity(cfg.order, cfg.capacity),
                stopped: false,
                in_flight: false,
            }),
            available: Condvar::new(),
            idle: Condvar::new(),
        });

        let latch = StartupLatch::default();
        let consumer_latch = latch.clone();
        let consumer_shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || Self::run(consumer_shared, callback, consumer_latch))
            .context("could not spawn queue consumer thread")?;
        latch.wait()?;

        log::debug!("{} started with order {}", cfg.thread_name, cfg.order);
        Ok(Self { shared })
    }

    fn run(shared: Arc<Shared<T>>, mut callback: Option<Callback<T>>, latch: StartupLatch) {
        if let Err(e) = latch.notify_started() {
            log::error!("Queue consumer could not report its start: {e}");
            return;
        }

        while let Some(item) = Self::next_item(&shared) {
            log::trace!("delivering item with priority {}", item.priority());
            deliver(&mut callback, item.into_value());

            let mut state = shared.lock();
            state.in_flight = false;
            if state.heap.is_empty() {
                shared.idle.notify_all();
            }
        }

        log::debug!("queue consumer terminated");
    }

    /// Blocks until an item is available. Returns `None` once the queue was stopped.
    fn next_item(shared: &Shared<T>) -> Option<Item<T>> {
        let mut state = shared.lock();
        while state.heap.is_empty() && !state.stopped {
            state = shared
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.stopped {
            return None;
        }

        let item = state.heap.pop()?;
        state.in_flight = true;
        Some(item)
    }

    /// Blocks until the queue is empty and no callback is running, or `timeout` elapses.
    /// Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (_state, result) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| !s.heap.is_empty() || s.in_flight)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn order(&self) -> Order {
        self.shared.lock().heap.order()
    }
}

impl<T: Send + 'static> DrainingQueue<T> for CondvarQueue<T> {
    fn try_push_item(&self, value: T, priority: u64) -> QueueResult<()> {
        let mut state = self.shared.lock();
        if state.stopped {
            return Err(QueueError::Stopped);
        }
        state.heap.push(value, priority);
        self.shared.available.notify_one();
        Ok(())
    }

    fn stop(&self) {
        if let Some(discarded) = self.shutdown() {
            log::debug!("queue stopped, {discarded} undelivered items discarded");
        }
    }

    fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    fn len(&self) -> usize {
        self.shared.lock().heap.len()
    }
}

impl<T> CondvarQueue<T> {
    /// Marks the queue as stopped and wakes every waiter. Returns the number of discarded items,
    /// or `None` if the queue had already been stopped.
    fn shutdown(&self) -> Option<usize> {
        let discarded = {
            let mut state = self.shared.lock();
            if state.stopped {
                return None;
            }
            state.stopped = true;
            state.heap.take_all()
        };
        self.shared.available.notify_all();
        self.shared.idle.notify_all();
        Some(discarded.len())
    }
}

impl<T> Drop for CondvarQueue<T> {
    fn drop(&mut self) {
        // Signal only: the last handle may be dropped on the consumer thread itself.
        self.shutdown();
    }
}
