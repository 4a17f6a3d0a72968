use std::{
    panic::AssertUnwindSafe,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use anyhow::Context;
use futures::FutureExt;
use prio_queue::{Callback, Cfg, DrainingQueue, IndexedHeap, Item, QueueError, QueueResult};
use tokio::{
    sync::{Notify, oneshot},
    task::JoinHandle,
};

use crate::{CallbackHandler, Handler};

struct State<T> {
    heap: IndexedHeap<T>,
    stopped: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Holds at most one permit, so a push or stop issued while the consumer is busy is not lost.
    wakeup: Notify,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Priority queue drained by a tokio task.
///
/// Pushing and stopping are synchronous and can be called from any thread; the heap lock is never
/// held across an `.await`.
pub struct Queue<T> {
    shared: Arc<Shared<T>>,

    /// Handle to the consumer task. Taken by [`Queue::join`].
    runner_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> Queue<T> {
    /// Spawns the consumer task on the current runtime and returns once it is running.
    pub async fn start<H: Handler<T>>(cfg: Cfg, handler: H) -> anyhow::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                heap: IndexedHeap::with_capacity(cfg.order, cfg.capacity),
                stopped: false,
            }),
            wakeup: Notify::new(),
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        let runner_handle = tokio::spawn(Self::run(Arc::clone(&shared), handler, ready_tx));
        ready_rx
            .await
            .context("queue consumer task ended before it started")?;

        log::debug!("async queue started with order {}", cfg.order);
        Ok(Self {
            shared,
            runner_handle: Mutex::new(Some(runner_handle)),
        })
    }

    /// Starts the queue with a synchronous callback, see [`CallbackHandler`].
    pub async fn with_callback(cfg: Cfg, callback: Option<Callback<T>>) -> anyhow::Result<Self> {
        Self::start(cfg, CallbackHandler::new(callback)).await
    }

    async fn run<H: Handler<T>>(shared: Arc<Shared<T>>, handler: H, ready: oneshot::Sender<()>) {
        if ready.send(()).is_err() {
            log::debug!("queue was dropped during startup");
            return;
        }

        while let Some(item) = Self::next_item(&shared).await {
            log::trace!("delivering item with priority {}", item.priority());
            let delivery = AssertUnwindSafe(handler.handle(item.into_value())).catch_unwind();
            if delivery.await.is_err() {
                log::error!("queue handler panicked, continuing with the next item");
            }
        }

        log::debug!("async queue consumer terminated");
    }

    /// Waits until an item is available. Returns `None` once the queue was stopped.
    async fn next_item(shared: &Shared<T>) -> Option<Item<T>> {
        loop {
            {
                let mut state = shared.lock();
                if state.stopped {
                    return None;
                }
                if let Some(item) = state.heap.pop() {
                    return Some(item);
                }
            }
            shared.wakeup.notified().await;
        }
    }

    /// Waits for the consumer task to finish. Only the first call waits, later ones return
    /// immediately.
    /// # Note
    /// Must not be awaited from within the handler, the consumer would wait for itself.
    pub async fn join(&self) -> anyhow::Result<()> {
        let handle = self
            .runner_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.await.context("queue consumer task failed")?;
        }
        Ok(())
    }
}

impl<T> Queue<T> {
    /// Marks the queue as stopped and wakes the consumer. Returns the number of discarded items,
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
        self.shared.wakeup.notify_one();
        Some(discarded.len())
    }
}

impl<T: Send + 'static> DrainingQueue<T> for Queue<T> {
    fn try_push_item(&self, value: T, priority: u64) -> QueueResult<()> {
        {
            let mut state = self.shared.lock();
            if state.stopped {
                return Err(QueueError::Stopped);
            }
            state.heap.push(value, priority);
        }
        self.shared.wakeup.notify_one();
        Ok(())
    }

    fn stop(&self) {
        if let Some(discarded) = self.shutdown() {
            log::debug!("async queue stopped, {discarded} undelivered items discarded");
        }
    }

    fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    fn len(&self) -> usize {
        self.shared.lock().heap.len()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use prio_queue::{Cfg, DrainingQueue, Order};
    use tokio::sync::{Notify, mpsc};

    use crate::{Discard, FnHandler, Queue};

    const GATE: u64 = u64::MAX;

    /// Starts a descending queue whose handler forwards values and parks on the gate value
    /// until `release` is notified.
    async fn gated_queue(release: Arc<Notify>) -> (Queue<u64>, mpsc::UnboundedReceiver<u64>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = FnHandler(move |v: u64| {
            let tx = tx.clone();
            let release = Arc::clone(&release);
            async move {
                let _ = tx.send(v);
                if v == GATE {
                    release.notified().await;
                }
            }
        });
        let queue = Queue::start(Cfg::with_order(Order::Descending), handler)
            .await
            .unwrap();
        (queue, rx)
    }

    async fn recv(rx: &mut mpsc::UnboundedReceiver<u64>) -> Option<u64> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn async_handler_receives_descending_order() {
        let release = Arc::new(Notify::new());
        let (queue, mut rx) = gated_queue(Arc::clone(&release)).await;

        queue.push_item(GATE, 0);
        assert_eq!(recv(&mut rx).await, Some(GATE));
        for i in 0..10 {
            queue.push_item(i, i);
        }
        release.notify_one();

        let mut delivered = vec![];
        for _ in 0..10 {
            delivered.push(recv(&mut rx).await.unwrap());
        }
        assert_eq!(delivered, (0..10).rev().collect::<Vec<_>>());
        queue.stop();
        queue.join().await.unwrap();
    }

    #[tokio::test]
    async fn stop_while_handler_parked_discards_queued() {
        let release = Arc::new(Notify::new());
        let (queue, mut rx) = gated_queue(Arc::clone(&release)).await;

        queue.push_item(GATE, 0);
        assert_eq!(recv(&mut rx).await, Some(GATE));
        queue.push_item(1, 1);
        queue.push_item(2, 2);
        queue.stop();
        assert!(queue.is_empty());
        release.notify_one();

        tokio::time::timeout(Duration::from_secs(5), queue.join())
            .await
            .expect("consumer terminates")
            .unwrap();
        // The handler was dropped together with the task, so the channel is closed and empty.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn join_returns_after_stop_on_idle_queue() {
        let queue: Queue<u64> = Queue::start(Cfg::default(), Discard).await.unwrap();
        queue.stop();
        tokio::time::timeout(Duration::from_secs(5), queue.join())
            .await
            .expect("consumer terminates")
            .unwrap();
        // Joining twice is fine.
        queue.join().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn push_from_plain_threads() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = Arc::new(
            Queue::start(
                Cfg::default(),
                FnHandler(move |v: u64| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(v);
                    }
                }),
            )
            .await
            .unwrap(),
        );

        let producers: Vec<_> = (0..4u64)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        queue.push_item(p * 100 + i, i);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut delivered = vec![];
        for _ in 0..400 {
            delivered.push(recv(&mut rx).await.unwrap());
        }
        delivered.sort_unstable();
        assert_eq!(delivered, (0..400).collect::<Vec<_>>());
        queue.stop();
    }

    #[tokio::test]
    async fn handler_panic_keeps_consumer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let queue = Queue::start(
            Cfg::default(),
            FnHandler(move |v: u64| {
                let tx = tx.clone();
                async move {
                    if v == 0 {
                        panic!("handler failure");
                    }
                    let _ = tx.send(v);
                }
            }),
        )
        .await
        .unwrap();

        queue.push(0);
        queue.push(1);
        assert_eq!(recv(&mut rx).await, Some(1));
        queue.stop();
    }
}
