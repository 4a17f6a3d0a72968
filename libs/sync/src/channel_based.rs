use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::Context;
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use prio_queue::{
    Callback, Cfg, DrainingQueue, IndexedHeap, Order, QueueError, QueueResult, deliver,
};

use crate::startup::StartupLatch;

/// State owned exclusively by the consumer thread. Producers never touch the heap, they hand
/// their items over through `submitter_sink`.
struct Storage<T> {
    heap: IndexedHeap<T>,

    submitter_sink: Receiver<(T, u64)>,
    /// Never receives a message. Disconnects once the queue is stopped.
    stop_sink: Receiver<()>,

    callback: Option<Callback<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> Storage<T> {
    /// This functions blocks the thread it is running on until the queue is stopped.
    fn run(mut self, latch: StartupLatch) {
        if let Err(e) = latch.notify_started() {
            log::error!("Queue consumer could not report its start: {e}");
            return;
        }

        while self.wait_for_item() {
            self.absorb_submitted();
            if self.stop_requested() {
                break;
            }

            let Some(item) = self.heap.pop() else {
                continue;
            };
            self.pending.fetch_sub(1, Ordering::SeqCst);
            log::trace!("delivering item with priority {}", item.priority());
            deliver(&mut self.callback, item.into_value());
        }

        log::debug!(
            "queue consumer terminated, {} undelivered items discarded",
            self.heap.len() + self.submitter_sink.len()
        );
    }

    /// Blocks while the heap is empty. Returns false once the queue is stopped.
    fn wait_for_item(&mut self) -> bool {
        if self.stop_requested() {
            return false;
        }
        if !self.heap.is_empty() {
            return true;
        }

        crossbeam::select! {
            recv(self.submitter_sink) -> msg => match msg {
                Ok((value, priority)) => {
                    self.heap.push(value, priority);
                    true
                }
                Err(_) => false,
            },
            recv(self.stop_sink) -> _ => false,
        }
    }

    /// Moves everything that was submitted so far into the heap, so the next pop competes against
    /// all items that have arrived.
    fn absorb_submitted(&mut self) {
        while let Ok((value, priority)) = self.submitter_sink.try_recv() {
            self.heap.push(value, priority);
        }
    }

    fn stop_requested(&self) -> bool {
        matches!(self.stop_sink.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Priority queue whose heap lives on the consumer thread. Producers pass items over a crossbeam
/// channel; the consumer blocks in `select!` on the item and stop channels while it has nothing
/// to deliver.
///
/// Dropping the handle disconnects both channels, which also terminates the consumer.
pub struct ChanneledQueue<T> {
    item_source: Sender<(T, u64)>,
    stop_source: Mutex<Option<Sender<()>>>,
    stopped: AtomicBool,
    /// Items accepted but not yet popped by the consumer.
    pending: Arc<AtomicUsize>,
}

impl<T: Send + 'static> ChanneledQueue<T> {
    pub fn new(callback: Option<Callback<T>>, order: Order) -> anyhow::Result<Self> {
        Self::start(Cfg::with_order(order), callback)
    }

    /// Creates the queue and spawns its consumer thread. Returns once the consumer is running.
    pub fn start(cfg: Cfg, callback: Option<Callback<T>>) -> anyhow::Result<Self> {
        let (item_source, submitter_sink) = crossbeam::channel::unbounded();
        let (stop_source, stop_sink) = crossbeam::channel::bounded(0);
        let pending = Arc::new(AtomicUsize::new(0));

        let storage = Storage {
            heap: IndexedHeap::with_capacity(cfg.order, cfg.capacity),
            submitter_sink,
            stop_sink,
            callback,
            pending: Arc::clone(&pending),
        };

        let latch = StartupLatch::default();
        let spun_up_notifier = latch.clone();
        std::thread::Builder::new()
            .name(cfg.thread_name.clone())
            .spawn(move || storage.run(spun_up_notifier))
            .context("could not spawn queue consumer thread")?;
        // Wait for the consumer to start up.
        latch.wait()?;

        log::debug!("{} started with order {}", cfg.thread_name, cfg.order);
        Ok(Self {
            item_source,
            stop_source: Mutex::new(Some(stop_source)),
            stopped: AtomicBool::new(false),
            pending,
        })
    }
}

impl<T: Send + 'static> DrainingQueue<T> for ChanneledQueue<T> {
    fn try_push_item(&self, value: T, priority: u64) -> QueueResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.item_source.send((value, priority)).is_err() {
            // The consumer has already gone away.
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Stopped);
        }
        Ok(())
    }

    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender disconnects the stop channel and wakes the consumer.
        let stop_source = self
            .stop_source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(stop_source);
        log::debug!(
            "queue stopped, {} undelivered items discarded",
            self.pending.swap(0, Ordering::SeqCst)
        );
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        if self.is_stopped() {
            return 0;
        }
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crossbeam::channel::RecvTimeoutError;
    use prio_queue::{DrainingQueue, Order};

    use super::ChanneledQueue;

    #[test]
    fn len_counts_items_waiting_in_channel() {
        let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
        let queue = ChanneledQueue::new(
            Some(Box::new(move |_: u64| {
                let _ = release_rx.recv();
            })),
            Order::Ascending,
        )
        .unwrap();

        for i in 0..4 {
            queue.push_item(i, i);
        }
        // At most one item can be held by the blocked callback.
        assert!(queue.len() >= 3);

        queue.stop();
        assert_eq!(queue.len(), 0);
        drop(release_tx);
    }

    #[test]
    fn drop_stops_consumer() {
        let (tx, rx) = crossbeam::channel::unbounded::<u64>();
        let queue = ChanneledQueue::new(
            Some(Box::new(move |v: u64| {
                let _ = tx.send(v);
            })),
            Order::Descending,
        )
        .unwrap();
        drop(queue);

        assert!(matches!(
            rx.recv_timeout(Duration::from_secs(5)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
