//! Conformance tests shared by every [`DrainingQueue`] implementation.
//!
//! An implementation crate provides a [`Tester`] and instantiates the tests with
//! [`conformance_tests!`](crate::conformance_tests).

use std::{
    sync::{Arc, OnceLock, Weak},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::{Callback, Cfg, DrainingQueue, Order, QueueError};

/// Upper bound for any single wait inside the suite.
const TIMEOUT: Duration = Duration::from_secs(5);

/// Value reserved for blocking the consumer, see [`Gate`].
pub const GATE: u64 = u64::MAX;

pub trait Tester<Q>
where
    Q: DrainingQueue<u64> + 'static,
{
    fn create_queue(&self, cfg: Cfg, callback: Option<Callback<u64>>) -> Q;
}

// region:    --- Helpers

/// Holds the consumer inside the callback, so items can pile up in the queue deterministically.
pub struct Gate {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl Gate {
    /// Pushes the gate value and waits until the consumer is parked inside the callback.
    pub fn close<Q: DrainingQueue<u64>>(&self, queue: &Q) {
        queue.push(GATE);
        self.entered
            .recv_timeout(TIMEOUT)
            .expect("consumer should pick up the gate");
    }

    pub fn open(&self) {
        self.release.send(()).expect("consumer waits on the gate");
    }
}

/// Creates a callback that forwards every delivered value, plus a [`Gate`] to stall it.
pub fn gated_recorder() -> (Callback<u64>, Receiver<u64>, Gate) {
    let (tx, rx) = channel::unbounded();
    let (entered_tx, entered_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded::<()>(1);

    let callback: Callback<u64> = Box::new(move |value| {
        if value == GATE {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            return;
        }
        let _ = tx.send(value);
    });

    let gate = Gate {
        entered: entered_rx,
        release: release_tx,
    };
    (callback, rx, gate)
}

fn collect(rx: &Receiver<u64>, n: usize) -> Vec<u64> {
    (0..n)
        .map(|i| {
            rx.recv_timeout(TIMEOUT)
                .unwrap_or_else(|e| panic!("expected value {i} of {n}: {e}"))
        })
        .collect()
}

/// Waits until the consumer dropped its callback, i.e. the consumption loop terminated.
fn await_consumer_exit(rx: &Receiver<u64>) -> Vec<u64> {
    let deadline = Instant::now() + TIMEOUT;
    let mut late = vec![];
    loop {
        match rx.recv_deadline(deadline) {
            Ok(value) => late.push(value),
            Err(RecvTimeoutError::Disconnected) => return late,
            Err(RecvTimeoutError::Timeout) => panic!("consumer did not terminate after stop"),
        }
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

// endregion: --- Helpers

/// Expands to a module named `$module` with one `#[test]` per conformance test, each run against
/// a fresh `$tester`. The tester type must be in scope of the calling module.
#[macro_export]
macro_rules! conformance_tests {
    ($module:ident, $tester:expr) => {
        mod $module {
            use super::*;

            #[test]
            fn descending_order() {
                $crate::suite::test_descending_order($tester);
            }

            #[test]
            fn ascending_order() {
                $crate::suite::test_ascending_order($tester);
            }

            #[test]
            fn two_producers_ascending() {
                $crate::suite::test_two_producers_ascending($tester);
            }

            #[test]
            fn default_priority_is_zero() {
                $crate::suite::test_default_priority_is_zero($tester);
            }

            #[test]
            fn concurrent_producers_no_loss() {
                $crate::suite::test_concurrent_producers_no_loss($tester);
            }

            #[test]
            fn stop_discards_queued() {
                $crate::suite::test_stop_discards_queued($tester);
            }

            #[test]
            fn stop_unblocks_idle_consumer() {
                $crate::suite::test_stop_unblocks_idle_consumer($tester);
            }

            #[test]
            fn push_then_immediate_stop() {
                $crate::suite::test_push_then_immediate_stop($tester);
            }

            #[test]
            fn push_after_stop_is_rejected() {
                $crate::suite::test_push_after_stop_is_rejected($tester);
            }

            #[test]
            fn stop_is_idempotent() {
                $crate::suite::test_stop_is_idempotent($tester);
            }

            #[test]
            fn reentrant_push_from_callback() {
                $crate::suite::test_reentrant_push_from_callback($tester);
            }

            #[test]
            fn independent_instances() {
                $crate::suite::test_independent_instances($tester);
            }

            #[test]
            fn no_callback_discards() {
                $crate::suite::test_no_callback_discards($tester);
            }

            #[test]
            fn callback_panic_keeps_consumer() {
                $crate::suite::test_callback_panic_keeps_consumer($tester);
            }
        }
    };
}

/// Values 0..9 pushed with priority = value come out as 9, 8, ... 0.
pub fn test_descending_order<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (callback, rx, gate) = gated_recorder();
    let queue = tester.create_queue(Cfg::with_order(Order::Descending), Some(callback));

    gate.close(&queue);
    for i in 0..10 {
        queue.push_item(i, i);
    }
    assert_eq!(queue.len(), 10);
    gate.open();

    assert_eq!(collect(&rx, 10), (0..10).rev().collect::<Vec<_>>());
    queue.stop();
}

pub fn test_ascending_order<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (callback, rx, gate) = gated_recorder();
    let queue = tester.create_queue(Cfg::with_order(Order::Ascending), Some(callback));

    gate.close(&queue);
    for p in [5, 3, 8, 0, 9, 1, 7, 2, 6, 4] {
        queue.push_item(p, p);
    }
    gate.open();

    assert_eq!(collect(&rx, 10), (0..10).collect::<Vec<_>>());
    queue.stop();
}

/// Two producers insert priorities 0..9 with a delay in between. All 20 values are delivered,
/// in non-decreasing order.
pub fn test_two_producers_ascending<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (callback, rx, gate) = gated_recorder();
    let queue = Arc::new(tester.create_queue(Cfg::with_order(Order::Ascending), Some(callback)));

    gate.close(queue.as_ref());
    let producers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..10 {
                    queue.push_item(i, i);
                    thread::sleep(Duration::from_millis(2));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread panicked");
    }
    gate.open();

    let delivered = collect(&rx, 20);
    assert!(delivered.windows(2).all(|w| w[0] <= w[1]), "{delivered:?}");
    let expected: Vec<u64> = (0..10).flat_map(|i| [i, i]).collect();
    assert_eq!(delivered, expected);
    queue.stop();
}

/// Omitting the priority is the same as pushing with priority 0.
pub fn test_default_priority_is_zero<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (callback, rx, gate) = gated_recorder();
    let queue = tester.create_queue(Cfg::with_order(Order::Descending), Some(callback));

    gate.close(&queue);
    queue.push(10);
    queue.push_item(11, 1);
    queue.push_item(12, 0);
    gate.open();

    // 11 outranks both, 10 and 12 share priority 0 and keep their insertion order.
    assert_eq!(collect(&rx, 3), vec![11, 10, 12]);
    queue.stop();
}

/// Many producers hammering the queue: every value is delivered exactly once.
pub fn test_concurrent_producers_no_loss<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    const PRODUCERS: u64 = 8;
    const PER_PRODUCER: u64 = 250;

    let (tx, rx) = channel::unbounded();
    let callback: Callback<u64> = Box::new(move |v| {
        let _ = tx.send(v);
    });
    let queue = Arc::new(tester.create_queue(Cfg::with_order(Order::Descending), Some(callback)));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let value = p * PER_PRODUCER + i;
                    queue.push_item(value, value % 17);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().expect("producer thread panicked");
    }

    let mut delivered = collect(&rx, (PRODUCERS * PER_PRODUCER) as usize);
    delivered.sort_unstable();
    assert_eq!(delivered, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
    assert!(wait_until(|| queue.is_empty()));

    queue.stop();
    assert!(await_consumer_exit(&rx).is_empty(), "duplicate delivery");
}

/// Items still queued at stop are never handed to the callback.
pub fn test_stop_discards_queued<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (callback, rx, gate) = gated_recorder();
    let queue = tester.create_queue(Cfg::with_order(Order::Ascending), Some(callback));

    queue.push_item(1, 1);
    assert_eq!(collect(&rx, 1), vec![1]);

    gate.close(&queue);
    for i in 2..7 {
        queue.push_item(i, i);
    }
    queue.stop();
    gate.open();

    assert!(await_consumer_exit(&rx).is_empty());
    assert!(queue.is_stopped());
}

/// A consumer blocked on an empty queue observes stop and terminates.
pub fn test_stop_unblocks_idle_consumer<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx, rx) = channel::unbounded();
    let callback: Callback<u64> = Box::new(move |v| {
        let _ = tx.send(v);
    });
    let queue = tester.create_queue(Cfg::default(), Some(callback));

    // Give the consumer time to park on the empty queue.
    thread::sleep(Duration::from_millis(20));
    queue.stop();
    assert!(await_consumer_exit(&rx).is_empty());
}

/// Stop right after a push races with the consumer. The item is delivered at most once and the
/// consumer terminates either way.
pub fn test_push_then_immediate_stop<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx, rx) = channel::unbounded();
    let callback: Callback<u64> = Box::new(move |v| {
        let _ = tx.send(v);
    });
    let queue = tester.create_queue(Cfg::default(), Some(callback));

    queue.push(42);
    queue.stop();

    let delivered = await_consumer_exit(&rx);
    assert!(delivered.is_empty() || delivered == vec![42], "{delivered:?}");
}

pub fn test_push_after_stop_is_rejected<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx, rx) = channel::unbounded();
    let callback: Callback<u64> = Box::new(move |v| {
        let _ = tx.send(v);
    });
    let queue = tester.create_queue(Cfg::default(), Some(callback));
    queue.stop();

    assert_eq!(queue.try_push_item(1, 1), Err(QueueError::Stopped));
    queue.push(2);
    assert!(queue.is_empty());
    assert!(await_consumer_exit(&rx).is_empty());
}

pub fn test_stop_is_idempotent<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let queue = tester.create_queue(Cfg::default(), None);
    assert!(!queue.is_stopped());
    queue.stop();
    queue.stop();
    assert!(queue.is_stopped());
}

/// The callback may push into its own queue without deadlocking.
pub fn test_reentrant_push_from_callback<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx, rx) = channel::unbounded();
    let handle: Arc<OnceLock<Weak<Q>>> = Arc::new(OnceLock::new());
    let callback_handle = Arc::clone(&handle);

    let callback: Callback<u64> = Box::new(move |v| {
        if v < 5 {
            if let Some(queue) = callback_handle.get().and_then(Weak::upgrade) {
                queue.push_item(v + 1, v + 1);
            }
        }
        let _ = tx.send(v);
    });
    let queue = Arc::new(tester.create_queue(Cfg::default(), Some(callback)));
    handle
        .set(Arc::downgrade(&queue))
        .unwrap_or_else(|_| panic!("handle is set once"));

    queue.push(0);
    assert_eq!(collect(&rx, 6), vec![0, 1, 2, 3, 4, 5]);
    queue.stop();
}

/// Two queues side by side do not see each other's items.
pub fn test_independent_instances<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx_a, rx_a) = channel::unbounded();
    let (tx_b, rx_b) = channel::unbounded();
    let a = tester.create_queue(
        Cfg::default(),
        Some(Box::new(move |v: u64| {
            let _ = tx_a.send(v);
        })),
    );
    let b = tester.create_queue(
        Cfg::default(),
        Some(Box::new(move |v: u64| {
            let _ = tx_b.send(v);
        })),
    );

    a.push_item(1, 1);
    b.push_item(2, 2);
    a.stop();
    assert_eq!(collect(&rx_b, 1), vec![2]);

    b.push_item(3, 3);
    assert_eq!(collect(&rx_b, 1), vec![3]);
    b.stop();

    let from_a = await_consumer_exit(&rx_a);
    assert!(from_a.is_empty() || from_a == vec![1]);
    assert!(await_consumer_exit(&rx_b).is_empty());
}

/// Without a callback, popped values are discarded but still leave the queue.
pub fn test_no_callback_discards<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let queue = tester.create_queue(Cfg::default(), None);
    for i in 0..100 {
        queue.push_item(i, i);
    }
    assert!(wait_until(|| queue.is_empty()));
    queue.stop();
}

/// A panicking callback does not take the consumer down.
pub fn test_callback_panic_keeps_consumer<Q: DrainingQueue<u64> + 'static>(tester: impl Tester<Q>) {
    let (tx, rx) = channel::unbounded();
    let callback: Callback<u64> = Box::new(move |v| {
        if v == 0 {
            panic!("callback failure");
        }
        let _ = tx.send(v);
    });
    let queue = tester.create_queue(Cfg::default(), Some(callback));

    queue.push(0);
    queue.push(1);
    assert_eq!(collect(&rx, 1), vec![1]);
    queue.stop();
}
