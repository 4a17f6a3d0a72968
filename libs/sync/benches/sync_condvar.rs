use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use prio_queue::{DrainingQueue, Order};
use sync::CondvarQueue;

fn push_deliver(c: &mut Criterion) {
    let (tx, rx) = crossbeam::channel::unbounded();
    let queue = CondvarQueue::new(
        Some(Box::new(move |v: u64| {
            let _ = tx.send(v);
        })),
        Order::Descending,
    )
    .expect("consumer thread starts");

    c.bench_function("sync_condvar push_deliver", |b| {
        b.iter(|| {
            queue.push_item(black_box(100), black_box(100));
            let delivered = rx.recv_timeout(Duration::from_secs(1));
            assert_eq!(delivered, Ok(100));
        })
    });
    queue.stop();
}

fn push_high_priority_on_large_queue(c: &mut Criterion) {
    let (release_tx, release_rx) = crossbeam::channel::bounded::<()>(1);
    let queue = CondvarQueue::new(
        Some(Box::new(move |_: u64| {
            // -- Park the consumer so the heap keeps growing
            let _ = release_rx.recv();
        })),
        Order::Descending,
    )
    .expect("consumer thread starts");

    // -- Prepare large queue
    let mut priority = 0;
    for _ in 0..50_000 {
        queue.push_item(black_box(priority), priority);
        priority += 1;
    }
    c.bench_function("sync_condvar push_high_priority_on_large_queue", |b| {
        b.iter(|| {
            queue.push_item(black_box(priority), black_box(priority));
            priority += 1;
        });
    });

    queue.stop();
    drop(release_tx);
}

criterion_group!(benches, push_deliver, push_high_priority_on_large_queue);
criterion_main!(benches);
