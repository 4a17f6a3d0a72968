use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use prio_queue::{DrainingQueue, Order};
use sync::ChanneledQueue;

fn push_deliver(c: &mut Criterion) {
    let (tx, rx) = crossbeam::channel::unbounded();
    let queue = ChanneledQueue::new(
        Some(Box::new(move |v: u64| {
            let _ = tx.send(v);
        })),
        Order::Descending,
    )
    .expect("consumer thread starts");

    c.bench_function("sync_channels push_deliver", |b| {
        b.iter(|| {
            queue.push_item(black_box(1), black_box(1));
            let delivered = rx.recv_timeout(Duration::from_secs(1));
            assert_eq!(delivered, Ok(1));
        })
    });
    queue.stop();
}

fn push_only_no_callback(c: &mut Criterion) {
    let queue = ChanneledQueue::<u64>::new(None, Order::Ascending).expect("consumer thread starts");

    let mut priority = 0;
    c.bench_function("sync_channels push_only_no_callback", |b| {
        b.iter(|| {
            queue.push_item(black_box(priority), black_box(priority));
            priority += 1;
        });
    });
    queue.stop();
}

criterion_group!(benches, push_deliver, push_only_no_callback);
criterion_main!(benches);
