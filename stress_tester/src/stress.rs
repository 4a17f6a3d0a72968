use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use prio_queue::{Callback, DrainingQueue};
use rand::Rng;

use crate::{
    cfg::Cfg,
    stats::{Report, Sample, TestStats},
};

/// Creates the consumer callback: simulates `callback_work_us` of work and records the latency.
pub fn recording_callback(stats: &Arc<TestStats>, cfg: &Cfg) -> Callback<Sample> {
    let stats = Arc::clone(stats);
    let work = Duration::from_micros(cfg.callback_work_us);
    Box::new(move |sample| {
        if !work.is_zero() {
            thread::sleep(work);
        }
        stats.record_delivery(sample);
    })
}

/// Runs `cfg.producer_num` producer threads against `queue`, waits for the consumer to catch up
/// (or for the deadline), then stops the queue.
pub fn run_stress_test<Q>(queue: Arc<Q>, stats: Arc<TestStats>, cfg: &Cfg) -> Report
where
    Q: DrainingQueue<Sample> + 'static,
{
    log::info!(
        "Starting stress test with {} producers, {} items each",
        cfg.producer_num,
        cfg.item_num
    );
    let start_time = Instant::now();
    let deadline = start_time + Duration::from_secs(cfg.run_duration_seconds);

    // region:    --- Producer
    let mut producer_handles = vec![];
    for producer_id in 1..=cfg.producer_num {
        let queue = Arc::clone(&queue);
        let stats = Arc::clone(&stats);
        let cfg = cfg.clone();

        let handle = thread::spawn(move || {
            let mut rng = rand::rng();
            let delay = Duration::from_micros(cfg.producer_delay_us);
            let mut local_submitted = 0;

            while Instant::now() < deadline && local_submitted < cfg.item_num {
                let priority = rng.random_range(cfg.priority_min..=cfg.priority_max);

                // --> Push
                match queue.try_push_item(Sample::now(), priority) {
                    Ok(()) => {
                        stats.record_submission_success();
                        local_submitted += 1;
                    }
                    Err(e) => {
                        stats.record_submission_error();
                        log::warn!("Producer {producer_id} gave up: {e}");
                        break;
                    }
                }

                if !delay.is_zero() {
                    thread::sleep(delay);
                }
            }
            log::info!("Producer {producer_id:02} completed, pushed {local_submitted} items");
        });
        producer_handles.push(handle);
    }
    // endregion: --- Producer

    for handle in producer_handles {
        if handle.join().is_err() {
            log::error!("Producer thread panicked");
        }
    }

    log::info!("Waiting for the consumer to drain the queue");
    while Instant::now() < deadline && stats.delivered() < stats.submitted() {
        thread::sleep(Duration::from_millis(1));
    }
    let test_duration = start_time.elapsed();

    queue.stop();
    stats.report(test_duration, &cfg.latency_percentiles)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clap::Parser;
    use sync::CondvarQueue;

    use super::{recording_callback, run_stress_test};
    use crate::{cfg::Cfg, stats::TestStats};

    #[test]
    fn short_run_delivers_everything() {
        let cfg = Cfg::try_parse_from([
            "stress_tester",
            "condvar",
            "--producer-num",
            "2",
            "--item-num",
            "200",
            "--run-duration-seconds",
            "10",
        ])
        .unwrap();
        let stats = Arc::new(TestStats::new().unwrap());
        let queue = CondvarQueue::start(
            prio_queue::Cfg::with_order(cfg.order),
            Some(recording_callback(&stats, &cfg)),
        )
        .unwrap();

        run_stress_test(Arc::new(queue), Arc::clone(&stats), &cfg);
        assert_eq!(stats.submitted(), 400);
        assert_eq!(stats.delivered(), 400);
    }
}
