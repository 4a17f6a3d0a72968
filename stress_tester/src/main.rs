use std::sync::Arc;

use async_impl::FnHandler;
use cfg::{Cfg, Implementation};
use clap::Parser;
use stats::{Report, Sample, TestStats};
use stress::{recording_callback, run_stress_test};
use sync::{ChanneledQueue, CondvarQueue};

pub mod cfg;
mod logging;
mod stats;
mod stress;

fn main() {
    let cfg = Cfg::parse();
    let _logger = match logging::init(&cfg.log_level) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Error! Could not initialize logging: {e:?}");
            None
        }
    };
    log::info!("Running configuration:\n{cfg:#?}");

    let res = cfg.validate().and_then(|()| match cfg.implementation {
        Implementation::Condvar => run_condvar(&cfg),
        Implementation::Channels => run_channels(&cfg),
        Implementation::Async => run_async(&cfg),
    });
    match res {
        Ok(report) => report.print_summary(),
        Err(e) => log::error!("Stress test failed: {e:?}"),
    }
}

fn queue_cfg(cfg: &Cfg) -> anyhow::Result<prio_queue::Cfg> {
    Ok(prio_queue::Cfg {
        order: cfg.order,
        capacity: cfg.capacity()?,
        thread_name: format!("{}-consumer", cfg.implementation).to_lowercase(),
    })
}

fn run_condvar(cfg: &Cfg) -> anyhow::Result<Report> {
    let stats = Arc::new(TestStats::new()?);
    let queue = CondvarQueue::start(queue_cfg(cfg)?, Some(recording_callback(&stats, cfg)))?;
    Ok(run_stress_test(Arc::new(queue), stats, cfg))
}

fn run_channels(cfg: &Cfg) -> anyhow::Result<Report> {
    let stats = Arc::new(TestStats::new()?);
    let queue = ChanneledQueue::start(queue_cfg(cfg)?, Some(recording_callback(&stats, cfg)))?;
    Ok(run_stress_test(Arc::new(queue), stats, cfg))
}

fn run_async(cfg: &Cfg) -> anyhow::Result<Report> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()?;
    let stats = Arc::new(TestStats::new()?);

    let handler_stats = Arc::clone(&stats);
    let work = std::time::Duration::from_micros(cfg.callback_work_us);
    let handler = FnHandler(move |sample: Sample| {
        let stats = Arc::clone(&handler_stats);
        async move {
            if !work.is_zero() {
                tokio::time::sleep(work).await;
            }
            stats.record_delivery(sample);
        }
    });

    let queue = runtime.block_on(async_impl::Queue::start(queue_cfg(cfg)?, handler))?;
    Ok(run_stress_test(Arc::new(queue), stats, cfg))
}
