use anyhow::bail;
use prio_queue::Order;

#[derive(Debug, Clone, clap::Parser)]
pub struct Cfg {
    /// The queue implementation to test.
    pub implementation: Implementation,
    /// Number of producers that push items concurrently.
    #[arg(short, long, default_value_t = 4)]
    pub producer_num: usize,
    /// Number of items each producer pushes during the test.
    #[arg(short = 'n', long, default_value_t = 10_000)]
    pub item_num: usize,
    /// Delivery order of the queue (`asc` or `desc`).
    #[arg(short, long, default_value_t = Order::Descending)]
    pub order: Order,
    /// Lowest priority a producer picks.
    #[arg(long, default_value_t = 0)]
    pub priority_min: u64,
    /// Highest priority a producer picks.
    #[arg(long, default_value_t = 1_000)]
    pub priority_max: u64,
    /// Pause between two pushes of the same producer.
    #[arg(long, default_value_t = 0)]
    pub producer_delay_us: u64,
    /// Simulated work inside the consumer callback, per item.
    #[arg(long, default_value_t = 0)]
    pub callback_work_us: u64,
    // Hard cap on the test's execution time
    #[arg(long, default_value_t = 10)]
    pub run_duration_seconds: u64,
    /// Percentiles of the push-to-delivery latency to report.
    #[arg(long, value_delimiter = ',', default_values_t = [50.0, 90.0, 99.0, 99.9])]
    pub latency_percentiles: Vec<f64>,
    /// Log level specification, e.g. `info` or `debug,sync=trace`.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cfg {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.priority_min > self.priority_max {
            bail!(
                "priority range is empty: {} > {}",
                self.priority_min,
                self.priority_max
            );
        }
        if self.producer_num == 0 {
            bail!("at least one producer is required");
        }
        if let Some(p) = self
            .latency_percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            bail!("percentile {p} is outside of 0..=100");
        }
        Ok(())
    }

    /// Capacity the queue needs to hold every item of the test at once.
    pub fn capacity(&self) -> anyhow::Result<usize> {
        self.item_num
            .checked_mul(self.producer_num)
            .ok_or_else(|| anyhow::anyhow!("Overflow while calculating queue capacity"))
    }
}

#[derive(Debug, Clone, Copy, strum::EnumString, strum::Display, clap::ValueEnum)]
pub enum Implementation {
    /// Mutex and condition variable, dedicated consumer thread.
    #[strum(ascii_case_insensitive)]
    Condvar,
    /// Crossbeam channels, heap owned by the consumer thread.
    #[strum(ascii_case_insensitive)]
    Channels,
    /// Tokio task woken through `Notify`.
    #[strum(ascii_case_insensitive)]
    Async,
}
