use std::{
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use hdrhistogram::Histogram;
use num_format::{Format, Locale, SystemLocale, ToFormattedString};

/// Value pushed through the queue under test.
#[derive(Debug)]
pub struct Sample {
    pub enqueued_at: Instant,
}

impl Sample {
    pub fn now() -> Self {
        Self {
            enqueued_at: Instant::now(),
        }
    }
}

pub struct TestStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    submit_errors: AtomicU64,
    // Push-to-delivery latencies in microseconds
    latency_hist: Mutex<Histogram<u64>>,
}

impl TestStats {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            submitted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            submit_errors: AtomicU64::new(0),
            latency_hist: Mutex::new(
                Histogram::new_with_max(60_000_000, 3).context("could not create histogram")?,
            ),
        })
    }

    pub fn record_submission_success(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_error(&self) {
        self.submit_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self, sample: Sample) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        let latency_us: u64 = sample
            .enqueued_at
            .elapsed()
            .as_micros()
            .try_into()
            .unwrap_or(u64::MAX);
        if let Ok(mut hist) = self.latency_hist.lock() {
            let lat = latency_us.min(hist.high());
            // Clamped to the histogram's range above, recording cannot fail.
            let _ = hist.record(lat);
        }
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn report(&self, test_duration: Duration, percentiles: &[f64]) -> Report {
        let (mean_us, max_us, latency_percentiles) = match self.latency_hist.lock() {
            Ok(hist) if !hist.is_empty() => (
                hist.mean(),
                hist.max(),
                percentiles
                    .iter()
                    .map(|&p| (p, hist.value_at_quantile(p / 100.0)))
                    .collect(),
            ),
            _ => (0.0, 0, vec![]),
        };

        let submitted = self.submitted();
        let delivered = self.delivered();
        Report {
            test_duration,
            submitted,
            delivered,
            undelivered: submitted.saturating_sub(delivered),
            submit_errors: self.submit_errors.load(Ordering::Relaxed),
            mean_us,
            max_us,
            latency_percentiles,
        }
    }
}

#[derive(Debug)]
pub struct Report {
    test_duration: Duration,
    submitted: u64,
    delivered: u64,
    /// Items still queued when the queue was stopped.
    undelivered: u64,
    submit_errors: u64,
    mean_us: f64,
    max_us: u64,
    latency_percentiles: Vec<(f64, u64)>,
}

impl Report {
    pub fn print_summary(&self) {
        match SystemLocale::default() {
            Ok(locale) => self.print_with(&locale),
            Err(_) => self.print_with(&Locale::en),
        }
    }

    fn print_with<F: Format>(&self, locale: &F) {
        let secs = self.test_duration.as_secs_f64().max(f64::EPSILON);

        println!("\n{:=^75}", " Stress Test Results ");
        println!("Test duration: {:?}", self.test_duration);
        println!(
            "Submitted: {} items ({:.2} items/sec)",
            self.submitted.to_formatted_string(locale),
            self.submitted as f64 / secs
        );
        println!(
            "Delivered: {} items ({:.2} items/sec)",
            self.delivered.to_formatted_string(locale),
            self.delivered as f64 / secs
        );
        println!(
            "Discarded at stop: {}",
            self.undelivered.to_formatted_string(locale)
        );
        println!("Submit errors: {}", self.submit_errors);
        println!(
            "Latency: avg {} μs, max {} μs.",
            (self.mean_us as u64).to_formatted_string(locale),
            self.max_us.to_formatted_string(locale)
        );

        print!("Percentiles: ");
        for (p, latency) in &self.latency_percentiles {
            print!("P{:.1}: {} μs, ", p, latency.to_formatted_string(locale));
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Sample, TestStats};

    #[test]
    fn report_counts_undelivered() {
        let stats = TestStats::new().unwrap();
        for _ in 0..3 {
            stats.record_submission_success();
        }
        stats.record_delivery(Sample::now());

        let report = stats.report(Duration::from_secs(1), &[50.0]);
        assert_eq!(report.submitted, 3);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.undelivered, 2);
        assert_eq!(report.latency_percentiles.len(), 1);
    }

    #[test]
    fn report_without_deliveries_has_no_percentiles() {
        let stats = TestStats::new().unwrap();
        let report = stats.report(Duration::from_secs(1), &[50.0, 99.0]);
        assert!(report.latency_percentiles.is_empty());
        assert_eq!(report.max_us, 0);
    }
}
