//! Rolling health metrics of a circuit breaker.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Number of buckets the sampling window is split into.
const BUCKET_COUNT: u32 = 10;

/// Aggregated health over the sampling window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct HealthInfo {
    pub(crate) throughput: u32,
    pub(crate) failure_count: u32,
    pub(crate) failure_rate: f64,
}

#[derive(Debug)]
struct Bucket {
    started: Instant,
    successes: u32,
    failures: u32,
}

/// Success and failure counts over a sliding window of fixed-size buckets.
#[derive(Debug)]
pub(crate) struct HealthMetrics {
    sampling_duration: Duration,
    bucket_duration: Duration,
    buckets: VecDeque<Bucket>,
}

impl HealthMetrics {
    pub(crate) fn new(sampling_duration: Duration) -> Self {
        Self {
            sampling_duration,
            bucket_duration: sampling_duration / BUCKET_COUNT,
            buckets: VecDeque::with_capacity(BUCKET_COUNT as usize + 1),
        }
    }

    pub(crate) fn record_success(&mut self, now: Instant) {
        self.current(now).successes += 1;
    }

    pub(crate) fn record_failure(&mut self, now: Instant) {
        self.current(now).failures += 1;
    }

    pub(crate) fn health(&mut self, now: Instant) -> HealthInfo {
        self.evict(now);
        let (successes, failures) = self
            .buckets
            .iter()
            .fold((0u32, 0u32), |(s, f), b| (s + b.successes, f + b.failures));
        let throughput = successes + failures;
        let failure_rate = if throughput == 0 {
            0.0
        } else {
            f64::from(failures) / f64::from(throughput)
        };
        HealthInfo {
            throughput,
            failure_count: failures,
            failure_rate,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.buckets.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(front) = self.buckets.front() {
            if now.saturating_duration_since(front.started) >= self.sampling_duration {
                self.buckets.pop_front();
            } else {
                break;
            }
        }
    }

    fn current(&mut self, now: Instant) -> &mut Bucket {
        self.evict(now);
        let stale = self
            .buckets
            .back()
            .map_or(true, |b| now.saturating_duration_since(b.started) >= self.bucket_duration);
        if stale {
            self.buckets.push_back(Bucket {
                started: now,
                successes: 0,
                failures: 0,
            });
        }
        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }
}
