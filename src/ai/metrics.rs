//! Batch Metrics Collection
//!
//! Counters for everything a model instance has generated, shared by all
//! concurrent example tasks. Atomics only, so recording never contends.
//!
//! ## Usage
//!
//! ```ignore
//! let metrics = model.metrics();
//! let summary = metrics.snapshot();
//! println!("{}", summary.display());
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::types::ResponseData;

// =============================================================================
// Metrics Collector
// =============================================================================

/// Thread-safe counters for one model instance
pub struct BatchMetrics {
    start_time: Instant,
    /// Examples finished, successful or not
    examples: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    prompt_tokens: AtomicU64,
    generated_tokens: AtomicU64,
    /// Provider attempts that returned (retries included)
    provider_calls: AtomicU64,
    retries: AtomicU64,
    total_latency_ms: AtomicU64,
}

/// Point-in-time copy of [`BatchMetrics`]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub elapsed_ms: u64,
    pub examples: u64,
    pub successes: u64,
    pub failures: u64,
    pub prompt_tokens: u64,
    pub generated_tokens: u64,
    pub provider_calls: u64,
    pub retries: u64,
    pub avg_latency_ms: f64,
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            examples: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            prompt_tokens: AtomicU64::new(0),
            generated_tokens: AtomicU64::new(0),
            provider_calls: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        }
    }

    /// Record one provider attempt and how long it took
    pub fn record_call(&self, latency_ms: u64) {
        self.provider_calls.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished example
    pub fn record_result<R>(&self, result: &ResponseData<R>) {
        self.examples.fetch_add(1, Ordering::Relaxed);
        if result.is_success() {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.prompt_tokens
            .fetch_add(result.number_of_prompt_tokens as u64, Ordering::Relaxed);
        self.generated_tokens
            .fetch_add(result.number_of_generated_tokens as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSummary {
        let provider_calls = self.provider_calls.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let avg_latency_ms = if provider_calls > 0 {
            total_latency as f64 / provider_calls as f64
        } else {
            0.0
        };

        MetricsSummary {
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
            examples: self.examples.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            prompt_tokens: self.prompt_tokens.load(Ordering::Relaxed),
            generated_tokens: self.generated_tokens.load(Ordering::Relaxed),
            provider_calls,
            retries: self.retries.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "Examples: {} (ok: {}, failed: {})\n\
             Tokens: prompt {}, generated {}\n\
             Provider calls: {} ({} retries)\n\
             Avg Latency: {:.0}ms\n\
             Elapsed: {:.1}s",
            self.examples,
            self.successes,
            self.failures,
            self.prompt_tokens,
            self.generated_tokens,
            self.provider_calls,
            self.retries,
            self.avg_latency_ms,
            self.elapsed_ms as f64 / 1000.0
        )
    }
}

// =============================================================================
// Shared Type
// =============================================================================

pub type SharedMetrics = Arc<BatchMetrics>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_results() {
        let metrics = BatchMetrics::new();
        metrics.record_result(&ResponseData::success(None, "ok".to_string(), 100, 20));
        metrics.record_result(&ResponseData::<String>::failure(None, "Timeout Error: x", 50));

        let summary = metrics.snapshot();
        assert_eq!(summary.examples, 2);
        assert_eq!(summary.successes, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.prompt_tokens, 150);
        assert_eq!(summary.generated_tokens, 20);
    }

    #[test]
    fn test_concurrent_recording() {
        use std::thread;

        let metrics = Arc::new(BatchMetrics::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.record_call(50);
                        m.record_retry();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let summary = metrics.snapshot();
        assert_eq!(summary.provider_calls, 1000);
        assert_eq!(summary.retries, 1000);
        assert!((summary.avg_latency_ms - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_display() {
        let metrics = BatchMetrics::new();
        metrics.record_call(10);
        metrics.record_result(&ResponseData::success(None, "ok".to_string(), 1000, 500));

        let display = metrics.snapshot().display();
        assert!(display.contains("prompt 1000"));
        assert!(display.contains("generated 500"));
        assert!(display.contains("Provider calls: 1"));
    }
}
