// src/report.rs - Run counters and failure reporting
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{DiscoveryError, ParseError, PublishError, RecordError};

/// Snapshot of the run counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub units_discovered: usize,
    pub units_skipped: usize,
    pub parse_failures: usize,
    pub records_parsed: usize,
    pub records_published: usize,
    pub records_dropped: usize,
    pub sink_failures: usize,
}

/// Single place failures are logged and counted.
///
/// Shared as `Arc<Reporter>` between the discoverer, the coordinator and the
/// workers.
#[derive(Debug)]
pub struct Reporter {
    started: Instant,
    units_discovered: AtomicUsize,
    units_skipped: AtomicUsize,
    parse_failures: AtomicUsize,
    records_parsed: AtomicUsize,
    records_published: AtomicUsize,
    records_dropped: AtomicUsize,
    sink_failures: AtomicUsize,
}

impl Default for Reporter {
    fn default() -> Self {
        Reporter::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Reporter {
            started: Instant::now(),
            units_discovered: AtomicUsize::new(0),
            units_skipped: AtomicUsize::new(0),
            parse_failures: AtomicUsize::new(0),
            records_parsed: AtomicUsize::new(0),
            records_published: AtomicUsize::new(0),
            records_dropped: AtomicUsize::new(0),
            sink_failures: AtomicUsize::new(0),
        }
    }

    pub fn unit_discovered(&self, name: &str, bytes: usize) {
        self.units_discovered.fetch_add(1, Ordering::Relaxed);
        debug!(unit = name, bytes, "discovered");
    }

    pub fn unit_skipped(&self, path: &str, reason: &str) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
        info!(path, reason, "skipping");
    }

    pub fn discovery_failed(&self, err: &DiscoveryError) {
        self.units_skipped.fetch_add(1, Ordering::Relaxed);
        error!(stage = "discover", "{}", err);
    }

    pub fn parse_failed(&self, unit: &str, err: &ParseError) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
        error!(stage = "parse", unit, "{}", err);
    }

    pub fn records_parsed(&self, unit: &str, count: usize) {
        self.records_parsed.fetch_add(count, Ordering::Relaxed);
        debug!(unit, count, "parsed");
    }

    pub fn record_dropped(&self, source: &str, err: &RecordError) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
        error!(stage = err.stage(), source, "record dropped: {}", err);
    }

    pub fn sink_failed(&self, source: &str, err: &PublishError) {
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        error!(stage = "publish", source, "{}", err);
    }

    pub fn record_published(&self, id: &str) {
        self.records_published.fetch_add(1, Ordering::Relaxed);
        debug!(id, "published");
    }

    pub fn http_status(&self, id: &str, status: u16) {
        if status >= 400 {
            warn!(id, status, "HTTP sink answered with an error status");
        } else {
            info!(id, status, "HTTP sink response");
        }
    }

    pub fn stats(&self) -> RunStats {
        RunStats {
            units_discovered: self.units_discovered.load(Ordering::Relaxed),
            units_skipped: self.units_skipped.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            records_published: self.records_published.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Log the end-of-run summary
    pub fn summarize(&self) -> RunStats {
        let stats = self.stats();
        // Millisecond precision keeps the summary readable
        let elapsed = Duration::from_millis(self.elapsed().as_millis() as u64);
        info!(
            units = stats.units_discovered,
            skipped = stats.units_skipped,
            parse_failures = stats.parse_failures,
            records = stats.records_parsed,
            published = stats.records_published,
            dropped = stats.records_dropped,
            sink_failures = stats.sink_failures,
            "run finished in {}",
            humantime::format_duration(elapsed)
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;

    #[test]
    fn test_counters() {
        let reporter = Reporter::new();
        reporter.unit_discovered("a.json", 10);
        reporter.records_parsed("a.json", 3);
        reporter.record_published("x");
        reporter.record_dropped("a.json", &TransformError::new("include", "boom").into());
        reporter.parse_failed("b.json", &ParseError::Json("bad".to_string()));

        let stats = reporter.stats();
        assert_eq!(stats.units_discovered, 1);
        assert_eq!(stats.records_parsed, 3);
        assert_eq!(stats.records_published, 1);
        assert_eq!(stats.records_dropped, 1);
        assert_eq!(stats.parse_failures, 1);
        assert_eq!(reporter.summarize(), stats);
    }
}
