//! Metrics collection and export for pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::Serialize;

#[cfg(feature = "metrics")]
use crate::errors::PoolResult;

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use selfclean_pool::{ManualScheduler, PoolConfiguration, SelfCleaningPool};
///
/// let pool = SelfCleaningPool::new(|| 1, PoolConfiguration::default(), ManualScheduler::new());
///
/// let item = pool.get();
/// pool.release(&item);
/// let _again = pool.get();
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.total_reused, 1);
/// assert_eq!(metrics.in_use_entries, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Resources constructed by the factory
    pub total_created: usize,

    /// `get` calls satisfied from the free list
    pub total_reused: usize,

    /// Releases that matched a checked-out entry
    pub total_released: usize,

    /// Entries dropped by the idle sweep
    pub idle_evictions: usize,

    /// Entries dropped because their resource no longer resolved
    pub stale_dropped: usize,

    /// Entries currently on the free list
    pub free_entries: usize,

    /// Entries currently checked out
    pub in_use_entries: usize,

    /// Whether the sweep timer is armed
    pub timer_armed: bool,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_reused".to_string(), self.total_reused.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("idle_evictions".to_string(), self.idle_evictions.to_string());
        metrics.insert("stale_dropped".to_string(), self.stale_dropped.to_string());
        metrics.insert("free_entries".to_string(), self.free_entries.to_string());
        metrics.insert("in_use_entries".to_string(), self.in_use_entries.to_string());
        metrics.insert("timer_armed".to_string(), self.timer_armed.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use selfclean_pool::{ManualScheduler, MetricsExporter, PoolConfiguration, SelfCleaningPool};
    /// use std::collections::HashMap;
    ///
    /// let pool = SelfCleaningPool::new(|| 1, PoolConfiguration::default(), ManualScheduler::new());
    /// let _item = pool.get();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "buffers", Some(&tags)).unwrap();
    /// assert!(output.contains("selfclean_pool_entries_in_use"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let opts = |name: &str, help: &str| Opts::new(name, help).const_labels(labels.clone());

        let registry = Registry::new();

        let gauges = [
            ("selfclean_pool_entries_free", "Entries on the free list", metrics.free_entries),
            ("selfclean_pool_entries_in_use", "Entries checked out", metrics.in_use_entries),
            ("selfclean_pool_timer_armed", "Whether the idle sweep timer is armed", usize::from(metrics.timer_armed)),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let counters = [
            ("selfclean_pool_created_total", "Resources constructed by the factory", metrics.total_created),
            ("selfclean_pool_reused_total", "Gets served from the free list", metrics.total_reused),
            ("selfclean_pool_released_total", "Resources returned to the pool", metrics.total_released),
            ("selfclean_pool_idle_evictions_total", "Entries dropped by the idle sweep", metrics.idle_evictions),
            ("selfclean_pool_stale_dropped_total", "Entries whose resource was already gone", metrics.stale_dropped),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub total_created: AtomicUsize,
    pub total_reused: AtomicUsize,
    pub total_released: AtomicUsize,
    pub idle_evictions: AtomicUsize,
    pub stale_dropped: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(counter: &AtomicUsize, amount: usize) {
        if amount > 0 {
            counter.fetch_add(amount, Ordering::Relaxed);
        }
    }

    pub fn get_metrics(&self, free: usize, in_use: usize, timer_armed: bool) -> PoolMetrics {
        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
            stale_dropped: self.stale_dropped.load(Ordering::Relaxed),
            free_entries: free,
            in_use_entries: in_use,
            timer_armed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_keys() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.total_created, 3);
        MetricsTracker::record(&tracker.idle_evictions, 2);

        let exported = tracker.get_metrics(1, 2, true).export();
        assert_eq!(exported["total_created"], "3");
        assert_eq!(exported["idle_evictions"], "2");
        assert_eq!(exported["in_use_entries"], "2");
        assert_eq!(exported["timer_armed"], "true");
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn test_prometheus_export() {
        let tracker = MetricsTracker::new();
        MetricsTracker::record(&tracker.total_reused, 4);

        let output =
            MetricsExporter::export_prometheus(&tracker.get_metrics(0, 0, false), "conns", None)
                .unwrap();
        assert!(output.contains("# TYPE selfclean_pool_reused_total counter"));
        assert!(output.contains("selfclean_pool_reused_total{pool=\"conns\"} 4"));
        assert!(output.contains("selfclean_pool_timer_armed{pool=\"conns\"} 0"));
    }
}
