//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Metrics data for a pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Pool::new(|| async { Ok::<_, FactoryError>(1) }, PoolConfiguration::new()).unwrap();
///
/// {
///     let _obj = pool.acquire().await.unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_acquired, 1);
///     assert_eq!(metrics.outstanding_resources, 1);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Total checkouts handed to callers
    pub total_acquired: usize,

    /// Total resources returned to the pool
    pub total_released: usize,

    /// Total resources produced by the factory
    pub total_created: usize,

    /// Total resources torn down
    pub total_destroyed: usize,

    /// Total resources discarded by callers
    pub total_discarded: usize,

    /// Factory invocations that failed
    pub factory_failures: usize,

    /// Acquire calls that gave up waiting
    pub timeouts: usize,

    /// Number of times an acquire had to queue
    pub wait_events: usize,

    /// Current idle resources
    pub idle_resources: usize,

    /// Current resources checked out or being created
    pub outstanding_resources: usize,

    /// Current queued acquire calls
    pub waiting_tasks: usize,

    /// Current resources alive
    pub created_resources: usize,

    /// Pool utilization ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum pool capacity
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("factory_failures".to_string(), self.factory_failures.to_string());
        metrics.insert("timeouts".to_string(), self.timeouts.to_string());
        metrics.insert("wait_events".to_string(), self.wait_events.to_string());
        metrics.insert("idle_resources".to_string(), self.idle_resources.to_string());
        metrics.insert("outstanding_resources".to_string(), self.outstanding_resources.to_string());
        metrics.insert("waiting_tasks".to_string(), self.waiting_tasks.to_string());
        metrics.insert("created_resources".to_string(), self.created_resources.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{FactoryError, Pool, PoolConfiguration};
    /// use std::collections::HashMap;
    ///
    /// let pool = Pool::new(|| async { Ok::<_, FactoryError>(1) }, PoolConfiguration::new()).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("db", Some(&tags));
    /// assert!(output.contains("resourcepool_resources_idle"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let labels = Self::format_labels(pool_name, tags);
        let mut output = String::new();

        let gauges = [
            ("resourcepool_resources_idle", "Current idle resources", metrics.idle_resources.to_string()),
            ("resourcepool_resources_outstanding", "Current checked out resources", metrics.outstanding_resources.to_string()),
            ("resourcepool_resources_created", "Current live resources", metrics.created_resources.to_string()),
            ("resourcepool_waiters", "Current queued acquire calls", metrics.waiting_tasks.to_string()),
            ("resourcepool_utilization", "Pool utilization ratio", format!("{:.2}", metrics.utilization)),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, &value);
        }

        let counters = [
            ("resourcepool_acquired_total", "Total checkouts", metrics.total_acquired),
            ("resourcepool_released_total", "Total returns", metrics.total_released),
            ("resourcepool_created_total", "Total resources created", metrics.total_created),
            ("resourcepool_destroyed_total", "Total resources destroyed", metrics.total_destroyed),
            ("resourcepool_discarded_total", "Total resources discarded", metrics.total_discarded),
            ("resourcepool_factory_failures_total", "Failed factory invocations", metrics.factory_failures),
            ("resourcepool_timeouts_total", "Acquire timeouts", metrics.timeouts),
            ("resourcepool_wait_events_total", "Acquire calls that queued", metrics.wait_events),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, &value.to_string());
        }

        output
    }

    fn push_metric(output: &mut String, name: &str, help: &str, kind: &str, labels: &str, value: &str) {
        output.push_str(&format!("# HELP {name} {help}\n"));
        output.push_str(&format!("# TYPE {name} {kind}\n"));
        output.push_str(&format!("{name}{{{labels}}} {value}\n"));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut tags: Vec<_> = tags.iter().collect();
            tags.sort();
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub discarded: AtomicUsize,
    pub factory_failures: AtomicUsize,
    pub timeouts: AtomicUsize,
    pub wait_events: AtomicUsize,
}

/// Point-in-time pool occupancy fed into a [`PoolMetrics`] snapshot
pub(crate) struct Occupancy {
    pub idle: usize,
    pub created: usize,
    pub waiting: usize,
    pub capacity: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, occupancy: Occupancy) -> PoolMetrics {
        let outstanding = occupancy.created - occupancy.idle;
        let utilization = if occupancy.capacity > 0 {
            outstanding as f64 / occupancy.capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_released: self.released.load(Ordering::Relaxed),
            total_created: self.created.load(Ordering::Relaxed),
            total_destroyed: self.destroyed.load(Ordering::Relaxed),
            total_discarded: self.discarded.load(Ordering::Relaxed),
            factory_failures: self.factory_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            wait_events: self.wait_events.load(Ordering::Relaxed),
            idle_resources: occupancy.idle,
            outstanding_resources: outstanding,
            waiting_tasks: occupancy.waiting,
            created_resources: occupancy.created,
            utilization,
            max_capacity: occupancy.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_derives_gauges() {
        let tracker = MetricsTracker::new();
        MetricsTracker::bump(&tracker.acquired);
        MetricsTracker::bump(&tracker.acquired);

        let metrics = tracker.get_metrics(Occupancy {
            idle: 1,
            created: 3,
            waiting: 0,
            capacity: 4,
        });

        assert_eq!(metrics.total_acquired, 2);
        assert_eq!(metrics.outstanding_resources, 2);
        assert!((metrics.utilization - 0.5).abs() < f64::EPSILON);
        assert_eq!(metrics.export()["utilization"], "0.50");
    }

    #[test]
    fn test_prometheus_labels_are_sorted() {
        let metrics = MetricsTracker::new().get_metrics(Occupancy {
            idle: 0,
            created: 0,
            waiting: 0,
            capacity: 1,
        });
        let mut tags = HashMap::new();
        tags.insert("zone".to_string(), "b".to_string());
        tags.insert("app".to_string(), "a".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "p", Some(&tags));

        assert!(output.contains("resourcepool_acquired_total{pool=\"p\",app=\"a\",zone=\"b\"} 0\n"));
        assert!(output.contains("# TYPE resourcepool_utilization gauge\n"));
    }
}
