use std::collections::BTreeMap;
use std::sync::RwLock;

/// Lease operation counter, labeled by `operation` and `status`.
pub const LEASE_OPERATIONS: &str = "shared_lock_lease_operations_total";
/// Grant latency histogram, labeled by `operation`.
pub const LEASE_GRANT_DURATION: &str = "shared_lock_lease_grant_duration_seconds";
/// Cache operation counter, labeled by `operation` and `status`.
pub const CACHE_OPERATIONS: &str = "shared_lock_cache_operations_total";

/// `operation` label value for lease grants.
pub const OP_GET: &str = "get";
/// `operation` label value for keepalives.
pub const OP_PROLONG: &str = "prolong";

/// A lightweight, thread-safe metrics registry that renders in Prometheus
/// text exposition format. Counters and histograms carry label vectors;
/// series are created lazily on first increment/observation.
pub struct MetricsRegistry {
    counters: RwLock<BTreeMap<String, CounterVec>>,
    histograms: RwLock<BTreeMap<String, HistogramVec>>,
}

/// Monotonically increasing counter family.
struct CounterVec {
    help: String,
    label_names: Vec<String>,
    series: BTreeMap<Vec<String>, u64>,
}

/// Bucketed latency histogram family.
struct HistogramVec {
    help: String,
    label_names: Vec<String>,
    buckets: Vec<f64>,
    series: BTreeMap<Vec<String>, HistogramSeries>,
}

struct HistogramSeries {
    bucket_counts: Vec<u64>,
    sum: f64,
    count: u64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(BTreeMap::new()),
            histograms: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a counter family. If it already exists, this is a no-op.
    pub fn register_counter(&self, name: &str, help: &str, label_names: &[&str]) {
        let mut counters = self.counters.write().unwrap();
        counters.entry(name.to_string()).or_insert_with(|| CounterVec {
            help: help.to_string(),
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            series: BTreeMap::new(),
        });
    }

    /// Register a histogram family. If it already exists, this is a no-op.
    pub fn register_histogram(&self, name: &str, help: &str, label_names: &[&str], buckets: Vec<f64>) {
        let mut histograms = self.histograms.write().unwrap();
        histograms.entry(name.to_string()).or_insert_with(|| HistogramVec {
            help: help.to_string(),
            label_names: label_names.iter().map(|s| s.to_string()).collect(),
            buckets,
            series: BTreeMap::new(),
        });
    }

    /// Increment a counter series by 1. Unregistered names are ignored.
    pub fn counter_inc(&self, name: &str, label_values: &[&str]) {
        let mut counters = self.counters.write().unwrap();
        if let Some(c) = counters.get_mut(name) {
            let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
            *c.series.entry(key).or_insert(0) += 1;
        }
    }

    /// Record one observation in a histogram series. Unregistered names are ignored.
    pub fn observe(&self, name: &str, label_values: &[&str], value: f64) {
        let mut histograms = self.histograms.write().unwrap();
        if let Some(h) = histograms.get_mut(name) {
            let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
            let bucket_len = h.buckets.len();
            let series = h.series.entry(key).or_insert_with(|| HistogramSeries {
                bucket_counts: vec![0; bucket_len],
                sum: 0.0,
                count: 0,
            });
            for (i, upper) in h.buckets.iter().enumerate() {
                if value <= *upper {
                    series.bucket_counts[i] += 1;
                }
            }
            series.sum += value;
            series.count += 1;
        }
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut output = String::new();

        let counters = self.counters.read().unwrap();
        for (name, counter) in counters.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, counter.help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            for (values, count) in counter.series.iter() {
                output.push_str(&format!(
                    "{}{} {}\n",
                    name,
                    format_labels(&counter.label_names, values),
                    count
                ));
            }
        }

        let histograms = self.histograms.read().unwrap();
        for (name, histogram) in histograms.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, histogram.help));
            output.push_str(&format!("# TYPE {} histogram\n", name));
            for (values, series) in histogram.series.iter() {
                for (i, upper) in histogram.buckets.iter().enumerate() {
                    output.push_str(&format!(
                        "{}_bucket{} {}\n",
                        name,
                        format_labels_with(&histogram.label_names, values, ("le", &format_bound(*upper))),
                        series.bucket_counts[i]
                    ));
                }
                output.push_str(&format!(
                    "{}_bucket{} {}\n",
                    name,
                    format_labels_with(&histogram.label_names, values, ("le", "+Inf")),
                    series.count
                ));
                output.push_str(&format!(
                    "{}_sum{} {}\n",
                    name,
                    format_labels(&histogram.label_names, values),
                    series.sum
                ));
                output.push_str(&format!(
                    "{}_count{} {}\n",
                    name,
                    format_labels(&histogram.label_names, values),
                    series.count
                ));
            }
        }

        output
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential bucket boundaries: `count` values starting at `start`,
/// each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Vec<f64> {
    let mut buckets = Vec::with_capacity(count);
    let mut upper = start;
    for _ in 0..count {
        buckets.push(upper);
        upper *= factor;
    }
    buckets
}

/// Register every metric family the broker emits. Called once from the
/// server entry point; nothing registers itself via import side effects.
pub fn register_broker_metrics(registry: &MetricsRegistry) {
    registry.register_counter(
        LEASE_OPERATIONS,
        "Total number of lease operations",
        &["operation", "status"],
    );
    registry.register_histogram(
        LEASE_GRANT_DURATION,
        "Duration of lease grant in seconds",
        &["operation"],
        exponential_buckets(1.0, 2.0, 10),
    );
    registry.register_counter(
        CACHE_OPERATIONS,
        "Total number of cache operations",
        &["operation", "status"],
    );
}

fn format_labels(names: &[String], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = names
        .iter()
        .zip(values.iter())
        .map(|(n, v)| format!("{}=\"{}\"", n, v))
        .collect();
    format!("{{{}}}", pairs.join(","))
}

fn format_labels_with(names: &[String], values: &[String], extra: (&str, &str)) -> String {
    let mut pairs: Vec<String> = names
        .iter()
        .zip(values.iter())
        .map(|(n, v)| format!("{}=\"{}\"", n, v))
        .collect();
    pairs.push(format!("{}=\"{}\"", extra.0, extra.1));
    format!("{{{}}}", pairs.join(","))
}

fn format_bound(upper: f64) -> String {
    if upper == upper.trunc() {
        format!("{}", upper as i64)
    } else {
        format!("{}", upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_series_render() {
        let registry = MetricsRegistry::new();
        registry.register_counter("test_ops_total", "Test ops", &["operation", "status"]);
        registry.counter_inc("test_ops_total", &["get", "hit"]);
        registry.counter_inc("test_ops_total", &["get", "hit"]);
        registry.counter_inc("test_ops_total", &["get", "miss"]);

        let rendered = registry.render();
        assert!(rendered.contains("# TYPE test_ops_total counter"));
        assert!(rendered.contains("test_ops_total{operation=\"get\",status=\"hit\"} 2"));
        assert!(rendered.contains("test_ops_total{operation=\"get\",status=\"miss\"} 1"));
    }

    #[test]
    fn test_unregistered_counter_is_ignored() {
        let registry = MetricsRegistry::new();
        registry.counter_inc("missing_total", &["x"]);
        assert_eq!(registry.render(), "");
    }

    #[test]
    fn test_histogram_buckets() {
        let registry = MetricsRegistry::new();
        registry.register_histogram(
            "test_duration_seconds",
            "Test durations",
            &["operation"],
            exponential_buckets(1.0, 2.0, 3),
        );
        registry.observe("test_duration_seconds", &["get"], 0.5);
        registry.observe("test_duration_seconds", &["get"], 3.0);

        let rendered = registry.render();
        assert!(rendered.contains("test_duration_seconds_bucket{operation=\"get\",le=\"1\"} 1"));
        assert!(rendered.contains("test_duration_seconds_bucket{operation=\"get\",le=\"2\"} 1"));
        assert!(rendered.contains("test_duration_seconds_bucket{operation=\"get\",le=\"4\"} 2"));
        assert!(rendered.contains("test_duration_seconds_bucket{operation=\"get\",le=\"+Inf\"} 2"));
        assert!(rendered.contains("test_duration_seconds_count{operation=\"get\"} 2"));
    }

    #[test]
    fn test_exponential_buckets() {
        assert_eq!(exponential_buckets(1.0, 2.0, 4), vec![1.0, 2.0, 4.0, 8.0]);
    }
}
