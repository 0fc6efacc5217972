//! Prometheus-style metrics registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

/// Metric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    /// Counter (monotonically increasing).
    Counter,
    /// Gauge (can go up and down).
    Gauge,
}

impl MetricType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

#[derive(Debug, Clone)]
struct MetricDef {
    metric_type: MetricType,
    help: String,
}

/// Rendered label set, e.g. `orchestration="workflow"`. Empty for the
/// unlabeled series.
type LabelKey = String;

/// Metrics registry.
///
/// Series are created on first use; values are atomics, so updating an
/// existing series only takes the read lock.
pub struct MetricsRegistry {
    definitions: RwLock<BTreeMap<String, MetricDef>>,
    series: RwLock<HashMap<String, BTreeMap<LabelKey, Arc<AtomicU64>>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(BTreeMap::new()),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register_counter(&self, name: impl Into<String>, help: impl Into<String>) {
        self.register(name.into(), MetricType::Counter, help.into())
            .await;
    }

    pub async fn register_gauge(&self, name: impl Into<String>, help: impl Into<String>) {
        self.register(name.into(), MetricType::Gauge, help.into())
            .await;
    }

    async fn register(&self, name: String, metric_type: MetricType, help: String) {
        self.definitions
            .write()
            .await
            .insert(name.clone(), MetricDef { metric_type, help });
        self.series.write().await.entry(name).or_default();
    }

    async fn cell(&self, name: &str, labels: &[(&str, &str)]) -> Option<Arc<AtomicU64>> {
        let key = render_labels(labels);
        if let Some(cell) = self
            .series
            .read()
            .await
            .get(name)
            .and_then(|s| s.get(&key))
        {
            return Some(cell.clone());
        }
        let mut series = self.series.write().await;
        let metric = series.get_mut(name)?;
        Some(metric.entry(key).or_default().clone())
    }

    /// Add to a counter series. Unregistered names are ignored.
    pub async fn add_counter(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if let Some(cell) = self.cell(name, labels).await {
            cell.fetch_add(value, Ordering::SeqCst);
        }
    }

    pub async fn inc_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.add_counter(name, labels, 1).await;
    }

    pub async fn set_gauge(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if let Some(cell) = self.cell(name, labels).await {
            cell.store(value, Ordering::SeqCst);
        }
    }

    pub async fn inc_gauge(&self, name: &str, labels: &[(&str, &str)]) {
        if let Some(cell) = self.cell(name, labels).await {
            cell.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Decrement a gauge, stopping at zero.
    pub async fn dec_gauge(&self, name: &str, labels: &[(&str, &str)]) {
        if let Some(cell) = self.cell(name, labels).await {
            let _ = cell.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                Some(v.saturating_sub(1))
            });
        }
    }

    /// Current value of a series, `None` if it was never touched.
    pub async fn get(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        let key = render_labels(labels);
        self.series
            .read()
            .await
            .get(name)
            .and_then(|s| s.get(&key))
            .map(|c| c.load(Ordering::SeqCst))
    }

    /// Export metrics in Prometheus text format.
    pub async fn export(&self) -> String {
        let defs = self.definitions.read().await;
        let series = self.series.read().await;

        let mut output = String::new();
        for (name, def) in defs.iter() {
            output.push_str(&format!("# HELP {} {}\n", name, def.help));
            output.push_str(&format!("# TYPE {} {}\n", name, def.metric_type.as_str()));

            let Some(values) = series.get(name) else {
                continue;
            };
            for (labels, value) in values {
                let value = value.load(Ordering::SeqCst);
                if labels.is_empty() {
                    output.push_str(&format!("{} {}\n", name, value));
                } else {
                    output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
                }
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

fn render_labels(labels: &[(&str, &str)]) -> LabelKey {
    let mut sorted: Vec<_> = labels.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    sorted
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
