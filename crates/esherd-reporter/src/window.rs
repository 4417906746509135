//! The rolling per-node sample window and its derived aggregates.

use std::collections::HashMap;

use serde::Deserialize;

/// One health observation of one node, stamped by the poller.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthSample {
    pub ip: String,
    pub name: String,
    pub timestamp_ms: u64,
    pub cpu: f64,
    pub virtual_memory: f64,
    pub swap_memory: f64,
    pub disk_usage: f64,
    pub elasticsearch_up: bool,
}

/// Status body returned by a node's `/status` endpoint. The poller stamps
/// `name`, `ip` and the timestamp onto it.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusBody {
    pub cpu: f64,
    pub virtual_memory: f64,
    pub swap_memory: f64,
    pub disk_usage: f64,
    pub elasticsearch_up: bool,
}

/// Ephemeral per-node aggregate over a full window.
///
/// `elasticsearch_score` is a running signed sum (+1 per up sample, −1 per
/// down sample), encoding trend rather than instantaneous state.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeAverage {
    pub ip: String,
    pub name: String,
    pub cpu: f64,
    pub virtual_memory: f64,
    pub swap_memory: f64,
    pub disk_usage: f64,
    pub elasticsearch_score: i32,
}

/// Cluster-wide resource average across the active set. Computed every
/// cycle; currently gates no decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterAverage {
    pub cpu: f64,
    pub virtual_memory: f64,
    pub swap_memory: f64,
    pub disk_usage: f64,
}

/// Mapping from node IP to its ordered recent samples.
///
/// Arrival order is time order. Owned exclusively by the reporter; mutated
/// only by its ingest and trim steps.
#[derive(Debug, Default)]
pub struct SampleWindow {
    buckets: HashMap<String, Vec<HealthSample>>,
}

impl SampleWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample to its node's bucket.
    pub fn push(&mut self, sample: HealthSample) {
        self.buckets
            .entry(sample.ip.clone())
            .or_default()
            .push(sample);
    }

    /// Evict samples older than `max_age_ms` relative to `now_ms`.
    ///
    /// Nodes whose bucket ends up empty are removed from the window and
    /// returned: they have stopped reporting entirely and are treated as
    /// dead by the caller.
    pub fn trim(&mut self, now_ms: u64, max_age_ms: u64) -> Vec<String> {
        let mut emptied = Vec::new();
        self.buckets.retain(|ip, samples| {
            samples.retain(|s| now_ms.saturating_sub(s.timestamp_ms) <= max_age_ms);
            if samples.is_empty() {
                emptied.push(ip.clone());
                false
            } else {
                true
            }
        });
        emptied
    }

    /// Drop one node's bucket entirely.
    pub fn remove(&mut self, ip: &str) {
        self.buckets.remove(ip);
    }

    /// Fresh start for every node.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    /// Number of nodes currently tracked.
    pub fn node_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Samples for one node, if tracked.
    pub fn samples(&self, ip: &str) -> Option<&[HealthSample]> {
        self.buckets.get(ip).map(Vec::as_slice)
    }

    /// Reduce every node with at least `min_samples` samples to its
    /// `NodeAverage`. Nodes below the threshold are still warming up and
    /// take part in no decision.
    pub fn active_averages(&self, min_samples: usize) -> Vec<NodeAverage> {
        let mut averages: Vec<NodeAverage> = self
            .buckets
            .values()
            .filter(|samples| samples.len() >= min_samples)
            .map(|samples| reduce(samples))
            .collect();
        // HashMap iteration order is arbitrary; keep decisions stable.
        averages.sort_by(|a, b| a.ip.cmp(&b.ip));
        averages
    }
}

/// Incremental running mean for the resource fields, signed running sum
/// for the elasticsearch trend.
fn reduce(samples: &[HealthSample]) -> NodeAverage {
    let mut avg = NodeAverage {
        ip: samples[0].ip.clone(),
        name: samples[0].name.clone(),
        cpu: 0.0,
        virtual_memory: 0.0,
        swap_memory: 0.0,
        disk_usage: 0.0,
        elasticsearch_score: 0,
    };
    for (i, s) in samples.iter().enumerate() {
        let n = i as f64;
        avg.cpu = (avg.cpu * n + s.cpu) / (n + 1.0);
        avg.virtual_memory = (avg.virtual_memory * n + s.virtual_memory) / (n + 1.0);
        avg.swap_memory = (avg.swap_memory * n + s.swap_memory) / (n + 1.0);
        avg.disk_usage = (avg.disk_usage * n + s.disk_usage) / (n + 1.0);
        avg.elasticsearch_score += if s.elasticsearch_up { 1 } else { -1 };
    }
    avg
}

/// Cluster-wide running mean across node averages. `None` for an empty
/// active set.
pub fn cluster_average(averages: &[NodeAverage]) -> Option<ClusterAverage> {
    if averages.is_empty() {
        return None;
    }
    let mut total = ClusterAverage::default();
    for (i, a) in averages.iter().enumerate() {
        let n = i as f64;
        total.cpu = (total.cpu * n + a.cpu) / (n + 1.0);
        total.virtual_memory = (total.virtual_memory * n + a.virtual_memory) / (n + 1.0);
        total.swap_memory = (total.swap_memory * n + a.swap_memory) / (n + 1.0);
        total.disk_usage = (total.disk_usage * n + a.disk_usage) / (n + 1.0);
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ip: &str, ts: u64, cpu: f64, up: bool) -> HealthSample {
        HealthSample {
            ip: ip.to_string(),
            name: "esnode".to_string(),
            timestamp_ms: ts,
            cpu,
            virtual_memory: 40.0,
            swap_memory: 10.0,
            disk_usage: 50.0,
            elasticsearch_up: up,
        }
    }

    #[test]
    fn trim_evicts_only_expired_samples() {
        let mut window = SampleWindow::new();
        window.push(sample("10.0.0.1", 1_000, 0.5, true));
        window.push(sample("10.0.0.1", 5_000, 0.5, true));

        let emptied = window.trim(6_000, 2_000);
        assert!(emptied.is_empty());

        let samples = window.samples("10.0.0.1").unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].timestamp_ms, 5_000);
    }

    #[test]
    fn trim_window_invariant_holds() {
        let mut window = SampleWindow::new();
        for ts in [100, 2_000, 4_000, 9_500, 10_000] {
            window.push(sample("10.0.0.1", ts, 0.5, true));
        }
        let now = 10_000;
        let max_age = 5 * 1_000;
        window.trim(now, max_age);

        for s in window.samples("10.0.0.1").unwrap() {
            assert!(now - s.timestamp_ms <= max_age);
        }
    }

    #[test]
    fn trim_reports_nodes_that_went_silent() {
        let mut window = SampleWindow::new();
        window.push(sample("10.0.0.1", 1_000, 0.5, true));
        window.push(sample("10.0.0.2", 9_000, 0.5, true));

        let emptied = window.trim(10_000, 2_000);
        assert_eq!(emptied, vec!["10.0.0.1".to_string()]);
        // The dead node is gone from the window, not just empty.
        assert!(window.samples("10.0.0.1").is_none());
        assert_eq!(window.node_count(), 1);
    }

    #[test]
    fn active_averages_requires_a_full_window() {
        let mut window = SampleWindow::new();
        for ts in [1, 2, 3, 4, 5] {
            window.push(sample("10.0.0.1", ts, 0.5, true));
        }
        for ts in [1, 2, 3] {
            window.push(sample("10.0.0.2", ts, 0.5, true));
        }

        let actives = window.active_averages(5);
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].ip, "10.0.0.1");
    }

    #[test]
    fn averages_are_running_means() {
        let mut window = SampleWindow::new();
        window.push(sample("10.0.0.1", 1, 0.2, true));
        window.push(sample("10.0.0.1", 2, 0.4, true));
        window.push(sample("10.0.0.1", 3, 0.6, true));

        let actives = window.active_averages(3);
        assert!((actives[0].cpu - 0.4).abs() < 1e-9);
    }

    #[test]
    fn elasticsearch_score_is_a_signed_sum_not_an_average() {
        let mut window = SampleWindow::new();
        window.push(sample("10.0.0.1", 1, 0.5, true));
        window.push(sample("10.0.0.1", 2, 0.5, false));
        window.push(sample("10.0.0.1", 3, 0.5, false));

        let actives = window.active_averages(3);
        assert_eq!(actives[0].elasticsearch_score, -1);
    }

    #[test]
    fn cluster_average_over_active_set() {
        let averages = vec![
            NodeAverage {
                ip: "a".into(),
                name: "esnode".into(),
                cpu: 0.2,
                virtual_memory: 40.0,
                swap_memory: 0.0,
                disk_usage: 50.0,
                elasticsearch_score: 5,
            },
            NodeAverage {
                ip: "b".into(),
                name: "esnode".into(),
                cpu: 0.6,
                virtual_memory: 60.0,
                swap_memory: 0.0,
                disk_usage: 70.0,
                elasticsearch_score: 5,
            },
        ];
        let total = cluster_average(&averages).unwrap();
        assert!((total.cpu - 0.4).abs() < 1e-9);
        assert!((total.virtual_memory - 50.0).abs() < 1e-9);
        assert!((total.disk_usage - 60.0).abs() < 1e-9);
    }

    #[test]
    fn cluster_average_of_empty_set_is_none() {
        assert!(cluster_average(&[]).is_none());
    }

    #[test]
    fn clear_starts_every_node_fresh() {
        let mut window = SampleWindow::new();
        window.push(sample("10.0.0.1", 1, 0.5, true));
        window.push(sample("10.0.0.2", 1, 0.5, true));
        window.clear();
        assert!(window.is_empty());
    }
}
