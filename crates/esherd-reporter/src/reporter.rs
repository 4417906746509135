//! The reporter — ingest, trim, evict, decide.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::window::{HealthSample, NodeAverage, SampleWindow, cluster_average};

type BoxFuture<T> = std::pin::Pin<Box<dyn Future<Output = T> + Send>>;

/// Callback that provisions one node; resolves to `true` on success.
pub type ProvisionFn = Arc<dyn Fn() -> BoxFuture<bool> + Send + Sync>;

/// Callback that decommissions the node with the given private IP;
/// resolves to `true` on success.
pub type DecommissionFn = Arc<dyn Fn(String) -> BoxFuture<bool> + Send + Sync>;

/// Tuning for the reporter and the polling loop.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Polling interval in milliseconds. Also the unit of the window age
    /// bound and of the post-removal gate delay.
    pub poll_interval_ms: u64,
    /// Samples that make up a full observation window.
    pub buffer_report_size: usize,
    /// Provision a node while the active set is smaller than this.
    pub low_watermark: usize,
    /// Remove a node while the active set is larger than this.
    pub high_watermark: usize,
    /// Only active nodes carrying this name are candidates for automatic
    /// removal; manually added or special nodes keep a different name.
    pub node_name: String,
    /// Timeout for one node status request, in milliseconds.
    pub status_timeout_ms: u64,
    /// Whether the gate reopens after a *failed* provisioning attempt.
    /// With `false` the reporter stays suspended until an operator steps
    /// in (provisions through the API or restarts the daemon).
    pub reopen_gate_on_failed_provision: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5 * 60 * 1000,
            buffer_report_size: 5,
            low_watermark: 4,
            high_watermark: 3,
            node_name: "esnode".to_string(),
            status_timeout_ms: 10_000,
            reopen_gate_on_failed_provision: true,
        }
    }
}

/// Receives batches of health samples and takes scaling decisions.
///
/// The gate is the only durable state; everything else is recomputed from
/// the window each cycle. While the gate is closed a watermark-driven
/// scale action is in flight and incoming batches are dropped, not queued.
pub struct Reporter {
    config: ReporterConfig,
    window: Arc<Mutex<SampleWindow>>,
    gate: Arc<AtomicBool>,
    provision: ProvisionFn,
    decommission: DecommissionFn,
}

impl Reporter {
    pub fn new(
        config: ReporterConfig,
        provision: ProvisionFn,
        decommission: DecommissionFn,
    ) -> Self {
        Self {
            config,
            window: Arc::new(Mutex::new(SampleWindow::new())),
            gate: Arc::new(AtomicBool::new(true)),
            provision,
            decommission,
        }
    }

    /// Whether the reporter is currently evaluating batches.
    pub fn gate_open(&self) -> bool {
        self.gate.load(Ordering::SeqCst)
    }

    /// One full cycle: append the batch, trim expired samples, decommission
    /// nodes that went silent, then react to the remaining state.
    pub async fn ingest(&self, batch: Vec<HealthSample>) {
        if !self.gate_open() || batch.is_empty() {
            return;
        }

        let mut window = self.window.lock().await;
        for sample in batch {
            window.push(sample);
        }

        let max_age_ms = self.config.buffer_report_size as u64 * self.config.poll_interval_ms;
        let silent = window.trim(epoch_ms(), max_age_ms);
        for ip in silent {
            info!(%ip, "node has no recent reports, decommissioning");
            self.spawn_decommission(ip);
        }

        self.react(&mut window);
    }

    fn react(&self, window: &mut SampleWindow) {
        let min = self.config.buffer_report_size;
        let mut actives = window.active_averages(min);
        debug!(active = actives.len(), "reacting");
        if actives.is_empty() {
            return;
        }

        // Nodes whose elasticsearch trend went negative are evicted before
        // any count-based decision, bypassing the watermarks.
        let mut evicted = false;
        for average in &actives {
            if average.elasticsearch_score < 0 {
                info!(
                    ip = %average.ip,
                    score = average.elasticsearch_score,
                    "elasticsearch trending down, decommissioning node"
                );
                window.remove(&average.ip);
                self.spawn_decommission(average.ip.clone());
                evicted = true;
            }
        }
        if evicted {
            actives = window.active_averages(min);
        }

        if let Some(total) = cluster_average(&actives) {
            // Extension point for resource-based thresholds; gates nothing.
            debug!(
                cpu = total.cpu,
                virtual_memory = total.virtual_memory,
                swap_memory = total.swap_memory,
                disk_usage = total.disk_usage,
                "cluster-wide average"
            );
        }

        // An eviction already changed the cluster this cycle; the
        // count-based decision waits for the next batch.
        if evicted {
            return;
        }

        let n = actives.len();
        if n < self.config.low_watermark {
            self.scale_up(n);
        } else if n > self.config.high_watermark {
            self.scale_down(n, &actives, window);
        }
    }

    fn scale_up(&self, active: usize) {
        info!(
            active,
            low_watermark = self.config.low_watermark,
            "cluster below low watermark, provisioning a node"
        );
        self.gate.store(false, Ordering::SeqCst);

        let gate = Arc::clone(&self.gate);
        let window = Arc::clone(&self.window);
        let provision = Arc::clone(&self.provision);
        let reopen_on_failure = self.config.reopen_gate_on_failed_provision;
        tokio::spawn(async move {
            let ok = provision().await;
            if ok {
                window.lock().await.clear();
            } else {
                warn!("provisioning failed, keeping existing windows");
            }
            if ok || reopen_on_failure {
                gate.store(true, Ordering::SeqCst);
            } else {
                warn!("gate stays closed after failed provisioning, scaling is suspended");
            }
        });
    }

    fn scale_down(&self, active: usize, actives: &[NodeAverage], window: &mut SampleWindow) {
        let Some(candidate) = actives.iter().find(|a| a.name == self.config.node_name) else {
            debug!(
                active,
                high_watermark = self.config.high_watermark,
                "above high watermark but no active node carries the removable name"
            );
            return;
        };

        info!(
            active,
            high_watermark = self.config.high_watermark,
            ip = %candidate.ip,
            "cluster above high watermark, decommissioning a node"
        );
        self.gate.store(false, Ordering::SeqCst);
        self.spawn_decommission(candidate.ip.clone());
        window.clear();

        // Let the shrunken cluster stabilize for one extra interval before
        // evaluation resumes.
        let gate = Arc::clone(&self.gate);
        let delay = Duration::from_millis(self.config.poll_interval_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            gate.store(true, Ordering::SeqCst);
        });
    }

    /// Fire-and-forget relative to the rest of the cycle.
    fn spawn_decommission(&self, ip: String) {
        let decommission = Arc::clone(&self.decommission);
        tokio::spawn(async move {
            if !decommission(ip.clone()).await {
                warn!(%ip, "decommission pipeline failed, relying on the next cycle");
            }
        });
    }
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
