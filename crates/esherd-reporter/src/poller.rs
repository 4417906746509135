//! Polling loop — concurrent status fan-out over the membership list.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use esherd_membership::{MembershipStore, ServerEntry};

use crate::reporter::{Reporter, ReporterConfig};
use crate::window::{HealthSample, StatusBody};

/// Polls every known node's `/status` endpoint on a fixed interval and
/// hands each settled batch to the reporter.
///
/// A per-node failure is logged and that node is omitted from the batch;
/// it never aborts the cycle for the other nodes.
pub struct Poller {
    store: MembershipStore,
    reporter: Arc<Reporter>,
    http: reqwest::Client,
    interval: Duration,
    timeout: Duration,
}

impl Poller {
    pub fn new(
        store: MembershipStore,
        reporter: Arc<Reporter>,
        config: &ReporterConfig,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.status_timeout_ms))
            .build()?;
        Ok(Self {
            store,
            reporter,
            http,
            interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.status_timeout_ms),
        })
    }

    /// One fan-out/join cycle. Returns only once every request in the
    /// batch has settled.
    pub async fn poll_once(&self) -> Vec<HealthSample> {
        let servers = self.store.list().await;
        let mut probes = JoinSet::new();
        for server in servers {
            let http = self.http.clone();
            let timeout = self.timeout;
            probes.spawn(async move { fetch_status(&http, server, timeout).await });
        }

        let mut batch = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Some(sample)) => batch.push(sample),
                Ok(None) => {}
                Err(e) => error!(error = %e, "status probe task failed"),
            }
        }
        batch
    }

    /// Poll on the configured interval until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "polling loop started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    let batch = self.poll_once().await;
                    debug!(samples = batch.len(), "poll cycle settled");
                    self.reporter.ingest(batch).await;
                }
                _ = shutdown.changed() => {
                    info!("polling loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Probe one node. `None` means the node is omitted from this batch.
async fn fetch_status(
    http: &reqwest::Client,
    server: ServerEntry,
    timeout: Duration,
) -> Option<HealthSample> {
    let url = format!("http://{}/status", server.url);
    let response = match http.get(&url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!(node = %server.url, error = %e, "status request failed");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(node = %server.url, status = %response.status(), "status returned non-success");
        return None;
    }
    let body: StatusBody = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            warn!(node = %server.url, error = %e, "could not parse status body");
            return None;
        }
    };

    Some(HealthSample {
        ip: server.url,
        name: server.name,
        timestamp_ms: epoch_ms(),
        cpu: body.cpu,
        virtual_memory: body.virtual_memory,
        swap_memory: body.swap_memory,
        disk_usage: body.disk_usage,
        elasticsearch_up: body.elasticsearch_up,
    })
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
