//! Config synchronizer — regeneration triggers and the reload ladder.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use esherd_membership::MembershipStore;

use crate::config::{ProxyConfig, render_config};
use crate::control::ProxyControl;
use crate::error::{ProxyError, ProxyResult};

/// Keeps the proxy's live configuration and running process consistent
/// with the membership store.
///
/// Triggers: a membership change notification, the periodic resync timer,
/// and process startup (one reset-and-reload on boot).
pub struct ConfigSynchronizer<P> {
    store: MembershipStore,
    config: ProxyConfig,
    proxy: P,
}

impl<P: ProxyControl> ConfigSynchronizer<P> {
    pub fn new(store: MembershipStore, config: ProxyConfig, proxy: P) -> Self {
        Self {
            store,
            config,
            proxy,
        }
    }

    /// Rebuild the active configuration from the fresh template and the
    /// current membership snapshot.
    pub async fn regenerate(&self) -> ProxyResult<()> {
        let entries = self.store.list().await;
        let template = tokio::fs::read_to_string(&self.config.template_path)
            .await
            .map_err(|source| ProxyError::Template {
                path: self.config.template_path.display().to_string(),
                source,
            })?;
        let rendered = render_config(&template, &entries)?;
        tokio::fs::write(&self.config.config_path, rendered)
            .await
            .map_err(|source| ProxyError::Config {
                path: self.config.config_path.display().to_string(),
                source,
            })?;
        debug!(servers = entries.len(), "proxy config regenerated");
        Ok(())
    }

    /// The escalating reload protocol: soft reload, then hard reload, then
    /// full restart. Each rung logs the previous rung's error. Failure of
    /// the last rung is terminal for this trigger only.
    pub async fn reload_ladder(&self) -> ProxyResult<()> {
        let soft = match self.proxy.soft_reload().await {
            Ok(()) => {
                info!("proxy reloaded");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(error = %soft, "soft reload failed, trying hard reload");

        let hard = match self.proxy.hard_reload().await {
            Ok(()) => {
                info!("proxy reloaded, dropping in-flight connections");
                return Ok(());
            }
            Err(e) => e,
        };
        warn!(error = %hard, "hard reload failed, falling back to full restart");

        self.restart().await?;
        info!("proxy restarted from scratch");
        Ok(())
    }

    /// Stop (softly, then hard) and start fresh.
    async fn restart(&self) -> ProxyResult<()> {
        if let Err(soft) = self.proxy.soft_stop().await {
            warn!(error = %soft, "soft stop failed, trying hard stop");
            self.proxy.hard_stop().await?;
        }
        self.proxy.start().await
    }

    /// One full trigger cycle: regenerate, then walk the ladder.
    pub async fn resync(&self) -> ProxyResult<()> {
        self.regenerate().await?;
        self.reload_ladder().await
    }

    /// Boot sequence: stop any stale running proxy, regenerate, start
    /// fresh. A failing stale-stop is expected when nothing is running.
    pub async fn reset_on_boot(&self) -> ProxyResult<()> {
        if let Err(e) = self.proxy.soft_stop().await {
            debug!(error = %e, "no stale proxy stopped softly, trying hard stop");
            if let Err(e) = self.proxy.hard_stop().await {
                debug!(error = %e, "no stale proxy to stop");
            }
        }
        self.regenerate().await?;
        self.proxy.start().await
    }

    /// React to membership changes and the periodic timer until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut changes = self.store.subscribe();
        let interval = Duration::from_secs(self.config.resync_interval_secs);
        info!(
            interval_secs = self.config.resync_interval_secs,
            "config synchronizer started"
        );

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    debug!("membership changed, resyncing proxy");
                    if let Err(e) = self.resync().await {
                        error!(error = %e, "proxy resync failed, waiting for the next trigger");
                    }
                }
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.resync().await {
                        error!(error = %e, "periodic proxy resync failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("config synchronizer shutting down");
                    break;
                }
            }
        }
    }
}
