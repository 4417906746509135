//! Proxy process control.
//!
//! `ProxyControl` is the seam between the reload ladder and the actual
//! proxy process; `HaproxyProcess` is the production implementation that
//! drives the `haproxy` binary and its pid file.

use std::future::Future;

use tokio::process::Command;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};

/// Control operations on the proxied process. Each may fail; the reload
/// ladder composes them into its escalation rungs.
pub trait ProxyControl: Send + Sync {
    /// Reload without dropping in-flight connections.
    fn soft_reload(&self) -> impl Future<Output = ProxyResult<()>> + Send;
    /// Reload, dropping in-flight connections.
    fn hard_reload(&self) -> impl Future<Output = ProxyResult<()>> + Send;
    /// Ask the process to finish serving and exit.
    fn soft_stop(&self) -> impl Future<Output = ProxyResult<()>> + Send;
    /// Terminate the process.
    fn hard_stop(&self) -> impl Future<Output = ProxyResult<()>> + Send;
    /// Start a fresh process.
    fn start(&self) -> impl Future<Output = ProxyResult<()>> + Send;
}

/// Drives a real HAProxy through its binary and pid file.
///
/// Reloads re-exec the binary with `-sf`/`-st` against the pids currently
/// in the pid file; stops deliver SIGUSR1 (soft) or SIGTERM (hard) to
/// those pids.
pub struct HaproxyProcess {
    config: ProxyConfig,
}

impl HaproxyProcess {
    pub fn new(config: ProxyConfig) -> Self {
        Self { config }
    }

    /// Pids from the pid file, one per line.
    async fn read_pids(&self) -> ProxyResult<Vec<i32>> {
        let path = &self.config.pid_file;
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProxyError::PidFile {
                path: path.display().to_string(),
                source,
            })?;
        Ok(text
            .split_whitespace()
            .filter_map(|tok| tok.parse().ok())
            .collect())
    }

    async fn exec(&self, op: &'static str, extra: &[String]) -> ProxyResult<()> {
        let mut command = Command::new(&self.config.binary);
        command
            .arg("-f")
            .arg(&self.config.config_path)
            .arg("-p")
            .arg(&self.config.pid_file)
            .arg("-D")
            .args(extra);
        debug!(binary = %self.config.binary, op, "invoking proxy binary");

        let output = command
            .output()
            .await
            .map_err(|source| ProxyError::Spawn { op, source })?;
        if !output.status.success() {
            return Err(ProxyError::Control {
                op,
                detail: format!(
                    "exit {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    async fn reload(&self, op: &'static str, flag: &str) -> ProxyResult<()> {
        let pids = self.read_pids().await?;
        if pids.is_empty() {
            return Err(ProxyError::Control {
                op,
                detail: "pid file holds no pids".to_string(),
            });
        }
        let mut extra = vec![flag.to_string()];
        extra.extend(pids.iter().map(|pid| pid.to_string()));
        self.exec(op, &extra).await
    }

    async fn signal_all(&self, op: &'static str, signal: libc::c_int) -> ProxyResult<()> {
        let pids = self.read_pids().await?;
        if pids.is_empty() {
            return Err(ProxyError::Control {
                op,
                detail: "pid file holds no pids".to_string(),
            });
        }
        for pid in pids {
            let rc = unsafe { libc::kill(pid, signal) };
            if rc != 0 {
                return Err(ProxyError::Control {
                    op,
                    detail: format!(
                        "signalling pid {pid}: {}",
                        std::io::Error::last_os_error()
                    ),
                });
            }
        }
        Ok(())
    }
}

impl ProxyControl for HaproxyProcess {
    async fn soft_reload(&self) -> ProxyResult<()> {
        self.reload("soft reload", "-sf").await
    }

    async fn hard_reload(&self) -> ProxyResult<()> {
        self.reload("hard reload", "-st").await
    }

    async fn soft_stop(&self) -> ProxyResult<()> {
        self.signal_all("soft stop", libc::SIGUSR1).await
    }

    async fn hard_stop(&self) -> ProxyResult<()> {
        self.signal_all("hard stop", libc::SIGTERM).await
    }

    async fn start(&self) -> ProxyResult<()> {
        self.exec("start", &[]).await
    }
}
