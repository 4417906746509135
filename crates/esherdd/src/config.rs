//! Daemon configuration.
//!
//! One TOML file with a section per subsystem:
//!
//! ```toml
//! [membership]
//! path = "servers.json"
//!
//! [proxy]
//! binary = "haproxy"
//! template_path = "base-haproxy.cfg"
//!
//! [lifecycle]
//! base_url = "http://localhost:8081/"
//!
//! [reporter]
//! poll_interval_ms = 300000
//!
//! [api]
//! listen = "0.0.0.0:8090"
//! api_key = "..."
//! ```
//!
//! Every field has a default, so a partial file (or none at all) is fine.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use esherd_lifecycle::LifecycleConfig;
use esherd_proxy::ProxyConfig;
use esherd_reporter::ReporterConfig;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MembershipSection {
    /// Path of the persisted membership file.
    pub path: PathBuf,
}

impl Default for MembershipSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("servers.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Listen address for the control surface.
    pub listen: String,
    /// Static key every control surface request must carry.
    pub api_key: String,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8090".to_string(),
            api_key: "change-me".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub membership: MembershipSection,
    pub proxy: ProxyConfig,
    pub lifecycle: LifecycleConfig,
    pub reporter: ReporterConfig,
    pub api: ApiSection,
}

impl Config {
    /// Load configuration. An explicit `--config` path must exist; without
    /// one, a missing `esherd.toml` in the working directory just means
    /// defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from("esherd.toml"), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !required => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).context(format!("reading config file {}", path.display()));
            }
        };

        let config: Self =
            toml::from_str(&text).context(format!("parsing config file {}", path.display()))?;
        info!(path = %path.display(), "config file loaded");
        Ok(config)
    }
}
