//! HAProxy configuration rendering.
//!
//! The base template carries one literal marker line per backend port the
//! balanced service exposes. Regeneration always starts from the fresh
//! template and inserts one `server` directive per membership entry
//! immediately after each marker, so the output depends only on the
//! template and the membership list.

use std::path::PathBuf;

use serde::Deserialize;

use esherd_membership::ServerEntry;

use crate::error::{ProxyError, ProxyResult};

/// Marker for the HTTP backend block.
pub const MARKER_9200: &str = "#servers 9200";
/// Marker for the transport backend block.
pub const MARKER_9300: &str = "#servers 9300";

/// Configuration for the proxy synchronizer and process control.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy binary to invoke.
    pub binary: String,
    /// Active configuration path written on every regeneration.
    pub config_path: PathBuf,
    /// Immutable base template containing the marker lines.
    pub template_path: PathBuf,
    /// Pid file the proxy maintains (`-p`).
    pub pid_file: PathBuf,
    /// Periodic resync interval, in seconds. Catches edits made behind the
    /// membership store's back.
    pub resync_interval_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: "haproxy".to_string(),
            config_path: PathBuf::from("config/haproxy.cfg"),
            template_path: PathBuf::from("base-haproxy.cfg"),
            pid_file: PathBuf::from("run/haproxy.pid"),
            resync_interval_secs: 300,
        }
    }
}

/// Render the active configuration from the base template and the current
/// membership list.
///
/// Inserts one directive per entry after each of the two markers.
/// Duplicate entries are legal and printed once each per marker.
pub fn render_config(template: &str, entries: &[ServerEntry]) -> ProxyResult<String> {
    let rendered = insert_after_marker(template, MARKER_9200, entries, 9200)?;
    insert_after_marker(&rendered, MARKER_9300, entries, 9300)
}

fn insert_after_marker(
    text: &str,
    marker: &str,
    entries: &[ServerEntry],
    port: u16,
) -> ProxyResult<String> {
    let at = text.find(marker).ok_or_else(|| ProxyError::MarkerMissing {
        marker: marker.to_string(),
    })?;
    let insert_at = at + marker.len();

    let mut block = String::new();
    for entry in entries {
        block.push_str(&format!(
            "\n    server {} {}:{} check",
            entry.name, entry.url, port
        ));
    }

    let mut out = String::with_capacity(text.len() + block.len());
    out.push_str(&text[..insert_at]);
    out.push_str(&block);
    out.push_str(&text[insert_at..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = "\
global
    daemon

backend http
    #servers 9200

backend transport
    #servers 9300
";

    fn entry(name: &str, url: &str) -> ServerEntry {
        ServerEntry {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn inserts_one_line_per_entry_after_each_marker() {
        let entries = vec![entry("es1", "10.0.0.1"), entry("es2", "10.0.0.2")];
        let out = render_config(TEMPLATE, &entries).unwrap();

        assert!(out.contains("#servers 9200\n    server es1 10.0.0.1:9200 check\n    server es2 10.0.0.2:9200 check\n"));
        assert!(out.contains("#servers 9300\n    server es1 10.0.0.1:9300 check\n    server es2 10.0.0.2:9300 check\n"));
    }

    #[test]
    fn regeneration_is_idempotent() {
        let entries = vec![entry("es1", "10.0.0.1")];
        let first = render_config(TEMPLATE, &entries).unwrap();
        let second = render_config(TEMPLATE, &entries).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_membership_leaves_template_unchanged() {
        let out = render_config(TEMPLATE, &[]).unwrap();
        assert_eq!(out, TEMPLATE);
    }

    #[test]
    fn duplicate_entries_are_printed_twice() {
        let entries = vec![entry("es1", "10.0.0.1"), entry("es1", "10.0.0.1")];
        let out = render_config(TEMPLATE, &entries).unwrap();
        assert_eq!(out.matches("server es1 10.0.0.1:9200 check").count(), 2);
        assert_eq!(out.matches("server es1 10.0.0.1:9300 check").count(), 2);
    }

    #[test]
    fn missing_marker_is_an_error() {
        let err = render_config("backend http\n    #servers 9200\n", &[]).unwrap_err();
        assert!(matches!(
            err,
            ProxyError::MarkerMissing { marker } if marker == MARKER_9300
        ));
    }
}
