//! esherd-proxy — keeps HAProxy consistent with cluster membership.
//!
//! Two responsibilities:
//! - regenerate the proxy configuration from an immutable base template
//!   plus the current membership list (one `server` directive per entry
//!   per backend port marker, rebuilt from scratch every time), and
//! - drive the running proxy through an escalating reload ladder:
//!   soft reload → hard reload → full restart (soft stop, falling back to
//!   hard stop, then start).
//!
//! The synchronizer reacts to membership change notifications and to a
//! periodic resync timer; ladder exhaustion is terminal for that trigger
//! only.

pub mod config;
pub mod control;
pub mod error;
pub mod sync;

pub use config::{MARKER_9200, MARKER_9300, ProxyConfig, render_config};
pub use control::{HaproxyProcess, ProxyControl};
pub use error::{ProxyError, ProxyResult};
pub use sync::ConfigSynchronizer;
