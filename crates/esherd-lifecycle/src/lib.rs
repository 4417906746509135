//! esherd-lifecycle — node provisioning and decommissioning pipelines.
//!
//! Wraps the remote instance API in two sequential, short-circuiting
//! pipelines:
//!
//! ```text
//! provision:    create-instance → wait-for-instance-status-ok → register ip
//! decommission: describe-instance → terminate-instance → deregister ip
//! ```
//!
//! Every remote response is validated defensively: missing arrays, wrong
//! element counts, and missing fields are typed failures, never coerced to
//! a best guess. Any stage failure aborts the remaining stages.
//!
//! There is no compensation: a crash or failure after instance creation
//! can leave a running, untracked instance. That gap is accepted and
//! logged, not silently fixed.

pub mod client;
pub mod error;
pub mod types;

pub use client::{LifecycleClient, LifecycleConfig};
pub use error::{LifecycleError, LifecycleResult};
pub use types::{Envelope, InstanceDescriptor, InstanceRef};
