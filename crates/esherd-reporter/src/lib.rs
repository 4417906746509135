//! esherd-reporter — windowed health aggregation and autoscaling.
//!
//! The reporter ingests batches of per-node health samples, keeps a
//! bounded time window per node, and decides when the cluster should grow
//! or shrink:
//!
//! ```text
//! ingest → append → trim (empty window ⇒ node is dead, decommission)
//!        → evict nodes whose elasticsearch trend is negative
//!        → add if active < low watermark, else remove if active > high
//! ```
//!
//! Only nodes with a full observation window take part in any decision;
//! nodes still warming up are ignored. A single gate suppresses evaluation
//! while a watermark-driven scale action is in flight.
//!
//! The polling loop fans out one status request per membership entry each
//! interval and joins the whole batch before ingesting — no per-node
//! result is acted on individually.

pub mod poller;
pub mod reporter;
pub mod window;

pub use poller::Poller;
pub use reporter::{DecommissionFn, ProvisionFn, Reporter, ReporterConfig};
pub use window::{
    ClusterAverage, HealthSample, NodeAverage, SampleWindow, StatusBody, cluster_average,
};
