//! Wire types for the remote instance API.
//!
//! Every endpoint answers with the same envelope:
//! `{"status": "OK"|"ERROR", "data": [...], "error": "..."}`. The `data`
//! array must match the expected cardinality per operation or the whole
//! pipeline fails.

use serde::Deserialize;

/// Response envelope shared by every instance API endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    pub data: Option<Vec<T>>,
    pub error: Option<String>,
}

/// A freshly created instance, as returned by `create-instance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDescriptor {
    pub id: String,
    pub private_ip: String,
}

/// A bare instance reference, as returned by `describe-instance` and
/// echoed back by `terminate-instance`.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceRef {
    pub id: String,
}
