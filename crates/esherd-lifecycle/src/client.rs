//! The lifecycle client and its pipelines.

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use esherd_membership::{MembershipStore, ServerEntry};

use crate::error::{LifecycleError, LifecycleResult};
use crate::types::{Envelope, InstanceDescriptor, InstanceRef};

/// Configuration for the lifecycle client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Base URL of the instance API.
    pub base_url: String,
    /// Name stamped onto membership entries for automatically provisioned
    /// nodes. Only nodes carrying this name are eligible for automatic
    /// removal.
    pub node_name: String,
    /// Timeout for ordinary API calls, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for `wait-for-instance-status-ok`, in seconds. This call is
    /// allowed to block for minutes while the instance boots.
    pub wait_ready_timeout_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081/".to_string(),
            node_name: "esnode".to_string(),
            request_timeout_secs: 30,
            wait_ready_timeout_secs: 900,
        }
    }
}

/// Client for the remote instance API.
///
/// Both pipelines short-circuit on the first failing stage and surface a
/// single [`LifecycleError`] upward; recovery relies on the caller's next
/// natural trigger, never on retries here.
pub struct LifecycleClient {
    http: reqwest::Client,
    config: LifecycleConfig,
    membership: MembershipStore,
}

impl LifecycleClient {
    /// Build a client. `base_url` is normalized to end with a slash.
    pub fn new(
        mut config: LifecycleConfig,
        membership: MembershipStore,
    ) -> LifecycleResult<Self> {
        if !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|source| LifecycleError::Transport {
                endpoint: "client",
                source,
            })?;
        Ok(Self {
            http,
            config,
            membership,
        })
    }

    /// The node name stamped onto provisioned membership entries.
    pub fn node_name(&self) -> &str {
        &self.config.node_name
    }

    /// Provision one node: create it, wait until it reports status OK,
    /// then register its private IP into the membership store.
    pub async fn provision(&self) -> LifecycleResult<()> {
        info!("creating new instance");
        let created: Vec<InstanceDescriptor> = self
            .call("create-instance", "create-instance".to_string(), None)
            .await?;
        let instance = exactly_one(created, "create-instance")?;

        info!(id = %instance.id, "waiting for instance to report status ok, this can take minutes");
        let ready: Vec<serde_json::Value> = self
            .call(
                "wait-for-instance-status-ok",
                format!("wait-for-instance-status-ok?ids={}", instance.id),
                Some(Duration::from_secs(self.config.wait_ready_timeout_secs)),
            )
            .await?;
        exactly_one(ready, "wait-for-instance-status-ok")?;

        // Registration failing here leaves the instance running and
        // untracked. Accepted gap: surface the error, take no compensating
        // action.
        if let Err(e) = self
            .membership
            .add(ServerEntry {
                name: self.config.node_name.clone(),
                url: instance.private_ip.clone(),
            })
            .await
        {
            warn!(
                id = %instance.id,
                ip = %instance.private_ip,
                error = %e,
                "instance created but could not be registered; it keeps running untracked"
            );
            return Err(e.into());
        }

        info!(id = %instance.id, ip = %instance.private_ip, "instance provisioned and registered");
        Ok(())
    }

    /// Decommission the node with the given private IP: resolve it to an
    /// instance id, terminate it, then remove every matching membership
    /// entry.
    pub async fn decommission(&self, ip: &str) -> LifecycleResult<()> {
        info!(%ip, "terminating instance");
        let described: Vec<InstanceRef> = self
            .call(
                "describe-instance",
                format!("describe-instance?ips={ip}"),
                None,
            )
            .await?;
        let target = exactly_one(described, "describe-instance")?;

        info!(%ip, id = %target.id, "resolved instance id, requesting termination");
        let terminated: Vec<InstanceRef> = self
            .call(
                "terminate-instance",
                format!("terminate-instance?ids={}", target.id),
                None,
            )
            .await?;
        let echo = exactly_one(terminated, "terminate-instance")?;
        if echo.id != target.id {
            return Err(LifecycleError::Shape {
                endpoint: "terminate-instance",
                reason: format!("echoed id {} does not match {}", echo.id, target.id),
            });
        }

        let removed = self.membership.remove_by_url(ip).await?;
        info!(%ip, id = %target.id, removed, "instance terminated and deregistered");
        Ok(())
    }

    /// Issue one GET against the instance API and unwrap the envelope.
    async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &'static str,
        path: String,
        timeout: Option<Duration>,
    ) -> LifecycleResult<Vec<T>> {
        let url = format!("{}{}", self.config.base_url, path);
        let mut request = self.http.get(&url);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|source| LifecycleError::Transport { endpoint, source })?;
        if !response.status().is_success() {
            return Err(LifecycleError::HttpStatus {
                endpoint,
                status: response.status(),
            });
        }

        let envelope: Envelope<T> =
            response
                .json()
                .await
                .map_err(|source| LifecycleError::Shape {
                    endpoint,
                    reason: source.to_string(),
                })?;
        if envelope.status != "OK" {
            return Err(LifecycleError::Api {
                endpoint,
                detail: envelope.error.unwrap_or_else(|| envelope.status.clone()),
            });
        }
        envelope.data.ok_or(LifecycleError::Shape {
            endpoint,
            reason: "missing data array".to_string(),
        })
    }
}

/// Enforce the one-element cardinality every pipeline stage expects.
fn exactly_one<T>(mut data: Vec<T>, endpoint: &'static str) -> LifecycleResult<T> {
    if data.len() != 1 {
        return Err(LifecycleError::Shape {
            endpoint,
            reason: format!("expected exactly 1 element, got {}", data.len()),
        });
    }
    Ok(data.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::Router;
    use axum::routing::get;
    use serde_json::{Value, json};

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn temp_membership() -> (tempfile::TempDir, MembershipStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MembershipStore::load(dir.path().join("servers.json")).unwrap();
        (dir, store)
    }

    async fn client_for(base_url: String, store: &MembershipStore) -> LifecycleClient {
        let config = LifecycleConfig {
            base_url,
            ..LifecycleConfig::default()
        };
        LifecycleClient::new(config, store.clone()).unwrap()
    }

    fn ok(data: Value) -> Json<Value> {
        Json(json!({ "status": "OK", "data": data }))
    }

    #[tokio::test]
    async fn provision_registers_the_new_node() {
        let router = Router::new()
            .route(
                "/create-instance",
                get(|| async { ok(json!([{ "id": "i-1", "privateIp": "10.0.0.9" }])) }),
            )
            .route(
                "/wait-for-instance-status-ok",
                get(|| async { ok(json!([{ "id": "i-1" }])) }),
            );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        client.provision().await.unwrap();

        let entries = store.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "esnode");
        assert_eq!(entries[0].url, "10.0.0.9");
    }

    #[tokio::test]
    async fn provision_fails_when_create_returns_two_instances() {
        let router = Router::new().route(
            "/create-instance",
            get(|| async {
                ok(json!([
                    { "id": "i-1", "privateIp": "10.0.0.1" },
                    { "id": "i-2", "privateIp": "10.0.0.2" },
                ]))
            }),
        );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        let err = client.provision().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Shape { endpoint, .. } if endpoint == "create-instance"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn provision_fails_on_api_error_status() {
        let router = Router::new().route(
            "/create-instance",
            get(|| async { Json(json!({ "status": "ERROR", "error": "quota exceeded" })) }),
        );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        let err = client.provision().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Api { detail, .. } if detail == "quota exceeded"));
    }

    #[tokio::test]
    async fn provision_fails_when_wait_reports_nothing() {
        let router = Router::new()
            .route(
                "/create-instance",
                get(|| async { ok(json!([{ "id": "i-1", "privateIp": "10.0.0.9" }])) }),
            )
            .route(
                "/wait-for-instance-status-ok",
                get(|| async { ok(json!([])) }),
            );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        let err = client.provision().await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Shape { endpoint, .. } if endpoint == "wait-for-instance-status-ok"
        ));
        // No registration happened for the half-provisioned instance.
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn decommission_terminates_and_deregisters() {
        let router = Router::new()
            .route(
                "/describe-instance",
                get(|| async { ok(json!([{ "id": "i-7" }])) }),
            )
            .route(
                "/terminate-instance",
                get(|| async { ok(json!([{ "id": "i-7" }])) }),
            );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        store
            .add(ServerEntry {
                name: "esnode".to_string(),
                url: "10.0.0.7".to_string(),
            })
            .await
            .unwrap();
        let client = client_for(base, &store).await;

        client.decommission("10.0.0.7").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn decommission_fails_on_terminate_echo_mismatch() {
        let router = Router::new()
            .route(
                "/describe-instance",
                get(|| async { ok(json!([{ "id": "i-7" }])) }),
            )
            .route(
                "/terminate-instance",
                get(|| async { ok(json!([{ "id": "i-9" }])) }),
            );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        store
            .add(ServerEntry {
                name: "esnode".to_string(),
                url: "10.0.0.7".to_string(),
            })
            .await
            .unwrap();
        let client = client_for(base, &store).await;

        let err = client.decommission("10.0.0.7").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Shape { endpoint, .. } if endpoint == "terminate-instance"
        ));
        // Membership untouched when the pipeline aborts.
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn decommission_fails_when_describe_finds_nothing() {
        let router = Router::new().route("/describe-instance", get(|| async { ok(json!([])) }));
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        let err = client.decommission("10.0.0.7").await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Shape { endpoint, .. } if endpoint == "describe-instance"
        ));
    }

    #[tokio::test]
    async fn non_success_http_status_is_a_failure() {
        let router = Router::new().route(
            "/create-instance",
            get(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    "broken".to_string(),
                )
            }),
        );
        let base = spawn_stub(router).await;
        let (_dir, store) = temp_membership();
        let client = client_for(base, &store).await;

        let err = client.provision().await.unwrap_err();
        assert!(matches!(err, LifecycleError::HttpStatus { .. }));
    }
}
