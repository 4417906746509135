//! esherd-api — the control surface.
//!
//! A thin REST layer over the lifecycle pipelines and the membership
//! store, gated by a static API key.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/nodes` | List membership entries |
//! | POST | `/api/v1/nodes` | Provision one node (long-running) |
//! | DELETE | `/api/v1/nodes/:ip` | Decommission the node with that private IP |
//!
//! Every route requires the `x-api-key` header. Responses use the
//! `{"status": "OK"|"ERROR", "data"|"error": ...}` envelope.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get};

use esherd_lifecycle::LifecycleClient;
use esherd_membership::MembershipStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub membership: MembershipStore,
    pub lifecycle: Arc<LifecycleClient>,
    pub api_key: String,
}

/// Build the control surface router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/nodes",
            get(handlers::list_nodes).post(handlers::provision_node),
        )
        .route("/nodes/{ip}", delete(handlers::decommission_node))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
