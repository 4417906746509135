//! esherd-membership — the persisted list of load-balanced nodes.
//!
//! The membership file is a JSON array of `{"name": ..., "url": ...}`
//! objects and is the single source of truth for both the proxy
//! configuration and the controller. It is rewritten in full on every
//! mutation; subscribers are notified of changes through a watch channel.
//!
//! The `MembershipStore` is `Clone` (backed by `Arc`) and can be shared
//! across async tasks. Mutations are serialized by an internal lock; only
//! the lifecycle pipelines mutate it.

pub mod error;
pub mod store;

pub use error::{MembershipError, MembershipResult};
pub use store::{MembershipStore, ServerEntry};
