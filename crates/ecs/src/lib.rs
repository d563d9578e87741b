//! Entity/component store.
//!
//! Each component type lives in its own table keyed by `EntityId`. Queries
//! answer "all entities having component T" by walking that table.
//!
//! # Invariants
//! - At most one component of a given type per entity.
//! - Despawning an entity removes every component it owns.
//! - Iteration follows entity id order, which is creation order.

mod components;
mod store;

pub use components::{Body, Mesh, MeshHandle};
pub use store::{ComponentStore, StoreError, Table};

pub fn crate_info() -> &'static str {
    "stride-ecs v0.1.0"
}
