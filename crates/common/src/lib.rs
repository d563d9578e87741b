//! Shared types used across the stride crates.

mod types;

pub use types::{CallbackError, Color, EntityId};
