//! Rendering: the graphics subsystem that turns entities into draw calls, and
//! a back-end that records them.
//!
//! # Invariants
//! - Rendering never mutates entities; it only reads `Body` and `Mesh`.
//! - Entities without a `Mesh` are skipped; a missing `Body` means no
//!   translation or rotation.

mod graphics;
mod recording;

pub use graphics::{GraphicsSubsystem, compose_transform};
pub use recording::{DrawCall, Recording, RecordingBackend};

pub fn crate_info() -> &'static str {
    "stride-render v0.1.0"
}
