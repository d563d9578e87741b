//! Engine kernel: fixed-timestep scheduler, scene stack, subsystem chain and
//! deferred message bus.
//!
//! # Invariants
//! - Every Update receives exactly the fixed update period; every Draw the
//!   fixed draw period.
//! - Within one step all hooks of the chain run in registration order before
//!   the next phase begins.
//! - Messages posted during a step are dispatched only at that step's drain
//!   point, in FIFO order, to handlers of their exact type.
//! - Exit is observed at the top of the next outer iteration; in-flight
//!   steps always complete.

mod backend;
mod bus;
mod clock;
mod config;
mod engine;
mod error;
mod frame;
mod scene;
mod subsystem;

pub use backend::{
    GraphicsBackend, HeadlessWindow, NullGraphics, NullSound, SoundBackend, WindowEvent,
    WindowHandle, WindowSystem,
};
pub use bus::{Handlers, Message, MessageQueue};
pub use clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Backends, Engine, FrameStats, StepReport};
pub use error::{BackendError, EngineError};
pub use frame::{Control, Frame};
pub use scene::Scene;
pub use subsystem::Subsystem;

pub fn crate_info() -> &'static str {
    "stride-kernel v0.1.0"
}
