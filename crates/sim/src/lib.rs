//! Stock subsystems built on the kernel.
//!
//! - [`AiSubsystem`] fires each [`Brain`]'s think callback at its think rate.
//! - [`LifetimeSubsystem`] despawns entities whose [`Lifetime`] ran out and
//!   fires their expiry callback; [`set_timeout`] builds one-shot timers on it.
//! - [`PhysicsSubsystem`] integrates [`Body`](stride_ecs::Body) motion with a
//!   pluggable integrator.

mod ai;
mod lifetime;
mod physics;

pub use ai::{AiSubsystem, Brain, ThinkFn};
pub use lifetime::{Lifetime, LifetimeSubsystem, TimeoutFn, set_timeout};
pub use physics::{PhysicsSubsystem, step_body};

pub fn crate_info() -> &'static str {
    "stride-sim v0.1.0"
}

#[cfg(test)]
pub(crate) mod testing {
    use stride_ecs::ComponentStore;
    use stride_kernel::{Control, Frame, MessageQueue, NullGraphics};

    /// Owns everything a `Frame` borrows.
    #[derive(Default)]
    pub struct Fixture {
        pub entities: ComponentStore,
        pub messages: MessageQueue,
        pub graphics: NullGraphics,
        pub control: Control,
    }

    impl Fixture {
        pub fn frame(&mut self) -> Frame<'_> {
            Frame {
                entities: &mut self.entities,
                messages: &mut self.messages,
                graphics: &mut self.graphics,
                control: &mut self.control,
            }
        }
    }
}
