use crate::error::EngineError;
use crate::frame::Frame;

/// A unit of per-frame work in a scene's chain.
///
/// Every hook defaults to a no-op, so an implementation overrides only what
/// it needs. Hooks run in chain order; a later subsystem observes the side
/// effects of earlier ones within the same phase. Errors from user callbacks
/// are returned as-is and abort the rest of the phase.
pub trait Subsystem {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn init(&mut self, _frame: &mut Frame<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    /// One fixed simulation step of `dt` seconds.
    fn update(&mut self, _frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
        Ok(())
    }

    /// One fixed draw step of `dt` seconds.
    fn draw(&mut self, _frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
        Ok(())
    }

    fn cleanup(&mut self, _frame: &mut Frame<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}
