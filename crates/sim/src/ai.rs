use std::fmt;
use stride_common::{CallbackError, EntityId};
use stride_kernel::{EngineError, Frame, Subsystem};
use tracing::trace;

pub type ThinkFn = Box<dyn FnMut(EntityId, &mut Frame<'_>) -> Result<(), CallbackError>>;

/// Periodic decision-making for one entity.
///
/// The timer accumulates simulated time; each time it reaches `1 / think_rate`
/// the interval is subtracted and `think` fires once. A frame covering several
/// intervals fires several times, and the remainder carries over. A rate of
/// zero or less never fires.
pub struct Brain {
    think_rate: f64,
    timer: f64,
    think: Option<ThinkFn>,
    /// Set while `think` is out on a call. A brain inserted in its place
    /// starts unset, which is how a replacement is told apart.
    thinking: bool,
}

impl fmt::Debug for Brain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Brain")
            .field("think_rate", &self.think_rate)
            .field("timer", &self.timer)
            .field("has_think", &self.think.is_some())
            .finish()
    }
}

impl Brain {
    pub fn new(think_rate: f64) -> Self {
        Self {
            think_rate,
            timer: 0.0,
            think: None,
            thinking: false,
        }
    }

    pub fn with_think(
        mut self,
        think: impl FnMut(EntityId, &mut Frame<'_>) -> Result<(), CallbackError> + 'static,
    ) -> Self {
        self.think = Some(Box::new(think));
        self
    }

    pub fn think_rate(&self) -> f64 {
        self.think_rate
    }

    pub fn set_think_rate(&mut self, think_rate: f64) {
        self.think_rate = think_rate;
    }

    pub fn timer(&self) -> f64 {
        self.timer
    }

    /// Seconds between thinks, or `None` when thinking is disabled.
    pub fn interval(&self) -> Option<f64> {
        (self.think_rate > 0.0 && self.think_rate.is_finite()).then(|| 1.0 / self.think_rate)
    }
}

/// Drives every [`Brain`] in the scene.
#[derive(Debug, Default)]
pub struct AiSubsystem;

impl Subsystem for AiSubsystem {
    fn name(&self) -> &str {
        "ai"
    }

    fn update(&mut self, frame: &mut Frame<'_>, dt: f64) -> Result<(), EngineError> {
        for id in frame.entities.ids_with::<Brain>() {
            // An earlier think may have despawned this entity.
            let Some(brain) = frame.entities.get_mut::<Brain>(id) else {
                continue;
            };
            brain.timer += dt;

            // The callback is detached while it runs so it can borrow the frame.
            let mut think = brain.think.take();
            brain.thinking = true;
            let result = fire_due(id, frame, &mut think);
            // Re-attach only to the brain it came from; a replacement keeps
            // whatever callback it was built with.
            if let Some(brain) = frame.entities.get_mut::<Brain>(id).filter(|b| b.thinking) {
                brain.thinking = false;
                brain.think = think;
            }
            let fired = result?;
            if fired > 0 {
                trace!(entity = %id, fired, "brain thought");
            }
        }
        Ok(())
    }
}

fn fire_due(
    id: EntityId,
    frame: &mut Frame<'_>,
    think: &mut Option<ThinkFn>,
) -> Result<u32, CallbackError> {
    let mut fired = 0;
    loop {
        let Some(brain) = frame.entities.get_mut::<Brain>(id) else {
            break;
        };
        if !brain.thinking {
            break;
        }
        let Some(interval) = brain.interval() else {
            break;
        };
        if brain.timer < interval {
            break;
        }
        brain.timer -= interval;
        fired += 1;
        if let Some(think) = think.as_mut() {
            think(id, frame)?;
        }
    }
    Ok(fired)
}
