use std::fmt;
use stride_common::{CallbackError, EntityId};
use stride_ecs::{ComponentStore, StoreError};
use stride_kernel::{EngineError, Frame, Subsystem};
use tracing::debug;

pub type TimeoutFn = Box<dyn FnOnce(&mut Frame<'_>) -> Result<(), CallbackError>>;

/// Counts down simulated time; at zero the entity is despawned and the
/// expiry callback, if any, fires once.
pub struct Lifetime {
    remaining: f64,
    on_expire: Option<TimeoutFn>,
}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("remaining", &self.remaining)
            .field("has_callback", &self.on_expire.is_some())
            .finish()
    }
}

impl Lifetime {
    pub fn new(seconds: f64) -> Self {
        Self {
            remaining: seconds,
            on_expire: None,
        }
    }

    pub fn with_callback(
        mut self,
        on_expire: impl FnOnce(&mut Frame<'_>) -> Result<(), CallbackError> + 'static,
    ) -> Self {
        self.on_expire = Some(Box::new(on_expire));
        self
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }
}

/// Spawn a timer entity that fires `callback` after `delay` seconds of
/// simulated time and then removes itself. Requires a [`LifetimeSubsystem`]
/// in the scene's chain.
pub fn set_timeout(
    entities: &mut ComponentStore,
    delay: f64,
    callback: impl FnOnce(&mut Frame<'_>) -> Result<(), CallbackError> + 'static,
) -> Result<EntityId, StoreError> {
    let id = entities.spawn();
    entities.insert(id, Lifetime::new(delay).with_callback(callback))?;
    Ok(id)
}

#[derive(Debug, Default)]
pub struct LifetimeSubsystem;

impl Subsystem for LifetimeSubsystem {
    fn name(&self) -> &str {
        "lifetime"
    }

    fn update(&mut self, frame: &mut Frame<'_>, dt: f64) -> Result<(), EngineError> {
        for id in frame.entities.ids_with::<Lifetime>() {
            let Some(lifetime) = frame.entities.get_mut::<Lifetime>(id) else {
                continue;
            };
            lifetime.remaining -= dt;
            if lifetime.remaining > 0.0 {
                continue;
            }

            let callback = lifetime.on_expire.take();
            frame.entities.despawn(id);
            debug!(entity = %id, "lifetime expired");
            if let Some(callback) = callback {
                callback(frame)?;
            }
        }
        Ok(())
    }
}
