use std::fmt;
use stride_ecs::ComponentStore;

use crate::backend::GraphicsBackend;
use crate::bus::MessageQueue;
use crate::error::EngineError;
use crate::frame::{Control, Frame};
use crate::subsystem::Subsystem;

/// Engine-owned pieces lent to a scene for one phase.
pub(crate) struct Services<'a> {
    pub messages: &'a mut MessageQueue,
    pub graphics: &'a mut dyn GraphicsBackend,
    pub control: &'a mut Control,
}

#[derive(Debug, Clone, Copy)]
enum Hook {
    Init,
    Update(f64),
    Draw(f64),
    Cleanup,
}

/// A set of entities plus the subsystem chain that operates on them.
///
/// Scenes are stacked by the engine: entering a scene suspends the current
/// one (its parent) and leaving returns to it.
pub struct Scene {
    name: String,
    entities: ComponentStore,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("entities", &self.entities)
            .field("subsystems", &self.subsystem_names())
            .finish()
    }
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: ComponentStore::new(),
            subsystems: Vec::new(),
        }
    }

    /// Append a subsystem to the end of the chain.
    pub fn with_subsystem(mut self, subsystem: impl Subsystem + 'static) -> Self {
        self.add_subsystem(subsystem);
        self
    }

    pub fn add_subsystem(&mut self, subsystem: impl Subsystem + 'static) {
        self.subsystems.push(Box::new(subsystem));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entities(&self) -> &ComponentStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut ComponentStore {
        &mut self.entities
    }

    /// Subsystem names in chain order.
    pub fn subsystem_names(&self) -> Vec<&str> {
        self.subsystems.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn init(&mut self, services: Services<'_>) -> Result<(), EngineError> {
        self.run_chain(Hook::Init, services)
    }

    pub(crate) fn update(&mut self, services: Services<'_>, dt: f64) -> Result<(), EngineError> {
        self.run_chain(Hook::Update(dt), services)
    }

    pub(crate) fn draw(&mut self, services: Services<'_>, dt: f64) -> Result<(), EngineError> {
        self.run_chain(Hook::Draw(dt), services)
    }

    pub(crate) fn cleanup(&mut self, services: Services<'_>) -> Result<(), EngineError> {
        self.run_chain(Hook::Cleanup, services)
    }

    fn run_chain(&mut self, hook: Hook, services: Services<'_>) -> Result<(), EngineError> {
        let mut frame = Frame {
            entities: &mut self.entities,
            messages: services.messages,
            graphics: services.graphics,
            control: services.control,
        };
        for subsystem in &mut self.subsystems {
            tracing::trace!(scene = %self.name, subsystem = subsystem.name(), ?hook, "hook");
            match hook {
                Hook::Init => subsystem.init(&mut frame)?,
                Hook::Update(dt) => subsystem.update(&mut frame, dt)?,
                Hook::Draw(dt) => subsystem.draw(&mut frame, dt)?,
                Hook::Cleanup => subsystem.cleanup(&mut frame)?,
            }
        }
        Ok(())
    }
}
