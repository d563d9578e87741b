use std::fmt;
use stride_ecs::ComponentStore;

use crate::backend::GraphicsBackend;
use crate::bus::MessageQueue;
use crate::scene::Scene;

/// Everything a subsystem hook or message handler may touch during one phase.
///
/// `entities` is the current scene's store. Scene-stack changes and exit
/// requests go through `control` and take effect after the step's drain
/// point.
pub struct Frame<'a> {
    pub entities: &'a mut ComponentStore,
    pub messages: &'a mut MessageQueue,
    pub graphics: &'a mut dyn GraphicsBackend,
    pub control: &'a mut Control,
}

impl Frame<'_> {
    /// Enqueue a message for the next drain point.
    pub fn post<M: 'static>(&mut self, message: M) {
        self.messages.post(message);
    }

    pub fn exit(&mut self) {
        self.control.exit();
    }

    pub fn enter_scene(&mut self, scene: Scene) {
        self.control.enter_scene(scene);
    }

    pub fn leave_scene(&mut self) {
        self.control.leave_scene();
    }
}

#[derive(Debug)]
pub(crate) enum SceneRequest {
    Enter(Scene),
    Leave,
}

/// Requests from inside a phase that the scheduler applies between steps.
#[derive(Default)]
pub struct Control {
    exit_requested: bool,
    requests: Vec<SceneRequest>,
}

impl fmt::Debug for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Control")
            .field("exit_requested", &self.exit_requested)
            .field("pending_requests", &self.requests.len())
            .finish()
    }
}

impl Control {
    /// Ask the main loop to stop at the top of its next iteration.
    pub fn exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn enter_scene(&mut self, scene: Scene) {
        self.requests.push(SceneRequest::Enter(scene));
    }

    pub fn leave_scene(&mut self) {
        self.requests.push(SceneRequest::Leave);
    }

    pub fn has_pending_requests(&self) -> bool {
        !self.requests.is_empty()
    }

    pub(crate) fn take_requests(&mut self) -> Vec<SceneRequest> {
        std::mem::take(&mut self.requests)
    }
}
