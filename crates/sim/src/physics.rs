use glam::Vec2;
use std::fmt;
use stride_ecs::Body;
use stride_integrate::{Integrator, IntegratorKind};
use stride_kernel::{EngineError, Frame, Subsystem};

/// Advance one body by `dt` seconds.
///
/// State is `[x, y, angle, vx, vy, spin]`; linear and angular velocity decay
/// at the body's `damping` rate.
pub fn step_body(integrator: &dyn Integrator, body: &mut Body, dt: f64) {
    let mut state = [
        f64::from(body.position.x),
        f64::from(body.position.y),
        f64::from(body.angle),
        f64::from(body.velocity.x),
        f64::from(body.velocity.y),
        f64::from(body.angular_velocity),
    ];
    let damping = f64::from(body.damping);

    integrator.solve(&mut state, dt, &mut |s, out| {
        out[0] = s[3];
        out[1] = s[4];
        out[2] = s[5];
        out[3] = -damping * s[3];
        out[4] = -damping * s[4];
        out[5] = -damping * s[5];
    });

    body.position = Vec2::new(state[0] as f32, state[1] as f32);
    body.angle = state[2] as f32;
    body.velocity = Vec2::new(state[3] as f32, state[4] as f32);
    body.angular_velocity = state[5] as f32;
}

/// Integrates every [`Body`] in the scene each update.
pub struct PhysicsSubsystem {
    integrator: Box<dyn Integrator>,
}

impl fmt::Debug for PhysicsSubsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsSubsystem")
            .field("integrator", &self.integrator.name())
            .finish()
    }
}

impl Default for PhysicsSubsystem {
    fn default() -> Self {
        Self::from_kind(IntegratorKind::default())
    }
}

impl PhysicsSubsystem {
    pub fn new(integrator: impl Integrator + 'static) -> Self {
        Self {
            integrator: Box::new(integrator),
        }
    }

    pub fn from_kind(kind: IntegratorKind) -> Self {
        Self {
            integrator: kind.build(),
        }
    }

    pub fn integrator_name(&self) -> &'static str {
        self.integrator.name()
    }
}

impl Subsystem for PhysicsSubsystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn update(&mut self, frame: &mut Frame<'_>, dt: f64) -> Result<(), EngineError> {
        let integrator = &*self.integrator;
        for (_, body) in frame.entities.query_mut::<Body>() {
            step_body(integrator, body, dt);
        }
        Ok(())
    }
}
