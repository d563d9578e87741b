use glam::{Mat4, Vec3};
use stride_common::Color;
use stride_ecs::{Body, Mesh};
use stride_kernel::{EngineError, Frame, Subsystem};

/// Model-view transform for one mesh:
/// `view * translate(position) * rotate_z(angle) * local`.
pub fn compose_transform(view: &Mat4, body: Option<&Body>, local: &Mat4) -> Mat4 {
    let (position, angle) = body.map_or((glam::Vec2::ZERO, 0.0), |b| (b.position, b.angle));
    *view
        * Mat4::from_translation(Vec3::new(position.x, position.y, 0.0))
        * Mat4::from_rotation_z(angle)
        * *local
}

/// Clears the render target and submits every mesh in the scene.
#[derive(Debug, Clone)]
pub struct GraphicsSubsystem {
    pub view: Mat4,
    pub clear_color: Color,
}

impl Default for GraphicsSubsystem {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            clear_color: Color::BLACK,
        }
    }
}

impl GraphicsSubsystem {
    pub fn new(clear_color: Color) -> Self {
        Self {
            clear_color,
            ..Self::default()
        }
    }

    pub fn with_view(mut self, view: Mat4) -> Self {
        self.view = view;
        self
    }
}

impl Subsystem for GraphicsSubsystem {
    fn name(&self) -> &str {
        "graphics"
    }

    fn draw(&mut self, frame: &mut Frame<'_>, _dt: f64) -> Result<(), EngineError> {
        frame.graphics.clear(self.clear_color);

        let mut submitted = 0usize;
        for (id, mesh) in frame.entities.query::<Mesh>() {
            let body = frame.entities.get::<Body>(id);
            let transform = compose_transform(&self.view, body, &mesh.local);
            // Back-ends take the transposed matrix.
            frame.graphics.draw_tri_mesh(mesh.handle, &transform.transpose());
            submitted += 1;
        }
        tracing::trace!(submitted, "meshes submitted");
        Ok(())
    }
}
