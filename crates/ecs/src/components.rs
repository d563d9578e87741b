use glam::{Mat4, Vec2};

/// A handle referencing mesh data owned by the render back-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshHandle(pub u64);

/// Planar physical state: where an entity is, which way it faces, and how
/// both are changing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub position: Vec2,
    /// Rotation about Z, in radians.
    pub angle: f32,
    pub velocity: Vec2,
    /// Radians per second.
    pub angular_velocity: f32,
    /// Linear damping coefficient applied to both velocities (per second).
    pub damping: f32,
}

impl Body {
    pub fn at(position: Vec2) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn with_angle(mut self, angle: f32) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec2) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_spin(mut self, angular_velocity: f32) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping;
        self
    }
}

/// Renderable triangle mesh plus its model-local transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mesh {
    pub handle: MeshHandle,
    pub local: Mat4,
}

impl Mesh {
    pub fn new(handle: MeshHandle) -> Self {
        Self {
            handle,
            local: Mat4::IDENTITY,
        }
    }

    pub fn with_local(mut self, local: Mat4) -> Self {
        self.local = local;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_builders() {
        let b = Body::at(Vec2::new(3.0, 4.0))
            .with_angle(0.5)
            .with_velocity(Vec2::X)
            .with_spin(2.0);
        assert_eq!(b.position, Vec2::new(3.0, 4.0));
        assert_eq!(b.angle, 0.5);
        assert_eq!(b.velocity, Vec2::X);
        assert_eq!(b.angular_velocity, 2.0);
        assert_eq!(b.damping, 0.0);
    }

    #[test]
    fn mesh_defaults_to_identity_local() {
        let m = Mesh::new(MeshHandle(7));
        assert_eq!(m.local, Mat4::IDENTITY);
        assert_eq!(m.handle, MeshHandle(7));
    }
}
